//! REST implementation of [`DataGateway`].
//!
//! Talks to a PostgREST-style endpoint (`{base}/rest/v1/{table}`). Every
//! request carries the project API key; the bearer token is the signed-in
//! session's access token, or the API key when nobody is signed in.

use crate::config::GatewayConfig;
use crate::error::{GatewayError, GatewayResult};
use crate::gateway::DataGateway;
use crate::storage::SessionStore;
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use slotwise_types::{
    Appointment, AppointmentId, AppointmentStatus, AppointmentWithDetails, Client as ClientRow,
    ClientFilters, ClientId, ClientWithDetails, NewAppointment, PractitionerId,
};
use tracing::debug;

const CLIENTS_TABLE: &str = "clients";
const APPOINTMENTS_TABLE: &str = "appointments";

/// Row inserted by [`RestGateway::create_appointment`].
#[derive(Debug, Serialize)]
struct AppointmentInsert<'a> {
    #[serde(flatten)]
    data: &'a NewAppointment,
    practitioner_id: PractitionerId,
    status: AppointmentStatus,
}

/// Gateway backed by the hosted REST API.
#[derive(Debug)]
pub struct RestGateway {
    config: GatewayConfig,
    http: Client,
    session: SessionStore,
}

impl RestGateway {
    /// Creates a gateway. Fails on unusable configuration.
    pub fn new(config: GatewayConfig, session: SessionStore) -> GatewayResult<Self> {
        config.validate()?;
        let http = Client::builder().timeout(config.timeout()).build()?;
        Ok(Self {
            config,
            http,
            session,
        })
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    async fn request(&self, method: Method, table: &str) -> GatewayResult<RequestBuilder> {
        let bearer = match self.session.current().await? {
            Some(session) => session.access_token,
            None => self.config.api_key.clone(),
        };
        Ok(self
            .http
            .request(method, self.config.rest_url(table))
            .header("apikey", &self.config.api_key)
            .bearer_auth(bearer))
    }

    async fn send<T: DeserializeOwned>(&self, action: &str, request: RequestBuilder) -> GatewayResult<T> {
        debug!("Backend request: {}", action);
        let response = request
            .send()
            .await
            .map_err(|e| transport_error(action, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(api_error(status, &body));
        }

        response
            .json()
            .await
            .map_err(|e| GatewayError::Decode(format!("{action}: {e}")))
    }

    /// First row of a filtered read.
    async fn single<T: DeserializeOwned>(
        &self,
        action: &str,
        request: RequestBuilder,
        missing: String,
    ) -> GatewayResult<T> {
        let rows: Vec<T> = self.send(action, request).await?;
        rows.into_iter()
            .next()
            .ok_or(GatewayError::NotFound(missing))
    }
}

#[async_trait]
impl DataGateway for RestGateway {
    async fn get_clients(&self, filters: &ClientFilters) -> GatewayResult<Vec<ClientRow>> {
        let mut params = vec![
            ("select", "*".to_string()),
            ("order", "last_name.asc,first_name.asc".to_string()),
        ];
        if let Some(status) = filters.status {
            params.push(("status", format!("eq.{}", status.as_str())));
        }
        if let Some(term) = filters.search_term() {
            let term: String = term.chars().filter(|c| !",()*".contains(*c)).collect();
            params.push((
                "or",
                format!("(first_name.ilike.*{term}*,last_name.ilike.*{term}*,email.ilike.*{term}*)"),
            ));
        }

        let request = self
            .request(Method::GET, CLIENTS_TABLE)
            .await?
            .query(&params);
        self.send("get clients", request).await
    }

    async fn get_client_by_id(&self, id: ClientId) -> GatewayResult<ClientWithDetails> {
        let request = self.request(Method::GET, CLIENTS_TABLE).await?.query(&[
            ("select", "*,appointments(*)".to_string()),
            ("appointments.order", "starts_at.asc".to_string()),
            ("id", format!("eq.{id}")),
        ]);
        self.single("get client", request, format!("client {id}"))
            .await
    }

    async fn get_appointments(&self) -> GatewayResult<Vec<AppointmentWithDetails>> {
        let request = self.request(Method::GET, APPOINTMENTS_TABLE).await?.query(&[
            ("select", "*,client:clients(id,first_name,last_name)"),
            ("order", "starts_at.asc"),
        ]);
        self.send("get appointments", request).await
    }

    async fn get_appointment_by_id(&self, id: AppointmentId) -> GatewayResult<Appointment> {
        let request = self
            .request(Method::GET, APPOINTMENTS_TABLE)
            .await?
            .query(&[("select", "*".to_string()), ("id", format!("eq.{id}"))]);
        self.single("get appointment", request, format!("appointment {id}"))
            .await
    }

    async fn create_appointment(&self, data: &NewAppointment) -> GatewayResult<Appointment> {
        let session = self
            .session
            .current()
            .await?
            .ok_or(GatewayError::AuthRequired)?;
        let insert = AppointmentInsert {
            data,
            practitioner_id: session.user_id,
            status: AppointmentStatus::Scheduled,
        };

        let request = self
            .request(Method::POST, APPOINTMENTS_TABLE)
            .await?
            .header("Prefer", "return=representation")
            .json(&insert);
        let rows: Vec<Appointment> = self.send("create appointment", request).await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| GatewayError::Decode("create appointment: no row returned".to_string()))
    }
}

/// A request that never got an answer is a network failure; anything else
/// reqwest reports stays an HTTP error.
fn transport_error(action: &str, err: reqwest::Error) -> GatewayError {
    if err.is_connect() || err.is_timeout() || err.is_request() {
        GatewayError::Network(format!("{action}: {err}"))
    } else {
        GatewayError::Http(err)
    }
}

/// Maps an error answer. The backend sends `{code, message}`; the identity
/// provider sends `msg` or `error_description`.
fn api_error(status: StatusCode, body: &str) -> GatewayError {
    let parsed: Value = serde_json::from_str(body).unwrap_or(Value::Null);
    let field = |name: &str| match parsed.get(name) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    };

    let message = ["message", "msg", "error_description", "error"]
        .into_iter()
        .find_map(&field)
        .or_else(|| {
            let body = body.trim();
            (!body.is_empty() && parsed.is_null()).then(|| body.to_string())
        })
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string()
        });

    GatewayError::Api {
        status: status.as_u16(),
        message,
        code: field("code"),
    }
}
