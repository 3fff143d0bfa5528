//! Configuration and output helpers for the `slotwise` binary.

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use slotwise_gateway::{FileStore, GatewayConfig, SessionStore};
use slotwise_query::{CacheConfig, QueryError, QueryState, QueryStatus};
use slotwise_types::{
    Appointment, AppointmentWithDetails, Client, ClientId, ClientWithDetails, NewAppointment,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Everything the binary needs to reach the backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub gateway: GatewayConfig,
    pub cache: CacheConfig,
    /// Where the signed-in session is kept. Without one the session lives
    /// only as long as the process.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_file: Option<PathBuf>,
}

/// Values given on the command line or through the environment.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub session_file: Option<PathBuf>,
}

impl AppConfig {
    /// Reads a JSON config file. Missing sections take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config: Self = serde_json::from_str(&raw)
            .with_context(|| format!("invalid config {}", path.display()))?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Loads `path` when given, otherwise starts from defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// Applies command-line and environment values over the file.
    pub fn with_overrides(mut self, overrides: Overrides) -> Self {
        if let Some(base_url) = overrides.base_url {
            self.gateway.base_url = base_url;
        }
        if let Some(api_key) = overrides.api_key {
            self.gateway.api_key = api_key;
        }
        if overrides.session_file.is_some() {
            self.session_file = overrides.session_file;
        }
        self
    }

    pub fn session_store(&self) -> SessionStore {
        match &self.session_file {
            Some(path) => SessionStore::new(Arc::new(FileStore::new(path))),
            None => SessionStore::in_memory(),
        }
    }
}

/// Turns a settled query into its data or its error.
pub fn settled_result<T>(state: QueryState<T>) -> Result<T, QueryError> {
    match (state.status, state.data, state.error) {
        (QueryStatus::Error, _, error) => Err(error.unwrap_or_else(QueryError::cancelled)),
        (_, Some(data), _) => Ok(data),
        (_, None, _) => Err(QueryError::cancelled()),
    }
}

/// Booking input from command-line values.
pub fn booking(
    client_id: ClientId,
    title: String,
    starts_at: DateTime<Utc>,
    minutes: i64,
    location: Option<String>,
) -> Result<NewAppointment> {
    if minutes <= 0 {
        bail!("--minutes must be positive");
    }
    Ok(NewAppointment {
        client_id,
        title,
        starts_at,
        ends_at: starts_at + Duration::minutes(minutes),
        location,
        notes: None,
    })
}

pub fn format_client(client: &Client) -> String {
    format!(
        "{}  {:<28} {:<9} {}",
        client.id,
        client.full_name(),
        client.status.as_str(),
        client.email.as_deref().unwrap_or("-"),
    )
}

pub fn format_appointment(appointment: &Appointment) -> String {
    let status = serde_json::to_value(appointment.status)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default();
    let mut line = format!(
        "{}  {}  {:>4}m  {:<10} {}",
        appointment.id,
        appointment.starts_at.format("%Y-%m-%d %H:%M"),
        appointment.duration().num_minutes(),
        status,
        appointment.title,
    );
    if let Some(location) = &appointment.location {
        line.push_str(&format!(" @ {location}"));
    }
    line
}

pub fn format_appointment_row(row: &AppointmentWithDetails) -> String {
    format!(
        "{}  ({} {})",
        format_appointment(&row.appointment),
        row.client.first_name,
        row.client.last_name,
    )
}

/// The client line followed by its upcoming appointments, indented.
pub fn format_client_details(details: &ClientWithDetails, now: DateTime<Utc>) -> Vec<String> {
    let mut lines = vec![format_client(&details.client)];
    lines.extend(
        details
            .upcoming(now)
            .into_iter()
            .map(|a| format!("  {}", format_appointment(a))),
    );
    lines
}
