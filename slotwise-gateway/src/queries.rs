//! Domain queries: the screens' entry point into the cache.

use crate::gateway::DataGateway;
use crate::keys::{APPOINTMENTS, CLIENTS};
use chrono::Utc;
use slotwise_query::{
    Mutation, MutationOptions, QueryClient, QueryError, QueryObserver, QueryOptions,
};
use slotwise_types::{
    Appointment, AppointmentId, AppointmentWithDetails, Client, ClientFilters, ClientId,
    ClientWithDetails, NewAppointment, PractitionerId, TypesError,
};
use std::sync::Arc;

/// Binds gateway reads and writes to their cache keys.
#[derive(Clone)]
pub struct SchedulingQueries {
    client: QueryClient,
    gateway: Arc<dyn DataGateway>,
}

impl std::fmt::Debug for SchedulingQueries {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedulingQueries")
            .field("client", &self.client)
            .finish_non_exhaustive()
    }
}

impl SchedulingQueries {
    pub fn new(client: QueryClient, gateway: Arc<dyn DataGateway>) -> Self {
        Self { client, gateway }
    }

    pub fn query_client(&self) -> &QueryClient {
        &self.client
    }

    /// Client list for `filters`.
    pub fn clients(&self, filters: ClientFilters) -> QueryObserver<Vec<Client>> {
        let gateway = Arc::clone(&self.gateway);
        let key = CLIENTS.list(&filters);
        self.client.watch_query(
            key,
            move || {
                let gateway = Arc::clone(&gateway);
                let filters = filters.clone();
                async move { gateway.get_clients(&filters).await.map_err(QueryError::from) }
            },
            QueryOptions::default(),
        )
    }

    /// One client with appointments. Disabled until `id` is known.
    pub fn client(&self, id: Option<ClientId>) -> QueryObserver<ClientWithDetails> {
        let gateway = Arc::clone(&self.gateway);
        self.client.watch_query(
            CLIENTS.detail(id),
            move || {
                let gateway = Arc::clone(&gateway);
                async move {
                    match id {
                        Some(id) => gateway.get_client_by_id(id).await.map_err(QueryError::from),
                        None => Err(QueryError::validation("client id is required")),
                    }
                }
            },
            QueryOptions::new().enabled(id.is_some()),
        )
    }

    pub fn appointments(&self) -> QueryObserver<Vec<AppointmentWithDetails>> {
        let gateway = Arc::clone(&self.gateway);
        self.client.watch_query(
            APPOINTMENTS.lists(),
            move || {
                let gateway = Arc::clone(&gateway);
                async move { gateway.get_appointments().await.map_err(QueryError::from) }
            },
            QueryOptions::default(),
        )
    }

    /// One appointment. Disabled until `id` is known.
    pub fn appointment(&self, id: Option<AppointmentId>) -> QueryObserver<Appointment> {
        let gateway = Arc::clone(&self.gateway);
        self.client.watch_query(
            APPOINTMENTS.detail(id),
            move || {
                let gateway = Arc::clone(&gateway);
                async move {
                    match id {
                        Some(id) => gateway
                            .get_appointment_by_id(id)
                            .await
                            .map_err(QueryError::from),
                        None => Err(QueryError::validation("appointment id is required")),
                    }
                }
            },
            QueryOptions::new().enabled(id.is_some()),
        )
    }

    /// Books appointments for `practitioner_id`.
    ///
    /// Invalid input is rejected before anything is sent. Valid input shows
    /// up at once in the cached client detail as a scheduled row; the
    /// appointment lists and that client's detail are refreshed once the
    /// backend confirms.
    pub fn create_appointment(
        &self,
        practitioner_id: PractitionerId,
    ) -> Mutation<NewAppointment, Appointment> {
        let gateway = Arc::clone(&self.gateway);
        let options = MutationOptions::new(move |input: NewAppointment| {
            let gateway = Arc::clone(&gateway);
            async move {
                if let Err(err) = input.validate() {
                    return Err(validation_error(err));
                }
                gateway
                    .create_appointment(&input)
                    .await
                    .map_err(QueryError::from)
            }
        })
        .optimistic_with(
            |input: &NewAppointment| CLIENTS.detail(input.client_id),
            move |details: Option<ClientWithDetails>, input: &NewAppointment| {
                let mut details = details?;
                input.validate().ok()?;
                details
                    .appointments
                    .push(input.to_pending(practitioner_id, Utc::now()));
                Some(details)
            },
        )
        .invalidates(APPOINTMENTS.all())
        .invalidates_with(|input: &NewAppointment| CLIENTS.detail(input.client_id));

        self.client.mutation(options)
    }

    /// Warms the detail entry for `id`.
    pub async fn prefetch_client(&self, id: ClientId) {
        let gateway = Arc::clone(&self.gateway);
        self.client
            .prefetch_query(
                CLIENTS.detail(id),
                move || {
                    let gateway = Arc::clone(&gateway);
                    async move { gateway.get_client_by_id(id).await.map_err(QueryError::from) }
                },
                None,
            )
            .await;
    }

    pub async fn prefetch_appointments(&self) {
        let gateway = Arc::clone(&self.gateway);
        self.client
            .prefetch_query(
                APPOINTMENTS.lists(),
                move || {
                    let gateway = Arc::clone(&gateway);
                    async move { gateway.get_appointments().await.map_err(QueryError::from) }
                },
                None,
            )
            .await;
    }
}

fn validation_error(err: TypesError) -> QueryError {
    match err {
        TypesError::Validation { message, .. } => QueryError::validation(message),
        other => QueryError::validation(other.to_string()),
    }
}
