//! The backend as the rest of the app sees it.

use crate::error::GatewayResult;
use async_trait::async_trait;
use slotwise_types::{
    Appointment, AppointmentId, AppointmentWithDetails, Client, ClientFilters, ClientId,
    ClientWithDetails, NewAppointment,
};

/// Typed reads and writes against the hosted backend.
#[async_trait]
pub trait DataGateway: Send + Sync {
    /// Clients matching `filters`, ordered by name.
    async fn get_clients(&self, filters: &ClientFilters) -> GatewayResult<Vec<Client>>;

    /// One client with its appointments.
    async fn get_client_by_id(&self, id: ClientId) -> GatewayResult<ClientWithDetails>;

    /// Every appointment with its client, soonest first.
    async fn get_appointments(&self) -> GatewayResult<Vec<AppointmentWithDetails>>;

    async fn get_appointment_by_id(&self, id: AppointmentId) -> GatewayResult<Appointment>;

    /// Books an appointment and returns the stored row.
    async fn create_appointment(&self, data: &NewAppointment) -> GatewayResult<Appointment>;
}
