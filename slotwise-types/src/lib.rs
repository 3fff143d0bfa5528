//! Core type definitions for Slotwise.
//!
//! This crate defines the rows the scheduling app reads from and writes to
//! the hosted backend:
//! - Identifiers for clients, appointments and practitioners (UUID)
//! - [`Client`] and [`ClientWithDetails`] rows
//! - [`Appointment`] and [`AppointmentWithDetails`] rows
//! - [`ClientFilters`] and [`NewAppointment`] request inputs
//!
//! Everything serializes to the backend's snake_case column names so rows
//! can travel through the gateway and the query cache unchanged.

mod appointment;
mod client;
mod ids;

pub use appointment::{
    Appointment, AppointmentStatus, AppointmentWithDetails, ClientSummary, NewAppointment,
    MAX_APPOINTMENT_HOURS,
};
pub use client::{Client, ClientFilters, ClientStatus, ClientWithDetails};
pub use ids::{AppointmentId, ClientId, PractitionerId};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, TypesError>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum TypesError {
    #[error("invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),

    #[error("{field}: {message}")]
    Validation { field: &'static str, message: String },
}

impl TypesError {
    pub(crate) fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }

    /// Returns true for input rejected before it was submitted.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }
}
