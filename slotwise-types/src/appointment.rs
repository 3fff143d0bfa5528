use crate::ids::{AppointmentId, ClientId, PractitionerId};
use crate::{Result, TypesError};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Longest appointment the booking form accepts.
pub const MAX_APPOINTMENT_HOURS: i64 = 12;

/// Where an appointment stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Scheduled,
    Confirmed,
    Completed,
    Cancelled,
    NoShow,
}

impl AppointmentStatus {
    /// Scheduled and confirmed appointments still occupy the calendar.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Scheduled | Self::Confirmed)
    }
}

/// A row of the `appointments` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: AppointmentId,
    pub client_id: ClientId,
    pub practitioner_id: PractitionerId,
    pub title: String,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub status: AppointmentStatus,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Appointment {
    /// Scheduled length of the appointment.
    pub fn duration(&self) -> Duration {
        self.ends_at - self.starts_at
    }

    /// Returns true if the two appointments overlap in time.
    pub fn overlaps(&self, other: &Appointment) -> bool {
        self.starts_at < other.ends_at && other.starts_at < self.ends_at
    }
}

/// The client columns embedded in an appointment list row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientSummary {
    pub id: ClientId,
    pub first_name: String,
    pub last_name: String,
}

/// An appointment together with the client it is booked for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppointmentWithDetails {
    #[serde(flatten)]
    pub appointment: Appointment,
    pub client: ClientSummary,
}

/// Input for booking an appointment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAppointment {
    pub client_id: ClientId,
    pub title: String,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl NewAppointment {
    /// Checks the input before it is sent to the backend.
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(TypesError::validation("title", "title is required"));
        }
        if self.ends_at <= self.starts_at {
            return Err(TypesError::validation(
                "ends_at",
                "appointment must end after it starts",
            ));
        }
        if self.ends_at - self.starts_at > Duration::hours(MAX_APPOINTMENT_HOURS) {
            return Err(TypesError::validation(
                "ends_at",
                format!("appointment cannot be longer than {MAX_APPOINTMENT_HOURS} hours"),
            ));
        }
        Ok(())
    }

    /// Builds the row the device shows before the backend confirms the
    /// insert. The id is provisional.
    pub fn to_pending(&self, practitioner_id: PractitionerId, now: DateTime<Utc>) -> Appointment {
        Appointment {
            id: AppointmentId::new(),
            client_id: self.client_id,
            practitioner_id,
            title: self.title.trim().to_string(),
            starts_at: self.starts_at,
            ends_at: self.ends_at,
            status: AppointmentStatus::Scheduled,
            location: self.location.clone(),
            notes: self.notes.clone(),
            created_at: now,
        }
    }
}
