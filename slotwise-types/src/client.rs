use crate::appointment::Appointment;
use crate::ids::{ClientId, PractitionerId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of a client record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientStatus {
    Active,
    Inactive,
    Archived,
}

impl ClientStatus {
    /// The column value stored by the backend.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Archived => "archived",
        }
    }
}

/// A row of the `clients` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Client {
    pub id: ClientId,
    pub practitioner_id: PractitionerId,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    pub status: ClientStatus,
    #[serde(default)]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Client {
    /// First and last name joined for display.
    pub fn full_name(&self) -> String {
        match (self.first_name.trim(), self.last_name.trim()) {
            (first, "") => first.to_string(),
            ("", last) => last.to_string(),
            (first, last) => format!("{first} {last}"),
        }
    }
}

/// A client together with its appointments, as returned by the detail read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientWithDetails {
    #[serde(flatten)]
    pub client: Client,
    #[serde(default)]
    pub appointments: Vec<Appointment>,
}

impl ClientWithDetails {
    /// Appointments starting at or after `now` that are still on the books,
    /// soonest first.
    pub fn upcoming(&self, now: DateTime<Utc>) -> Vec<&Appointment> {
        let mut upcoming: Vec<&Appointment> = self
            .appointments
            .iter()
            .filter(|a| a.starts_at >= now && a.status.is_open())
            .collect();
        upcoming.sort_by_key(|a| a.starts_at);
        upcoming
    }
}

/// Filters for the client list.
///
/// Also used verbatim as a query-key segment, so two equal filter values
/// address the same cached list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientFilters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ClientStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
}

impl ClientFilters {
    /// Filters matching only clients with `status`.
    pub fn with_status(status: ClientStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    /// The trimmed search term, if it is not blank.
    pub fn search_term(&self) -> Option<&str> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Returns true when no filter narrows the list.
    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.search_term().is_none()
    }
}
