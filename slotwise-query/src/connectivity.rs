//! Connectivity-driven resynchronization.

use crate::client::QueryClient;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Reachability as reported by the platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectivitySnapshot {
    pub is_connected: bool,
    /// `None` while the platform has not determined reachability yet.
    #[serde(default)]
    pub is_internet_reachable: Option<bool>,
    #[serde(rename = "type", default)]
    pub connection_type: String,
    #[serde(default)]
    pub details: Value,
}

impl ConnectivitySnapshot {
    /// A connected snapshot of the given type.
    pub fn online(connection_type: impl Into<String>) -> Self {
        Self {
            is_connected: true,
            is_internet_reachable: Some(true),
            connection_type: connection_type.into(),
            details: Value::Null,
        }
    }

    pub fn offline() -> Self {
        Self {
            is_connected: false,
            is_internet_reachable: Some(false),
            connection_type: "none".to_string(),
            details: Value::Null,
        }
    }

    /// Connected, and not known to be unreachable.
    pub fn is_online(&self) -> bool {
        self.is_connected && self.is_internet_reachable != Some(false)
    }
}

impl Default for ConnectivitySnapshot {
    fn default() -> Self {
        Self::online("unknown")
    }
}

/// Work started when connectivity came back.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResyncReport {
    pub refetched: usize,
    /// Paused mutations handed to the background resume.
    pub queued_mutations: usize,
}

/// Watches connectivity transitions and resynchronizes the cache.
#[derive(Debug)]
pub struct ConnectivityMonitor {
    client: QueryClient,
    was_offline: bool,
    resuming: Option<JoinHandle<usize>>,
}

impl ConnectivityMonitor {
    pub fn new(client: QueryClient) -> Self {
        Self {
            client,
            was_offline: false,
            resuming: None,
        }
    }

    pub fn was_offline(&self) -> bool {
        self.was_offline
    }

    /// Feeds one snapshot.
    ///
    /// Going offline marks the client offline so network-gated mutations
    /// queue. Coming back refetches stale entries and starts resuming queued
    /// mutations in call order on a separate task, so later snapshots are
    /// seen while they run. Only the reconnect returns a report.
    pub async fn apply(&mut self, snapshot: &ConnectivitySnapshot) -> Option<ResyncReport> {
        let online = snapshot.is_online();
        if !online {
            if !self.was_offline {
                info!("Connectivity lost ({})", snapshot.connection_type);
            }
            self.was_offline = true;
            self.client.set_online(false);
            return None;
        }
        if !self.was_offline {
            return None;
        }

        info!("Connectivity restored ({}); resynchronizing", snapshot.connection_type);
        self.client.set_online(true);
        let refetched = self.client.refetch_stale();
        let queued_mutations = self.client.paused_mutation_count();
        self.was_offline = false;
        if queued_mutations > 0 {
            let client = self.client.clone();
            // An earlier resume keeps draining; the client runs them in turn.
            self.resuming = Some(tokio::spawn(async move {
                client.resume_paused_mutations().await
            }));
        }

        let report = ResyncReport {
            refetched,
            queued_mutations,
        };
        debug!("Resync started: {:?}", report);
        Some(report)
    }

    /// Waits for the most recent background resume and returns how many
    /// mutations it released.
    pub async fn resumed(&mut self) -> usize {
        let Some(handle) = self.resuming.take() else {
            return 0;
        };
        match handle.await {
            Ok(resumed) => resumed,
            Err(e) => {
                warn!("Resuming paused mutations failed: {}", e);
                0
            }
        }
    }

    /// Drives the monitor from a snapshot channel until the sender is gone.
    pub fn spawn(mut self, mut snapshots: watch::Receiver<ConnectivitySnapshot>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let initial = snapshots.borrow_and_update().clone();
            self.apply(&initial).await;
            while snapshots.changed().await.is_ok() {
                let snapshot = snapshots.borrow_and_update().clone();
                self.apply(&snapshot).await;
            }
            debug!("Connectivity stream closed");
        })
    }
}
