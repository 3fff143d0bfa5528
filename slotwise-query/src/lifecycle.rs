//! Foreground resume.

use crate::client::QueryClient;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

/// Application visibility as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppState {
    #[default]
    Active,
    Background,
    Inactive,
}

/// Refetches stale entries whenever the app returns to the foreground.
#[derive(Debug)]
pub struct LifecycleMonitor {
    client: QueryClient,
    current: AppState,
}

impl LifecycleMonitor {
    /// Starts in [`AppState::Active`].
    pub fn new(client: QueryClient) -> Self {
        Self {
            client,
            current: AppState::Active,
        }
    }

    pub fn current(&self) -> AppState {
        self.current
    }

    /// Records a transition. Returns the number of refetches started when
    /// the app came back to the foreground.
    pub fn apply(&mut self, next: AppState) -> Option<usize> {
        let previous = std::mem::replace(&mut self.current, next);
        if next != AppState::Active || previous == AppState::Active {
            return None;
        }
        debug!("App returned to foreground from {:?}", previous);
        Some(self.client.refetch_stale())
    }

    /// Drives the monitor from a state channel until the sender is gone.
    pub fn spawn(mut self, mut states: watch::Receiver<AppState>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let initial = *states.borrow_and_update();
            self.apply(initial);
            while states.changed().await.is_ok() {
                let next = *states.borrow_and_update();
                self.apply(next);
            }
        })
    }
}
