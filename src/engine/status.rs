//! Progress event broadcasting.
//!
//! Many producers (registry, coordinator, workers) publish to one bounded
//! broadcast channel; observers subscribe independently. Delivery is
//! best-effort: a lagged observer loses the oldest events rather than
//! slowing producers down.

use crate::constants::defaults::STATUS_BUS_CAPACITY;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Events observers can watch for. Serializable so a push channel can
/// forward them verbatim.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StatusEvent {
    DeviceOnline {
        serial: String,
    },
    DeviceOffline {
        serial: String,
    },
    JobStarted {
        total_accounts: usize,
        devices: Vec<String>,
    },
    AccountClaimed {
        serial: String,
        filename: String,
    },
    AccountCompleted {
        serial: String,
        filename: String,
        success: bool,
        #[serde(default)]
        error: Option<String>,
    },
    JobCompleted {
        processed: usize,
        succeeded: usize,
        failed: usize,
    },
}

/// Cloneable handle to the broadcast channel.
#[derive(Debug, Clone)]
pub struct StatusBus {
    tx: broadcast::Sender<StatusEvent>,
}

impl StatusBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(STATUS_BUS_CAPACITY);
        Self { tx }
    }

    /// Publishes an event. A send with no observers is not an error.
    pub fn publish(&self, event: StatusEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.tx.subscribe()
    }
}

impl Default for StatusBus {
    fn default() -> Self {
        Self::new()
    }
}
