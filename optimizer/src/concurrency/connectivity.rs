//! Global connectivity state shared by every worker.
//!
//! The state starts as `Waiting/ApplicationNotInitialized`. Workers that hit a connectivity error
//! report the unavailable database, the orchestrator probes it and restores `Normal/NoReason`.
//! Only the orchestrator clears `ApplicationNotInitialized`.

use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{info, warn};

use crate::types::Database;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityStatus {
    Normal,
    Waiting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitingReason {
    NoReason,
    ApplicationNotInitialized,
    AdapterDatabaseNotAvailable,
    OptimizerDatabaseNotAvailable,
}

impl WaitingReason {
    pub fn unavailable(database: Database) -> WaitingReason {
        match database {
            Database::Adapter => WaitingReason::AdapterDatabaseNotAvailable,
            Database::Optimizer => WaitingReason::OptimizerDatabaseNotAvailable,
        }
    }

    /// Returns the database this reason waits for, if any.
    pub fn database(&self) -> Option<Database> {
        match self {
            WaitingReason::AdapterDatabaseNotAvailable => Some(Database::Adapter),
            WaitingReason::OptimizerDatabaseNotAvailable => Some(Database::Optimizer),
            WaitingReason::NoReason | WaitingReason::ApplicationNotInitialized => None,
        }
    }
}

/// Current status and the reason for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectivityState {
    pub status: ConnectivityStatus,
    pub reason: WaitingReason,
}

impl ConnectivityState {
    pub const NOT_INITIALIZED: ConnectivityState = ConnectivityState {
        status: ConnectivityStatus::Waiting,
        reason: WaitingReason::ApplicationNotInitialized,
    };

    pub const NORMAL: ConnectivityState = ConnectivityState {
        status: ConnectivityStatus::Normal,
        reason: WaitingReason::NoReason,
    };

    pub fn waiting_for(database: Database) -> ConnectivityState {
        ConnectivityState {
            status: ConnectivityStatus::Waiting,
            reason: WaitingReason::unavailable(database),
        }
    }

    pub fn is_waiting(&self) -> bool {
        self.status == ConnectivityStatus::Waiting
    }
}

impl fmt::Display for ConnectivityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}/{:?}", self.status, self.reason)
    }
}

/// Handle to the connectivity state, shared by cloning.
#[derive(Debug, Clone)]
pub struct ConnectivityMonitor {
    tx: Arc<watch::Sender<ConnectivityState>>,
}

impl ConnectivityMonitor {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(ConnectivityState::NOT_INITIALIZED);

        Self { tx: Arc::new(tx) }
    }

    pub fn current(&self) -> ConnectivityState {
        *self.tx.borrow()
    }

    /// Switches to `Waiting` for `database`.
    ///
    /// Ignored while the application is not initialized. Returns whether the state changed.
    pub fn report_unavailable(&self, database: Database, reporter: &str) -> bool {
        let next = ConnectivityState::waiting_for(database);

        let changed = self.tx.send_if_modified(|state| {
            if state.reason == WaitingReason::ApplicationNotInitialized || *state == next {
                return false;
            }

            *state = next;
            true
        });

        if changed {
            warn!(reporter, state = %next, "connectivity lost, workers are pausing");
        }

        changed
    }

    /// Switches to `Normal/NoReason`. Reserved to the orchestrator.
    pub fn set_normal(&self) {
        let previous = self.tx.send_replace(ConnectivityState::NORMAL);
        if previous != ConnectivityState::NORMAL {
            info!(previous = %previous, "connectivity state is normal, workers are resuming");
        }
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new()
    }
}
