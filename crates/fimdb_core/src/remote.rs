//! Reconciliation handle for the remote synchronization layer.
//!
//! The transport that exchanges row deltas with the manager lives outside
//! this crate. The database only records how often it should run and where
//! its messages go.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Host-supplied sink for synchronization messages: `(component, message)`.
pub type SyncCallback = Arc<dyn Fn(&str, &str) + Send + Sync>;

/// Interval and message sink of remote synchronization.
#[derive(Clone)]
pub struct RemoteSync {
    interval: Duration,
    callback: Option<SyncCallback>,
}

impl RemoteSync {
    /// Component name passed to the sync callback.
    pub const COMPONENT: &'static str = "fim";

    /// Creates the handle.
    #[must_use]
    pub fn new(interval: Duration, callback: Option<SyncCallback>) -> Self {
        Self { interval, callback }
    }

    /// Time between synchronization rounds.
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Whether a round is due, given when the last one started.
    #[must_use]
    pub fn is_due(&self, last: Instant) -> bool {
        last.elapsed() >= self.interval
    }

    /// Hands `message` to the sync callback. Returns `false` if none is set.
    pub fn send(&self, message: &str) -> bool {
        match &self.callback {
            Some(callback) => {
                callback(Self::COMPONENT, message);
                true
            }
            None => false,
        }
    }
}

impl fmt::Debug for RemoteSync {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteSync")
            .field("interval", &self.interval)
            .field("callback", &self.callback.is_some())
            .finish()
    }
}
