//! Attendance recording — turns resolved matches into durable,
//! timestamped events through an injected store capability.

use crate::policy::MatchOutcome;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;

/// Status stamped on events when the caller supplies none.
pub const DEFAULT_STATUS: &str = "check-in";

/// Attendance store failure. Recoverable by the caller (retry with backoff
/// is appropriate); never aborts resolution of other faces.
#[derive(Error, Debug)]
pub enum RecordError {
    #[error("attendance store timed out")]
    Timeout,
    #[error("attendance store rejected event: {0}")]
    Rejected(String),
    #[error("attendance store unavailable: {0}")]
    Unavailable(String),
}

/// A durable record that an identity was recognized at a given time.
/// Immutable once written; owned by the external store thereafter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceEvent {
    pub event_id: String,
    pub employee_id: i64,
    pub timestamp: DateTime<Utc>,
    pub status: String,
}

/// Time source, injected so tests can pin the clock.
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Write side of the persistent attendance store. Implementations live
/// outside the core.
pub trait AttendanceStore {
    fn insert(&self, event: &AttendanceEvent) -> Result<(), RecordError>;
}

#[derive(Debug, Clone)]
pub struct RecorderConfig {
    /// Status used when the caller does not supply one.
    pub default_status: String,
    /// When set, a second event for the same identity inside the window is
    /// suppressed. The default (`None`) records every resolved match,
    /// consecutive-frame duplicates included.
    pub dedup_window: Option<Duration>,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            default_status: DEFAULT_STATUS.to_string(),
            dedup_window: None,
        }
    }
}

/// Converts resolved matches into attendance events and hands them to the
/// store. One write attempt per resolved match per invocation; retries are
/// the caller's decision.
pub struct AttendanceRecorder<S, C> {
    store: S,
    clock: C,
    config: RecorderConfig,
    /// Identity -> timestamp of the last successful write. Consulted only
    /// when a dedup window is configured.
    last_recorded: Mutex<HashMap<i64, DateTime<Utc>>>,
}

impl<S: AttendanceStore, C: Clock> AttendanceRecorder<S, C> {
    pub fn new(store: S, clock: C, config: RecorderConfig) -> Self {
        Self {
            store,
            clock,
            config,
            last_recorded: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Record one resolved outcome.
    ///
    /// `NoMatch` is a no-op returning `Ok(None)`. A suppressed duplicate
    /// (dedup window configured, same identity inside the window) also
    /// returns `Ok(None)` without touching the store.
    pub fn record(
        &self,
        outcome: &MatchOutcome,
        status: Option<&str>,
    ) -> Result<Option<AttendanceEvent>, RecordError> {
        let MatchOutcome::Matched {
            identity,
            best_distance,
        } = outcome
        else {
            return Ok(None);
        };

        let now = self.clock.now();

        if let Some(window) = self.config.dedup_window {
            let window = chrono::Duration::from_std(window).unwrap_or(chrono::Duration::MAX);
            let last = self
                .last_recorded
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if let Some(previous) = last.get(&identity.id) {
                if now.signed_duration_since(*previous) < window {
                    tracing::debug!(
                        employee = identity.id,
                        name = %identity.name,
                        "suppressing duplicate inside dedup window"
                    );
                    return Ok(None);
                }
            }
        }

        let event = AttendanceEvent {
            event_id: uuid::Uuid::new_v4().to_string(),
            employee_id: identity.id,
            timestamp: now,
            status: status.unwrap_or(&self.config.default_status).to_string(),
        };

        self.store.insert(&event)?;

        if self.config.dedup_window.is_some() {
            self.last_recorded
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(identity.id, now);
        }

        tracing::info!(
            employee = identity.id,
            name = %identity.name,
            distance = best_distance,
            status = %event.status,
            "attendance recorded"
        );
        Ok(Some(event))
    }
}
