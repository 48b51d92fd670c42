//! Door status transition bookkeeping.
//!
//! ```text
//! CLOSED --(OPEN)--> open episode starts: stamp open time, notify if armed
//! OPEN --(CLOSED)--> open episode ends: clear open time and alert flag
//! UNKNOWN reading  --> no change at all
//! ```

use crate::sensor::DoorStatus;
use crate::state::MonitoringState;
use chrono::{DateTime, Utc};

/// Edge detected by [`apply_reading`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// CLOSED to OPEN; a new open episode started.
    Opened,
    /// OPEN to CLOSED; the open episode ended.
    Closed,
    Unchanged,
}

/// Fold one sensor reading into the record.
///
/// UNKNOWN readings leave the record untouched, so a single bad sample can
/// neither start nor end an episode nor hide the status it interrupted.
pub fn apply_reading(
    state: &mut MonitoringState,
    reading: DoorStatus,
    now: DateTime<Utc>,
) -> Transition {
    if reading == DoorStatus::Unknown {
        return Transition::Unchanged;
    }

    let transition = match (state.last_known_status, reading) {
        (DoorStatus::Closed, DoorStatus::Open) => {
            state.first_reported_open_time = Some(now);
            Transition::Opened
        }
        (DoorStatus::Open, DoorStatus::Closed) => {
            state.first_reported_open_time = None;
            state.alert_notified = false;
            Transition::Closed
        }
        _ => Transition::Unchanged,
    };

    state.last_known_status = reading;
    transition
}

/// Text of the immediate state-change alert.
pub fn state_changed_message(status: DoorStatus) -> String {
    format!("Door is {}", status)
}
