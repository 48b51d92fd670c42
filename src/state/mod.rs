//! The persisted monitoring record.
//!
//! A single [`MonitoringState`] per deployment holds the last known door
//! status, the armed flag and the open-episode bookkeeping. [`StateStore`]
//! loads and saves it; serialization of read-modify-write cycles is the
//! caller's job (see [`crate::monitor::Monitor`]).

mod store;

pub use store::StateStore;

use crate::sensor::DoorStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MonitoringState {
    pub last_known_status: DoorStatus,
    pub armed: bool,
    /// Set while the door is in an open episode.
    pub first_reported_open_time: Option<DateTime<Utc>>,
    /// The long-open alert already fired for the current episode.
    pub alert_notified: bool,
}

impl MonitoringState {
    /// Whether the door is currently in an open episode.
    pub fn in_open_episode(&self) -> bool {
        self.first_reported_open_time.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_value() {
        let state = MonitoringState::default();
        assert_eq!(state.last_known_status, DoorStatus::Unknown);
        assert!(!state.armed);
        assert!(state.first_reported_open_time.is_none());
        assert!(!state.alert_notified);
        assert!(!state.in_open_episode());
    }

    #[test]
    fn test_record_field_names() {
        let opened = "2024-03-01T12:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let state = MonitoringState {
            last_known_status: DoorStatus::Open,
            armed: true,
            first_reported_open_time: Some(opened),
            alert_notified: false,
        };
        let value = serde_json::to_value(&state).unwrap();
        assert_eq!(value["lastKnownStatus"], "OPEN");
        assert_eq!(value["armed"], true);
        assert_eq!(value["firstReportedOpenTime"], "2024-03-01T12:00:00Z");
        assert_eq!(value["alertNotified"], false);
    }

    #[test]
    fn test_partial_record_fills_defaults() {
        let state: MonitoringState =
            serde_json::from_str(r#"{"lastKnownStatus":"CLOSED","armed":true}"#).unwrap();
        assert_eq!(state.last_known_status, DoorStatus::Closed);
        assert!(state.armed);
        assert!(!state.in_open_episode());
    }
}
