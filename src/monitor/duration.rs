//! One-shot "open too long" alert.

use crate::state::MonitoringState;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Mark the long-open alert as fired if the current episode crossed
/// `max_open`. Returns `true` exactly once per episode.
pub fn check_open_duration(
    state: &mut MonitoringState,
    now: DateTime<Utc>,
    max_open: Duration,
) -> bool {
    let Some(opened_at) = state.first_reported_open_time else {
        return false;
    };
    if state.alert_notified {
        return false;
    }

    // A clock step backwards yields a negative delta; treat it as not elapsed.
    let Ok(elapsed) = (now - opened_at).to_std() else {
        return false;
    };
    if elapsed < max_open {
        return false;
    }

    state.alert_notified = true;
    true
}

pub fn open_too_long_message(max_open: Duration) -> String {
    format!("Door opened for longer than {}", format_duration(max_open))
}

/// Compact `1h2m3s` rendering; zero components are omitted.
pub fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    let (hours, minutes, seconds) = (total / 3600, total % 3600 / 60, total % 60);

    let mut out = String::new();
    if hours > 0 {
        out.push_str(&format!("{hours}h"));
    }
    if minutes > 0 {
        out.push_str(&format!("{minutes}m"));
    }
    if seconds > 0 || out.is_empty() {
        out.push_str(&format!("{seconds}s"));
    }
    out
}
