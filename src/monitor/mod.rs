//! The monitoring core.
//!
//! [`Monitor`] is the single owner of the persisted record. Both periodic
//! engines and every arm/disarm request run their load-modify-save cycle
//! under one mutex, so no writer can clobber another writer's field with a
//! stale snapshot. Nothing awaits while the lock is held; notifications are
//! dispatched fire-and-forget.

pub mod duration;
pub mod scheduler;
pub mod transition;

pub use scheduler::spawn_engines;
pub use transition::Transition;

use crate::config::MonitorConfig;
use crate::error::Result;
use crate::notify::Notifier;
use crate::sensor::{DoorStatus, SensorReader};
use crate::state::{MonitoringState, StateStore};
use chrono::{DateTime, Utc};
use log::{debug, error, info};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

const EVENT_CHANNEL_CAPACITY: usize = 16;

/// Change pushed to status subscribers.
///
/// Serializes as `{"type":"status","value":"OPEN"}` or
/// `{"type":"armed","value":true}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum StatusEvent {
    Status(DoorStatus),
    Armed(bool),
}

struct Core {
    store: StateStore,
    sensor: SensorReader,
}

pub struct Monitor {
    core: Mutex<Core>,
    notifier: Arc<dyn Notifier>,
    max_open: Duration,
    events: broadcast::Sender<StatusEvent>,
}

impl Monitor {
    /// Build the monitor. On the very first start (no record on disk) the
    /// record is created with `armed` taken from the configured default.
    pub fn new(config: &MonitorConfig, sensor: SensorReader, notifier: Arc<dyn Notifier>) -> Self {
        let store = StateStore::new(&config.state_file);
        if !store.exists() {
            let initial = MonitoringState {
                armed: config.armed_default,
                ..Default::default()
            };
            match store.save(&initial) {
                Ok(()) => info!("[Monitor] Created state record at {:?}", store.path()),
                Err(e) => error!("[Monitor] {}", e),
            }
        }

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            core: Mutex::new(Core { store, sensor }),
            notifier,
            max_open: config.max_open_duration(),
            events,
        }
    }

    pub fn max_open_duration(&self) -> Duration {
        self.max_open
    }

    /// Run one transition engine tick.
    pub fn transition_tick(&self) -> Transition {
        self.transition_tick_at(Utc::now())
    }

    pub fn transition_tick_at(&self, now: DateTime<Utc>) -> Transition {
        let mut core = self.core.lock();
        let mut state = core.store.load();
        let reading = core.sensor.read();
        let before = state.clone();

        let transition = transition::apply_reading(&mut state, reading, now);
        match transition {
            Transition::Opened => {
                info!("[Monitor] State changed, current state: {}", reading);
                if state.armed {
                    self.notifier
                        .send(&transition::state_changed_message(reading));
                }
            }
            Transition::Closed => info!("[Monitor] State changed, current state: {}", reading),
            Transition::Unchanged => debug!("[Monitor] Sensor reading: {}", reading),
        }

        if state != before {
            save_or_log(&core.store, &state);
        }
        if state.last_known_status != before.last_known_status {
            self.publish(StatusEvent::Status(state.last_known_status));
        }
        transition
    }

    /// Run one duration alert engine tick. Returns `true` when the long-open
    /// alert was dispatched.
    ///
    /// The alert is not gated on `armed`.
    pub fn duration_tick(&self) -> bool {
        self.duration_tick_at(Utc::now())
    }

    pub fn duration_tick_at(&self, now: DateTime<Utc>) -> bool {
        let core = self.core.lock();
        let mut state = core.store.load();
        if !duration::check_open_duration(&mut state, now, self.max_open) {
            return false;
        }

        let message = duration::open_too_long_message(self.max_open);
        info!("[Monitor] {}", message);
        self.notifier.send(&message);
        save_or_log(&core.store, &state);
        true
    }

    /// Arm or disarm state-change notifications.
    ///
    /// The event is published before the lock is released, so subscribers
    /// see armed events in the order the record was written.
    pub fn set_armed(&self, armed: bool) -> Result<()> {
        let core = self.core.lock();
        let mut state = core.store.load();
        state.armed = armed;
        core.store.save(&state)?;
        info!(
            "[Monitor] Monitoring {}",
            if armed { "armed" } else { "disarmed" }
        );
        self.publish(StatusEvent::Armed(armed));
        Ok(())
    }

    pub fn current_status(&self) -> DoorStatus {
        self.snapshot().last_known_status
    }

    pub fn snapshot(&self) -> MonitoringState {
        self.core.lock().store.load()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.events.subscribe()
    }

    pub fn is_simulated(&self) -> bool {
        self.core.lock().sensor.is_simulated()
    }

    /// Release the sensor hardware handle.
    pub fn shutdown(&self) {
        self.core.lock().sensor.close();
    }

    fn publish(&self, event: StatusEvent) {
        // No subscribers is not an error.
        let _ = self.events.send(event);
    }
}

fn save_or_log(store: &StateStore, state: &MonitoringState) {
    if let Err(e) = store.save(state) {
        error!("[Monitor] {}", e);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::notify::testing::RecordingNotifier;
    use crate::sensor::DigitalInput;
    use std::collections::VecDeque;
    use std::io;
    use std::path::Path;

    /// Hardware input fed from a shared queue. An empty queue reads as an
    /// I/O error, i.e. UNKNOWN.
    #[derive(Clone, Default)]
    pub(crate) struct ScriptedInput {
        levels: Arc<Mutex<VecDeque<u8>>>,
        last: Arc<Mutex<Option<u8>>>,
    }

    impl ScriptedInput {
        pub(crate) fn push(&self, levels: &[u8]) {
            self.levels.lock().extend(levels.iter().copied());
        }

        pub(crate) fn last_read(&self) -> Option<u8> {
            *self.last.lock()
        }
    }

    impl DigitalInput for ScriptedInput {
        fn read(&mut self) -> io::Result<u8> {
            let level = self
                .levels
                .lock()
                .pop_front()
                .ok_or_else(|| io::Error::other("no scripted level"))?;
            *self.last.lock() = Some(level);
            Ok(level)
        }
    }

    const CLOSED: u8 = 0;
    const OPEN: u8 = 1;
    const BAD: u8 = 9;

    pub(crate) fn test_config(dir: &Path, max_open_secs: u64) -> MonitorConfig {
        MonitorConfig {
            status_interval_secs: 1,
            max_open_secs,
            armed_default: false,
            state_file: dir.join("state.json"),
        }
    }

    fn build(
        dir: &Path,
        max_open_secs: u64,
    ) -> (Monitor, ScriptedInput, Arc<RecordingNotifier>) {
        let input = ScriptedInput::default();
        let notifier = Arc::new(RecordingNotifier::default());
        let monitor = Monitor::new(
            &test_config(dir, max_open_secs),
            SensorReader::Hardware(Box::new(input.clone())),
            notifier.clone(),
        );
        (monitor, input, notifier)
    }

    fn at(start: DateTime<Utc>, secs: i64) -> DateTime<Utc> {
        start + chrono::Duration::seconds(secs)
    }

    #[test]
    fn test_first_start_seeds_armed_default() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path(), 5);
        config.armed_default = true;

        let monitor = Monitor::new(
            &config,
            SensorReader::simulated_with_seed(1),
            Arc::new(RecordingNotifier::default()),
        );
        let state = monitor.snapshot();
        assert!(state.armed);
        assert_eq!(state.last_known_status, DoorStatus::Unknown);
        assert!(monitor.is_simulated());
    }

    #[test]
    fn test_existing_record_wins_over_armed_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path(), 5);
        StateStore::new(&config.state_file)
            .save(&MonitoringState {
                armed: true,
                last_known_status: DoorStatus::Closed,
                ..Default::default()
            })
            .unwrap();

        let (monitor, _, _) = build(dir.path(), 5);
        assert!(monitor.snapshot().armed);
        assert_eq!(monitor.current_status(), DoorStatus::Closed);
    }

    #[test]
    fn test_open_notifies_only_when_armed() {
        let dir = tempfile::tempdir().unwrap();
        let (monitor, input, notifier) = build(dir.path(), 5);
        let start = Utc::now();

        // Disarmed episode: recorded, not notified.
        input.push(&[CLOSED, OPEN, CLOSED]);
        monitor.transition_tick_at(at(start, 0));
        assert_eq!(monitor.transition_tick_at(at(start, 1)), Transition::Opened);
        assert_eq!(
            monitor.snapshot().first_reported_open_time,
            Some(at(start, 1))
        );
        assert_eq!(monitor.transition_tick_at(at(start, 2)), Transition::Closed);
        assert!(notifier.messages().is_empty());

        // Armed episode: notified once.
        monitor.set_armed(true).unwrap();
        input.push(&[OPEN, OPEN, OPEN]);
        for secs in 3..6 {
            monitor.transition_tick_at(at(start, secs));
        }
        assert_eq!(notifier.messages(), vec!["Door is OPEN".to_string()]);
    }

    #[test]
    fn test_seven_reading_scenario() {
        let dir = tempfile::tempdir().unwrap();
        let (monitor, input, notifier) = build(dir.path(), 5);
        monitor.set_armed(true).unwrap();
        let start = Utc::now();

        input.push(&[CLOSED, OPEN, OPEN, OPEN, OPEN, OPEN, OPEN]);
        let mut transitions = Vec::new();
        let mut alerts = Vec::new();
        for reading in 1..=7 {
            let now = at(start, reading - 1);
            transitions.push(monitor.transition_tick_at(now));
            alerts.push(monitor.duration_tick_at(now));
        }

        assert_eq!(transitions[1], Transition::Opened);
        assert_eq!(
            transitions
                .iter()
                .filter(|t| **t == Transition::Opened)
                .count(),
            1
        );
        // Opened at reading #2; the 5s threshold is first reached at #7.
        assert_eq!(alerts.iter().filter(|fired| **fired).count(), 1);
        assert!(alerts[6]);
        assert_eq!(notifier.count_containing("Door is OPEN"), 1);
        assert_eq!(notifier.count_containing("longer than 5s"), 1);
        assert!(monitor.snapshot().alert_notified);
    }

    #[test]
    fn test_unknown_reading_scenario() {
        let dir = tempfile::tempdir().unwrap();
        let (monitor, input, notifier) = build(dir.path(), 5);
        monitor.set_armed(true).unwrap();
        let start = Utc::now();

        input.push(&[CLOSED, OPEN]);
        monitor.transition_tick_at(at(start, 0));
        monitor.transition_tick_at(at(start, 1));
        let during_episode = monitor.snapshot();
        assert!(during_episode.in_open_episode());

        input.push(&[BAD]);
        assert_eq!(
            monitor.transition_tick_at(at(start, 2)),
            Transition::Unchanged
        );
        assert_eq!(monitor.snapshot(), during_episode);

        input.push(&[CLOSED]);
        assert_eq!(monitor.transition_tick_at(at(start, 3)), Transition::Closed);
        let after = monitor.snapshot();
        assert_eq!(after.last_known_status, DoorStatus::Closed);
        assert!(after.first_reported_open_time.is_none());
        assert!(!after.alert_notified);
        assert_eq!(notifier.messages(), vec!["Door is OPEN".to_string()]);
    }

    #[test]
    fn test_read_failure_preserves_state() {
        let dir = tempfile::tempdir().unwrap();
        let (monitor, input, _) = build(dir.path(), 5);
        input.push(&[CLOSED]);
        monitor.transition_tick();

        // Queue is empty: the hardware read fails.
        assert_eq!(monitor.transition_tick(), Transition::Unchanged);
        assert_eq!(monitor.current_status(), DoorStatus::Closed);
    }

    #[test]
    fn test_one_long_open_alert_per_episode() {
        let dir = tempfile::tempdir().unwrap();
        let (monitor, input, notifier) = build(dir.path(), 5);
        let start = Utc::now();

        input.push(&[CLOSED, OPEN]);
        monitor.transition_tick_at(at(start, 0));
        monitor.transition_tick_at(at(start, 1));

        let fired: Vec<bool> = (2..40)
            .map(|secs| monitor.duration_tick_at(at(start, secs)))
            .collect();
        assert_eq!(fired.iter().filter(|f| **f).count(), 1);

        // Disarmed throughout: the long-open alert is still sent.
        assert_eq!(notifier.count_containing("longer than"), 1);
        assert_eq!(notifier.count_containing("Door is OPEN"), 0);

        // Closing resets the flag; the next episode alerts again.
        input.push(&[CLOSED, OPEN]);
        monitor.transition_tick_at(at(start, 40));
        assert!(!monitor.snapshot().alert_notified);
        monitor.transition_tick_at(at(start, 41));
        assert!(!monitor.duration_tick_at(at(start, 42)));
        assert!(monitor.duration_tick_at(at(start, 46)));
        assert_eq!(notifier.count_containing("longer than"), 2);
    }

    #[test]
    fn test_set_armed_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let (monitor, _, _) = build(dir.path(), 5);

        monitor.set_armed(true).unwrap();
        let once = std::fs::read(dir.path().join("state.json")).unwrap();
        monitor.set_armed(true).unwrap();
        let twice = std::fs::read(dir.path().join("state.json")).unwrap();
        assert_eq!(once, twice);
        assert!(monitor.snapshot().armed);
    }

    #[test]
    fn test_events_are_published() {
        let dir = tempfile::tempdir().unwrap();
        let (monitor, input, _) = build(dir.path(), 5);
        let mut events = monitor.subscribe();

        monitor.set_armed(true).unwrap();
        input.push(&[CLOSED, CLOSED, OPEN]);
        monitor.transition_tick();
        monitor.transition_tick();
        monitor.transition_tick();

        assert_eq!(events.try_recv().unwrap(), StatusEvent::Armed(true));
        assert_eq!(
            events.try_recv().unwrap(),
            StatusEvent::Status(DoorStatus::Closed)
        );
        assert_eq!(
            events.try_recv().unwrap(),
            StatusEvent::Status(DoorStatus::Open)
        );
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn test_event_wire_format() {
        assert_eq!(
            serde_json::to_string(&StatusEvent::Status(DoorStatus::Open)).unwrap(),
            r#"{"type":"status","value":"OPEN"}"#
        );
        assert_eq!(
            serde_json::to_string(&StatusEvent::Armed(true)).unwrap(),
            r#"{"type":"armed","value":true}"#
        );
    }

    #[test]
    fn test_concurrent_arming_and_ticks_lose_no_update() {
        let dir = tempfile::tempdir().unwrap();
        let (monitor, input, _) = build(dir.path(), 5);
        let monitor = Arc::new(monitor);

        let levels: Vec<u8> = (0..400).map(|i| (i % 2) as u8).collect();
        input.push(&levels);

        let mut handles = Vec::new();
        for _ in 0..4 {
            let monitor = monitor.clone();
            handles.push(std::thread::spawn(move || {
                for _ in 0..100 {
                    monitor.transition_tick();
                    monitor.duration_tick();
                }
            }));
        }
        for _ in 0..4 {
            let monitor = monitor.clone();
            handles.push(std::thread::spawn(move || {
                for _ in 0..50 {
                    monitor.set_armed(true).unwrap();
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        let state = monitor.snapshot();
        assert!(state.armed, "a tick reverted the armed flag");
        assert_eq!(
            state.last_known_status,
            DoorStatus::from_bit(input.last_read().unwrap()),
            "an arming request reverted the door status"
        );
    }

    #[test]
    fn test_last_armed_event_matches_record() {
        use tokio::sync::broadcast::error::TryRecvError;

        let dir = tempfile::tempdir().unwrap();
        let (monitor, _, _) = build(dir.path(), 5);
        let monitor = Arc::new(monitor);

        for _ in 0..20 {
            let mut events = monitor.subscribe();
            let handles: Vec<_> = (0..4)
                .map(|t| {
                    let monitor = monitor.clone();
                    std::thread::spawn(move || {
                        for i in 0..25 {
                            monitor.set_armed((t + i) % 2 == 0).unwrap();
                        }
                    })
                })
                .collect();
            for handle in handles {
                handle.join().unwrap();
            }

            let mut last = None;
            loop {
                match events.try_recv() {
                    Ok(event) => last = Some(event),
                    Err(TryRecvError::Lagged(_)) => continue,
                    Err(_) => break,
                }
            }
            assert_eq!(last, Some(StatusEvent::Armed(monitor.snapshot().armed)));
        }
    }

    #[test]
    fn test_shutdown_releases_sensor() {
        let dir = tempfile::tempdir().unwrap();
        let (monitor, _, _) = build(dir.path(), 5);
        monitor.shutdown();
        monitor.shutdown();
    }
}
