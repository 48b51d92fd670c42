//! Outbound alert delivery.
//!
//! Notifiers are fire-and-forget: [`Notifier::send`] returns immediately and
//! delivery failures are only logged.

mod twilio;

pub use twilio::TwilioNotifier;

use crate::config::TwilioConfig;
use log::info;
use std::sync::Arc;

/// Best-effort outbound message channel.
pub trait Notifier: Send + Sync {
    /// Dispatch `text` without waiting for delivery.
    fn send(&self, text: &str);
}

/// Notifier that only writes alerts to the log.
///
/// Used when no SMS gateway credentials are configured.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn send(&self, text: &str) {
        info!("[Notify] {}", text);
    }
}

/// Pick the notifier for the given gateway configuration.
pub fn from_config(config: &TwilioConfig) -> Arc<dyn Notifier> {
    if config.is_configured() {
        match TwilioNotifier::new(config) {
            Ok(notifier) => return Arc::new(notifier),
            Err(e) => log::error!("[Notify] Failed to build SMS client: {}", e),
        }
    } else {
        info!("[Notify] Twilio auth env vars not set, running in test message mode");
    }
    Arc::new(LogNotifier)
}
