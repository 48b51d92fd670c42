//! Twilio SMS notifier.

use super::Notifier;
use crate::config::TwilioConfig;
use crate::error::{AlarmError, Result};
use log::{debug, info, warn};
use serde::Deserialize;
use std::time::Duration;

const TWILIO_API_BASE: &str = "https://api.twilio.com/2010-04-01";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct MessageResponse {
    #[serde(default)]
    sid: Option<String>,
}

/// Sends alerts as SMS through the Twilio Messages API.
#[derive(Clone)]
pub struct TwilioNotifier {
    client: reqwest::Client,
    base_url: String,
    account_sid: String,
    auth_token: String,
    from: String,
    to: String,
}

impl TwilioNotifier {
    pub fn new(config: &TwilioConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            base_url: TWILIO_API_BASE.to_string(),
            account_sid: config.account_sid.clone().unwrap_or_default(),
            auth_token: config.auth_token.clone().unwrap_or_default(),
            from: config.from.clone().unwrap_or_default(),
            to: config.to.clone().unwrap_or_default(),
        })
    }

    /// Point the notifier at another API root, e.g. a regional edge.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/Accounts/{}/Messages.json",
            self.base_url, self.account_sid
        )
    }

    /// Deliver one message and wait for the gateway's answer.
    pub async fn deliver(&self, body: &str) -> Result<()> {
        let form = [
            ("To", self.to.as_str()),
            ("From", self.from.as_str()),
            ("Body", body),
        ];

        let response = self
            .client
            .post(self.messages_url())
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .header("Accept", "application/json")
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AlarmError::NotificationFailed(format!(
                "gateway returned {}",
                status
            )));
        }

        match response.json::<MessageResponse>().await {
            Ok(MessageResponse { sid: Some(sid) }) => info!("[Notify] SMS queued: {}", sid),
            Ok(_) => info!("[Notify] SMS queued"),
            Err(e) => debug!("[Notify] Unreadable gateway response: {}", e),
        }
        Ok(())
    }
}

impl Notifier for TwilioNotifier {
    fn send(&self, text: &str) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!("[Notify] No async runtime, dropping message: {}", text);
            return;
        };

        let notifier = self.clone();
        let body = text.to_string();
        handle.spawn(async move {
            if let Err(e) = notifier.deliver(&body).await {
                warn!("[Notify] Failed to send SMS: {}", e);
            }
        });
    }
}
