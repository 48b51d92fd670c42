use log::warn;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Load environment variables from .env file with robust parsing.
/// Handles values with spaces without requiring quotes.
pub fn load_dotenv() {
    load_dotenv_from(Path::new(".env"));
}

fn load_dotenv_from(env_path: &Path) {
    let Ok(content) = fs::read_to_string(env_path) else {
        return;
    };

    for (key, value) in parse_dotenv(&content) {
        // Only set if not already set (env vars take precedence)
        if std::env::var(&key).is_err() {
            // SAFETY: We're single-threaded at this point (called before any async runtime)
            unsafe { std::env::set_var(key, value) };
        }
    }
}

fn parse_dotenv(content: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for line in content.lines() {
        let line = line.trim();

        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some((key, value)) = line.split_once('=') {
            let key = key.trim();
            let mut value = value.trim();

            if value.len() >= 2
                && ((value.starts_with('"') && value.ends_with('"'))
                    || (value.starts_with('\'') && value.ends_with('\'')))
            {
                value = &value[1..value.len() - 1];
            }

            if !key.is_empty() {
                pairs.push((key.to_string(), value.to_string()));
            }
        }
    }
    pairs
}

/// Deployment profile. Development shortens the long-open threshold and
/// binds the status socket to localhost.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    Development,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub profile: Profile,
    pub sensor: SensorConfig,
    pub monitor: MonitorConfig,
    pub socket: SocketConfig,
    pub twilio: TwilioConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorConfig {
    /// SoC line offset (BCM number).
    pub pin: u32,
    /// Sysfs base of the GPIO chip owning `pin`. Detected when unset.
    pub chip_base: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Seconds between sensor ticks.
    pub status_interval_secs: u64,
    /// Seconds the door may stay open before the long-open alert fires.
    pub max_open_secs: u64,
    /// `armed` value written on the very first start.
    pub armed_default: bool,
    pub state_file: PathBuf,
}

impl MonitorConfig {
    pub fn status_interval(&self) -> Duration {
        Duration::from_secs(self.status_interval_secs.max(1))
    }

    pub fn max_open_duration(&self) -> Duration {
        Duration::from_secs(self.max_open_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocketConfig {
    pub listen_addr: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TwilioConfig {
    pub account_sid: Option<String>,
    pub auth_token: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
}

impl TwilioConfig {
    /// Without credentials alerts are only logged.
    pub fn is_configured(&self) -> bool {
        self.account_sid.is_some() || self.auth_token.is_some()
    }
}

pub const DEFAULT_PIN: u32 = 18;
pub const DEFAULT_STATUS_INTERVAL_SECS: u64 = 10;

/// Default location of the persisted monitoring record.
pub fn default_state_file() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("door-alarm")
        .join("state.json")
}

impl Config {
    pub fn for_profile(profile: Profile) -> Self {
        let (max_open_secs, listen_addr) = match profile {
            Profile::Development => (5, "localhost:8080"),
            Profile::Production => (5 * 60, "0.0.0.0:8080"),
        };

        Self {
            profile,
            sensor: SensorConfig {
                pin: DEFAULT_PIN,
                chip_base: None,
            },
            monitor: MonitorConfig {
                status_interval_secs: DEFAULT_STATUS_INTERVAL_SECS,
                max_open_secs,
                armed_default: false,
                state_file: default_state_file(),
            },
            socket: SocketConfig {
                listen_addr: listen_addr.to_string(),
            },
            twilio: TwilioConfig::default(),
        }
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let profile = parse_or("DOOR_ALARM_PROFILE", &lookup, Profile::Production);
        let mut config = Self::for_profile(profile);

        config.sensor.pin = parse_or("GPIO_PIN", &lookup, config.sensor.pin);
        config.sensor.chip_base = lookup("GPIO_CHIP_BASE")
            .filter(|v| !v.trim().is_empty())
            .and_then(|raw| match raw.trim().parse() {
                Ok(base) => Some(base),
                Err(_) => {
                    warn!("Failed to parse GPIO_CHIP_BASE env var ({:?}), detecting", raw);
                    None
                }
            });
        config.monitor.status_interval_secs = parse_or(
            "STATUS_INTERVAL",
            &lookup,
            config.monitor.status_interval_secs,
        );
        config.monitor.max_open_secs =
            parse_or("MAX_OPEN_SECONDS", &lookup, config.monitor.max_open_secs);
        config.monitor.armed_default =
            parse_or("ARMED_DEFAULT", &lookup, config.monitor.armed_default);

        if let Some(path) = lookup("STATE_FILE").filter(|p| !p.is_empty()) {
            config.monitor.state_file = PathBuf::from(path);
        }
        if let Some(addr) = lookup("LISTEN_ADDR").filter(|a| !a.is_empty()) {
            config.socket.listen_addr = addr;
        }

        let non_empty = |key: &str| lookup(key).filter(|v| !v.is_empty());
        config.twilio = TwilioConfig {
            account_sid: non_empty("TWILIO_ACCOUNT_SID"),
            auth_token: non_empty("TWILIO_AUTH_TOKEN"),
            from: non_empty("TWILIO_FROM"),
            to: non_empty("TWILIO_TO"),
        };

        config
    }
}

fn parse_or<T, F>(key: &str, lookup: &F, default: T) -> T
where
    T: FromStr + std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                warn!(
                    "Failed to parse {} env var ({:?}), using default {}",
                    key, raw, default
                );
                default
            }
        },
        None => default,
    }
}
