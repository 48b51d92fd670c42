//! Door sensor reading.
//!
//! The reader is selected once at construction: a hardware input when the
//! GPIO pin can be opened, otherwise a simulated source returning random
//! levels. Reads never fail; hardware errors fold into [`DoorStatus::Unknown`].

pub mod gpio;

pub use gpio::{DigitalInput, SysfsPin};

use crate::config::SensorConfig;
use log::{info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Logical door status derived from the reed switch level.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum DoorStatus {
    Open,
    Closed,
    /// Also used for any unrecognized persisted value.
    #[default]
    #[serde(other)]
    Unknown,
}

impl DoorStatus {
    /// Map a raw pin level: 0 is closed, 1 is open.
    pub fn from_bit(bit: u8) -> Self {
        match bit {
            0 => DoorStatus::Closed,
            1 => DoorStatus::Open,
            _ => DoorStatus::Unknown,
        }
    }
}

/// Door sensor with hardware and simulated variants.
pub enum SensorReader {
    Hardware(Box<dyn DigitalInput>),
    Simulated(StdRng),
}

impl SensorReader {
    /// Open the sysfs GPIO `pin`, falling back to simulated mode.
    pub fn open(config: &SensorConfig) -> Self {
        Self::from_open_result(
            SysfsPin::open(config.pin, config.chip_base)
                .map(|p| Box::new(p) as Box<dyn DigitalInput>),
        )
    }

    /// Choose the variant from the outcome of opening a hardware input.
    pub fn from_open_result<E: std::fmt::Display>(
        result: std::result::Result<Box<dyn DigitalInput>, E>,
    ) -> Self {
        match result {
            Ok(input) => {
                info!("[Sensor] Hardware input ready");
                SensorReader::Hardware(input)
            }
            Err(e) => {
                warn!(
                    "[Sensor] Unable to open GPIO: {}, continuing in simulated mode",
                    e
                );
                Self::simulated()
            }
        }
    }

    pub fn simulated() -> Self {
        SensorReader::Simulated(StdRng::from_entropy())
    }

    /// Deterministic simulated reader.
    pub fn simulated_with_seed(seed: u64) -> Self {
        SensorReader::Simulated(StdRng::seed_from_u64(seed))
    }

    pub fn is_simulated(&self) -> bool {
        matches!(self, SensorReader::Simulated(_))
    }

    pub fn read(&mut self) -> DoorStatus {
        match self {
            SensorReader::Hardware(input) => match input.read() {
                Ok(bit) => DoorStatus::from_bit(bit),
                Err(e) => {
                    warn!("[Sensor] Read failed: {}", e);
                    DoorStatus::Unknown
                }
            },
            SensorReader::Simulated(rng) => DoorStatus::from_bit(rng.gen_range(0..2)),
        }
    }

    /// Release the hardware handle. Safe to call more than once.
    pub fn close(&mut self) {
        if let SensorReader::Hardware(input) = self {
            input.close();
            info!("[Sensor] Hardware input released");
        }
    }
}
