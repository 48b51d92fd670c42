//! Linux sysfs GPIO input driver.
//!
//! Exports a pin under `/sys/class/gpio`, configures it as an input and reads
//! its `value` file. The sysfs root is injectable so the driver can be tested
//! against a fake tree.

use crate::error::{AlarmError, Result};
use log::{debug, warn};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Default sysfs GPIO root.
pub const SYSFS_GPIO_ROOT: &str = "/sys/class/gpio";

/// A single-bit digital input.
pub trait DigitalInput: Send {
    /// Read the raw pin level.
    fn read(&mut self) -> io::Result<u8>;

    /// Release the underlying hardware handle. Must be idempotent.
    fn close(&mut self) {}
}

/// Sysfs-backed GPIO input pin.
///
/// `pin` is the SoC line offset (the BCM number on a Raspberry Pi). Sysfs
/// numbers lines globally, so the exported number is the owning chip's base
/// plus that offset. Kernels since 6.6 put the SoC chip at base 512 (571 on
/// a Pi 5) instead of 0.
pub struct SysfsPin {
    root: PathBuf,
    pin: u32,
    number: u32,
    exported: bool,
    closed: bool,
}

impl SysfsPin {
    /// Open `pin` under the default sysfs root. `chip_base` overrides chip
    /// detection.
    pub fn open(pin: u32, chip_base: Option<u32>) -> Result<Self> {
        Self::open_at(SYSFS_GPIO_ROOT, pin, chip_base)
    }

    /// Open `pin` under an explicit sysfs root.
    pub fn open_at(root: impl AsRef<Path>, pin: u32, chip_base: Option<u32>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let open_err = |source| AlarmError::GpioOpenFailed { pin, source };

        let base = chip_base.unwrap_or_else(|| detect_chip_base(&root, pin));
        let number = base + pin;
        debug!("[Sensor] GPIO {} maps to sysfs gpio{}", pin, number);

        let pin_dir = root.join(format!("gpio{number}"));
        let mut exported = false;
        if !pin_dir.exists() {
            fs::write(root.join("export"), number.to_string()).map_err(open_err)?;
            exported = true;
        }

        // From here on a failed open drops the handle, which unexports.
        let mut handle = Self {
            root,
            pin,
            number,
            exported,
            closed: false,
        };

        // Pull-up configuration is not exposed by sysfs; it has to be set
        // through the device tree or boot config.
        match fs::write(pin_dir.join("direction"), "in") {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(open_err(e)),
            Err(e) => debug!("[Sensor] Could not set gpio{} direction: {}", number, e),
        }

        // Read once so a missing value file fails here, not on the first tick.
        handle.read().map_err(open_err)?;
        Ok(handle)
    }

    pub fn pin(&self) -> u32 {
        self.pin
    }

    /// Global sysfs line number.
    pub fn number(&self) -> u32 {
        self.number
    }

    fn value_path(&self) -> PathBuf {
        self.root.join(format!("gpio{}", self.number)).join("value")
    }
}

struct GpioChip {
    base: u32,
    ngpio: u32,
    label: String,
}

impl GpioChip {
    fn read(dir: &Path) -> Option<Self> {
        let field = |name: &str| fs::read_to_string(dir.join(name)).ok();
        Some(Self {
            base: field("base")?.trim().parse().ok()?,
            ngpio: field("ngpio")?.trim().parse().ok()?,
            label: field("label").unwrap_or_default().trim().to_string(),
        })
    }

    fn is_soc(&self) -> bool {
        self.label.starts_with("pinctrl-")
    }
}

/// Base of the chip that owns `pin`: the SoC pin controller if one is
/// listed, else the lowest-based chip wide enough. 0 when nothing is found.
fn detect_chip_base(root: &Path, pin: u32) -> u32 {
    let Ok(entries) = fs::read_dir(root) else {
        return 0;
    };
    let mut chips: Vec<GpioChip> = entries
        .flatten()
        .filter(|entry| entry.file_name().to_string_lossy().starts_with("gpiochip"))
        .filter_map(|entry| GpioChip::read(&entry.path()))
        .filter(|chip| pin < chip.ngpio)
        .collect();
    chips.sort_by_key(|chip| (!chip.is_soc(), chip.base));

    match chips.first() {
        Some(chip) => {
            debug!("[Sensor] Using gpiochip {} at base {}", chip.label, chip.base);
            chip.base
        }
        None => 0,
    }
}

impl DigitalInput for SysfsPin {
    fn read(&mut self) -> io::Result<u8> {
        let raw = fs::read_to_string(self.value_path())?;
        raw.trim()
            .parse::<u8>()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if self.exported
            && let Err(e) = fs::write(self.root.join("unexport"), self.number.to_string())
        {
            warn!("[Sensor] Failed to unexport gpio{}: {}", self.number, e);
        }
    }
}

impl Drop for SysfsPin {
    fn drop(&mut self) {
        self.close();
    }
}
