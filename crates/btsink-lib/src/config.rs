//! Application configuration — TOML-based, platform-aware path.
//!
//! Every section and field is optional. A missing file means "defaults"
//! (which includes "no LED"), never an error.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::gpio::{MAX_PIN, MIN_PIN};

/// Section holding the sink indicator LED.
pub const LED_SECTION: &str = "BluetoothToggleLed";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Sink indicator LED. `None` when the section is absent.
    #[serde(
        rename = "BluetoothToggleLed",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub led: Option<LedSection>,

    #[serde(rename = "Mpd", default)]
    pub mpd: MpdSection,

    #[serde(rename = "Bluetooth", default)]
    pub bluetooth: BluetoothSection,

    #[serde(rename = "Gpio", default)]
    pub gpio: GpioSection,

    #[serde(rename = "PowerButton", default)]
    pub power_button: PowerButtonSection,
}

/// `[BluetoothToggleLed]`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LedSection {
    /// Temporarily switch the LED off without removing the pin.
    #[serde(default)]
    pub enabled: bool,
    /// BCM number of the LED line, e.g. 6 for GPIO6.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub led_pin: Option<i64>,
}

/// `[Mpd]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MpdSection {
    /// Client program. Default: "mpc".
    #[serde(default = "default_mpc")]
    pub binary: String,
    /// Daemon host. Empty/absent = client default (`MPD_HOST` or localhost).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

/// `[Bluetooth]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BluetoothSection {
    /// Default: "bluetoothctl".
    #[serde(default = "default_bluetoothctl")]
    pub binary: String,
}

/// `[Gpio]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpioSection {
    #[serde(default = "default_sysfs_root")]
    pub sysfs_root: String,
    /// Global number of BCM line 0. 0 on older kernels, 512 on 6.6+ Pi kernels.
    #[serde(default)]
    pub base: u32,
}

/// `[PowerButton]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerButtonSection {
    /// Active-low button input (needs a pull-up).
    #[serde(default = "default_input_pin")]
    pub input_pin: i64,
    /// Power latch output, held high while running and pulled low on shutdown.
    #[serde(default = "default_output_pin")]
    pub output_pin: i64,
    #[serde(default = "default_true")]
    pub power_latch: bool,
    /// Minimum hold time. 0 = shut down on any press.
    #[serde(default = "default_press_duration_ms")]
    pub press_duration_ms: u64,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// systemd units stopped before powering off, in order.
    #[serde(default = "default_services")]
    pub services: Vec<String>,
    /// Prefix systemctl/shutdown with sudo.
    #[serde(default = "default_true")]
    pub use_sudo: bool,
}

fn default_mpc() -> String {
    "mpc".into()
}
fn default_bluetoothctl() -> String {
    "bluetoothctl".into()
}
fn default_sysfs_root() -> String {
    "/sys/class/gpio".into()
}
fn default_input_pin() -> i64 {
    17
}
fn default_output_pin() -> i64 {
    4
}
fn default_press_duration_ms() -> u64 {
    500
}
fn default_debounce_ms() -> u64 {
    200
}
fn default_poll_interval_ms() -> u64 {
    20
}
fn default_services() -> Vec<String> {
    [
        "phoniebox-buttons-usb-encoder.service",
        "phoniebox-gpio-control.service",
        "phoniebox-rfid-reader.service",
        "phoniebox-startup-scripts.service",
    ]
    .map(String::from)
    .to_vec()
}

fn default_true() -> bool {
    true
}

impl Default for MpdSection {
    fn default() -> Self {
        MpdSection {
            binary: default_mpc(),
            host: None,
            port: None,
        }
    }
}

impl Default for BluetoothSection {
    fn default() -> Self {
        BluetoothSection {
            binary: default_bluetoothctl(),
        }
    }
}

impl Default for GpioSection {
    fn default() -> Self {
        GpioSection {
            sysfs_root: default_sysfs_root(),
            base: 0,
        }
    }
}

impl Default for PowerButtonSection {
    fn default() -> Self {
        PowerButtonSection {
            input_pin: default_input_pin(),
            output_pin: default_output_pin(),
            power_latch: true,
            press_duration_ms: default_press_duration_ms(),
            debounce_ms: default_debounce_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            services: default_services(),
            use_sudo: true,
        }
    }
}

impl PowerButtonSection {
    pub fn press_duration(&self) -> Duration {
        Duration::from_millis(self.press_duration_ms)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Validation errors that [`Config::validate_power_button`] can return.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// A pin field is outside the usable GPIO range.
    InvalidPin { field: &'static str, value: i64 },
    /// Input and latch output share one line.
    SharedPin(i64),
    /// `poll_interval_ms` is zero.
    ZeroPollInterval,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::InvalidPin { field, value } => {
                write!(f, "Invalid {field}: {value} (valid: {MIN_PIN}-{MAX_PIN})")
            }
            ValidationError::SharedPin(pin) => {
                write!(f, "input_pin and output_pin are both {pin}")
            }
            ValidationError::ZeroPollInterval => write!(f, "poll_interval_ms must be > 0"),
        }
    }
}

impl Config {
    /// Platform-specific config directory.
    pub fn dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("btsink"))
    }

    /// Full path to config file.
    pub fn path() -> Option<PathBuf> {
        Self::dir().map(|d| d.join("config.toml"))
    }

    /// Load config from an arbitrary path, returning the config and any parse warnings.
    ///
    /// Returns `(defaults, [])` if the file doesn't exist.
    /// Returns `(defaults, [warning])` if the file exists but can't be parsed.
    pub fn load_from(path: &Path) -> (Self, Vec<String>) {
        log::debug!("reading config file '{}'", path.display());
        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => (config, vec![]),
                Err(e) => {
                    let warning = format!(
                        "config parse error ({}), using defaults: {e}",
                        path.display()
                    );
                    (Self::default(), vec![warning])
                }
            },
            Err(e) => {
                log::debug!(
                    "could not read '{}' ({e}), continuing with defaults (LED off)",
                    path.display()
                );
                (Self::default(), vec![])
            }
        }
    }

    /// Load config from the default path, returning the config and any parse warnings.
    pub fn load_with_warnings() -> (Self, Vec<String>) {
        let Some(path) = Self::path() else {
            return (Self::default(), vec![]);
        };
        Self::load_from(&path)
    }

    /// Resolve the sink indicator pin.
    ///
    /// `None` when the section is absent, disabled, or has no `led_pin`.
    /// The pin range is not checked here; the switch degrades an invalid
    /// pin to "no LED" itself.
    pub fn led_pin(&self) -> Option<i64> {
        let pin = match &self.led {
            None => {
                log::debug!("no section {LED_SECTION} found, defaulting to led_pin = None");
                None
            }
            Some(section) if !section.enabled => None,
            Some(LedSection { led_pin: None, .. }) => {
                log::warn!("could not find 'led_pin' or could not read integer value");
                None
            }
            Some(LedSection { led_pin, .. }) => *led_pin,
        };
        log::debug!("using LED pin = {pin:?}");
        pin
    }

    /// Validate the power button settings, collecting all errors.
    pub fn validate_power_button(&self) -> std::result::Result<(), Vec<ValidationError>> {
        let pb = &self.power_button;
        let mut errors = Vec::new();
        let in_range = |n: i64| (MIN_PIN..=MAX_PIN).contains(&n);

        if !in_range(pb.input_pin) {
            errors.push(ValidationError::InvalidPin {
                field: "input_pin",
                value: pb.input_pin,
            });
        }
        if pb.power_latch {
            if !in_range(pb.output_pin) {
                errors.push(ValidationError::InvalidPin {
                    field: "output_pin",
                    value: pb.output_pin,
                });
            } else if pb.output_pin == pb.input_pin {
                errors.push(ValidationError::SharedPin(pb.input_pin));
            }
        }
        if pb.poll_interval_ms == 0 {
            errors.push(ValidationError::ZeroPollInterval);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
