//! Bluetooth probe — "is any device connected" via `bluetoothctl`.
//!
//! Any connected device counts as the headset; no MAC address has to be
//! configured. The invoking user needs access to the bluetooth D-Bus policy
//! (root or group `bluetooth`), otherwise `bluetoothctl` only answers
//! "No default controller available" and the probe reports disconnected.

use std::sync::LazyLock;

use regex::Regex;

use crate::config::BluetoothSection;
use crate::exec;
use crate::mpd::Result;

/// Source of the Bluetooth connection status text.
pub trait BluetoothProbe {
    fn info(&self) -> Result<String>;
}

static CONNECTED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Connected:\s+yes").expect("valid regex"));

/// Whether an info dump reports a connected device.
pub fn is_connected(info: &str) -> bool {
    CONNECTED.is_match(info)
}

/// [`BluetoothProbe`] backed by `bluetoothctl info`.
#[derive(Debug, Clone)]
pub struct BluetoothctlProbe {
    binary: String,
}

impl Default for BluetoothctlProbe {
    fn default() -> Self {
        BluetoothctlProbe {
            binary: "bluetoothctl".into(),
        }
    }
}

impl BluetoothctlProbe {
    pub fn from_config(section: &BluetoothSection) -> Self {
        BluetoothctlProbe {
            binary: section.binary.clone(),
        }
    }
}

impl BluetoothProbe for BluetoothctlProbe {
    fn info(&self) -> Result<String> {
        exec::capture(&self.binary, &["info"])
    }
}
