//! Output driver — trait + `mpc` client backend.
//!
//! The player daemon exposes two outputs: output 1 drives the wired speakers,
//! output 2 the Bluetooth headset. All responses are free-text dumps, so the
//! only signal available is a pattern match on known phrases.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::config::MpdSection;
use crate::exec;

#[derive(Debug)]
pub enum DriverError {
    /// The client program could not be started.
    SpawnFailed(String),
    /// The program ran but exited unsuccessfully.
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverError::SpawnFailed(e) => write!(f, "Failed to run command: {e}"),
            DriverError::CommandFailed {
                command,
                status,
                stderr,
            } => {
                write!(f, "`{command}` failed ({status})")?;
                if !stderr.is_empty() {
                    write!(f, ": {stderr}")?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for DriverError {}

pub type Result<T> = std::result::Result<T, DriverError>;

/// Controls the player daemon's audio outputs.
///
/// Every method returns the raw text the daemon answered with.
pub trait OutputDriver {
    /// Dump of all outputs and their enabled state.
    fn outputs(&self) -> Result<String>;
    fn enable(&self, output: u32) -> Result<String>;
    fn disable(&self, output: u32) -> Result<String>;
    /// Enable one output and disable all others in a single step.
    fn enable_only(&self, output: u32) -> Result<String>;
    /// Player status text, which carries stream errors.
    fn status(&self) -> Result<String>;
    /// Resume playback.
    fn play(&self) -> Result<String>;
}

static SPEAKER_ENABLED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Output 1.*enabled").expect("valid regex"));

static OUTPUT_ERROR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"ERROR:.*output").expect("valid regex"));

/// Whether an outputs dump reports output 1 (speakers) as enabled.
///
/// Only the first line of the dump is considered, which is where the daemon
/// lists output 1.
pub fn speaker_enabled(outputs: &str) -> bool {
    SPEAKER_ENABLED.is_match(outputs)
}

/// Whether a status dump carries the transient output stream fault,
/// e.g. `ERROR: Failed to open audio output`.
pub fn has_output_error(status: &str) -> bool {
    OUTPUT_ERROR.is_match(status)
}

/// [`OutputDriver`] backed by the `mpc` command line client.
#[derive(Debug, Clone)]
pub struct MpcDriver {
    binary: String,
    host: Option<String>,
    port: Option<u16>,
}

impl Default for MpcDriver {
    fn default() -> Self {
        MpcDriver {
            binary: "mpc".into(),
            host: None,
            port: None,
        }
    }
}

impl MpcDriver {
    pub fn from_config(section: &MpdSection) -> Self {
        MpcDriver {
            binary: section.binary.clone(),
            host: section.host.clone().filter(|h| !h.trim().is_empty()),
            port: section.port,
        }
    }

    /// Full argument list for one mpc invocation, connection options first.
    fn args<'a>(&'a self, port: &'a str, command: &[&'a str]) -> Vec<&'a str> {
        let mut args = Vec::with_capacity(command.len() + 4);
        if let Some(ref host) = self.host {
            args.extend(["--host", host.as_str()]);
        }
        if self.port.is_some() {
            args.extend(["--port", port]);
        }
        args.extend_from_slice(command);
        args
    }

    fn run(&self, command: &[&str]) -> Result<String> {
        let port = self.port.map(|p| p.to_string()).unwrap_or_default();
        exec::capture(&self.binary, &self.args(&port, command))
    }
}

impl OutputDriver for MpcDriver {
    fn outputs(&self) -> Result<String> {
        self.run(&["outputs"])
    }

    fn enable(&self, output: u32) -> Result<String> {
        self.run(&["enable", &output.to_string()])
    }

    fn disable(&self, output: u32) -> Result<String> {
        self.run(&["disable", &output.to_string()])
    }

    fn enable_only(&self, output: u32) -> Result<String> {
        self.run(&["enable", "only", &output.to_string()])
    }

    fn status(&self) -> Result<String> {
        self.run(&["status"])
    }

    fn play(&self) -> Result<String> {
        self.run(&["play"])
    }
}
