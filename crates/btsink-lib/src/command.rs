//! Switch commands and the sink decision — pure logic, no I/O.

use std::fmt;
use std::str::FromStr;

/// Requested switch operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Flip between speakers and headphones.
    Toggle,
    /// Force the speaker output.
    Speakers,
    /// Request the Bluetooth headphones output.
    Headphones,
}

impl FromStr for Command {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "toggle" => Ok(Command::Toggle),
            "speakers" => Ok(Command::Speakers),
            "headphones" => Ok(Command::Headphones),
            other => Err(format!(
                "unknown command \"{other}\" (expected toggle, speakers or headphones)"
            )),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Toggle => write!(f, "toggle"),
            Command::Speakers => write!(f, "speakers"),
            Command::Headphones => write!(f, "headphones"),
        }
    }
}

/// Audio output of the player daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sink {
    Speakers,
    Headphones,
}

impl Sink {
    /// 1-based output index as configured in the player daemon.
    pub fn output_index(self) -> u32 {
        match self {
            Sink::Speakers => 1,
            Sink::Headphones => 2,
        }
    }
}

impl fmt::Display for Sink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Output {}", self.output_index())
    }
}

/// Outcome of one switch decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Bluetooth device is connected and headphones were requested.
    SwitchToHeadphones,
    /// Speaker output. `fallback` is set when headphones were requested but
    /// no Bluetooth device is connected.
    SwitchToSpeakers { fallback: bool },
}

/// The sink a command asks for, before the Bluetooth guard is applied.
///
/// Toggling away from enabled speakers means headphones; any other toggle
/// means speakers.
pub fn intended_sink(command: Command, speaker_enabled: bool) -> Sink {
    match command {
        Command::Headphones => Sink::Headphones,
        Command::Toggle if speaker_enabled => Sink::Headphones,
        Command::Toggle | Command::Speakers => Sink::Speakers,
    }
}

/// Decide the target sink from the command and the freshly queried state.
pub fn decide(command: Command, speaker_enabled: bool, bt_connected: bool) -> Decision {
    match intended_sink(command, speaker_enabled) {
        Sink::Headphones if bt_connected => Decision::SwitchToHeadphones,
        Sink::Headphones => Decision::SwitchToSpeakers { fallback: true },
        Sink::Speakers => Decision::SwitchToSpeakers { fallback: false },
    }
}
