//! Sink switch — decide between speakers and Bluetooth headphones, drive the
//! player daemon, and mirror the result on the indicator LED.
//!
//! The switch is invoked as a short-lived process from button handlers, RFID
//! card actions and the web UI. Every call re-reads the live state; nothing
//! is cached between calls. Failures are logged and absorbed so the caller
//! never fails because of the audio subsystem.

use std::time::Duration;

use crate::bluetooth::{self, BluetoothProbe};
use crate::command::{self, Command, Decision, Sink};
use crate::gpio::{GpioPin, LineProvider};
use crate::indicator::{Indicator, Pause, ThreadPause};
use crate::mpd::{self, OutputDriver};

/// Pause between enabling the headphones and disabling the speakers.
pub const SETTLE_DELAY: Duration = Duration::from_millis(100);

/// Destination for the user-facing result lines.
pub trait Report {
    fn report(&self, line: &str);
}

/// [`Report`] printing to stdout.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleReport;

impl Report for ConsoleReport {
    fn report(&self, line: &str) {
        println!("{line}");
    }
}

pub struct SinkSwitch<D, B, G, P = ThreadPause, R = ConsoleReport> {
    driver: D,
    probe: B,
    gpio: G,
    pause: P,
    report: R,
}

impl<D, B, G> SinkSwitch<D, B, G>
where
    D: OutputDriver,
    B: BluetoothProbe,
    G: LineProvider,
{
    /// Switch with real sleeps and console output.
    pub fn new(driver: D, probe: B, gpio: G) -> Self {
        SinkSwitch {
            driver,
            probe,
            gpio,
            pause: ThreadPause,
            report: ConsoleReport,
        }
    }
}

impl<D, B, G, P, R> SinkSwitch<D, B, G, P, R>
where
    D: OutputDriver,
    B: BluetoothProbe,
    G: LineProvider,
    P: Pause,
    R: Report,
{
    pub fn with_pause<P2: Pause>(self, pause: P2) -> SinkSwitch<D, B, G, P2, R> {
        SinkSwitch {
            driver: self.driver,
            probe: self.probe,
            gpio: self.gpio,
            pause,
            report: self.report,
        }
    }

    pub fn with_reporter<R2: Report>(self, report: R2) -> SinkSwitch<D, B, G, P, R2> {
        SinkSwitch {
            driver: self.driver,
            probe: self.probe,
            gpio: self.gpio,
            pause: self.pause,
            report,
        }
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn probe(&self) -> &B {
        &self.probe
    }

    pub fn gpio(&self) -> &G {
        &self.gpio
    }

    /// Run one switch from a textual command (`toggle`, `speakers`,
    /// `headphones`).
    ///
    /// An unknown command is logged and nothing else happens: no daemon
    /// query, no LED access.
    pub fn switch(&self, command: &str, led_pin: Option<i64>) {
        match command.parse::<Command>() {
            Ok(cmd) => {
                self.switch_command(cmd, led_pin);
            }
            Err(e) => log::error!("Invalid command. Doing nothing. ({e})"),
        }
    }

    /// Run one switch and return the decision taken.
    ///
    /// An invalid or unavailable `led_pin` only disables the LED feedback;
    /// the switch itself always completes.
    pub fn switch_command(&self, command: Command, led_pin: Option<i64>) -> Decision {
        let led = self.acquire_indicator(led_pin);

        let outputs = text_or_empty("output query", self.driver.outputs());
        let speaker_enabled = mpd::speaker_enabled(&outputs);
        let info = text_or_empty("bluetooth query", self.probe.info());
        let bt_connected = bluetooth::is_connected(&info);
        log::debug!(
            "command={command} speaker_enabled={speaker_enabled} bt_connected={bt_connected}"
        );

        let decision = command::decide(command, speaker_enabled, bt_connected);
        match decision {
            Decision::SwitchToHeadphones => self.activate_headphones(led.as_ref()),
            Decision::SwitchToSpeakers { fallback } => {
                if fallback {
                    self.report
                        .report("No bluetooth device connected. Defaulting to Output 1.");
                    if let Some(ref led) = led {
                        led.blink(&self.pause);
                    }
                }
                self.activate_speakers(led.as_ref());
            }
        }

        // The LED shows which sink is active, not whether this process runs.
        // Never let a line run drop-time cleanup that would reset it.
        std::mem::forget(led);
        decision
    }

    /// Look for the transient stream fault after an output change and nudge
    /// playback once. Never re-checks; the next invocation sees any leftover.
    pub fn check_and_recover(&self) {
        let status = text_or_empty("status query", self.driver.status());
        if mpd::has_output_error(&status) {
            log::info!("output stream error after switch, resuming playback");
            issue("resume playback", self.driver.play());
        }
    }

    /// Enable the headphones before disabling the speakers so the daemon
    /// never runs without an output.
    fn activate_headphones(&self, led: Option<&Indicator<G::Output>>) {
        self.report
            .report(&format!("Switched audio sink to {}", Sink::Headphones));
        issue(
            "enable headphones",
            self.driver.enable(Sink::Headphones.output_index()),
        );
        self.pause.pause(SETTLE_DELAY);
        issue(
            "disable speakers",
            self.driver.disable(Sink::Speakers.output_index()),
        );
        self.check_and_recover();
        if let Some(led) = led {
            led.on();
        }
    }

    /// "enable only" turns output 1 on before the others off, in one step.
    fn activate_speakers(&self, led: Option<&Indicator<G::Output>>) {
        self.report
            .report(&format!("Switched audio sink to {}", Sink::Speakers));
        issue(
            "enable speakers only",
            self.driver.enable_only(Sink::Speakers.output_index()),
        );
        self.check_and_recover();
        if let Some(led) = led {
            led.off();
        }
    }

    fn acquire_indicator(&self, led_pin: Option<i64>) -> Option<Indicator<G::Output>> {
        let pin = match GpioPin::new(led_pin?) {
            Ok(pin) => pin,
            Err(e) => {
                log::warn!("{e}. Ignoring led_pin");
                return None;
            }
        };
        match self.gpio.output(pin) {
            Ok(line) => Some(Indicator::new(line)),
            Err(e) => {
                log::warn!("LED on {pin} unavailable, continuing without it: {e}");
                None
            }
        }
    }
}

/// Daemon answer, or empty text (which matches nothing) on failure.
fn text_or_empty(what: &str, result: mpd::Result<String>) -> String {
    result.unwrap_or_else(|e| {
        log::warn!("{what} failed: {e}");
        String::new()
    })
}

fn issue(what: &str, result: mpd::Result<String>) {
    match result {
        Ok(out) => log::debug!("{what}: {}", out.trim_end()),
        Err(e) => log::warn!("{what} failed: {e}"),
    }
}
