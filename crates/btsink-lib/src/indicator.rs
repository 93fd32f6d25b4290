//! Sink indicator LED — steady state and the "no headset" blink.

use std::time::Duration;

use crate::gpio::OutputLine;

/// Half period of one blink pulse (on for this long, then off for this long).
pub const BLINK_HALF_PERIOD: Duration = Duration::from_millis(250);
/// Number of pulses in the "no headset connected" pattern.
pub const BLINK_PULSES: usize = 3;

/// Blocking pause between timed steps.
pub trait Pause {
    fn pause(&self, duration: Duration);
}

/// [`Pause`] that sleeps the current thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadPause;

impl Pause for ThreadPause {
    fn pause(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// LED reflecting the active sink: on = headphones, off = speakers.
///
/// Writes are fire-and-forget; failures are logged and never read back.
pub struct Indicator<L: OutputLine> {
    line: L,
}

impl<L: OutputLine> Indicator<L> {
    pub fn new(line: L) -> Self {
        Indicator { line }
    }

    pub fn on(&self) {
        self.set(true);
    }

    pub fn off(&self) {
        self.set(false);
    }

    fn set(&self, lit: bool) {
        match self.line.set_level(lit) {
            Ok(()) => log::debug!("LED {}", if lit { "on" } else { "off" }),
            Err(e) => log::warn!("LED write failed: {e}"),
        }
    }

    /// Play the three-pulse pattern, ending with the LED off.
    pub fn blink(&self, pause: &impl Pause) {
        for _ in 0..BLINK_PULSES {
            self.on();
            pause.pause(BLINK_HALF_PERIOD);
            self.off();
            pause.pause(BLINK_HALF_PERIOD);
        }
    }

    pub fn into_line(self) -> L {
        self.line
    }
}
