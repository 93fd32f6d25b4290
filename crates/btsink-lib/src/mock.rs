//! Recording fakes of every external collaborator, for unit and integration tests.
//!
//! All fakes append to one shared [`EventLog`], so a test can assert the exact
//! order of driver commands, pauses, LED writes and report lines across
//! collaborators.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use crate::bluetooth::BluetoothProbe;
use crate::engine::{Report, SinkSwitch};
use crate::gpio::{self, GpioError, GpioPin, InputLine, LineProvider, OutputLine};
use crate::indicator::Pause;
use crate::mpd::{self, DriverError, OutputDriver};
use crate::power::PowerControl;

/// One observable side effect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Outputs,
    Enable(u32),
    Disable(u32),
    EnableOnly(u32),
    Status,
    Play,
    BluetoothInfo,
    AcquireOutput(u8),
    AcquireInput(u8),
    /// Output line write (`true` = high / LED on).
    Level(u8, bool),
    Pause(Duration),
    Report(String),
    StopService(String),
    PowerOff,
}

impl Event {
    /// Whether this event talks to the player daemon.
    pub fn is_driver(&self) -> bool {
        matches!(
            self,
            Event::Outputs
                | Event::Enable(_)
                | Event::Disable(_)
                | Event::EnableOnly(_)
                | Event::Status
                | Event::Play
        )
    }

    /// Whether this event touches a GPIO line.
    pub fn is_gpio(&self) -> bool {
        matches!(
            self,
            Event::AcquireOutput(_) | Event::AcquireInput(_) | Event::Level(..)
        )
    }
}

pub type EventLog = Rc<RefCell<Vec<Event>>>;

fn record(log: &EventLog, event: Event) {
    log.borrow_mut().push(event);
}

// ── Output driver ──

/// Scriptable [`OutputDriver`]. `outputs` and `status` return the configured
/// text; `fail` makes every call fail like an unreachable daemon.
pub struct MockDriver {
    log: EventLog,
    pub outputs_text: RefCell<String>,
    /// Status answers, popped per call; the last one repeats.
    pub status_texts: RefCell<VecDeque<String>>,
    pub fail: Cell<bool>,
}

impl MockDriver {
    pub fn new(log: EventLog) -> Self {
        MockDriver {
            log,
            outputs_text: RefCell::new(String::new()),
            status_texts: RefCell::new(VecDeque::new()),
            fail: Cell::new(false),
        }
    }

    /// Report output 1 as enabled (`true`) or output 2 as enabled (`false`).
    pub fn set_speaker_enabled(&self, enabled: bool) {
        let (one, two) = if enabled {
            ("enabled", "disabled")
        } else {
            ("disabled", "enabled")
        };
        *self.outputs_text.borrow_mut() =
            format!("Output 1 (Speakers) is {one}\nOutput 2 (Headphones) is {two}\n");
    }

    pub fn push_status(&self, text: &str) {
        self.status_texts.borrow_mut().push_back(text.to_string());
    }

    fn answer(&self, event: Event, text: String) -> mpd::Result<String> {
        record(&self.log, event);
        if self.fail.get() {
            return Err(DriverError::SpawnFailed("mock: mpc unavailable".into()));
        }
        Ok(text)
    }
}

impl OutputDriver for MockDriver {
    fn outputs(&self) -> mpd::Result<String> {
        self.answer(Event::Outputs, self.outputs_text.borrow().clone())
    }

    fn enable(&self, output: u32) -> mpd::Result<String> {
        self.answer(Event::Enable(output), String::new())
    }

    fn disable(&self, output: u32) -> mpd::Result<String> {
        self.answer(Event::Disable(output), String::new())
    }

    fn enable_only(&self, output: u32) -> mpd::Result<String> {
        self.answer(Event::EnableOnly(output), String::new())
    }

    fn status(&self) -> mpd::Result<String> {
        let text = {
            let mut texts = self.status_texts.borrow_mut();
            if texts.len() > 1 {
                texts.pop_front().unwrap_or_default()
            } else {
                texts.front().cloned().unwrap_or_default()
            }
        };
        self.answer(Event::Status, text)
    }

    fn play(&self) -> mpd::Result<String> {
        self.answer(Event::Play, String::new())
    }
}

// ── Bluetooth probe ──

pub struct MockProbe {
    log: EventLog,
    pub info_text: RefCell<String>,
    pub fail: Cell<bool>,
}

impl MockProbe {
    pub fn new(log: EventLog) -> Self {
        MockProbe {
            log,
            info_text: RefCell::new(String::new()),
            fail: Cell::new(false),
        }
    }

    pub fn set_connected(&self, connected: bool) {
        *self.info_text.borrow_mut() = format!(
            "Device C4:FB:20:63:A7:F2 (public)\n\tName: Headset\n\tConnected: {}\n",
            if connected { "yes" } else { "no" }
        );
    }
}

impl BluetoothProbe for MockProbe {
    fn info(&self) -> mpd::Result<String> {
        record(&self.log, Event::BluetoothInfo);
        if self.fail.get() {
            return Err(DriverError::SpawnFailed("mock: bluetoothctl unavailable".into()));
        }
        Ok(self.info_text.borrow().clone())
    }
}

// ── GPIO ──

/// In-memory [`LineProvider`]. Input lines replay `input_levels` (the last
/// level repeats); `claimed` pins fail to acquire as if held elsewhere.
pub struct MockGpio {
    log: EventLog,
    pub claimed: RefCell<Vec<u8>>,
    pub input_levels: Rc<RefCell<VecDeque<bool>>>,
}

impl MockGpio {
    pub fn new(log: EventLog) -> Self {
        MockGpio {
            log,
            claimed: RefCell::new(Vec::new()),
            input_levels: Rc::new(RefCell::new(VecDeque::new())),
        }
    }

    pub fn claim(&self, pin: u8) {
        self.claimed.borrow_mut().push(pin);
    }

    fn check_claimed(&self, pin: GpioPin) -> gpio::Result<()> {
        if self.claimed.borrow().contains(&pin.number()) {
            return Err(GpioError::ExportFailed {
                pin: pin.number(),
                reason: "mock: line busy".into(),
            });
        }
        Ok(())
    }
}

pub struct MockOutput {
    log: EventLog,
    pin: u8,
}

impl OutputLine for MockOutput {
    fn set_level(&self, high: bool) -> gpio::Result<()> {
        record(&self.log, Event::Level(self.pin, high));
        Ok(())
    }
}

pub struct MockInput {
    levels: Rc<RefCell<VecDeque<bool>>>,
}

impl InputLine for MockInput {
    fn is_high(&self) -> gpio::Result<bool> {
        let mut levels = self.levels.borrow_mut();
        let level = if levels.len() > 1 {
            levels.pop_front()
        } else {
            levels.front().copied()
        };
        // Idle level of a pulled-up button line.
        Ok(level.unwrap_or(true))
    }
}

impl LineProvider for MockGpio {
    type Output = MockOutput;
    type Input = MockInput;

    fn output(&self, pin: GpioPin) -> gpio::Result<MockOutput> {
        record(&self.log, Event::AcquireOutput(pin.number()));
        self.check_claimed(pin)?;
        Ok(MockOutput {
            log: Rc::clone(&self.log),
            pin: pin.number(),
        })
    }

    fn input(&self, pin: GpioPin) -> gpio::Result<MockInput> {
        record(&self.log, Event::AcquireInput(pin.number()));
        self.check_claimed(pin)?;
        Ok(MockInput {
            levels: Rc::clone(&self.input_levels),
        })
    }
}

// ── Pause / report ──

/// Records pauses instead of sleeping.
pub struct MockPause {
    log: EventLog,
}

impl MockPause {
    pub fn new(log: EventLog) -> Self {
        MockPause { log }
    }
}

impl Pause for MockPause {
    fn pause(&self, duration: Duration) {
        record(&self.log, Event::Pause(duration));
    }
}

pub struct MockReport {
    log: EventLog,
}

impl MockReport {
    pub fn new(log: EventLog) -> Self {
        MockReport { log }
    }
}

impl Report for MockReport {
    fn report(&self, line: &str) {
        record(&self.log, Event::Report(line.to_string()));
    }
}

// ── Power control ──

pub struct MockPower {
    log: EventLog,
    /// Units whose stop command fails.
    pub failing: RefCell<Vec<String>>,
}

impl MockPower {
    pub fn new(log: EventLog) -> Self {
        MockPower {
            log,
            failing: RefCell::new(Vec::new()),
        }
    }
}

impl PowerControl for MockPower {
    fn stop_service(&self, unit: &str) -> mpd::Result<()> {
        record(&self.log, Event::StopService(unit.to_string()));
        if self.failing.borrow().iter().any(|u| u == unit) {
            return Err(DriverError::CommandFailed {
                command: format!("systemctl stop {unit}"),
                status: "exit status: 5".into(),
                stderr: format!("Failed to stop {unit}: Unit {unit} not loaded."),
            });
        }
        Ok(())
    }

    fn power_off(&self) -> mpd::Result<()> {
        record(&self.log, Event::PowerOff);
        Ok(())
    }
}

// ── Wiring ──

pub type MockSwitch = SinkSwitch<MockDriver, MockProbe, MockGpio, MockPause, MockReport>;

/// A [`SinkSwitch`] wired to recording fakes, plus the shared log.
pub struct MockRig {
    pub log: EventLog,
    pub switch: MockSwitch,
}

impl Default for MockRig {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRig {
    pub fn new() -> Self {
        let log: EventLog = Rc::new(RefCell::new(Vec::new()));
        let switch = SinkSwitch::new(
            MockDriver::new(Rc::clone(&log)),
            MockProbe::new(Rc::clone(&log)),
            MockGpio::new(Rc::clone(&log)),
        )
        .with_pause(MockPause::new(Rc::clone(&log)))
        .with_reporter(MockReport::new(Rc::clone(&log)));
        MockRig { log, switch }
    }

    /// Configure the live state the switch will observe.
    pub fn set_state(&self, speaker_enabled: bool, bt_connected: bool) {
        self.switch.driver().set_speaker_enabled(speaker_enabled);
        self.switch.probe().set_connected(bt_connected);
    }

    pub fn events(&self) -> Vec<Event> {
        self.log.borrow().clone()
    }

    pub fn clear(&self) {
        self.log.borrow_mut().clear();
    }

    /// Only the events matching `filter`, in order.
    pub fn events_where(&self, filter: impl Fn(&Event) -> bool) -> Vec<Event> {
        self.log.borrow().iter().filter(|e| filter(e)).cloned().collect()
    }

    pub fn reports(&self) -> Vec<String> {
        self.log
            .borrow()
            .iter()
            .filter_map(|e| match e {
                Event::Report(line) => Some(line.clone()),
                _ => None,
            })
            .collect()
    }
}
