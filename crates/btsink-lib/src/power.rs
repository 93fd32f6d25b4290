//! Power button — long-press detection, service stop and power-off.
//!
//! The detection logic is a pure state machine ([`PressTracker`]) fed with
//! timestamped samples, so it is testable without hardware. [`watch_button`]
//! polls an input line into it; [`shutdown_sequence`] performs the actions.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::config::PowerButtonSection;
use crate::exec;
use crate::gpio::{self, GpioPin, InputLine, LineProvider, OutputLine};
use crate::indicator::Pause;
use crate::mpd;

/// What a sample did to the button state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PressEvent {
    /// Nothing of interest.
    Idle,
    /// A debounced press started.
    Pressed,
    /// Still held, for this long.
    Held(Duration),
    /// Released before the required hold time.
    TooShort(Duration),
    /// A valid long press.
    Accepted(Duration),
}

/// Long-press detector over a debounced button level.
///
/// A level change registers on the first sample that shows it. Changes seen
/// within `debounce` of the previous registered edge are ignored, so contact
/// bounce right after an edge is swallowed but a short tap is never lost.
/// A press is accepted
/// on release after at least `press_duration`, or while still held at twice
/// that. A zero `press_duration` accepts every press immediately.
#[derive(Debug, Clone)]
pub struct PressTracker {
    press_duration: Duration,
    debounce: Duration,
    pressed: bool,
    last_edge: Option<Duration>,
    since: Option<Duration>,
    /// Already accepted while held; swallow the release.
    latched: bool,
}

impl PressTracker {
    pub fn new(press_duration: Duration, debounce: Duration) -> Self {
        PressTracker {
            press_duration,
            debounce,
            pressed: false,
            last_edge: None,
            since: None,
            latched: false,
        }
    }

    pub fn from_config(section: &PowerButtonSection) -> Self {
        PressTracker::new(section.press_duration(), section.debounce())
    }

    /// Debounced pressed state.
    pub fn is_pressed(&self) -> bool {
        self.pressed
    }

    /// Feed one sample. `now` is any monotonic timestamp.
    pub fn update(&mut self, raw_pressed: bool, now: Duration) -> PressEvent {
        match self.debounced_edge(raw_pressed, now) {
            Some((true, at)) => {
                self.since = Some(at);
                if self.press_duration.is_zero() {
                    self.latched = true;
                    return PressEvent::Accepted(now.saturating_sub(at));
                }
                PressEvent::Pressed
            }
            Some((false, at)) => {
                let Some(since) = self.since.take() else {
                    return PressEvent::Idle;
                };
                if std::mem::take(&mut self.latched) {
                    return PressEvent::Idle;
                }
                let held = at.saturating_sub(since);
                if held >= self.press_duration {
                    PressEvent::Accepted(held)
                } else {
                    PressEvent::TooShort(held)
                }
            }
            None => match self.since {
                Some(since) if self.pressed => {
                    let held = now.saturating_sub(since);
                    if !self.latched && held >= self.press_duration * 2 {
                        self.latched = true;
                        PressEvent::Accepted(held)
                    } else {
                        PressEvent::Held(held)
                    }
                }
                _ => PressEvent::Idle,
            },
        }
    }

    /// Returns `(new_level, edge_time)` when a change registers.
    fn debounced_edge(&mut self, raw: bool, now: Duration) -> Option<(bool, Duration)> {
        if raw == self.pressed {
            return None;
        }
        if let Some(last) = self.last_edge
            && now.saturating_sub(last) < self.debounce
        {
            return None;
        }
        self.pressed = raw;
        self.last_edge = Some(now);
        Some((raw, now))
    }
}

/// Poll an active-low button until a valid press or until `running` clears.
///
/// Returns the accepted hold time, or `None` when stopped.
pub fn watch_button(
    input: &impl InputLine,
    tracker: &mut PressTracker,
    running: &AtomicBool,
    poll: Duration,
    pause: &impl Pause,
) -> gpio::Result<Option<Duration>> {
    let mut now = Duration::ZERO;
    while running.load(Ordering::SeqCst) {
        let pressed = !input.is_high()?;
        match tracker.update(pressed, now) {
            PressEvent::Accepted(held) => {
                log::info!("valid press detected ({:.2}s)", held.as_secs_f32());
                return Ok(Some(held));
            }
            PressEvent::TooShort(held) => log::info!(
                "button press too short ({:.2}s), waiting for next press",
                held.as_secs_f32()
            ),
            PressEvent::Pressed => log::info!("button pressed, waiting for release"),
            PressEvent::Held(_) | PressEvent::Idle => {}
        }
        pause.pause(poll);
        now += poll;
    }
    Ok(None)
}

/// System power actions.
pub trait PowerControl {
    fn stop_service(&self, unit: &str) -> mpd::Result<()>;
    fn power_off(&self) -> mpd::Result<()>;
}

/// [`PowerControl`] through `systemctl` and `shutdown`, optionally via sudo.
#[derive(Debug, Clone)]
pub struct SystemctlPower {
    use_sudo: bool,
}

impl SystemctlPower {
    pub fn new(use_sudo: bool) -> Self {
        SystemctlPower { use_sudo }
    }

    fn run(&self, args: &[&str]) -> mpd::Result<()> {
        let out = if self.use_sudo {
            exec::run_checked("sudo", args)?
        } else {
            exec::run_checked(args[0], &args[1..])?
        };
        if !out.is_empty() {
            log::debug!("{}: {out}", args.join(" "));
        }
        Ok(())
    }
}

impl PowerControl for SystemctlPower {
    fn stop_service(&self, unit: &str) -> mpd::Result<()> {
        self.run(&["systemctl", "stop", unit])
    }

    fn power_off(&self) -> mpd::Result<()> {
        self.run(&["shutdown", "-h", "now"])
    }
}

/// [`PowerControl`] that only logs what it would do.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunPower;

impl PowerControl for DryRunPower {
    fn stop_service(&self, unit: &str) -> mpd::Result<()> {
        log::info!("[dry-run] would stop {unit}");
        Ok(())
    }

    fn power_off(&self) -> mpd::Result<()> {
        log::info!("[dry-run] would power off");
        Ok(())
    }
}

/// Stop every service (failures are logged, not fatal), release the power
/// latch, then power off.
pub fn shutdown_sequence(
    control: &impl PowerControl,
    services: &[String],
    latch: Option<&impl OutputLine>,
) -> mpd::Result<()> {
    log::info!("stopping services: {}", services.join(", "));
    for unit in services {
        match control.stop_service(unit) {
            Ok(()) => log::info!("stopped {unit}"),
            Err(e) => log::warn!("error stopping {unit}: {e}"),
        }
    }
    if let Some(latch) = latch
        && let Err(e) = latch.set_level(false)
    {
        log::warn!("could not release power latch: {e}");
    }
    control.power_off()
}

/// Full watcher: claim the lines, hold the latch high, wait for a valid
/// press, then shut down.
///
/// Returns `true` when the shutdown sequence ran, `false` when stopped first.
pub fn run_power_button<G: LineProvider>(
    section: &PowerButtonSection,
    gpio: &G,
    control: &impl PowerControl,
    running: &AtomicBool,
    pause: &impl Pause,
) -> crate::error::Result<bool> {
    let input_pin = GpioPin::new(section.input_pin)?;
    let input = gpio.input(input_pin)?;
    log::info!("{input_pin} set as button input");

    let latch = if section.power_latch {
        let pin = GpioPin::new(section.output_pin)?;
        let line = gpio.output(pin)?;
        line.set_level(true)?;
        log::info!("{pin} holding power latch high");
        Some(line)
    } else {
        None
    };

    let mut tracker = PressTracker::from_config(section);
    let Some(_) = watch_button(
        &input,
        &mut tracker,
        running,
        section.poll_interval(),
        pause,
    )?
    else {
        log::info!("power button watcher stopped");
        return Ok(false);
    };

    shutdown_sequence(control, &section.services, latch.as_ref())?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{Event, MockGpio, MockPause, MockPower};
    use std::cell::RefCell;
    use std::rc::Rc;

    const MS: Duration = Duration::from_millis(1);

    fn feed(tracker: &mut PressTracker, samples: &[(bool, u64)]) -> Vec<PressEvent> {
        samples
            .iter()
            .map(|&(p, t)| tracker.update(p, MS * t as u32))
            .collect()
    }

    #[test]
    fn long_press_accepted_on_release() {
        let mut t = PressTracker::new(MS * 500, Duration::ZERO);
        let ev = feed(&mut t, &[(false, 0), (true, 100), (true, 400), (false, 700)]);
        assert_eq!(
            ev,
            [
                PressEvent::Idle,
                PressEvent::Pressed,
                PressEvent::Held(MS * 300),
                PressEvent::Accepted(MS * 600),
            ]
        );
    }

    #[test]
    fn short_press_rejected() {
        let mut t = PressTracker::new(MS * 500, Duration::ZERO);
        let ev = feed(&mut t, &[(true, 0), (false, 200)]);
        assert_eq!(ev[1], PressEvent::TooShort(MS * 200));
        assert!(!t.is_pressed());
    }

    #[test]
    fn held_twice_the_duration_accepted_without_release() {
        let mut t = PressTracker::new(MS * 500, Duration::ZERO);
        let ev = feed(
            &mut t,
            &[(true, 0), (true, 999), (true, 1000), (true, 1500), (false, 1600)],
        );
        assert_eq!(ev[1], PressEvent::Held(MS * 999));
        assert_eq!(ev[2], PressEvent::Accepted(MS * 1000));
        // Already accepted: keep holding and the release are quiet.
        assert_eq!(ev[3], PressEvent::Held(MS * 1500));
        assert_eq!(ev[4], PressEvent::Idle);
    }

    #[test]
    fn bounce_is_ignored() {
        let mut t = PressTracker::new(MS * 500, MS * 50);
        let ev = feed(
            &mut t,
            &[
                (true, 0),
                (false, 10), // bounce
                (true, 20),
                (true, 70),
                (false, 600),
                (true, 620), // bounce after release
                (false, 700),
            ],
        );
        assert_eq!(ev[0], PressEvent::Pressed);
        assert_eq!(ev[1], PressEvent::Held(MS * 10));
        assert_eq!(ev[2], PressEvent::Held(MS * 20));
        assert_eq!(ev[3], PressEvent::Held(MS * 70));
        assert_eq!(ev[4], PressEvent::Accepted(MS * 600));
        assert_eq!(ev[5..], [PressEvent::Idle; 2]);
    }

    #[test]
    fn quick_tap_accepted_with_zero_duration() {
        let mut t = PressTracker::new(Duration::ZERO, MS * 200);
        let ev: Vec<PressEvent> = (0..=50)
            .map(|i| {
                let at = i * 20;
                t.update(at < 150, MS * at)
            })
            .collect();
        let seen: Vec<PressEvent> = ev
            .into_iter()
            .filter(|e| !matches!(e, PressEvent::Idle | PressEvent::Held(_)))
            .collect();
        assert_eq!(seen, [PressEvent::Accepted(Duration::ZERO)]);
    }

    #[test]
    fn quick_tap_reported_too_short() {
        let mut t = PressTracker::new(MS * 500, MS * 200);
        // Released at 150, inside the window; the release registers at 200.
        let ev = feed(&mut t, &[(true, 0), (false, 150), (false, 200), (false, 400)]);
        assert_eq!(ev[0], PressEvent::Pressed);
        assert_eq!(ev[1], PressEvent::Held(MS * 150));
        assert_eq!(ev[2], PressEvent::TooShort(MS * 200));
        assert_eq!(ev[3], PressEvent::Idle);
    }

    #[test]
    fn default_timings_accept_long_press() {
        let mut t = PressTracker::from_config(&PowerButtonSection::default());
        let ev: Vec<PressEvent> = (0..=40)
            .map(|i| {
                let at = i * 20;
                t.update((100..700).contains(&at), MS * at)
            })
            .filter(|e| !matches!(e, PressEvent::Idle | PressEvent::Held(_)))
            .collect();
        assert_eq!(ev, [PressEvent::Pressed, PressEvent::Accepted(MS * 600)]);
    }

    #[test]
    fn zero_duration_accepts_first_press() {
        let mut t = PressTracker::new(Duration::ZERO, Duration::ZERO);
        let ev = feed(&mut t, &[(false, 0), (true, 5), (false, 10)]);
        assert_eq!(
            ev,
            [
                PressEvent::Idle,
                PressEvent::Accepted(Duration::ZERO),
                PressEvent::Idle
            ]
        );
    }

    #[test]
    fn second_press_after_short_one_counts() {
        let mut t = PressTracker::new(MS * 500, Duration::ZERO);
        let ev = feed(&mut t, &[(true, 0), (false, 100), (true, 300), (false, 900)]);
        assert_eq!(ev[1], PressEvent::TooShort(MS * 100));
        assert_eq!(ev[3], PressEvent::Accepted(MS * 600));
    }

    fn mock_parts() -> (Rc<RefCell<Vec<Event>>>, MockGpio, MockPower, MockPause) {
        let log = Rc::new(RefCell::new(Vec::new()));
        (
            Rc::clone(&log),
            MockGpio::new(Rc::clone(&log)),
            MockPower::new(Rc::clone(&log)),
            MockPause::new(log),
        )
    }

    fn quick_section(services: &[&str]) -> PowerButtonSection {
        PowerButtonSection {
            press_duration_ms: 40,
            debounce_ms: 0,
            poll_interval_ms: 10,
            services: services.iter().map(|s| s.to_string()).collect(),
            ..PowerButtonSection::default()
        }
    }

    #[test]
    fn watch_returns_none_when_stopped() {
        let (_log, gpio, _power, pause) = mock_parts();
        let input = gpio.input(GpioPin::new(17).unwrap()).unwrap();
        let mut t = PressTracker::new(MS * 500, Duration::ZERO);
        let running = AtomicBool::new(false);
        let r = watch_button(&input, &mut t, &running, MS * 10, &pause).unwrap();
        assert_eq!(r, None);
    }

    #[test]
    fn watch_detects_active_low_press() {
        let (_log, gpio, _power, pause) = mock_parts();
        // high (idle), then low for 6 polls, then high again
        gpio.input_levels
            .borrow_mut()
            .extend([true, false, false, false, false, false, false, true]);
        let input = gpio.input(GpioPin::new(17).unwrap()).unwrap();
        let mut t = PressTracker::new(MS * 40, Duration::ZERO);
        let running = AtomicBool::new(true);
        let r = watch_button(&input, &mut t, &running, MS * 10, &pause).unwrap();
        assert_eq!(r, Some(MS * 60));
    }

    #[test]
    fn run_power_button_full_sequence() {
        let (log, gpio, power, pause) = mock_parts();
        power.failing.borrow_mut().push("b.service".into());
        gpio.input_levels
            .borrow_mut()
            .extend([true, false, false, false, false, false, false, true]);
        let running = AtomicBool::new(true);
        let section = quick_section(&["a.service", "b.service", "c.service"]);

        let ran = run_power_button(&section, &gpio, &power, &running, &pause).unwrap();
        assert!(ran);

        let events: Vec<Event> = log
            .borrow()
            .iter()
            .filter(|e| !matches!(e, Event::Pause(_)))
            .cloned()
            .collect();
        assert_eq!(
            events,
            vec![
                Event::AcquireInput(17),
                Event::AcquireOutput(4),
                Event::Level(4, true),
                // a failing unit does not stop the sequence
                Event::StopService("a.service".into()),
                Event::StopService("b.service".into()),
                Event::StopService("c.service".into()),
                Event::Level(4, false),
                Event::PowerOff,
            ]
        );
    }

    #[test]
    fn run_power_button_without_latch() {
        let (log, gpio, power, pause) = mock_parts();
        gpio.input_levels.borrow_mut().extend([false]);
        let running = AtomicBool::new(true);
        let section = PowerButtonSection {
            power_latch: false,
            press_duration_ms: 0,
            ..quick_section(&[])
        };
        assert!(run_power_button(&section, &gpio, &power, &running, &pause).unwrap());
        assert!(!log.borrow().iter().any(|e| matches!(e, Event::AcquireOutput(_))));
        assert_eq!(log.borrow().last(), Some(&Event::PowerOff));
    }

    #[test]
    fn run_power_button_busy_input_is_error() {
        let (_log, gpio, power, pause) = mock_parts();
        gpio.claim(17);
        let running = AtomicBool::new(true);
        let err = run_power_button(&quick_section(&[]), &gpio, &power, &running, &pause)
            .unwrap_err();
        assert!(matches!(err, crate::BtsinkError::Gpio(_)));
    }

    #[test]
    fn dry_run_never_fails() {
        let services = ["x.service".to_string()];
        let latch: Option<&crate::mock::MockOutput> = None;
        assert!(shutdown_sequence(&DryRunPower, &services, latch).is_ok());
    }
}
