//! GPIO lines — traits + Linux sysfs backend.
//!
//! Lines are exported on acquisition and never unexported. A line that was
//! left exported by an earlier process is picked up again as-is, so an
//! output keeps the level the previous invocation wrote until someone writes
//! a new one. This is what lets the sink LED outlive the short-lived switch
//! process.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::config::GpioSection;

/// Lowest usable BCM line number (0 and 1 are reserved for the HAT EEPROM).
pub const MIN_PIN: i64 = 2;
/// Highest BCM line number on the 40-pin header.
pub const MAX_PIN: i64 = 27;

/// How long to wait for the kernel (and udev permissions) after an export.
const EXPORT_WAIT: Duration = Duration::from_millis(500);
const EXPORT_POLL: Duration = Duration::from_millis(10);

#[derive(Debug)]
pub enum GpioError {
    /// Pin number outside the header's general-purpose range.
    InvalidPin(i64),
    /// The line could not be exported or did not show up after exporting.
    ExportFailed { pin: u8, reason: String },
    /// Reading or writing a line attribute failed.
    Io {
        pin: u8,
        attr: &'static str,
        source: std::io::Error,
    },
}

impl fmt::Display for GpioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GpioError::InvalidPin(n) => {
                write!(f, "Invalid GPIO pin {n} (valid: {MIN_PIN}-{MAX_PIN})")
            }
            GpioError::ExportFailed { pin, reason } => {
                write!(f, "Failed to export GPIO {pin}: {reason}")
            }
            GpioError::Io { pin, attr, source } => {
                write!(f, "GPIO {pin} {attr}: {source}")
            }
        }
    }
}

impl std::error::Error for GpioError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GpioError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, GpioError>;

/// A validated BCM pin number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpioPin(u8);

impl GpioPin {
    pub fn new(number: i64) -> Result<Self> {
        if (MIN_PIN..=MAX_PIN).contains(&number) {
            Ok(GpioPin(number as u8))
        } else {
            Err(GpioError::InvalidPin(number))
        }
    }

    pub fn number(self) -> u8 {
        self.0
    }
}

impl fmt::Display for GpioPin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GPIO{}", self.0)
    }
}

/// A line driven by this process.
pub trait OutputLine {
    fn set_level(&self, high: bool) -> Result<()>;
}

/// A line sampled by this process.
pub trait InputLine {
    fn is_high(&self) -> Result<bool>;
}

/// Hands out exclusive lines by pin number.
pub trait LineProvider {
    type Output: OutputLine;
    type Input: InputLine;

    fn output(&self, pin: GpioPin) -> Result<Self::Output>;
    fn input(&self, pin: GpioPin) -> Result<Self::Input>;
}

/// [`LineProvider`] on the sysfs GPIO interface (`/sys/class/gpio`).
#[derive(Debug, Clone)]
pub struct SysfsGpio {
    root: PathBuf,
    /// Offset of the header's gpiochip in the global sysfs numbering.
    base: u32,
    export_wait: Duration,
}

impl Default for SysfsGpio {
    fn default() -> Self {
        SysfsGpio::new("/sys/class/gpio", 0)
    }
}

impl SysfsGpio {
    pub fn new(root: impl Into<PathBuf>, base: u32) -> Self {
        SysfsGpio {
            root: root.into(),
            base,
            export_wait: EXPORT_WAIT,
        }
    }

    pub fn from_config(section: &GpioSection) -> Self {
        SysfsGpio::new(&section.sysfs_root, section.base)
    }

    /// Override the post-export wait (tests use a short one).
    pub fn with_export_wait(mut self, wait: Duration) -> Self {
        self.export_wait = wait;
        self
    }

    fn export(&self, pin: GpioPin) -> Result<SysfsLine> {
        let number = self.base + u32::from(pin.number());
        let dir = self.root.join(format!("gpio{number}"));
        let line = SysfsLine {
            pin: pin.number(),
            dir,
        };
        if line.dir.exists() {
            log::debug!("{pin} already exported as gpio{number}");
            return Ok(line);
        }

        // EBUSY here usually means another process exported it meanwhile.
        if let Err(e) = fs::write(self.root.join("export"), number.to_string())
            && !line.dir.exists()
        {
            return Err(GpioError::ExportFailed {
                pin: pin.number(),
                reason: e.to_string(),
            });
        }

        let deadline = Instant::now() + self.export_wait;
        while !line.attr_path("value").exists() {
            if Instant::now() >= deadline {
                return Err(GpioError::ExportFailed {
                    pin: pin.number(),
                    reason: format!("{} did not appear", line.dir.display()),
                });
            }
            std::thread::sleep(EXPORT_POLL);
        }
        log::debug!("exported {pin} as gpio{number}");
        Ok(line)
    }

    /// udev may still be fixing the attribute permissions right after an
    /// export, so a failing direction write is retried until `export_wait`
    /// runs out.
    fn set_direction(&self, line: &SysfsLine, direction: &'static str) -> Result<()> {
        let deadline = Instant::now() + self.export_wait;
        loop {
            match line.ensure_direction(direction) {
                Err(e) if Instant::now() < deadline => {
                    log::debug!("{e}, retrying");
                    std::thread::sleep(EXPORT_POLL);
                }
                other => return other,
            }
        }
    }
}

impl LineProvider for SysfsGpio {
    type Output = SysfsLine;
    type Input = SysfsLine;

    fn output(&self, pin: GpioPin) -> Result<SysfsLine> {
        let line = self.export(pin)?;
        self.set_direction(&line, "out")?;
        Ok(line)
    }

    fn input(&self, pin: GpioPin) -> Result<SysfsLine> {
        let line = self.export(pin)?;
        self.set_direction(&line, "in")?;
        Ok(line)
    }
}

/// One exported sysfs line.
///
/// Has no `Drop` impl on purpose: the line stays exported and keeps its
/// level after the handle (and the process) is gone.
#[derive(Debug)]
pub struct SysfsLine {
    pin: u8,
    dir: PathBuf,
}

impl SysfsLine {
    pub fn path(&self) -> &Path {
        &self.dir
    }

    fn attr_path(&self, attr: &str) -> PathBuf {
        self.dir.join(attr)
    }

    fn read_attr(&self, attr: &'static str) -> Result<String> {
        fs::read_to_string(self.attr_path(attr))
            .map(|s| s.trim().to_string())
            .map_err(|source| GpioError::Io {
                pin: self.pin,
                attr,
                source,
            })
    }

    fn write_attr(&self, attr: &'static str, value: &str) -> Result<()> {
        fs::write(self.attr_path(attr), value).map_err(|source| GpioError::Io {
            pin: self.pin,
            attr,
            source,
        })
    }

    /// Set the direction unless it is already right. Rewriting "out" would
    /// reset the level the previous owner left behind.
    fn ensure_direction(&self, direction: &'static str) -> Result<()> {
        if self.read_attr("direction").ok().as_deref() == Some(direction) {
            return Ok(());
        }
        self.write_attr("direction", direction)
    }
}

impl OutputLine for SysfsLine {
    fn set_level(&self, high: bool) -> Result<()> {
        self.write_attr("value", if high { "1" } else { "0" })
    }
}

impl InputLine for SysfsLine {
    fn is_high(&self) -> Result<bool> {
        match self.read_attr("value")?.as_str() {
            "1" => Ok(true),
            "0" => Ok(false),
            other => Err(GpioError::Io {
                pin: self.pin,
                attr: "value",
                source: std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("unexpected value {other:?}"),
                ),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Fake an already-exported line under a temp sysfs root.
    fn fake_line(root: &Path, number: u32, direction: &str, value: &str) {
        let dir = root.join(format!("gpio{number}"));
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("direction"), direction).unwrap();
        fs::write(dir.join("value"), value).unwrap();
    }

    fn read(root: &Path, number: u32, attr: &str) -> String {
        fs::read_to_string(root.join(format!("gpio{number}")).join(attr)).unwrap()
    }

    #[test]
    fn pin_range() {
        assert!(GpioPin::new(2).is_ok());
        assert!(GpioPin::new(27).is_ok());
        assert!(matches!(GpioPin::new(1), Err(GpioError::InvalidPin(1))));
        assert!(matches!(GpioPin::new(28), Err(GpioError::InvalidPin(28))));
        assert!(matches!(GpioPin::new(-6), Err(GpioError::InvalidPin(-6))));
    }

    #[test]
    fn pin_display() {
        assert_eq!(GpioPin::new(6).unwrap().to_string(), "GPIO6");
    }

    #[test]
    fn output_on_exported_line_sets_direction_and_value() {
        let tmp = tempfile::tempdir().unwrap();
        fake_line(tmp.path(), 6, "in", "0");
        let gpio = SysfsGpio::new(tmp.path(), 0);

        let line = gpio.output(GpioPin::new(6).unwrap()).unwrap();
        assert_eq!(read(tmp.path(), 6, "direction"), "out");
        line.set_level(true).unwrap();
        assert_eq!(read(tmp.path(), 6, "value"), "1");
        line.set_level(false).unwrap();
        assert_eq!(read(tmp.path(), 6, "value"), "0");
    }

    #[test]
    fn reacquire_keeps_previous_level() {
        let tmp = tempfile::tempdir().unwrap();
        fake_line(tmp.path(), 6, "out\n", "1\n");
        let gpio = SysfsGpio::new(tmp.path(), 0);

        let line = gpio.output(GpioPin::new(6).unwrap()).unwrap();
        // Direction already "out": not rewritten, level untouched.
        assert_eq!(read(tmp.path(), 6, "direction"), "out\n");
        assert!(line.is_high().unwrap());
    }

    #[test]
    fn drop_does_not_unexport() {
        let tmp = tempfile::tempdir().unwrap();
        fake_line(tmp.path(), 6, "out", "0");
        let gpio = SysfsGpio::new(tmp.path(), 0);
        {
            let line = gpio.output(GpioPin::new(6).unwrap()).unwrap();
            line.set_level(true).unwrap();
        }
        assert!(!tmp.path().join("unexport").exists());
        assert_eq!(read(tmp.path(), 6, "value"), "1");
    }

    #[test]
    fn base_offset_applies() {
        let tmp = tempfile::tempdir().unwrap();
        fake_line(tmp.path(), 529, "in", "1");
        let gpio = SysfsGpio::new(tmp.path(), 512);

        let line = gpio.input(GpioPin::new(17).unwrap()).unwrap();
        assert!(line.path().ends_with("gpio529"));
        assert!(line.is_high().unwrap());
    }

    #[test]
    fn export_writes_number_and_times_out_without_kernel() {
        let tmp = tempfile::tempdir().unwrap();
        let gpio = SysfsGpio::new(tmp.path(), 0).with_export_wait(Duration::from_millis(20));

        let err = gpio.output(GpioPin::new(6).unwrap()).unwrap_err();
        assert!(matches!(err, GpioError::ExportFailed { pin: 6, .. }));
        assert_eq!(fs::read_to_string(tmp.path().join("export")).unwrap(), "6");
    }

    #[test]
    fn export_fails_when_root_missing() {
        let gpio = SysfsGpio::new("/nonexistent/btsink/gpio", 0);
        let err = gpio.output(GpioPin::new(6).unwrap()).unwrap_err();
        assert!(matches!(err, GpioError::ExportFailed { .. }));
    }

    #[test]
    fn direction_write_retried_until_writable() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("gpio6");
        fs::create_dir_all(dir.join("direction")).unwrap();
        fs::write(dir.join("value"), "0").unwrap();
        let gpio = SysfsGpio::new(tmp.path(), 0).with_export_wait(Duration::from_secs(5));

        let blocker = dir.join("direction");
        let settle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(30));
            fs::remove_dir(blocker).unwrap();
        });
        let line = gpio.output(GpioPin::new(6).unwrap());
        settle.join().unwrap();
        assert!(line.is_ok());
        assert_eq!(read(tmp.path(), 6, "direction"), "out");
    }

    #[test]
    fn direction_write_gives_up_after_wait() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("gpio6");
        fs::create_dir_all(dir.join("direction")).unwrap();
        fs::write(dir.join("value"), "0").unwrap();
        let gpio = SysfsGpio::new(tmp.path(), 0).with_export_wait(Duration::from_millis(20));

        let err = gpio.output(GpioPin::new(6).unwrap()).unwrap_err();
        assert!(matches!(err, GpioError::Io { pin: 6, attr: "direction", .. }));
    }

    #[test]
    fn input_rejects_garbage_value() {
        let tmp = tempfile::tempdir().unwrap();
        fake_line(tmp.path(), 17, "in", "x");
        let gpio = SysfsGpio::new(tmp.path(), 0);
        let line = gpio.input(GpioPin::new(17).unwrap()).unwrap();
        assert!(matches!(line.is_high(), Err(GpioError::Io { attr: "value", .. })));
    }
}
