//! External command execution shared by the daemon adapters.

use std::process::Command;

use crate::mpd::{DriverError, Result};

/// Run a program and return its stdout followed by its stderr as text.
///
/// A non-zero exit status is not an error here: callers match the text
/// against known phrases, and a daemon that is down simply fails to match.
pub(crate) fn capture(program: &str, args: &[&str]) -> Result<String> {
    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|e| DriverError::SpawnFailed(format!("{program}: {e}")))?;
    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));
    log::debug!("{program} {}: {}", args.join(" "), text.trim_end());
    Ok(text)
}

/// Run a program and fail unless it exits successfully.
pub(crate) fn run_checked(program: &str, args: &[&str]) -> Result<String> {
    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|e| DriverError::SpawnFailed(format!("{program}: {e}")))?;
    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    if !output.status.success() {
        return Err(DriverError::CommandFailed {
            command: format!("{program} {}", args.join(" ")),
            status: output.status.to_string(),
            stderr,
        });
    }
    if !stderr.is_empty() {
        log::debug!("{program} stderr: {stderr}");
    }
    Ok(stdout)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn capture_joins_stdout_and_stderr() {
        let text = capture("sh", &["-c", "echo out; echo err >&2"]).unwrap();
        assert_eq!(text, "out\nerr\n");
    }

    #[cfg(unix)]
    #[test]
    fn capture_ignores_exit_status() {
        let text = capture("sh", &["-c", "echo 'error: connection refused'; exit 1"]).unwrap();
        assert!(text.contains("connection refused"));
    }

    #[test]
    fn capture_missing_program_is_spawn_error() {
        let err = capture("btsink-definitely-missing-binary", &[]).unwrap_err();
        assert!(matches!(err, DriverError::SpawnFailed(_)));
    }

    #[cfg(unix)]
    #[test]
    fn run_checked_reports_failure() {
        let err = run_checked("sh", &["-c", "echo nope >&2; exit 3"]).unwrap_err();
        match err {
            DriverError::CommandFailed { stderr, .. } => assert_eq!(stderr, "nope"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn run_checked_returns_trimmed_stdout() {
        assert_eq!(run_checked("sh", &["-c", "echo ok"]).unwrap(), "ok");
    }
}
