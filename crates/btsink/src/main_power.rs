//! power-button — wait for a long press on the power button, stop the
//! appliance services and power the device off.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;

use btsink_lib::BtsinkError;
use btsink_lib::gpio::SysfsGpio;
use btsink_lib::indicator::ThreadPause;
use btsink_lib::power::{self, DryRunPower, SystemctlPower};

mod cli;

/// Shared shutdown flag, cleared by the Ctrl+C handler.
static RUNNING: AtomicBool = AtomicBool::new(true);

#[derive(Parser)]
#[command(
    name = "power-button",
    version,
    about = "Watch the power button and shut down on a long press"
)]
struct Args {
    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Config file (default: <config dir>/btsink/config.toml)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Log the shutdown actions instead of running them
    #[arg(long)]
    dry_run: bool,
}

fn run(args: &Args) -> btsink_lib::error::Result<()> {
    let config = cli::load_config(args.config.as_deref());
    if let Err(errors) = config.validate_power_button() {
        let msg: Vec<String> = errors.iter().map(ToString::to_string).collect();
        return Err(BtsinkError::Config(msg.join("; ")));
    }

    let section = &config.power_button;
    let gpio = SysfsGpio::from_config(&config.gpio);
    log::info!(
        "waiting for a {}ms press on GPIO{}",
        section.press_duration_ms,
        section.input_pin
    );

    let ran = if args.dry_run {
        power::run_power_button(section, &gpio, &DryRunPower, &RUNNING, &ThreadPause)?
    } else {
        let control = SystemctlPower::new(section.use_sudo);
        power::run_power_button(section, &gpio, &control, &RUNNING, &ThreadPause)?
    };
    if ran {
        log::info!("shutdown requested");
    }
    Ok(())
}

fn main() {
    let args = Args::parse();
    cli::init_logging(args.verbose);

    ctrlc::set_handler(move || {
        RUNNING.store(false, Ordering::SeqCst);
    })
    .ok();

    if let Err(e) = run(&args) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
