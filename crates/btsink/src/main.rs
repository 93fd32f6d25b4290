//! bt-sink-switch — select speakers or Bluetooth headphones as audio output.
//!
//! Called once per trigger (button, RFID card, web UI) and exits. The exit
//! status is 0 whenever the arguments parse; outcomes are reported on the
//! terminal and in the log.

use std::path::PathBuf;

use clap::Parser;

use btsink_lib::bluetooth::BluetoothctlProbe;
use btsink_lib::engine::SinkSwitch;
use btsink_lib::gpio::SysfsGpio;
use btsink_lib::mpd::MpcDriver;

mod cli;

#[derive(Parser)]
#[command(
    name = "bt-sink-switch",
    version,
    about = "Switch audio output between speakers and Bluetooth headphones"
)]
struct Args {
    /// toggle | speakers | headphones
    command: String,

    /// Legacy debug switch: any value enables debug logging
    #[arg(hide = true)]
    debug: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Config file (default: <config dir>/btsink/config.toml)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

fn main() {
    let args = Args::parse();
    cli::init_logging(args.verbose || args.debug.is_some());

    let config = cli::load_config(args.config.as_deref());
    let led_pin = config.led_pin();

    let switch = SinkSwitch::new(
        MpcDriver::from_config(&config.mpd),
        BluetoothctlProbe::from_config(&config.bluetooth),
        SysfsGpio::from_config(&config.gpio),
    );
    switch.switch(&args.command, led_pin);
}
