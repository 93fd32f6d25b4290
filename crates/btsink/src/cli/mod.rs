//! Shared setup for the btsink binaries — logging and config loading.

use std::path::Path;

use btsink_lib::config::Config;

/// Install the stderr logger. `verbose` lowers the default filter to debug;
/// `RUST_LOG` still wins.
pub fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default))
        .format_timestamp_secs()
        .init();
}

/// Load the config from `path`, or from the platform default location.
pub fn load_config(path: Option<&Path>) -> Config {
    let (config, warnings) = match path {
        Some(path) => Config::load_from(path),
        None => Config::load_with_warnings(),
    };
    for w in &warnings {
        log::warn!("{w}");
    }
    config
}
