//! btsink — switch a Raspberry Pi audio box between wired speakers and a
//! Bluetooth headset, with LED feedback and a power-button watcher.

pub mod bluetooth;
pub mod command;
pub mod config;
pub mod engine;
pub mod error;
pub mod gpio;
pub mod indicator;
pub mod mock;
pub mod mpd;
pub mod power;

mod exec;

pub use error::BtsinkError;
