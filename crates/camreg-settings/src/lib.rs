//! camreg Settings Crate
//!
//! Handles configuration of the registration engine and the event broker,
//! and its persistence as JSON or TOML.

pub mod config;
pub mod error;

pub use config::{Config, EventSettings, RegistrationSettings};
pub use error::{SettingsError, SettingsResult};
