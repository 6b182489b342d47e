//! Configuration for camreg
//!
//! Provides configuration file handling and validation. Supports JSON and
//! TOML file formats, stored by default in the platform config directory.
//!
//! Configuration is organized into sections:
//! - Registration settings (auto-compute, tolerances)
//! - Event settings (broker name, async tap capacity, history)

use camreg_core::EventBrokerConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{SettingsError, SettingsResult};

/// Registration engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrationSettings {
    /// Recompute the transform whenever the point set changes
    pub auto_compute: bool,
    /// Default RMS tolerance used by validation, in machine units
    pub validation_tolerance: f64,
    /// Relative singular-value threshold below which a fit is degenerate
    pub degeneracy_tolerance: f64,
}

impl Default for RegistrationSettings {
    fn default() -> Self {
        Self {
            auto_compute: true,
            validation_tolerance: 0.5,
            degeneracy_tolerance: 1e-9,
        }
    }
}

/// Event broker settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventSettings {
    /// Name of the broker components attach to
    pub broker_name: String,
    /// Capacity of the async broadcast tap
    pub channel_capacity: usize,
    /// Keep a history of published events
    pub enable_history: bool,
    /// Maximum number of events kept in history
    pub max_history_size: usize,
    /// Maximum age of history entries, in seconds
    pub history_retention_secs: u64,
}

impl Default for EventSettings {
    fn default() -> Self {
        Self {
            broker_name: camreg_core::DEFAULT_BROKER_NAME.to_string(),
            channel_capacity: 1024,
            enable_history: false,
            max_history_size: 1000,
            history_retention_secs: 300,
        }
    }
}

impl EventSettings {
    /// Broker configuration described by these settings
    pub fn broker_config(&self) -> EventBrokerConfig {
        EventBrokerConfig {
            channel_capacity: self.channel_capacity,
            enable_history: self.enable_history,
            max_history_size: self.max_history_size,
            history_retention: Duration::from_secs(self.history_retention_secs),
        }
    }
}

/// Complete application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Registration engine settings
    pub registration: RegistrationSettings,
    /// Event broker settings
    pub events: EventSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Json,
    Toml,
}

impl Format {
    fn from_path(path: &Path) -> SettingsResult<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Ok(Format::Json),
            Some("toml") => Ok(Format::Toml),
            other => Err(SettingsError::UnsupportedFormat(
                other.unwrap_or("<none>").to_string(),
            )),
        }
    }
}

impl Config {
    /// Create new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Default config file location: `<config dir>/camreg/config.toml`
    pub fn default_path() -> SettingsResult<PathBuf> {
        let mut path = dirs::config_dir()
            .or_else(dirs::home_dir)
            .ok_or_else(|| SettingsError::ConfigDirectory("no config or home directory".into()))?;
        path.push("camreg");
        path.push("config.toml");
        Ok(path)
    }

    /// Load config from file (JSON or TOML)
    pub fn load_from_file(path: &Path) -> SettingsResult<Self> {
        let format = Format::from_path(path)?;
        let content = std::fs::read_to_string(path)?;

        let config: Self = match format {
            Format::Json => serde_json::from_str(&content)?,
            Format::Toml => toml::from_str(&content)?,
        };

        config.validate()?;
        tracing::debug!(path = %path.display(), "Config loaded");
        Ok(config)
    }

    /// Load config from file, falling back to defaults when it does not exist
    pub fn load_or_default(path: &Path) -> SettingsResult<Self> {
        if path.exists() {
            Self::load_from_file(path)
        } else {
            tracing::info!(path = %path.display(), "No config file, using defaults");
            Ok(Self::default())
        }
    }

    /// Save config to file (JSON or TOML), creating parent directories
    pub fn save_to_file(&self, path: &Path) -> SettingsResult<()> {
        self.validate()?;

        let content = match Format::from_path(path)? {
            Format::Json => serde_json::to_string_pretty(self)?,
            Format::Toml => toml::to_string_pretty(self)?,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;

        tracing::debug!(path = %path.display(), "Config saved");
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> SettingsResult<()> {
        let reg = &self.registration;
        if !(reg.validation_tolerance.is_finite() && reg.validation_tolerance > 0.0) {
            return Err(SettingsError::invalid(
                "registration.validation_tolerance",
                "must be a positive number",
            ));
        }
        if !(reg.degeneracy_tolerance.is_finite() && reg.degeneracy_tolerance > 0.0) {
            return Err(SettingsError::invalid(
                "registration.degeneracy_tolerance",
                "must be a positive number",
            ));
        }

        let events = &self.events;
        if events.broker_name.trim().is_empty() {
            return Err(SettingsError::invalid("events.broker_name", "must not be empty"));
        }
        if events.channel_capacity == 0 {
            return Err(SettingsError::invalid("events.channel_capacity", "must be > 0"));
        }
        if events.enable_history && events.max_history_size == 0 {
            return Err(SettingsError::invalid(
                "events.max_history_size",
                "must be > 0 when history is enabled",
            ));
        }

        Ok(())
    }
}
