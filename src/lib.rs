//! # camreg
//!
//! Camera-to-machine coordinate registration for CNC machines:
//! - Priority-ordered, reentrancy-safe publish/subscribe event broker
//! - Event-aware components with explicit handler tables
//! - Kabsch (SVD) rigid-body fit between camera and machine frames
//! - Validation, archive persistence and status tracking over events
//!
//! ## Architecture
//!
//! camreg is organized as a workspace with multiple crates:
//!
//! 1. **camreg-core** - Errors, event broker, broker registry, event-aware capability
//! 2. **camreg-settings** - Configuration model and JSON/TOML persistence
//! 3. **camreg-registration** - Calibration points, Kabsch solver, registration manager
//! 4. **camreg** - Facade re-exporting the above plus logging setup
//!
//! Camera capture, serial machine control and GUI panels live outside this
//! workspace and talk to it through `registration.*` events and
//! [`RegistrationManager`]'s methods.

use std::sync::Arc;

pub use camreg_core::{
    broker_registry, get_broker, get_default, init_broker_registry, BrokerRegistry,
    ComputationError, Error, ErrorHandler, Event, EventAware, EventAwareComponent, EventBroker,
    EventBrokerConfig, EventCallback, EventHandler, HandlerResult, PersistenceError,
    PreconditionError, Priority, Result, SubscriberKey, SubscriptionId, DEFAULT_BROKER_NAME,
};
pub use camreg_core::{emit, on_event};

pub use camreg_settings::{Config, EventSettings, RegistrationSettings, SettingsError};

pub use camreg_registration::events;
pub use camreg_registration::{
    CalibrationPoint, RegistrationManager, RegistrationSnapshot, RegistrationStatus,
    RegistrationStatusTracker, RigidTransform,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date (set at compile time)
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Build a registry configured by `config`'s event settings
pub fn broker_registry_from(config: &Config) -> BrokerRegistry {
    BrokerRegistry::with_config(config.events.broker_config())
}

/// Create a registration manager on the broker named in `config`
pub fn registration_manager(config: &Config, registry: &BrokerRegistry) -> RegistrationManager {
    let broker: Arc<EventBroker> = registry.get(&config.events.broker_name);
    tracing::debug!(
        broker = %broker.name(),
        auto_compute = config.registration.auto_compute,
        "Registration manager created"
    );
    RegistrationManager::with_settings(broker, config.registration.clone())
}

/// Initialize logging with the default configuration
///
/// Sets up structured logging with:
/// - Console output with pretty formatting
/// - RUST_LOG environment variable support (default `info`)
pub fn init_logging() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stdout)
        .with_target(true)
        .with_level(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_line_number(true)
        .pretty();

    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt_layer)
        .try_init()?;

    tracing::info!(version = VERSION, build_date = BUILD_DATE, "Logging initialized");
    Ok(())
}

/// Initialize logging with one JSON object per line
pub fn init_json_logging() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;

    let fmt_layer = fmt::layer()
        .json()
        .with_writer(std::io::stdout)
        .with_current_span(false);

    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt_layer)
        .try_init()?;

    tracing::info!(version = VERSION, "JSON logging initialized");
    Ok(())
}

fn env_filter() -> tracing_subscriber::EnvFilter {
    tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
        assert!(BUILD_DATE.ends_with("UTC"));
    }

    #[test]
    fn test_logging_initializes_once() {
        assert!(init_logging().is_ok());
        assert!(init_json_logging().is_err());
    }
}
