//! Named broker registry.
//!
//! A [`BrokerRegistry`] hands out one [`EventBroker`] per name, creating it
//! on first access. Components should receive a registry or a broker
//! through their constructor; the process-wide registry behind
//! [`broker_registry`] exists for call sites that cannot thread one through
//! and lives until the process exits.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use super::broker::{EventBroker, EventBrokerConfig};

/// Name of the default broker
pub const DEFAULT_BROKER_NAME: &str = "default";

/// Map from name to broker instance
#[derive(Debug)]
pub struct BrokerRegistry {
    brokers: Mutex<HashMap<String, Arc<EventBroker>>>,
    config: EventBrokerConfig,
}

impl BrokerRegistry {
    /// Create an empty registry; brokers get the default configuration
    pub fn new() -> Self {
        Self::with_config(EventBrokerConfig::default())
    }

    /// Create an empty registry whose brokers use `config`
    pub fn with_config(config: EventBrokerConfig) -> Self {
        Self {
            brokers: Mutex::new(HashMap::new()),
            config,
        }
    }

    /// Get the broker registered under `name`, creating it if needed
    ///
    /// Every call with the same name returns the same instance.
    pub fn get(&self, name: &str) -> Arc<EventBroker> {
        let mut brokers = self.brokers.lock();
        if let Some(broker) = brokers.get(name) {
            return Arc::clone(broker);
        }
        let broker = Arc::new(EventBroker::named(name, self.config.clone()));
        brokers.insert(name.to_string(), Arc::clone(&broker));
        tracing::debug!(broker = %name, "Broker created");
        broker
    }

    /// Get the broker named [`DEFAULT_BROKER_NAME`]
    pub fn default_broker(&self) -> Arc<EventBroker> {
        self.get(DEFAULT_BROKER_NAME)
    }

    /// Whether a broker with this name has been created
    pub fn contains(&self, name: &str) -> bool {
        self.brokers.lock().contains_key(name)
    }

    /// Names of all created brokers, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.brokers.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of created brokers
    pub fn len(&self) -> usize {
        self.brokers.lock().len()
    }

    /// Whether no broker has been created yet
    pub fn is_empty(&self) -> bool {
        self.brokers.lock().is_empty()
    }
}

impl Default for BrokerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Process-wide registry instance
static BROKER_REGISTRY: OnceLock<BrokerRegistry> = OnceLock::new();

/// Get or initialize the process-wide broker registry
pub fn broker_registry() -> &'static BrokerRegistry {
    BROKER_REGISTRY.get_or_init(BrokerRegistry::new)
}

/// Initialize the process-wide registry with a custom broker configuration
///
/// Must be called before any call to `broker_registry()`. Returns the
/// rejected configuration if the registry has already been initialized.
pub fn init_broker_registry(config: EventBrokerConfig) -> Result<(), EventBrokerConfig> {
    BROKER_REGISTRY
        .set(BrokerRegistry::with_config(config))
        .map_err(|registry| registry.config)
}

/// Get a named broker from the process-wide registry
pub fn get_broker(name: &str) -> Arc<EventBroker> {
    broker_registry().get(name)
}

/// Get the default broker from the process-wide registry
pub fn get_default() -> Arc<EventBroker> {
    broker_registry().default_broker()
}

/// Publish a payload on the process-wide default broker
#[macro_export]
macro_rules! emit {
    ($event_type:expr, $payload:expr) => {
        $crate::event_bus::get_default().publish($event_type, $payload)
    };
}

/// Subscribe a closure at normal priority on the process-wide default broker
#[macro_export]
macro_rules! on_event {
    ($event_type:expr, $handler:expr) => {
        $crate::event_bus::get_default().subscribe(
            $event_type,
            $crate::event_bus::Priority::Normal,
            $handler,
        )
    };
}
