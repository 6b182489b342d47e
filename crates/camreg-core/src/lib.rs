//! # camreg Core
//!
//! Core types and infrastructure for camreg.
//! Provides the error taxonomy, the priority-ordered event broker with its
//! named registry, and the event-aware component capability that the
//! registration engine and the camera, machine and GUI layers build on.

pub mod error;
pub mod event_aware;
pub mod event_bus;
pub mod types;

pub use error::{ComputationError, Error, PersistenceError, PreconditionError, Result};

pub use event_aware::{EventAware, EventAwareComponent, EventHandler, HandlerMethod};

// Re-export event broker for convenience
pub use event_bus::{
    broker_registry, get_broker, get_default, init_broker_registry, BrokerRegistry, Event,
    EventBroker, EventBrokerConfig, Priority, SubscriberKey, SubscriptionId, DEFAULT_BROKER_NAME,
};

pub use types::{thread_safe_vec, ErrorHandler, EventCallback, HandlerResult, ThreadSafeVec};
