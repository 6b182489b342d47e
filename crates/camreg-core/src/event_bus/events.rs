//! Event type definitions for the event broker.
//!
//! Events are identified by namespaced strings such as
//! `registration.point_added`, `camera.frame_captured` or `grbl.status`.
//! Payloads are carried as JSON values so any component can publish its
//! own typed structs without the broker knowing about them.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// A published event as seen by subscribers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Namespaced event identifier.
    pub event_type: String,
    /// Event payload.
    pub payload: serde_json::Value,
}

impl Event {
    /// Create an event from an already-built JSON payload
    pub fn new(event_type: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            event_type: event_type.into(),
            payload,
        }
    }

    /// Create an event by serializing a typed payload
    ///
    /// A payload that cannot be represented as JSON is logged and replaced
    /// by `null`; publishing never fails.
    pub fn with_payload<P: Serialize>(event_type: impl Into<String>, payload: P) -> Self {
        let event_type = event_type.into();
        let payload = serde_json::to_value(payload).unwrap_or_else(|err| {
            tracing::warn!(event_type = %event_type, error = %err, "Payload serialization failed");
            serde_json::Value::Null
        });
        Self {
            event_type,
            payload,
        }
    }

    /// Decode the payload into a typed struct
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.payload)
    }

    /// The namespace part of the event type (`registration` for
    /// `registration.computed`)
    pub fn namespace(&self) -> &str {
        self.event_type
            .split_once('.')
            .map(|(ns, _)| ns)
            .unwrap_or(&self.event_type)
    }
}

impl std::fmt::Display for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.event_type, self.payload)
    }
}

/// Delivery priority of a subscriber
///
/// Subscribers are invoked in descending priority; ties keep
/// subscription order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Background observers.
    Low = 0,
    /// Ordinary subscribers.
    #[default]
    Normal = 1,
    /// Subscribers that must see events before ordinary ones.
    High = 2,
    /// State owners that must react first.
    Critical = 3,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::Low => write!(f, "LOW"),
            Priority::Normal => write!(f, "NORMAL"),
            Priority::High => write!(f, "HIGH"),
            Priority::Critical => write!(f, "CRITICAL"),
        }
    }
}
