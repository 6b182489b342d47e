//! # Event Broker Module
//!
//! Priority-ordered publish/subscribe for decoupled communication between
//! the registration engine and the camera, machine and GUI layers.
//!
//! ## Overview
//!
//! - Publishers emit namespaced events without knowing subscribers
//! - Subscribers run in descending priority, ties in subscription order
//! - A failing or panicking subscriber never blocks the others
//! - Handlers may subscribe, unsubscribe or publish from inside a handler
//!
//! ## Usage
//!
//! ```rust,ignore
//! use camreg_core::event_bus::{get_default, Priority};
//!
//! let broker = get_default();
//! let id = broker.subscribe("registration.computed", Priority::High, |event| {
//!     tracing::info!("registration error {}", event.payload["error"]);
//!     Ok(())
//! });
//!
//! broker.publish("registration.computed", serde_json::json!({ "error": 0.02 }));
//! broker.unsubscribe("registration.computed", id);
//! ```

mod broker;
mod events;
mod registry;

pub use broker::*;
pub use events::*;
pub use registry::*;
