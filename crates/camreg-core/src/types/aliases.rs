//! Type aliases for commonly used complex types.
//!
//! Subscriber callbacks are stored as `Arc<dyn Fn>` so the broker can
//! snapshot a subscriber list cheaply and so callers can keep a handle that
//! identifies the callback for later unsubscription.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use camreg_core::types::*;
//!
//! let callback: EventCallback = Arc::new(|event| {
//!     tracing::info!("got {}", event.event_type);
//!     Ok(())
//! });
//! ```

use parking_lot::Mutex;
use std::sync::Arc;

use crate::event_bus::Event;

// =============================================================================
// CALLBACK TYPES
// =============================================================================

/// Outcome of a subscriber callback.
///
/// An `Err` counts as a failed delivery; it is logged and routed to the
/// subscriber's error handler, never to the publisher.
pub type HandlerResult = anyhow::Result<()>;

/// A subscriber callback.
///
/// Thread-safe and cheaply cloneable. Two handles refer to the same
/// subscriber when they point at the same allocation (`Arc::ptr_eq`).
pub type EventCallback = Arc<dyn Fn(&Event) -> HandlerResult + Send + Sync>;

/// A per-subscriber error handler receiving the event and the failure.
pub type ErrorHandler = Arc<dyn Fn(&Event, &anyhow::Error) + Send + Sync>;

// =============================================================================
// THREAD-SAFE SHARED TYPES
// =============================================================================

/// A thread-safe vector for cross-thread collection management.
///
/// Uses `parking_lot::Mutex` for better performance than `std::sync::Mutex`.
pub type ThreadSafeVec<T> = Arc<Mutex<Vec<T>>>;

/// Create a new empty `ThreadSafeVec<T>`.
#[inline]
pub fn thread_safe_vec<T>() -> ThreadSafeVec<T> {
    Arc::new(Mutex::new(Vec::new()))
}
