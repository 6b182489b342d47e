//! Event-aware components
//!
//! [`EventAware`] gives a component `emit`/`listen`/`stop_listening` on a
//! broker and remembers every subscription it created so they can be torn
//! down together. Dropping an `EventAware` unsubscribes everything it
//! registered, so a component cannot leak callbacks into a long-lived
//! broker.
//!
//! Components that react to events list their handlers explicitly through
//! [`EventAwareComponent::event_handlers`]; the handler table is registered
//! once construction is complete:
//!
//! ```rust,ignore
//! let tracker = Arc::new(Tracker { events: EventAware::new(broker), .. })
//!     .register_event_handlers();
//! ```

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::{Arc, Weak};

use crate::event_bus::{Event, EventBroker, Priority, SubscriptionId};
use crate::types::{ErrorHandler, EventCallback, HandlerResult};

/// Event capability composed into a component
pub struct EventAware {
    owner: String,
    broker: Arc<EventBroker>,
    subscriptions: Mutex<Vec<(String, SubscriptionId)>>,
}

impl EventAware {
    /// Attach to `broker`
    pub fn new(broker: Arc<EventBroker>) -> Self {
        Self::named("component", broker)
    }

    /// Attach to `broker`, naming the owning component in log output
    pub fn named(owner: impl Into<String>, broker: Arc<EventBroker>) -> Self {
        Self {
            owner: owner.into(),
            broker,
            subscriptions: Mutex::new(Vec::new()),
        }
    }

    /// The broker this component talks to
    pub fn broker(&self) -> &Arc<EventBroker> {
        &self.broker
    }

    /// Publish `payload` under `event_type`; returns the delivered count
    pub fn emit<P: Serialize>(&self, event_type: &str, payload: P) -> usize {
        self.broker.publish(event_type, payload)
    }

    /// Subscribe a closure and record the subscription
    pub fn listen<F>(&self, event_type: &str, priority: Priority, callback: F) -> SubscriptionId
    where
        F: Fn(&Event) -> HandlerResult + Send + Sync + 'static,
    {
        self.listen_with(event_type, Arc::new(callback), priority, None)
    }

    /// Subscribe a callback handle with an optional error handler and
    /// record the subscription
    pub fn listen_with(
        &self,
        event_type: &str,
        callback: EventCallback,
        priority: Priority,
        error_handler: Option<ErrorHandler>,
    ) -> SubscriptionId {
        let id = self
            .broker
            .subscribe_callback(event_type, callback, priority, error_handler);
        self.subscriptions.lock().push((event_type.to_string(), id));
        id
    }

    /// Remove this component's subscription `id` for `event_type`, or all
    /// of its subscriptions for that type when `id` is `None`
    ///
    /// Returns the number of subscriptions removed.
    pub fn stop_listening(&self, event_type: &str, id: Option<SubscriptionId>) -> usize {
        let targets: Vec<SubscriptionId> = {
            let mut subscriptions = self.subscriptions.lock();
            let mut targets = Vec::new();
            subscriptions.retain(|(ty, sub)| {
                let hit = ty == event_type && id.is_none_or(|wanted| wanted == *sub);
                if hit {
                    targets.push(*sub);
                }
                !hit
            });
            targets
        };

        targets
            .into_iter()
            .filter(|sub| self.broker.unsubscribe(event_type, *sub))
            .count()
    }

    /// Unsubscribe everything this component registered
    ///
    /// Returns the number of subscriptions removed.
    pub fn cleanup_subscriptions(&self) -> usize {
        let subscriptions = std::mem::take(&mut *self.subscriptions.lock());
        let removed = subscriptions
            .iter()
            .filter(|(event_type, id)| self.broker.unsubscribe(event_type, *id))
            .count();
        if removed > 0 {
            tracing::debug!(owner = %self.owner, removed, "Subscriptions cleaned up");
        }
        removed
    }

    /// Whether anyone on the broker listens to `event_type`
    pub fn has_listeners(&self, event_type: &str) -> bool {
        self.broker.has_subscribers(event_type)
    }

    /// Number of live subscriptions created through this component
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.lock().len()
    }
}

impl Drop for EventAware {
    fn drop(&mut self) {
        self.cleanup_subscriptions();
    }
}

impl std::fmt::Debug for EventAware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventAware")
            .field("owner", &self.owner)
            .field("broker", &self.broker.name())
            .field("subscriptions", &self.subscription_count())
            .finish()
    }
}

/// Handler method of a component
pub type HandlerMethod<T> = fn(&T, &Event) -> HandlerResult;

/// One row of a component's handler table
pub struct EventHandler<T> {
    /// Event type handled.
    pub event_type: &'static str,
    /// Delivery priority.
    pub priority: Priority,
    /// Method invoked with the component and the event.
    pub method: HandlerMethod<T>,
}

impl<T> EventHandler<T> {
    /// Create a handler table row
    pub const fn new(
        event_type: &'static str,
        priority: Priority,
        method: HandlerMethod<T>,
    ) -> Self {
        Self {
            event_type,
            priority,
            method,
        }
    }
}

impl<T> Clone for EventHandler<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for EventHandler<T> {}

/// A component that owns an [`EventAware`] and declares its handlers
pub trait EventAwareComponent: Send + Sync + Sized + 'static {
    /// The component's event capability
    fn event_aware(&self) -> &EventAware;

    /// The handlers to register after construction
    fn event_handlers() -> Vec<EventHandler<Self>>;

    /// Register every handler from [`event_handlers`](Self::event_handlers)
    ///
    /// Call this on the freshly built `Arc`, before the component is shared.
    /// Handlers hold a weak reference, so the broker never keeps the
    /// component alive.
    fn register_event_handlers(self: Arc<Self>) -> Arc<Self> {
        let weak: Weak<Self> = Arc::downgrade(&self);
        for handler in Self::event_handlers() {
            let component = Weak::clone(&weak);
            let method = handler.method;
            self.event_aware()
                .listen(handler.event_type, handler.priority, move |event| {
                    match component.upgrade() {
                        Some(component) => method(&component, event),
                        None => Ok(()),
                    }
                });
        }
        self
    }
}
