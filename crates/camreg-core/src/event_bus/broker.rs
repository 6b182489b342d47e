//! Event Broker implementation.
//!
//! Provides the priority-ordered EventBroker. Each broker keeps, per event
//! type, a subscriber list sorted by descending priority with insertion
//! order preserved among equal priorities.
//!
//! The subscriber map is guarded by a per-instance mutex that is held only
//! while mutating a list or taking the snapshot at the start of `publish`.
//! Callbacks always run with the lock released, so a callback may
//! subscribe, unsubscribe or publish on the same broker.

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use uuid::Uuid;

use super::events::{Event, Priority};
use crate::types::{ErrorHandler, EventCallback, HandlerResult};

/// Subscription handle for unsubscribing from events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    /// Create a new unique subscription ID
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Sub({})", &self.0.to_string()[..8])
    }
}

/// Identifies a subscriber to remove: by id or by callback handle
#[derive(Clone)]
pub enum SubscriberKey {
    /// Match the subscription id returned by `subscribe`.
    Id(SubscriptionId),
    /// Match the callback allocation (`Arc::ptr_eq`).
    Callback(EventCallback),
}

impl SubscriberKey {
    fn matches(&self, subscriber: &Subscriber) -> bool {
        match self {
            SubscriberKey::Id(id) => subscriber.id == *id,
            SubscriberKey::Callback(callback) => Arc::ptr_eq(callback, &subscriber.callback),
        }
    }
}

impl From<SubscriptionId> for SubscriberKey {
    fn from(id: SubscriptionId) -> Self {
        SubscriberKey::Id(id)
    }
}

impl From<EventCallback> for SubscriberKey {
    fn from(callback: EventCallback) -> Self {
        SubscriberKey::Callback(callback)
    }
}

impl From<&EventCallback> for SubscriberKey {
    fn from(callback: &EventCallback) -> Self {
        SubscriberKey::Callback(Arc::clone(callback))
    }
}

impl std::fmt::Debug for SubscriberKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubscriberKey::Id(id) => write!(f, "SubscriberKey::Id({})", id),
            SubscriberKey::Callback(cb) => {
                write!(f, "SubscriberKey::Callback({:p})", Arc::as_ptr(cb))
            }
        }
    }
}

/// One entry of a subscriber list
#[derive(Clone)]
struct Subscriber {
    id: SubscriptionId,
    callback: EventCallback,
    priority: Priority,
    error_handler: Option<ErrorHandler>,
}

/// Configuration for the event broker
#[derive(Debug, Clone)]
pub struct EventBrokerConfig {
    /// Channel capacity for the async broadcast tap.
    pub channel_capacity: usize,
    /// Whether to keep event history.
    pub enable_history: bool,
    /// Maximum number of events to retain in history.
    pub max_history_size: usize,
    /// How long to retain events in history.
    pub history_retention: Duration,
}

impl Default for EventBrokerConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1024,
            enable_history: false,
            max_history_size: 1000,
            history_retention: Duration::from_secs(300),
        }
    }
}

/// Event with timestamp for history
#[derive(Debug, Clone)]
struct TimestampedEvent {
    event: Event,
    timestamp: Instant,
}

/// Priority-ordered publish/subscribe broker
pub struct EventBroker {
    /// Registry name of this broker
    name: String,
    /// Per event type subscriber lists, highest priority first
    subscribers: Mutex<HashMap<String, Vec<Subscriber>>>,
    /// Broadcast channel sender for async observers
    sender: broadcast::Sender<Event>,
    /// Event history (optional)
    history: Mutex<VecDeque<TimestampedEvent>>,
    /// Configuration
    config: EventBrokerConfig,
}

impl EventBroker {
    /// Create a new, unnamed broker with default configuration
    pub fn new() -> Self {
        Self::named("anonymous", EventBrokerConfig::default())
    }

    /// Create a new broker with custom configuration
    pub fn with_config(config: EventBrokerConfig) -> Self {
        Self::named("anonymous", config)
    }

    /// Create a named broker; used by the broker registry
    pub fn named(name: impl Into<String>, config: EventBrokerConfig) -> Self {
        let (sender, _) = broadcast::channel(config.channel_capacity.max(1));
        Self {
            name: name.into(),
            subscribers: Mutex::new(HashMap::new()),
            sender,
            history: Mutex::new(VecDeque::new()),
            config,
        }
    }

    /// Name this broker was created under
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Subscribe a closure at the given priority
    ///
    /// The callback is invoked on the publishing thread, in priority order.
    pub fn subscribe<F>(&self, event_type: &str, priority: Priority, callback: F) -> SubscriptionId
    where
        F: Fn(&Event) -> HandlerResult + Send + Sync + 'static,
    {
        self.subscribe_callback(event_type, Arc::new(callback), priority, None)
    }

    /// Subscribe a callback handle with an optional error handler
    ///
    /// The new subscriber is placed after every existing subscriber of
    /// equal or higher priority.
    pub fn subscribe_callback(
        &self,
        event_type: &str,
        callback: EventCallback,
        priority: Priority,
        error_handler: Option<ErrorHandler>,
    ) -> SubscriptionId {
        let id = SubscriptionId::new();
        let subscriber = Subscriber {
            id,
            callback,
            priority,
            error_handler,
        };

        let mut subscribers = self.subscribers.lock();
        let list = subscribers.entry(event_type.to_string()).or_default();
        let position = list
            .iter()
            .position(|existing| existing.priority < priority)
            .unwrap_or(list.len());
        list.insert(position, subscriber);
        drop(subscribers);

        tracing::debug!(
            broker = %self.name,
            event_type = %event_type,
            priority = %priority,
            "Subscription {} added",
            id
        );
        id
    }

    /// Remove the first subscriber of `event_type` matching `key`
    ///
    /// Returns true if a subscriber was removed. A miss is a no-op.
    pub fn unsubscribe(&self, event_type: &str, key: impl Into<SubscriberKey>) -> bool {
        let key = key.into();
        let mut subscribers = self.subscribers.lock();
        let Some(list) = subscribers.get_mut(event_type) else {
            return false;
        };
        let Some(position) = list.iter().position(|s| key.matches(s)) else {
            return false;
        };
        let removed = list.remove(position);
        if list.is_empty() {
            subscribers.remove(event_type);
        }
        drop(subscribers);

        tracing::debug!(
            broker = %self.name,
            event_type = %event_type,
            "Subscription {} removed",
            removed.id
        );
        true
    }

    /// Remove every subscriber of one event type, or of all types when
    /// `event_type` is `None`
    ///
    /// Returns the number of subscribers removed.
    pub fn unsubscribe_all(&self, event_type: Option<&str>) -> usize {
        // Removed callbacks are dropped after the lock is released, since
        // dropping captured state may re-enter the broker.
        let taken: Vec<Vec<Subscriber>> = {
            let mut subscribers = self.subscribers.lock();
            match event_type {
                Some(event_type) => subscribers.remove(event_type).into_iter().collect(),
                None => subscribers.drain().map(|(_, list)| list).collect(),
            }
        };
        let removed: usize = taken.iter().map(Vec::len).sum();

        tracing::debug!(broker = %self.name, ?event_type, removed, "Subscriptions cleared");
        removed
    }

    /// Publish a typed payload under `event_type`
    ///
    /// Returns the number of subscribers whose callback completed without
    /// error. Never fails.
    pub fn publish<P: serde::Serialize>(&self, event_type: &str, payload: P) -> usize {
        self.publish_event(Event::with_payload(event_type, payload))
    }

    /// Publish a prepared event
    pub fn publish_event(&self, event: Event) -> usize {
        if self.config.enable_history {
            self.add_to_history(&event);
        }

        // Snapshot, then release the lock before any callback runs.
        let snapshot: Vec<Subscriber> = {
            let subscribers = self.subscribers.lock();
            subscribers
                .get(&event.event_type)
                .cloned()
                .unwrap_or_default()
        };

        let mut delivered = 0;
        for subscriber in &snapshot {
            match invoke(&subscriber.callback, &event) {
                Ok(()) => delivered += 1,
                Err(err) => {
                    tracing::warn!(
                        broker = %self.name,
                        event_type = %event.event_type,
                        subscription = %subscriber.id,
                        error = %err,
                        "Subscriber failed"
                    );
                    if let Some(handler) = &subscriber.error_handler {
                        let outcome =
                            panic::catch_unwind(AssertUnwindSafe(|| handler(&event, &err)));
                        if let Err(panic) = outcome {
                            tracing::error!(
                                broker = %self.name,
                                subscription = %subscriber.id,
                                panic = %panic_message(panic.as_ref()),
                                "Error handler panicked"
                            );
                        }
                    }
                }
            }
        }

        if self.sender.receiver_count() > 0 {
            // Lagging receivers drop old events; publish itself never fails.
            let _ = self.sender.send(event);
        }

        delivered
    }

    /// Get a receiver observing every published event
    ///
    /// Useful for async contexts where events are consumed in a tokio task.
    /// Receivers do not count toward `publish`'s delivered count.
    pub fn receiver(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    /// Whether `event_type` has at least one subscriber
    pub fn has_subscribers(&self, event_type: &str) -> bool {
        self.subscribers
            .lock()
            .get(event_type)
            .is_some_and(|list| !list.is_empty())
    }

    /// Number of subscribers for `event_type`
    pub fn subscriber_count(&self, event_type: &str) -> usize {
        self.subscribers.lock().get(event_type).map_or(0, Vec::len)
    }

    /// Number of subscribers across all event types
    pub fn total_subscriber_count(&self) -> usize {
        self.subscribers.lock().values().map(Vec::len).sum()
    }

    /// Event types that currently have subscribers, sorted
    pub fn list_event_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.subscribers.lock().keys().cloned().collect();
        types.sort();
        types
    }

    /// Get recent event history (if enabled)
    ///
    /// Returns events since the given instant, or all history if None.
    pub fn history(&self, since: Option<Instant>) -> Vec<Event> {
        if !self.config.enable_history {
            return Vec::new();
        }

        let history = self.history.lock();
        match since {
            Some(since) => history
                .iter()
                .filter(|e| e.timestamp >= since)
                .map(|e| e.event.clone())
                .collect(),
            None => history.iter().map(|e| e.event.clone()).collect(),
        }
    }

    /// Clear event history
    pub fn clear_history(&self) {
        self.history.lock().clear();
    }

    /// Get the current configuration
    pub fn config(&self) -> &EventBrokerConfig {
        &self.config
    }

    /// Add an event to history, maintaining size and age limits
    fn add_to_history(&self, event: &Event) {
        let mut history = self.history.lock();
        let now = Instant::now();

        history.push_back(TimestampedEvent {
            event: event.clone(),
            timestamp: now,
        });

        let retention = self.config.history_retention;
        while history
            .front()
            .is_some_and(|e| now.duration_since(e.timestamp) > retention)
        {
            history.pop_front();
        }

        while history.len() > self.config.max_history_size {
            history.pop_front();
        }
    }
}

/// Run a callback, turning a panic into an error
fn invoke(callback: &EventCallback, event: &Event) -> HandlerResult {
    match panic::catch_unwind(AssertUnwindSafe(|| callback(event))) {
        Ok(result) => result,
        Err(panic) => Err(anyhow::anyhow!(
            "subscriber panicked: {}",
            panic_message(panic.as_ref())
        )),
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

impl Default for EventBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBroker")
            .field("name", &self.name)
            .field("subscribers", &self.total_subscriber_count())
            .field("config", &self.config)
            .finish()
    }
}
