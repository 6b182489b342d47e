//! Registration status tracking for display layers
//!
//! [`RegistrationStatusTracker`] listens to the `registration.*` events and
//! keeps a [`RegistrationSnapshot`] a status bar or panel can poll without
//! touching the manager.

use camreg_core::{
    Event, EventAware, EventAwareComponent, EventBroker, EventHandler, HandlerResult, Priority,
};
use parking_lot::Mutex;
use std::sync::Arc;

use crate::events::{
    self, AutoComputed, Cleared, Computed, ErrorMessage, Persisted, PointAdded, PointRemoved,
    Validation,
};
use crate::point::RegistrationStatus;

/// Last known registration state as seen through events
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegistrationSnapshot {
    pub point_count: usize,
    pub registered: bool,
    /// RMS error of the last computed or loaded registration
    pub last_error: Option<f64>,
    /// Message of the last `registration.error` event
    pub last_message: Option<String>,
    /// Outcome of the last validation
    pub last_validation: Option<bool>,
    /// Registration events observed
    pub event_count: u64,
}

impl RegistrationSnapshot {
    /// Status implied by the snapshot
    pub fn status(&self) -> RegistrationStatus {
        RegistrationStatus::from_state(self.point_count, self.registered)
    }
}

/// Event-driven mirror of the registration state
pub struct RegistrationStatusTracker {
    events: EventAware,
    snapshot: Mutex<RegistrationSnapshot>,
}

impl RegistrationStatusTracker {
    /// Create a tracker and register its handlers on `broker`
    pub fn new(broker: Arc<EventBroker>) -> Arc<Self> {
        Arc::new(Self {
            events: EventAware::named("registration-tracker", broker),
            snapshot: Mutex::new(RegistrationSnapshot::default()),
        })
        .register_event_handlers()
    }

    /// Copy of the current snapshot
    pub fn snapshot(&self) -> RegistrationSnapshot {
        self.snapshot.lock().clone()
    }

    fn update(&self, f: impl FnOnce(&mut RegistrationSnapshot)) {
        let mut snapshot = self.snapshot.lock();
        snapshot.event_count += 1;
        f(&mut snapshot);
    }

    fn on_point_added(&self, event: &Event) -> HandlerResult {
        let payload: PointAdded = event.payload_as()?;
        self.update(|s| s.point_count = payload.total);
        Ok(())
    }

    fn on_point_removed(&self, event: &Event) -> HandlerResult {
        let payload: PointRemoved = event.payload_as()?;
        self.update(|s| {
            s.point_count = payload.total;
            if payload.total < crate::kabsch::MIN_POINTS {
                s.registered = false;
                s.last_error = None;
            }
        });
        Ok(())
    }

    fn on_computed(&self, event: &Event) -> HandlerResult {
        let payload: Computed = event.payload_as()?;
        self.update(|s| {
            s.point_count = payload.point_count;
            s.registered = true;
            s.last_error = Some(payload.error);
            s.last_validation = None;
        });
        Ok(())
    }

    fn on_auto_computed(&self, event: &Event) -> HandlerResult {
        let payload: AutoComputed = event.payload_as()?;
        self.update(|s| s.last_error = Some(payload.error));
        Ok(())
    }

    fn on_cleared(&self, event: &Event) -> HandlerResult {
        let _: Cleared = event.payload_as()?;
        self.update(clear);
        Ok(())
    }

    fn on_reset(&self, _event: &Event) -> HandlerResult {
        self.update(clear);
        Ok(())
    }

    fn on_validation(&self, event: &Event) -> HandlerResult {
        let payload: Validation = event.payload_as()?;
        let passed = event.event_type == events::VALIDATION_PASSED;
        self.update(|s| {
            s.last_validation = Some(passed);
            if let Some(reason) = payload.reason {
                s.last_message = Some(reason);
            }
        });
        Ok(())
    }

    fn on_loaded(&self, event: &Event) -> HandlerResult {
        let payload: Persisted = event.payload_as()?;
        self.update(|s| {
            s.point_count = payload.point_count;
            s.registered = true;
            s.last_error = Some(payload.error);
            s.last_validation = None;
        });
        Ok(())
    }

    fn on_error(&self, event: &Event) -> HandlerResult {
        let payload: ErrorMessage = event.payload_as()?;
        self.update(|s| s.last_message = Some(payload.message));
        Ok(())
    }
}

fn clear(snapshot: &mut RegistrationSnapshot) {
    *snapshot = RegistrationSnapshot {
        event_count: snapshot.event_count,
        ..Default::default()
    };
}

impl EventAwareComponent for RegistrationStatusTracker {
    fn event_aware(&self) -> &EventAware {
        &self.events
    }

    fn event_handlers() -> Vec<EventHandler<Self>> {
        vec![
            EventHandler::new(events::POINT_ADDED, Priority::Low, Self::on_point_added),
            EventHandler::new(events::POINT_REMOVED, Priority::Low, Self::on_point_removed),
            EventHandler::new(events::COMPUTED, Priority::Low, Self::on_computed),
            EventHandler::new(events::AUTO_COMPUTED, Priority::Low, Self::on_auto_computed),
            EventHandler::new(events::CLEARED, Priority::Low, Self::on_cleared),
            EventHandler::new(events::RESET, Priority::Low, Self::on_reset),
            EventHandler::new(events::VALIDATION_PASSED, Priority::Low, Self::on_validation),
            EventHandler::new(events::VALIDATION_FAILED, Priority::Low, Self::on_validation),
            EventHandler::new(events::LOADED, Priority::Low, Self::on_loaded),
            EventHandler::new(events::ERROR, Priority::Low, Self::on_error),
        ]
    }
}

impl std::fmt::Debug for RegistrationStatusTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistrationStatusTracker")
            .field("snapshot", &*self.snapshot.lock())
            .finish()
    }
}
