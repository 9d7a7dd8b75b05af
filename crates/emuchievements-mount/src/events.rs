//! Event bus: decouples lifecycle signals from the mounts that react to them.
//!
//! Dispatch is synchronous and ordered per event name. A handler that fails or
//! panics is reported in the [`PublishReport`] and never stops the handlers
//! after it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::MountError;
use crate::guard;

/// Published for every host app-lifetime notification.
pub const APP_LIFETIME: &str = "app_lifetime";
/// Published once the plugin's session state finished initialising.
pub const SESSION_READY: &str = "session_ready";

/// Published by the mount manager after `register()` finished.
pub const MOUNTS_ACTIVE: &str = "mounts_active";
/// Published by the mount manager after teardown finished.
pub const MOUNTS_TORN_DOWN: &str = "mounts_torn_down";

/// Event names published on the bus by this workspace.
pub const KNOWN_EVENTS: &[&str] = &[APP_LIFETIME, SESSION_READY, MOUNTS_ACTIVE, MOUNTS_TORN_DOWN];

/// True for the event names this workspace publishes.
pub fn is_known_event(event: &str) -> bool {
    KNOWN_EVENTS.contains(&event)
}

/// A subscriber callback.
pub type EventHandler = Arc<dyn Fn(&serde_json::Value) -> Result<(), MountError> + Send + Sync>;

/// Cancels exactly one registration made with [`EventBus::subscribe`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionToken {
    event: String,
    id: u64,
}

impl SubscriptionToken {
    pub fn event(&self) -> &str {
        &self.event
    }
}

/// Outcome of one [`EventBus::publish`] call.
#[derive(Debug, Default)]
pub struct PublishReport {
    pub delivered: usize,
    pub failures: Vec<MountError>,
}

impl PublishReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

struct Subscriber {
    id: u64,
    handler: EventHandler,
}

#[derive(Default)]
struct BusInner {
    next_id: AtomicU64,
    subscribers: RwLock<HashMap<String, Vec<Subscriber>>>,
}

/// Process-wide publish/subscribe channel. Cloning shares the same bus.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let subs = self.inner.subscribers.read();
        f.debug_struct("EventBus")
            .field("events", &subs.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `event`.
    ///
    /// Empty event names are rejected with [`MountError::InvalidArgument`].
    pub fn subscribe<F>(&self, event: &str, handler: F) -> Result<SubscriptionToken, MountError>
    where
        F: Fn(&serde_json::Value) -> Result<(), MountError> + Send + Sync + 'static,
    {
        if event.is_empty() {
            return Err(MountError::InvalidArgument(
                "event name must not be empty".into(),
            ));
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .subscribers
            .write()
            .entry(event.to_string())
            .or_default()
            .push(Subscriber {
                id,
                handler: Arc::new(handler),
            });

        if !is_known_event(event) {
            tracing::warn!(event = %event, "subscribing to an event nothing publishes");
        }
        tracing::debug!(event = %event, subscription = id, "subscribed");
        Ok(SubscriptionToken {
            event: event.to_string(),
            id,
        })
    }

    /// Remove the registration behind `token`. Returns false if it was already gone.
    pub fn unsubscribe(&self, token: &SubscriptionToken) -> bool {
        let mut subs = self.inner.subscribers.write();
        let Some(list) = subs.get_mut(&token.event) else {
            return false;
        };
        let before = list.len();
        list.retain(|s| s.id != token.id);
        let removed = list.len() != before;
        if list.is_empty() {
            subs.remove(&token.event);
        }
        if removed {
            tracing::debug!(event = %token.event, subscription = token.id, "unsubscribed");
        }
        removed
    }

    /// Invoke every handler registered for `event`, in subscription order.
    ///
    /// Handlers are snapshotted first, so a handler may subscribe or
    /// unsubscribe without deadlocking; such changes apply to the next publish.
    pub fn publish(&self, event: &str, payload: &serde_json::Value) -> PublishReport {
        let handlers: Vec<(u64, EventHandler)> = {
            let subs = self.inner.subscribers.read();
            subs.get(event)
                .map(|list| list.iter().map(|s| (s.id, s.handler.clone())).collect())
                .unwrap_or_default()
        };

        let mut report = PublishReport::default();
        for (id, handler) in handlers {
            let outcome = guard::guard("event handler", || handler(payload)).and_then(|r| r);
            match outcome {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    tracing::error!(
                        event = %event,
                        subscription = id,
                        "event handler failed: {e}"
                    );
                    report.failures.push(MountError::Handler(e.to_string()));
                }
            }
        }
        report
    }

    /// Serialize `payload` and publish it.
    pub fn publish_json<T: Serialize>(
        &self,
        event: &str,
        payload: &T,
    ) -> Result<PublishReport, MountError> {
        let value = serde_json::to_value(payload)?;
        Ok(self.publish(event, &value))
    }

    /// Number of live registrations for `event`.
    pub fn subscriber_count(&self, event: &str) -> usize {
        self.inner
            .subscribers
            .read()
            .get(event)
            .map(Vec::len)
            .unwrap_or(0)
    }
}

// ─── Event payload types ─────────────────────────────────────────────

/// Payload for `app_lifetime` events, shaped like the host notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppLifetimeUpdate {
    #[serde(rename = "unAppID")]
    pub app_id: u32,
    #[serde(rename = "nInstanceID")]
    pub instance_id: u32,
    #[serde(rename = "bRunning")]
    pub running: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;

    fn recorder() -> (Arc<Mutex<Vec<&'static str>>>, impl Fn(&'static str) -> EventHandler) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let log2 = log.clone();
        let make = move |name: &'static str| -> EventHandler {
            let log = log2.clone();
            Arc::new(move |_: &serde_json::Value| {
                log.lock().push(name);
                Ok(())
            })
        };
        (log, make)
    }

    #[test]
    fn test_publish_in_subscription_order() {
        let bus = EventBus::new();
        let (log, make) = recorder();
        for name in ["a", "b", "c"] {
            let h = make(name);
            bus.subscribe("evt", move |p| h(p)).unwrap();
        }
        let report = bus.publish("evt", &json!(null));
        assert_eq!(report.delivered, 3);
        assert_eq!(*log.lock(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_failing_handler_does_not_block_others() {
        let bus = EventBus::new();
        let (log, make) = recorder();
        let first = make("first");
        let third = make("third");
        bus.subscribe("evt", move |p| first(p)).unwrap();
        bus.subscribe("evt", |_| Err(MountError::Collaborator("second".into())))
            .unwrap();
        bus.subscribe("evt", move |p| third(p)).unwrap();

        let report = bus.publish("evt", &json!({}));
        assert_eq!(report.delivered, 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(*log.lock(), vec!["first", "third"]);
    }

    #[test]
    fn test_panicking_handler_is_contained() {
        let bus = EventBus::new();
        let (log, make) = recorder();
        let first = make("first");
        let third = make("third");
        bus.subscribe("evt", move |p| first(p)).unwrap();
        bus.subscribe("evt", |_| panic!("handler blew up")).unwrap();
        bus.subscribe("evt", move |p| third(p)).unwrap();

        let report = bus.publish("evt", &json!({}));
        assert!(!report.is_clean());
        assert_eq!(*log.lock(), vec!["first", "third"]);
    }

    #[test]
    fn test_known_events() {
        assert!(is_known_event(APP_LIFETIME));
        assert!(is_known_event(MOUNTS_TORN_DOWN));
        assert!(!is_known_event("app-lifetime"));
        // Unknown names still subscribe.
        assert!(EventBus::new().subscribe("custom", |_| Ok(())).is_ok());
    }

    #[test]
    fn test_empty_event_name_rejected() {
        let bus = EventBus::new();
        let err = bus.subscribe("", |_| Ok(())).unwrap_err();
        assert!(matches!(err, MountError::InvalidArgument(_)));
    }

    #[test]
    fn test_unsubscribe_exact_and_idempotent() {
        let bus = EventBus::new();
        let (log, make) = recorder();
        let a = make("a");
        let b = make("b");
        let ta = bus.subscribe("evt", move |p| a(p)).unwrap();
        bus.subscribe("evt", move |p| b(p)).unwrap();

        assert!(bus.unsubscribe(&ta));
        assert!(!bus.unsubscribe(&ta));
        bus.publish("evt", &json!(1));
        assert_eq!(*log.lock(), vec!["b"]);
        assert_eq!(bus.subscriber_count("evt"), 1);
    }

    #[test]
    fn test_events_are_independent() {
        let bus = EventBus::new();
        let (log, make) = recorder();
        let a = make("a");
        bus.subscribe("one", move |p| a(p)).unwrap();
        let report = bus.publish("two", &json!(null));
        assert_eq!(report.delivered, 0);
        assert!(log.lock().is_empty());
    }

    #[test]
    fn test_handler_may_unsubscribe_itself() {
        let bus = EventBus::new();
        let slot: Arc<Mutex<Option<SubscriptionToken>>> = Arc::new(Mutex::new(None));
        let bus2 = bus.clone();
        let slot2 = slot.clone();
        let token = bus
            .subscribe("once", move |_| {
                if let Some(t) = slot2.lock().take() {
                    bus2.unsubscribe(&t);
                }
                Ok(())
            })
            .unwrap();
        *slot.lock() = Some(token);

        assert_eq!(bus.publish("once", &json!(null)).delivered, 1);
        assert_eq!(bus.publish("once", &json!(null)).delivered, 0);
    }

    #[test]
    fn test_lifetime_payload_uses_host_field_names() {
        let update = AppLifetimeUpdate {
            app_id: 42,
            instance_id: 1,
            running: false,
        };
        let json = serde_json::to_value(update).unwrap();
        assert_eq!(json["unAppID"], 42);
        assert_eq!(json["bRunning"], false);
        let back: AppLifetimeUpdate = serde_json::from_value(json).unwrap();
        assert_eq!(back, update);
    }
}
