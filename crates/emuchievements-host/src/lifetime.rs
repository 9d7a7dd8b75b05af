//! App start/stop notifications.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use emuchievements_mount::{
    AppLifetimeUpdate, HostError, LifetimeCallback, LifetimeNotifications, SubscriptionHandle,
};

#[derive(Default)]
struct Registry {
    next_id: AtomicU64,
    callbacks: RwLock<Vec<(u64, LifetimeCallback)>>,
}

/// Fans host lifetime notifications out to registered callbacks.
#[derive(Default)]
pub struct SimLifetime {
    registry: Arc<Registry>,
}

impl SimLifetime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver one notification. Returns how many callbacks saw it.
    pub fn emit(&self, update: AppLifetimeUpdate) -> usize {
        let callbacks: Vec<LifetimeCallback> = self
            .registry
            .callbacks
            .read()
            .iter()
            .map(|(_, cb)| cb.clone())
            .collect();
        for cb in &callbacks {
            cb(update);
        }
        callbacks.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry.callbacks.read().len()
    }
}

impl LifetimeNotifications for SimLifetime {
    fn register_for_app_lifetime_notifications(
        &self,
        callback: LifetimeCallback,
    ) -> Result<Box<dyn SubscriptionHandle>, HostError> {
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        self.registry.callbacks.write().push((id, callback));
        Ok(Box::new(LifetimeHandle {
            registry: Arc::downgrade(&self.registry),
            id,
            done: AtomicBool::new(false),
        }))
    }
}

struct LifetimeHandle {
    registry: Weak<Registry>,
    id: u64,
    done: AtomicBool,
}

impl SubscriptionHandle for LifetimeHandle {
    fn unregister(&self) {
        if self.done.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(registry) = self.registry.upgrade() {
            registry.callbacks.write().retain(|(id, _)| *id != self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_emit_reaches_registered_callbacks_until_unregistered() {
        let lifetime = SimLifetime::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen2 = seen.clone();
        let handle = lifetime
            .register_for_app_lifetime_notifications(Arc::new(move |u: AppLifetimeUpdate| {
                seen2.lock().push(u.app_id)
            }))
            .unwrap();

        let update = AppLifetimeUpdate {
            app_id: 7,
            instance_id: 1,
            running: true,
        };
        assert_eq!(lifetime.emit(update), 1);
        handle.unregister();
        handle.unregister();
        assert_eq!(lifetime.emit(update), 0);
        assert_eq!(*seen.lock(), vec![7]);
        assert_eq!(lifetime.subscriber_count(), 0);
    }
}
