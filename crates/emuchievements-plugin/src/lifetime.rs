//! Bridges host app-lifetime notifications onto the event bus.

use std::sync::Arc;

use emuchievements_mount::{
    AppLifetimeUpdate, EventBus, GenericMount, MountError, SubscriptionHandle, SubscriptionToken,
    Teardown, APP_LIFETIME,
};

use crate::achievements::{is_shortcut, overview};
use crate::capabilities::HostCapabilities;
use crate::service::AchievementService;

struct Bridge {
    host: Box<dyn SubscriptionHandle>,
    token: SubscriptionToken,
}

/// Refresh a shortcut's achievements once it stops running.
fn on_lifetime(
    caps: &HostCapabilities,
    service: &dyn AchievementService,
    update: AppLifetimeUpdate,
) {
    tracing::debug!(
        app_id = update.app_id,
        instance = update.instance_id,
        running = update.running,
        "app lifetime"
    );
    let shortcut = overview(&caps.app_store, update.app_id).is_some_and(|o| is_shortcut(&o));
    if shortcut && !update.running {
        service.clear_runtime_cache(update.app_id);
        service.fetch_achievements(update.app_id);
    }
}

/// Register for lifetime notifications, republish them as `app_lifetime` and
/// refresh achievements for shortcuts that exit.
pub fn lifetime_mount(
    caps: &HostCapabilities,
    bus: EventBus,
    service: Arc<dyn AchievementService>,
) -> GenericMount {
    let caps = caps.clone();
    let unmount_bus = bus.clone();
    GenericMount::from_sync(
        "app lifetime notifications",
        move || {
            let handler_caps = caps.clone();
            let handler_service = service.clone();
            let token = bus.subscribe(APP_LIFETIME, move |payload| {
                let update: AppLifetimeUpdate = serde_json::from_value(payload.clone())?;
                on_lifetime(&handler_caps, handler_service.as_ref(), update);
                Ok(())
            })?;

            let publisher = bus.clone();
            let registered = caps
                .lifetime
                .register_for_app_lifetime_notifications(Arc::new(move |update| {
                    let report = match publisher.publish_json(APP_LIFETIME, &update) {
                        Ok(report) => report,
                        Err(e) => {
                            tracing::error!(
                                app_id = update.app_id,
                                "lifetime event not published: {e}"
                            );
                            return;
                        }
                    };
                    if !report.is_clean() {
                        tracing::warn!(failures = report.failures.len(), "lifetime handlers failed");
                    }
                }));
            let host = match registered {
                Ok(host) => host,
                Err(e) => {
                    bus.unsubscribe(&token);
                    return Err(e.into());
                }
            };

            Ok(Teardown::Custom(Box::new(Bridge { host, token })))
        },
        move |state| {
            let Teardown::Custom(custom) = state else {
                return Err(MountError::InvalidArgument(
                    "lifetime bridge expected its own teardown state".into(),
                ));
            };
            let bridge = custom.downcast::<Bridge>().map_err(|_| {
                MountError::InvalidArgument("lifetime bridge state has the wrong type".into())
            })?;
            bridge.host.unregister();
            unmount_bus.unsubscribe(&bridge.token);
            Ok(())
        },
    )
}
