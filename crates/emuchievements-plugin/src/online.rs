//! Session start gated on network connectivity.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use emuchievements_mount::{
    ConnectivityProbe, EventBus, GenericMount, MountError, Teardown, SESSION_READY,
};

use crate::error::PluginError;
use crate::service::AchievementService;

/// Ask the probe once.
pub async fn check_online_status(probe: &dyn ConnectivityProbe) -> bool {
    probe.is_online().await
}

/// Poll until the host reports connectivity.
///
/// Returns [`PluginError::Cancelled`] as soon as `shutdown` flips to true, so a
/// dismount never waits on the network.
pub async fn wait_for_online(
    probe: &dyn ConnectivityProbe,
    interval: Duration,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<(), PluginError> {
    loop {
        if *shutdown.borrow() {
            return Err(PluginError::Cancelled("plugin dismounted while offline".into()));
        }
        if probe.is_online().await {
            return Ok(());
        }
        tracing::debug!(interval_ms = interval.as_millis() as u64, "offline, waiting");
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            changed = shutdown.changed() => {
                if changed.is_err() {
                    // Sender gone: nobody can dismount any more, keep polling.
                    tokio::time::sleep(interval).await;
                }
            }
        }
    }
}

/// Initialise the achievement service once online; deinitialise on unmount.
pub fn session_mount(
    probe: Arc<dyn ConnectivityProbe>,
    service: Arc<dyn AchievementService>,
    bus: EventBus,
    interval: Duration,
    shutdown: watch::Receiver<bool>,
) -> GenericMount {
    let deinit_service = service.clone();
    GenericMount::new(
        "online session",
        move || {
            let probe = probe.clone();
            let service = service.clone();
            let bus = bus.clone();
            let mut shutdown = shutdown.clone();
            async move {
                if !check_online_status(probe.as_ref()).await {
                    tracing::info!("host offline, deferring session start");
                    wait_for_online(probe.as_ref(), interval, &mut shutdown).await?;
                }
                service.init().await?;
                tracing::info!("achievement session ready");
                let report = bus.publish(SESSION_READY, &serde_json::Value::Null);
                if !report.is_clean() {
                    tracing::warn!(failures = report.failures.len(), "session_ready handlers failed");
                }
                Ok::<_, MountError>(Teardown::None)
            }
        },
        move |_| {
            let service = deinit_service.clone();
            async move {
                service.deinit().await?;
                Ok::<_, MountError>(())
            }
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use emuchievements_host::SimConnectivity;
    use emuchievements_mount::Mount;

    use crate::service::{MemoryAchievementService, ServiceCall};

    #[tokio::test]
    async fn test_online_starts_immediately() {
        let net = Arc::new(SimConnectivity::new(true));
        let svc = Arc::new(MemoryAchievementService::new());
        let bus = EventBus::new();
        let ready = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let ready2 = ready.clone();
        bus.subscribe(SESSION_READY, move |_| {
            ready2.store(true, std::sync::atomic::Ordering::SeqCst);
            Ok(())
        })
        .unwrap();

        let (_tx, rx) = watch::channel(false);
        let mount = session_mount(net.clone(), svc.clone(), bus, Duration::from_secs(5), rx);
        let state = mount.mount().await.unwrap();
        assert!(svc.is_initialised());
        assert!(ready.load(std::sync::atomic::Ordering::SeqCst));
        assert_eq!(net.probe_count(), 1);

        mount.unmount(state).await.unwrap();
        assert_eq!(svc.calls(), vec![ServiceCall::Init, ServiceCall::Deinit]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_for_connectivity() {
        let net = Arc::new(SimConnectivity::new(false));
        let svc = Arc::new(MemoryAchievementService::new());
        let (_tx, rx) = watch::channel(false);
        let mount = session_mount(
            net.clone(),
            svc.clone(),
            EventBus::new(),
            Duration::from_millis(100),
            rx,
        );

        let flip = net.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(350)).await;
            flip.set_online(true);
        });

        mount.mount().await.unwrap();
        assert!(svc.is_initialised());
        // Initial check, then one probe per interval until online.
        assert!(net.probe_count() >= 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_wait() {
        let net = Arc::new(SimConnectivity::new(false));
        let svc = Arc::new(MemoryAchievementService::new());
        let (tx, rx) = watch::channel(false);
        let mount = session_mount(net, svc.clone(), EventBus::new(), Duration::from_secs(60), rx);

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            let _ = tx.send(true);
        });

        let err = mount.mount().await.unwrap_err();
        assert!(matches!(err, MountError::Collaborator(msg) if msg.contains("cancelled")));
        assert!(!svc.is_initialised());
    }
}
