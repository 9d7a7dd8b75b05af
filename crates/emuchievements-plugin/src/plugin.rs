//! Plugin activation: declares every mount and hands the host a descriptor.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use emuchievements_mount::{
    EventBus, HostRouter, MountError, MountManager, Phase, RegistrationReport, RenderProvider,
    TeardownReport, Unregister,
};

use crate::capabilities::HostCapabilities;
use crate::config::PluginConfig;
use crate::error::PluginError;
use crate::lifetime::lifetime_mount;
use crate::manifest::PluginManifest;
use crate::online::session_mount;
use crate::patches::{
    get_achievements, load_my_achievements, remote_play_together, store_category, SectionsPatch,
};
use crate::service::AchievementService;

type Registration = Arc<Mutex<Option<Result<Unregister, MountError>>>>;

/// What the host loader receives from [`activate`].
pub struct PluginDescriptor {
    pub title: String,
    pub icon: String,
    /// Renders the plugin's quick-access panel.
    pub content: RenderProvider,
    manager: MountManager,
    router: Arc<dyn HostRouter>,
    settings_route: String,
    shutdown: watch::Sender<bool>,
    dismounted: AtomicBool,
    task: Mutex<Option<JoinHandle<()>>>,
    registration: Registration,
}

impl std::fmt::Debug for PluginDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginDescriptor")
            .field("title", &self.title)
            .field("icon", &self.icon)
            .field("phase", &self.manager.phase())
            .finish_non_exhaustive()
    }
}

fn panel(title: &str, service: &Arc<dyn AchievementService>) -> RenderProvider {
    let title = title.to_string();
    let service = service.clone();
    Arc::new(move || {
        json!({
            "type": "EmuchievementsComponent",
            "title": title,
            "settings": service.settings(),
        })
    })
}

fn settings_page(service: &Arc<dyn AchievementService>) -> RenderProvider {
    let service = service.clone();
    Arc::new(move || json!({ "type": "SettingsComponent", "settings": service.settings() }))
}

fn game_list_page() -> RenderProvider {
    Arc::new(|| json!({ "type": "GameListComponent" }))
}

/// Declare the plugin's mounts and start registering them in the background.
///
/// Must be called from within a tokio runtime. The descriptor is returned
/// before registration finishes; [`PluginDescriptor::dismount`] is safe to call
/// at any point after that.
pub fn activate(
    caps: HostCapabilities,
    service: Arc<dyn AchievementService>,
    manifest: &PluginManifest,
    config: PluginConfig,
) -> Result<PluginDescriptor, PluginError> {
    manifest.check_host(&caps.host_version)?;

    let bus = EventBus::new();
    let manager = MountManager::new(bus.clone(), caps.router.clone(), config.mount.clone());
    let (shutdown, shutdown_rx) = watch::channel(false);

    // The game page itself gets its achievements section through
    // SectionsPatch; the app page route is not patched.
    manager.add_page_mount(&config.settings_route, settings_page(&service))?;
    manager.add_page_mount(&config.achievements_route, game_list_page())?;
    manager.add_patch_mount(load_my_achievements(&caps, service.clone()))?;
    manager.add_patch_mount(store_category(&caps, service.clone()))?;
    manager.add_patch_mount(get_achievements(&caps, service.clone()))?;
    manager.add_patch_mount(remote_play_together(&caps, service.clone()))?;
    manager.add_mount(SectionsPatch::new(&caps, service.clone()))?;
    manager.add_mount(lifetime_mount(&caps, bus.clone(), service.clone()))?;
    manager.add_mount(session_mount(
        caps.connectivity.clone(),
        service.clone(),
        bus,
        config.online_poll,
        shutdown_rx,
    ))?;

    tracing::info!(
        plugin = %manifest.plugin.name,
        version = %manifest.plugin.version,
        mounts = manager.declared(),
        "activating plugin"
    );

    let registration: Registration = Arc::new(Mutex::new(None));
    let task = {
        let manager = manager.clone();
        let slot = registration.clone();
        tokio::spawn(async move {
            let result = manager.register().await;
            match &result {
                Ok(done) => {
                    for failed in &done.report().failed {
                        tracing::warn!(mount = %failed.record, "mount unavailable: {}", failed.error);
                    }
                }
                Err(e) => tracing::error!("plugin activation failed: {e}"),
            }
            *slot.lock() = Some(result);
        })
    };

    Ok(PluginDescriptor {
        title: manifest.plugin.name.clone(),
        icon: manifest.icon().to_string(),
        content: panel(&manifest.plugin.name, &service),
        manager,
        router: caps.router.clone(),
        settings_route: config.settings_route,
        shutdown,
        dismounted: AtomicBool::new(false),
        task: Mutex::new(Some(task)),
        registration,
    })
}

impl PluginDescriptor {
    pub fn manager(&self) -> &MountManager {
        &self.manager
    }

    /// Wait until registration has finished, successfully or not.
    pub async fn registered(&self) -> Phase {
        let mut phase = self.manager.subscribe_phase();
        let settled = phase
            .wait_for(|p| !matches!(p, Phase::Idle | Phase::Registering))
            .await
            .map(|p| *p);
        settled.unwrap_or_else(|_| self.manager.phase())
    }

    /// Inspect the registration report once registration has finished.
    pub fn with_registration<R>(&self, f: impl FnOnce(&RegistrationReport) -> R) -> Option<R> {
        match self.registration.lock().as_ref() {
            Some(Ok(done)) => Some(f(done.report())),
            _ => None,
        }
    }

    /// Tear the plugin down.
    ///
    /// Cancels any wait for connectivity, removes the settings route and
    /// reverts every applied mount. Mounts not yet applied are skipped. A
    /// second call is rejected by the manager.
    pub async fn dismount(&self) -> Result<TeardownReport, PluginError> {
        let first = !self.dismounted.swap(true, Ordering::SeqCst);
        self.shutdown.send_replace(true);
        self.router.remove_route(&self.settings_route);

        if first {
            // register() may not have been polled yet, or may be rolling back.
            let mut phase = self.manager.subscribe_phase();
            let _ = phase
                .wait_for(|p| !matches!(p, Phase::Idle | Phase::Unregistering))
                .await;
        }

        let report = match self.manager.unregister().await {
            Ok(report) => report,
            // A fail-fast activation already reverted everything it applied.
            Err(MountError::InvalidState {
                phase: Phase::TornDown,
                ..
            }) if first => TeardownReport::default(),
            Err(e) => return Err(e.into()),
        };

        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::error!("registration task failed: {e}");
            }
        }

        tracing::info!(
            reverted = report.reverted.len(),
            failed = report.failed.len(),
            "plugin dismounted"
        );
        Ok(report)
    }
}
