//! Everything the plugin reaches in the host, handed over at activation.

use std::sync::Arc;

use emuchievements_mount::{
    ConnectivityProbe, HostRouter, LifetimeNotifications, ModuleLocator, ModuleSource, ObjectRef,
    PatchPrimitives,
};

/// The host singletons the plugin's mounts operate on.
#[derive(Clone)]
pub struct HostCapabilities {
    pub router: Arc<dyn HostRouter>,
    pub patches: Arc<dyn PatchPrimitives>,
    pub modules: Arc<dyn ModuleSource>,
    pub lifetime: Arc<dyn LifetimeNotifications>,
    pub connectivity: Arc<dyn ConnectivityProbe>,
    /// `appStore`: app overviews by id, `allApps`.
    pub app_store: ObjectRef,
    /// `appDetailsStore`: per-app detail data.
    pub app_details_store: ObjectRef,
    pub app_details_cache: ObjectRef,
    /// The UI router object (`MainRunningApp`).
    pub router_object: ObjectRef,
    /// Host version, checked against the manifest's minimum.
    pub host_version: String,
}

impl std::fmt::Debug for HostCapabilities {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostCapabilities")
            .field("app_store", &self.app_store.label())
            .field("app_details_store", &self.app_details_store.label())
            .field("app_details_cache", &self.app_details_cache.label())
            .field("router_object", &self.router_object.label())
            .field("host_version", &self.host_version)
            .finish_non_exhaustive()
    }
}

impl HostCapabilities {
    pub fn locator(&self) -> ModuleLocator {
        ModuleLocator::new(self.modules.clone())
    }
}
