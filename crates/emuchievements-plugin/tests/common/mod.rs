//! Shared helpers for the plugin integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use serde_json::json;

use emuchievements_host::SteamFixture;
use emuchievements_plugin::{HostCapabilities, MemoryAchievementService, UserAchievements};

/// The emulated shortcut registered by `SteamFixture::new`.
pub const SHORTCUT: u32 = 3_000_000_001;

/// Host capabilities backed by a simulated Steam client.
pub fn capabilities(steam: &SteamFixture) -> HostCapabilities {
    HostCapabilities {
        router: steam.router.clone(),
        patches: steam.patcher.clone(),
        modules: steam.modules.clone(),
        lifetime: steam.lifetime.clone(),
        connectivity: steam.connectivity.clone(),
        app_store: steam.app_store.as_ref_object(),
        app_details_store: steam.app_details_store.as_ref_object(),
        app_details_cache: steam.app_details_cache.as_ref_object(),
        router_object: steam.router_object.as_ref_object(),
        host_version: "3.5.0".to_string(),
    }
}

/// A service knowing two achievements for [`SHORTCUT`], one unlocked.
pub fn service() -> Arc<MemoryAchievementService> {
    let mut user = UserAchievements::default();
    user.achieved
        .insert("first_level".into(), json!({ "strID": "first_level", "bAchieved": true }));
    user.unachieved
        .insert("all_levels".into(), json!({ "strID": "all_levels", "bAchieved": false }));
    Arc::new(MemoryAchievementService::new().with_app(
        SHORTCUT,
        json!({ "first_level": 61.5, "all_levels": 4.2 }),
        user,
    ))
}
