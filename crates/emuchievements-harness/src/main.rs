use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use emuchievements_host::SteamFixture;
use emuchievements_mount::traversal::find_gamepad_root;
use emuchievements_mount::{AppLifetimeUpdate, HostObject, MountError};
use emuchievements_plugin::{
    activate, HostCapabilities, MemoryAchievementService, PluginConfig, PluginError,
    PluginManifest, UserAchievements,
};

const EMULATED_APP: u32 = 3_000_000_001;
const DEFAULT_RUN_MS: u64 = 250;

fn capabilities(steam: &SteamFixture) -> HostCapabilities {
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
        host_version: std::env::var("HARNESS_HOST_VERSION").unwrap_or_else(|_| "3.6.0".into()),
    }
}

fn demo_service() -> MemoryAchievementService {
    let mut user = UserAchievements::default();
    user.achieved.insert(
        "beat_first_boss".into(),
        json!({ "strID": "beat_first_boss", "strName": "Beat the first boss", "bAchieved": true }),
    );
    user.unachieved.insert(
        "no_damage".into(),
        json!({ "strID": "no_damage", "strName": "Finish without damage", "bAchieved": false }),
    );
    MemoryAchievementService::new().with_app(
        EMULATED_APP,
        json!({ "beat_first_boss": 48.0, "no_damage": 1.5 }),
        user,
    )
}

fn run_ms() -> u64 {
    std::env::var("HARNESS_RUN_MS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_RUN_MS)
}

async fn run() -> Result<(), PluginError> {
    let steam = SteamFixture::new();
    let manifest = PluginManifest::bundled()?;
    let config = PluginConfig::from_env();
    let service = Arc::new(demo_service());

    let plugin = activate(capabilities(&steam), service.clone(), &manifest, config)?;
    let phase = plugin.registered().await;
    tracing::info!(title = %plugin.title, phase = %phase, "plugin loaded");
    plugin.with_registration(|report| {
        for record in &report.applied {
            tracing::info!(mount = %record, "applied");
        }
        for failed in &report.failed {
            tracing::warn!(mount = %failed.record, "not applied: {}", failed.error);
        }
    });

    match find_gamepad_root(Some(&steam.ui_tree())) {
        Some(root) => tracing::info!(node = %root["type"], "gamepad UI root found"),
        None => tracing::warn!("gamepad UI root not found"),
    }

    for path in steam.router.paths() {
        if let Some(tree) = steam.router.render(&path) {
            tracing::info!(route = %path, tree = %tree, "route rendered");
        }
    }

    let summary = steam
        .app_details_store
        .invoke("GetAchievements", vec![json!(EMULATED_APP)])
        .map_err(MountError::from)?;
    tracing::info!(
        app_id = EMULATED_APP,
        achieved = %summary["nAchieved"],
        total = %summary["nTotal"],
        "achievement summary"
    );
    steam
        .render_app_details(u64::from(EMULATED_APP))
        .map_err(MountError::from)?;
    let sections = steam
        .sections_for(u64::from(EMULATED_APP))
        .map_err(MountError::from)?;
    tracing::info!(app_id = EMULATED_APP, sections = ?sections, "game page sections");

    for running in [true, false] {
        steam.lifetime.emit(AppLifetimeUpdate {
            app_id: EMULATED_APP,
            instance_id: 1,
            running,
        });
    }

    tokio::time::sleep(Duration::from_millis(run_ms())).await;

    let report = plugin.dismount().await?;
    for record in &report.reverted {
        tracing::debug!(mount = %record, "reverted");
    }
    tracing::info!(
        routes_left = steam.router.paths().len(),
        service_calls = service.calls().len(),
        "harness finished"
    );
    Ok(())
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    if let Err(e) = run().await {
        tracing::error!("harness failed: {e}");
        std::process::exit(1);
    }
}
