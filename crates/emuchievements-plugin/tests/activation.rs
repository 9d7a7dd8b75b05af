//! End-to-end activation against a simulated Steam client.

mod common;

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{json, Value};

use emuchievements_host::{SimRouter, SteamFixture, NATIVE_SECTIONS};
use emuchievements_mount::{
    AppLifetimeUpdate, EventBus, HostObject, ModuleLocator, MountConfig, MountError,
    MountManager, PatchMount, PatchOutcome, PatchTarget, Phase, MOUNTS_ACTIVE, SESSION_READY,
};
use emuchievements_plugin::lifetime::lifetime_mount;
use emuchievements_plugin::patches::ACHIEVEMENTS_SECTION;
use emuchievements_plugin::service::ServiceCall;
use emuchievements_plugin::{activate, PluginConfig, PluginError, PluginManifest};

use common::{capabilities, service, SHORTCUT};

const SHORTCUT_ID: u64 = SHORTCUT as u64;

fn stopped(app_id: u32) -> AppLifetimeUpdate {
    AppLifetimeUpdate {
        app_id,
        instance_id: 7,
        running: false,
    }
}

fn patched_layers(steam: &SteamFixture) -> Vec<usize> {
    vec![
        steam.achievements_proto.layer_count("LoadMyAchievements"),
        steam.overview_proto.layer_count("BHasStoreCategory"),
        steam.app_details_store.layer_count("GetAchievements"),
        steam
            .router_object
            .layer_count("BIsStreamingRemotePlayTogetherGame"),
        steam.sections_proto.layer_count("render"),
    ]
}

#[tokio::test]
async fn test_full_activation_and_dismount() {
    let steam = SteamFixture::new();
    let svc = service();
    let manifest = PluginManifest::bundled().unwrap();
    let config = PluginConfig::default();
    let plugin = activate(capabilities(&steam), svc.clone(), &manifest, config.clone()).unwrap();

    let events = Arc::new(Mutex::new(Vec::new()));
    for event in [SESSION_READY, MOUNTS_ACTIVE] {
        let seen = events.clone();
        plugin
            .manager()
            .bus()
            .subscribe(event, move |payload| {
                seen.lock().push((event, payload.clone()));
                Ok(())
            })
            .unwrap();
    }

    assert_eq!(plugin.registered().await, Phase::Active);
    assert_eq!(plugin.with_registration(|r| (r.applied.len(), r.failed.len())), Some((9, 0)));
    {
        let events = events.lock();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].0, SESSION_READY);
        assert_eq!(events[1].0, MOUNTS_ACTIVE);
        assert_eq!(events[1].1["applied"].as_array().unwrap().len(), 9);
    }

    // Pages.
    assert!(steam.router.has_route(&config.settings_route));
    assert!(steam.router.has_route(&config.achievements_route));
    let settings = steam.router.render(&config.settings_route).unwrap();
    assert_eq!(settings["type"], "SettingsComponent");

    // Patches.
    assert_eq!(patched_layers(&steam), vec![1, 1, 1, 1, 1]);
    assert!(svc.is_initialised());
    let summary = steam
        .app_details_store
        .invoke("GetAchievements", vec![json!(SHORTCUT_ID)])
        .unwrap();
    assert_eq!(summary["nAchieved"], 1);
    assert_eq!(summary["nTotal"], 2);
    assert_eq!(
        steam
            .overview(SHORTCUT_ID)
            .unwrap()
            .invoke("BHasStoreCategory", vec![json!(22)])
            .unwrap(),
        json!(true)
    );

    steam.render_app_details(SHORTCUT_ID).unwrap();
    let sections = steam.sections_for(SHORTCUT_ID).unwrap();
    assert!(sections.iter().any(|s| s == ACHIEVEMENTS_SECTION));
    assert_eq!(steam.sections_for(620).unwrap(), NATIVE_SECTIONS);
    assert_eq!(steam.owner_proto.layer_count("GetSections"), 1);

    // Lifetime notifications reach the service through the bus.
    assert_eq!(steam.lifetime.subscriber_count(), 1);
    steam.lifetime.emit(stopped(SHORTCUT));
    let calls = svc.calls();
    assert!(calls.contains(&ServiceCall::ClearCache(SHORTCUT)));

    let report = plugin.dismount().await.unwrap();
    assert_eq!(report.reverted.len(), 9);
    assert!(report.failed.is_empty());
    assert_eq!(report.reverted[0].label, "online session");
    assert_eq!(report.reverted[8].label, format!("page {}", config.settings_route));
    assert_eq!(plugin.manager().phase(), Phase::TornDown);

    assert_eq!(patched_layers(&steam), vec![0, 0, 0, 0, 0]);
    assert_eq!(steam.owner_proto.layer_count("GetSections"), 0);
    assert!(steam.router.paths().is_empty());
    assert_eq!(steam.lifetime.subscriber_count(), 0);
    assert_eq!(svc.calls().last(), Some(&ServiceCall::Deinit));
    assert_eq!(steam.sections_for(SHORTCUT_ID).unwrap(), NATIVE_SECTIONS);

    let err = plugin.dismount().await.unwrap_err();
    assert!(matches!(err, PluginError::Mount(MountError::InvalidState { .. })));
}

#[tokio::test(start_paused = true)]
async fn test_dismount_while_offline_cancels_session_start() {
    let steam = SteamFixture::new();
    steam.connectivity.set_online(false);
    let svc = service();
    let manifest = PluginManifest::bundled().unwrap();
    let config = PluginConfig {
        online_poll: Duration::from_secs(60),
        ..PluginConfig::default()
    };
    let plugin = activate(capabilities(&steam), svc.clone(), &manifest, config).unwrap();

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(plugin.manager().phase(), Phase::Registering);
    assert_eq!(plugin.manager().applied().len(), 8);

    let report = plugin.dismount().await.unwrap();
    assert_eq!(report.reverted.len(), 8);
    assert_eq!(patched_layers(&steam), vec![0, 0, 0, 0, 0]);
    assert!(steam.router.paths().is_empty());

    let failed = plugin
        .with_registration(|r| {
            r.failed
                .iter()
                .map(|f| (f.record.label.clone(), f.error.to_string()))
                .collect::<Vec<_>>()
        })
        .unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].0, "online session");
    assert!(failed[0].1.contains("cancelled"));
    assert!(!svc.is_initialised());
    assert!(!svc.calls().contains(&ServiceCall::Init));
}

#[tokio::test(start_paused = true)]
async fn test_session_starts_once_connectivity_returns() {
    let steam = SteamFixture::new();
    steam.connectivity.set_online(false);
    let svc = service();
    let manifest = PluginManifest::bundled().unwrap();
    let config = PluginConfig {
        online_poll: Duration::from_millis(500),
        ..PluginConfig::default()
    };
    let plugin = activate(capabilities(&steam), svc.clone(), &manifest, config).unwrap();

    tokio::time::sleep(Duration::from_millis(1200)).await;
    assert!(!svc.is_initialised());
    steam.connectivity.set_online(true);

    assert_eq!(plugin.registered().await, Phase::Active);
    assert!(svc.is_initialised());
    plugin.dismount().await.unwrap();
}

#[tokio::test]
async fn test_missing_host_internals_disable_single_patches() {
    // No apps: the store-category patch has nothing to locate.
    let steam = SteamFixture::empty();
    let manifest = PluginManifest::bundled().unwrap();
    let plugin =
        activate(capabilities(&steam), service(), &manifest, PluginConfig::default()).unwrap();

    assert_eq!(plugin.registered().await, Phase::Active);
    let failed = plugin
        .with_registration(|r| {
            assert_eq!(r.applied.len(), 8);
            r.failed.iter().map(|f| f.record.label.clone()).collect::<Vec<_>>()
        })
        .unwrap();
    assert_eq!(failed, vec!["replace patch BHasStoreCategory".to_string()]);

    let report = plugin.dismount().await.unwrap();
    assert_eq!(report.reverted.len(), 8);
}

#[tokio::test]
async fn test_fail_fast_rolls_back_and_dismount_is_clean() {
    let steam = SteamFixture::empty();
    let manifest = PluginManifest::bundled().unwrap();
    let config = PluginConfig {
        mount: MountConfig::fail_fast(),
        ..PluginConfig::default()
    };
    let plugin = activate(capabilities(&steam), service(), &manifest, config).unwrap();

    assert_eq!(plugin.registered().await, Phase::TornDown);
    assert!(plugin.with_registration(|_| ()).is_none());
    assert!(steam.router.paths().is_empty());
    assert_eq!(steam.achievements_proto.layer_count("LoadMyAchievements"), 0);

    let report = plugin.dismount().await.unwrap();
    assert!(report.reverted.is_empty());
    assert!(plugin.dismount().await.is_err());
}

#[tokio::test]
async fn test_incompatible_host_is_rejected_before_any_mount() {
    let steam = SteamFixture::new();
    let mut caps = capabilities(&steam);
    caps.host_version = "1.0.0".into();
    let manifest = PluginManifest::bundled().unwrap();
    let err = activate(caps, service(), &manifest, PluginConfig::default()).unwrap_err();
    assert!(matches!(err, PluginError::IncompatibleHost { .. }));
    assert!(steam.router.paths().is_empty());
}

#[tokio::test]
async fn test_page_patch_and_subscription_with_locator_miss() {
    let steam = SteamFixture::new();
    let caps = capabilities(&steam);
    let router = Arc::new(SimRouter::new());
    let bus = EventBus::new();
    let manager = MountManager::new(bus.clone(), router.clone(), MountConfig::default());

    manager
        .add_page_mount("/a", Arc::new(|| json!({ "type": "A" })))
        .unwrap();
    manager
        .add_patch_mount(PatchMount::replace(
            caps.patches.clone(),
            PatchTarget::prototype_of_function_with_marker(
                ModuleLocator::new(caps.modules.clone()),
                "NoSuchComponentMarker",
            ),
            "render",
            Arc::new(|_, _| PatchOutcome::CallOriginal),
        ))
        .unwrap();
    manager
        .add_mount(lifetime_mount(&caps, bus.clone(), service()))
        .unwrap();

    let handle = manager.register().await.unwrap();
    let report = handle.report();
    assert_eq!(report.applied.len(), 2);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].record.index, 1);
    assert!(matches!(report.failed[0].error, MountError::LocatorMiss(_)));
    assert!(router.has_route("/a"));
    assert_eq!(steam.lifetime.subscriber_count(), 1);

    let teardown = handle.unregister().await.unwrap();
    let order: Vec<&str> = teardown.reverted.iter().map(|r| r.label.as_str()).collect();
    assert_eq!(order, vec!["app lifetime notifications", "page /a"]);
    assert!(!router.has_route("/a"));
    assert_eq!(steam.lifetime.subscriber_count(), 0);

    let payload: Value = json!(stopped(SHORTCUT));
    assert_eq!(bus.publish("app_lifetime", &payload).delivered, 0);
}
