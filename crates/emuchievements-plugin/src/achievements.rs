//! Reading and writing the host's per-app achievement data.

use serde_json::{json, Value};

use emuchievements_mount::{host, HostError, HostExport, ObjectRef};

use crate::capabilities::HostCapabilities;
use crate::service::{AchievementService, NON_STEAM_APP_TYPE};

/// Member of the app-details store holding app data by id.
const APP_DATA_MAP: &str = "m_mapAppData";

/// Version tag the details cache expects for achievement entries.
const ACHIEVEMENTS_CACHE_VERSION: u64 = 2;

/// The app overview the store reports for `app_id`, if any.
pub fn overview(app_store: &ObjectRef, app_id: u32) -> Option<Value> {
    match app_store.invoke("GetAppOverviewByAppID", vec![json!(app_id)]) {
        Ok(Value::Null) => None,
        Ok(overview) => Some(overview),
        Err(e) => {
            tracing::warn!(app_id, "app overview lookup failed: {e}");
            None
        }
    }
}

pub fn is_shortcut(overview: &Value) -> bool {
    overview.get("app_type").and_then(Value::as_u64) == Some(NON_STEAM_APP_TYPE)
}

/// Read an `appid` field as a Steam app id.
pub fn app_id_of(value: &Value) -> Option<u32> {
    value
        .get("appid")
        .and_then(Value::as_u64)
        .and_then(|id| u32::try_from(id).ok())
}

/// Rewrite the app data the store keeps for `app_id`.
fn update_app_data(
    store: &ObjectRef,
    app_id: u32,
    f: impl FnOnce(&mut Value),
) -> Result<(), HostError> {
    let mut map = match host::lookup(store, APP_DATA_MAP) {
        Some(HostExport::Value(map)) => map,
        Some(HostExport::Object(_)) => {
            return Err(HostError::TypeMismatch(format!(
                "{}.{APP_DATA_MAP} is an object",
                store.label()
            )))
        }
        None => {
            return Err(HostError::MissingProperty {
                object: store.label(),
                property: APP_DATA_MAP.to_string(),
            })
        }
    };
    let entry = map
        .get_mut(app_id.to_string())
        .ok_or_else(|| HostError::Rejected(format!("no app data for {app_id}")))?;
    if !entry.is_object() {
        return Err(HostError::TypeMismatch(format!(
            "app data for {app_id} is not an object"
        )));
    }
    f(entry);
    store.set(APP_DATA_MAP, map)
}

/// Fill in the host's achievement summary for `app_id` from the service.
///
/// Only touches apps whose data is loaded, not already being filled and still
/// reporting zero achievements. Returns true when data was written.
pub fn set_achievements(
    caps: &HostCapabilities,
    service: &dyn AchievementService,
    app_id: u32,
) -> Result<bool, HostError> {
    let store = &caps.app_details_store;
    let app_data = store.invoke("GetAppData", vec![json!(app_id)])?;
    if app_data.is_null() {
        return Ok(false);
    }
    let loading = app_data
        .get("bLoadingAchievments")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let total = app_data
        .pointer("/details/achievements/nTotal")
        .and_then(Value::as_u64)
        .unwrap_or(0);
    if loading || total != 0 {
        return Ok(false);
    }

    update_app_data(store, app_id, |data| data["bLoadingAchievments"] = json!(true))?;

    let snapshot = service.fetch_achievements(app_id);
    let Some(user) = snapshot.user.data else {
        update_app_data(store, app_id, |data| data["bLoadingAchievments"] = json!(false))?;
        return Ok(false);
    };

    let highlight: Vec<Value> = user.achieved.values().cloned().collect();
    let unachieved: Vec<Value> = user.unachieved.values().cloned().collect();
    let summary = json!({
        "nAchieved": user.achieved.len(),
        "nTotal": user.achieved.len() + user.unachieved.len(),
        "vecAchievedHidden": [],
        "vecHighlight": highlight,
        "vecUnachieved": unachieved,
    });

    let written = summary.clone();
    update_app_data(store, app_id, move |data| {
        if !data["details"].is_object() {
            data["details"] = json!({});
        }
        data["details"]["achievements"] = written;
        data["bLoadingAchievments"] = json!(false);
    })?;
    caps.app_details_cache.invoke(
        "SetCachedDataForApp",
        vec![
            json!(app_id),
            json!("achievements"),
            json!(ACHIEVEMENTS_CACHE_VERSION),
            summary,
        ],
    )?;

    tracing::debug!(app_id, "achievements injected");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use emuchievements_host::{SimObject, SteamFixture, GAME_APP_TYPE};

    use crate::service::{MemoryAchievementService, UserAchievements};
    use crate::test_support::{capabilities, SHORTCUT};

    fn service() -> MemoryAchievementService {
        let mut user = UserAchievements::default();
        user.achieved.insert("a".into(), json!({ "strID": "a" }));
        user.achieved.insert("b".into(), json!({ "strID": "b" }));
        user.unachieved.insert("c".into(), json!({ "strID": "c" }));
        MemoryAchievementService::new().with_app(SHORTCUT, json!({}), user)
    }

    #[test]
    fn test_overview_and_shortcut_detection() {
        let steam = SteamFixture::new();
        let caps = capabilities(&steam);
        let shortcut = overview(&caps.app_store, SHORTCUT).unwrap();
        assert!(is_shortcut(&shortcut));
        assert_eq!(app_id_of(&shortcut), Some(SHORTCUT));
        assert!(!is_shortcut(&overview(&caps.app_store, 620).unwrap()));
        assert!(overview(&caps.app_store, 12345).is_none());
    }

    #[tokio::test]
    async fn test_set_achievements_fills_summary_and_cache() {
        let steam = SteamFixture::new();
        let caps = capabilities(&steam);
        let svc = service();
        svc.init().await.unwrap();

        assert!(set_achievements(&caps, &svc, SHORTCUT).unwrap());

        let data = steam.app_data(SHORTCUT as u64);
        let summary = &data["details"]["achievements"];
        assert_eq!(summary["nAchieved"], 2);
        assert_eq!(summary["nTotal"], 3);
        assert_eq!(summary["vecHighlight"].as_array().unwrap().len(), 2);
        assert_eq!(summary["vecUnachieved"][0]["strID"], "c");
        assert_eq!(summary["vecAchievedHidden"], json!([]));
        assert_eq!(data["bLoadingAchievments"], false);

        let cached = steam.cached(SHORTCUT as u64, "achievements").unwrap();
        assert_eq!(cached["version"], 2);
        assert_eq!(cached["data"], *summary);

        // A populated summary is left alone.
        assert!(!set_achievements(&caps, &svc, SHORTCUT).unwrap());
    }

    #[tokio::test]
    async fn test_set_achievements_skips_loading_and_unknown_apps() {
        let steam = SteamFixture::new();
        steam.add_app(42, "Other", GAME_APP_TYPE);
        let caps = capabilities(&steam);
        let svc = service();
        svc.init().await.unwrap();

        assert!(!set_achievements(&caps, &svc, 999).unwrap());

        update_app_data(&caps.app_details_store, SHORTCUT, |d| {
            d["bLoadingAchievments"] = json!(true)
        })
        .unwrap();
        assert!(!set_achievements(&caps, &svc, SHORTCUT).unwrap());

        // No user data for app 42: the loading flag is cleared again.
        assert!(!set_achievements(&caps, &svc, 42).unwrap());
        assert_eq!(steam.app_data(42)["bLoadingAchievments"], false);
    }

    #[test]
    fn test_missing_app_data_map_is_host_error() {
        let steam = SteamFixture::new();
        let mut caps = capabilities(&steam);
        let bare = SimObject::builder("bare store")
            .method("GetAppData", |_, _| Ok(json!({ "details": {} })))
            .build();
        caps.app_details_store = bare.as_ref_object();
        let svc = service();
        let err = set_achievements(&caps, &svc, SHORTCUT).unwrap_err();
        assert!(matches!(err, HostError::MissingProperty { .. }));
    }
}
