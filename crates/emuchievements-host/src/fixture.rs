//! A Steam-shaped host built from simulated objects.
//!
//! Mirrors the parts of the Steam client UI the plugin touches: the app store
//! and its overview objects, the app-details store and cache, the router
//! object, the achievements container module and the app-details section
//! component with its owner fiber.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{json, Map, Value};

use emuchievements_mount::{HostError, HostExport, HostObject, ObjectRef};

use crate::lifetime::SimLifetime;
use crate::modules::SimModules;
use crate::network::SimConnectivity;
use crate::object::SimObject;
use crate::patching::SimPatcher;
use crate::router::SimRouter;

/// `app_type` Steam assigns to non-Steam shortcuts.
pub const SHORTCUT_APP_TYPE: u64 = 1_073_741_824;
/// `app_type` of a regular Steam game.
pub const GAME_APP_TYPE: u64 = 1;

/// Source text of the section registry component, as the locator sees it.
pub const SECTIONS_SOURCE: &str =
    "function AppDetailsSections(e){this.m_setSectionsMemo=new Map;this.state={}}";

/// Sections the native `GetSections` reports for every app.
pub const NATIVE_SECTIONS: &[&str] = &["overview", "activity", "news"];

fn member(this: &ObjectRef, key: &str) -> Value {
    this.get(key)
        .and_then(|m| m.as_value().cloned())
        .unwrap_or(Value::Null)
}

fn appid_arg(args: &[Value]) -> Result<u64, HostError> {
    args.first()
        .and_then(Value::as_u64)
        .ok_or_else(|| HostError::TypeMismatch("expected an app id argument".into()))
}

/// Every plain-data member of `obj` as one JSON object.
fn snapshot(obj: &ObjectRef) -> Value {
    let mut out = Map::new();
    for key in obj.keys() {
        if let Some(HostExport::Value(v)) = obj.get(&key) {
            out.insert(key, v);
        }
    }
    Value::Object(out)
}

/// Read-modify-write a JSON map member of `this`.
fn update_member(
    this: &ObjectRef,
    key: &str,
    f: impl FnOnce(&mut Map<String, Value>),
) -> Result<(), HostError> {
    let mut map = match member(this, key) {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    f(&mut map);
    this.set(key, Value::Object(map))
}

fn empty_achievements() -> Value {
    json!({
        "nAchieved": 0,
        "nTotal": 0,
        "vecAchievedHidden": [],
        "vecHighlight": [],
        "vecUnachieved": [],
    })
}

/// The simulated Steam client.
pub struct SteamFixture {
    pub patcher: Arc<SimPatcher>,
    pub router: Arc<SimRouter>,
    pub modules: Arc<SimModules>,
    pub lifetime: Arc<SimLifetime>,
    pub connectivity: Arc<SimConnectivity>,

    pub app_store: Arc<SimObject>,
    pub all_apps: Arc<SimObject>,
    pub overview_proto: Arc<SimObject>,
    pub app_details_store: Arc<SimObject>,
    pub app_details_cache: Arc<SimObject>,
    pub router_object: Arc<SimObject>,

    /// Module export carrying `m_mapMyAchievements`.
    pub achievements: Arc<SimObject>,
    pub achievements_proto: Arc<SimObject>,
    /// The section registry component and its instance prototype.
    pub sections: Arc<SimObject>,
    pub sections_proto: Arc<SimObject>,
    /// Class of the component owning the app-details sections.
    pub owner_type: Arc<SimObject>,
    pub owner_proto: Arc<SimObject>,

    overviews: Mutex<BTreeMap<u64, Arc<SimObject>>>,
    owners: Mutex<BTreeMap<u64, Arc<SimObject>>>,
}

impl std::fmt::Debug for SteamFixture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SteamFixture")
            .field("apps", &self.overviews.lock().keys().collect::<Vec<_>>())
            .field("routes", &self.router.paths())
            .finish_non_exhaustive()
    }
}

impl SteamFixture {
    /// An empty client with no apps and connectivity online.
    pub fn empty() -> Self {
        let overview_proto = SimObject::builder("SteamAppOverview.prototype")
            .method("BHasStoreCategory", |this, args| {
                let wanted = args
                    .first()
                    .and_then(Value::as_u64)
                    .ok_or_else(|| HostError::TypeMismatch("expected a store category".into()))?;
                let has = member(this, "store_category")
                    .as_array()
                    .is_some_and(|cats| cats.iter().any(|c| c.as_u64() == Some(wanted)));
                Ok(json!(has))
            })
            .build();

        let all_apps = SimObject::builder("appStore.allApps").build();

        let app_store = SimObject::builder("appStore")
            .object("allApps", all_apps.as_ref_object())
            .method("GetAppOverviewByAppID", |this, args| {
                let appid = appid_arg(args)?;
                let Some(HostExport::Object(apps)) = this.get("allApps") else {
                    return Ok(Value::Null);
                };
                for key in apps.keys() {
                    if let Some(HostExport::Object(app)) = apps.get(&key) {
                        if member(&app, "appid").as_u64() == Some(appid) {
                            return Ok(snapshot(&app));
                        }
                    }
                }
                Ok(Value::Null)
            })
            .build();

        let app_details_store = SimObject::builder("appDetailsStore")
            .value("m_mapAppData", json!({}))
            .method("GetAppData", |this, args| {
                let appid = appid_arg(args)?;
                Ok(member(this, "m_mapAppData")
                    .get(appid.to_string())
                    .cloned()
                    .unwrap_or(Value::Null))
            })
            .method("GetAchievements", |this, args| {
                let appid = appid_arg(args)?;
                Ok(member(this, "m_mapAppData")
                    .pointer(&format!("/{appid}/details/achievements"))
                    .cloned()
                    .unwrap_or(Value::Null))
            })
            .build();

        let app_details_cache = SimObject::builder("appDetailsCache")
            .value("cache", json!({}))
            .method("SetCachedDataForApp", |this, args| {
                let appid = appid_arg(args)?;
                let key = args
                    .get(1)
                    .and_then(Value::as_str)
                    .ok_or_else(|| HostError::TypeMismatch("expected a cache key".into()))?
                    .to_string();
                let version = args.get(2).cloned().unwrap_or(Value::Null);
                let data = args.get(3).cloned().unwrap_or(Value::Null);
                update_member(this, "cache", |cache| {
                    let entry = cache
                        .entry(appid.to_string())
                        .or_insert_with(|| json!({}));
                    if let Some(entry) = entry.as_object_mut() {
                        entry.insert(key, json!({ "version": version, "data": data }));
                    }
                })?;
                Ok(Value::Null)
            })
            .build();

        let router_object = SimObject::builder("Router")
            .value("MainRunningApp", Value::Null)
            .method("BIsStreamingRemotePlayTogetherGame", |_, _| Ok(json!(false)))
            .build();

        let achievements_proto = SimObject::builder("Achievements.prototype")
            .method("LoadMyAchievements", |this, args| {
                let appid = appid_arg(args)?.to_string();
                let loaded = json!({ "loading": false, "data": { "source": "steam" } });
                update_member(this, "m_mapGlobalAchievements", |m| {
                    m.insert(appid.clone(), loaded.clone());
                })?;
                update_member(this, "m_mapMyAchievements", |m| {
                    m.insert(appid.clone(), loaded.clone());
                })?;
                Ok(Value::Null)
            })
            .build();
        let achievements = SimObject::builder("Achievements")
            .value("m_mapMyAchievements", json!({}))
            .value("m_mapGlobalAchievements", json!({}))
            .prototype(achievements_proto.as_ref_object())
            .build();

        let sections_proto = SimObject::builder("AppDetailsSections.prototype")
            .method("render", |this, _| {
                let appid = match this.get("_owner") {
                    Some(HostExport::Object(owner)) => member(&owner, "memoizedProps")
                        .pointer("/overview/appid")
                        .cloned()
                        .unwrap_or(Value::Null),
                    _ => Value::Null,
                };
                Ok(json!({ "type": "AppDetailsSections", "appid": appid }))
            })
            .build();
        let sections = SimObject::builder("AppDetailsSections")
            .source(SECTIONS_SOURCE)
            .prototype(sections_proto.as_ref_object())
            .build();

        let owner_proto = SimObject::builder("AppDetailsOwner.prototype")
            .method("GetSections", |_, _| Ok(json!(NATIVE_SECTIONS)))
            .build();
        let owner_type = SimObject::builder("AppDetailsOwner")
            .source("function AppDetailsOwner(e){}")
            .prototype(owner_proto.as_ref_object())
            .build();

        let modules = Arc::new(SimModules::new());
        modules.push(HostExport::Value(json!("not an object module")));
        modules.push(HostExport::Object(
            SimObject::builder("module 4821")
                .object("Xt", achievements.as_ref_object())
                .value("version", json!(3))
                .build(),
        ));
        modules.push(HostExport::Object(
            SimObject::builder("module 9173")
                .object("Qd", owner_type.as_ref_object())
                .object("nI", sections.as_ref_object())
                .build(),
        ));

        Self {
            patcher: Arc::new(SimPatcher::new()),
            router: Arc::new(SimRouter::new()),
            modules,
            lifetime: Arc::new(SimLifetime::new()),
            connectivity: Arc::new(SimConnectivity::new(true)),
            app_store,
            all_apps,
            overview_proto,
            app_details_store,
            app_details_cache,
            router_object,
            achievements,
            achievements_proto,
            sections,
            sections_proto,
            owner_type,
            owner_proto,
            overviews: Mutex::new(BTreeMap::new()),
            owners: Mutex::new(BTreeMap::new()),
        }
    }

    /// A client with one Steam game (620) and one non-Steam shortcut.
    pub fn new() -> Self {
        let fixture = Self::empty();
        fixture.add_app(620, "Portal 2", GAME_APP_TYPE);
        fixture.add_app(3_000_000_001, "Emulated Game", SHORTCUT_APP_TYPE);
        fixture
    }

    /// Register an app in the store, the details store and the UI.
    pub fn add_app(&self, appid: u64, name: &str, app_type: u64) -> Arc<SimObject> {
        let overview = SimObject::builder(&format!("overview {appid}"))
            .value("appid", json!(appid))
            .value("app_type", json!(app_type))
            .value("display_name", json!(name))
            .value("store_category", json!([]))
            .prototype(self.overview_proto.as_ref_object())
            .build();

        let index = self.overviews.lock().len();
        self.all_apps
            .insert_object(&index.to_string(), overview.as_ref_object());
        self.overviews.lock().insert(appid, overview.clone());

        self.app_details_store.update_value("m_mapAppData", |data| {
            if !data.is_object() {
                *data = json!({});
            }
            data[appid.to_string()] = json!({
                "bLoadingAchievments": false,
                "details": { "achievements": empty_achievements() },
            });
        });

        let owner = SimObject::builder(&format!("owner fiber {appid}"))
            .value(
                "memoizedProps",
                json!({ "overview": { "appid": appid, "app_type": app_type, "display_name": name } }),
            )
            .object("type", self.owner_type.as_ref_object())
            .prototype(self.owner_proto.as_ref_object())
            .build();
        self.owners.lock().insert(appid, owner);

        overview
    }

    pub fn overview(&self, appid: u64) -> Option<Arc<SimObject>> {
        self.overviews.lock().get(&appid).cloned()
    }

    /// Mark which app the router reports as running.
    pub fn set_main_running_app(&self, appid: Option<u64>) {
        let value = appid
            .and_then(|id| self.overview(id))
            .map(|o| snapshot(&o.as_ref_object()))
            .unwrap_or(Value::Null);
        self.router_object.update_value("MainRunningApp", |v| *v = value);
    }

    /// Render the app-details page sections for `appid`.
    pub fn render_app_details(&self, appid: u64) -> Result<Value, HostError> {
        let owner = self
            .owners
            .lock()
            .get(&appid)
            .cloned()
            .ok_or_else(|| HostError::Rejected(format!("no app {appid}")))?;
        let instance = SimObject::builder("AppDetailsSections instance")
            .object("_owner", owner.as_ref_object())
            .prototype(self.sections_proto.as_ref_object())
            .build();
        instance.invoke("render", Vec::new())
    }

    /// Sections the page owner reports for `appid`.
    pub fn sections_for(&self, appid: u64) -> Result<Vec<String>, HostError> {
        let owner = self
            .owners
            .lock()
            .get(&appid)
            .cloned()
            .ok_or_else(|| HostError::Rejected(format!("no app {appid}")))?;
        let sections = owner.invoke("GetSections", Vec::new())?;
        Ok(sections
            .as_array()
            .map(|s| s.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default())
    }

    pub fn app_data(&self, appid: u64) -> Value {
        self.app_details_store
            .invoke("GetAppData", vec![json!(appid)])
            .unwrap_or(Value::Null)
    }

    /// The details-cache entry written for `appid` under `key`.
    pub fn cached(&self, appid: u64, key: &str) -> Option<Value> {
        self.app_details_cache
            .value("cache")
            .and_then(|c| c.get(appid.to_string())?.get(key).cloned())
    }

    /// A fiber tree shaped like the Steam UI root.
    pub fn ui_tree(&self) -> Value {
        json!({
            "type": "Root",
            "memoizedProps": { "className": "Root" },
            "child": {
                "type": "Overlay",
                "pendingProps": { "className": "Overlay" },
                "sibling": {
                    "type": "Main",
                    "memoizedProps": { "className": "MainShell GamePadUI Focusable" },
                    "child": {
                        "type": "Library",
                        "memoizedProps": { "id": "library" },
                    },
                },
            },
        })
    }
}

impl Default for SteamFixture {
    fn default() -> Self {
        Self::new()
    }
}
