//! The achievement service the plugin's mounts call into.
//!
//! Fetching, caching and settings persistence live behind
//! [`AchievementService`]. Hooks run synchronously inside host calls, so the
//! lookups they make are synchronous and return whatever is cached right now,
//! flagged as still loading when it is not.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::PluginError;

/// `app_type` of non-Steam shortcuts, the only apps the plugin augments.
pub const NON_STEAM_APP_TYPE: u64 = 1_073_741_824;

/// Steam store categories the plugin answers for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u64)]
pub enum StoreCategory {
    Achievements = 22,
}

impl StoreCategory {
    pub fn id(self) -> u64 {
        self as u64
    }
}

/// User-facing settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Report the achievements store category for shortcuts.
    pub store_category: bool,
    /// Show the achievements section on game pages.
    pub game_page: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            store_category: true,
            game_page: true,
        }
    }
}

/// A value that may still be loading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Loadable<T> {
    pub loading: bool,
    pub data: Option<T>,
}

impl<T> Loadable<T> {
    pub fn loading() -> Self {
        Self {
            loading: true,
            data: None,
        }
    }

    pub fn ready(data: Option<T>) -> Self {
        Self {
            loading: false,
            data,
        }
    }
}

/// One user's achievements for an app, keyed by achievement id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserAchievements {
    pub achieved: BTreeMap<String, Value>,
    pub unachieved: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AchievementSnapshot {
    pub global: Loadable<Value>,
    pub user: Loadable<UserAchievements>,
}

impl AchievementSnapshot {
    pub fn loading() -> Self {
        Self {
            global: Loadable::loading(),
            user: Loadable::loading(),
        }
    }
}

#[async_trait]
pub trait AchievementService: Send + Sync {
    /// Prepare the session; called once the host is online.
    async fn init(&self) -> Result<(), PluginError>;

    async fn deinit(&self) -> Result<(), PluginError>;

    /// True when achievements for `app_id` can be served.
    fn is_ready(&self, app_id: u32) -> bool;

    fn fetch_achievements(&self, app_id: u32) -> AchievementSnapshot;

    /// Drop cached runtime data so the next fetch reloads it.
    fn clear_runtime_cache(&self, app_id: u32);

    fn settings(&self) -> Settings;
}

// ─── In-memory service ──────────────────────────────────────────────

/// Calls observed by [`MemoryAchievementService`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceCall {
    Init,
    Deinit,
    Fetch(u32),
    ClearCache(u32),
}

/// Service backed by a fixed catalogue, used by the harness and tests.
#[derive(Debug, Default)]
pub struct MemoryAchievementService {
    catalogue: RwLock<HashMap<u32, (Value, UserAchievements)>>,
    cache: RwLock<HashMap<u32, AchievementSnapshot>>,
    settings: RwLock<Settings>,
    initialised: AtomicBool,
    calls: Mutex<Vec<ServiceCall>>,
}

impl MemoryAchievementService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an app's achievements to the catalogue.
    pub fn with_app(self, app_id: u32, global: Value, user: UserAchievements) -> Self {
        self.catalogue.write().insert(app_id, (global, user));
        self
    }

    pub fn set_settings(&self, settings: Settings) {
        *self.settings.write() = settings;
    }

    pub fn is_initialised(&self) -> bool {
        self.initialised.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<ServiceCall> {
        self.calls.lock().clone()
    }

    pub fn is_cached(&self, app_id: u32) -> bool {
        self.cache.read().contains_key(&app_id)
    }
}

#[async_trait]
impl AchievementService for MemoryAchievementService {
    async fn init(&self) -> Result<(), PluginError> {
        self.calls.lock().push(ServiceCall::Init);
        self.initialised.store(true, Ordering::SeqCst);
        tracing::info!(apps = self.catalogue.read().len(), "achievement service initialised");
        Ok(())
    }

    async fn deinit(&self) -> Result<(), PluginError> {
        self.calls.lock().push(ServiceCall::Deinit);
        self.initialised.store(false, Ordering::SeqCst);
        self.cache.write().clear();
        Ok(())
    }

    fn is_ready(&self, app_id: u32) -> bool {
        self.is_initialised() && self.catalogue.read().contains_key(&app_id)
    }

    fn fetch_achievements(&self, app_id: u32) -> AchievementSnapshot {
        self.calls.lock().push(ServiceCall::Fetch(app_id));
        if !self.is_initialised() {
            return AchievementSnapshot::loading();
        }
        if let Some(cached) = self.cache.read().get(&app_id) {
            return cached.clone();
        }

        let snapshot = match self.catalogue.read().get(&app_id) {
            Some((global, user)) => AchievementSnapshot {
                global: Loadable::ready(Some(global.clone())),
                user: Loadable::ready(Some(user.clone())),
            },
            None => AchievementSnapshot {
                global: Loadable::ready(None),
                user: Loadable::ready(None),
            },
        };
        self.cache.write().insert(app_id, snapshot.clone());
        snapshot
    }

    fn clear_runtime_cache(&self, app_id: u32) {
        self.calls.lock().push(ServiceCall::ClearCache(app_id));
        self.cache.write().remove(&app_id);
    }

    fn settings(&self) -> Settings {
        *self.settings.read()
    }
}
