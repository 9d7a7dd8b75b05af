//! The plugin's patches on Steam client internals.
//!
//! Each constructor returns a mount the manager applies in order. Targets are
//! resolved at apply time, so a client update that moves one of them disables
//! that patch alone.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use emuchievements_mount::guard::guard_with_default;
use emuchievements_mount::locator::{ACHIEVEMENTS_FIELD, SECTIONS_MARKER};
use emuchievements_mount::{
    host, HostExport, Mount, MountError, MountKind, ObjectRef, PatchHandle, PatchMount,
    PatchOutcome, PatchPrimitives, PatchTarget, Teardown,
};

use crate::achievements::{app_id_of, is_shortcut, overview, set_achievements};
use crate::capabilities::HostCapabilities;
use crate::service::{AchievementService, StoreCategory};

/// Section id the game page shows achievements under.
pub const ACHIEVEMENTS_SECTION: &str = "achievements";

fn first_app_id(args: &[Value]) -> Option<u32> {
    args.first()
        .and_then(Value::as_u64)
        .and_then(|id| u32::try_from(id).ok())
}

fn member_value(obj: &ObjectRef, key: &str) -> Value {
    match host::lookup(obj, key) {
        Some(HostExport::Value(v)) => v,
        _ => Value::Null,
    }
}

/// Props of a fiber-like host object: memoized, else pending.
fn object_props(obj: &ObjectRef) -> Option<Value> {
    ["memoizedProps", "pendingProps"]
        .into_iter()
        .map(|key| member_value(obj, key))
        .find(|props| !props.is_null())
}

/// Read-modify-write one key of a JSON map member.
fn insert_into_map(obj: &ObjectRef, map: &str, key: String, value: Value) {
    let mut current = match member_value(obj, map) {
        Value::Object(m) => m,
        _ => serde_json::Map::new(),
    };
    current.insert(key, value);
    if let Err(e) = obj.set(map, Value::Object(current)) {
        tracing::warn!(object = %obj.label(), map, "could not update map: {e}");
    }
}

// ─── LoadMyAchievements ──────────────────────────────────────────────

/// Serve shortcut achievements from the service instead of Steam's backend.
pub fn load_my_achievements(
    caps: &HostCapabilities,
    service: Arc<dyn AchievementService>,
) -> PatchMount {
    let app_store = caps.app_store.clone();
    PatchMount::replace(
        caps.patches.clone(),
        PatchTarget::prototype_of_object_with_field(caps.locator(), ACHIEVEMENTS_FIELD),
        "LoadMyAchievements",
        Arc::new(move |this, args| {
            let Some(app_id) = first_app_id(args) else {
                return PatchOutcome::CallOriginal;
            };
            let shortcut = overview(&app_store, app_id).is_some_and(|o| is_shortcut(&o));
            let key = app_id.to_string();
            let cached = member_value(this, "m_mapGlobalAchievements")
                .get(&key)
                .is_some();
            if !shortcut || cached {
                return PatchOutcome::CallOriginal;
            }

            let snapshot = service.fetch_achievements(app_id);
            if !snapshot.global.loading {
                match serde_json::to_value(&snapshot.global) {
                    Ok(v) => insert_into_map(this, "m_mapGlobalAchievements", key.clone(), v),
                    Err(e) => tracing::warn!(app_id, "global achievements not serializable: {e}"),
                }
            }
            if !snapshot.user.loading {
                match serde_json::to_value(&snapshot.user) {
                    Ok(v) => insert_into_map(this, "m_mapMyAchievements", key, v),
                    Err(e) => tracing::warn!(app_id, "user achievements not serializable: {e}"),
                }
            }
            PatchOutcome::Return(Value::Null)
        }),
    )
}

// ─── BHasStoreCategory ───────────────────────────────────────────────

/// Report the achievements store category for shortcuts that have achievements.
pub fn store_category(
    caps: &HostCapabilities,
    service: Arc<dyn AchievementService>,
) -> PatchMount {
    let app_store = caps.app_store.clone();
    PatchMount::replace(
        caps.patches.clone(),
        PatchTarget::located(move || {
            let all_apps = host::object_at(&app_store, "allApps")?;
            let first = host::object_at(&all_apps, "0")?;
            Ok(host::prototype_of(&first)?)
        }),
        "BHasStoreCategory",
        Arc::new(move |this, args| {
            let this_overview = json!({
                "app_type": member_value(this, "app_type"),
                "appid": member_value(this, "appid"),
            });
            if !is_shortcut(&this_overview) {
                return PatchOutcome::CallOriginal;
            }
            let asks_achievements = args.first().and_then(Value::as_u64)
                == Some(StoreCategory::Achievements.id());
            let ready = app_id_of(&this_overview).is_some_and(|id| service.is_ready(id));
            if service.settings().store_category && ready && asks_achievements {
                PatchOutcome::Return(json!(true))
            } else {
                PatchOutcome::CallOriginal
            }
        }),
    )
}

// ─── Achievement injection ───────────────────────────────────────────

fn inject(caps: &HostCapabilities, service: &dyn AchievementService, app_id: u32) {
    if !service.is_ready(app_id) {
        return;
    }
    if let Err(e) = set_achievements(caps, service, app_id) {
        tracing::warn!(app_id, "achievement injection failed: {e}");
    }
}

/// Fill in achievement data whenever the details store is asked for it.
pub fn get_achievements(
    caps: &HostCapabilities,
    service: Arc<dyn AchievementService>,
) -> PatchMount {
    let hook_caps = caps.clone();
    PatchMount::before(
        caps.patches.clone(),
        PatchTarget::Direct(caps.app_details_store.clone()),
        "GetAchievements",
        Arc::new(move |_, args| {
            if let Some(app_id) = first_app_id(args) {
                inject(&hook_caps, service.as_ref(), app_id);
            }
        }),
    )
}

/// Fill in achievement data for the running app when the overlay checks it.
pub fn remote_play_together(
    caps: &HostCapabilities,
    service: Arc<dyn AchievementService>,
) -> PatchMount {
    let hook_caps = caps.clone();
    PatchMount::before(
        caps.patches.clone(),
        PatchTarget::Direct(caps.router_object.clone()),
        "BIsStreamingRemotePlayTogetherGame",
        Arc::new(move |this, _| {
            let app_id = app_id_of(&member_value(this, "MainRunningApp")).unwrap_or(0);
            inject(&hook_caps, service.as_ref(), app_id);
        }),
    )
}

// ─── App details sections ────────────────────────────────────────────

/// Nested `GetSections` patches, one per owner component type.
#[derive(Default)]
struct SectionPatches {
    by_owner_type: Mutex<HashMap<usize, Box<dyn PatchHandle>>>,
}

impl SectionPatches {
    fn revert_all(&self) -> usize {
        let handles: Vec<Box<dyn PatchHandle>> =
            self.by_owner_type.lock().drain().map(|(_, h)| h).collect();
        let count = handles.len();
        for handle in handles {
            handle.unregister();
        }
        count
    }
}

fn identity(obj: &ObjectRef) -> usize {
    Arc::as_ptr(obj) as *const () as usize
}

/// Adds the achievements section to shortcut game pages.
///
/// Patches the section registry's `render`; the first time a page for a
/// shortcut with achievements renders, the owning component type's
/// `GetSections` is patched too. Those nested patches are reverted together
/// with the render patch.
pub struct SectionsPatch {
    inner: PatchMount,
    nested: Arc<SectionPatches>,
}

impl std::fmt::Debug for SectionsPatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SectionsPatch")
            .field("nested", &self.nested_count())
            .finish_non_exhaustive()
    }
}

impl SectionsPatch {
    pub fn new(caps: &HostCapabilities, service: Arc<dyn AchievementService>) -> Self {
        let nested = Arc::new(SectionPatches::default());
        let hook_nested = nested.clone();
        let primitives = caps.patches.clone();

        let inner = PatchMount::after(
            caps.patches.clone(),
            PatchTarget::prototype_of_function_with_marker(caps.locator(), SECTIONS_MARKER),
            "render",
            Arc::new(move |this, _, component| {
                let Ok(owner) = host::object_at(this, "_owner") else {
                    return component;
                };
                let Some(overview) = object_props(&owner).and_then(|p| p.get("overview").cloned())
                else {
                    return component;
                };
                let ready = app_id_of(&overview).is_some_and(|id| service.is_ready(id));
                if is_shortcut(&overview) && ready {
                    patch_sections(&primitives, &hook_nested, &owner, service.clone());
                }
                component
            }),
        );

        Self { inner, nested }
    }

    /// Number of owner types whose `GetSections` is currently patched.
    pub fn nested_count(&self) -> usize {
        self.nested.by_owner_type.lock().len()
    }
}

fn patch_sections(
    primitives: &Arc<dyn PatchPrimitives>,
    nested: &SectionPatches,
    owner: &ObjectRef,
    service: Arc<dyn AchievementService>,
) {
    let target = match host::object_at(owner, "type").and_then(|t| host::prototype_of(&t)) {
        Ok(target) => target,
        Err(e) => {
            tracing::warn!(owner = %owner.label(), "owner type has no prototype: {e}");
            return;
        }
    };
    let key = identity(&target);

    let mut patched = nested.by_owner_type.lock();
    if patched.contains_key(&key) {
        return;
    }

    let hook = Arc::new(move |this: &ObjectRef, _: &[Value], sections: Value| {
        let fallback = sections.clone();
        guard_with_default("GetSections hook", fallback, || {
            adjust_sections(this, service.as_ref(), sections)
        })
    });
    match primitives.after_patch(&target, "GetSections", hook) {
        Ok(handle) => {
            tracing::debug!(owner_type = %target.label(), "sections patch applied");
            patched.insert(key, handle);
        }
        Err(e) => tracing::warn!(owner_type = %target.label(), "sections patch failed: {e}"),
    }
}

/// Add or remove the achievements section for the page `this` renders.
fn adjust_sections(this: &ObjectRef, service: &dyn AchievementService, sections: Value) -> Value {
    let Some(overview) = object_props(this).and_then(|p| p.get("overview").cloned()) else {
        return sections;
    };
    if !is_shortcut(&overview) {
        return sections;
    }
    let Value::Array(mut list) = sections else {
        return sections;
    };

    let app_id = app_id_of(&overview);
    let show = service.settings().game_page && app_id.is_some_and(|id| service.is_ready(id));
    let present = list.iter().any(|s| s == ACHIEVEMENTS_SECTION);
    if show && !present {
        list.push(json!(ACHIEVEMENTS_SECTION));
    } else if !show {
        list.retain(|s| s != ACHIEVEMENTS_SECTION);
    }
    tracing::debug!(app_id = ?app_id, sections = ?list, "sections adjusted");
    Value::Array(list)
}

#[async_trait]
impl Mount for SectionsPatch {
    fn kind(&self) -> MountKind {
        MountKind::Patch
    }

    fn label(&self) -> String {
        self.inner.label()
    }

    async fn mount(&self) -> Result<Teardown, MountError> {
        self.inner.mount().await
    }

    async fn unmount(&self, state: Teardown) -> Result<(), MountError> {
        let outer = self.inner.unmount(state).await;
        let reverted = self.nested.revert_all();
        tracing::debug!(reverted, "nested sections patches reverted");
        outer
    }
}
