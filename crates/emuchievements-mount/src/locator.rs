//! Structural module lookup.
//!
//! Host internals have no stable names or export identities, so modules are
//! recognised by shape: a function whose source mentions a marker token, or an
//! object that carries a particular nested map.

use std::sync::Arc;

use crate::error::MountError;
use crate::guard::{guard, guard_with_default};
use crate::host::{HostExport, ModuleSource, ObjectRef};

/// Source marker of the app-details section registry.
pub const SECTIONS_MARKER: &str = "m_setSectionsMemo";
/// Field carried by the achievements container.
pub const ACHIEVEMENTS_FIELD: &str = "m_mapMyAchievements";

/// Best-effort binding to host modules through structural predicates.
#[derive(Clone)]
pub struct ModuleLocator {
    source: Arc<dyn ModuleSource>,
}

impl std::fmt::Debug for ModuleLocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleLocator").finish_non_exhaustive()
    }
}

impl ModuleLocator {
    pub fn new(source: Arc<dyn ModuleSource>) -> Self {
        Self { source }
    }

    /// Return the first module member `predicate` accepts.
    ///
    /// A predicate that panics on one module is treated as a miss for that
    /// module only. `what` names the search in the [`MountError::LocatorMiss`].
    pub fn find_module_child<T>(
        &self,
        what: &str,
        mut predicate: impl FnMut(&HostExport) -> Option<T>,
    ) -> Result<T, MountError> {
        let modules = guard_with_default("module enumeration", Vec::new(), || {
            self.source.modules()
        });

        for (index, module) in modules.iter().enumerate() {
            match guard("module predicate", || predicate(module)) {
                Ok(Some(found)) => {
                    tracing::debug!(what = %what, module_index = index, "module located");
                    return Ok(found);
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::debug!(what = %what, module_index = index, "predicate faulted: {e}");
                }
            }
        }

        tracing::warn!(what = %what, scanned = modules.len(), "no host module matched");
        Err(MountError::LocatorMiss(what.to_string()))
    }

    /// The exported function whose source contains `marker`.
    pub fn find_function_with_marker(&self, marker: &str) -> Result<ObjectRef, MountError> {
        self.find_module_child(&format!("function containing `{marker}`"), |m| {
            function_with_marker(m, marker)
        })
    }

    /// The exported object that carries `field`.
    pub fn find_object_with_field(&self, field: &str) -> Result<ObjectRef, MountError> {
        self.find_module_child(&format!("object with `{field}`"), |m| {
            object_with_field(m, field)
        })
    }
}

fn members(module: &HostExport) -> impl Iterator<Item = ObjectRef> + '_ {
    let obj = module.as_object();
    obj.map(|o| o.keys())
        .unwrap_or_default()
        .into_iter()
        .filter_map(move |key| obj.and_then(|o| o.get(&key)))
        .filter_map(|export| export.as_object().cloned())
}

/// Predicate: a member function whose source text contains `marker`.
pub fn function_with_marker(module: &HostExport, marker: &str) -> Option<ObjectRef> {
    members(module).find(|member| {
        member
            .source()
            .is_some_and(|src| src.contains(marker))
    })
}

/// Predicate: a member object that has a `field` member of its own.
pub fn object_with_field(module: &HostExport, field: &str) -> Option<ObjectRef> {
    members(module).find(|member| member.get(field).is_some())
}
