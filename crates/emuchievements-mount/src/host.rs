//! Capability traits for the host the plugin is injected into.
//!
//! The host's singletons (router, stores, patch primitives, module table) are
//! never reached through globals. Each is handed to the components that need
//! it as one of these trait objects, so tests can substitute fakes.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::HostError;
use crate::events::AppLifetimeUpdate;

/// Shared reference to a node of the host object graph.
pub type ObjectRef = Arc<dyn HostObject>;

/// A member reachable from a host object or module table.
#[derive(Clone)]
pub enum HostExport {
    /// Plain data (numbers, strings, maps).
    Value(serde_json::Value),
    /// An object with its own members; functions and classes are objects too.
    Object(ObjectRef),
}

impl HostExport {
    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            HostExport::Object(obj) => Some(obj),
            HostExport::Value(_) => None,
        }
    }

    pub fn as_value(&self) -> Option<&serde_json::Value> {
        match self {
            HostExport::Value(v) => Some(v),
            HostExport::Object(_) => None,
        }
    }
}

impl fmt::Debug for HostExport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostExport::Value(v) => f.debug_tuple("Value").field(v).finish(),
            HostExport::Object(o) => f.debug_tuple("Object").field(o).finish(),
        }
    }
}

impl fmt::Debug for dyn HostObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("HostObject").field(&self.label()).finish()
    }
}

/// One object in the host's graph, viewed without any static shape.
///
/// Every accessor is fallible: members may be missing or of a different kind
/// than the plugin expects on any given host version.
pub trait HostObject: Send + Sync {
    /// Diagnostic name used in logs and errors.
    fn label(&self) -> String;

    /// Names of the object's own members.
    fn keys(&self) -> Vec<String>;

    fn get(&self, key: &str) -> Option<HostExport>;

    fn set(&self, key: &str, value: serde_json::Value) -> Result<(), HostError>;

    /// Source text when the object is a function or class.
    fn source(&self) -> Option<String> {
        None
    }

    /// The object methods are inherited from, if any.
    fn prototype(&self) -> Option<ObjectRef> {
        None
    }

    /// Call a method with this object as the receiver.
    fn invoke(&self, method: &str, args: Vec<serde_json::Value>)
        -> Result<serde_json::Value, HostError>;

    /// Upcast used by patch primitives to reach their concrete object type.
    fn as_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

/// Enumerates every module the host has loaded.
pub trait ModuleSource: Send + Sync {
    fn modules(&self) -> Vec<HostExport>;
}

// ─── Patch primitives ─────────────────────────────────────────────────

/// Result of a replace-style hook.
#[derive(Debug, Clone, PartialEq)]
pub enum PatchOutcome {
    /// Sentinel: run the original method instead.
    CallOriginal,
    /// Use this value as the method's result.
    Return(serde_json::Value),
}

/// Runs instead of the original; `this` is the receiver of the call.
pub type ReplaceHook =
    Arc<dyn Fn(&ObjectRef, &[serde_json::Value]) -> PatchOutcome + Send + Sync>;

/// Runs before the original and may rewrite its arguments.
pub type BeforeHook = Arc<dyn Fn(&ObjectRef, &mut Vec<serde_json::Value>) + Send + Sync>;

/// Runs after the original and returns the (possibly replaced) result.
pub type AfterHook = Arc<
    dyn Fn(&ObjectRef, &[serde_json::Value], serde_json::Value) -> serde_json::Value
        + Send
        + Sync,
>;

/// Single-use capability that undoes one applied patch.
pub trait PatchHandle: Send + Sync {
    /// Remove the patch. Calling it again is harmless.
    fn unregister(&self);
}

/// The host framework's monkey-patching primitives.
pub trait PatchPrimitives: Send + Sync {
    fn replace_patch(
        &self,
        target: &ObjectRef,
        method: &str,
        hook: ReplaceHook,
    ) -> Result<Box<dyn PatchHandle>, HostError>;

    fn before_patch(
        &self,
        target: &ObjectRef,
        method: &str,
        hook: BeforeHook,
    ) -> Result<Box<dyn PatchHandle>, HostError>;

    fn after_patch(
        &self,
        target: &ObjectRef,
        method: &str,
        hook: AfterHook,
    ) -> Result<Box<dyn PatchHandle>, HostError>;
}

// ─── Router ───────────────────────────────────────────────────────────

/// A rendered UI subtree. Rendering itself belongs to the host.
pub type RenderTree = serde_json::Value;

/// Produces the UI subtree for a route each time the host renders it.
pub type RenderProvider = Arc<dyn Fn() -> RenderTree + Send + Sync>;

pub trait HostRouter: Send + Sync {
    fn add_route(&self, path: &str, provider: RenderProvider) -> Result<(), HostError>;

    /// Remove `path`. Removing an unknown path is not an error.
    fn remove_route(&self, path: &str);
}

// ─── Notifications & connectivity ─────────────────────────────────────

/// Handle returned by a host notification registration.
pub trait SubscriptionHandle: Send + Sync {
    fn unregister(&self);
}

pub type LifetimeCallback = Arc<dyn Fn(AppLifetimeUpdate) + Send + Sync>;

/// App start/stop notifications from the host's game-session service.
pub trait LifetimeNotifications: Send + Sync {
    fn register_for_app_lifetime_notifications(
        &self,
        callback: LifetimeCallback,
    ) -> Result<Box<dyn SubscriptionHandle>, HostError>;
}

/// Reports whether the host currently has network access.
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    async fn is_online(&self) -> bool;
}

// ─── Fallible access helpers ─────────────────────────────────────────

/// Look up `key` on `obj`, then along its prototype chain.
pub fn lookup(obj: &ObjectRef, key: &str) -> Option<HostExport> {
    let mut current = Some(obj.clone());
    let mut hops = 0;
    while let Some(o) = current {
        if let Some(found) = o.get(key) {
            return Some(found);
        }
        hops += 1;
        if hops > 32 {
            return None;
        }
        current = o.prototype();
    }
    None
}

/// Look up `key` on `obj` and require it to be an object.
pub fn object_at(obj: &ObjectRef, key: &str) -> Result<ObjectRef, HostError> {
    match obj.get(key) {
        Some(HostExport::Object(o)) => Ok(o),
        Some(HostExport::Value(_)) => Err(HostError::TypeMismatch(format!(
            "{}.{key} is not an object",
            obj.label()
        ))),
        None => Err(HostError::MissingProperty {
            object: obj.label(),
            property: key.to_string(),
        }),
    }
}

/// Look up `key` on `obj` and require it to be plain data.
pub fn value_at(obj: &ObjectRef, key: &str) -> Result<serde_json::Value, HostError> {
    match obj.get(key) {
        Some(HostExport::Value(v)) => Ok(v),
        Some(HostExport::Object(_)) => Err(HostError::TypeMismatch(format!(
            "{}.{key} is an object",
            obj.label()
        ))),
        None => Err(HostError::MissingProperty {
            object: obj.label(),
            property: key.to_string(),
        }),
    }
}

/// The object's prototype, or a [`HostError::MissingProperty`] naming it.
pub fn prototype_of(obj: &ObjectRef) -> Result<ObjectRef, HostError> {
    obj.prototype().ok_or_else(|| HostError::MissingProperty {
        object: obj.label(),
        property: "prototype".to_string(),
    })
}
