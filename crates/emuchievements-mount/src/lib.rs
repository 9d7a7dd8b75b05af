//! Emuchievements mount system
//!
//! Lifecycle coordination for modifications injected into a host application
//! whose internals are undocumented and change without notice. Mounts (routes,
//! method patches, subscriptions) are declared up front, applied in order by
//! the [`MountManager`], and reversed in LIFO order on teardown. A broken host
//! internal disables the one mount that depends on it, never the whole set.

pub mod config;
pub mod error;
pub mod events;
pub mod guard;
pub mod host;
pub mod locator;
pub mod manager;
pub mod mount;
pub mod page;
pub mod patch;
pub mod traversal;

pub use config::{ActivationPolicy, MountConfig};
pub use error::{HostError, MountError};
pub use events::{
    is_known_event, AppLifetimeUpdate, EventBus, PublishReport, SubscriptionToken, APP_LIFETIME,
    KNOWN_EVENTS, MOUNTS_ACTIVE, MOUNTS_TORN_DOWN, SESSION_READY,
};
pub use host::{
    AfterHook, BeforeHook, ConnectivityProbe, HostExport, HostObject, HostRouter,
    LifetimeCallback, LifetimeNotifications, ModuleSource, ObjectRef, PatchHandle, PatchOutcome,
    PatchPrimitives, RenderProvider, RenderTree, ReplaceHook, SubscriptionHandle,
};
pub use locator::ModuleLocator;
pub use manager::{
    FailedMount, MountManager, MountRecord, Phase, RegistrationReport, TeardownReport,
    Unregister,
};
pub use mount::{GenericMount, Mount, MountKind, Teardown};
pub use page::PageMount;
pub use patch::{PatchDiscipline, PatchMount, PatchTarget};
