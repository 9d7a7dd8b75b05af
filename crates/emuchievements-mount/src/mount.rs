//! The mount abstraction: one reversible modification of the host.

use std::any::Any;
use std::fmt;
use std::future::Future;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde::Serialize;

use crate::error::MountError;
use crate::host::{PatchHandle, SubscriptionHandle};

/// Which family a mount belongs to, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MountKind {
    Page,
    Patch,
    Generic,
}

impl fmt::Display for MountKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MountKind::Page => "page",
            MountKind::Patch => "patch",
            MountKind::Generic => "generic",
        })
    }
}

/// State a successful `mount()` hands back for its own `unmount()`.
pub enum Teardown {
    None,
    Route(String),
    Patch(Box<dyn PatchHandle>),
    Subscription(Box<dyn SubscriptionHandle>),
    Custom(Box<dyn Any + Send + Sync>),
}

impl fmt::Debug for Teardown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Teardown::None => f.write_str("None"),
            Teardown::Route(path) => f.debug_tuple("Route").field(path).finish(),
            Teardown::Patch(_) => f.write_str("Patch(..)"),
            Teardown::Subscription(_) => f.write_str("Subscription(..)"),
            Teardown::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// One declarative apply/revert unit.
///
/// Nothing happens until the manager calls [`Mount::mount`]; whatever that
/// returns is passed back, unchanged, to [`Mount::unmount`].
#[async_trait]
pub trait Mount: Send + Sync {
    fn kind(&self) -> MountKind;

    fn label(&self) -> String;

    async fn mount(&self) -> Result<Teardown, MountError>;

    async fn unmount(&self, state: Teardown) -> Result<(), MountError>;
}

type MountFn = Box<dyn Fn() -> BoxFuture<'static, Result<Teardown, MountError>> + Send + Sync>;
type UnmountFn = Box<dyn Fn(Teardown) -> BoxFuture<'static, Result<(), MountError>> + Send + Sync>;

/// A mount built from a pair of closures: subscriptions, state init and the like.
pub struct GenericMount {
    label: String,
    mount_fn: MountFn,
    unmount_fn: UnmountFn,
}

impl fmt::Debug for GenericMount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenericMount")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

impl GenericMount {
    /// Build from async closures.
    pub fn new<M, MF, U, UF>(label: impl Into<String>, mount: M, unmount: U) -> Self
    where
        M: Fn() -> MF + Send + Sync + 'static,
        MF: Future<Output = Result<Teardown, MountError>> + Send + 'static,
        U: Fn(Teardown) -> UF + Send + Sync + 'static,
        UF: Future<Output = Result<(), MountError>> + Send + 'static,
    {
        Self {
            label: label.into(),
            mount_fn: Box::new(move || mount().boxed()),
            unmount_fn: Box::new(move |state| unmount(state).boxed()),
        }
    }

    /// Build from synchronous closures.
    pub fn from_sync<M, U>(label: impl Into<String>, mount: M, unmount: U) -> Self
    where
        M: Fn() -> Result<Teardown, MountError> + Send + Sync + 'static,
        U: Fn(Teardown) -> Result<(), MountError> + Send + Sync + 'static,
    {
        Self {
            label: label.into(),
            mount_fn: Box::new(move || futures_util::future::ready(mount()).boxed()),
            unmount_fn: Box::new(move |state| futures_util::future::ready(unmount(state)).boxed()),
        }
    }
}

#[async_trait]
impl Mount for GenericMount {
    fn kind(&self) -> MountKind {
        MountKind::Generic
    }

    fn label(&self) -> String {
        self.label.clone()
    }

    async fn mount(&self) -> Result<Teardown, MountError> {
        (self.mount_fn)().await
    }

    async fn unmount(&self, state: Teardown) -> Result<(), MountError> {
        (self.unmount_fn)(state).await
    }
}
