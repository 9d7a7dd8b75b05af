//! Patch mounts: the safe-patch application protocol.
//!
//! A patch mount resolves its target only when the manager applies it, calls
//! exactly one host patch primitive, and keeps the returned handle as its
//! teardown state. The manager never looks inside the handle; unmount simply
//! asks it to undo itself.
//!
//! Hooks are wrapped before they reach the host so a panic inside one falls
//! back to the original behaviour instead of unwinding through host code.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{HostError, MountError};
use crate::guard::{guard, guard_with_default};
use crate::host::{
    AfterHook, BeforeHook, ObjectRef, PatchHandle, PatchOutcome, PatchPrimitives, ReplaceHook,
};
use crate::locator::ModuleLocator;
use crate::mount::{Mount, MountKind, Teardown};

type Resolver = Arc<dyn Fn() -> Result<ObjectRef, MountError> + Send + Sync>;

/// Where a patch is applied.
#[derive(Clone)]
pub enum PatchTarget {
    /// An object the plugin already holds.
    Direct(ObjectRef),
    /// An object found at apply time, e.g. through a [`ModuleLocator`].
    Located(Resolver),
}

impl PatchTarget {
    pub fn located<F>(resolve: F) -> Self
    where
        F: Fn() -> Result<ObjectRef, MountError> + Send + Sync + 'static,
    {
        PatchTarget::Located(Arc::new(resolve))
    }

    /// The prototype of the first exported object carrying `field`.
    pub fn prototype_of_object_with_field(locator: ModuleLocator, field: &'static str) -> Self {
        Self::located(move || {
            let obj = locator.find_object_with_field(field)?;
            Ok(crate::host::prototype_of(&obj)?)
        })
    }

    /// The prototype of the first exported function whose source has `marker`.
    pub fn prototype_of_function_with_marker(
        locator: ModuleLocator,
        marker: &'static str,
    ) -> Self {
        Self::located(move || {
            let func = locator.find_function_with_marker(marker)?;
            Ok(crate::host::prototype_of(&func)?)
        })
    }

    fn resolve(&self) -> Result<ObjectRef, MountError> {
        match self {
            PatchTarget::Direct(obj) => Ok(obj.clone()),
            PatchTarget::Located(resolve) => guard("patch target resolution", || resolve())?,
        }
    }
}

/// Which of the three host primitives a patch uses.
#[derive(Clone)]
pub enum PatchDiscipline {
    Replace(ReplaceHook),
    Before(BeforeHook),
    After(AfterHook),
}

impl PatchDiscipline {
    pub fn name(&self) -> &'static str {
        match self {
            PatchDiscipline::Replace(_) => "replace",
            PatchDiscipline::Before(_) => "before",
            PatchDiscipline::After(_) => "after",
        }
    }

    /// Wrap the hook so a panic defers to the host's original behaviour.
    fn contained(self) -> Self {
        match self {
            PatchDiscipline::Replace(hook) => PatchDiscipline::Replace(Arc::new(move |this, args| {
                guard_with_default("replace hook", PatchOutcome::CallOriginal, || hook(this, args))
            })),
            PatchDiscipline::Before(hook) => PatchDiscipline::Before(Arc::new(move |this, args| {
                let _ = guard("before hook", || hook(this, args));
            })),
            PatchDiscipline::After(hook) => PatchDiscipline::After(Arc::new(move |this, args, ret| {
                let fallback = ret.clone();
                guard_with_default("after hook", fallback, || hook(this, args, ret))
            })),
        }
    }

    fn apply(
        self,
        primitives: &dyn PatchPrimitives,
        target: &ObjectRef,
        method: &str,
    ) -> Result<Box<dyn PatchHandle>, HostError> {
        match self.contained() {
            PatchDiscipline::Replace(hook) => primitives.replace_patch(target, method, hook),
            PatchDiscipline::Before(hook) => primitives.before_patch(target, method, hook),
            PatchDiscipline::After(hook) => primitives.after_patch(target, method, hook),
        }
    }
}

type ApplyFn = Box<dyn Fn() -> Result<Box<dyn PatchHandle>, MountError> + Send + Sync>;

/// One deferred patch operation.
pub struct PatchMount {
    label: String,
    apply: ApplyFn,
}

impl std::fmt::Debug for PatchMount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PatchMount")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

impl PatchMount {
    /// A patch mount from a closure that performs exactly one primitive call.
    pub fn new<F>(label: impl Into<String>, apply: F) -> Self
    where
        F: Fn() -> Result<Box<dyn PatchHandle>, MountError> + Send + Sync + 'static,
    {
        Self {
            label: label.into(),
            apply: Box::new(apply),
        }
    }

    pub fn with_discipline(
        primitives: Arc<dyn PatchPrimitives>,
        target: PatchTarget,
        method: &str,
        discipline: PatchDiscipline,
    ) -> Self {
        let label = format!("{} patch {method}", discipline.name());
        let method = method.to_string();
        Self::new(label, move || {
            let target = target.resolve()?;
            discipline
                .clone()
                .apply(primitives.as_ref(), &target, &method)
                .map_err(|e| MountError::PatchApplication {
                    target: target.label(),
                    method: method.clone(),
                    reason: e.to_string(),
                })
        })
    }

    pub fn replace(
        primitives: Arc<dyn PatchPrimitives>,
        target: PatchTarget,
        method: &str,
        hook: ReplaceHook,
    ) -> Self {
        Self::with_discipline(primitives, target, method, PatchDiscipline::Replace(hook))
    }

    pub fn before(
        primitives: Arc<dyn PatchPrimitives>,
        target: PatchTarget,
        method: &str,
        hook: BeforeHook,
    ) -> Self {
        Self::with_discipline(primitives, target, method, PatchDiscipline::Before(hook))
    }

    pub fn after(
        primitives: Arc<dyn PatchPrimitives>,
        target: PatchTarget,
        method: &str,
        hook: AfterHook,
    ) -> Self {
        Self::with_discipline(primitives, target, method, PatchDiscipline::After(hook))
    }
}

#[async_trait]
impl Mount for PatchMount {
    fn kind(&self) -> MountKind {
        MountKind::Patch
    }

    fn label(&self) -> String {
        self.label.clone()
    }

    async fn mount(&self) -> Result<Teardown, MountError> {
        let handle = guard("patch apply", || (self.apply)())??;
        tracing::debug!(patch = %self.label, "patch applied");
        Ok(Teardown::Patch(handle))
    }

    async fn unmount(&self, state: Teardown) -> Result<(), MountError> {
        match state {
            Teardown::Patch(handle) => {
                guard("patch unregister", || handle.unregister())?;
                tracing::debug!(patch = %self.label, "patch reverted");
                Ok(())
            }
            other => {
                tracing::warn!(patch = %self.label, state = ?other, "no patch handle to revert");
                Ok(())
            }
        }
    }
}
