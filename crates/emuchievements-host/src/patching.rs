//! Patch primitives over [`SimObject`] method tables.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use emuchievements_mount::{
    AfterHook, BeforeHook, HostError, ObjectRef, PatchHandle, PatchPrimitives, ReplaceHook,
};

use crate::object::{Layer, SimObject};

/// Applies patch layers to simulated objects.
#[derive(Debug, Default)]
pub struct SimPatcher {
    next_id: AtomicU64,
}

impl SimPatcher {
    pub fn new() -> Self {
        Self::default()
    }

    fn apply(
        &self,
        target: &ObjectRef,
        method: &str,
        layer: Layer,
    ) -> Result<Box<dyn PatchHandle>, HostError> {
        let label = target.label();
        let sim = target
            .clone()
            .as_any_arc()
            .downcast::<SimObject>()
            .map_err(|_| HostError::UnsupportedTarget(label.clone()))?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        sim.add_layer(method, id, layer)?;
        tracing::debug!(object = %label, method, layer = id, "patch applied");

        Ok(Box::new(SimPatchHandle {
            target: Arc::downgrade(&sim),
            method: method.to_string(),
            id,
            done: AtomicBool::new(false),
        }))
    }
}

impl PatchPrimitives for SimPatcher {
    fn replace_patch(
        &self,
        target: &ObjectRef,
        method: &str,
        hook: ReplaceHook,
    ) -> Result<Box<dyn PatchHandle>, HostError> {
        self.apply(target, method, Layer::Replace(hook))
    }

    fn before_patch(
        &self,
        target: &ObjectRef,
        method: &str,
        hook: BeforeHook,
    ) -> Result<Box<dyn PatchHandle>, HostError> {
        self.apply(target, method, Layer::Before(hook))
    }

    fn after_patch(
        &self,
        target: &ObjectRef,
        method: &str,
        hook: AfterHook,
    ) -> Result<Box<dyn PatchHandle>, HostError> {
        self.apply(target, method, Layer::After(hook))
    }
}

/// Removes one layer. Later calls do nothing.
pub struct SimPatchHandle {
    target: Weak<SimObject>,
    method: String,
    id: u64,
    done: AtomicBool,
}

impl PatchHandle for SimPatchHandle {
    fn unregister(&self) {
        if self.done.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(sim) = self.target.upgrade() {
            if sim.remove_layer(&self.method, self.id) {
                tracing::debug!(method = %self.method, layer = self.id, "patch removed");
            }
        }
    }
}
