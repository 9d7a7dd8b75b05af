//! Patchable in-memory host objects.
//!
//! A `SimObject` carries plain members, a method table and an optional
//! prototype. Every method slot keeps its original implementation plus a
//! stack of patch layers; a call runs the newest layer first and lets each
//! layer decide whether the ones beneath it run.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use serde_json::Value;

use emuchievements_mount::{
    AfterHook, BeforeHook, HostError, HostExport, HostObject, ObjectRef, PatchOutcome, ReplaceHook,
};

/// Native implementation of a host method; `this` is the call receiver.
pub type NativeMethod = Arc<dyn Fn(&ObjectRef, &[Value]) -> Result<Value, HostError> + Send + Sync>;

/// One patch applied to a method slot.
#[derive(Clone)]
pub enum Layer {
    Replace(ReplaceHook),
    Before(BeforeHook),
    After(AfterHook),
}

#[derive(Clone)]
struct MethodSlot {
    original: NativeMethod,
    layers: Vec<(u64, Layer)>,
}

/// An object in the simulated host graph.
pub struct SimObject {
    name: String,
    members: RwLock<BTreeMap<String, HostExport>>,
    methods: RwLock<HashMap<String, MethodSlot>>,
    source: Option<String>,
    prototype: Option<ObjectRef>,
    self_ref: Weak<SimObject>,
}

impl std::fmt::Debug for SimObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimObject")
            .field("name", &self.name)
            .field("members", &self.members.read().keys().collect::<Vec<_>>())
            .field("methods", &self.methods.read().keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

/// Builder for [`SimObject`].
pub struct SimObjectBuilder {
    name: String,
    members: BTreeMap<String, HostExport>,
    methods: HashMap<String, NativeMethod>,
    source: Option<String>,
    prototype: Option<ObjectRef>,
}

impl SimObjectBuilder {
    pub fn value(mut self, key: &str, value: Value) -> Self {
        self.members.insert(key.to_string(), HostExport::Value(value));
        self
    }

    pub fn object(mut self, key: &str, object: ObjectRef) -> Self {
        self.members.insert(key.to_string(), HostExport::Object(object));
        self
    }

    pub fn method<F>(mut self, name: &str, f: F) -> Self
    where
        F: Fn(&ObjectRef, &[Value]) -> Result<Value, HostError> + Send + Sync + 'static,
    {
        self.methods.insert(name.to_string(), Arc::new(f));
        self
    }

    pub fn source(mut self, source: &str) -> Self {
        self.source = Some(source.to_string());
        self
    }

    pub fn prototype(mut self, prototype: ObjectRef) -> Self {
        self.prototype = Some(prototype);
        self
    }

    pub fn build(self) -> Arc<SimObject> {
        let methods = self
            .methods
            .into_iter()
            .map(|(name, original)| {
                (
                    name,
                    MethodSlot {
                        original,
                        layers: Vec::new(),
                    },
                )
            })
            .collect();
        Arc::new_cyclic(|self_ref| SimObject {
            name: self.name,
            members: RwLock::new(self.members),
            methods: RwLock::new(methods),
            source: self.source,
            prototype: self.prototype,
            self_ref: self_ref.clone(),
        })
    }
}

fn run_layers(
    original: &NativeMethod,
    layers: &[(u64, Layer)],
    this: &ObjectRef,
    args: Vec<Value>,
) -> Result<Value, HostError> {
    let Some(((_, layer), beneath)) = layers.split_last() else {
        return original(this, &args);
    };
    match layer {
        Layer::Replace(hook) => match hook(this, &args) {
            PatchOutcome::CallOriginal => run_layers(original, beneath, this, args),
            PatchOutcome::Return(value) => Ok(value),
        },
        Layer::Before(hook) => {
            let mut args = args;
            hook(this, &mut args);
            run_layers(original, beneath, this, args)
        }
        Layer::After(hook) => {
            let ret = run_layers(original, beneath, this, args.clone())?;
            Ok(hook(this, &args, ret))
        }
    }
}

impl SimObject {
    pub fn builder(name: &str) -> SimObjectBuilder {
        SimObjectBuilder {
            name: name.to_string(),
            members: BTreeMap::new(),
            methods: HashMap::new(),
            source: None,
            prototype: None,
        }
    }

    /// This object as a trait object.
    pub fn as_ref_object(self: &Arc<Self>) -> ObjectRef {
        self.clone()
    }

    /// Run `method` with `this` as the receiver, walking the prototype chain.
    pub fn call_as(
        &self,
        this: &ObjectRef,
        method: &str,
        args: Vec<Value>,
    ) -> Result<Value, HostError> {
        // Snapshot the slot so hooks may patch or call back into this object.
        let slot = self.methods.read().get(method).cloned();
        if let Some(slot) = slot {
            return run_layers(&slot.original, &slot.layers, this, args);
        }

        match &self.prototype {
            Some(proto) => match proto.clone().as_any_arc().downcast::<SimObject>() {
                Ok(sim) => sim.call_as(this, method, args),
                Err(_) => proto.invoke(method, args),
            },
            None => Err(HostError::MissingMethod {
                object: self.name.clone(),
                method: method.to_string(),
            }),
        }
    }

    /// Push a patch layer onto an own method.
    pub fn add_layer(&self, method: &str, id: u64, layer: Layer) -> Result<(), HostError> {
        let mut methods = self.methods.write();
        let slot = methods.get_mut(method).ok_or_else(|| HostError::MissingMethod {
            object: self.name.clone(),
            method: method.to_string(),
        })?;
        slot.layers.push((id, layer));
        Ok(())
    }

    /// Remove the layer with `id`. Returns false if it was not present.
    pub fn remove_layer(&self, method: &str, id: u64) -> bool {
        let mut methods = self.methods.write();
        let Some(slot) = methods.get_mut(method) else {
            return false;
        };
        let before = slot.layers.len();
        slot.layers.retain(|(layer_id, _)| *layer_id != id);
        slot.layers.len() != before
    }

    /// Number of patch layers currently on `method`.
    pub fn layer_count(&self, method: &str) -> usize {
        self.methods
            .read()
            .get(method)
            .map(|slot| slot.layers.len())
            .unwrap_or(0)
    }

    /// Plain-data member, if present.
    pub fn value(&self, key: &str) -> Option<Value> {
        self.members.read().get(key).and_then(|m| m.as_value().cloned())
    }

    /// Rewrite a plain-data member in place; a missing member starts as null.
    pub fn update_value<R>(&self, key: &str, f: impl FnOnce(&mut Value) -> R) -> R {
        let mut members = self.members.write();
        let mut value = match members.remove(key) {
            Some(HostExport::Value(v)) => v,
            _ => Value::Null,
        };
        let out = f(&mut value);
        members.insert(key.to_string(), HostExport::Value(value));
        out
    }

    pub fn insert_object(&self, key: &str, object: ObjectRef) {
        self.members
            .write()
            .insert(key.to_string(), HostExport::Object(object));
    }
}

impl HostObject for SimObject {
    fn label(&self) -> String {
        self.name.clone()
    }

    fn keys(&self) -> Vec<String> {
        self.members.read().keys().cloned().collect()
    }

    fn get(&self, key: &str) -> Option<HostExport> {
        self.members.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: Value) -> Result<(), HostError> {
        self.members
            .write()
            .insert(key.to_string(), HostExport::Value(value));
        Ok(())
    }

    fn source(&self) -> Option<String> {
        self.source.clone()
    }

    fn prototype(&self) -> Option<ObjectRef> {
        self.prototype.clone()
    }

    fn invoke(&self, method: &str, args: Vec<Value>) -> Result<Value, HostError> {
        let this: ObjectRef = self
            .self_ref
            .upgrade()
            .ok_or_else(|| HostError::Rejected(format!("{} was dropped", self.name)))?;
        self.call_as(&this, method, args)
    }

    fn as_any_arc(self: Arc<Self>) -> Arc<dyn std::any::Any + Send + Sync> {
        self
    }
}
