//! The host's loaded-module table.

use parking_lot::RwLock;

use emuchievements_mount::{HostExport, ModuleSource};

#[derive(Debug, Default)]
pub struct SimModules {
    modules: RwLock<Vec<HostExport>>,
}

impl SimModules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, module: HostExport) {
        self.modules.write().push(module);
    }

    pub fn len(&self) -> usize {
        self.modules.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.read().is_empty()
    }
}

impl ModuleSource for SimModules {
    fn modules(&self) -> Vec<HostExport> {
        self.modules.read().clone()
    }
}
