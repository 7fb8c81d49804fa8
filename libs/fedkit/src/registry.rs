//! In-memory registry of remote module descriptors.
//!
//! Deliberately a dumb, explicit registration surface: populated once at
//! host bootstrap, no discovery protocol, no validation beyond id
//! uniqueness (re-registering an id overwrites the previous descriptor).

use parking_lot::RwLock;
use std::collections::HashMap;

use crate::descriptor::ModuleDescriptor;

/// Process-wide mapping from logical module id to descriptor.
#[derive(Default)]
pub struct ModuleRegistry {
    modules: RwLock<HashMap<String, ModuleDescriptor>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store or overwrite the descriptor under its own id.
    pub fn register(&self, descriptor: ModuleDescriptor) {
        tracing::debug!(module = %descriptor.id, url = %descriptor.entry_url, "registering remote module");
        self.modules
            .write()
            .insert(descriptor.id.clone(), descriptor);
    }

    /// Descriptor for `id`, if registered.
    pub fn get(&self, id: &str) -> Option<ModuleDescriptor> {
        self.modules.read().get(id).cloned()
    }

    /// All registered descriptors, ordered by id for stable output.
    pub fn list(&self) -> Vec<ModuleDescriptor> {
        let mut all: Vec<_> = self.modules.read().values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    pub fn len(&self) -> usize {
        self.modules.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.read().is_empty()
    }
}
