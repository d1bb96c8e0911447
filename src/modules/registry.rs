//! Module registry with an explicit init → seal lifecycle.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{Error, RegistryError};
use crate::modules::{ModuleId, ModuleInfo};

/// Mutable registry used during process initialization.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    modules: BTreeMap<ModuleId, ModuleInfo>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a module kind. Malformed or duplicate ids are rejected.
    pub fn register(&mut self, info: ModuleInfo) -> Result<&mut Self, RegistryError> {
        let id = ModuleId::parse(info.id.as_str())?;
        if self.modules.contains_key(&id) {
            return Err(RegistryError::Duplicate(id));
        }
        tracing::trace!(module = %id, "Module registered");
        self.modules.insert(id, info);
        Ok(self)
    }

    /// Freeze the registry. No registrations are possible afterwards.
    pub fn seal(self) -> Arc<Registry> {
        tracing::debug!(modules = self.modules.len(), "Module registry sealed");
        Arc::new(Registry {
            modules: self.modules,
        })
    }
}

/// Sealed, read-only module registry shared by every provisioning pass.
#[derive(Debug)]
pub struct Registry {
    modules: BTreeMap<ModuleId, ModuleInfo>,
}

impl Registry {
    pub fn resolve(&self, id: &ModuleId) -> Result<&ModuleInfo, Error> {
        self.modules
            .get(id)
            .ok_or_else(|| Error::UnknownModule(id.clone()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.modules.contains_key(&ModuleId::new(id))
    }

    /// Modules directly inside `namespace`, sorted by id.
    pub fn modules_in(&self, namespace: &str) -> Vec<&ModuleInfo> {
        self.modules
            .values()
            .filter(|info| info.id.namespace() == namespace)
            .collect()
    }

    pub fn ids(&self) -> impl Iterator<Item = &ModuleId> {
        self.modules.keys()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}
