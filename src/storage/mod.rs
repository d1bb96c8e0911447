//! Storage backends.
//!
//! The config-level `storage` fragment resolves in the `storage` namespace
//! (`{"module": "memory"}`). Provisioned modules reach the active backend
//! through [`crate::context::Context::storage`].

use std::sync::Arc;

use dashmap::DashMap;
use serde::Deserialize;
use serde_json::Value;

use crate::error::BoxError;
use crate::modules::{decode_into, Capability, Cleaner, Module, ModuleId, ModuleInfo};

/// Key/value storage shared by modules of one config.
pub trait Storage: Send + Sync {
    fn load(&self, key: &str) -> Option<Vec<u8>>;

    fn store(&self, key: &str, value: Vec<u8>) -> Result<(), BoxError>;

    fn delete(&self, key: &str) -> bool;

    /// Keys starting with `prefix`, sorted.
    fn list(&self, prefix: &str) -> Vec<String>;
}

/// In-process storage. Contents live as long as the config that created it.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MemoryStorage {
    #[serde(skip)]
    entries: DashMap<String, Vec<u8>>,
}

impl MemoryStorage {
    pub const ID: &'static str = "storage.memory";

    pub fn info() -> ModuleInfo {
        ModuleInfo::of::<Self>(Self::ID)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Storage for MemoryStorage {
    fn load(&self, key: &str) -> Option<Vec<u8>> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    fn store(&self, key: &str, value: Vec<u8>) -> Result<(), BoxError> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    fn delete(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    fn list(&self, prefix: &str) -> Vec<String> {
        let mut keys: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| entry.key().starts_with(prefix))
            .map(|entry| entry.key().clone())
            .collect();
        keys.sort();
        keys
    }
}

impl Cleaner for MemoryStorage {
    fn cleanup(&self) -> Result<(), BoxError> {
        tracing::debug!(entries = self.entries.len(), "Releasing memory storage");
        self.entries.clear();
        Ok(())
    }
}

impl Module for MemoryStorage {
    fn id(&self) -> ModuleId {
        ModuleId::new(Self::ID)
    }

    fn decode(&mut self, raw: Value) -> Result<(), serde_json::Error> {
        decode_into(self, raw)
    }

    fn cleaner(&self) -> Option<&dyn Cleaner> {
        Some(self)
    }

    fn capability(self: Arc<Self>) -> Capability {
        Capability::Storage(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_storage_roundtrip() {
        let storage = MemoryStorage::default();
        storage.store("certs/a", b"one".to_vec()).unwrap();
        storage.store("certs/b", b"two".to_vec()).unwrap();
        storage.store("autosave.json", b"{}".to_vec()).unwrap();

        assert_eq!(storage.load("certs/a").as_deref(), Some(&b"one"[..]));
        assert_eq!(storage.list("certs/"), vec!["certs/a", "certs/b"]);
        assert!(storage.delete("certs/a"));
        assert!(!storage.delete("certs/a"));

        storage.cleanup().unwrap();
        assert!(storage.is_empty());
    }
}
