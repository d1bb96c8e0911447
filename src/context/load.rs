//! Fragment → module resolution.

use std::sync::Arc;

use serde_json::{Map, Value};

use super::Context;
use crate::error::{Error, Result};
use crate::http::MiddlewareHandler;
use crate::modules::{App, Capability, ConfigLoader, Module, ModuleId, Provisioner};
use crate::observability::logging::{LogEncoder, LogWriter};
use crate::routing::{MatcherSet, MatcherSets};
use crate::storage::Storage;

/// A keyed mapping of module name → instance, in document order.
pub type ModuleMap = Vec<(String, Arc<dyn Module>)>;

impl Context {
    /// Load a single fragment whose module name sits in the `key` field.
    pub fn load_module(
        &self,
        raw: &Value,
        namespace: &str,
        key: &str,
        path: &str,
    ) -> Result<Arc<dyn Module>> {
        let Value::Object(fields) = raw else {
            return Err(Error::Parse {
                path: path.to_string(),
                reason: format!("expected an object with a {:?} field", key),
            });
        };

        let mut fields = fields.clone();
        let name = match fields.remove(key) {
            Some(Value::String(name)) => name,
            Some(other) => {
                return Err(Error::Parse {
                    path: path.to_string(),
                    reason: format!("{:?} must be a string, got {}", key, other),
                })
            }
            None => {
                return Err(Error::Parse {
                    path: path.to_string(),
                    reason: format!("missing module name field {:?}", key),
                })
            }
        };

        self.load_by_id(ModuleId::join(namespace, &name), Value::Object(fields), path)
    }

    /// Load a mapping of module name → fragment; no discriminator involved.
    pub fn load_module_map(
        &self,
        raw: &Map<String, Value>,
        namespace: &str,
        path: &str,
    ) -> Result<ModuleMap> {
        raw.iter()
            .map(|(name, fragment)| {
                let module = self.load_by_id(
                    ModuleId::join(namespace, name),
                    fragment.clone(),
                    &format!("{}.{}", path, name),
                )?;
                Ok((name.clone(), module))
            })
            .collect()
    }

    /// Load a list of keyed mappings, one [`ModuleMap`] per element.
    pub fn load_module_map_list(
        &self,
        raw: &[Map<String, Value>],
        namespace: &str,
        path: &str,
    ) -> Result<Vec<ModuleMap>> {
        raw.iter()
            .enumerate()
            .map(|(i, map)| self.load_module_map(map, namespace, &format!("{}[{}]", path, i)))
            .collect()
    }

    /// Load an app from the `apps` mapping.
    pub fn load_app(&self, name: &str, raw: &Value, path: &str) -> Result<Arc<dyn App>> {
        let module = self.load_by_id(ModuleId::join("", name), raw.clone(), path)?;
        expect_capability(&module, path, "app", |c| match c {
            Capability::App(app) => Some(app),
            _ => None,
        })
    }

    /// Load the config-level storage backend (`{"module": "memory", ...}`).
    pub fn load_storage(&self, raw: &Value, path: &str) -> Result<Arc<dyn Storage>> {
        let module = self.load_module(raw, "storage", "module", path)?;
        expect_capability(&module, path, "storage backend", |c| match c {
            Capability::Storage(storage) => Some(storage),
            _ => None,
        })
    }

    /// Load a route's `match` list: each element is a keyed mapping of
    /// `http.matchers` names, AND within an element and OR across elements.
    pub fn load_matcher_sets(&self, raw: &[Value], path: &str) -> Result<MatcherSets> {
        let mut maps = Vec::with_capacity(raw.len());
        for (i, set) in raw.iter().enumerate() {
            match set {
                Value::Object(map) => maps.push(map.clone()),
                other => {
                    return Err(Error::Match {
                        path: format!("{}[{}]", path, i),
                        reason: format!("matcher set must be an object, got {}", other),
                    })
                }
            }
        }

        let mut sets = Vec::with_capacity(maps.len());
        for (i, map) in self
            .load_module_map_list(&maps, "http.matchers", path)?
            .into_iter()
            .enumerate()
        {
            let mut set = Vec::with_capacity(map.len());
            for (name, module) in map {
                let at = format!("{}[{}].{}", path, i, name);
                set.push(expect_capability(&module, &at, "request matcher", |c| match c {
                    Capability::Matcher(m) => Some(m),
                    _ => None,
                })?);
            }
            sets.push(MatcherSet(set));
        }
        Ok(MatcherSets(sets))
    }

    /// Load one `handle` element (`{"handler": "<name>", ...}`).
    pub fn load_handler(
        &self,
        raw: &Value,
        path: &str,
    ) -> Result<(ModuleId, Arc<dyn MiddlewareHandler>)> {
        let module = self.load_module(raw, "http.handlers", "handler", path)?;
        let handler = expect_capability(&module, path, "middleware handler", |c| match c {
            Capability::Handler(h) => Some(h),
            _ => None,
        })?;
        Ok((module.id(), handler))
    }

    /// Load a log writer (`{"output": "<name>", ...}`).
    pub fn load_writer(&self, raw: &Value, path: &str) -> Result<Arc<dyn LogWriter>> {
        let module = self.load_module(raw, "logging.writers", "output", path)?;
        expect_capability(&module, path, "log writer", |c| match c {
            Capability::LogWriter(w) => Some(w),
            _ => None,
        })
    }

    /// Load a log encoder (`{"format": "<name>", ...}`).
    pub fn load_encoder(&self, raw: &Value, path: &str) -> Result<Arc<dyn LogEncoder>> {
        let module = self.load_module(raw, "logging.encoders", "format", path)?;
        expect_capability(&module, path, "log encoder", |c| match c {
            Capability::LogEncoder(e) => Some(e),
            _ => None,
        })
    }

    /// Load `admin.config.load` (`{"module": "<name>", ...}`).
    pub fn load_config_loader(&self, raw: &Value, path: &str) -> Result<Arc<dyn ConfigLoader>> {
        let module = self.load_module(raw, "config_loaders", "module", path)?;
        expect_capability(&module, path, "config loader", |c| match c {
            Capability::ConfigLoader(loader) => Some(loader),
            _ => None,
        })
    }

    /// Resolve, construct, decode, provision and record one module.
    fn load_by_id(&self, id: ModuleId, fields: Value, path: &str) -> Result<Arc<dyn Module>> {
        let info = self.registry().resolve(&id)?;
        let mut module = (info.new)();

        module.decode(fields).map_err(|source| Error::Decode {
            id: id.clone(),
            path: path.to_string(),
            source,
        })?;

        let provisioned = match module.provisioner() {
            Some(provisioner) => self.provision(&id, provisioner, path),
            None => Ok(()),
        };

        // recorded even on failure so teardown still releases what was acquired
        let module: Arc<dyn Module> = Arc::from(module);
        self.tree.record(self.id, id, module.clone());

        provisioned.map(|()| module)
    }

    fn provision(&self, id: &ModuleId, provisioner: &mut dyn Provisioner, path: &str) -> Result<()> {
        if !self.tree.begin_provision(self.id, id) {
            return Err(Error::ProvisionCycle {
                id: id.clone(),
                path: path.to_string(),
            });
        }

        let child = self.child_for(id.clone());
        tracing::trace!(module = %id, path = %path, context = %child.id(), "Provisioning module");
        let result = provisioner.provision(&child);
        self.tree.end_provision(self.id, id);

        result.map_err(|source| Error::Provision {
            id: id.clone(),
            path: path.to_string(),
            source: Box::new(source),
        })
    }
}

/// Convert a loaded module into the interface a field requires.
pub fn expect_capability<T>(
    module: &Arc<dyn Module>,
    path: &str,
    expected: &'static str,
    pick: impl FnOnce(Capability) -> Option<T>,
) -> Result<T> {
    pick(module.clone().capability()).ok_or_else(|| Error::WrongKind {
        id: module.id(),
        path: path.to_string(),
        expected,
    })
}
