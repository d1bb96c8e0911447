//! Built-in `config_loaders` modules.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use crate::config::loader::{parse_document, Format};
use crate::context::Context;
use crate::error::{BoxError, Error, Result};
use crate::modules::{decode_into, Capability, ConfigLoader, Module, ModuleId, ModuleInfo, Provisioner};

/// Reads the next document from a JSON or TOML file, chosen by extension.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileLoader {
    pub filename: PathBuf,
}

impl FileLoader {
    pub const ID: &'static str = "config_loaders.file";

    pub fn info() -> ModuleInfo {
        ModuleInfo::of::<Self>(Self::ID)
    }
}

impl Provisioner for FileLoader {
    fn provision(&mut self, _ctx: &Context) -> Result<()> {
        if self.filename.as_os_str().is_empty() {
            return Err(Error::module("filename is required"));
        }
        Ok(())
    }
}

impl ConfigLoader for FileLoader {
    fn load_config(&self, _ctx: &Context) -> std::result::Result<Vec<u8>, BoxError> {
        let content = fs::read_to_string(&self.filename)?;
        let document = parse_document(&content, Format::from_path(&self.filename))?;
        tracing::debug!(filename = %self.filename.display(), "Loaded config document");
        Ok(serde_json::to_vec(&document)?)
    }
}

impl Module for FileLoader {
    fn id(&self) -> ModuleId {
        ModuleId::new(Self::ID)
    }

    fn decode(&mut self, raw: Value) -> std::result::Result<(), serde_json::Error> {
        decode_into(self, raw)
    }

    fn provisioner(&mut self) -> Option<&mut dyn Provisioner> {
        Some(self)
    }

    fn capability(self: Arc<Self>) -> Capability {
        Capability::ConfigLoader(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::standard_registry;
    use serde_json::json;

    #[test]
    fn test_toml_file_loaded_as_json() {
        let path = std::env::temp_dir().join(format!("switchyard-{}.toml", uuid::Uuid::new_v4()));
        fs::write(&path, "[admin]\nlisten = \"127.0.0.1:3200\"\n").unwrap();

        let (ctx, teardown) = Context::root(standard_registry().unwrap().seal());
        let loader = ctx
            .load_config_loader(&json!({"module": "file", "filename": path}), "admin.config.load")
            .unwrap();
        let doc: Value = serde_json::from_slice(&loader.load_config(&ctx).unwrap()).unwrap();
        assert_eq!(doc, json!({"admin": {"listen": "127.0.0.1:3200"}}));

        teardown.run();
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_filename_required() {
        let (ctx, _teardown) = Context::root(standard_registry().unwrap().seal());
        let err = ctx
            .load_config_loader(&json!({"module": "file"}), "admin.config.load")
            .err()
            .unwrap();
        assert!(matches!(err, Error::Provision { ref path, .. } if path == "admin.config.load"));
    }

    #[test]
    fn test_missing_file_is_a_load_error() {
        let (ctx, _teardown) = Context::root(standard_registry().unwrap().seal());
        let loader = ctx
            .load_config_loader(
                &json!({"module": "file", "filename": "/nonexistent/next.json"}),
                "admin.config.load",
            )
            .unwrap();
        assert!(loader.load_config(&ctx).is_err());
    }
}
