//! `logging.writers.*` modules.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::LogWriter;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::modules::{decode_into, Capability, Module, ModuleId, ModuleInfo, Provisioner};

macro_rules! stream_writer {
    ($name:ident, $id:literal, $describe:literal, $open:expr) => {
        #[derive(Debug, Clone, Default, Deserialize, Serialize)]
        #[serde(deny_unknown_fields)]
        pub struct $name {}

        impl $name {
            pub const ID: &'static str = $id;

            pub fn info() -> ModuleInfo {
                ModuleInfo::of::<Self>(Self::ID)
            }
        }

        impl LogWriter for $name {
            fn describe(&self) -> String {
                $describe.to_string()
            }

            fn open(&self) -> io::Result<Box<dyn Write + Send>> {
                Ok(Box::new($open))
            }
        }

        impl Module for $name {
            fn id(&self) -> ModuleId {
                ModuleId::new(Self::ID)
            }

            fn decode(&mut self, raw: Value) -> std::result::Result<(), serde_json::Error> {
                decode_into(self, raw)
            }

            fn capability(self: Arc<Self>) -> Capability {
                Capability::LogWriter(self)
            }
        }
    };
}

stream_writer!(StdoutWriter, "logging.writers.stdout", "stdout", io::stdout());
stream_writer!(StderrWriter, "logging.writers.stderr", "stderr", io::stderr());
stream_writer!(DiscardWriter, "logging.writers.discard", "discard", io::sink());

/// Appends to a file, creating it if needed.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileWriter {
    pub filename: String,
}

impl FileWriter {
    pub const ID: &'static str = "logging.writers.file";

    pub fn info() -> ModuleInfo {
        ModuleInfo::of::<Self>(Self::ID)
    }
}

impl Provisioner for FileWriter {
    fn provision(&mut self, _ctx: &Context) -> Result<()> {
        if self.filename.trim().is_empty() {
            return Err(Error::module("file writer requires a filename"));
        }
        Ok(())
    }
}

impl LogWriter for FileWriter {
    fn describe(&self) -> String {
        self.filename.clone()
    }

    fn open(&self) -> io::Result<Box<dyn Write + Send>> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.filename)?;
        Ok(Box::new(io::LineWriter::new(file)))
    }
}

impl Module for FileWriter {
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
        Capability::LogWriter(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn test_file_writer_appends() {
        let path = std::env::temp_dir().join(format!("switchyard-{}.log", uuid::Uuid::new_v4()));
        let writer = FileWriter {
            filename: path.to_string_lossy().into_owned(),
        };

        writer.open().unwrap().write_all(b"one\n").unwrap();
        writer.open().unwrap().write_all(b"two\n").unwrap();

        let mut contents = String::new();
        std::fs::File::open(&path)
            .unwrap()
            .read_to_string(&mut contents)
            .unwrap();
        assert_eq!(contents, "one\ntwo\n");
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_stream_writers_reject_fields() {
        let mut writer = StdoutWriter::default();
        assert!(writer.decode(serde_json::json!({})).is_ok());
        assert!(writer.decode(serde_json::json!({"path": "x"})).is_err());
    }
}
