//! `logging.encoders.*` modules.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{LogEncoder, LogRecord};
use crate::modules::{decode_into, Capability, Module, ModuleId, ModuleInfo};

/// One JSON object per line: `ts`, `level`, `logger`, `msg`, then fields.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct JsonEncoder {}

impl JsonEncoder {
    pub const ID: &'static str = "logging.encoders.json";

    pub fn info() -> ModuleInfo {
        ModuleInfo::of::<Self>(Self::ID)
    }
}

impl LogEncoder for JsonEncoder {
    fn encode(&self, record: &LogRecord) -> Vec<u8> {
        let mut object = Map::with_capacity(record.fields.len() + 4);
        object.insert("ts".into(), Value::from(record.unix_seconds()));
        object.insert("level".into(), Value::from(record.level.as_str().to_ascii_lowercase()));
        object.insert("logger".into(), Value::from(record.logger.clone()));
        object.insert("msg".into(), Value::from(record.message.clone()));
        for (key, value) in &record.fields {
            object.entry(key.clone()).or_insert_with(|| value.clone());
        }

        let mut line = serde_json::to_vec(&Value::Object(object)).unwrap_or_default();
        line.push(b'\n');
        line
    }
}

impl Module for JsonEncoder {
    fn id(&self) -> ModuleId {
        ModuleId::new(Self::ID)
    }

    fn decode(&mut self, raw: Value) -> std::result::Result<(), serde_json::Error> {
        decode_into(self, raw)
    }

    fn capability(self: Arc<Self>) -> Capability {
        Capability::LogEncoder(self)
    }
}

/// Tab-separated, human-oriented lines; fields trail as a JSON object.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ConsoleEncoder {}

impl ConsoleEncoder {
    pub const ID: &'static str = "logging.encoders.console";

    pub fn info() -> ModuleInfo {
        ModuleInfo::of::<Self>(Self::ID)
    }
}

impl LogEncoder for ConsoleEncoder {
    fn encode(&self, record: &LogRecord) -> Vec<u8> {
        let mut line = format!(
            "{:.3}\t{}\t{}\t{}",
            record.unix_seconds(),
            record.level,
            record.logger,
            record.message
        );
        if !record.fields.is_empty() {
            line.push('\t');
            line.push_str(&Value::Object(record.fields.clone()).to_string());
        }
        line.push('\n');
        line.into_bytes()
    }
}

impl Module for ConsoleEncoder {
    fn id(&self) -> ModuleId {
        ModuleId::new(Self::ID)
    }

    fn decode(&mut self, raw: Value) -> std::result::Result<(), serde_json::Error> {
        decode_into(self, raw)
    }

    fn capability(self: Arc<Self>) -> Capability {
        Capability::LogEncoder(self)
    }
}
