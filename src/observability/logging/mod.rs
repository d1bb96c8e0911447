//! Configurable log pipelines.
//!
//! # Data Flow
//! ```text
//! config.logging
//!     → pipeline.rs (provision writer + encoder modules through the Context)
//!     → layer.rs (LogHandle swaps the pipeline set after a successful reload)
//!
//! tracing event
//!     → DynamicLogLayer::on_event → LogRecord
//!     → each accepting LogPipeline: sampler → encoder → writer
//! ```
//!
//! # Design Decisions
//! - Writers and encoders are modules (`logging.writers.*`, `logging.encoders.*`)
//! - Pipelines never log through `tracing` themselves; write errors are dropped
//! - Filtering is by level and target prefix, before a record is built

pub mod encoders;
pub mod layer;
pub mod pipeline;
pub mod sampler;
pub mod writers;

use std::io::{self, Write};
use std::time::SystemTime;

use serde_json::{Map, Value};
use tracing::Level;

pub use encoders::{ConsoleEncoder, JsonEncoder};
pub use layer::{DynamicLogLayer, LogHandle};
pub use pipeline::{provision_pipelines, LogPipeline};
pub use sampler::Sampler;
pub use writers::{DiscardWriter, FileWriter, StderrWriter, StdoutWriter};

/// Destination for encoded log lines.
pub trait LogWriter: Send + Sync {
    /// Human-readable destination, for diagnostics.
    fn describe(&self) -> String;

    fn open(&self) -> io::Result<Box<dyn Write + Send>>;
}

/// Turns a record into bytes, including the trailing newline.
pub trait LogEncoder: Send + Sync {
    fn encode(&self, record: &LogRecord) -> Vec<u8>;
}

/// One tracing event, flattened.
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub timestamp: SystemTime,
    pub level: Level,
    /// Event target, usually the emitting module path.
    pub logger: String,
    pub message: String,
    pub fields: Map<String, Value>,
}

impl LogRecord {
    pub fn new(level: Level, logger: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            timestamp: SystemTime::now(),
            level,
            logger: logger.into(),
            message: message.into(),
            fields: Map::new(),
        }
    }

    /// Seconds since the Unix epoch, with sub-second precision.
    pub fn unix_seconds(&self) -> f64 {
        self.timestamp
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or_default()
    }
}
