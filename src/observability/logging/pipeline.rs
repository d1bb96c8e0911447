//! Log pipelines built from the `logging` section.

use std::io::Write;
use std::str::FromStr;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::Level;

use super::{ConsoleEncoder, JsonEncoder, LogEncoder, LogRecord, LogWriter, Sampler, StderrWriter};
use crate::config::{CustomLog, LoggingConfig};
use crate::context::Context;
use crate::error::{Error, Result};

/// Name of the pipeline built from `logging.sink`.
pub const SINK_LOG: &str = "sink";

/// Target prefix of events emitted by this crate. The sink receives everything else.
const OWN_TARGET: &str = "switchyard";

/// `target` equals `prefix` or sits below it in the module path.
fn target_matches(prefix: &str, target: &str) -> bool {
    target
        .strip_prefix(prefix)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with("::"))
}

pub struct LogPipeline {
    name: String,
    level: Level,
    include: Vec<String>,
    exclude: Vec<String>,
    sampler: Option<Sampler>,
    encoder: Arc<dyn LogEncoder>,
    output: Mutex<Box<dyn Write + Send>>,
}

impl LogPipeline {
    pub fn new(
        name: impl Into<String>,
        level: Level,
        encoder: Arc<dyn LogEncoder>,
        output: Box<dyn Write + Send>,
    ) -> Self {
        Self {
            name: name.into(),
            level,
            include: Vec::new(),
            exclude: Vec::new(),
            sampler: None,
            encoder,
            output: Mutex::new(output),
        }
    }

    pub fn with_filters(mut self, include: Vec<String>, exclude: Vec<String>) -> Self {
        self.include = include;
        self.exclude = exclude;
        self
    }

    pub fn with_sampler(mut self, sampler: Sampler) -> Self {
        self.sampler = Some(sampler);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Level and target checks, done before a record is built.
    pub fn accepts(&self, level: &Level, target: &str) -> bool {
        if level > &self.level {
            return false;
        }
        if !self.include.is_empty() && !self.include.iter().any(|p| target_matches(p, target)) {
            return false;
        }
        !self.exclude.iter().any(|p| target_matches(p, target))
    }

    pub fn emit(&self, record: &LogRecord) {
        if let Some(sampler) = &self.sampler {
            if !sampler.allow(&record.message) {
                return;
            }
        }
        let line = self.encoder.encode(record);
        let _ = self.output.lock().write_all(&line);
    }

    pub fn flush(&self) -> std::io::Result<()> {
        self.output.lock().flush()
    }
}

fn parse_level(raw: &str, path: &str) -> Result<Level> {
    if raw.is_empty() {
        return Ok(Level::INFO);
    }
    Level::from_str(raw).map_err(|e| Error::Parse {
        path: path.to_string(),
        reason: format!("invalid level {:?}: {}", raw, e),
    })
}

fn build_custom(name: &str, log: &CustomLog, ctx: &Context) -> Result<LogPipeline> {
    let base = format!("logging.logs.{}", name);

    let writer: Arc<dyn LogWriter> = match &log.writer {
        Some(raw) => ctx.load_writer(raw, &format!("{}.writer", base))?,
        None => Arc::new(StderrWriter::default()),
    };
    let encoder: Arc<dyn LogEncoder> = match &log.encoder {
        Some(raw) => ctx.load_encoder(raw, &format!("{}.encoder", base))?,
        None => Arc::new(JsonEncoder::default()),
    };
    let level = parse_level(&log.level, &format!("{}.level", base))?;
    let output = writer.open().map_err(|e| {
        Error::module(format!("opening log writer {} for {}: {}", writer.describe(), name, e))
    })?;

    let mut pipeline = LogPipeline::new(name, level, encoder, output)
        .with_filters(log.include.clone(), log.exclude.clone());
    if let Some(sampling) = &log.sampling {
        pipeline = pipeline.with_sampler(Sampler::new(
            sampling.interval,
            sampling.first,
            sampling.thereafter,
        ));
    }
    Ok(pipeline)
}

/// Provision every configured pipeline under `ctx`. Each pipeline flushes
/// when `ctx` is torn down.
pub fn provision_pipelines(config: &LoggingConfig, ctx: &Context) -> Result<Vec<Arc<LogPipeline>>> {
    let mut pipelines = Vec::new();

    if let Some(sink) = &config.sink {
        let writer: Arc<dyn LogWriter> = match &sink.writer {
            Some(raw) => ctx.load_writer(raw, "logging.sink.writer")?,
            None => Arc::new(StderrWriter::default()),
        };
        let output = writer
            .open()
            .map_err(|e| Error::module(format!("opening sink writer {}: {}", writer.describe(), e)))?;
        let sink = LogPipeline::new(SINK_LOG, Level::INFO, Arc::new(ConsoleEncoder::default()), output)
            .with_filters(Vec::new(), vec![OWN_TARGET.to_string()]);
        pipelines.push(Arc::new(sink));
    }

    for (name, log) in &config.logs {
        pipelines.push(Arc::new(build_custom(name, log, ctx)?));
    }

    for pipeline in &pipelines {
        let pipeline = pipeline.clone();
        ctx.on_cleanup(move || pipeline.flush().map_err(Into::into));
    }

    Ok(pipelines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::standard_registry;
    use serde_json::json;

    #[derive(Clone, Default)]
    struct Shared(Arc<Mutex<Vec<u8>>>);

    impl Write for Shared {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_target_prefix() {
        assert!(target_matches("switchyard", "switchyard::http::app"));
        assert!(target_matches("switchyard::http", "switchyard::http"));
        assert!(!target_matches("switchyard::http", "switchyard::https"));
    }

    #[test]
    fn test_level_and_filters() {
        let pipeline = LogPipeline::new(
            "access",
            Level::INFO,
            Arc::new(JsonEncoder::default()),
            Box::new(Shared::default()),
        )
        .with_filters(vec!["switchyard::http".into()], vec!["switchyard::http::handlers".into()]);

        assert!(pipeline.accepts(&Level::WARN, "switchyard::http::app"));
        assert!(!pipeline.accepts(&Level::DEBUG, "switchyard::http::app"));
        assert!(!pipeline.accepts(&Level::INFO, "switchyard::config"));
        assert!(!pipeline.accepts(&Level::INFO, "switchyard::http::handlers::rewrite"));
    }

    #[test]
    fn test_emit_encodes_to_output() {
        let out = Shared::default();
        let pipeline = LogPipeline::new(
            "t",
            Level::TRACE,
            Arc::new(ConsoleEncoder::default()),
            Box::new(out.clone()),
        );
        pipeline.emit(&LogRecord::new(Level::INFO, "x", "hello"));
        let written = String::from_utf8(out.0.lock().clone()).unwrap();
        assert!(written.ends_with("\tINFO\tx\thello\n"));
    }

    #[test]
    fn test_provision_from_config() {
        let (ctx, teardown) = Context::root(standard_registry().unwrap().seal());
        let config: LoggingConfig = serde_json::from_value(json!({
            "sink": {"writer": {"output": "discard"}},
            "logs": {
                "default": {
                    "writer": {"output": "discard"},
                    "encoder": {"format": "console"},
                    "level": "debug",
                    "sampling": {"interval": "2s", "first": 5, "thereafter": 10}
                }
            }
        }))
        .unwrap();

        let pipelines = provision_pipelines(&config, &ctx).unwrap();
        let names: Vec<&str> = pipelines.iter().map(|p| p.name()).collect();
        assert_eq!(names, vec!["sink", "default"]);
        assert!(pipelines[1].accepts(&Level::DEBUG, "anything"));
        assert!(!pipelines[0].accepts(&Level::INFO, "switchyard::routing"));
        assert!(pipelines[0].accepts(&Level::INFO, "hyper::proto"));
        assert_eq!(ctx.instances("logging.writers.discard").len(), 2);
        assert!(teardown.run().is_empty());
    }

    #[test]
    fn test_bad_level_rejected() {
        let (ctx, _teardown) = Context::root(standard_registry().unwrap().seal());
        let config: LoggingConfig = serde_json::from_value(json!({
            "logs": {"x": {"writer": {"output": "discard"}, "level": "loud"}}
        }))
        .unwrap();
        assert!(matches!(
            provision_pipelines(&config, &ctx),
            Err(Error::Parse { .. })
        ));
    }
}
