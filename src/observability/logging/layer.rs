//! The tracing layer that feeds configured pipelines.

use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwap;
use serde_json::{Map, Value};
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context as LayerContext, Layer};

use super::{LogPipeline, LogRecord};

type Pipelines = Arc<ArcSwap<Vec<Arc<LogPipeline>>>>;

/// Swaps the active pipeline set. Cloning shares the same set.
#[derive(Clone, Default)]
pub struct LogHandle {
    pipelines: Pipelines,
}

impl LogHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// A layer that follows every future [`LogHandle::replace`].
    pub fn layer(&self) -> DynamicLogLayer {
        DynamicLogLayer {
            pipelines: self.pipelines.clone(),
        }
    }

    pub fn replace(&self, pipelines: Vec<Arc<LogPipeline>>) {
        let names: Vec<String> = pipelines.iter().map(|p| p.name().to_string()).collect();
        self.pipelines.store(Arc::new(pipelines));
        tracing::debug!(logs = ?names, "Log pipelines replaced");
    }

    pub fn current(&self) -> Vec<Arc<LogPipeline>> {
        (*self.pipelines.load_full()).clone()
    }
}

pub struct DynamicLogLayer {
    pipelines: Pipelines,
}

impl<S: Subscriber> Layer<S> for DynamicLogLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: LayerContext<'_, S>) {
        let pipelines = self.pipelines.load();
        if pipelines.is_empty() {
            return;
        }

        let meta = event.metadata();
        let mut record: Option<LogRecord> = None;
        for pipeline in pipelines.iter() {
            if !pipeline.accepts(meta.level(), meta.target()) {
                continue;
            }
            let record = record.get_or_insert_with(|| {
                let mut visitor = FieldVisitor::default();
                event.record(&mut visitor);
                let mut record = LogRecord::new(*meta.level(), meta.target(), visitor.message);
                record.fields = visitor.fields;
                record
            });
            pipeline.emit(record);
        }
    }
}

#[derive(Default)]
struct FieldVisitor {
    message: String,
    fields: Map<String, Value>,
}

impl FieldVisitor {
    fn put(&mut self, field: &Field, value: Value) {
        if field.name() == "message" {
            self.message = match value {
                Value::String(s) => s,
                other => other.to_string(),
            };
        } else {
            self.fields.insert(field.name().to_string(), value);
        }
    }
}

impl Visit for FieldVisitor {
    fn record_f64(&mut self, field: &Field, value: f64) {
        self.put(field, Value::from(value));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.put(field, Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.put(field, Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.put(field, Value::from(value));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.put(field, Value::from(value));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.put(field, Value::from(format!("{:?}", value)));
    }
}
