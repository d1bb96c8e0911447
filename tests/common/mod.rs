//! Shared fixtures for integration tests.
#![allow(dead_code)]

use std::any::Any;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{json, Value};

use switchyard::context::Context;
use switchyard::error::{BoxError, Error, Result};
use switchyard::modules::{
    standard_registry, App, Capability, Module, ModuleId, ModuleInfo, Provisioner, Registry,
};
use switchyard::Config;

static EVENTS: Mutex<Vec<String>> = Mutex::new(Vec::new());

/// Events recorded under `tag`, in order, with the tag stripped.
pub fn events(tag: &str) -> Vec<String> {
    let prefix = format!("{}:", tag);
    EVENTS
        .lock()
        .iter()
        .filter_map(|e| e.strip_prefix(&prefix).map(str::to_string))
        .collect()
}

fn record(tag: &str, event: impl std::fmt::Display) {
    EVENTS.lock().push(format!("{}:{}", tag, event));
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RecorderConfig {
    tag: String,
    fail_provision: bool,
    fail_start: bool,
}

/// App that records its lifecycle under its `tag`.
pub struct Recorder {
    id: &'static str,
    config: RecorderConfig,
}

impl Recorder {
    fn named(id: &'static str) -> Box<dyn Module> {
        Box::new(Self {
            id,
            config: RecorderConfig::default(),
        })
    }

    fn label(&self) -> String {
        self.id.to_string()
    }
}

impl Provisioner for Recorder {
    fn provision(&mut self, ctx: &Context) -> Result<()> {
        let tag = self.config.tag.clone();
        let label = self.label();
        record(&tag, format!("provision {}", label));

        let cleanup_tag = tag.clone();
        let cleanup_label = label.clone();
        ctx.on_cleanup(move || {
            record(&cleanup_tag, format!("cleanup {}", cleanup_label));
            Ok(())
        });

        if self.config.fail_provision {
            return Err(Error::module(format!("{} refused to provision", label)));
        }
        Ok(())
    }
}

impl App for Recorder {
    fn start(&self) -> std::result::Result<(), BoxError> {
        record(&self.config.tag, format!("start {}", self.id));
        if self.config.fail_start {
            return Err(format!("{} refused to start", self.id).into());
        }
        Ok(())
    }

    fn stop(&self) -> std::result::Result<(), BoxError> {
        record(&self.config.tag, format!("stop {}", self.id));
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Module for Recorder {
    fn id(&self) -> ModuleId {
        ModuleId::new(self.id)
    }

    fn decode(&mut self, raw: Value) -> std::result::Result<(), serde_json::Error> {
        self.config = serde_json::from_value(raw)?;
        Ok(())
    }

    fn provisioner(&mut self) -> Option<&mut dyn Provisioner> {
        Some(self)
    }

    fn capability(self: Arc<Self>) -> Capability {
        Capability::App(self)
    }
}

/// App that loads itself while provisioning.
#[derive(Default)]
pub struct Recursive;

impl Provisioner for Recursive {
    fn provision(&mut self, ctx: &Context) -> Result<()> {
        ctx.load_app("recursive", &json!({}), "apps.recursive.inner")?;
        Ok(())
    }
}

impl App for Recursive {
    fn start(&self) -> std::result::Result<(), BoxError> {
        Ok(())
    }

    fn stop(&self) -> std::result::Result<(), BoxError> {
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Module for Recursive {
    fn id(&self) -> ModuleId {
        ModuleId::new("recursive")
    }

    fn decode(&mut self, _raw: Value) -> std::result::Result<(), serde_json::Error> {
        Ok(())
    }

    fn provisioner(&mut self) -> Option<&mut dyn Provisioner> {
        Some(self)
    }

    fn capability(self: Arc<Self>) -> Capability {
        Capability::App(self)
    }
}

fn recorder_a() -> Box<dyn Module> {
    Recorder::named("recorder_a")
}

fn recorder_b() -> Box<dyn Module> {
    Recorder::named("recorder_b")
}

fn recorder_c() -> Box<dyn Module> {
    Recorder::named("recorder_c")
}

/// Built-in modules plus the test apps above.
pub fn registry() -> Arc<Registry> {
    let mut builder = standard_registry().unwrap();
    builder
        .register(ModuleInfo::new("recorder_a", recorder_a))
        .unwrap()
        .register(ModuleInfo::new("recorder_b", recorder_b))
        .unwrap()
        .register(ModuleInfo::new("recorder_c", recorder_c))
        .unwrap()
        .register(ModuleInfo::of::<Recursive>("recursive"))
        .unwrap();
    builder.seal()
}

pub fn config(value: Value) -> Config {
    serde_json::from_value(value).unwrap()
}

/// Config with one HTTP server on `addr` serving `routes`.
pub fn http_config(addr: &str, routes: Value, errors: Value) -> Config {
    config(json!({
        "admin": {"config": {"persist": false}},
        "apps": {"http": {"servers": {"main": {
            "listen": [addr],
            "routes": routes,
            "errors": {"routes": errors}
        }}}}
    }))
}
