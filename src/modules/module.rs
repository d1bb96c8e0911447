//! Module traits and descriptors.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::context::Context;
use crate::error::{BoxError, Result};
use crate::http::MiddlewareHandler;
use crate::modules::ModuleId;
use crate::observability::logging::{LogEncoder, LogWriter};
use crate::routing::RequestMatcher;
use crate::storage::Storage;

/// A unit of behavior registered under a namespaced id.
///
/// Instances are created empty by their [`ModuleInfo`] constructor, filled in
/// by [`Module::decode`], then optionally provisioned against a [`Context`].
pub trait Module: Send + Sync + 'static {
    /// Identity of the module kind.
    fn id(&self) -> ModuleId;

    /// Decode the fragment (discriminator already removed) onto `self`.
    fn decode(&mut self, raw: Value) -> std::result::Result<(), serde_json::Error>;

    /// Provisioning capability, if the module needs setup after decoding.
    fn provisioner(&mut self) -> Option<&mut dyn Provisioner> {
        None
    }

    /// Cleanup capability, invoked when the owning context is torn down.
    fn cleaner(&self) -> Option<&dyn Cleaner> {
        None
    }

    /// The guest interface this module implements.
    fn capability(self: Arc<Self>) -> Capability;
}

pub trait Provisioner {
    fn provision(&mut self, ctx: &Context) -> Result<()>;
}

pub trait Cleaner {
    fn cleanup(&self) -> std::result::Result<(), BoxError>;
}

/// A top-level application declared under `apps` in the config document.
pub trait App: Send + Sync {
    fn start(&self) -> std::result::Result<(), BoxError>;

    fn stop(&self) -> std::result::Result<(), BoxError>;

    fn as_any(&self) -> &dyn Any;
}

/// Source of a follow-up config document, run after its config is active.
pub trait ConfigLoader: Send + Sync {
    /// Produce a JSON config document.
    fn load_config(&self, ctx: &Context) -> std::result::Result<Vec<u8>, BoxError>;
}

/// Typed handle to a provisioned module.
pub enum Capability {
    App(Arc<dyn App>),
    Matcher(Arc<dyn RequestMatcher>),
    Handler(Arc<dyn MiddlewareHandler>),
    Storage(Arc<dyn Storage>),
    LogWriter(Arc<dyn LogWriter>),
    LogEncoder(Arc<dyn LogEncoder>),
    ConfigLoader(Arc<dyn ConfigLoader>),
    /// Anything the framework has no dedicated interface for.
    Other(Arc<dyn Any + Send + Sync>),
}

impl Capability {
    pub fn kind(&self) -> &'static str {
        match self {
            Capability::App(_) => "app",
            Capability::Matcher(_) => "request matcher",
            Capability::Handler(_) => "middleware handler",
            Capability::Storage(_) => "storage backend",
            Capability::LogWriter(_) => "log writer",
            Capability::LogEncoder(_) => "log encoder",
            Capability::ConfigLoader(_) => "config loader",
            Capability::Other(_) => "module",
        }
    }
}

impl fmt::Debug for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Capability").field(&self.kind()).finish()
    }
}

/// Registration record: id plus a constructor for fresh, empty instances.
#[derive(Clone)]
pub struct ModuleInfo {
    pub id: ModuleId,
    pub new: fn() -> Box<dyn Module>,
}

impl ModuleInfo {
    pub fn new(id: &str, new: fn() -> Box<dyn Module>) -> Self {
        Self {
            id: ModuleId::new(id),
            new,
        }
    }

    /// Descriptor for a module kind constructed through `Default`.
    pub fn of<T: Module + Default>(id: &str) -> Self {
        Self::new(id, construct::<T>)
    }
}

fn construct<T: Module + Default>() -> Box<dyn Module> {
    Box::new(T::default())
}

impl fmt::Debug for ModuleInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleInfo").field("id", &self.id).finish()
    }
}

/// Replace `target` with the serde decoding of `raw`.
///
/// Decoding is keyed by field name, so fragment field order never matters.
pub fn decode_into<T: DeserializeOwned>(
    target: &mut T,
    raw: Value,
) -> std::result::Result<(), serde_json::Error> {
    *target = serde_json::from_value(raw)?;
    Ok(())
}
