//! Switchyard: a config-driven server core.
//!
//! A JSON document names modules by id; the [`modules::Registry`] builds
//! them, a [`context::Context`] provisions them and owns their cleanup, and
//! the [`lifecycle::Instance`] swaps whole configurations atomically.

pub mod admin;
pub mod config;
pub mod context;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod modules;
pub mod net;
pub mod observability;
pub mod routing;
pub mod storage;

pub use config::Config;
pub use context::{Context, Teardown};
pub use error::{Error, Result};
pub use lifecycle::{Instance, Shutdown};
pub use modules::{standard_registry, Registry, RegistryBuilder};
