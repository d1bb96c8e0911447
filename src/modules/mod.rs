//! Module system.
//!
//! # Data Flow
//! ```text
//! init:
//!     standard.rs registers built-in ModuleInfo values
//!     → RegistryBuilder::register (id validation, duplicate check)
//!     → seal() → Arc<Registry> (read-only for the process lifetime)
//!
//! provisioning:
//!     Context::load_module(fragment, namespace, key)
//!     → Registry::resolve(namespace.name)
//!     → ModuleInfo.new() → Module::decode → Provisioner::provision
//!     → Capability (typed handle for the caller)
//! ```
//!
//! # Design Decisions
//! - Polymorphism is a string tag → constructor table, no reflection
//! - Each module decodes its own fields through serde
//! - Registration errors are startup-fatal; lookups after sealing never mutate

pub mod id;
pub mod module;
pub mod registry;
pub mod standard;

pub use id::ModuleId;
pub use module::{
    decode_into, App, Capability, Cleaner, ConfigLoader, Module, ModuleInfo, Provisioner,
};
pub use registry::{Registry, RegistryBuilder};
pub use standard::standard_registry;
