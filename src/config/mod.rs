//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (JSON/TOML), admin POST /load
//!     → loader.rs (parse & deserialize into Config)
//!     → lifecycle::Instance::load (provision all-or-nothing)
//!     → atomic swap of the running snapshot
//!
//! On file change:
//!     watcher.rs sees the file settle
//!     → loader.rs loads new config, unchanged documents are skipped
//!     → Instance::load on the blocking pool
//!
//! Chained documents:
//!     admin.config.load (config_loaders module) runs once the config is active
//!     → Instance::apply_loaded, skipped when equal to the running document
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - All fields have defaults to allow minimal configs
//! - Module fragments stay raw until the owning module decodes them

pub mod loader;
pub mod loaders;
pub mod schema;
pub mod watcher;

pub use loader::{load_config, parse_config, parse_document, ConfigError, Format};
pub use loaders::FileLoader;
pub use schema::{
    AdminAccess, AdminConfig, AdminPermissions, Config, ConfigSettings, CustomLog, LogSampling,
    LoggingConfig, RemoteAdmin, SinkLog, DEFAULT_ADMIN_LISTEN,
};
pub use watcher::{ConfigWatcher, DEFAULT_DEBOUNCE};
