//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! tracing events from every subsystem
//!     → fmt layer (EnvFilter, installed in main)
//!     → logging::DynamicLogLayer
//!         → LogPipeline per configured log: level, include/exclude, sampler
//!         → encoder module → writer module
//!
//! Counters and histograms:
//!     → metrics.rs (metrics facade)
//! ```
//!
//! # Design Decisions
//! - Pipelines are rebuilt on every reload and swapped atomically
//! - The fmt layer stays up across reloads so provisioning errors are always visible

pub mod logging;
pub mod metrics;
