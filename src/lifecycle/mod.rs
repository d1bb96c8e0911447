//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Reload (instance.rs):
//!     Config → provision into a fresh Context → start apps
//!     → swap active snapshot → retire previous snapshot
//!
//! Shutdown (shutdown.rs):
//!     SIGINT/SIGTERM → Shutdown::trigger → listeners and admin stop accepting
//!     → Instance::stop (stop apps, run cleanups)
//! ```
//!
//! # Design Decisions
//! - One reload at a time; readers never block on a reload
//! - A failed reload changes nothing observable

pub mod instance;
pub mod shutdown;

pub use instance::{Instance, Running, AUTOSAVE_KEY};
pub use shutdown::{wait_for_signal, Shutdown, ShutdownSignal};
