//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Instance generation changes
//!     → ListenerSet::sync (bind new addresses, stop dropped ones)
//!     → per-address axum server
//!     → request id, trace span
//!     → active snapshot's Server for that address
//! ```
//!
//! # Design Decisions
//! - Sockets outlive configs; a reload that keeps an address keeps its socket
//! - The server is looked up per request, so in-flight requests finish on
//!   the snapshot they started with

pub mod listener;

pub use listener::{server_router, ListenerSet};
