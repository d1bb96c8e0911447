//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Route Compilation (per provisioning pass):
//!     Route { match, handle, group, terminal }
//!     → route.rs (load matcher sets + handlers through the Context)
//!     → right-fold handlers into a chain
//!     → immutable RouteList inside the provisioned config
//!
//! Incoming Request:
//!     → dispatch.rs (ordered evaluation state machine)
//!     → matcher.rs (OR across matcher sets, AND within)
//!     → chain head of each matched route
//! ```
//!
//! # Design Decisions
//! - Routes compiled at provisioning, immutable at runtime
//! - Deterministic: same input always takes the same path
//! - First match wins unless a route is non-terminal

pub mod dispatch;
pub mod matcher;
pub mod route;

pub use matcher::{MatchHeader, MatchHost, MatchMethod, MatchPath, MatcherSet, MatcherSets, RequestMatcher};
pub use route::{ChainEnd, Route, RouteList};
