//! HTTP handling subsystem.
//!
//! # Data Flow
//! ```text
//! net::ListenerSet (axum, request id, trace)
//!     → app.rs (Server for the listen address, current config)
//!     → routing::dispatch (primary RouteList)
//!     → handler.rs chain: handlers/* modules, then the sentinel
//!     → on HandlerError: error.rs stored as a request extension
//!         → routing::dispatch (error RouteList) or bare status
//!     → ResponseWriter → axum Response
//! ```
//!
//! # Design Decisions
//! - Handlers mutate the request in place; later routes see the changes
//! - Responses are built once, after the chain returns
//! - Handler failures never abort the process; they become status codes

pub mod app;
pub mod error;
pub mod handler;
pub mod handlers;
pub mod response;

pub use app::{HttpApp, Server, ServerConfig, ServerErrors};
pub use error::HandlerError;
pub use handler::{
    compile_chain, EmptyHandler, ErrorStatusHandler, Handler, HttpRequest, MiddlewareHandler,
    ResponseWriter,
};
pub use response::ResponseMatcher;
