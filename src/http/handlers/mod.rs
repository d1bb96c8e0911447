//! Built-in `http.handlers.*` modules.
//!
//! | name              | behavior                                          |
//! |-------------------|---------------------------------------------------|
//! | `static_response` | writes a fixed status, headers and body           |
//! | `headers`         | edits request headers, then response headers      |
//! | `rewrite`         | replaces or strips the request URI path           |
//! | `error`           | fails the chain with a status code                |
//! | `reverse_proxy`   | forwards to upstreams in round-robin order        |

pub mod error;
pub mod headers;
pub mod reverse_proxy;
pub mod rewrite;
pub mod static_response;

pub use error::StaticError;
pub use headers::{HeaderOps, Headers};
pub use reverse_proxy::{ResponseHandler, ReverseProxy, Upstream};
pub use rewrite::Rewrite;
pub use static_response::StaticResponse;

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::http::{HandlerError, HttpRequest};

/// Status given as a number or as a string that may hold a placeholder,
/// e.g. `"{http.error.status_code}"`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum WeakStatus {
    Code(u16),
    Text(String),
}

impl WeakStatus {
    /// Literal statuses are checked at provisioning; placeholders wait for a request.
    pub(crate) fn validate(&self) -> Result<()> {
        match self {
            WeakStatus::Code(code) => {
                StatusCode::from_u16(*code).map_err(Error::module)?;
            }
            WeakStatus::Text(text) if !text.contains('{') => {
                let code = text.trim().parse::<u16>().map_err(|e| {
                    Error::module(format!("invalid status code {:?}: {}", text, e))
                })?;
                StatusCode::from_u16(code).map_err(Error::module)?;
            }
            WeakStatus::Text(_) => {}
        }
        Ok(())
    }

    pub(crate) fn resolve(&self, req: &HttpRequest) -> std::result::Result<StatusCode, HandlerError> {
        let code = match self {
            WeakStatus::Code(code) => *code,
            WeakStatus::Text(text) => replace_placeholders(text, req)
                .trim()
                .parse::<u16>()
                .map_err(|e| HandlerError::internal(format!("invalid status code {:?}: {}", text, e)))?,
        };
        StatusCode::from_u16(code).map_err(HandlerError::internal)
    }
}

/// Expand `{http.error.*}` and `{http.request.*}` placeholders in `input`.
///
/// Unknown placeholders are left as written.
pub(crate) fn replace_placeholders(input: &str, req: &HttpRequest) -> String {
    if !input.contains('{') {
        return input.to_string();
    }

    let err = req.extensions().get::<HandlerError>();
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let Some(close) = rest[open..].find('}') else {
            out.push_str(&rest[open..]);
            return out;
        };
        let key = &rest[open + 1..open + close];
        let value = match key {
            "http.error.status_code" => err.map(|e| e.status_code.as_u16().to_string()),
            "http.error.status_text" => err.map(|e| {
                e.status_code
                    .canonical_reason()
                    .unwrap_or_default()
                    .to_string()
            }),
            "http.error.message" => err.map(|e| e.err.to_string()),
            "http.error.id" => err.map(|e| e.id.clone()),
            "http.error.trace" => err.map(|e| e.trace.clone()),
            "http.request.method" => Some(req.method().to_string()),
            "http.request.uri" => Some(req.uri().to_string()),
            "http.request.uri.path" => Some(req.uri().path().to_string()),
            "http.request.host" => req
                .headers()
                .get("host")
                .and_then(|h| h.to_str().ok())
                .map(str::to_string),
            _ => None,
        };
        match value {
            Some(value) => out.push_str(&value),
            None => out.push_str(&rest[open..=open + close]),
        }
        rest = &rest[open + close + 1..];
    }
    out.push_str(rest);
    out
}
