//! `http.handlers.error`

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::Context;
use crate::error::{Error, Result};
use crate::http::handlers::replace_placeholders;
use crate::http::{Handler, HandlerError, HttpRequest, MiddlewareHandler, ResponseWriter};
use crate::modules::{decode_into, Capability, Module, ModuleId, ModuleInfo, Provisioner};

/// Fails the chain, handing the request to the server's error routes.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct StaticError {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub error: String,

    /// Defaults to 500.
    pub status_code: Option<u16>,

    #[serde(skip)]
    status: Option<StatusCode>,
}

impl StaticError {
    pub const ID: &'static str = "http.handlers.error";

    pub fn info() -> ModuleInfo {
        ModuleInfo::of::<Self>(Self::ID)
    }
}

impl Provisioner for StaticError {
    fn provision(&mut self, _ctx: &Context) -> Result<()> {
        let code = self.status_code.unwrap_or(500);
        let status = StatusCode::from_u16(code).map_err(Error::module)?;
        if !(status.is_client_error() || status.is_server_error()) {
            return Err(Error::module(format!(
                "error status must be 4xx or 5xx, got {}",
                code
            )));
        }
        self.status = Some(status);
        Ok(())
    }
}

#[async_trait]
impl MiddlewareHandler for StaticError {
    async fn serve_http(
        &self,
        req: &mut HttpRequest,
        _w: &mut ResponseWriter,
        _next: &dyn Handler,
    ) -> std::result::Result<(), HandlerError> {
        let status = self.status.unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let message = if self.error.is_empty() {
            status.canonical_reason().unwrap_or("error").to_string()
        } else {
            replace_placeholders(&self.error, req)
        };
        Err(HandlerError::new(status, message))
    }
}

impl Module for StaticError {
    fn id(&self) -> ModuleId {
        ModuleId::new(Self::ID)
    }

    fn decode(&mut self, raw: Value) -> std::result::Result<(), serde_json::Error> {
        decode_into(self, raw)
    }

    fn provisioner(&mut self) -> Option<&mut dyn Provisioner> {
        Some(self)
    }

    fn capability(self: Arc<Self>) -> Capability {
        Capability::Handler(self)
    }
}
