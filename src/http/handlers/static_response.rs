//! `http.handlers.static_response`

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::{HeaderName, HeaderValue, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::Context;
use crate::error::{Error, Result};
use crate::http::handlers::{replace_placeholders, WeakStatus};
use crate::http::{Handler, HandlerError, HttpRequest, MiddlewareHandler, ResponseWriter};
use crate::modules::{decode_into, Capability, Module, ModuleId, ModuleInfo, Provisioner};

/// Responds without calling the rest of the chain.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct StaticResponse {
    pub status_code: Option<WeakStatus>,
    pub headers: BTreeMap<String, Vec<String>>,
    pub body: String,

    #[serde(skip)]
    header_values: Vec<(HeaderName, Vec<String>)>,
}

impl StaticResponse {
    pub const ID: &'static str = "http.handlers.static_response";

    pub fn info() -> ModuleInfo {
        ModuleInfo::of::<Self>(Self::ID)
    }

    fn resolve_status(&self, req: &HttpRequest) -> std::result::Result<StatusCode, HandlerError> {
        match &self.status_code {
            Some(status) => status.resolve(req),
            None => Ok(StatusCode::OK),
        }
    }
}

impl Provisioner for StaticResponse {
    fn provision(&mut self, _ctx: &Context) -> Result<()> {
        if let Some(status) = &self.status_code {
            status.validate()?;
        }

        self.header_values = self
            .headers
            .iter()
            .map(|(name, values)| {
                let name = HeaderName::from_bytes(name.as_bytes()).map_err(Error::module)?;
                Ok((name, values.clone()))
            })
            .collect::<Result<_>>()?;
        Ok(())
    }
}

#[async_trait]
impl MiddlewareHandler for StaticResponse {
    async fn serve_http(
        &self,
        req: &mut HttpRequest,
        w: &mut ResponseWriter,
        _next: &dyn Handler,
    ) -> std::result::Result<(), HandlerError> {
        for (name, values) in &self.header_values {
            w.headers_mut().remove(name);
            for value in values {
                let value = HeaderValue::from_str(&replace_placeholders(value, req))
                    .map_err(HandlerError::internal)?;
                w.headers_mut().append(name.clone(), value);
            }
        }

        let status = self.resolve_status(req)?;
        w.write_header(status);
        if !self.body.is_empty() {
            w.write_body(replace_placeholders(&self.body, req));
        }
        Ok(())
    }
}

impl Module for StaticResponse {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::EmptyHandler;
    use crate::modules::standard_registry;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::json;

    fn provisioned(raw: Value) -> StaticResponse {
        let (ctx, _teardown) = Context::root(standard_registry().unwrap().seal());
        let mut handler = StaticResponse::default();
        handler.decode(raw).unwrap();
        handler.provision(&ctx).unwrap();
        handler
    }

    #[tokio::test]
    async fn test_writes_status_headers_body() {
        let handler = provisioned(json!({
            "status_code": "201",
            "headers": {"x-kind": ["static"]},
            "body": "made {http.request.uri.path}",
        }));
        let mut req = Request::builder().uri("/thing").body(Body::empty()).unwrap();
        let mut w = ResponseWriter::new();
        handler.serve_http(&mut req, &mut w, &EmptyHandler).await.unwrap();

        let response = w.into_response();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()["x-kind"], "static");
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"made /thing");
    }

    #[tokio::test]
    async fn test_status_from_error_placeholder() {
        let handler = provisioned(json!({"status_code": "{http.error.status_code}"}));
        let mut req = Request::new(Body::empty());
        req.extensions_mut()
            .insert(HandlerError::new(StatusCode::GONE, "gone"));
        let mut w = ResponseWriter::new();
        handler.serve_http(&mut req, &mut w, &EmptyHandler).await.unwrap();
        assert_eq!(w.status(), Some(StatusCode::GONE));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let mut handler = StaticResponse::default();
        assert!(handler.decode(json!({"bodyy": "typo"})).is_err());
    }

    #[test]
    fn test_invalid_literal_status_fails_provision() {
        let (ctx, _teardown) = Context::root(standard_registry().unwrap().seal());
        let mut handler = StaticResponse::default();
        handler.decode(json!({"status_code": "abc"})).unwrap();
        assert!(handler.provision(&ctx).is_err());
    }
}
