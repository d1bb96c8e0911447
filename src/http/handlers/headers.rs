//! `http.handlers.headers`

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::Context;
use crate::error::{Error, Result};
use crate::http::{Handler, HandlerError, HttpRequest, MiddlewareHandler, ResponseWriter};
use crate::modules::{decode_into, Capability, Module, ModuleId, ModuleInfo, Provisioner};

/// Header edits, applied in the order delete, set, add.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct HeaderOps {
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub set: BTreeMap<String, Vec<String>>,

    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub add: BTreeMap<String, Vec<String>>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub delete: Vec<String>,
}

#[derive(Debug, Clone, Default)]
struct CompiledOps {
    set: Vec<(HeaderName, Vec<HeaderValue>)>,
    add: Vec<(HeaderName, Vec<HeaderValue>)>,
    delete: Vec<HeaderName>,
}

impl HeaderOps {
    fn compile(&self) -> Result<CompiledOps> {
        fn pairs(map: &BTreeMap<String, Vec<String>>) -> Result<Vec<(HeaderName, Vec<HeaderValue>)>> {
            map.iter()
                .map(|(name, values)| {
                    let name = HeaderName::from_bytes(name.as_bytes()).map_err(Error::module)?;
                    let values = values
                        .iter()
                        .map(|v| HeaderValue::from_str(v).map_err(Error::module))
                        .collect::<Result<Vec<_>>>()?;
                    Ok((name, values))
                })
                .collect()
        }

        Ok(CompiledOps {
            set: pairs(&self.set)?,
            add: pairs(&self.add)?,
            delete: self
                .delete
                .iter()
                .map(|name| HeaderName::from_bytes(name.as_bytes()).map_err(Error::module))
                .collect::<Result<_>>()?,
        })
    }
}

impl CompiledOps {
    fn apply(&self, headers: &mut HeaderMap) {
        for name in &self.delete {
            headers.remove(name);
        }
        for (name, values) in &self.set {
            headers.remove(name);
            for value in values {
                headers.append(name.clone(), value.clone());
            }
        }
        for (name, values) in &self.add {
            for value in values {
                headers.append(name.clone(), value.clone());
            }
        }
    }
}

/// Edits request headers before the rest of the chain runs and response
/// headers after it returns.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Headers {
    pub request: Option<HeaderOps>,
    pub response: Option<HeaderOps>,

    #[serde(skip)]
    compiled_request: CompiledOps,
    #[serde(skip)]
    compiled_response: CompiledOps,
}

impl Headers {
    pub const ID: &'static str = "http.handlers.headers";

    pub fn info() -> ModuleInfo {
        ModuleInfo::of::<Self>(Self::ID)
    }
}

impl Provisioner for Headers {
    fn provision(&mut self, _ctx: &Context) -> Result<()> {
        if let Some(ops) = &self.request {
            self.compiled_request = ops.compile()?;
        }
        if let Some(ops) = &self.response {
            self.compiled_response = ops.compile()?;
        }
        Ok(())
    }
}

#[async_trait]
impl MiddlewareHandler for Headers {
    async fn serve_http(
        &self,
        req: &mut HttpRequest,
        w: &mut ResponseWriter,
        next: &dyn Handler,
    ) -> std::result::Result<(), HandlerError> {
        self.compiled_request.apply(req.headers_mut());
        next.serve_http(req, w).await?;
        self.compiled_response.apply(w.headers_mut());
        Ok(())
    }
}

impl Module for Headers {
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
    use crate::modules::standard_registry;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::json;

    struct Echo;

    #[async_trait]
    impl Handler for Echo {
        async fn serve_http(
            &self,
            req: &mut HttpRequest,
            w: &mut ResponseWriter,
        ) -> std::result::Result<(), HandlerError> {
            let seen = req
                .headers()
                .get("x-set")
                .cloned()
                .unwrap_or(HeaderValue::from_static("none"));
            w.headers_mut().insert("x-seen", seen);
            w.headers_mut().insert("server", HeaderValue::from_static("upstream"));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_request_then_response_ops() {
        let (ctx, _teardown) = Context::root(standard_registry().unwrap().seal());
        let mut handler = Headers::default();
        handler
            .decode(json!({
                "request": {"set": {"x-set": ["yes"]}, "delete": ["cookie"]},
                "response": {"delete": ["server"], "add": {"x-added": ["1", "2"]}},
            }))
            .unwrap();
        handler.provision(&ctx).unwrap();

        let mut req = Request::builder()
            .header("cookie", "secret")
            .header("x-set", "old")
            .body(Body::empty())
            .unwrap();
        let mut w = ResponseWriter::new();
        handler.serve_http(&mut req, &mut w, &Echo).await.unwrap();

        assert!(req.headers().get("cookie").is_none());
        assert_eq!(w.headers()["x-seen"], "yes");
        assert!(w.headers().get("server").is_none());
        assert_eq!(w.headers().get_all("x-added").iter().count(), 2);
    }

    #[test]
    fn test_invalid_header_name_fails_provision() {
        let (ctx, _teardown) = Context::root(standard_registry().unwrap().seal());
        let mut handler = Headers::default();
        handler
            .decode(json!({"request": {"set": {"bad header": ["x"]}}}))
            .unwrap();
        assert!(handler.provision(&ctx).is_err());
    }
}
