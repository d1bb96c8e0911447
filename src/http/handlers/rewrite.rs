//! `http.handlers.rewrite`

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::uri::{PathAndQuery, Uri};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::http::handlers::replace_placeholders;
use crate::http::{Handler, HandlerError, HttpRequest, MiddlewareHandler, ResponseWriter};
use crate::modules::{decode_into, Capability, Module, ModuleId, ModuleInfo};

/// Rewrites the request URI in place, then calls the rest of the chain.
///
/// `strip_path_prefix` runs first; `uri` then replaces the path, and the
/// query too when it contains `?`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Rewrite {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub uri: String,

    #[serde(skip_serializing_if = "String::is_empty")]
    pub strip_path_prefix: String,
}

impl Rewrite {
    pub const ID: &'static str = "http.handlers.rewrite";

    pub fn info() -> ModuleInfo {
        ModuleInfo::of::<Self>(Self::ID)
    }

    fn rewritten(&self, req: &HttpRequest) -> Option<String> {
        let current = req.uri();
        let mut path = current.path().to_string();
        let mut query = current.query().map(str::to_string);
        let mut changed = false;

        if !self.strip_path_prefix.is_empty() {
            if let Some(rest) = path.strip_prefix(self.strip_path_prefix.as_str()) {
                path = if rest.starts_with('/') {
                    rest.to_string()
                } else {
                    format!("/{}", rest)
                };
                changed = true;
            }
        }

        if !self.uri.is_empty() {
            let target = replace_placeholders(&self.uri, req);
            match target.split_once('?') {
                Some((p, q)) => {
                    if !p.is_empty() {
                        path = p.to_string();
                    }
                    query = (!q.is_empty()).then(|| q.to_string());
                }
                None => path = target,
            }
            changed = true;
        }

        changed.then(|| match query {
            Some(q) => format!("{}?{}", path, q),
            None => path,
        })
    }
}

#[async_trait]
impl MiddlewareHandler for Rewrite {
    async fn serve_http(
        &self,
        req: &mut HttpRequest,
        w: &mut ResponseWriter,
        next: &dyn Handler,
    ) -> Result<(), HandlerError> {
        if let Some(target) = self.rewritten(req) {
            let path_and_query: PathAndQuery = target.parse().map_err(HandlerError::internal)?;
            let mut parts = req.uri().clone().into_parts();
            parts.path_and_query = Some(path_and_query);
            let uri = Uri::from_parts(parts).map_err(HandlerError::internal)?;
            tracing::debug!(from = %req.uri(), to = %uri, "Rewrote request URI");
            *req.uri_mut() = uri;
        }
        next.serve_http(req, w).await
    }
}

impl Module for Rewrite {
    fn id(&self) -> ModuleId {
        ModuleId::new(Self::ID)
    }

    fn decode(&mut self, raw: Value) -> Result<(), serde_json::Error> {
        decode_into(self, raw)
    }

    fn capability(self: Arc<Self>) -> Capability {
        Capability::Handler(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;

    fn rewrite(r: &Rewrite, uri: &str) -> Option<String> {
        let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
        r.rewritten(&req)
    }

    #[test]
    fn test_strip_prefix() {
        let r = Rewrite {
            strip_path_prefix: "/api".into(),
            ..Default::default()
        };
        assert_eq!(rewrite(&r, "/api/users?x=1").as_deref(), Some("/users?x=1"));
        assert_eq!(rewrite(&r, "/api").as_deref(), Some("/"));
        assert_eq!(rewrite(&r, "/other"), None);
    }

    #[test]
    fn test_uri_keeps_query_unless_given() {
        let r = Rewrite {
            uri: "/index.html".into(),
            ..Default::default()
        };
        assert_eq!(rewrite(&r, "/a?b=c").as_deref(), Some("/index.html?b=c"));

        let r = Rewrite {
            uri: "?v=2".into(),
            ..Default::default()
        };
        assert_eq!(rewrite(&r, "/a?b=c").as_deref(), Some("/a?v=2"));
    }
}
