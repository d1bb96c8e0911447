//! `http.handlers.reverse_proxy`
//!
//! # Responsibilities
//! - Forward the request to one of the configured upstreams
//! - Rotate through upstreams in round-robin order
//! - Optionally override the response status through `handle_response` rules
//!
//! # Design Decisions
//! - Hop-by-hop headers are stripped in both directions
//! - Upstream connection failures surface as 502 handler errors
//! - The response body is streamed, never buffered

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::uri::{Authority, PathAndQuery, Scheme, Uri};
use axum::http::{HeaderMap, Request, StatusCode};
use hyper::body::Incoming;
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::Context;
use crate::error::{Error, Result};
use crate::http::handlers::WeakStatus;
use crate::http::response::ResponseMatcher;
use crate::http::{Handler, HandlerError, HttpRequest, MiddlewareHandler, ResponseWriter};
use crate::modules::{decode_into, Capability, Module, ModuleId, ModuleInfo, Provisioner};

const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Upstream {
    /// `host:port` to connect to.
    pub dial: String,
}

/// Status override applied when an upstream response matches.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResponseHandler {
    #[serde(rename = "match", skip_serializing_if = "Option::is_none")]
    pub matcher: Option<ResponseMatcher>,

    /// Replacement status, literal or placeholder.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<WeakStatus>,
}

impl ResponseHandler {
    fn matches(&self, status: StatusCode, headers: &HeaderMap) -> bool {
        self.matcher
            .as_ref()
            .map_or(true, |m| m.matches(status, headers))
    }
}

struct Transport {
    client: Client<HttpConnector, Body>,
    upstreams: Vec<Authority>,
    cursor: AtomicUsize,
}

impl Transport {
    fn next_upstream(&self) -> &Authority {
        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % self.upstreams.len();
        &self.upstreams[index]
    }
}

#[derive(Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReverseProxy {
    pub upstreams: Vec<Upstream>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub handle_response: Vec<ResponseHandler>,

    #[serde(skip)]
    transport: Option<Transport>,
}

impl ReverseProxy {
    pub const ID: &'static str = "http.handlers.reverse_proxy";

    pub fn info() -> ModuleInfo {
        ModuleInfo::of::<Self>(Self::ID)
    }
}

impl Provisioner for ReverseProxy {
    fn provision(&mut self, _ctx: &Context) -> Result<()> {
        if self.upstreams.is_empty() {
            return Err(Error::module("reverse_proxy requires at least one upstream"));
        }

        let upstreams = self
            .upstreams
            .iter()
            .map(|u| {
                u.dial
                    .parse::<Authority>()
                    .map_err(|e| Error::module(format!("invalid upstream {:?}: {}", u.dial, e)))
            })
            .collect::<Result<Vec<_>>>()?;

        for rule in &self.handle_response {
            if let Some(status) = &rule.status_code {
                status.validate()?;
            }
        }

        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        self.transport = Some(Transport {
            client,
            upstreams,
            cursor: AtomicUsize::new(0),
        });
        Ok(())
    }
}

#[async_trait]
impl MiddlewareHandler for ReverseProxy {
    async fn serve_http(
        &self,
        req: &mut HttpRequest,
        w: &mut ResponseWriter,
        _next: &dyn Handler,
    ) -> std::result::Result<(), HandlerError> {
        let Some(transport) = &self.transport else {
            return Err(HandlerError::internal("reverse proxy used before provisioning"));
        };
        let upstream = transport.next_upstream();

        let mut parts = req.uri().clone().into_parts();
        parts.scheme = Some(Scheme::HTTP);
        parts.authority = Some(upstream.clone());
        if parts.path_and_query.is_none() {
            parts.path_and_query = Some(PathAndQuery::from_static("/"));
        }
        let uri = Uri::from_parts(parts).map_err(HandlerError::internal)?;

        let mut outbound = Request::builder()
            .method(req.method().clone())
            .uri(uri)
            .body(std::mem::take(req.body_mut()))
            .map_err(HandlerError::internal)?;
        *outbound.headers_mut() = req.headers().clone();
        strip_hop_by_hop(outbound.headers_mut());

        tracing::debug!(upstream = %upstream, method = %req.method(), path = %req.uri().path(), "Proxying request");

        let response: hyper::Response<Incoming> = transport.client.request(outbound).await.map_err(|e| {
            tracing::warn!(upstream = %upstream, error = %e, "Upstream request failed");
            HandlerError::new(StatusCode::BAD_GATEWAY, e)
        })?;

        let (mut parts, body) = response.into_parts();
        let status = match self
            .handle_response
            .iter()
            .find(|rule| rule.matches(parts.status, &parts.headers))
            .and_then(|rule| rule.status_code.as_ref())
        {
            Some(status) => status.resolve(req)?,
            None => parts.status,
        };

        strip_hop_by_hop(&mut parts.headers);
        w.headers_mut().extend(parts.headers);
        w.write_header(status);
        w.write_body(Body::new(body));
        Ok(())
    }
}

impl Module for ReverseProxy {
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
    use axum::routing::get;
    use axum::Router;
    use serde_json::json;
    use tokio::net::TcpListener;

    async fn spawn_upstream(body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new()
            .route("/hello", get(move || async move { body }))
            .route("/missing", get(|| async { StatusCode::NOT_FOUND }));
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr.to_string()
    }

    fn provisioned(raw: Value) -> ReverseProxy {
        let (ctx, _teardown) = Context::root(standard_registry().unwrap().seal());
        let mut proxy = ReverseProxy::default();
        proxy.decode(raw).unwrap();
        proxy.provision(&ctx).unwrap();
        proxy
    }

    async fn send(proxy: &ReverseProxy, path: &str) -> (StatusCode, String) {
        let mut req = Request::builder().uri(path).body(Body::empty()).unwrap();
        let mut w = ResponseWriter::new();
        proxy.serve_http(&mut req, &mut w, &EmptyHandler).await.unwrap();
        let response = w.into_response();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_round_robin_across_upstreams() {
        let a = spawn_upstream("a").await;
        let b = spawn_upstream("b").await;
        let proxy = provisioned(json!({"upstreams": [{"dial": a}, {"dial": b}]}));

        assert_eq!(send(&proxy, "/hello").await.1, "a");
        assert_eq!(send(&proxy, "/hello").await.1, "b");
        assert_eq!(send(&proxy, "/hello").await.1, "a");
    }

    #[tokio::test]
    async fn test_handle_response_overrides_status() {
        let a = spawn_upstream("a").await;
        let proxy = provisioned(json!({
            "upstreams": [{"dial": a}],
            "handle_response": [{"match": {"status_code": [4]}, "status_code": 503}],
        }));
        assert_eq!(send(&proxy, "/missing").await.0, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(send(&proxy, "/hello").await.0, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_handle_response_status_placeholder() {
        let a = spawn_upstream("a").await;
        let proxy = provisioned(json!({
            "upstreams": [{"dial": a}],
            "handle_response": [{"match": {"status_code": [404]}, "status_code": "{http.error.status_code}"}],
        }));

        let mut req = Request::builder().uri("/missing").body(Body::empty()).unwrap();
        req.extensions_mut().insert(HandlerError::new(StatusCode::GONE, "gone"));
        let mut w = ResponseWriter::new();
        proxy.serve_http(&mut req, &mut w, &EmptyHandler).await.unwrap();
        assert_eq!(w.status(), Some(StatusCode::GONE));
    }

    #[test]
    fn test_literal_rule_status_checked_at_provision() {
        let (ctx, _teardown) = Context::root(standard_registry().unwrap().seal());
        let mut proxy = ReverseProxy::default();
        proxy
            .decode(json!({"upstreams": [{"dial": "127.0.0.1:1"}], "handle_response": [{"status_code": "abc"}]}))
            .unwrap();
        assert!(proxy.provision(&ctx).is_err());
    }

    #[tokio::test]
    async fn test_unreachable_upstream_is_bad_gateway() {
        // bind then drop to get a port nothing listens on
        let addr = TcpListener::bind("127.0.0.1:0").await.unwrap().local_addr().unwrap();
        let proxy = provisioned(json!({"upstreams": [{"dial": addr.to_string()}]}));

        let mut req = Request::builder().uri("/").body(Body::empty()).unwrap();
        let mut w = ResponseWriter::new();
        let err = proxy
            .serve_http(&mut req, &mut w, &EmptyHandler)
            .await
            .unwrap_err();
        assert_eq!(err.status_code, StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_requires_upstreams() {
        let (ctx, _teardown) = Context::root(standard_registry().unwrap().seal());
        let mut proxy = ReverseProxy::default();
        proxy.decode(json!({})).unwrap();
        assert!(proxy.provision(&ctx).is_err());
    }
}
