//! Handler traits and chain composition.
//!
//! # Design Decisions
//! - Handlers take the request by `&mut` so mutations stay visible to later routes
//! - The response is accumulated in a [`ResponseWriter`] and materialized once
//! - Chains are built by right-fold; the tail is a sentinel, never `None`

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::response::Response;

use crate::http::HandlerError;
use crate::modules::ModuleId;

pub type HttpRequest = Request<Body>;

/// End of a chain, or a fully composed chain.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn serve_http(
        &self,
        req: &mut HttpRequest,
        w: &mut ResponseWriter,
    ) -> Result<(), HandlerError>;
}

/// A handler that may delegate to the rest of its chain.
#[async_trait]
pub trait MiddlewareHandler: Send + Sync {
    async fn serve_http(
        &self,
        req: &mut HttpRequest,
        w: &mut ResponseWriter,
        next: &dyn Handler,
    ) -> Result<(), HandlerError>;
}

/// Response under construction.
///
/// The first status written wins; later writes are ignored, as with a
/// real connection where the status line has already gone out.
#[derive(Default)]
pub struct ResponseWriter {
    status: Option<StatusCode>,
    headers: HeaderMap,
    body: Option<Body>,
}

impl ResponseWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_header(&mut self, status: StatusCode) {
        if self.status.is_none() {
            self.status = Some(status);
        }
    }

    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn write_body(&mut self, body: impl Into<Body>) {
        self.body = Some(body.into());
    }

    pub fn is_written(&self) -> bool {
        self.status.is_some() || self.body.is_some()
    }

    pub fn into_response(self) -> Response {
        let mut response = Response::new(self.body.unwrap_or_default());
        *response.status_mut() = self.status.unwrap_or(StatusCode::OK);
        *response.headers_mut() = self.headers;
        response
    }
}

/// Tail of primary route chains: does nothing.
#[derive(Debug, Default)]
pub struct EmptyHandler;

#[async_trait]
impl Handler for EmptyHandler {
    async fn serve_http(&self, _: &mut HttpRequest, _: &mut ResponseWriter) -> Result<(), HandlerError> {
        Ok(())
    }
}

/// Tail of error route chains: writes the status of the error being handled.
#[derive(Debug, Default)]
pub struct ErrorStatusHandler;

#[async_trait]
impl Handler for ErrorStatusHandler {
    async fn serve_http(
        &self,
        req: &mut HttpRequest,
        w: &mut ResponseWriter,
    ) -> Result<(), HandlerError> {
        let status = req
            .extensions()
            .get::<HandlerError>()
            .map(|err| err.status_code)
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        w.write_header(status);
        Ok(())
    }
}

struct Link {
    id: ModuleId,
    handler: Arc<dyn MiddlewareHandler>,
    next: Arc<dyn Handler>,
}

#[async_trait]
impl Handler for Link {
    async fn serve_http(
        &self,
        req: &mut HttpRequest,
        w: &mut ResponseWriter,
    ) -> Result<(), HandlerError> {
        self.handler
            .serve_http(req, w, self.next.as_ref())
            .await
            .map_err(|err| err.with_trace(&self.id))
    }
}

/// Right-fold `handlers` onto `tail`, returning the chain head.
pub fn compile_chain(
    handlers: &[(ModuleId, Arc<dyn MiddlewareHandler>)],
    tail: Arc<dyn Handler>,
) -> Arc<dyn Handler> {
    handlers.iter().rev().fold(tail, |next, (id, handler)| {
        let link: Arc<dyn Handler> = Arc::new(Link {
            id: id.clone(),
            handler: handler.clone(),
            next,
        });
        link
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Tag {
        label: &'static str,
        seen: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl MiddlewareHandler for Tag {
        async fn serve_http(
            &self,
            req: &mut HttpRequest,
            w: &mut ResponseWriter,
            next: &dyn Handler,
        ) -> Result<(), HandlerError> {
            self.seen.lock().unwrap().push(self.label);
            next.serve_http(req, w).await
        }
    }

    #[tokio::test]
    async fn test_chain_runs_in_declaration_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let handlers: Vec<(ModuleId, Arc<dyn MiddlewareHandler>)> = ["a", "b", "c"]
            .into_iter()
            .map(|label| {
                let handler: Arc<dyn MiddlewareHandler> = Arc::new(Tag {
                    label,
                    seen: seen.clone(),
                });
                (ModuleId::new("test.tag"), handler)
            })
            .collect();

        let chain = compile_chain(&handlers, Arc::new(EmptyHandler));
        let mut req = Request::new(Body::empty());
        let mut w = ResponseWriter::new();
        chain.serve_http(&mut req, &mut w).await.unwrap();

        assert_eq!(*seen.lock().unwrap(), vec!["a", "b", "c"]);
        assert_eq!(w.into_response().status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_error_sentinel_uses_error_status() {
        let mut req = Request::new(Body::empty());
        req.extensions_mut()
            .insert(HandlerError::new(StatusCode::NOT_FOUND, "missing"));
        let mut w = ResponseWriter::new();
        ErrorStatusHandler.serve_http(&mut req, &mut w).await.unwrap();
        assert_eq!(w.status(), Some(StatusCode::NOT_FOUND));
    }

    #[test]
    fn test_first_status_wins() {
        let mut w = ResponseWriter::new();
        w.write_header(StatusCode::CREATED);
        w.write_header(StatusCode::BAD_REQUEST);
        assert_eq!(w.status(), Some(StatusCode::CREATED));
    }
}
