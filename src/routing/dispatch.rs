//! Route table evaluation.
//!
//! # State Machine
//! ```text
//! Evaluating(i) ──match──▶ Matched(i) ──▶ Executing(i) ──terminal──▶ Done
//!      │                                      │
//!      │ no match / group taken               └──non-terminal──▶ Continuing(i)
//!      ▼                                                              │
//! Evaluating(i+1) ◀───────────────────────────────────────────────────┘
//! Evaluating(len) ──▶ Done
//! ```
//!
//! # Design Decisions
//! - Routes are evaluated strictly in declaration order; handlers of earlier
//!   non-terminal routes may rewrite the request before later routes match
//! - A chain error leaves the table immediately; the caller routes it to the
//!   error table

use std::collections::HashSet;

use crate::http::{HandlerError, HttpRequest, ResponseWriter};
use crate::routing::route::RouteList;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Evaluating(usize),
    Matched(usize),
    Executing(usize),
    Continuing(usize),
    Done,
}

impl RouteList {
    /// Run the table against `req`. Returns whether any route matched.
    pub async fn dispatch(
        &self,
        req: &mut HttpRequest,
        w: &mut ResponseWriter,
    ) -> Result<bool, HandlerError> {
        let mut matched_any = false;
        let mut groups_taken: HashSet<&str> = HashSet::new();
        let mut state = State::Evaluating(0);

        loop {
            state = match state {
                State::Evaluating(i) => match self.0.get(i) {
                    None => State::Done,
                    Some(route) if !route.group.is_empty() && groups_taken.contains(route.group.as_str()) => {
                        State::Evaluating(i + 1)
                    }
                    Some(route) if route.matcher_sets.matches(req) => State::Matched(i),
                    Some(_) => State::Evaluating(i + 1),
                },
                State::Matched(i) => {
                    matched_any = true;
                    let route = &self.0[i];
                    if !route.group.is_empty() {
                        groups_taken.insert(route.group.as_str());
                    }
                    State::Executing(i)
                }
                State::Executing(i) => {
                    let route = &self.0[i];
                    let Some(chain) = route.chain() else {
                        return Err(HandlerError::internal(format!("route {} was not compiled", i)));
                    };
                    chain.serve_http(req, w).await?;
                    if route.terminal {
                        State::Done
                    } else {
                        State::Continuing(i)
                    }
                }
                State::Continuing(i) => State::Evaluating(i + 1),
                State::Done => return Ok(matched_any),
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::modules::standard_registry;
    use crate::routing::ChainEnd;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::json;

    async fn run(routes: serde_json::Value, req: HttpRequest) -> (bool, StatusCode, String) {
        let (ctx, _teardown) = Context::root(standard_registry().unwrap().seal());
        let mut list: RouteList = serde_json::from_value(routes).unwrap();
        list.provision(&ctx, "routes").unwrap();
        list.compile(ChainEnd::Primary);

        let mut req = req;
        let mut w = ResponseWriter::new();
        let matched = list.dispatch(&mut req, &mut w).await.unwrap();
        let response = w.into_response();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        (matched, status, String::from_utf8(body.to_vec()).unwrap())
    }

    fn get(uri: &str) -> HttpRequest {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_terminal_route_stops_evaluation() {
        let routes = json!([
            {"match": [{"path": ["/a"]}], "handle": [
                {"handler": "headers", "response": {"set": {"x-first": ["1"]}}}
            ], "terminal": true},
            {"handle": [{"handler": "static_response", "status_code": 418}]}
        ]);
        let (matched, status, _) = run(routes, get("/a")).await;
        assert!(matched);
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_non_terminal_mutation_visible_to_later_routes() {
        let routes = json!([
            {"match": [{"path": ["/old/*"]}], "handle": [
                {"handler": "rewrite", "strip_path_prefix": "/old"}
            ]},
            {"match": [{"path": ["/new"]}], "handle": [
                {"handler": "static_response", "body": "rewritten"}
            ], "terminal": true},
            {"handle": [{"handler": "static_response", "status_code": 404}]}
        ]);
        let (_, status, body) = run(routes, get("/old/new")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "rewritten");
    }

    #[tokio::test]
    async fn test_group_runs_first_match_only() {
        let routes = json!([
            {"group": "g", "handle": [
                {"handler": "headers", "response": {"add": {"x-hit": ["one"]}}}
            ]},
            {"group": "g", "handle": [
                {"handler": "static_response", "status_code": 500}
            ]},
            {"handle": [{"handler": "static_response", "body": "tail"}]}
        ]);
        let (_, status, body) = run(routes, get("/")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "tail");
    }

    #[tokio::test]
    async fn test_no_match_reports_false() {
        let routes = json!([
            {"match": [{"path": ["/only"]}], "handle": [{"handler": "static_response"}]}
        ]);
        let (matched, status, _) = run(routes, get("/elsewhere")).await;
        assert!(!matched);
        assert_eq!(status, StatusCode::OK);
    }
}
