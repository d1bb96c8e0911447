//! Route compilation.
//!
//! # Responsibilities
//! - Decode `match` fragments into [`MatcherSets`] (namespace `http.matchers`)
//! - Decode `handle` fragments into middleware handlers (namespace `http.handlers`)
//! - Right-fold handlers into a chain ending in a sentinel
//!
//! # Design Decisions
//! - Compiled state lives beside the raw fragments so a route can be printed as declared
//! - Route order is preserved exactly; no sorting or merging

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::Context;
use crate::error::{Error, Result};
use crate::http::{compile_chain, EmptyHandler, ErrorStatusHandler, Handler, MiddlewareHandler};
use crate::modules::ModuleId;
use crate::routing::matcher::MatcherSets;

/// Which sentinel terminates a compiled chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainEnd {
    /// Primary routes: the empty handler.
    Primary,
    /// Error routes: writes the status of the error being handled.
    Errors,
}

impl ChainEnd {
    fn tail(self) -> Arc<dyn Handler> {
        match self {
            ChainEnd::Primary => Arc::new(EmptyHandler),
            ChainEnd::Errors => Arc::new(ErrorStatusHandler),
        }
    }
}

/// One entry of a route table.
#[derive(Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Route {
    /// Only the first matching route of a group runs.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub group: String,

    #[serde(rename = "match", skip_serializing_if = "Vec::is_empty")]
    pub matcher_sets_raw: Vec<Value>,

    #[serde(rename = "handle", skip_serializing_if = "Vec::is_empty")]
    pub handlers_raw: Vec<Value>,

    /// Stop evaluating the table after this route runs.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub terminal: bool,

    #[serde(skip)]
    pub matcher_sets: MatcherSets,

    #[serde(skip)]
    pub handlers: Vec<(ModuleId, Arc<dyn MiddlewareHandler>)>,

    #[serde(skip)]
    chain: Option<Arc<dyn Handler>>,
}

impl Route {
    /// True when every field, raw and compiled, is at its zero value.
    pub fn is_empty(&self) -> bool {
        self.matcher_sets_raw.is_empty()
            && self.matcher_sets.is_empty()
            && self.handlers_raw.is_empty()
            && self.handlers.is_empty()
            && !self.terminal
            && self.group.is_empty()
    }

    /// Load matchers and handlers under `ctx`.
    pub fn provision(&mut self, ctx: &Context, path: &str) -> Result<()> {
        if self.is_empty() {
            return Err(Error::Match {
                path: path.to_string(),
                reason: "route is empty".to_string(),
            });
        }

        self.matcher_sets = ctx.load_matcher_sets(&self.matcher_sets_raw, &format!("{}.match", path))?;

        self.handlers = Vec::with_capacity(self.handlers_raw.len());
        for (i, raw) in self.handlers_raw.iter().enumerate() {
            self.handlers
                .push(ctx.load_handler(raw, &format!("{}.handle[{}]", path, i))?);
        }

        Ok(())
    }

    /// Build the chain head from the provisioned handlers.
    pub fn compile(&mut self, end: ChainEnd) {
        self.chain = Some(compile_chain(&self.handlers, end.tail()));
    }

    pub fn chain(&self) -> Option<&Arc<dyn Handler>> {
        self.chain.as_ref()
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{Group:{:?} MatcherSetsRaw:{} HandlersRaw:{} Terminal:{}}}",
            self.group,
            Value::Array(self.matcher_sets_raw.clone()),
            Value::Array(self.handlers_raw.clone()),
            self.terminal
        )
    }
}

/// Ordered route table.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(transparent)]
pub struct RouteList(pub Vec<Route>);

impl RouteList {
    pub fn provision(&mut self, ctx: &Context, path: &str) -> Result<()> {
        for (i, route) in self.0.iter_mut().enumerate() {
            route.provision(ctx, &format!("{}[{}]", path, i))?;
        }
        Ok(())
    }

    pub fn compile(&mut self, end: ChainEnd) {
        for route in &mut self.0 {
            route.compile(end);
        }
    }

    pub fn routes(&self) -> &[Route] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::standard_registry;
    use serde_json::json;

    fn ctx() -> (Context, crate::context::Teardown) {
        Context::root(standard_registry().unwrap().seal())
    }

    #[test]
    fn test_empty_route_rejected() {
        let (ctx, _teardown) = ctx();
        let mut route = Route::default();
        let err = route.provision(&ctx, "routes[0]").unwrap_err();
        assert!(matches!(err, Error::Match { .. }));
    }

    #[test]
    fn test_non_object_matcher_set_rejected() {
        let (ctx, _teardown) = ctx();
        let mut route: Route = serde_json::from_value(json!({
            "match": [["not", "an", "object"]],
        }))
        .unwrap();
        let err = route.provision(&ctx, "routes[0]").unwrap_err();
        assert!(matches!(err, Error::Match { path, .. } if path == "routes[0].match[0]"));
    }

    #[test]
    fn test_provision_loads_matchers_and_handlers() {
        let (ctx, _teardown) = ctx();
        let mut route: Route = serde_json::from_value(json!({
            "group": "g",
            "match": [{"path": ["/a"]}, {"path": ["/b"], "method": ["get"]}],
            "handle": [{"handler": "static_response", "body": "hi"}],
            "terminal": true,
        }))
        .unwrap();
        route.provision(&ctx, "routes[0]").unwrap();
        route.compile(ChainEnd::Primary);

        assert_eq!(route.matcher_sets.len(), 2);
        assert_eq!(route.matcher_sets.0[1].0.len(), 2);
        assert_eq!(route.handlers.len(), 1);
        assert_eq!(route.handlers[0].0.as_str(), "http.handlers.static_response");
        assert!(route.chain().is_some());
        assert_eq!(ctx.instances("http.matchers.path").len(), 2);
    }

    #[test]
    fn test_unknown_handler_rejected() {
        let (ctx, _teardown) = ctx();
        let mut route: Route = serde_json::from_value(json!({
            "handle": [{"handler": "nonexistent"}],
        }))
        .unwrap();
        let err = route.provision(&ctx, "routes[0]").unwrap_err();
        assert!(matches!(err, Error::UnknownModule(id) if id.as_str() == "http.handlers.nonexistent"));
    }
}
