//! Request matching.
//!
//! # Responsibilities
//! - Predicate trait implemented by `http.matchers.*` modules
//! - AND within a [`MatcherSet`], OR across [`MatcherSets`]
//! - Built-in path, method, host and header matchers
//!
//! # Design Decisions
//! - Host matching is case-insensitive
//! - Path matching is case-sensitive
//! - Empty set = always matches (wildcard)
//! - Glob support is limited to a leading and/or trailing `*`

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use crate::context::Context;
use crate::error::Result;
use crate::http::HttpRequest;
use crate::modules::{decode_into, Capability, Module, ModuleId, ModuleInfo, Provisioner};

/// Trait for matching requests against conditions.
pub trait RequestMatcher: Send + Sync {
    /// Returns true if the request matches this condition.
    fn matches(&self, req: &HttpRequest) -> bool;
}

/// Predicates combined with AND semantics.
#[derive(Clone, Default)]
pub struct MatcherSet(pub Vec<Arc<dyn RequestMatcher>>);

impl MatcherSet {
    pub fn matches(&self, req: &HttpRequest) -> bool {
        self.0.iter().all(|m| m.matches(req))
    }
}

/// Matcher sets combined with OR semantics. No sets matches everything.
#[derive(Clone, Default)]
pub struct MatcherSets(pub Vec<MatcherSet>);

impl MatcherSets {
    pub fn matches(&self, req: &HttpRequest) -> bool {
        self.0.is_empty() || self.0.iter().any(|set| set.matches(req))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// `*` matches anything; `pre*`, `*suf` and `*mid*` match by prefix, suffix
/// and substring; anything else must match exactly.
pub(crate) fn glob_match(pattern: &str, value: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    match (pattern.strip_prefix('*'), pattern.strip_suffix('*')) {
        (Some(rest), Some(_)) if rest.len() > 1 => value.contains(&rest[..rest.len() - 1]),
        (Some(suffix), None) => value.ends_with(suffix),
        (None, Some(prefix)) => value.starts_with(prefix),
        _ => pattern == value,
    }
}

/// `http.matchers.path`: any listed pattern matches the request path.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct MatchPath(pub Vec<String>);

impl MatchPath {
    pub const ID: &'static str = "http.matchers.path";

    pub fn info() -> ModuleInfo {
        ModuleInfo::of::<Self>(Self::ID)
    }
}

impl RequestMatcher for MatchPath {
    fn matches(&self, req: &HttpRequest) -> bool {
        let path = req.uri().path();
        self.0.iter().any(|pattern| glob_match(pattern, path))
    }
}

impl Module for MatchPath {
    fn id(&self) -> ModuleId {
        ModuleId::new(Self::ID)
    }

    fn decode(&mut self, raw: Value) -> std::result::Result<(), serde_json::Error> {
        decode_into(self, raw)
    }

    fn capability(self: Arc<Self>) -> Capability {
        Capability::Matcher(self)
    }
}

/// `http.matchers.method`: request method is one of the listed verbs.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct MatchMethod(pub Vec<String>);

impl MatchMethod {
    pub const ID: &'static str = "http.matchers.method";

    pub fn info() -> ModuleInfo {
        ModuleInfo::of::<Self>(Self::ID)
    }
}

impl RequestMatcher for MatchMethod {
    fn matches(&self, req: &HttpRequest) -> bool {
        let method = req.method().as_str();
        self.0.iter().any(|m| m == method)
    }
}

impl Provisioner for MatchMethod {
    fn provision(&mut self, _ctx: &Context) -> Result<()> {
        for method in &mut self.0 {
            *method = method.to_ascii_uppercase();
        }
        Ok(())
    }
}

impl Module for MatchMethod {
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
        Capability::Matcher(self)
    }
}

/// `http.matchers.host`: Host header (or URI authority) equals one of the
/// listed hosts. `*.example.com` matches exactly one extra label.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct MatchHost(pub Vec<String>);

impl MatchHost {
    pub const ID: &'static str = "http.matchers.host";

    pub fn info() -> ModuleInfo {
        ModuleInfo::of::<Self>(Self::ID)
    }

    fn request_host(req: &HttpRequest) -> Option<String> {
        let raw = req
            .headers()
            .get("host")
            .and_then(|h| h.to_str().ok())
            .or_else(|| req.uri().authority().map(|a| a.as_str()))?;
        // drop the port, keeping bracketed IPv6 literals intact
        let host = match raw.rsplit_once(':') {
            Some((host, port)) if !host.ends_with(':') && port.chars().all(|c| c.is_ascii_digit()) => host,
            _ => raw,
        };
        Some(host.to_lowercase())
    }
}

impl RequestMatcher for MatchHost {
    fn matches(&self, req: &HttpRequest) -> bool {
        let Some(host) = Self::request_host(req) else {
            return false;
        };
        self.0.iter().any(|expected| match expected.strip_prefix("*.") {
            Some(parent) => host
                .split_once('.')
                .is_some_and(|(label, rest)| !label.is_empty() && rest == parent),
            None => *expected == host,
        })
    }
}

impl Provisioner for MatchHost {
    fn provision(&mut self, _ctx: &Context) -> Result<()> {
        for host in &mut self.0 {
            *host = host.to_lowercase();
        }
        Ok(())
    }
}

impl Module for MatchHost {
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
        Capability::Matcher(self)
    }
}

/// `http.matchers.header`: every listed field is present and, when values
/// are given, one of its values matches one of the patterns.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct MatchHeader(pub BTreeMap<String, Vec<String>>);

impl MatchHeader {
    pub const ID: &'static str = "http.matchers.header";

    pub fn info() -> ModuleInfo {
        ModuleInfo::of::<Self>(Self::ID)
    }
}

impl RequestMatcher for MatchHeader {
    fn matches(&self, req: &HttpRequest) -> bool {
        self.0.iter().all(|(field, patterns)| {
            let mut values = req
                .headers()
                .get_all(field.as_str())
                .iter()
                .filter_map(|v| v.to_str().ok())
                .peekable();
            if values.peek().is_none() {
                return false;
            }
            patterns.is_empty()
                || values.any(|value| patterns.iter().any(|p| glob_match(p, value)))
        })
    }
}

impl Module for MatchHeader {
    fn id(&self) -> ModuleId {
        ModuleId::new(Self::ID)
    }

    fn decode(&mut self, raw: Value) -> std::result::Result<(), serde_json::Error> {
        decode_into(self, raw)
    }

    fn capability(self: Arc<Self>) -> Capability {
        Capability::Matcher(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;

    fn get(uri: &str) -> HttpRequest {
        Request::builder().uri(uri).body(Body::default()).unwrap()
    }

    #[test]
    fn test_host_matcher() {
        let mut matcher = MatchHost(vec!["Example.com".into(), "*.apps.test".into()]);
        matcher.0.iter_mut().for_each(|h| *h = h.to_lowercase());

        let req1 = Request::builder()
            .header("Host", "example.com")
            .body(Body::default())
            .unwrap();
        assert!(matcher.matches(&req1));

        let req2 = Request::builder()
            .header("Host", "EXAMPLE.COM:8080")
            .body(Body::default())
            .unwrap();
        assert!(matcher.matches(&req2)); // Case insensitive, port ignored

        let req3 = Request::builder()
            .header("Host", "other.com")
            .body(Body::default())
            .unwrap();
        assert!(!matcher.matches(&req3));

        let req4 = Request::builder()
            .header("Host", "api.apps.test")
            .body(Body::default())
            .unwrap();
        assert!(matcher.matches(&req4));
    }

    #[test]
    fn test_path_matcher() {
        let matcher = MatchPath(vec!["/api/*".into(), "*.php".into(), "/exact".into()]);

        assert!(matcher.matches(&get("http://example.com/api/v1")));
        assert!(matcher.matches(&get("/index.php")));
        assert!(matcher.matches(&get("/exact")));
        assert!(!matcher.matches(&get("/exact/not")));
        assert!(!matcher.matches(&get("http://example.com/images")));
    }

    #[test]
    fn test_glob_match() {
        assert!(glob_match("*", "/anything"));
        assert!(glob_match("*admin*", "/x/admin/y"));
        assert!(!glob_match("*admin*", "/x/user/y"));
        assert!(glob_match("/a*", "/abc"));
        assert!(!glob_match("/a", "/abc"));
    }

    #[test]
    fn test_header_matcher() {
        let matcher = MatchHeader(BTreeMap::from([
            ("x-tenant".to_string(), vec!["blue*".to_string()]),
            ("authorization".to_string(), vec![]),
        ]));

        let ok = Request::builder()
            .header("x-tenant", "blue-7")
            .header("authorization", "Bearer x")
            .body(Body::default())
            .unwrap();
        assert!(matcher.matches(&ok));

        let missing = Request::builder()
            .header("x-tenant", "blue-7")
            .body(Body::default())
            .unwrap();
        assert!(!matcher.matches(&missing));
    }

    #[test]
    fn test_sets_and_within_or_across() {
        let sets = MatcherSets(vec![
            MatcherSet(vec![Arc::new(MatchPath(vec!["/a".into()]))]),
            MatcherSet(vec![
                Arc::new(MatchPath(vec!["/b".into()])),
                Arc::new(MatchMethod(vec!["GET".into()])),
            ]),
        ]);

        let req = |method: &str, uri: &str| {
            Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::default())
                .unwrap()
        };
        assert!(sets.matches(&req("GET", "/a")));
        assert!(sets.matches(&req("GET", "/b")));
        assert!(!sets.matches(&req("POST", "/b")));
        assert!(MatcherSets::default().matches(&req("DELETE", "/anything")));
    }
}
