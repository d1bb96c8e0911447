//! Admin access control.
//!
//! # Responsibilities
//! - Decide whether a credential may perform a method on an admin path
//! - Enforce the origin allow-list when configured
//! - Reject every failure with the same 403 so callers learn nothing
//!
//! # Design Decisions
//! - No access entries means nothing is authorized
//! - Permissions belong to the entry holding the key; keys never borrow
//!   another entry's rules

use std::collections::HashSet;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use url::Url;

use crate::admin::AdminState;
use crate::config::{AdminConfig, AdminPermissions};

#[derive(Debug, Clone)]
struct AccessRule {
    paths: Vec<String>,
    methods: Vec<String>,
}

impl AccessRule {
    fn from_config(p: &AdminPermissions) -> Self {
        Self {
            paths: p.paths.clone(),
            methods: p.methods.iter().map(|m| m.to_ascii_uppercase()).collect(),
        }
    }

    fn allows(&self, path: &str, method: &str) -> bool {
        let path_ok = self.paths.is_empty() || self.paths.iter().any(|prefix| path.starts_with(prefix.as_str()));
        let method_ok = self.methods.is_empty() || self.methods.iter().any(|m| m.eq_ignore_ascii_case(method));
        path_ok && method_ok
    }
}

#[derive(Debug, Clone)]
struct AccessEntry {
    keys: HashSet<String>,
    rules: Vec<AccessRule>,
}

impl AccessEntry {
    fn allows(&self, path: &str, method: &str) -> bool {
        self.rules.is_empty() || self.rules.iter().any(|rule| rule.allows(path, method))
    }
}

/// Compiled admin authorization policy.
#[derive(Debug, Clone, Default)]
pub struct AdminAccessControl {
    entries: Vec<AccessEntry>,
    enforce_origin: bool,
    origins: Vec<String>,
}

impl AdminAccessControl {
    pub fn from_config(config: &AdminConfig) -> Self {
        let entries = config
            .access_control()
            .iter()
            .map(|access| AccessEntry {
                keys: access.public_keys.iter().cloned().collect(),
                rules: access.permissions.iter().map(AccessRule::from_config).collect(),
            })
            .collect();

        let origins = if config.origins.is_empty() {
            default_origins(&config.listen)
        } else {
            config.origins.clone()
        };

        Self {
            entries,
            enforce_origin: config.enforce_origin,
            origins,
        }
    }

    /// A policy that authorizes nothing.
    pub fn deny_all() -> Self {
        Self::default()
    }

    /// `credential` must belong to an entry whose rules admit `method` on
    /// `path`; with origin enforcement on, `origin` must also be allowed.
    pub fn authorize(&self, credential: &str, path: &str, method: &str, origin: &str) -> bool {
        if credential.is_empty() {
            return false;
        }
        let granted = self
            .entries
            .iter()
            .filter(|entry| entry.keys.contains(credential))
            .any(|entry| entry.allows(path, method));
        if !granted {
            return false;
        }
        !self.enforce_origin || self.origin_allowed(origin)
    }

    fn origin_allowed(&self, origin: &str) -> bool {
        if origin.is_empty() {
            return false;
        }
        let key = origin_key(origin);
        self.origins
            .iter()
            .any(|allowed| allowed == origin || origin_key(allowed) == key)
    }
}

/// `host[:port]` of a URL-shaped origin, or the input unchanged.
fn origin_key(origin: &str) -> String {
    match Url::parse(origin) {
        Ok(url) => match (url.host_str(), url.port()) {
            (Some(host), Some(port)) => format!("{}:{}", host, port),
            (Some(host), None) => host.to_string(),
            _ => origin.to_string(),
        },
        Err(_) => origin.to_string(),
    }
}

fn default_origins(listen: &str) -> Vec<String> {
    let port = listen.rsplit_once(':').map(|(_, p)| p).unwrap_or_default();
    if port.is_empty() {
        return vec!["localhost".into(), "127.0.0.1".into(), "[::1]".into()];
    }
    vec![
        format!("localhost:{}", port),
        format!("127.0.0.1:{}", port),
        format!("[::1]:{}", port),
    ]
}

fn bearer(req: &Request<Body>) -> &str {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .unwrap_or_default()
}

fn request_origin(req: &Request<Body>) -> &str {
    req.headers()
        .get(header::ORIGIN)
        .or_else(|| req.headers().get(header::REFERER))
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

/// Gate every admin route on [`AdminAccessControl::authorize`] against the
/// current config's policy.
pub async fn admin_auth_middleware(
    State(state): State<AdminState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let access: Arc<AdminAccessControl> = state.access();
    let allowed = access.authorize(
        bearer(&request),
        request.uri().path(),
        request.method().as_str(),
        request_origin(&request),
    );

    if !allowed {
        tracing::warn!(
            method = %request.method(),
            path = %request.uri().path(),
            "Admin request denied"
        );
        return (StatusCode::FORBIDDEN, "forbidden").into_response();
    }
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn policy(admin: serde_json::Value) -> AdminAccessControl {
        AdminAccessControl::from_config(&serde_json::from_value(admin).unwrap())
    }

    #[test]
    fn test_no_entries_denies_everything() {
        let access = policy(json!({}));
        assert!(!access.authorize("anything", "/config", "GET", ""));
        assert!(!AdminAccessControl::deny_all().authorize("k", "/", "GET", ""));
    }

    #[test]
    fn test_rules_belong_to_their_entry() {
        let access = policy(json!({
            "remote": {"access_control": [
                {"public_keys": ["reader"], "permissions": [{"paths": ["/config"], "methods": ["get"]}]},
                {"public_keys": ["writer"], "permissions": [{"path": ["/load"], "methods": ["POST"]}]},
                {"public_keys": ["root"]}
            ]}
        }));

        assert!(access.authorize("reader", "/config/apps", "GET", ""));
        assert!(!access.authorize("reader", "/config", "POST", ""));
        assert!(!access.authorize("reader", "/load", "POST", ""));
        assert!(access.authorize("writer", "/load", "post", ""));
        assert!(!access.authorize("writer", "/config", "GET", ""));
        assert!(access.authorize("root", "/anything", "DELETE", ""));
        assert!(!access.authorize("unknown", "/config", "GET", ""));
        assert!(!access.authorize("", "/config", "GET", ""));
    }

    #[test]
    fn test_origin_enforcement() {
        let access = policy(json!({
            "enforce_origin": true,
            "origins": ["admin.example.com:2019"],
            "remote": {"access_control": [{"public_keys": ["k"]}]}
        }));

        assert!(access.authorize("k", "/config", "GET", "http://admin.example.com:2019"));
        assert!(access.authorize("k", "/config", "GET", "admin.example.com:2019"));
        assert!(!access.authorize("k", "/config", "GET", "http://evil.example.com"));
        assert!(!access.authorize("k", "/config", "GET", ""));
    }

    #[test]
    fn test_default_origins_follow_listen_port() {
        let access = policy(json!({
            "listen": "localhost:2019",
            "enforce_origin": true,
            "remote": {"access_control": [{"public_keys": ["k"]}]}
        }));
        assert!(access.authorize("k", "/", "GET", "http://localhost:2019"));
        assert!(access.authorize("k", "/", "GET", "http://127.0.0.1:2019/page"));
        assert!(!access.authorize("k", "/", "GET", "http://localhost:8080"));
    }
}
