//! The `http` app.
//!
//! # Responsibilities
//! - Decode `servers {name: {listen, routes, errors}}`
//! - Compile each server's primary and error route tables
//! - Serve requests: primary table, then the error table on failure
//!
//! # Design Decisions
//! - Sockets are owned by `net::ListenerSet`, which looks servers up by
//!   listen address on the current config; the app only tracks run state
//! - A server's error table sees the same (possibly mutated) request

use std::any::Any;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::Context;
use crate::error::{BoxError, Error, Result};
use crate::http::{HandlerError, HttpRequest, ResponseWriter};
use crate::modules::{decode_into, App, Capability, Module, ModuleId, ModuleInfo, Provisioner};
use crate::observability::metrics;
use crate::routing::{ChainEnd, RouteList};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Addresses like `"127.0.0.1:8080"` or `":8080"` (all interfaces).
    pub listen: Vec<String>,

    pub routes: RouteList,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<ServerErrors>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerErrors {
    pub routes: RouteList,
}

/// A provisioned server: compiled route tables plus its listen addresses.
pub struct Server {
    pub name: String,
    pub listen: Vec<SocketAddr>,
    routes: RouteList,
    errors: RouteList,
}

impl Server {
    /// Serve one request through the primary table, falling back to the
    /// error table when a handler fails.
    pub async fn serve(&self, mut req: HttpRequest) -> Response {
        let start = Instant::now();
        let method = req.method().clone();
        let path = req.uri().path().to_string();

        let mut w = ResponseWriter::new();
        let response = match self.routes.dispatch(&mut req, &mut w).await {
            Ok(matched) => {
                if !matched {
                    tracing::trace!(server = %self.name, path = %path, "No route matched");
                }
                w.into_response()
            }
            Err(err) => self.serve_error(req, err).await,
        };

        let status = response.status();
        tracing::debug!(
            server = %self.name,
            method = %method,
            path = %path,
            status = status.as_u16(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Request served"
        );
        metrics::record_request(&self.name, status.as_u16(), start);
        response
    }

    async fn serve_error(&self, mut req: HttpRequest, err: HandlerError) -> Response {
        let status = err.status_code;
        if status.is_server_error() {
            tracing::error!(server = %self.name, error_id = %err.id, trace = %err.trace, error = %err.err, status = status.as_u16(), "Handler error");
        } else {
            tracing::debug!(server = %self.name, error_id = %err.id, trace = %err.trace, error = %err.err, status = status.as_u16(), "Handler error");
        }

        req.extensions_mut().insert(err);
        let mut w = ResponseWriter::new();
        match self.errors.dispatch(&mut req, &mut w).await {
            Ok(true) => w.into_response(),
            Ok(false) => status.into_response(),
            Err(nested) => {
                tracing::error!(server = %self.name, error_id = %nested.id, error = %nested.err, "Error route failed");
                nested.status_code.into_response()
            }
        }
    }

    pub fn routes(&self) -> &RouteList {
        &self.routes
    }

    pub fn errors(&self) -> &RouteList {
        &self.errors
    }
}

fn parse_listen(raw: &str) -> std::result::Result<SocketAddr, BoxError> {
    let normalized = if raw.starts_with(':') {
        format!("0.0.0.0{}", raw)
    } else {
        raw.to_string()
    };
    normalized
        .parse()
        .map_err(|e| format!("invalid listen address {:?}: {}", raw, e).into())
}

/// Module `http`.
#[derive(Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HttpApp {
    pub servers: BTreeMap<String, ServerConfig>,

    #[serde(skip)]
    compiled: Vec<Arc<Server>>,

    #[serde(skip)]
    running: AtomicBool,
}

impl HttpApp {
    pub const ID: &'static str = "http";

    pub fn info() -> ModuleInfo {
        ModuleInfo::of::<Self>(Self::ID)
    }

    pub fn servers(&self) -> &[Arc<Server>] {
        &self.compiled
    }

    /// The server listening on `addr`, if any.
    pub fn server_for(&self, addr: &SocketAddr) -> Option<Arc<Server>> {
        self.compiled
            .iter()
            .find(|server| server.listen.contains(addr))
            .cloned()
    }

    pub fn listen_addresses(&self) -> Vec<SocketAddr> {
        let mut addrs: Vec<SocketAddr> = self
            .compiled
            .iter()
            .flat_map(|server| server.listen.iter().copied())
            .collect();
        addrs.sort();
        addrs.dedup();
        addrs
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

impl Provisioner for HttpApp {
    fn provision(&mut self, ctx: &Context) -> Result<()> {
        let mut claimed: BTreeMap<SocketAddr, String> = BTreeMap::new();
        let mut compiled = Vec::with_capacity(self.servers.len());

        for (name, config) in &self.servers {
            let base = format!("apps.http.servers.{}", name);

            let listen = config
                .listen
                .iter()
                .map(|raw| parse_listen(raw).map_err(Error::Module))
                .collect::<Result<Vec<_>>>()?;
            for addr in &listen {
                if let Some(other) = claimed.insert(*addr, name.clone()) {
                    return Err(Error::module(format!(
                        "server {} and {} both listen on {}",
                        other, name, addr
                    )));
                }
            }

            let mut routes = config.routes.clone();
            routes.provision(ctx, &format!("{}.routes", base))?;
            routes.compile(ChainEnd::Primary);

            let mut errors = config
                .errors
                .as_ref()
                .map(|e| e.routes.clone())
                .unwrap_or_default();
            errors.provision(ctx, &format!("{}.errors.routes", base))?;
            errors.compile(ChainEnd::Errors);

            tracing::debug!(
                server = %name,
                routes = routes.len(),
                error_routes = errors.len(),
                "Server provisioned"
            );

            compiled.push(Arc::new(Server {
                name: name.clone(),
                listen,
                routes,
                errors,
            }));
        }

        self.compiled = compiled;
        Ok(())
    }
}

impl App for HttpApp {
    fn start(&self) -> std::result::Result<(), BoxError> {
        self.running.store(true, Ordering::Release);
        for server in &self.compiled {
            tracing::info!(
                server = %server.name,
                listen = ?server.listen,
                "HTTP server started"
            );
        }
        Ok(())
    }

    fn stop(&self) -> std::result::Result<(), BoxError> {
        if self.running.swap(false, Ordering::AcqRel) {
            tracing::info!(servers = self.compiled.len(), "HTTP app stopped");
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Module for HttpApp {
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
        Capability::App(self)
    }
}
