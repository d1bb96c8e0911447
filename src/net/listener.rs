//! HTTP listeners for the active config.
//!
//! # Responsibilities
//! - Keep one bound socket per listen address of the active HTTP app
//! - Route each request to the server that owns its address right now
//! - Answer 503 while no server owns an address (between configs)

use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
    Router,
};
use dashmap::DashMap;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::lifecycle::{Instance, ShutdownSignal};

/// Router for one listen address.
pub fn server_router(instance: Arc<Instance>, addr: SocketAddr) -> Router {
    Router::new()
        .fallback(move |request: Request<Body>| {
            let instance = instance.clone();
            async move { dispatch(&instance, addr, request).await }
        })
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}

async fn dispatch(instance: &Instance, addr: SocketAddr, request: Request<Body>) -> Response {
    let server = instance
        .current()
        .and_then(|running| running.http_server_for(&addr));

    match server {
        Some(server) => server.serve(request).await,
        None => {
            tracing::debug!(address = %addr, "No server for address");
            StatusCode::SERVICE_UNAVAILABLE.into_response()
        }
    }
}

/// Bound sockets, keyed by configured listen address.
pub struct ListenerSet {
    instance: Arc<Instance>,
    active: DashMap<SocketAddr, oneshot::Sender<()>>,
}

impl ListenerSet {
    pub fn new(instance: Arc<Instance>) -> Self {
        Self {
            instance,
            active: DashMap::new(),
        }
    }

    /// Addresses currently being served, sorted.
    pub fn bound(&self) -> Vec<SocketAddr> {
        let mut addrs: Vec<SocketAddr> = self.active.iter().map(|e| *e.key()).collect();
        addrs.sort();
        addrs
    }

    /// Bind addresses the active config wants and release the rest.
    ///
    /// Bind failures are logged; the address is retried on the next sync.
    pub async fn sync(&self) {
        let wanted: BTreeSet<SocketAddr> = self
            .instance
            .current()
            .and_then(|running| running.http_app().map(|app| app.listen_addresses()))
            .unwrap_or_default()
            .into_iter()
            .collect();

        let stale: Vec<SocketAddr> = self
            .active
            .iter()
            .map(|e| *e.key())
            .filter(|addr| !wanted.contains(addr))
            .collect();
        for addr in stale {
            if let Some((_, stop)) = self.active.remove(&addr) {
                let _ = stop.send(());
                tracing::info!(address = %addr, "Listener released");
            }
        }

        for addr in wanted {
            if self.active.contains_key(&addr) {
                continue;
            }
            match TcpListener::bind(addr).await {
                Ok(listener) => {
                    let (stop, stopped) = oneshot::channel();
                    self.active.insert(addr, stop);
                    tokio::spawn(serve(listener, server_router(self.instance.clone(), addr), stopped));
                }
                Err(e) => tracing::error!(address = %addr, error = %e, "Failed to bind listener"),
            }
        }
    }

    /// Follow config generations until `shutdown` fires, then release all sockets.
    pub async fn run(self: Arc<Self>, mut shutdown: ShutdownSignal) {
        let mut generations = self.instance.subscribe();
        self.sync().await;

        loop {
            tokio::select! {
                changed = generations.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    self.sync().await;
                }
                _ = shutdown.recv() => break,
            }
        }
        self.release_all();
    }

    pub fn release_all(&self) {
        let addrs: Vec<SocketAddr> = self.active.iter().map(|e| *e.key()).collect();
        for addr in addrs {
            if let Some((_, stop)) = self.active.remove(&addr) {
                let _ = stop.send(());
            }
        }
    }
}

async fn serve(listener: TcpListener, router: Router, stopped: oneshot::Receiver<()>) {
    let addr = match listener.local_addr() {
        Ok(addr) => addr,
        Err(e) => {
            tracing::error!(error = %e, "Listener has no local address");
            return;
        }
    };
    tracing::info!(address = %addr, "HTTP listener started");

    let result = axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = stopped.await;
        })
        .await;

    match result {
        Ok(()) => tracing::info!(address = %addr, "HTTP listener stopped"),
        Err(e) => tracing::error!(address = %addr, error = %e, "HTTP listener failed"),
    }
}
