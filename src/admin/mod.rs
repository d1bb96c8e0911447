//! Admin control surface.
//!
//! | method | path       | action                          |
//! |--------|------------|---------------------------------|
//! | GET    | `/config`  | active document                 |
//! | POST   | `/load`    | replace the active document     |
//! | GET    | `/modules` | registered module ids           |
//! | GET    | `/status`  | version, generation, apps       |
//!
//! Every route sits behind [`auth::admin_auth_middleware`].

pub mod auth;
pub mod handlers;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;

use self::auth::{admin_auth_middleware, AdminAccessControl};
use self::handlers::*;
use crate::lifecycle::{Instance, ShutdownSignal};

#[derive(Clone)]
pub struct AdminState {
    pub instance: Arc<Instance>,
}

impl AdminState {
    pub fn new(instance: Arc<Instance>) -> Self {
        Self { instance }
    }

    /// Policy of the active config; deny-all before the first load.
    pub fn access(&self) -> Arc<AdminAccessControl> {
        self.instance
            .current()
            .map(|running| running.access())
            .unwrap_or_else(|| Arc::new(AdminAccessControl::deny_all()))
    }
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/config", get(get_config))
        .route("/load", post(post_load))
        .route("/modules", get(get_modules))
        .route("/status", get(get_status))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .with_state(state)
}

/// Serve the admin API until `shutdown` fires.
pub async fn serve(
    listener: TcpListener,
    state: AdminState,
    mut shutdown: ShutdownSignal,
) -> std::io::Result<()> {
    let addr = listener.local_addr()?;
    tracing::info!(address = %addr, "Admin endpoint listening");

    axum::serve(listener, setup_admin_router(state))
        .with_graceful_shutdown(async move { shutdown.recv().await })
        .await?;

    tracing::info!(address = %addr, "Admin endpoint stopped");
    Ok(())
}
