use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::Value;

use crate::admin::AdminState;

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub generation: u64,
    pub apps: Vec<String>,
}

#[derive(Serialize)]
pub struct ModuleList {
    pub modules: Vec<String>,
}

/// `GET /config`: the active document, or `null` before the first load.
pub async fn get_config(State(state): State<AdminState>) -> Response {
    match state.instance.current() {
        Some(running) => match serde_json::to_value(running.config()) {
            Ok(doc) => Json(doc).into_response(),
            Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        },
        None => Json(Value::Null).into_response(),
    }
}

/// `POST /load`: replace the active config with the request body.
pub async fn post_load(State(state): State<AdminState>, body: Bytes) -> Response {
    let instance = state.instance.clone();
    let result = tokio::task::spawn_blocking(move || instance.load_raw(&body)).await;

    match result {
        Ok(Ok(())) => StatusCode::OK.into_response(),
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "Admin load rejected");
            error_response(StatusCode::BAD_REQUEST, e.to_string())
        }
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

/// `GET /modules`: every registered module id.
pub async fn get_modules(State(state): State<AdminState>) -> Json<ModuleList> {
    Json(ModuleList {
        modules: state
            .instance
            .registry()
            .ids()
            .map(|id| id.to_string())
            .collect(),
    })
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    let running = state.instance.current();
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: if running.is_some() { "running" } else { "stopped" },
        generation: running.as_ref().map(|r| r.generation()).unwrap_or_default(),
        apps: running
            .map(|r| r.app_names().map(str::to_string).collect())
            .unwrap_or_default(),
    })
}

fn error_response(status: StatusCode, message: String) -> Response {
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}
