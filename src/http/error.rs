//! Request-scoped handler errors.

use std::sync::Arc;

use axum::http::StatusCode;

use crate::error::BoxError;
use crate::modules::ModuleId;

/// Failure raised by a handler chain.
///
/// Stored as a request extension while the error routes run, so error
/// handlers can read the status and id of what went wrong.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{status_code} (id={id}, trace={trace}): {err}")]
pub struct HandlerError {
    pub err: Arc<dyn std::error::Error + Send + Sync>,
    pub status_code: StatusCode,
    pub id: String,
    pub trace: String,
}

impl HandlerError {
    pub fn new(status_code: StatusCode, err: impl Into<BoxError>) -> Self {
        Self {
            err: Arc::from(err.into()),
            status_code,
            id: short_id(),
            trace: String::new(),
        }
    }

    pub fn internal(err: impl Into<BoxError>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, err)
    }

    /// Record where the error was raised. The innermost handler wins.
    pub(crate) fn with_trace(mut self, id: &ModuleId) -> Self {
        if self.trace.is_empty() {
            self.trace = id.to_string();
        }
        self
    }
}

fn short_id() -> String {
    let mut id = uuid::Uuid::new_v4().simple().to_string();
    id.truncate(9);
    id
}
