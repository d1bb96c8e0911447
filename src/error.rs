//! Error taxonomy for provisioning and lifecycle operations.
//!
//! Request-level failures live in [`crate::http::HandlerError`]; everything
//! here aborts the reload that produced it.

use crate::modules::ModuleId;

/// Boxed error supplied by module code.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result alias for provisioning operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors raised while building a module graph from a config document.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The fragment is not the keyed structure its field requires.
    #[error("malformed fragment at {path}: {reason}")]
    Parse { path: String, reason: String },

    #[error("unknown module: {0}")]
    UnknownModule(ModuleId),

    /// The fragment does not fit the module's configuration shape.
    #[error("decoding module {id} at {path}: {source}")]
    Decode {
        id: ModuleId,
        path: String,
        #[source]
        source: serde_json::Error,
    },

    /// The module resolved but does not implement the interface the field needs.
    #[error("module {id} at {path} is not a {expected}")]
    WrongKind {
        id: ModuleId,
        path: String,
        expected: &'static str,
    },

    #[error("provisioning module {id} at {path}: {source}")]
    Provision {
        id: ModuleId,
        path: String,
        #[source]
        source: Box<Error>,
    },

    #[error("module {id} re-entered its own provisioning at {path}")]
    ProvisionCycle { id: ModuleId, path: String },

    #[error("malformed route at {path}: {reason}")]
    Match { path: String, reason: String },

    /// Module-specific failure raised from inside `provision`.
    #[error(transparent)]
    Module(BoxError),

    #[error("starting app {app}: {source}")]
    AppStart {
        app: String,
        #[source]
        source: BoxError,
    },
}

impl Error {
    /// Wrap a module-specific failure.
    pub fn module(err: impl Into<BoxError>) -> Self {
        Error::Module(err.into())
    }

    /// Innermost error, following `Provision` wrappers.
    pub fn root_cause(&self) -> &Error {
        match self {
            Error::Provision { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

/// Registration failures. Fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("malformed module id {0:?}")]
    Malformed(String),

    #[error("module already registered: {0}")]
    Duplicate(ModuleId),
}

/// A failed cleanup callback or instance cleanup. Recorded, never propagated.
#[derive(Debug, thiserror::Error)]
#[error("cleanup for {} failed: {source}", owner.as_ref().map(|id| id.as_str()).unwrap_or("<root>"))]
pub struct CleanupError {
    pub owner: Option<ModuleId>,
    #[source]
    pub source: BoxError,
}
