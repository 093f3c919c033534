//! Stable error kinds surfaced by the core (spec.md §7).
//!
//! Every write path returns a `CoreError`. The `kind()` accessor gives
//! callers a stable, match-able code; `Display` composes a human-readable
//! message from the invariant that was violated and the observed value.
//! No storage backtrace or internal detail ever crosses this boundary.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    InvalidInput,
    InvalidState,
    Conflict,
    Internal,
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("{entity} with {field}={value} already exists")]
    AlreadyExists {
        entity: &'static str,
        field: &'static str,
        value: String,
    },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::NotFound { .. } => ErrorKind::NotFound,
            CoreError::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            CoreError::InvalidInput(_) => ErrorKind::InvalidInput,
            CoreError::InvalidState(_) => ErrorKind::InvalidState,
            CoreError::Conflict(_) => ErrorKind::Conflict,
            CoreError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        CoreError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn already_exists(entity: &'static str, field: &'static str, value: impl ToString) -> Self {
        CoreError::AlreadyExists {
            entity,
            field,
            value: value.to_string(),
        }
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        CoreError::InvalidInput(msg.into())
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        CoreError::InvalidState(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        CoreError::Conflict(msg.into())
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(value: rusqlite::Error) -> Self {
        CoreError::Internal(value.to_string())
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(value: serde_json::Error) -> Self {
        CoreError::Internal(value.to_string())
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

/// Errors local to the GPIO socket layer. Never returned from an engine
/// operation (spec.md §7) — the link swallows these into a reconnect.
#[derive(Debug, Error)]
pub enum GpioLinkError {
    #[error("connect to {0} failed: {1}")]
    Connect(String, String),

    #[error("frame decode failed: {0}")]
    Decode(String),

    #[error("heartbeat timeout: no message in {0:?}")]
    HeartbeatTimeout(std::time::Duration),

    #[error("connection closed")]
    Closed,
}
