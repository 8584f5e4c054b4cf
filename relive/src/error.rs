//! Application-wide error types.

use thiserror::Error;
use uuid::Uuid;

use crate::process::ProcessRole;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Application-wide error type.
///
/// Precondition and startup failures are returned synchronously to callers;
/// everything a background monitor discovers is recorded on the stream
/// record instead of being raised here.
#[derive(Error, Debug)]
pub enum Error {
    #[error("{role} process already running for stream {stream_id}")]
    AlreadyRunning { stream_id: Uuid, role: ProcessRole },

    #[error("Could not resolve a playable media URL: {0}")]
    ResolutionFailed(String),

    #[error("Transcoder exited during startup: {stderr}")]
    StartupFailed { stderr: String },

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Invalid state transition: cannot transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn already_running(stream_id: Uuid, role: ProcessRole) -> Self {
        Self::AlreadyRunning { stream_id, role }
    }

    pub fn not_found(entity: impl Into<String>, id: impl ToString) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }
}
