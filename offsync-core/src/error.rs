//! Error types for the sync engine.
//!
//! Errors fall into three groups:
//! - durability errors (local storage), which propagate to the caller
//! - precondition errors, rejected before any state is touched
//! - remote call errors ([`RemoteError`]), which never leave a sync pass

use std::path::PathBuf;

use crate::action::ActionKind;

/// Errors returned by engine operations.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Reading or writing the local database failed.
    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),

    /// Applying the database schema failed.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Filesystem error while preparing local storage.
    #[error("I/O error for {}: {}", .0.display(), .1)]
    Io(PathBuf, #[source] std::io::Error),

    /// A persisted payload or collection could not be (de)serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A persisted value did not have the expected shape.
    #[error("Corrupt record in {table}: {reason}")]
    CorruptRecord { table: &'static str, reason: String },

    /// The operation needs connectivity and the engine is offline.
    #[error("Cannot sync while offline")]
    Offline,

    /// UPDATE and DELETE mutations must name the entity they target.
    #[error("{kind} for '{entity_type}' requires an entity id")]
    MissingEntityId {
        kind: ActionKind,
        entity_type: String,
    },

    /// Every mutation must name its target collection.
    #[error("Entity type must not be empty")]
    EmptyEntityType,
}

/// Failures of a single remote call.
///
/// These are recoverable: the executor turns them into per-action retries and
/// entries in the sync state's error list.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RemoteError {
    /// The request never produced a response (DNS, refused connection, reset).
    #[error("{0}")]
    Transport(String),

    /// The call did not complete within the per-call timeout.
    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The server answered with a non-2xx status. The body is the message.
    #[error("{body}")]
    Status { status: u16, body: String },

    /// The response body could not be decoded.
    #[error("invalid response: {0}")]
    Decode(String),

    /// The action could not be turned into a request.
    #[error("not sent: {0}")]
    Rejected(String),
}

impl RemoteError {
    /// Builds a status error, falling back to the status line when the body is empty.
    pub fn status(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        let body = if body.trim().is_empty() {
            format!("server returned status {}", status)
        } else {
            body.trim().to_string()
        };
        RemoteError::Status { status, body }
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            RemoteError::Decode(e.to_string())
        } else {
            RemoteError::Transport(e.to_string())
        }
    }
}

pub type SyncResult<T> = Result<T, SyncError>;
