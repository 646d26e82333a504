//! Error types for daybook.
//!
//! Every failure mode the HTTP layer and the client façade need to tell
//! apart is its own variant. Callers match on variants, never on message
//! text; the user-facing wording lives in [`Error::user_message`] as a
//! separate, explicit mapping.

use thiserror::Error;

/// Result type alias using daybook's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for daybook operations.
#[derive(Error, Debug)]
pub enum Error {
    /// The referenced entry or setting does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Malformed input (bad id, non-string setting value, bad payload).
    #[error("Invalid input: {0}")]
    Validation(String),

    /// Existence check passed but the write affected zero rows.
    #[error("Update conflict: {0}")]
    UpdateConflict(String),

    /// Write confirmed applied but the row could not be read back.
    #[error("Post-write read failed: {0}")]
    PostWriteRead(String),

    /// Network/connectivity failure talking to the remote store.
    #[error("Transport error: {0}")]
    Transport(String),

    /// A write succeeded but could not be confirmed within the
    /// verification budget.
    #[error("Consistency timeout: {0}")]
    ConsistencyTimeout(String),

    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether this error is a transport-level (connectivity) failure, as
    /// opposed to a domain error. Transport failures are the only errors
    /// that trigger the façade's fallback to the local store.
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Transport(_))
    }

    /// Whether this error signals that the referenced record is absent.
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound(_) => true,
            Error::Database(sqlx::Error::RowNotFound) => true,
            _ => false,
        }
    }

    /// User-facing message for this error kind.
    ///
    /// Kept separate from the `Display` impl so UI text can change without
    /// touching the diagnostic messages that logs and tests rely on.
    pub fn user_message(&self) -> &'static str {
        match self {
            Error::NotFound(_) => "The entry does not exist or has been deleted.",
            Error::Validation(_) => "The request was malformed. Check the input and try again.",
            Error::UpdateConflict(_) => "The update did not apply. Try saving again.",
            Error::PostWriteRead(_) => {
                "The update was applied but could not be confirmed. Refresh to see the latest state."
            }
            Error::Transport(_) => {
                "Network problem reaching the server. Working from the local copy."
            }
            Error::ConsistencyTimeout(_) => {
                "The change is still propagating. Refresh in a moment to see the latest state."
            }
            _ => "The operation failed. Please retry.",
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        // Body decode failures mean the server answered; only the rest
        // (connect, timeout, redirect) count as connectivity loss.
        if e.is_decode() {
            Error::Serialization(e.to_string())
        } else {
            Error::Transport(e.to_string())
        }
    }
}
