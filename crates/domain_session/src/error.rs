//! Session persistence errors
//!
//! Corrupt or unreadable snapshots never surface here: the file store treats
//! them as absent. What remains are failures to write or remove the file and
//! conversions of incomplete sessions.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session file I/O failed at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode session snapshot: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Failed to replace session file {path}: {message}")]
    Persist { path: PathBuf, message: String },

    #[error("Session is not ready to become a bill: {0}")]
    Incomplete(String),
}

impl SessionError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SessionError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn incomplete(reason: impl Into<String>) -> Self {
        SessionError::Incomplete(reason.into())
    }
}
