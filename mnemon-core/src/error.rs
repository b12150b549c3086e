//! Error types for mnemon-core

use thiserror::Error;

/// Main error type for the mnemon-core library
#[derive(Error, Debug)]
pub enum Error {
    /// SQLite error while reading a platform's database store
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error for a platform source artifact
    #[error("parse error in {platform} artifact {artifact}: {reason}")]
    Parse {
        platform: String,
        artifact: String,
        reason: String,
    },

    /// JSON encoding/decoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Store persistence failure; the current commit is abandoned and the
    /// source cursor must not advance past the artifact
    #[error("store error at {path}: {reason}")]
    Store { path: String, reason: String },

    /// A platform name that no registered parser handles
    #[error("unknown platform: {0}")]
    UnknownPlatform(String),

    /// An artifact's pipeline exceeded its processing deadline
    #[error("artifact {artifact} timed out after {timeout_ms}ms")]
    Timeout { artifact: String, timeout_ms: u64 },
}

/// Result type alias for mnemon-core
pub type Result<T> = std::result::Result<T, Error>;
