//! Error types for tack.
//!
//! Provides structured error handling with:
//! - Machine-readable error codes (`ErrorCode`)
//! - Category-based exit codes (2=db, 3=not_found, 4=validation, etc.)
//! - Retryability flags
//! - Context-aware recovery hints
//! - Structured JSON output for piped / non-TTY consumers

use std::path::PathBuf;
use thiserror::Error;

use crate::sync::RemoteError;

/// Result type alias for tack operations.
pub type Result<T> = std::result::Result<T, Error>;

// ── Error Code ────────────────────────────────────────────────

/// Machine-readable error codes grouped by category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Database (exit 2)
    NotInitialized,
    AlreadyInitialized,
    DatabaseError,

    // Not Found (exit 3)
    RecordNotFound,

    // Validation (exit 4)
    ValidationError,

    // Remote (exit 6)
    RemoteError,

    // Config (exit 7)
    ConfigError,

    // I/O (exit 8)
    IoError,
    JsonError,

    // Internal (exit 1)
    InternalError,
}

impl ErrorCode {
    /// Machine-readable SCREAMING_SNAKE code string.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        match self {
            Self::NotInitialized => "NOT_INITIALIZED",
            Self::AlreadyInitialized => "ALREADY_INITIALIZED",
            Self::DatabaseError => "DATABASE_ERROR",
            Self::RecordNotFound => "RECORD_NOT_FOUND",
            Self::ValidationError => "VALIDATION_ERROR",
            Self::RemoteError => "REMOTE_ERROR",
            Self::ConfigError => "CONFIG_ERROR",
            Self::IoError => "IO_ERROR",
            Self::JsonError => "JSON_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Category-based exit code.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::InternalError => 1,
            Self::NotInitialized | Self::AlreadyInitialized | Self::DatabaseError => 2,
            Self::RecordNotFound => 3,
            Self::ValidationError => 4,
            Self::RemoteError => 6,
            Self::ConfigError => 7,
            Self::IoError | Self::JsonError => 8,
        }
    }

    /// Whether the caller should retry (with corrected input, or later).
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ValidationError | Self::DatabaseError | Self::RemoteError
        )
    }
}

// ── Error Enum ────────────────────────────────────────────────

/// Errors that can occur in tack operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Not initialized: run `tack init` first")]
    NotInitialized,

    #[error("Already initialized at {path}")]
    AlreadyInitialized { path: PathBuf },

    #[error("Record not found: {id}")]
    RecordNotFound { id: String },

    /// Malformed input to a create/update call. No partial write happens.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Underlying durable-storage failure. Never retried by the store.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Map this error to its structured `ErrorCode`.
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::NotInitialized => ErrorCode::NotInitialized,
            Self::AlreadyInitialized { .. } => ErrorCode::AlreadyInitialized,
            Self::Database(_) => ErrorCode::DatabaseError,
            Self::RecordNotFound { .. } => ErrorCode::RecordNotFound,
            Self::Validation(_) => ErrorCode::ValidationError,
            Self::Remote(_) => ErrorCode::RemoteError,
            Self::Config(_) => ErrorCode::ConfigError,
            Self::Io(_) => ErrorCode::IoError,
            Self::Json(_) => ErrorCode::JsonError,
            Self::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Category-based exit code, delegating to the `ErrorCode`.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        self.error_code().exit_code()
    }

    /// Context-aware recovery hint.
    ///
    /// Returns `None` if no actionable suggestion exists.
    #[must_use]
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::NotInitialized => Some("Run `tack init` to create the local database".to_string()),

            Self::AlreadyInitialized { path } => Some(format!(
                "Database already exists at {}. Use `--force` to reinitialize.",
                path.display()
            )),

            Self::RecordNotFound { id } => Some(format!(
                "No record with ID '{id}'. Use `tack list` to see your records."
            )),

            Self::Validation(msg) => {
                if msg.contains("kind") {
                    Some("Valid kinds: note, reminder, task".to_string())
                } else if msg.contains("status") {
                    Some("Valid statuses: open, done, archived".to_string())
                } else if msg.contains("dismiss") {
                    Some("Valid dismiss methods: tag_scan, code, either".to_string())
                } else {
                    None
                }
            }

            Self::Remote(RemoteError::Unauthorized(_)) => Some(
                "Check the sync token: `tack config set token <TOKEN>` or TACK_TOKEN".to_string(),
            ),

            Self::Remote(RemoteError::Transport(_)) => Some(
                "The remote store is unreachable. Local changes stay pending and sync later."
                    .to_string(),
            ),

            Self::Config(msg) if msg.contains("endpoint") => Some(
                "Set the remote endpoint: `tack config set endpoint <URL>` or TACK_ENDPOINT"
                    .to_string(),
            ),

            Self::Config(msg) if msg.contains("owner") => {
                Some("Pass `--owner <ID>` or set TACK_OWNER".to_string())
            }

            Self::Database(_)
            | Self::Remote(_)
            | Self::Io(_)
            | Self::Json(_)
            | Self::Config(_)
            | Self::Other(_) => None,
        }
    }

    /// Structured JSON representation for machine consumption.
    #[must_use]
    pub fn to_structured_json(&self) -> serde_json::Value {
        let code = self.error_code();
        let mut obj = serde_json::json!({
            "error": {
                "code": code.as_str(),
                "message": self.to_string(),
                "retryable": code.is_retryable(),
                "exit_code": code.exit_code(),
            }
        });

        if let Some(hint) = self.hint() {
            obj["error"]["hint"] = serde_json::Value::String(hint);
        }

        obj
    }
}
