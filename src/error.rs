//! Error types for Colloquy
//!
//! This module defines all error types used throughout the application,
//! using `thiserror` for ergonomic error handling.

use thiserror::Error;

use crate::providers::CompletionError;

/// Main error type for Colloquy operations
///
/// Covers startup (configuration, credentials, store lock), storage,
/// and per-turn completion failures.
#[derive(Error, Debug)]
pub enum ColloquyError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// The API key environment variable is unset or blank
    #[error("Missing API key: set the `{0}` environment variable")]
    MissingApiKey(String),

    /// Another process held the store lock for the whole wait budget
    #[error(
        "Timed out waiting for the history lock at {path} after {attempts} attempts ({waited_ms} ms); is another colloquy running?"
    )]
    LockTimeout {
        /// Lock file that could not be acquired
        path: String,
        /// Number of lock attempts made
        attempts: u32,
        /// Total time spent waiting, in milliseconds
        waited_ms: u64,
    },

    /// Lock acquisition failed for a reason other than contention
    #[error("Lock error: {0}")]
    Lock(String),

    /// Conversation storage errors (database operations)
    #[error("Storage error: {0}")]
    Storage(String),

    /// A stored record could not be decoded
    #[error("Stored conversation '{title}' is malformed: {reason}")]
    StoreDecode {
        /// Key of the malformed record
        title: String,
        /// Decoder message
        reason: String,
    },

    /// Conversation titles must not be blank
    #[error("Invalid conversation title: {0:?}")]
    InvalidTitle(String),

    /// Rename target already names another conversation
    #[error("A conversation titled '{0}' already exists")]
    DuplicateTitle(String),

    /// No conversation with the given title
    #[error("Conversation not found: {0}")]
    ConversationNotFound(String),

    /// Completion request failed; only the current turn is affected
    #[error("Completion failed: {0}")]
    Completion(#[from] CompletionError),

    /// The in-flight turn was cancelled before it committed
    #[error("Turn cancelled")]
    Cancelled,

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl ColloquyError {
    /// Whether the error only aborts the current turn and the session can
    /// keep accepting input.
    pub fn is_turn_recoverable(&self) -> bool {
        matches!(self, Self::Completion(_) | Self::Cancelled)
    }
}

/// Result type alias for Colloquy operations
///
/// This is a convenience alias that uses `anyhow::Error` as the error type,
/// allowing for rich error context and easy error propagation.
pub type Result<T> = anyhow::Result<T>;
