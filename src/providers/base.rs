//! Base completion client trait and common types for Colloquy
//!
//! This module defines the [`CompletionClient`] trait implemented by the
//! remote completion service client, along with the message types shared
//! by the session engine and the store.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Role of a message sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Instruction message, only ever first and never persisted
    System,
    /// Message typed by the user
    User,
    /// Reply produced by the completion service
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

/// Message structure for conversation
///
/// Represents one entry of a conversation transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Role of the message sender
    pub role: Role,
    /// Content of the message
    pub content: String,
}

impl Message {
    /// Creates a new user message
    ///
    /// # Examples
    ///
    /// ```
    /// use colloquy::providers::{Message, Role};
    ///
    /// let msg = Message::user("Hello, assistant!");
    /// assert_eq!(msg.role, Role::User);
    /// ```
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Creates a new assistant message
    ///
    /// # Examples
    ///
    /// ```
    /// use colloquy::providers::{Message, Role};
    ///
    /// let msg = Message::assistant("Hello, user!");
    /// assert_eq!(msg.role, Role::Assistant);
    /// ```
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    /// Creates a new system message
    ///
    /// # Examples
    ///
    /// ```
    /// use colloquy::providers::{Message, Role};
    ///
    /// let msg = Message::system("You are a helpful assistant");
    /// assert_eq!(msg.role, Role::System);
    /// ```
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

/// Returns `messages` without a leading system message.
pub fn strip_system_prefix(messages: &[Message]) -> &[Message] {
    match messages.first() {
        Some(first) if first.role == Role::System => &messages[1..],
        _ => messages,
    }
}

/// Failure of a completion request
///
/// Every variant is recoverable: it aborts the current turn only.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompletionError {
    /// Connection refused, timeout, or a network error mid-stream
    #[error("request failed: {0}")]
    Transport(String),

    /// The service answered with a non-2xx status
    #[error("service returned HTTP {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body, possibly empty
        body: String,
    },

    /// A non-streaming response body could not be understood
    #[error("could not decode response: {0}")]
    Decode(String),

    /// The response carried no choices
    #[error("response contained no choices")]
    Empty,
}

/// Ordered stream of content fragments
///
/// Items arrive in emission order; the stream ends at end of input. An
/// `Err` item reports a transport failure and no further items follow.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, CompletionError>> + Send>>;

/// Client for the remote completion service
///
/// # Examples
///
/// ```no_run
/// use async_trait::async_trait;
/// use colloquy::providers::{CompletionClient, CompletionError, FragmentStream, Message};
///
/// struct Echo;
///
/// #[async_trait]
/// impl CompletionClient for Echo {
///     async fn complete(&self, messages: &[Message]) -> Result<String, CompletionError> {
///         Ok(messages.last().map(|m| m.content.clone()).unwrap_or_default())
///     }
///
///     async fn stream(&self, messages: &[Message]) -> Result<FragmentStream, CompletionError> {
///         let text = self.complete(messages).await?;
///         Ok(Box::pin(futures::stream::iter(vec![Ok(text)])))
///     }
/// }
/// ```
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Requests a single, complete reply (`stream: false`)
    ///
    /// Returns the content of the first choice.
    async fn complete(&self, messages: &[Message]) -> Result<String, CompletionError>;

    /// Requests a streamed reply (`stream: true`)
    ///
    /// Resolves once the response headers arrived; fragments then follow
    /// on the returned stream.
    async fn stream(&self, messages: &[Message]) -> Result<FragmentStream, CompletionError>;
}
