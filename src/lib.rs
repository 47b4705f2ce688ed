//! Colloquy - terminal chat library with durable history
//!
//! This library provides the core functionality for Colloquy: a streaming
//! completion client, a locked on-disk conversation store, and the session
//! that ties each chat turn to the history.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `providers`: Completion client abstraction and the OpenAI-compatible client
//! - `storage`: Conversation store (`sled`) and the cross-process store lock
//! - `session`: Turn state machine, in-memory cache, and transcript rendering
//! - `commands`: Chat REPL and history command handlers
//! - `config`: Configuration management and validation
//! - `error`: Error types and result aliases
//! - `cli`: Command-line interface definition
//!
//! # Example
//!
//! ```no_run
//! use colloquy::providers::create_client;
//! use colloquy::session::{NullSink, Session};
//! use colloquy::Config;
//!
//! # async fn example() -> colloquy::Result<()> {
//! let config = Config::default();
//! let client = create_client(&config.provider, &config.api_key()?)?;
//! let mut session = Session::open(&config, client)?;
//! session.submit_turn("What is a lifetime?", &mut NullSink).await?;
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod providers;
pub mod session;
pub mod storage;

pub use config::Config;
pub use error::{ColloquyError, Result};
pub use session::{Session, TurnOutcome};
pub use storage::{ConversationRecord, ConversationStore, StoreLock};

#[cfg(test)]
pub mod test_utils;
