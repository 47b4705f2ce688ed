//! Completion service clients for Colloquy
//!
//! This module contains the completion client abstraction and the
//! OpenAI-compatible implementation.

pub mod base;
pub mod openai;

pub use base::{
    strip_system_prefix, CompletionClient, CompletionError, FragmentStream, Message, Role,
};
pub use openai::OpenAiClient;

use std::sync::Arc;

use crate::config::ProviderConfig;
use crate::error::Result;

/// Create the completion client used by chat sessions
///
/// # Arguments
///
/// * `config` - Provider configuration
/// * `api_key` - Bearer token for the service
///
/// # Errors
///
/// Returns error if the HTTP client cannot be initialized
pub fn create_client(config: &ProviderConfig, api_key: &str) -> Result<Arc<dyn CompletionClient>> {
    Ok(Arc::new(OpenAiClient::new(config, api_key)?))
}
