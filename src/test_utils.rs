//! Test utilities for Colloquy
//!
//! Temporary stores and a scripted completion client for unit tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use crate::providers::{CompletionClient, CompletionError, FragmentStream, Message};
use crate::storage::{self, ConversationStore};

/// Create a temporary directory for testing
pub fn temp_dir() -> TempDir {
    TempDir::new().expect("Failed to create temporary directory")
}

/// Open an empty store in a fresh temporary directory
///
/// Keep the returned `TempDir` alive for as long as the store is used.
pub fn temp_store() -> (TempDir, ConversationStore) {
    let dir = temp_dir();
    let store =
        ConversationStore::open(storage::db_path(dir.path())).expect("Failed to open test store");
    (dir, store)
}

/// Requests seen by a [`ScriptedClient`], in call order
pub type RequestLog = Arc<Mutex<Vec<Vec<Message>>>>;

enum ScriptedStream {
    Fragments(Vec<String>),
    FailAfter(Vec<String>, CompletionError),
}

/// Completion client that replays queued answers
///
/// `stream` calls consume the reply queue, `complete` calls consume the
/// title queue. An exhausted queue answers with an error.
#[derive(Default)]
pub struct ScriptedClient {
    replies: Mutex<VecDeque<ScriptedStream>>,
    titles: Mutex<VecDeque<Result<String, CompletionError>>>,
    stream_delay: Option<Duration>,
    requests: RequestLog,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reply(self, fragments: &[&str]) -> Self {
        self.push_reply(ScriptedStream::Fragments(to_strings(fragments)))
    }

    /// Queue a reply that yields `fragments` and then fails
    pub fn with_failing_reply(self, fragments: &[&str], error: CompletionError) -> Self {
        self.push_reply(ScriptedStream::FailAfter(to_strings(fragments), error))
    }

    pub fn with_title(self, title: &str) -> Self {
        self.titles
            .lock()
            .unwrap()
            .push_back(Ok(title.to_string()));
        self
    }

    pub fn with_title_error(self, error: CompletionError) -> Self {
        self.titles.lock().unwrap().push_back(Err(error));
        self
    }

    /// Delay every `stream` call before it answers
    pub fn with_stream_delay(mut self, delay: Duration) -> Self {
        self.stream_delay = Some(delay);
        self
    }

    pub fn requests(&self) -> RequestLog {
        Arc::clone(&self.requests)
    }

    fn push_reply(self, reply: ScriptedStream) -> Self {
        self.replies.lock().unwrap().push_back(reply);
        self
    }
}

fn to_strings(fragments: &[&str]) -> Vec<String> {
    fragments.iter().map(|f| f.to_string()).collect()
}

#[async_trait]
impl CompletionClient for ScriptedClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, CompletionError> {
        self.requests.lock().unwrap().push(messages.to_vec());
        self.titles
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(CompletionError::Empty))
    }

    async fn stream(&self, messages: &[Message]) -> Result<FragmentStream, CompletionError> {
        self.requests.lock().unwrap().push(messages.to_vec());
        if let Some(delay) = self.stream_delay {
            tokio::time::sleep(delay).await;
        }

        let next = self.replies.lock().unwrap().pop_front();
        let items: Vec<Result<String, CompletionError>> = match next {
            Some(ScriptedStream::Fragments(fragments)) => fragments.into_iter().map(Ok).collect(),
            Some(ScriptedStream::FailAfter(fragments, error)) => fragments
                .into_iter()
                .map(Ok)
                .chain(std::iter::once(Err(error)))
                .collect(),
            None => {
                return Err(CompletionError::Transport(
                    "no scripted reply left".to_string(),
                ))
            }
        };
        Ok(Box::pin(futures::stream::iter(items)))
    }
}
