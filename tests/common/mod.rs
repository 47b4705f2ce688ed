use std::collections::VecDeque;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tempfile::TempDir;

use colloquy::config::SessionConfig;
use colloquy::providers::{CompletionClient, CompletionError, FragmentStream, Message};
use colloquy::session::Session;
use colloquy::storage::{self, ConversationStore};

#[allow(dead_code)]
pub fn temp_config_file(contents: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("failed to create tempdir");
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, contents).expect("failed to write config file");
    (temp_dir, config_path)
}

#[allow(dead_code)]
pub fn create_temp_store() -> (ConversationStore, TempDir) {
    let tmp = TempDir::new().expect("failed to create tempdir");
    let store = ConversationStore::open(storage::db_path(tmp.path()))
        .expect("failed to open conversation store");
    (store, tmp)
}

/// Session over a store in `dir`, without the cross-process lock
#[allow(dead_code)]
pub fn open_session(dir: &TempDir, client: MockClient) -> Session {
    let store = ConversationStore::open(storage::db_path(dir.path()))
        .expect("failed to open conversation store");
    Session::with_store(store, None, Arc::new(client), SessionConfig::default())
        .expect("failed to build session")
}

/// One scripted streaming reply
#[allow(dead_code)]
pub enum Reply {
    Fragments(Vec<&'static str>),
    /// Fragments separated by a delay
    Slow(Vec<&'static str>, Duration),
    /// Fragments followed by a mid-stream failure
    Broken(Vec<&'static str>, CompletionError),
}

/// Completion client answering from queues
#[allow(dead_code)]
#[derive(Default)]
pub struct MockClient {
    replies: Mutex<VecDeque<Reply>>,
    titles: Mutex<VecDeque<Result<String, CompletionError>>>,
}

#[allow(dead_code)]
impl MockClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, reply: Reply) -> Self {
        self.replies.lock().unwrap().push_back(reply);
        self
    }

    pub fn title(self, title: Result<&str, CompletionError>) -> Self {
        self.titles
            .lock()
            .unwrap()
            .push_back(title.map(str::to_string));
        self
    }
}

#[async_trait]
impl CompletionClient for MockClient {
    async fn complete(&self, _messages: &[Message]) -> Result<String, CompletionError> {
        self.titles
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(CompletionError::Empty))
    }

    async fn stream(&self, _messages: &[Message]) -> Result<FragmentStream, CompletionError> {
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| CompletionError::Transport("no reply scripted".to_string()))?;

        let stream: FragmentStream = match reply {
            Reply::Fragments(parts) => Box::pin(futures::stream::iter(
                parts
                    .into_iter()
                    .map(|p| Ok::<String, CompletionError>(p.to_string())),
            )),
            Reply::Slow(parts, delay) => Box::pin(
                futures::stream::iter(parts)
                    .then(move |p| async move {
                        tokio::time::sleep(delay).await;
                        Ok::<String, CompletionError>(p.to_string())
                    }),
            ),
            Reply::Broken(parts, error) => Box::pin(futures::stream::iter(
                parts
                    .into_iter()
                    .map(|p| Ok::<String, CompletionError>(p.to_string()))
                    .chain(std::iter::once(Err(error))),
            )),
        };
        Ok(stream)
    }
}
