//! Chat session state
//!
//! A [`Session`] owns the store lock, the durable store, the in-memory
//! cache, and the completion client. It drives one turn at a time:
//! stream the reply, join the title request for new conversations, then
//! commit the record to the store and the cache.

use std::sync::Arc;

use chrono::Local;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tokio_util::task::AbortOnDropHandle;

use crate::config::{Config, SessionConfig};
use crate::error::{ColloquyError, Result};
use crate::providers::{CompletionClient, CompletionError, Message};
use crate::storage::{self, ConversationRecord, ConversationStore, StoreLock};

pub mod cache;
pub mod transcript;
pub mod turn;

pub use cache::ConversationCache;
pub use transcript::render_transcript;
pub use turn::{
    fallback_title, normalize_title, unique_title, FragmentSink, NullSink, TurnOutcome, TurnPhase,
};

type TitleTask = AbortOnDropHandle<std::result::Result<String, CompletionError>>;

/// Conversation a turn is appended to
enum TurnTarget {
    Continue(String),
    /// New conversation; the title request is already running
    Start(TitleTask),
}

/// One interactive chat session
pub struct Session {
    store: ConversationStore,
    cache: ConversationCache,
    client: Arc<dyn CompletionClient>,
    config: SessionConfig,
    current: Option<String>,
    phase: TurnPhase,
    // Dropped last so the store is closed while still locked.
    _lock: Option<StoreLock>,
}

impl Session {
    /// Lock and open the configured store, then load the cache
    ///
    /// # Errors
    ///
    /// Returns `ColloquyError::LockTimeout` if another process holds the
    /// store, or a storage error if it cannot be read
    pub fn open(config: &Config, client: Arc<dyn CompletionClient>) -> Result<Self> {
        let (lock, store) = storage::open_locked(config)?;
        Self::with_store(store, Some(lock), client, config.session.clone())
    }

    /// Build a session over an already opened store
    pub fn with_store(
        store: ConversationStore,
        lock: Option<StoreLock>,
        client: Arc<dyn CompletionClient>,
        config: SessionConfig,
    ) -> Result<Self> {
        let records = store.load()?;
        tracing::info!(conversations = records.len(), "Loaded conversation history");

        Ok(Self {
            store,
            cache: ConversationCache::from_records(records),
            client,
            config,
            current: None,
            phase: TurnPhase::Idle,
            _lock: lock,
        })
    }

    /// Titles, newest first
    pub fn titles(&self) -> &[String] {
        self.cache.titles()
    }

    pub fn current_title(&self) -> Option<&str> {
        self.current.as_deref()
    }

    /// Transcript of the selected conversation, empty for a new one
    pub fn current_messages(&self) -> &[Message] {
        self.current
            .as_deref()
            .and_then(|title| self.cache.get(title))
            .map(|record| record.messages.as_slice())
            .unwrap_or(&[])
    }

    pub fn phase(&self) -> TurnPhase {
        self.phase
    }

    pub fn is_accepting(&self) -> bool {
        self.phase.is_accepting()
    }

    pub fn record(&self, title: &str) -> Option<&ConversationRecord> {
        self.cache.get(title)
    }

    /// Start a fresh conversation on the next submission
    pub fn new_conversation(&mut self) {
        self.current = None;
    }

    /// Make `title` the current conversation and return its transcript
    ///
    /// Returns `None` and keeps the selection if the title is unknown.
    pub fn select_conversation(&mut self, title: &str) -> Option<Vec<Message>> {
        let messages = self.cache.get(title)?.messages.clone();
        self.current = Some(title.to_string());
        Some(messages)
    }

    /// Rename a conversation in the store and the cache
    ///
    /// # Errors
    ///
    /// Returns `ColloquyError::DuplicateTitle` if `new` is taken,
    /// `ColloquyError::ConversationNotFound` if `old` is unknown, or
    /// `ColloquyError::InvalidTitle` if `new` is blank
    pub fn rename_conversation(&mut self, old: &str, new: &str) -> Result<()> {
        let new = new.trim();
        self.store.rename(old, new)?;

        self.cache.rename(old, new);
        if self.current.as_deref() == Some(old) {
            self.current = Some(new.to_string());
        }
        tracing::info!(old, new, "Renamed conversation");
        Ok(())
    }

    /// Delete a conversation; returns whether it existed
    pub fn delete_conversation(&mut self, title: &str) -> Result<bool> {
        let existed = self.store.delete(title)?;
        self.cache.remove(title);
        if self.current.as_deref() == Some(title) {
            self.current = None;
        }
        tracing::info!(title, existed, "Deleted conversation");
        Ok(existed)
    }

    /// Run one turn to completion
    ///
    /// Blank input is ignored. Fragments are handed to `sink` as they
    /// arrive.
    ///
    /// # Errors
    ///
    /// Returns `ColloquyError::Completion` if the reply could not be
    /// streamed; nothing is persisted in that case.
    pub async fn submit_turn(
        &mut self,
        content: &str,
        sink: &mut dyn FragmentSink,
    ) -> Result<TurnOutcome> {
        self.submit_turn_cancellable(content, sink, CancellationToken::new())
            .await
    }

    /// Run one turn, giving up when `cancel` fires
    ///
    /// # Errors
    ///
    /// Same as [`Session::submit_turn`], plus `ColloquyError::Cancelled`
    /// when the token fires before the turn commits.
    pub async fn submit_turn_cancellable(
        &mut self,
        content: &str,
        sink: &mut dyn FragmentSink,
        cancel: CancellationToken,
    ) -> Result<TurnOutcome> {
        if content.trim().is_empty() {
            return Ok(TurnOutcome::Ignored);
        }
        if !self.is_accepting() {
            tracing::debug!(phase = ?self.phase, "Previous turn was dropped mid-flight");
            self.phase = TurnPhase::Aborted;
        }

        let (target, mut outgoing) = match self.current.clone() {
            Some(title) => {
                let history = self
                    .cache
                    .get(&title)
                    .map(|record| record.messages.clone())
                    .unwrap_or_default();
                (TurnTarget::Continue(title), history)
            }
            None => (
                TurnTarget::Start(self.spawn_title_request(content)),
                vec![Message::system(self.config.system_prompt.clone())],
            ),
        };
        outgoing.push(Message::user(content));
        let created = matches!(target, TurnTarget::Start(_));

        self.phase = TurnPhase::Streaming {
            awaiting_title: created,
        };
        tracing::debug!(
            messages = outgoing.len(),
            new_conversation = created,
            "Streaming reply"
        );

        let client = Arc::clone(&self.client);
        let streamed = tokio::select! {
            _ = cancel.cancelled() => Err(ColloquyError::Cancelled),
            result = stream_reply(client.as_ref(), &outgoing, sink) => {
                result.map_err(ColloquyError::from)
            }
        };
        let reply = match streamed {
            Ok(reply) => reply,
            Err(e) => {
                // Dropping the target aborts a pending title request.
                self.phase = TurnPhase::Aborted;
                if let ColloquyError::Completion(cause) = &e {
                    tracing::error!("Reply stream failed: {}", cause);
                }
                return Err(e.into());
            }
        };

        self.phase = TurnPhase::Merging;
        let title = match target {
            TurnTarget::Continue(title) => title,
            TurnTarget::Start(task) => {
                let suggested = tokio::select! {
                    _ = cancel.cancelled() => {
                        self.phase = TurnPhase::Aborted;
                        return Err(ColloquyError::Cancelled.into());
                    }
                    joined = task => joined,
                };
                self.resolve_new_title(suggested)?
            }
        };

        outgoing.push(Message::assistant(reply.clone()));
        let record = ConversationRecord::new(title.clone(), &outgoing);
        if let Err(e) = self.store.set(&record) {
            self.phase = TurnPhase::Aborted;
            return Err(e);
        }
        self.cache.upsert(record);
        self.current = Some(title.clone());
        self.phase = TurnPhase::Committed;

        tracing::info!(title = %title, created, "Committed turn");
        Ok(TurnOutcome::Committed {
            title,
            reply,
            created,
        })
    }

    fn spawn_title_request(&self, content: &str) -> TitleTask {
        let client = Arc::clone(&self.client);
        let prompt = format!("{}{}", self.config.title_prompt_prefix, content);
        AbortOnDropHandle::new(tokio::spawn(async move {
            client.complete(&[Message::user(prompt)]).await
        }))
    }

    fn resolve_new_title(
        &self,
        suggested: std::result::Result<
            std::result::Result<String, CompletionError>,
            tokio::task::JoinError,
        >,
    ) -> Result<String> {
        let base = match suggested {
            Ok(Ok(raw)) => {
                let title = normalize_title(&raw);
                if title.is_empty() {
                    tracing::warn!("Title suggestion was empty; using fallback");
                    fallback_title(Local::now())
                } else {
                    title
                }
            }
            Ok(Err(e)) => {
                tracing::warn!("Title request failed: {}; using fallback", e);
                fallback_title(Local::now())
            }
            Err(e) => {
                tracing::warn!("Title task did not finish: {}; using fallback", e);
                fallback_title(Local::now())
            }
        };

        let mut lookup_error = None;
        let title = unique_title(&base, |candidate| {
            if self.cache.contains(candidate) {
                return true;
            }
            match self.store.contains(candidate) {
                Ok(found) => found,
                Err(e) => {
                    lookup_error = Some(e);
                    false
                }
            }
        });
        match lookup_error {
            Some(e) => Err(e),
            None => Ok(title),
        }
    }
}

async fn stream_reply(
    client: &dyn CompletionClient,
    messages: &[Message],
    sink: &mut dyn FragmentSink,
) -> std::result::Result<String, CompletionError> {
    let mut fragments = client.stream(messages).await?;
    let mut reply = String::new();
    while let Some(fragment) = fragments.next().await {
        let fragment = fragment?;
        sink.on_fragment(&fragment);
        reply.push_str(&fragment);
    }
    Ok(reply)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{temp_store, ScriptedClient};
    use std::time::Duration;

    fn session_with(client: ScriptedClient) -> (tempfile::TempDir, Session) {
        let (dir, store) = temp_store();
        let session =
            Session::with_store(store, None, Arc::new(client), SessionConfig::default()).unwrap();
        (dir, session)
    }

    #[tokio::test]
    async fn test_blank_input_is_ignored() {
        let (_dir, mut session) = session_with(ScriptedClient::new());
        let outcome = session.submit_turn("   \n", &mut NullSink).await.unwrap();
        assert_eq!(outcome, TurnOutcome::Ignored);
        assert_eq!(session.phase(), TurnPhase::Idle);
        assert!(session.titles().is_empty());
    }

    #[tokio::test]
    async fn test_new_conversation_commits_under_suggested_title() {
        let client = ScriptedClient::new()
            .with_reply(&["Hel", "lo, ", "world"])
            .with_title("\"Greetings\"");
        let requests = client.requests();
        let (_dir, mut session) = session_with(client);

        let mut seen = Vec::new();
        let mut sink = |f: &str| seen.push(f.to_string());
        let outcome = session.submit_turn("hi there", &mut sink).await.unwrap();

        assert_eq!(
            outcome,
            TurnOutcome::Committed {
                title: "Greetings".to_string(),
                reply: "Hello, world".to_string(),
                created: true,
            }
        );
        assert_eq!(seen, vec!["Hel", "lo, ", "world"]);
        assert_eq!(session.current_title(), Some("Greetings"));
        assert_eq!(
            session.current_messages(),
            &[Message::user("hi there"), Message::assistant("Hello, world")]
        );
        assert_eq!(session.phase(), TurnPhase::Committed);

        let requests = requests.lock().unwrap();
        let title_request = requests
            .iter()
            .find(|r| r.len() == 1 && r[0].content.starts_with("suggest me"))
            .unwrap();
        assert_eq!(
            title_request[0].content,
            "suggest me a short title for hi there"
        );
        let stream_request = requests.iter().find(|r| r.len() == 2).unwrap();
        assert_eq!(stream_request[0], Message::system("You are a helpful assistant."));
    }

    #[tokio::test]
    async fn test_continuing_conversation_skips_title_request() {
        let client = ScriptedClient::new()
            .with_reply(&["first"])
            .with_reply(&["second"])
            .with_title("Topic");
        let requests = client.requests();
        let (_dir, mut session) = session_with(client);

        session.submit_turn("one", &mut NullSink).await.unwrap();
        let outcome = session.submit_turn("two", &mut NullSink).await.unwrap();

        assert!(matches!(
            outcome,
            TurnOutcome::Committed { ref title, created: false, .. } if title == "Topic"
        ));
        assert_eq!(session.titles(), &["Topic".to_string()]);
        assert_eq!(session.current_messages().len(), 4);

        let requests = requests.lock().unwrap();
        let last = requests.last().unwrap();
        assert_eq!(last.len(), 3);
        assert_eq!(last[0], Message::user("one"));
        assert_eq!(requests.iter().filter(|r| r.len() == 1).count(), 1);
    }

    #[tokio::test]
    async fn test_failed_title_uses_fallback() {
        let client = ScriptedClient::new()
            .with_reply(&["answer"])
            .with_title_error(CompletionError::Status {
                status: 500,
                body: String::new(),
            });
        let (_dir, mut session) = session_with(client);

        let outcome = session.submit_turn("question", &mut NullSink).await.unwrap();
        let TurnOutcome::Committed { title, .. } = outcome else {
            panic!("expected commit");
        };
        assert!(title.starts_with("Chat "));
        assert_eq!(session.record(&title).unwrap().messages.len(), 2);
    }

    #[tokio::test]
    async fn test_colliding_title_gets_suffix() {
        let client = ScriptedClient::new()
            .with_reply(&["a"])
            .with_reply(&["b"])
            .with_title("Same")
            .with_title("Same");
        let (_dir, mut session) = session_with(client);

        session.submit_turn("first", &mut NullSink).await.unwrap();
        session.new_conversation();
        session.submit_turn("second", &mut NullSink).await.unwrap();

        assert_eq!(
            session.titles(),
            &["Same (2)".to_string(), "Same".to_string()]
        );
        assert_eq!(session.record("Same").unwrap().messages[0].content, "first");
    }

    #[tokio::test]
    async fn test_stream_error_aborts_without_persisting() {
        let client = ScriptedClient::new()
            .with_failing_reply(&["partial"], CompletionError::Transport("reset".into()))
            .with_reply(&["ok"])
            .with_title("T")
            .with_title("T2");
        let (_dir, mut session) = session_with(client);

        let err = session.submit_turn("q", &mut NullSink).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ColloquyError>(),
            Some(ColloquyError::Completion(CompletionError::Transport(_)))
        ));
        assert_eq!(session.phase(), TurnPhase::Aborted);
        assert!(session.is_accepting());
        assert!(session.titles().is_empty());
        assert_eq!(session.current_title(), None);

        let outcome = session.submit_turn("q", &mut NullSink).await.unwrap();
        assert!(matches!(outcome, TurnOutcome::Committed { .. }));
        assert_eq!(session.titles().len(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_turn_persists_nothing() {
        let client = ScriptedClient::new()
            .with_reply(&["never"])
            .with_title("T")
            .with_stream_delay(Duration::from_secs(5));
        let (_dir, mut session) = session_with(client);

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let err = session
            .submit_turn_cancellable("q", &mut NullSink, cancel)
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ColloquyError>(),
            Some(ColloquyError::Cancelled)
        ));
        assert_eq!(session.phase(), TurnPhase::Aborted);
        assert!(session.titles().is_empty());
    }

    #[tokio::test]
    async fn test_select_rename_delete() {
        let client = ScriptedClient::new()
            .with_reply(&["a"])
            .with_title("Original");
        let (_dir, mut session) = session_with(client);
        session.submit_turn("q", &mut NullSink).await.unwrap();

        session.new_conversation();
        assert_eq!(session.current_title(), None);
        assert!(session.select_conversation("missing").is_none());
        assert_eq!(session.select_conversation("Original").unwrap().len(), 2);
        assert_eq!(session.current_title(), Some("Original"));

        session.rename_conversation("Original", "  Renamed ").unwrap();
        assert_eq!(session.current_title(), Some("Renamed"));
        assert!(session.record("Original").is_none());

        assert!(session.delete_conversation("Renamed").unwrap());
        assert_eq!(session.current_title(), None);
        assert!(!session.delete_conversation("Renamed").unwrap());
        assert!(session.titles().is_empty());
    }
}
