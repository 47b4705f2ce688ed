//! Durable conversation history
//!
//! Conversations live in an embedded `sled` database, one key per title
//! in the `conversations` tree. Access is serialized across processes by
//! [`StoreLock`].

use std::path::{Path, PathBuf};

use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::{Db, Tree};

use crate::config::Config;
use crate::error::{ColloquyError, Result};

pub mod lock;
pub mod types;

pub use lock::StoreLock;
pub use types::ConversationRecord;

use types::StoredConversation;

/// Database directory name inside the data directory
pub const DB_DIR_NAME: &str = "history.db";

/// Lock file name inside the data directory
pub const LOCK_FILE_NAME: &str = "history.lock";

const CONVERSATIONS_TREE: &str = "conversations";

/// Location of the database for a data directory
pub fn db_path(data_dir: &Path) -> PathBuf {
    data_dir.join(DB_DIR_NAME)
}

/// Location of the lock file for a data directory
pub fn lock_path(data_dir: &Path) -> PathBuf {
    data_dir.join(LOCK_FILE_NAME)
}

/// Take the store lock for the configured data directory, then open the store
///
/// The lock must be held for as long as the store is in use.
///
/// # Errors
///
/// Returns `ColloquyError::LockTimeout` if another process keeps the lock
/// for the configured budget
pub fn open_locked(config: &Config) -> Result<(StoreLock, ConversationStore)> {
    let data_dir = config.data_dir()?;
    let lock = StoreLock::acquire_with_interval(
        &lock_path(&data_dir),
        config.storage.lock_timeout(),
        config.storage.lock_poll_interval(),
    )?;
    let store = ConversationStore::open(db_path(&data_dir))?;
    tracing::info!(data_dir = %data_dir.display(), "History store ready");
    Ok((lock, store))
}

#[derive(Debug)]
enum RenameAbort {
    Missing,
    Duplicate,
}

/// Persistent map from title to conversation
pub struct ConversationStore {
    db: Db,
    tree: Tree,
}

impl ConversationStore {
    /// Open or create a store at `path`
    ///
    /// # Errors
    ///
    /// Returns `ColloquyError::Storage` if the database cannot be opened
    ///
    /// # Examples
    ///
    /// ```
    /// use colloquy::storage::ConversationStore;
    ///
    /// # fn main() -> colloquy::error::Result<()> {
    /// let dir = tempfile::tempdir()?;
    /// let store = ConversationStore::open(dir.path().join("history.db"))?;
    /// assert!(store.is_empty());
    /// # Ok(())
    /// # }
    /// ```
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ColloquyError::Storage(format!(
                    "Failed to create data directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let db = sled::open(path)
            .map_err(|e| ColloquyError::Storage(format!("Failed to open database: {}", e)))?;
        let tree = db
            .open_tree(CONVERSATIONS_TREE)
            .map_err(|e| ColloquyError::Storage(format!("Failed to open tree: {}", e)))?;

        tracing::debug!(path = %path.display(), "Opened conversation store");
        Ok(Self { db, tree })
    }

    /// Open the store inside the configured data directory
    pub fn open_default(config: &Config) -> Result<Self> {
        Self::open(db_path(&config.data_dir()?))
    }

    /// Every readable conversation, newest first
    ///
    /// Ties on the timestamp are ordered by title. Records that fail to
    /// decode are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns `ColloquyError::Storage` if iterating the database fails
    pub fn load(&self) -> Result<Vec<ConversationRecord>> {
        let mut records = Vec::new();

        for item in self.tree.iter() {
            let (key, value) =
                item.map_err(|e| ColloquyError::Storage(format!("Iteration failed: {}", e)))?;

            let title = match String::from_utf8(key.to_vec()) {
                Ok(title) => title,
                Err(e) => {
                    tracing::warn!("Skipping conversation with non UTF-8 key: {}", e);
                    continue;
                }
            };

            match decode(&title, &value) {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!("Skipping stored conversation: {}", e),
            }
        }

        records.sort_by(|a, b| {
            b.last_updated
                .cmp(&a.last_updated)
                .then_with(|| a.title.cmp(&b.title))
        });

        Ok(records)
    }

    /// Look up one conversation
    ///
    /// # Errors
    ///
    /// Returns `ColloquyError::StoreDecode` if the stored value is malformed
    pub fn get(&self, title: &str) -> Result<Option<ConversationRecord>> {
        let value = self
            .tree
            .get(title.as_bytes())
            .map_err(|e| ColloquyError::Storage(format!("Get failed: {}", e)))?;

        match value {
            Some(bytes) => Ok(Some(decode(title, &bytes)?)),
            None => Ok(None),
        }
    }

    /// Insert or overwrite the record keyed by its title
    ///
    /// # Errors
    ///
    /// Returns `ColloquyError::InvalidTitle` for a blank title and
    /// `ColloquyError::Storage` if the write fails
    pub fn set(&self, record: &ConversationRecord) -> Result<()> {
        validate_title(&record.title)?;

        let value = serde_json::to_vec(&StoredConversation::from_record(record))
            .map_err(|e| ColloquyError::Storage(format!("Serialization failed: {}", e)))?;

        self.tree
            .insert(record.title.as_bytes(), value)
            .map_err(|e| ColloquyError::Storage(format!("Insert failed: {}", e)))?;
        self.flush()?;

        tracing::debug!(
            title = %record.title,
            messages = record.messages.len(),
            "Saved conversation"
        );
        Ok(())
    }

    /// Remove a conversation; returns whether it existed
    pub fn delete(&self, title: &str) -> Result<bool> {
        let removed = self
            .tree
            .remove(title.as_bytes())
            .map_err(|e| ColloquyError::Storage(format!("Delete failed: {}", e)))?;
        self.flush()?;

        if removed.is_some() {
            tracing::debug!(title, "Deleted conversation");
        }
        Ok(removed.is_some())
    }

    /// Move a conversation to a new title
    ///
    /// Runs as a single transaction, so the record is never visible under
    /// both titles.
    ///
    /// # Errors
    ///
    /// * `ColloquyError::InvalidTitle` - `new` is blank
    /// * `ColloquyError::ConversationNotFound` - nothing is stored under `old`
    /// * `ColloquyError::DuplicateTitle` - `new` is already taken
    pub fn rename(&self, old: &str, new: &str) -> Result<()> {
        validate_title(new)?;
        if old == new {
            return Ok(());
        }

        let result = self.tree.transaction(|tx| {
            let value = match tx.get(old.as_bytes())? {
                Some(value) => value,
                None => return sled::transaction::abort(RenameAbort::Missing),
            };
            if tx.get(new.as_bytes())?.is_some() {
                return sled::transaction::abort(RenameAbort::Duplicate);
            }
            tx.insert(new.as_bytes(), value)?;
            tx.remove(old.as_bytes())?;
            Ok::<(), ConflictableTransactionError<RenameAbort>>(())
        });

        match result {
            Ok(()) => {}
            Err(TransactionError::Abort(RenameAbort::Missing)) => {
                return Err(ColloquyError::ConversationNotFound(old.to_string()).into());
            }
            Err(TransactionError::Abort(RenameAbort::Duplicate)) => {
                return Err(ColloquyError::DuplicateTitle(new.to_string()).into());
            }
            Err(TransactionError::Storage(e)) => {
                return Err(ColloquyError::Storage(format!("Rename failed: {}", e)).into());
            }
        }

        self.flush()?;
        tracing::debug!(old, new, "Renamed conversation");
        Ok(())
    }

    /// Whether any value, readable or not, is stored under `title`
    pub fn contains(&self, title: &str) -> Result<bool> {
        let found = self
            .tree
            .contains_key(title.as_bytes())
            .map_err(|e| ColloquyError::Storage(format!("Lookup failed: {}", e)))?;
        Ok(found)
    }

    /// Number of stored keys, including malformed ones
    pub fn len(&self) -> usize {
        self.tree.len()
    }

    /// Whether nothing is stored
    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    fn flush(&self) -> Result<()> {
        self.db
            .flush()
            .map_err(|e| ColloquyError::Storage(format!("Flush failed: {}", e)))?;
        Ok(())
    }
}

fn validate_title(title: &str) -> Result<()> {
    if title.trim().is_empty() {
        return Err(ColloquyError::InvalidTitle(title.to_string()).into());
    }
    Ok(())
}

fn decode(title: &str, bytes: &[u8]) -> std::result::Result<ConversationRecord, ColloquyError> {
    let stored: StoredConversation =
        serde_json::from_slice(bytes).map_err(|e| ColloquyError::StoreDecode {
            title: title.to_string(),
            reason: e.to_string(),
        })?;

    stored
        .into_record(title.to_string())
        .ok_or_else(|| ColloquyError::StoreDecode {
            title: title.to_string(),
            reason: "timestamp out of range".to_string(),
        })
}
