//! In-memory view of the stored conversations

use std::collections::HashMap;

use crate::storage::ConversationRecord;

/// Conversations keyed by title, plus the listing order (newest first)
#[derive(Debug, Default, Clone)]
pub struct ConversationCache {
    records: HashMap<String, ConversationRecord>,
    order: Vec<String>,
}

impl ConversationCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the cache from records already in listing order
    pub fn from_records(records: Vec<ConversationRecord>) -> Self {
        let mut cache = Self::new();
        for record in records {
            if cache.records.contains_key(&record.title) {
                continue;
            }
            cache.order.push(record.title.clone());
            cache.records.insert(record.title.clone(), record);
        }
        cache
    }

    pub fn get(&self, title: &str) -> Option<&ConversationRecord> {
        self.records.get(title)
    }

    pub fn contains(&self, title: &str) -> bool {
        self.records.contains_key(title)
    }

    /// Titles, newest first
    pub fn titles(&self) -> &[String] {
        &self.order
    }

    /// Insert or replace a record and move its title to the head
    pub fn upsert(&mut self, record: ConversationRecord) {
        self.order.retain(|t| t != &record.title);
        self.order.insert(0, record.title.clone());
        self.records.insert(record.title.clone(), record);
    }

    pub fn remove(&mut self, title: &str) -> Option<ConversationRecord> {
        let removed = self.records.remove(title)?;
        self.order.retain(|t| t != title);
        Some(removed)
    }

    /// Re-key a record, keeping its position in the listing
    ///
    /// Returns false when `old` is unknown.
    pub fn rename(&mut self, old: &str, new: &str) -> bool {
        if old == new {
            return self.contains(old);
        }
        let Some(mut record) = self.records.remove(old) else {
            return false;
        };

        // A stale entry under `new` would otherwise appear twice.
        if self.records.remove(new).is_some() {
            self.order.retain(|t| t != new);
        }

        record.title = new.to_string();
        if let Some(slot) = self.order.iter_mut().find(|t| t.as_str() == old) {
            *slot = new.to_string();
        }
        self.records.insert(new.to_string(), record);
        true
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
