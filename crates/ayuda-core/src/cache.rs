//! Session-scoped snapshots of the conversation list and per-chat messages.
//!
//! Both caches are internally synchronised so independent call sites
//! (initial load, polling, send, mark-read) can share one instance. Locks
//! are never held across an await point.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};

use crate::model::{ConversationSummary, Message};

/// A cached value and the wall-clock time it was last written.
///
/// Recency is write time, not read time.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<T> {
    pub value: T,
    pub timestamp: DateTime<Utc>,
}

impl<T> CacheEntry<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            timestamp: Utc::now(),
        }
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Full-snapshot cache of the chat list.
#[derive(Debug, Default)]
pub struct ConversationListCache {
    entry: Mutex<Option<CacheEntry<Vec<ConversationSummary>>>>,
}

impl ConversationListCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<CacheEntry<Vec<ConversationSummary>>> {
        lock(&self.entry).clone()
    }

    /// Replaces the whole snapshot.
    pub fn set(&self, list: Vec<ConversationSummary>) {
        *lock(&self.entry) = Some(CacheEntry::new(list));
    }

    pub fn clear(&self) {
        *lock(&self.entry) = None;
    }

    /// Mutates one chat's summary in place. The snapshot timestamp is kept:
    /// it still describes the last full fetch.
    ///
    /// Returns false when there is no snapshot or the chat is not in it.
    pub fn update_chat(&self, chat_id: &str, update: impl FnOnce(&mut ConversationSummary)) -> bool {
        let mut guard = lock(&self.entry);
        let Some(summary) = guard
            .as_mut()
            .and_then(|entry| entry.value.iter_mut().find(|summary| summary.id == chat_id))
        else {
            return false;
        };
        update(summary);
        true
    }

    pub fn find(&self, chat_id: &str) -> Option<ConversationSummary> {
        lock(&self.entry)
            .as_ref()
            .and_then(|entry| entry.value.iter().find(|summary| summary.id == chat_id))
            .cloned()
    }
}

#[derive(Debug)]
struct Slot {
    entry: CacheEntry<Vec<Message>>,
    /// Breaks ties between writes within the same clock tick.
    write_seq: u64,
}

#[derive(Debug, Default)]
struct MessageSlots {
    slots: HashMap<String, Slot>,
    next_seq: u64,
}

/// Bounded per-chat message snapshots with write-time LRU eviction.
#[derive(Debug)]
pub struct MessageCache {
    capacity: usize,
    inner: Mutex<MessageSlots>,
}

impl Default for MessageCache {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

impl MessageCache {
    pub const DEFAULT_CAPACITY: usize = 50;

    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(MessageSlots::default()),
        }
    }

    pub fn get(&self, chat_id: &str) -> Option<CacheEntry<Vec<Message>>> {
        lock(&self.inner)
            .slots
            .get(chat_id)
            .map(|slot| slot.entry.clone())
    }

    /// Overwrites (never merges) the chat's messages.
    ///
    /// Inserting a new chat at capacity first evicts the entry with the
    /// oldest write; returns the evicted chat id. The scan is linear, which
    /// is fine for a few dozen chats.
    pub fn set(&self, chat_id: &str, messages: Vec<Message>) -> Option<String> {
        let mut inner = lock(&self.inner);
        let evicted = if inner.slots.contains_key(chat_id) || inner.slots.len() < self.capacity {
            None
        } else {
            let oldest = inner
                .slots
                .iter()
                .min_by_key(|(_, slot)| (slot.entry.timestamp, slot.write_seq))
                .map(|(id, _)| id.clone());
            if let Some(id) = oldest.as_deref() {
                inner.slots.remove(id);
                tracing::debug!(chat_id = id, "evicted message cache entry");
            }
            oldest
        };

        let write_seq = inner.next_seq;
        inner.next_seq += 1;
        inner.slots.insert(
            chat_id.to_string(),
            Slot {
                entry: CacheEntry::new(messages),
                write_seq,
            },
        );
        evicted
    }

    /// Adds one message to the chat's snapshot, replacing any message with
    /// the same id and keeping ascending timestamp order. Counts as a write.
    pub fn append(&self, chat_id: &str, message: Message) -> Option<String> {
        let mut messages = self.get(chat_id).map(|entry| entry.value).unwrap_or_default();
        insert_ordered(&mut messages, message);
        self.set(chat_id, messages)
    }

    pub fn clear(&self) {
        lock(&self.inner).slots.clear();
    }

    pub fn len(&self) -> usize {
        lock(&self.inner).slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, chat_id: &str) -> bool {
        lock(&self.inner).slots.contains_key(chat_id)
    }
}

/// Replaces a message with the same id, else inserts keeping timestamp order.
pub fn insert_ordered(messages: &mut Vec<Message>, message: Message) {
    if let Some(existing) = messages.iter_mut().find(|m| m.id == message.id) {
        *existing = message;
        messages.sort_by_key(|m| m.timestamp);
        return;
    }
    let index = messages.partition_point(|m| m.timestamp <= message.timestamp);
    messages.insert(index, message);
}
