//! Active-chat resolution across presentation modes.

use std::sync::Mutex;

use crate::cache::lock;
use crate::model::ConversationSummary;

/// Last selected chat id, shared by every view of a session and cleared on
/// logout.
#[derive(Debug, Default)]
pub struct RememberedSelection {
    chat_id: Mutex<Option<String>>,
}

impl RememberedSelection {
    pub fn get(&self) -> Option<String> {
        lock(&self.chat_id).clone()
    }

    pub fn set(&self, chat_id: &str) {
        *lock(&self.chat_id) = Some(chat_id.to_string());
    }

    pub fn clear(&self) {
        *lock(&self.chat_id) = None;
    }
}

/// Picks the active chat.
///
/// Order: forced id, current selection if still listed, remembered id if
/// listed, first entry, none.
pub fn resolve_active(
    forced: Option<&str>,
    current: Option<&str>,
    remembered: Option<&str>,
    list: &[ConversationSummary],
) -> Option<String> {
    if let Some(forced) = forced {
        return Some(forced.to_string());
    }
    let listed = |id: &str| list.iter().any(|summary| summary.id == id);
    current
        .filter(|&id| listed(id))
        .or_else(|| remembered.filter(|&id| listed(id)))
        .map(str::to_string)
        .or_else(|| list.first().map(|summary| summary.id.clone()))
}

/// Selection state of one mounted view.
#[derive(Debug, Default)]
pub struct SelectionController {
    forced: Option<String>,
    current: Option<String>,
}

impl SelectionController {
    /// A deep link or standalone route pins the selection to one chat.
    pub fn with_forced(chat_id: impl Into<String>) -> Self {
        Self {
            forced: Some(chat_id.into()),
            current: None,
        }
    }

    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    /// Re-evaluates against a (re)loaded list. Returns true when the active
    /// chat changed.
    pub fn reconcile(
        &mut self,
        list: &[ConversationSummary],
        remembered: &RememberedSelection,
    ) -> bool {
        let resolved = resolve_active(
            self.forced.as_deref(),
            self.current.as_deref(),
            remembered.get().as_deref(),
            list,
        );
        self.activate(resolved, remembered)
    }

    /// Explicit user choice. Ignored while a forced id is in effect.
    pub fn select(&mut self, chat_id: &str, remembered: &RememberedSelection) -> bool {
        if self.forced.as_deref().is_some_and(|forced| forced != chat_id) {
            return false;
        }
        self.activate(Some(chat_id.to_string()), remembered)
    }

    fn activate(&mut self, next: Option<String>, remembered: &RememberedSelection) -> bool {
        if let Some(id) = next.as_deref() {
            remembered.set(id);
        }
        if self.current == next {
            return false;
        }
        self.current = next;
        true
    }
}
