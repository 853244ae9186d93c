//! Conversation list loading: blocking first paint, silent refresh and the
//! list view state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::cache::lock;
use crate::error::{SyncError, SyncResult};
use crate::model::ConversationSummary;
use crate::session::SessionContext;

/// Fetches the list and writes it to the cache unless a newer fetch (or a
/// local mutation) has already been applied.
///
/// When the result is superseded the newer cached snapshot is returned
/// instead, so callers never display older data than the cache holds.
pub async fn fetch_list(ctx: &SessionContext) -> SyncResult<Vec<ConversationSummary>> {
    ctx.require_active()?;
    let ticket = ctx.list_requests().begin(());
    let list = ctx.track_auth(ctx.api().list_chats().await)?;

    let applied = ctx.write_if_active(|| {
        let accepted = ctx.list_requests().accept(&ticket);
        if accepted {
            ctx.list_cache().set(list.clone());
            ctx.notify_list_changed();
        }
        accepted
    });
    match applied {
        Some(true) => Ok(list),
        Some(false) => {
            tracing::debug!(seq = ticket.seq, "discarding superseded chat list");
            Ok(ctx.list_cache().get().map_or(list, |entry| entry.value))
        }
        None => {
            tracing::debug!("discarding chat list fetched after session end");
            Ok(list)
        }
    }
}

/// Fetches one conversation and replaces its row in the cached list. A
/// chat missing from the snapshot is returned without being added.
pub async fn fetch_chat(ctx: &SessionContext, chat_id: &str) -> SyncResult<ConversationSummary> {
    ctx.require_active()?;
    let summary = ctx.track_auth(ctx.api().get_chat(chat_id).await)?;
    ctx.mutate_list(|cache| cache.update_chat(chat_id, |row| *row = summary.clone()));
    Ok(summary)
}

/// Background reload: never touches loading state and swallows errors,
/// leaving the last good snapshot in place. A rejected token has already
/// ended the session by the time the error arrives here.
pub async fn refresh_list_silently(ctx: &SessionContext) -> Option<Vec<ConversationSummary>> {
    match fetch_list(ctx).await {
        Ok(list) => Some(list),
        Err(err) if err.is_validation() => None,
        Err(err) => {
            tracing::warn!(kind = %err.kind, error = %err, "silent chat list refresh failed");
            None
        }
    }
}

/// What the conversation list should render.
#[derive(Debug, Clone, PartialEq)]
pub enum ListState {
    Loading,
    Ready(Vec<ConversationSummary>),
    /// Loaded successfully, nothing to show.
    Empty,
    /// First load failed and nothing is cached.
    Failed(SyncError),
}

impl ListState {
    fn from_list(list: Vec<ConversationSummary>) -> Self {
        if list.is_empty() {
            ListState::Empty
        } else {
            ListState::Ready(list)
        }
    }
}

/// List view state. The cache is the source of truth; the view only adds
/// the first-load failure.
pub struct ConversationListView {
    ctx: Arc<SessionContext>,
    failure: Mutex<Option<SyncError>>,
    mounted: AtomicBool,
}

impl ConversationListView {
    pub fn new(ctx: Arc<SessionContext>) -> Self {
        Self {
            ctx,
            failure: Mutex::new(None),
            mounted: AtomicBool::new(true),
        }
    }

    /// Stale-while-revalidate: a cached list is shown at once and refreshed
    /// in the background; otherwise the first fetch blocks.
    pub async fn mount(&self) -> ListState {
        self.mounted.store(true, Ordering::Release);
        if self.ctx.list_cache().get().is_some() {
            let ctx = Arc::clone(&self.ctx);
            self.ctx.spawn(async move {
                refresh_list_silently(&ctx).await;
            });
            return self.state();
        }

        let result = fetch_list(&self.ctx).await;
        if self.mounted.load(Ordering::Acquire) {
            *lock(&self.failure) = result.err();
        }
        self.state()
    }

    /// User-triggered refresh. Runs independently of (and may race with)
    /// scheduled polls.
    pub async fn refresh(&self) -> ListState {
        if refresh_list_silently(&self.ctx).await.is_some() && self.mounted.load(Ordering::Acquire) {
            *lock(&self.failure) = None;
        }
        self.state()
    }

    pub fn state(&self) -> ListState {
        if let Some(entry) = self.ctx.list_cache().get() {
            return ListState::from_list(entry.value);
        }
        match lock(&self.failure).clone() {
            Some(err) => ListState::Failed(err),
            None => ListState::Loading,
        }
    }

    pub fn unmount(&self) {
        self.mounted.store(false, Ordering::Release);
    }
}
