//! Per-chat message fetching and the message pane state.

use crate::error::{SyncError, SyncResult};
use crate::model::Message;
use crate::session::SessionContext;

/// Fetches one page of messages and overwrites the chat's cache entry.
///
/// Returns `Ok(None)` when the result was superseded by a newer fetch or
/// local write for the same chat, or the session ended meanwhile.
pub async fn fetch_messages(
    ctx: &SessionContext,
    chat_id: &str,
) -> SyncResult<Option<Vec<Message>>> {
    ctx.require_active()?;
    let ticket = ctx.message_requests().begin(chat_id.to_string());
    let limit = ctx.sync_config().message_page_size;
    let page = ctx.track_auth(ctx.api().list_messages(chat_id, limit).await)?;

    let applied = ctx.write_if_active(|| {
        let accepted = ctx.message_requests().accept(&ticket);
        if accepted {
            ctx.message_cache().set(chat_id, page.messages.clone());
        }
        accepted
    });
    match applied {
        Some(true) => Ok(Some(page.messages)),
        Some(false) => {
            tracing::debug!(chat_id, seq = ticket.seq, "discarding superseded messages");
            Ok(None)
        }
        None => {
            tracing::debug!(chat_id, "discarding messages fetched after session end");
            Ok(None)
        }
    }
}

/// Background reload of one chat's messages; failures are logged only.
pub async fn refresh_messages_silently(ctx: &SessionContext, chat_id: &str) -> Option<Vec<Message>> {
    match fetch_messages(ctx, chat_id).await {
        Ok(messages) => messages,
        Err(err) if err.is_validation() => None,
        Err(err) => {
            tracing::warn!(chat_id, kind = %err.kind, error = %err, "silent message refresh failed");
            None
        }
    }
}

/// What the message pane should render.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum MessagesState {
    /// No chat selected.
    #[default]
    Idle,
    Loading,
    Ready(Vec<Message>),
    /// Loaded successfully, the chat has no messages.
    Empty,
    /// First load failed and nothing is cached.
    Failed(SyncError),
}

impl MessagesState {
    pub fn from_messages(messages: Vec<Message>) -> Self {
        if messages.is_empty() {
            MessagesState::Empty
        } else {
            MessagesState::Ready(messages)
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, MessagesState::Loading)
    }

    pub fn messages(&self) -> &[Message] {
        match self {
            MessagesState::Ready(messages) => messages,
            _ => &[],
        }
    }
}
