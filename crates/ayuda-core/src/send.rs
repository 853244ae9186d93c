//! Send-then-confirm message flow.
//!
//! The message only becomes visible once the backend has confirmed it; the
//! server-assigned id and timestamp are what get cached. There is no
//! pre-confirmation "pending" bubble.

use std::sync::Arc;

use crate::conversations::refresh_list_silently;
use crate::error::{SyncError, SyncResult};
use crate::messages::refresh_messages_silently;
use crate::model::Message;
use crate::session::SessionContext;

#[derive(Debug, Clone)]
pub struct OptimisticSendPipeline {
    ctx: Arc<SessionContext>,
}

/// A send the backend confirmed.
#[derive(Debug)]
pub(crate) struct Delivery {
    pub(crate) chat_id: String,
    pub(crate) message: Message,
    /// The chat had no cached messages, so its snapshot now holds only the
    /// sent message and any first fetch in flight was superseded.
    pub(crate) seeded: bool,
}

impl OptimisticSendPipeline {
    pub fn new(ctx: Arc<SessionContext>) -> Self {
        Self { ctx }
    }

    /// Sends `text` to `chat_id` and reconciles both caches on success.
    ///
    /// Missing chat, missing session and blank text are rejected with a
    /// `Validation` error before any request is made. On any failure no
    /// cache is touched.
    pub async fn send(&self, chat_id: Option<&str>, text: &str) -> SyncResult<Message> {
        let delivery = self.deliver(chat_id, text).await?;
        if delivery.seeded {
            let ctx = Arc::clone(&self.ctx);
            let chat_id = delivery.chat_id;
            self.ctx.spawn(async move {
                refresh_messages_silently(&ctx, &chat_id).await;
            });
        }
        Ok(delivery.message)
    }

    /// [`Self::send`] without the page reload for a seeded chat; the caller
    /// decides how to reload it.
    pub(crate) async fn deliver(&self, chat_id: Option<&str>, text: &str) -> SyncResult<Delivery> {
        let chat_id = chat_id
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| SyncError::validation("no chat selected"))?;
        self.ctx.require_active()?;
        let text = text.trim();
        if text.is_empty() {
            return Err(SyncError::validation("message text is empty"));
        }

        let message = self
            .ctx
            .track_auth(self.ctx.api().send_message(chat_id, text).await)?;

        let existed = self.ctx.mutate_messages(chat_id, |cache| {
            cache.append(chat_id, message.clone());
        });
        let Some(existed) = existed else {
            // Session ended while the request was in flight.
            return Ok(Delivery {
                chat_id: chat_id.to_string(),
                message,
                seeded: false,
            });
        };
        self.ctx.mutate_list(|cache| {
            cache.update_chat(chat_id, |summary| {
                summary.last_message = Some(message.clone());
                summary.updated_at = message.timestamp;
                summary.unread_count = 0;
            })
        });

        // Server-computed fields (ordering, previews) arrive with the next list.
        let ctx = Arc::clone(&self.ctx);
        self.ctx.spawn(async move {
            refresh_list_silently(&ctx).await;
        });

        tracing::debug!(chat_id, message_id = %message.id, "message sent");
        Ok(Delivery {
            chat_id: chat_id.to_string(),
            message,
            seeded: !existed,
        })
    }
}
