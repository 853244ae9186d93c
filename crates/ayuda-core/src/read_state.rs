//! Best-effort "mark read" after messages are shown.

use std::sync::Arc;

use crate::session::SessionContext;

#[derive(Debug, Clone)]
pub struct ReadStateReconciler {
    ctx: Arc<SessionContext>,
}

impl ReadStateReconciler {
    pub fn new(ctx: Arc<SessionContext>) -> Self {
        Self { ctx }
    }

    /// Marks the chat read on the backend and zeroes its unread count.
    ///
    /// Never surfaces an error and never retries: on failure the count is
    /// left alone until the next successful list refresh. Repeated calls for
    /// the same chat are not deduplicated. Returns whether the local count
    /// was reset.
    pub async fn mark_read(&self, chat_id: &str) -> bool {
        if !self.ctx.is_active() {
            return false;
        }
        if let Err(err) = self.ctx.track_auth(self.ctx.api().mark_read(chat_id).await) {
            tracing::debug!(chat_id, kind = %err.kind, error = %err, "mark read failed");
            return false;
        }
        self.ctx.mutate_list(|cache| {
            cache.update_chat(chat_id, |summary| summary.unread_count = 0)
        })
    }

    /// Fire-and-forget variant used after a chat is rendered.
    pub fn spawn_mark_read(&self, chat_id: &str) {
        let reconciler = self.clone();
        let chat_id = chat_id.to_string();
        self.ctx.spawn(async move {
            reconciler.mark_read(&chat_id).await;
        });
    }
}
