//! Message pane controller: active chat, cache-first display, stale
//! response discard, drafts and send feedback.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::cache::{insert_ordered, lock};
use crate::error::{SyncError, SyncResult};
use crate::messages::{MessagesState, fetch_messages, refresh_messages_silently};
use crate::model::Message;
use crate::read_state::ReadStateReconciler;
use crate::request::{LatestOnly, RequestId};
use crate::selection::SelectionController;
use crate::send::OptimisticSendPipeline;
use crate::session::SessionContext;

/// Transient, user-visible feedback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    SendFailed(String),
}

#[derive(Debug, Default)]
struct ViewState {
    selection: SelectionController,
    messages: MessagesState,
    loads: LatestOnly,
    draft: String,
    notice: Option<Notice>,
}

struct Inner {
    ctx: Arc<SessionContext>,
    state: Mutex<ViewState>,
    mounted: AtomicBool,
}

/// One mounted message pane. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct ChatView {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ChatView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatView")
            .field("selected", &self.selected())
            .field("mounted", &self.is_mounted())
            .finish_non_exhaustive()
    }
}

impl ChatView {
    pub fn new(ctx: Arc<SessionContext>) -> Self {
        Self::with_state(ctx, ViewState::default())
    }

    /// Standalone route or deep link: the selection is pinned to `chat_id`.
    pub fn with_forced(ctx: Arc<SessionContext>, chat_id: impl Into<String>) -> Self {
        Self::with_state(
            ctx,
            ViewState {
                selection: SelectionController::with_forced(chat_id),
                ..ViewState::default()
            },
        )
    }

    fn with_state(ctx: Arc<SessionContext>, state: ViewState) -> Self {
        Self {
            inner: Arc::new(Inner {
                ctx,
                state: Mutex::new(state),
                mounted: AtomicBool::new(true),
            }),
        }
    }

    pub fn context(&self) -> &Arc<SessionContext> {
        &self.inner.ctx
    }

    pub fn selected(&self) -> Option<String> {
        lock(&self.inner.state).selection.current().map(str::to_string)
    }

    pub fn messages(&self) -> MessagesState {
        lock(&self.inner.state).messages.clone()
    }

    pub fn is_loading(&self) -> bool {
        lock(&self.inner.state).messages.is_loading()
    }

    pub fn draft(&self) -> String {
        lock(&self.inner.state).draft.clone()
    }

    pub fn set_draft(&self, text: impl Into<String>) {
        lock(&self.inner.state).draft = text.into();
    }

    pub fn notice(&self) -> Option<Notice> {
        lock(&self.inner.state).notice.clone()
    }

    pub fn take_notice(&self) -> Option<Notice> {
        lock(&self.inner.state).notice.take()
    }

    fn is_mounted(&self) -> bool {
        self.inner.mounted.load(Ordering::Acquire)
    }

    /// Explicit user choice. Returns false when a forced id is in effect
    /// and `chat_id` is a different chat.
    pub async fn select_chat(&self, chat_id: &str) -> bool {
        let accepted = {
            let mut state = lock(&self.inner.state);
            state.selection.select(chat_id, self.inner.ctx.remembered());
            state.selection.current() == Some(chat_id)
        };
        if accepted {
            self.load_selected().await;
        }
        accepted
    }

    /// Re-resolves the active chat against the cached list (after a mount
    /// or a poll). Loads messages only when the active chat changed.
    pub async fn reconcile_selection(&self) -> Option<String> {
        let list = self
            .inner
            .ctx
            .list_cache()
            .get()
            .map(|entry| entry.value)
            .unwrap_or_default();
        let changed = lock(&self.inner.state)
            .selection
            .reconcile(&list, self.inner.ctx.remembered());
        if changed {
            self.load_selected().await;
        }
        self.selected()
    }

    /// Re-fetches the active chat's messages without a loading state.
    pub async fn refresh(&self) {
        let Some(chat_id) = self.selected() else {
            return;
        };
        let request = lock(&self.inner.state).loads.begin();
        let result = fetch_messages(&self.inner.ctx, &chat_id).await;
        self.apply_fetch(&chat_id, request, result);
    }

    async fn load_selected(&self) {
        let Some(chat_id) = self.selected() else {
            let mut state = lock(&self.inner.state);
            state.loads.cancel();
            state.messages = MessagesState::Idle;
            return;
        };

        let cached = self.inner.ctx.message_cache().get(&chat_id);
        let request = {
            let mut state = lock(&self.inner.state);
            state.messages = match &cached {
                Some(entry) => MessagesState::from_messages(entry.value.clone()),
                None => MessagesState::Loading,
            };
            state.loads.begin()
        };

        if cached.is_some() {
            let view = self.clone();
            self.inner.ctx.spawn(async move {
                let result = fetch_messages(&view.inner.ctx, &chat_id).await;
                view.apply_fetch(&chat_id, request, result);
            });
            return;
        }

        let result = fetch_messages(&self.inner.ctx, &chat_id).await;
        self.apply_fetch(&chat_id, request, result);
    }

    /// Writes a fetch result to the display if the view is still mounted,
    /// the request is still the latest and `chat_id` is still selected.
    fn apply_fetch(
        &self,
        chat_id: &str,
        request: RequestId,
        result: SyncResult<Option<Vec<Message>>>,
    ) {
        if !self.is_mounted() {
            tracing::debug!(chat_id, "discarding messages for unmounted view");
            return;
        }
        let mut state = lock(&self.inner.state);
        if state.selection.current() != Some(chat_id) || !state.loads.finish_if_active(request) {
            tracing::debug!(chat_id, "discarding messages for a deselected chat");
            return;
        }

        match result {
            Ok(Some(messages)) => {
                state.messages = MessagesState::from_messages(messages);
                drop(state);
                ReadStateReconciler::new(Arc::clone(&self.inner.ctx)).spawn_mark_read(chat_id);
            }
            Ok(None) => {
                // Superseded by a newer write for the same chat.
                if let Some(entry) = self.inner.ctx.message_cache().get(chat_id) {
                    state.messages = MessagesState::from_messages(entry.value);
                }
            }
            Err(err) if state.messages.is_loading() => {
                state.messages = MessagesState::Failed(err);
            }
            Err(err) => {
                tracing::warn!(chat_id, kind = %err.kind, error = %err, "silent message refresh failed");
            }
        }
    }

    /// Sends the current draft to the active chat.
    ///
    /// On success the confirmed message joins the displayed list and the
    /// draft is cleared. On a non-validation failure the draft stays and a
    /// [`Notice::SendFailed`] is raised; validation failures are silent.
    pub async fn send_draft(&self) -> SyncResult<Message> {
        let (chat_id, text) = {
            let state = lock(&self.inner.state);
            (state.selection.current().map(str::to_string), state.draft.clone())
        };
        let pipeline = OptimisticSendPipeline::new(Arc::clone(&self.inner.ctx));
        let delivery = match pipeline.deliver(chat_id.as_deref(), &text).await {
            Ok(delivery) => delivery,
            Err(err) => {
                if self.is_mounted() && !err.is_validation() {
                    lock(&self.inner.state).notice = Some(Notice::SendFailed(send_failure_text(&err)));
                }
                return Err(err);
            }
        };

        let shown = if self.is_mounted() {
            let mut state = lock(&self.inner.state);
            if state.draft == text {
                state.draft.clear();
            }
            state.notice = None;
            let selected = state.selection.current() == Some(delivery.chat_id.as_str());
            if selected {
                show_sent(&mut state.messages, delivery.message.clone());
            }
            selected
        } else {
            false
        };

        // The chat had no page yet: fetch one that includes the sent message.
        if delivery.seeded {
            let ctx = Arc::clone(&self.inner.ctx);
            if shown {
                let view = self.clone();
                ctx.spawn(async move {
                    view.refresh().await;
                });
            } else {
                let reload_ctx = Arc::clone(&ctx);
                let chat_id = delivery.chat_id.clone();
                ctx.spawn(async move {
                    refresh_messages_silently(&reload_ctx, &chat_id).await;
                });
            }
        }
        Ok(delivery.message)
    }

    /// Detaches the view: every pending result is dropped on arrival.
    pub fn unmount(&self) {
        self.inner.mounted.store(false, Ordering::Release);
        lock(&self.inner.state).loads.cancel();
    }

    /// Waits for background work spawned on the session (revalidation,
    /// mark-read) to finish.
    pub async fn settle(&self) {
        self.inner.ctx.settle().await;
    }
}

fn show_sent(messages: &mut MessagesState, message: Message) {
    match messages {
        MessagesState::Ready(list) => insert_ordered(list, message),
        _ => *messages = MessagesState::Ready(vec![message]),
    }
}

fn send_failure_text(err: &SyncError) -> String {
    format!("Message not sent: {}", err.message)
}
