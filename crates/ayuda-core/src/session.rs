//! Session-scoped cache service.
//!
//! A [`SessionContext`] is created on login and torn down on logout. Views,
//! the scheduler, the send pipeline and the read reconciler all receive it
//! explicitly; nothing here is process-global.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, watch};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::api::ApiClient;
use crate::cache::{ConversationListCache, MessageCache, lock};
use crate::config::{Config, SyncConfig};
use crate::error::{SyncError, SyncResult};
use crate::request::KeyedSequencer;
use crate::scheduler::{SchedulerHandle, SyncScheduler};
use crate::selection::RememberedSelection;

pub struct SessionContext {
    api: ApiClient,
    list_cache: ConversationListCache,
    message_cache: MessageCache,
    remembered: RememberedSelection,
    list_requests: KeyedSequencer<()>,
    message_requests: KeyedSequencer<String>,
    list_version: watch::Sender<u64>,
    tasks: TaskTracker,
    settling: AsyncMutex<()>,
    ended: CancellationToken,
    /// Held by `end` and by every post-fetch cache write.
    lifecycle: Mutex<()>,
    active: AtomicBool,
    sync: SyncConfig,
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("api", &self.api)
            .field("active", &self.is_active())
            .field("cached_chats", &self.message_cache.len())
            .finish_non_exhaustive()
    }
}

impl SessionContext {
    pub fn new(api: ApiClient, sync: SyncConfig) -> Arc<Self> {
        let (list_version, _) = watch::channel(0);
        Arc::new(Self {
            api,
            list_cache: ConversationListCache::new(),
            message_cache: MessageCache::new(sync.message_cache_capacity),
            remembered: RememberedSelection::default(),
            list_requests: KeyedSequencer::default(),
            message_requests: KeyedSequencer::default(),
            list_version,
            tasks: TaskTracker::new(),
            settling: AsyncMutex::new(()),
            ended: CancellationToken::new(),
            lifecycle: Mutex::new(()),
            active: AtomicBool::new(true),
            sync,
        })
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn list_cache(&self) -> &ConversationListCache {
        &self.list_cache
    }

    pub fn message_cache(&self) -> &MessageCache {
        &self.message_cache
    }

    pub fn remembered(&self) -> &RememberedSelection {
        &self.remembered
    }

    pub fn sync_config(&self) -> &SyncConfig {
        &self.sync
    }

    pub(crate) fn list_requests(&self) -> &KeyedSequencer<()> {
        &self.list_requests
    }

    pub(crate) fn message_requests(&self) -> &KeyedSequencer<String> {
        &self.message_requests
    }

    /// Liveness flag checked before every post-resolution write.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub(crate) fn require_active(&self) -> SyncResult<()> {
        if self.is_active() {
            Ok(())
        } else {
            Err(SyncError::validation("no active session"))
        }
    }

    /// Runs `write` only while the session is live. `end` takes the same
    /// lock, so nothing written here can outlive a logout.
    pub(crate) fn write_if_active<R>(&self, write: impl FnOnce() -> R) -> Option<R> {
        let _live = lock(&self.lifecycle);
        self.is_active().then(write)
    }

    /// Passes `result` through, ending the session first when the backend
    /// rejected the token.
    pub(crate) fn track_auth<T>(&self, result: SyncResult<T>) -> SyncResult<T> {
        if let Err(err) = &result
            && err.is_unauthorized()
        {
            tracing::warn!(error = %err, "backend rejected the session token");
            self.end();
        }
        result
    }

    /// Resolves once the session has ended.
    pub async fn ended(&self) {
        self.ended.cancelled().await;
    }

    /// Receives a new version number every time the list snapshot changes.
    pub fn subscribe_list(&self) -> watch::Receiver<u64> {
        self.list_version.subscribe()
    }

    pub(crate) fn notify_list_changed(&self) {
        self.list_version.send_modify(|version| *version += 1);
    }

    /// Applies a local list mutation as the newest write, so list fetches
    /// issued before it can no longer overwrite it.
    pub(crate) fn mutate_list(
        &self,
        mutate: impl FnOnce(&ConversationListCache) -> bool,
    ) -> bool {
        self.write_if_active(|| {
            let changed = mutate(&self.list_cache);
            if changed {
                let ticket = self.list_requests.begin(());
                self.list_requests.accept(&ticket);
                self.notify_list_changed();
            }
            changed
        })
        .unwrap_or(false)
    }

    /// Same as [`Self::mutate_list`] for one chat's message snapshot.
    ///
    /// Returns whether the chat already had a snapshot, or `None` once the
    /// session has ended. A chat without one now holds only what `mutate`
    /// wrote, and its in-flight first fetch is superseded.
    pub(crate) fn mutate_messages(
        &self,
        chat_id: &str,
        mutate: impl FnOnce(&MessageCache),
    ) -> Option<bool> {
        self.write_if_active(|| {
            let existed = self.message_cache.contains(chat_id);
            mutate(&self.message_cache);
            let ticket = self.message_requests.begin(chat_id.to_string());
            self.message_requests.accept(&ticket);
            existed
        })
    }

    /// Runs background work (silent refreshes, mark-read) on the session's
    /// tracker. In-flight work is never aborted; it checks liveness instead.
    pub fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tasks.spawn(task);
    }

    /// Waits until every background task spawned so far has finished.
    /// Concurrent callers settle one after another.
    pub async fn settle(&self) {
        let _settling = self.settling.lock().await;
        self.tasks.close();
        self.tasks.wait().await;
        self.tasks.reopen();
    }

    /// Ends the session: flips liveness and synchronously drops every cache,
    /// the remembered selection and request bookkeeping.
    pub fn end(&self) {
        let _live = lock(&self.lifecycle);
        if self.active.swap(false, Ordering::AcqRel) {
            tracing::info!("session ended, clearing caches");
        }
        self.list_cache.clear();
        self.message_cache.clear();
        self.remembered.clear();
        self.list_requests.reset();
        self.message_requests.reset();
        self.ended.cancel();
        self.notify_list_changed();
    }
}

/// An authenticated session: the context plus its polling driver.
#[derive(Debug)]
pub struct Session {
    context: Arc<SessionContext>,
    scheduler: Option<SchedulerHandle>,
}

impl Session {
    /// Builds the session from config. Requires a token.
    pub fn login(config: &Config) -> SyncResult<Self> {
        let api = ApiClient::from_config(&config.api)?;
        Ok(Self::with_client(api, config.sync.clone()))
    }

    pub fn with_client(api: ApiClient, sync: SyncConfig) -> Self {
        Self {
            context: SessionContext::new(api, sync),
            scheduler: None,
        }
    }

    pub fn context(&self) -> &Arc<SessionContext> {
        &self.context
    }

    /// Starts the periodic silent refresh (no-op if already running).
    pub fn start_polling(&mut self) {
        if self.scheduler.as_ref().is_some_and(SchedulerHandle::is_running) {
            return;
        }
        let interval = self.context.sync_config().poll_interval();
        self.scheduler = Some(SyncScheduler::start(Arc::clone(&self.context), interval));
    }

    pub fn stop_polling(&mut self) {
        if let Some(scheduler) = self.scheduler.take() {
            scheduler.stop();
        }
    }

    pub fn is_polling(&self) -> bool {
        self.scheduler.as_ref().is_some_and(SchedulerHandle::is_running)
    }

    pub fn logout(&mut self) {
        self.stop_polling();
        self.context.end();
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.stop_polling();
    }
}
