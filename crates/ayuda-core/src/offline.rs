//! Field-agent actions buffered while the device is offline, replayed in
//! enqueue order once connectivity returns.

use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::api::ApiClient;
use crate::cache::lock;
use crate::error::{SyncError, SyncResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    AssignSelf,
    MarkArrived,
    UploadEvidence,
    Close,
}

impl ActionKind {
    pub const ALL: [ActionKind; 4] = [
        ActionKind::AssignSelf,
        ActionKind::MarkArrived,
        ActionKind::UploadEvidence,
        ActionKind::Close,
    ];

    /// Last path segment of `POST /complaints/{id}/{route}`.
    pub fn route(self) -> &'static str {
        match self {
            ActionKind::AssignSelf => "assign",
            ActionKind::MarkArrived => "arrived",
            ActionKind::UploadEvidence => "evidence",
            ActionKind::Close => "close",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::AssignSelf => "assign_self",
            ActionKind::MarkArrived => "mark_arrived",
            ActionKind::UploadEvidence => "upload_evidence",
            ActionKind::Close => "close",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = anyhow::Error;

    /// Accepts the snake_case name, its kebab-case form or the route.
    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase().replace('-', "_");
        ActionKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == wanted || kind.route() == wanted)
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "unknown action '{s}' (expected assign_self, mark_arrived, upload_evidence or close)"
                )
            })
    }
}

/// Platform online/offline signal.
#[derive(Debug)]
pub struct Connectivity {
    online: watch::Sender<bool>,
}

impl Connectivity {
    pub fn new(online: bool) -> Self {
        let (online, _) = watch::channel(online);
        Self { online }
    }

    pub fn is_online(&self) -> bool {
        *self.online.borrow()
    }

    /// Returns true when the state actually changed.
    pub fn set_online(&self, online: bool) -> bool {
        self.online.send_if_modified(|current| {
            let changed = *current != online;
            *current = online;
            changed
        })
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.online.subscribe()
    }
}

impl Default for Connectivity {
    fn default() -> Self {
        Self::new(true)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedAction {
    pub id: Uuid,
    pub kind: ActionKind,
    pub target_id: String,
    #[serde(default)]
    pub payload: Value,
    pub enqueued_at: DateTime<Utc>,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Sent,
    Queued(Uuid),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayReport {
    pub sent: usize,
    pub failed: usize,
    /// Entries skipped because an earlier entry for the same target failed.
    pub held: usize,
    pub remaining: usize,
}

pub struct OfflineActionQueue {
    api: ApiClient,
    connectivity: Arc<Connectivity>,
    entries: Mutex<Vec<QueuedAction>>,
    store: Option<PathBuf>,
    replaying: tokio::sync::Mutex<()>,
}

impl fmt::Debug for OfflineActionQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OfflineActionQueue")
            .field("online", &self.connectivity.is_online())
            .field("len", &self.len())
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl OfflineActionQueue {
    pub fn new(api: ApiClient, connectivity: Arc<Connectivity>) -> Self {
        Self {
            api,
            connectivity,
            entries: Mutex::new(Vec::new()),
            store: None,
            replaying: tokio::sync::Mutex::new(()),
        }
    }

    /// Backs the queue with a JSON file, loading whatever it already holds.
    pub fn with_store(mut self, path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let loaded = load_entries(&path)?;
        if !loaded.is_empty() {
            tracing::info!(count = loaded.len(), path = %path.display(), "loaded queued actions");
        }
        *lock(&self.entries) = loaded;
        self.store = Some(path);
        Ok(self)
    }

    pub fn connectivity(&self) -> &Arc<Connectivity> {
        &self.connectivity
    }

    pub fn entries(&self) -> Vec<QueuedAction> {
        lock(&self.entries).clone()
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.entries).is_empty()
    }

    /// Offline: queue. Online: call the backend directly, unless the target
    /// still has queued work, which must go first.
    ///
    /// A `Network` failure while nominally online is queued as well; any
    /// other failure is returned.
    pub async fn submit(
        &self,
        kind: ActionKind,
        target_id: &str,
        payload: Value,
    ) -> SyncResult<SubmitOutcome> {
        let target_id = target_id.trim();
        if target_id.is_empty() {
            return Err(SyncError::validation("action target id is empty"));
        }
        if !self.connectivity.is_online() {
            return Ok(SubmitOutcome::Queued(self.enqueue(kind, target_id, payload)));
        }
        if self.has_pending(target_id) {
            tracing::debug!(target_id, %kind, "queueing behind pending actions for target");
            return Ok(SubmitOutcome::Queued(self.enqueue(kind, target_id, payload)));
        }

        match self.api.submit_field_action(kind, target_id, &payload).await {
            Ok(()) => Ok(SubmitOutcome::Sent),
            Err(err) if err.is_network() => {
                tracing::warn!(target_id, %kind, error = %err, "backend unreachable, queueing action");
                Ok(SubmitOutcome::Queued(self.enqueue(kind, target_id, payload)))
            }
            Err(err) => Err(err),
        }
    }

    fn enqueue(&self, kind: ActionKind, target_id: &str, payload: Value) -> Uuid {
        let action = QueuedAction {
            id: Uuid::new_v4(),
            kind,
            target_id: target_id.to_string(),
            payload,
            enqueued_at: Utc::now(),
            attempts: 0,
            last_error: None,
        };
        let id = action.id;
        tracing::info!(%id, %kind, target_id, "queued field action");
        lock(&self.entries).push(action);
        self.persist();
        id
    }

    fn has_pending(&self, target_id: &str) -> bool {
        lock(&self.entries)
            .iter()
            .any(|action| action.target_id == target_id)
    }

    /// Flushes the queue in enqueue order.
    ///
    /// Successful entries are removed. A failed entry stays, annotated with
    /// the error, and every later entry for the same target is held back. A
    /// `Network` failure ends the pass. Concurrent calls run one at a time.
    pub async fn replay(&self) -> ReplayReport {
        let _running = self.replaying.lock().await;
        let pending = self.entries();
        let mut report = ReplayReport::default();
        let mut blocked: HashSet<String> = HashSet::new();

        for action in pending {
            if blocked.contains(&action.target_id) {
                report.held += 1;
                continue;
            }
            match self
                .api
                .submit_field_action(action.kind, &action.target_id, &action.payload)
                .await
            {
                Ok(()) => {
                    tracing::debug!(id = %action.id, kind = %action.kind, target_id = %action.target_id, "replayed action");
                    self.remove(action.id);
                    report.sent += 1;
                }
                Err(err) => {
                    tracing::warn!(id = %action.id, kind = %action.kind, error = %err, "replay failed");
                    self.annotate(action.id, &err);
                    report.failed += 1;
                    if err.is_network() {
                        break;
                    }
                    blocked.insert(action.target_id);
                }
            }
        }

        report.remaining = self.len();
        report
    }

    fn remove(&self, id: Uuid) {
        lock(&self.entries).retain(|action| action.id != id);
        self.persist();
    }

    fn annotate(&self, id: Uuid, err: &SyncError) {
        if let Some(action) = lock(&self.entries).iter_mut().find(|action| action.id == id) {
            action.attempts += 1;
            action.last_error = Some(err.to_string());
        }
        self.persist();
    }

    /// Store failures are logged; the in-memory queue stays authoritative.
    fn persist(&self) {
        let Some(path) = self.store.as_deref() else {
            return;
        };
        let entries = self.entries();
        if let Err(err) = save_entries(path, &entries) {
            tracing::warn!(error = %format!("{err:#}"), "failed to persist offline queue");
        }
    }

    /// Replays now if online with work pending, then on every offline to
    /// online transition. Runs until aborted.
    pub fn spawn_replay_on_reconnect(self: &Arc<Self>) -> JoinHandle<()> {
        let queue = Arc::clone(self);
        let mut online = self.connectivity.subscribe();
        tokio::spawn(async move {
            let mut was_online = *online.borrow_and_update();
            if was_online && !queue.is_empty() {
                let report = queue.replay().await;
                tracing::info!(?report, "replayed queued actions");
            }
            while online.changed().await.is_ok() {
                let now_online = *online.borrow_and_update();
                if now_online && !was_online {
                    let report = queue.replay().await;
                    tracing::info!(?report, "replayed queued actions after reconnect");
                }
                was_online = now_online;
            }
        })
    }
}

fn load_entries(path: &Path) -> Result<Vec<QueuedAction>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let raw = fs::read_to_string(path)
        .with_context(|| format!("read offline queue {}", path.display()))?;
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(&raw).with_context(|| format!("parse offline queue {}", path.display()))
}

fn save_entries(path: &Path, entries: &[QueuedAction]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create offline queue dir {}", parent.display()))?;
    }
    let tmp = path.with_extension("json.tmp");
    let body = serde_json::to_vec_pretty(entries).context("serialize offline queue")?;
    fs::write(&tmp, body).with_context(|| format!("write queue temp file {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| {
        format!(
            "persist offline queue from {} to {}",
            tmp.display(),
            path.display()
        )
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tempfile::tempdir;

    use super::*;

    fn offline_queue() -> OfflineActionQueue {
        let api = ApiClient::new("http://127.0.0.1:9", "t".to_string(), None).unwrap();
        OfflineActionQueue::new(api, Arc::new(Connectivity::new(false)))
    }

    #[test]
    fn test_action_kind_parsing() {
        assert_eq!("assign_self".parse::<ActionKind>().unwrap(), ActionKind::AssignSelf);
        assert_eq!("mark-arrived".parse::<ActionKind>().unwrap(), ActionKind::MarkArrived);
        assert_eq!("evidence".parse::<ActionKind>().unwrap(), ActionKind::UploadEvidence);
        assert_eq!("CLOSE".parse::<ActionKind>().unwrap(), ActionKind::Close);
        assert!("reopen".parse::<ActionKind>().is_err());
    }

    #[test]
    fn test_connectivity_reports_changes_only() {
        let connectivity = Connectivity::new(true);
        assert!(!connectivity.set_online(true));
        assert!(connectivity.set_online(false));
        assert!(!connectivity.is_online());
    }

    #[tokio::test]
    async fn test_offline_submit_appends_in_order() {
        let queue = offline_queue();
        queue.submit(ActionKind::AssignSelf, "c1", Value::Null).await.unwrap();
        queue
            .submit(ActionKind::MarkArrived, "c1", json!({"lat": -34.6}))
            .await
            .unwrap();

        let kinds: Vec<_> = queue.entries().iter().map(|a| a.kind).collect();
        assert_eq!(kinds, vec![ActionKind::AssignSelf, ActionKind::MarkArrived]);
        assert_eq!(queue.entries()[1].payload["lat"], json!(-34.6));
    }

    #[tokio::test]
    async fn test_blank_target_is_rejected() {
        let queue = offline_queue();
        let err = queue.submit(ActionKind::Close, "  ", Value::Null).await.unwrap_err();
        assert!(err.is_validation());
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_store_survives_restart() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("queue").join("offline_queue.json");

        let queue = offline_queue().with_store(&path).unwrap();
        queue.submit(ActionKind::Close, "c9", Value::Null).await.unwrap();
        assert!(path.exists());

        let reloaded = offline_queue().with_store(&path).unwrap();
        let entries = reloaded.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, ActionKind::Close);
        assert_eq!(entries[0].target_id, "c9");
    }

    #[test]
    fn test_corrupt_store_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("offline_queue.json");
        fs::write(&path, "not json").unwrap();
        assert!(offline_queue().with_store(&path).is_err());
    }
}
