//! Periodic silent refresh of the conversation list.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::conversations::refresh_list_silently;
use crate::session::SessionContext;

pub struct SyncScheduler;

impl SyncScheduler {
    /// Ticks every `interval` (first tick one interval from now) and issues
    /// a silent list refresh per tick.
    ///
    /// Each refresh runs as its own task so a tick never waits on, or
    /// aborts, a request that is still in flight. The loop exits when the
    /// handle is stopped/dropped or the session ends.
    pub fn start(ctx: Arc<SessionContext>, interval: Duration) -> SchedulerHandle {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let join = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            tracing::debug!(interval = ?interval, "sync scheduler started");

            loop {
                tokio::select! {
                    () = token.cancelled() => break,
                    () = ctx.ended() => {
                        // Session lost: caches are already cleared by `end`.
                        break;
                    }
                    _ = ticker.tick() => {
                        if !ctx.is_active() {
                            ctx.end();
                            break;
                        }
                        let tick_ctx = Arc::clone(&ctx);
                        ctx.spawn(async move {
                            refresh_list_silently(&tick_ctx).await;
                        });
                    }
                }
            }
            tracing::debug!("sync scheduler stopped");
        });

        SchedulerHandle { cancel, join }
    }
}

#[derive(Debug)]
pub struct SchedulerHandle {
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Clears the timer. In-flight refreshes finish on their own.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_running(&self) -> bool {
        !self.join.is_finished()
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
