//! Field-action queue commands.

use std::sync::Arc;

use anyhow::{Context, Result};
use ayuda_core::api::ApiClient;
use ayuda_core::config::Config;
use ayuda_core::offline::{ActionKind, Connectivity, OfflineActionQueue, SubmitOutcome};
use serde_json::Value;

fn open_queue(config: &Config, online: bool) -> Result<OfflineActionQueue> {
    let api = ApiClient::from_config(&config.api)?;
    let path = config.sync.offline_queue_path();
    OfflineActionQueue::new(api, Arc::new(Connectivity::new(online)))
        .with_store(&path)
        .with_context(|| format!("open offline queue at {}", path.display()))
}

pub fn list(config: &Config) -> Result<()> {
    let queue = open_queue(config, false)?;
    let entries = queue.entries();
    if entries.is_empty() {
        println!("No queued actions.");
        return Ok(());
    }
    for action in entries {
        let mut line = format!(
            "{}  {:<15}  {}  {}",
            action.id,
            action.kind.as_str(),
            action.target_id,
            action.enqueued_at.format("%Y-%m-%d %H:%M:%S")
        );
        if action.attempts > 0 {
            line.push_str(&format!("  attempts={}", action.attempts));
        }
        if let Some(err) = &action.last_error {
            line.push_str(&format!("  last_error={err}"));
        }
        println!("{line}");
    }
    Ok(())
}

pub async fn add(
    config: &Config,
    kind: ActionKind,
    target_id: &str,
    payload: Option<&str>,
    offline: bool,
) -> Result<()> {
    let payload = match payload {
        Some(raw) => serde_json::from_str(raw).context("parse --payload as JSON")?,
        None => Value::Null,
    };
    let queue = open_queue(config, !offline)?;
    let outcome = queue
        .submit(kind, target_id, payload)
        .await
        .with_context(|| format!("could not submit {kind} for {target_id}"))?;
    match outcome {
        SubmitOutcome::Sent => println!("Sent {kind} for {target_id}"),
        SubmitOutcome::Queued(id) => println!("Queued {kind} for {target_id} ({id})"),
    }
    Ok(())
}

pub async fn replay(config: &Config) -> Result<()> {
    let queue = open_queue(config, true)?;
    if queue.is_empty() {
        println!("No queued actions.");
        return Ok(());
    }
    let report = queue.replay().await;
    println!(
        "Replayed {} action(s): {} failed, {} held back, {} remaining",
        report.sent, report.failed, report.held, report.remaining
    );
    Ok(())
}
