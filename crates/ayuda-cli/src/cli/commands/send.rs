//! Send command.

use std::sync::Arc;

use anyhow::{Context, Result};
use ayuda_core::config::Config;
use ayuda_core::send::OptimisticSendPipeline;
use ayuda_core::session::Session;

pub async fn run(config: &Config, chat_id: &str, text: &str) -> Result<()> {
    let session = Session::login(config)?;
    let ctx = Arc::clone(session.context());
    let message = OptimisticSendPipeline::new(Arc::clone(&ctx))
        .send(Some(chat_id), text)
        .await
        .with_context(|| format!("could not send message to {chat_id}"))?;
    ctx.settle().await;

    println!(
        "Sent {} to {} at {}",
        message.id,
        message.chat_id,
        message.timestamp.format("%Y-%m-%d %H:%M:%S")
    );
    Ok(())
}
