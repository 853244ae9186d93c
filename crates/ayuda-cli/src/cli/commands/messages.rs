//! Message listing command.

use std::sync::Arc;

use anyhow::{Result, bail};
use ayuda_core::chat_view::ChatView;
use ayuda_core::config::Config;
use ayuda_core::conversations::fetch_chat;
use ayuda_core::messages::MessagesState;
use ayuda_core::model::Message;
use ayuda_core::session::Session;

pub async fn show(config: &Config, chat_id: &str) -> Result<()> {
    let session = Session::login(config)?;
    let ctx = Arc::clone(session.context());
    match fetch_chat(&ctx, chat_id).await {
        Ok(summary) => println!("== {} ({}) ==", summary.label(), summary.id),
        Err(err) => tracing::debug!(chat_id, error = %err, "chat summary unavailable"),
    }

    let view = ChatView::with_forced(ctx, chat_id);
    view.reconcile_selection().await;

    match view.messages() {
        MessagesState::Ready(messages) => {
            for message in &messages {
                println!("{}", format_message(message));
            }
        }
        MessagesState::Empty => println!("No messages."),
        MessagesState::Failed(err) => bail!("could not load messages for {chat_id}: {err}"),
        MessagesState::Idle | MessagesState::Loading => {
            bail!("could not load messages for {chat_id}: session ended")
        }
    }

    // Let the mark-read request finish before the runtime goes away.
    view.settle().await;
    Ok(())
}

fn format_message(message: &Message) -> String {
    let sender = if message.from_me {
        "me"
    } else {
        message
            .sender_name
            .as_deref()
            .or(message.sender_id.as_deref())
            .unwrap_or("them")
    };
    let mut text = message.body.clone();
    if let Some(media) = &message.media {
        let name = media.file_name.as_deref().unwrap_or(&media.mimetype);
        if !text.is_empty() {
            text.push(' ');
        }
        text.push_str(&format!("[media: {name}]"));
    }
    format!(
        "[{}] {sender}: {text}",
        message.timestamp.format("%Y-%m-%d %H:%M")
    )
}
