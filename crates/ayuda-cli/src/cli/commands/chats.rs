//! Conversation list command.

use std::sync::Arc;

use anyhow::{Result, bail};
use ayuda_core::config::Config;
use ayuda_core::conversations::{ConversationListView, ListState};
use ayuda_core::model::ConversationSummary;
use ayuda_core::session::Session;

pub async fn list(config: &Config) -> Result<()> {
    let session = Session::login(config)?;
    let view = ConversationListView::new(Arc::clone(session.context()));
    match view.mount().await {
        ListState::Ready(list) => {
            for summary in &list {
                println!("{}", format_row(summary));
            }
        }
        ListState::Empty => println!("No conversations."),
        ListState::Failed(err) => bail!("could not load conversations: {err}"),
        ListState::Loading => bail!("could not load conversations: session ended"),
    }
    Ok(())
}

/// `unread  label  id  updated`, unread left blank when zero.
pub(super) fn format_row(summary: &ConversationSummary) -> String {
    let unread = if summary.unread_count > 0 {
        summary.unread_count.to_string()
    } else {
        String::new()
    };
    let mut flags = String::new();
    if summary.is_group {
        flags.push_str(" [group]");
    }
    if summary.muted {
        flags.push_str(" [muted]");
    }
    format!(
        "{unread:>4}  {}{flags}  {}  {}",
        summary.label(),
        summary.id,
        summary.updated_at.format("%Y-%m-%d %H:%M")
    )
}
