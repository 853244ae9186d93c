//! Watch command: keeps the list fresh until ctrl-c.

use std::sync::Arc;

use anyhow::{Result, bail};
use ayuda_core::config::Config;
use ayuda_core::conversations::{ConversationListView, ListState};
use ayuda_core::model::ConversationSummary;
use ayuda_core::session::Session;

use super::chats::format_row;

pub async fn run(config: &Config) -> Result<()> {
    let mut session = Session::login(config)?;
    let ctx = Arc::clone(session.context());
    let view = ConversationListView::new(Arc::clone(&ctx));

    let mut versions = ctx.subscribe_list();
    let state = view.mount().await;
    if let ListState::Failed(err) = &state {
        bail!("could not load conversations: {err}");
    }
    print_state(&state);
    versions.mark_unchanged();

    session.start_polling();
    eprintln!(
        "Watching conversations every {} ms. Press ctrl-c to stop.",
        config.sync.poll_interval_ms
    );

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                eprintln!("Stopping.");
                break;
            }
            () = ctx.ended() => {
                eprintln!("Session ended.");
                break;
            }
            changed = versions.changed() => {
                if changed.is_err() {
                    break;
                }
                versions.mark_unchanged();
                print_state(&view.state());
            }
        }
    }

    view.unmount();
    session.logout();
    Ok(())
}

/// Widened so clamped per-chat counts cannot overflow the total.
fn total_unread(list: &[ConversationSummary]) -> u64 {
    list.iter().map(|summary| u64::from(summary.unread_count)).sum()
}

fn print_state(state: &ListState) {
    let now = chrono::Local::now().format("%H:%M:%S");
    match state {
        ListState::Ready(list) => {
            println!(
                "[{now}] {} conversations, {} unread",
                list.len(),
                total_unread(list)
            );
            for summary in list.iter().filter(|summary| summary.unread_count > 0) {
                println!("{}", format_row(summary));
            }
        }
        ListState::Empty => println!("[{now}] No conversations."),
        ListState::Loading | ListState::Failed(_) => {}
    }
}
