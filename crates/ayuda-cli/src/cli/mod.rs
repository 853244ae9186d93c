//! CLI entry and dispatch.

use anyhow::{Context, Result};
use ayuda_core::config;
use ayuda_core::offline::ActionKind;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "ayuda")]
#[command(version)]
#[command(about = "Emergency desk WhatsApp sync client")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Lists conversations with their unread counts
    Chats,
    /// Shows the messages of one conversation and marks it read
    Messages {
        #[arg(value_name = "CHAT_ID")]
        chat_id: String,

        /// Messages to fetch (defaults to sync.message_page_size)
        #[arg(short, long)]
        limit: Option<u32>,
    },
    /// Sends a text message to a conversation
    Send {
        #[arg(value_name = "CHAT_ID")]
        chat_id: String,

        #[arg(value_name = "TEXT")]
        text: String,
    },
    /// Polls the conversation list until interrupted
    Watch {
        /// Poll period in milliseconds (defaults to sync.poll_interval_ms)
        #[arg(long, value_name = "MS")]
        interval_ms: Option<u64>,
    },
    /// Manage queued field-agent actions
    Queue {
        #[command(subcommand)]
        command: QueueCommands,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(clap::Subcommand)]
enum QueueCommands {
    /// Lists queued actions in replay order
    List,
    /// Submits an action, queueing it when offline or unreachable
    Add {
        /// assign_self, mark_arrived, upload_evidence or close
        #[arg(value_name = "ACTION")]
        action: ActionKind,

        /// Complaint id
        #[arg(value_name = "TARGET_ID")]
        target_id: String,

        /// JSON payload sent with the action
        #[arg(long, value_name = "JSON")]
        payload: Option<String>,

        /// Queue without trying the backend
        #[arg(long)]
        offline: bool,
    },
    /// Replays queued actions against the backend
    Replay,
}

#[derive(clap::Subcommand)]
enum ConfigCommands {
    /// Show the path to the config file
    Path,
    /// Initialize a default config file (if not present)
    Init,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging();

    // one tokio runtime for everything
    let rt = tokio::runtime::Runtime::new().context("create tokio runtime")?;
    rt.block_on(async move { dispatch(cli).await })
}

/// Logs go to stderr so command output stays scriptable.
fn init_logging() {
    let filter = EnvFilter::try_from_env("AYUDA_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

async fn dispatch(cli: Cli) -> Result<()> {
    let mut config = config::Config::load().context("load config")?;

    match cli.command {
        Commands::Chats => commands::chats::list(&config).await,
        Commands::Messages { chat_id, limit } => {
            if let Some(limit) = limit {
                config.sync.message_page_size = limit;
            }
            commands::messages::show(&config, &chat_id).await
        }
        Commands::Send { chat_id, text } => commands::send::run(&config, &chat_id, &text).await,
        Commands::Watch { interval_ms } => {
            if let Some(interval_ms) = interval_ms {
                config.sync.poll_interval_ms = interval_ms;
            }
            commands::watch::run(&config).await
        }
        Commands::Queue { command } => match command {
            QueueCommands::List => commands::queue::list(&config),
            QueueCommands::Add {
                action,
                target_id,
                payload,
                offline,
            } => commands::queue::add(&config, action, &target_id, payload.as_deref(), offline).await,
            QueueCommands::Replay => commands::queue::replay(&config).await,
        },
        Commands::Config { command } => match command {
            ConfigCommands::Path => {
                commands::config::path();
                Ok(())
            }
            ConfigCommands::Init => commands::config::init(),
        },
    }
}
