//! CLI command handlers.

pub mod chats;
pub mod config;
pub mod messages;
pub mod queue;
pub mod send;
pub mod watch;
