//! Conversation sync and caching engine for the ayuda emergency desk
//! (list/message caches, polling, send, read state, offline field actions).

pub mod api;
pub mod cache;
pub mod chat_view;
pub mod config;
pub mod conversations;
pub mod error;
pub mod messages;
pub mod model;
pub mod offline;
pub mod read_state;
pub mod request;
pub mod scheduler;
pub mod selection;
pub mod send;
pub mod session;

pub use api::ApiClient;
pub use chat_view::{ChatView, Notice};
pub use config::Config;
pub use conversations::{ConversationListView, ListState};
pub use error::{SyncError, SyncErrorKind, SyncResult};
pub use messages::MessagesState;
pub use model::{ConversationSummary, Message, MessagePage};
pub use offline::{ActionKind, Connectivity, OfflineActionQueue, SubmitOutcome};
pub use session::{Session, SessionContext};
