use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Categories of sync errors for consistent handling across load paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncErrorKind {
    /// Connection or transport failure (includes request timeouts)
    Network,
    /// Non-success HTTP status from the backend
    Server,
    /// Malformed JSON body
    Parse,
    /// Rejected locally before any request was issued
    Validation,
}

impl fmt::Display for SyncErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncErrorKind::Network => write!(f, "network"),
            SyncErrorKind::Server => write!(f, "server"),
            SyncErrorKind::Parse => write!(f, "parse"),
            SyncErrorKind::Validation => write!(f, "validation"),
        }
    }
}

/// Structured error from the sync engine with kind and details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncError {
    pub kind: SyncErrorKind,
    /// One-line summary suitable for display
    pub message: String,
    /// Optional raw payload (response body, serde error)
    pub details: Option<String>,
    /// HTTP status for `Server` errors
    pub status: Option<u16>,
}

impl SyncError {
    pub fn new(kind: SyncErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: None,
            status: None,
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(SyncErrorKind::Network, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(SyncErrorKind::Validation, message)
    }

    pub fn parse(message: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            details: Some(details.into()),
            ..Self::new(SyncErrorKind::Parse, message)
        }
    }

    /// Creates a server error from a status code and response body.
    ///
    /// JSON bodies are searched for `message`, `error` or `error.message`;
    /// anything else is treated as a plain-text reason.
    pub fn server(status: u16, body: &str) -> Self {
        let trimmed = body.trim();
        let reason = serde_json::from_str::<Value>(trimmed)
            .ok()
            .and_then(|json| extract_json_reason(&json))
            .or_else(|| (!trimmed.is_empty() && !trimmed.starts_with('{')).then(|| trimmed.to_string()));

        let message = match reason {
            Some(reason) => format!("HTTP {status}: {reason}"),
            None => format!("HTTP {status}"),
        };
        Self {
            kind: SyncErrorKind::Server,
            message,
            details: (!trimmed.is_empty()).then(|| trimmed.to_string()),
            status: Some(status),
        }
    }

    pub fn is_network(&self) -> bool {
        self.kind == SyncErrorKind::Network
    }

    pub fn is_validation(&self) -> bool {
        self.kind == SyncErrorKind::Validation
    }

    /// The backend no longer accepts the session token.
    pub fn is_unauthorized(&self) -> bool {
        self.kind == SyncErrorKind::Server && self.status == Some(401)
    }
}

fn extract_json_reason(json: &Value) -> Option<String> {
    if let Some(msg) = json.get("message").and_then(Value::as_str) {
        return Some(msg.to_string());
    }
    match json.get("error") {
        Some(Value::String(msg)) => Some(msg.clone()),
        Some(obj) => obj
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string),
        None => None,
    }
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for SyncError {}

pub type SyncResult<T> = std::result::Result<T, SyncError>;
