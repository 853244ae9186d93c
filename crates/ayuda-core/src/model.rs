//! Wire types for the WhatsApp chat surface.
//!
//! Everything here is decoded from the backend's camelCase JSON and
//! normalised on ingress, so the caches only ever hold well-formed values.

use std::collections::HashSet;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Summary of a chat thread as shown in the conversation list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub id: String,
    #[serde(default, alias = "name")]
    pub display_name: String,
    #[serde(default)]
    pub number: Option<String>,
    #[serde(default)]
    pub is_group: bool,
    #[serde(default, deserialize_with = "deserialize_unread_count")]
    pub unread_count: u32,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub muted: bool,
    #[serde(default)]
    pub last_message: Option<Message>,
    #[serde(default = "Utc::now", deserialize_with = "deserialize_timestamp")]
    pub updated_at: DateTime<Utc>,
}

impl ConversationSummary {
    /// Label for display: the name, else the number, else the raw id.
    pub fn label(&self) -> &str {
        if !self.display_name.trim().is_empty() {
            &self.display_name
        } else if let Some(number) = self.number.as_deref().filter(|n| !n.is_empty()) {
            number
        } else {
            &self.id
        }
    }

    pub fn normalize(&mut self) {
        if let Some(message) = self.last_message.as_mut() {
            message.normalize();
        }
    }
}

/// A single chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    #[serde(default)]
    pub chat_id: String,
    /// Empty for media-only messages.
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub from_me: bool,
    #[serde(default)]
    pub sender_id: Option<String>,
    #[serde(default)]
    pub sender_name: Option<String>,
    #[serde(default = "Utc::now", deserialize_with = "deserialize_timestamp")]
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type", default = "default_message_kind")]
    pub kind: String,
    #[serde(default)]
    pub has_media: bool,
    #[serde(default)]
    pub ack: Option<i32>,
    #[serde(default)]
    pub media: Option<MediaAttachment>,
}

fn default_message_kind() -> String {
    "chat".to_string()
}

impl Message {
    /// Enforces `media` present only when `has_media` is set and the
    /// attachment itself is usable.
    pub fn normalize(&mut self) {
        if !self.has_media {
            if self.media.take().is_some() {
                tracing::debug!(message_id = %self.id, "dropping media on message without hasMedia");
            }
            return;
        }
        if let Some(media) = self.media.as_ref()
            && !media.is_valid()
        {
            tracing::warn!(message_id = %self.id, "dropping malformed media attachment");
            self.media = None;
        }
    }
}

/// Inline media payload (base64 encoded).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaAttachment {
    #[serde(default)]
    pub mimetype: String,
    #[serde(default)]
    pub data: String,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub file_size: Option<u64>,
    #[serde(default)]
    pub duration_seconds: Option<u32>,
}

impl MediaAttachment {
    pub fn is_valid(&self) -> bool {
        !self.mimetype.trim().is_empty() && !self.data.is_empty() && self.decode().is_some()
    }

    pub fn decode(&self) -> Option<Vec<u8>> {
        STANDARD.decode(self.data.as_bytes()).ok()
    }
}

/// Response of `GET /whatsapp/chats/{id}/messages`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePage {
    #[serde(default)]
    pub chat: Option<ConversationSummary>,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub next_cursor: Option<String>,
    #[serde(default)]
    pub has_more: bool,
}

impl MessagePage {
    /// Normalises every message and restores ascending timestamp order.
    pub fn normalize(&mut self) {
        if let Some(chat) = self.chat.as_mut() {
            chat.normalize();
        }
        normalize_messages(&mut self.messages);
    }
}

/// Stable-sorts by timestamp after per-message validation.
pub fn normalize_messages(messages: &mut [Message]) {
    for message in messages.iter_mut() {
        message.normalize();
    }
    messages.sort_by_key(|message| message.timestamp);
}

/// Keeps the first occurrence of each chat id.
pub fn normalize_summaries(list: Vec<ConversationSummary>) -> Vec<ConversationSummary> {
    let mut seen = HashSet::new();
    list.into_iter()
        .filter(|summary| {
            let fresh = seen.insert(summary.id.clone());
            if !fresh {
                tracing::debug!(chat_id = %summary.id, "dropping duplicate chat in list");
            }
            fresh
        })
        .map(|mut summary| {
            summary.normalize();
            summary
        })
        .collect()
}

/// Parses an ISO-8601 timestamp (or epoch number), defaulting to now.
pub fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return parsed.with_timezone(&Utc);
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Utc.from_utc_datetime(&naive);
        }
    }
    if let Ok(epoch) = raw.parse::<i64>() {
        return from_epoch(epoch);
    }
    tracing::debug!(raw, "unparsable timestamp, defaulting to now");
    Utc::now()
}

/// Seconds or milliseconds since the epoch (values past 1e12 are millis).
fn from_epoch(value: i64) -> DateTime<Utc> {
    let parsed = if value.abs() >= 1_000_000_000_000 {
        Utc.timestamp_millis_opt(value).single()
    } else {
        Utc.timestamp_opt(value, 0).single()
    };
    parsed.unwrap_or_else(Utc::now)
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::String(raw) => parse_timestamp(&raw),
        Value::Number(number) => number.as_i64().map_or_else(Utc::now, from_epoch),
        _ => Utc::now(),
    })
}

fn deserialize_unread_count<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let count = match value {
        Value::Number(number) => number.as_i64().unwrap_or(0),
        Value::String(raw) => raw.trim().parse::<i64>().unwrap_or(0),
        _ => 0,
    };
    Ok(u32::try_from(count.max(0)).unwrap_or(u32::MAX))
}
