//! REST client for the dashboard backend.
//!
//! Only the routes the sync engine consumes are modelled here. Every call is
//! bearer-authenticated and maps failures onto [`SyncError`] kinds:
//! transport problems are `Network`, non-2xx statuses are `Server` and
//! undecodable bodies are `Parse`.

use std::time::Duration;

use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::config::ApiConfig;
use crate::error::{SyncError, SyncResult};
use crate::model::{
    ConversationSummary, Message, MessagePage, normalize_messages, normalize_summaries,
};
use crate::offline::ActionKind;

#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    token: String,
    timeout: Option<Duration>,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url.as_str())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    message: &'a str,
}

impl ApiClient {
    pub fn new(base_url: &str, token: String, timeout: Option<Duration>) -> SyncResult<Self> {
        let base_url = Url::parse(base_url.trim())
            .map_err(|err| SyncError::validation(format!("invalid API base URL: {err}")))?;
        if base_url.cannot_be_a_base() {
            return Err(SyncError::validation(format!(
                "API base URL cannot hold paths: {base_url}"
            )));
        }
        Ok(Self {
            http: reqwest::Client::new(),
            base_url,
            token,
            timeout,
        })
    }

    /// Builds a client from `[api]` config plus its env overrides. A token
    /// is required.
    pub fn from_config(config: &ApiConfig) -> SyncResult<Self> {
        let token = config
            .effective_token()
            .ok_or_else(|| SyncError::validation("api.token or AYUDA_TOKEN is required"))?;
        Self::new(&config.effective_base_url(), token, config.request_timeout())
    }

    /// `GET /whatsapp/chats`
    pub async fn list_chats(&self) -> SyncResult<Vec<ConversationSummary>> {
        let url = self.endpoint(&["whatsapp", "chats"])?;
        let list: Vec<ConversationSummary> = self.fetch_json(self.http.get(url)).await?;
        Ok(normalize_summaries(list))
    }

    /// `GET /whatsapp/chats/{id}`
    pub async fn get_chat(&self, chat_id: &str) -> SyncResult<ConversationSummary> {
        let url = self.endpoint(&["whatsapp", "chats", chat_id])?;
        let mut summary: ConversationSummary = self.fetch_json(self.http.get(url)).await?;
        summary.normalize();
        Ok(summary)
    }

    /// `GET /whatsapp/chats/{id}/messages?limit=N`
    pub async fn list_messages(&self, chat_id: &str, limit: u32) -> SyncResult<MessagePage> {
        let mut url = self.endpoint(&["whatsapp", "chats", chat_id, "messages"])?;
        url.query_pairs_mut().append_pair("limit", &limit.to_string());
        let mut page: MessagePage = self.fetch_json(self.http.get(url)).await?;
        page.normalize();
        Ok(page)
    }

    /// `POST /whatsapp/chats/{id}/messages` with `{ "message": text }`.
    /// Returns the server-confirmed message.
    pub async fn send_message(&self, chat_id: &str, text: &str) -> SyncResult<Message> {
        let url = self.endpoint(&["whatsapp", "chats", chat_id, "messages"])?;
        let request = self.http.post(url).json(&SendMessageRequest { message: text });
        let mut message: Message = self.fetch_json(request).await?;
        if message.chat_id.is_empty() {
            message.chat_id = chat_id.to_string();
        }
        normalize_messages(std::slice::from_mut(&mut message));
        Ok(message)
    }

    /// `POST /whatsapp/chats/{id}/read`
    pub async fn mark_read(&self, chat_id: &str) -> SyncResult<()> {
        let url = self.endpoint(&["whatsapp", "chats", chat_id, "read"])?;
        let (status, body) = self.execute(self.http.post(url)).await?;
        check_acknowledgement(status, &body)
    }

    /// `POST /complaints/{id}/{action}` for field-agent actions.
    pub async fn submit_field_action(
        &self,
        kind: ActionKind,
        target_id: &str,
        payload: &Value,
    ) -> SyncResult<()> {
        let url = self.endpoint(&["complaints", target_id, kind.route()])?;
        let request = if payload.is_null() {
            self.http.post(url)
        } else {
            self.http.post(url).json(payload)
        };
        let (status, body) = self.execute(request).await?;
        check_acknowledgement(status, &body)
    }

    fn endpoint(&self, segments: &[&str]) -> SyncResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| SyncError::validation("API base URL cannot hold paths"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn fetch_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> SyncResult<T> {
        let (_, body) = self.execute(request).await?;
        serde_json::from_str(&body)
            .map_err(|err| SyncError::parse("Failed to decode backend response", err.to_string()))
    }

    async fn execute(&self, request: RequestBuilder) -> SyncResult<(u16, String)> {
        let send = request.bearer_auth(&self.token).send();
        let response = match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, send).await.map_err(|_| {
                SyncError::network(format!(
                    "Request timed out after {} seconds",
                    timeout.as_secs()
                ))
            })?,
            None => send.await,
        }
        .map_err(|err| SyncError {
            details: Some(err.to_string()),
            ..SyncError::network("Backend request failed")
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|err| SyncError {
            details: Some(err.to_string()),
            ..SyncError::network("Failed to read backend response")
        })?;

        if !status.is_success() {
            return Err(SyncError::server(status.as_u16(), &body));
        }
        if status == StatusCode::NO_CONTENT {
            return Ok((status.as_u16(), String::new()));
        }
        Ok((status.as_u16(), body))
    }
}

/// Minimal `{ ok: bool }` envelope some backends return for mutations.
#[derive(Debug, Deserialize)]
struct Acknowledgement {
    #[serde(default = "default_true")]
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

fn default_true() -> bool {
    true
}

/// Treats an explicit `{ "ok": false }` body on a 2xx as a server error.
fn check_acknowledgement(status: u16, body: &str) -> SyncResult<()> {
    match serde_json::from_str::<Acknowledgement>(body) {
        Ok(Acknowledgement { ok: false, error }) => Err(SyncError::server(
            status,
            &error.unwrap_or_else(|| "request rejected".to_string()),
        )),
        _ => Ok(()),
    }
}
