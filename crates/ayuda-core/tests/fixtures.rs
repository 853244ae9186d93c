//! Backend fixtures shared by the integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use ayuda_core::ApiClient;
use ayuda_core::config::SyncConfig;
use ayuda_core::session::SessionContext;
use serde_json::{Value, json};
use wiremock::{MockServer, ResponseTemplate};

pub fn can_bind_localhost() -> bool {
    std::net::TcpListener::bind("127.0.0.1:0").is_ok()
}

pub fn api_client(base_url: &str) -> ApiClient {
    ApiClient::new(base_url, "test-token".to_string(), Some(Duration::from_secs(5)))
        .expect("valid base url")
}

pub fn context(server: &MockServer) -> Arc<SessionContext> {
    context_with(server, SyncConfig::default())
}

pub fn context_with(server: &MockServer, sync: SyncConfig) -> Arc<SessionContext> {
    SessionContext::new(api_client(&server.uri()), sync)
}

/// URI of a server that has already shut down, so every request fails at
/// the transport level.
pub async fn unreachable_uri() -> String {
    let server = MockServer::start().await;
    let uri = server.uri();
    drop(server);
    uri
}

pub fn chat_json(id: &str, name: &str, unread: u32) -> Value {
    json!({
        "id": id,
        "displayName": name,
        "isGroup": false,
        "unreadCount": unread,
        "updatedAt": "2026-03-01T10:00:00Z"
    })
}

pub fn message_json(id: &str, chat_id: &str, body: &str, timestamp: &str) -> Value {
    json!({
        "id": id,
        "chatId": chat_id,
        "body": body,
        "fromMe": false,
        "timestamp": timestamp,
        "type": "chat",
        "hasMedia": false
    })
}

pub fn page_json(messages: Vec<Value>) -> Value {
    json!({ "messages": messages, "hasMore": false })
}

pub fn json_response(body: &Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(body)
}

pub fn ok_response() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "ok": true }))
}

/// Polls `check` for up to two seconds.
pub async fn wait_until(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}

/// Paths of every request the server has seen, in arrival order.
pub async fn received_paths(server: &MockServer) -> Vec<String> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .map(|request| format!("{} {}", request.method, request.url.path()))
        .collect()
}
