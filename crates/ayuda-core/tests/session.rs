//! Polling lifecycle and session teardown.

mod fixtures;

use std::sync::Arc;
use std::time::Duration;

use ayuda_core::chat_view::ChatView;
use ayuda_core::config::{Config, SyncConfig};
use ayuda_core::conversations::{ConversationListView, ListState};
use ayuda_core::messages::MessagesState;
use ayuda_core::session::{Session, SessionContext};
use fixtures::{
    api_client, can_bind_localhost, chat_json, context_with, json_response, message_json,
    page_json, received_paths, wait_until,
};
use serde_json::json;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fast_sync() -> SyncConfig {
    SyncConfig {
        poll_interval_ms: 100,
        ..SyncConfig::default()
    }
}

async fn list_requests(server: &MockServer) -> usize {
    received_paths(server)
        .await
        .iter()
        .filter(|line| line.as_str() == "GET /whatsapp/chats")
        .count()
}

#[tokio::test]
async fn test_polling_refreshes_list_until_stopped() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/whatsapp/chats"))
        .respond_with(json_response(&json!([chat_json("a", "A", 1)])))
        .mount(&server)
        .await;

    let mut session = Session::with_client(api_client(&server.uri()), fast_sync());
    assert!(!session.is_polling());
    session.start_polling();
    assert!(session.is_polling());

    let ctx = Arc::clone(session.context());
    assert!(wait_until(|| ctx.list_cache().get().is_some()).await);

    tokio::time::sleep(Duration::from_millis(350)).await;
    assert!(list_requests(&server).await >= 2);

    session.stop_polling();
    assert!(!session.is_polling());
    ctx.settle().await;
    let after_stop = list_requests(&server).await;
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(list_requests(&server).await, after_stop);
}

#[tokio::test]
async fn test_logout_clears_every_cache() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/whatsapp/chats"))
        .respond_with(json_response(&json!([chat_json("a", "A", 1)])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/whatsapp/chats/[^/]+/messages$"))
        .respond_with(json_response(&page_json(vec![message_json(
            "m1",
            "a",
            "hola",
            "2026-03-01T10:00:00Z",
        )])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path_regex(r"^/whatsapp/chats/[^/]+/read$"))
        .respond_with(json_response(&json!({ "ok": true })))
        .mount(&server)
        .await;

    let mut session = Session::with_client(api_client(&server.uri()), fast_sync());
    session.start_polling();
    let ctx = Arc::clone(session.context());
    assert!(wait_until(|| ctx.list_cache().get().is_some()).await);

    let view = ChatView::new(Arc::clone(&ctx));
    assert_eq!(view.reconcile_selection().await.as_deref(), Some("a"));
    assert!(ctx.message_cache().contains("a"));

    let mut ended = ctx.subscribe_list();
    session.logout();
    assert!(!ctx.is_active());
    assert!(ctx.list_cache().get().is_none());
    assert!(ctx.message_cache().is_empty());
    assert_eq!(ctx.remembered().get(), None);
    assert!(ended.has_changed().unwrap());

    // Nothing repopulates the caches once the session is gone.
    tokio::time::sleep(Duration::from_millis(300)).await;
    ctx.settle().await;
    assert!(ctx.list_cache().get().is_none());
    assert!(!session.is_polling());
}

#[tokio::test]
async fn test_message_cache_capacity_holds_across_fetches() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/whatsapp/chats/[^/]+/messages$"))
        .respond_with(json_response(&page_json(Vec::new())))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path_regex(r"^/whatsapp/chats/[^/]+/read$"))
        .respond_with(json_response(&json!({ "ok": true })))
        .mount(&server)
        .await;

    let ctx = context_with(
        &server,
        SyncConfig {
            message_cache_capacity: 3,
            ..SyncConfig::default()
        },
    );
    let view = ChatView::new(Arc::clone(&ctx));
    for chat in ["c1", "c2", "c3", "c4"] {
        view.select_chat(chat).await;
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    assert_eq!(ctx.message_cache().len(), 3);
    assert!(!ctx.message_cache().contains("c1"));
    assert!(ctx.message_cache().contains("c4"));
}

#[test]
fn test_login_requires_token() {
    let mut config = Config::default();
    config.api.token = None;
    // SAFETY: no other test in this binary reads the process environment.
    unsafe { std::env::remove_var("AYUDA_TOKEN") };
    let err = Session::login(&config).unwrap_err();
    assert!(err.is_validation());
}

#[tokio::test]
async fn test_rejected_token_ends_session_and_polling() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/whatsapp/chats"))
        .respond_with(json_response(&json!([chat_json("a", "A", 1)])))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/whatsapp/chats"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "error": "token expired" })))
        .mount(&server)
        .await;

    let mut session = Session::with_client(api_client(&server.uri()), fast_sync());
    session.start_polling();
    let ctx = Arc::clone(session.context());

    assert!(wait_until(|| !ctx.is_active()).await);
    assert!(ctx.list_cache().get().is_none());
    assert!(wait_until(|| !session.is_polling()).await);
}

#[tokio::test]
async fn test_rejected_token_on_any_request_ends_session() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/whatsapp/chats"))
        .respond_with(json_response(&json!([chat_json("a", "A", 1)])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/whatsapp/chats/[^/]+/messages$"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "error": "token expired" })))
        .mount(&server)
        .await;

    let ctx = context_with(&server, SyncConfig::default());
    let list = ConversationListView::new(Arc::clone(&ctx));
    assert!(matches!(list.mount().await, ListState::Ready(_)));

    let view = ChatView::new(Arc::clone(&ctx));
    view.select_chat("a").await;
    match view.messages() {
        MessagesState::Failed(err) => assert!(err.is_unauthorized()),
        other => panic!("expected failure, got {other:?}"),
    }
    assert!(!ctx.is_active());
    assert!(ctx.list_cache().get().is_none());
}

#[tokio::test]
async fn test_concurrent_settle_calls_both_finish() {
    let ctx = SessionContext::new(api_client("http://127.0.0.1:9"), SyncConfig::default());
    ctx.spawn(async {
        tokio::time::sleep(Duration::from_millis(50)).await;
    });

    let settled = tokio::time::timeout(Duration::from_secs(2), async {
        tokio::join!(ctx.settle(), ctx.settle());
    })
    .await;
    assert!(settled.is_ok());
}
