//! End-to-end command runs against a mocked dashboard backend.

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn can_bind_localhost() -> bool {
    std::net::TcpListener::bind("127.0.0.1:0").is_ok()
}

/// Creates a temp AYUDA_HOME directory for test isolation.
fn temp_ayuda_home() -> TempDir {
    TempDir::new().expect("create temp ayuda home")
}

fn ayuda(home: &TempDir, server: &MockServer) -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("ayuda");
    cmd.env("AYUDA_HOME", home.path())
        .env("AYUDA_API_URL", server.uri())
        .env("AYUDA_TOKEN", "test-token")
        .env_remove("AYUDA_LOG");
    cmd
}

#[tokio::test]
async fn test_chats_lists_conversations() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let home = temp_ayuda_home();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/whatsapp/chats"))
        .and(header("authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": "549111234", "displayName": "Vecina Gómez", "unreadCount": 3, "updatedAt": "2026-03-01T10:00:00Z" },
            { "id": "549115678", "name": "", "number": "549115678", "unreadCount": 0, "updatedAt": "2026-03-01T09:00:00Z" }
        ])))
        .expect(1)
        .mount(&server)
        .await;

    ayuda(&home, &server)
        .arg("chats")
        .assert()
        .success()
        .stdout(predicate::str::contains("Vecina Gómez"))
        .stdout(predicate::str::contains("549111234"))
        .stdout(predicate::str::contains("549115678"));
}

#[tokio::test]
async fn test_chats_empty_and_failure() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let home = temp_ayuda_home();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/whatsapp/chats"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/whatsapp/chats"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .mount(&server)
        .await;

    ayuda(&home, &server)
        .arg("chats")
        .assert()
        .success()
        .stdout(predicate::str::contains("No conversations."));

    ayuda(&home, &server)
        .arg("chats")
        .assert()
        .failure()
        .stderr(predicate::str::contains("could not load conversations"))
        .stderr(predicate::str::contains("HTTP 502"));
}

#[tokio::test]
async fn test_messages_prints_thread_and_marks_read() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let home = temp_ayuda_home();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/whatsapp/chats/549111234/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "messages": [
                { "id": "m2", "chatId": "549111234", "body": "gracias", "fromMe": true, "timestamp": "2026-03-01T10:05:00Z" },
                { "id": "m1", "chatId": "549111234", "body": "hay un árbol caído", "fromMe": false, "senderName": "Vecina", "timestamp": "2026-03-01T10:00:00Z" }
            ]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/whatsapp/chats/549111234"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "549111234",
            "displayName": "Vecina Gómez",
            "unreadCount": 2
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/whatsapp/chats/549111234/read"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
        .expect(1)
        .mount(&server)
        .await;

    ayuda(&home, &server)
        .args(["messages", "549111234"])
        .assert()
        .success()
        .stdout(predicate::str::is_match(r"(?s)== Vecina Gómez \(549111234\) ==.*Vecina: hay un árbol caído.*me: gracias").unwrap());
}

#[tokio::test]
async fn test_messages_empty_chat() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let home = temp_ayuda_home();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/whatsapp/chats/quiet/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "messages": [] })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/whatsapp/chats/quiet/read"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    ayuda(&home, &server)
        .args(["messages", "quiet"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No messages."));
}

#[tokio::test]
async fn test_send_posts_trimmed_text() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let home = temp_ayuda_home();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/whatsapp/chats/549111234/messages"))
        .and(body_json(json!({ "message": "hola" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "m1",
            "chatId": "549111234",
            "body": "hola",
            "fromMe": true,
            "timestamp": "2026-03-01T12:00:00Z"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/whatsapp/chats"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;
    // The chat had no cached page, so the command reloads it after sending.
    Mock::given(method("GET"))
        .and(path("/whatsapp/chats/549111234/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "messages": [] })))
        .expect(1)
        .mount(&server)
        .await;

    ayuda(&home, &server)
        .args(["send", "549111234", "  hola  "])
        .assert()
        .success()
        .stdout(predicate::str::contains("Sent m1 to 549111234"));
}

#[tokio::test]
async fn test_send_failure_exits_non_zero() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let home = temp_ayuda_home();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/whatsapp/chats/549111234/messages"))
        .respond_with(
            ResponseTemplate::new(500).set_body_json(json!({ "error": "whatsapp client not ready" })),
        )
        .mount(&server)
        .await;

    ayuda(&home, &server)
        .args(["send", "549111234", "hola"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("could not send message"))
        .stderr(predicate::str::contains("whatsapp client not ready"));
}

#[tokio::test]
async fn test_queue_add_offline_then_replay() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let home = temp_ayuda_home();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/complaints/c1/arrived"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
        .expect(1)
        .mount(&server)
        .await;

    ayuda(&home, &server)
        .args(["queue", "add", "mark-arrived", "c1", "--offline", "--payload", r#"{"lat":-34.6}"#])
        .assert()
        .success()
        .stdout(predicate::str::contains("Queued mark_arrived for c1"));

    ayuda(&home, &server)
        .args(["queue", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("mark_arrived"))
        .stdout(predicate::str::contains("c1"));

    ayuda(&home, &server)
        .args(["queue", "replay"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Replayed 1 action(s)"))
        .stdout(predicate::str::contains("0 remaining"));

    ayuda(&home, &server)
        .args(["queue", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No queued actions."));
}
