//! LingrClient against an in-process fake of the Lingr API.
//!
//! Tests cover:
//! - session creation (success, rejected credentials)
//! - calls made before a session exists
//! - observe: `mine` marking, counter passthrough, unknown events
//! - HTTP failures classified as transient
//! - say/get_archives request parameters

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::extract::{Form, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use lingr_sdk::client::{ClientConfig, LingrClient};
use lingr_sdk::error::LingrError;
use lingr_sdk::types::Event;
use serde_json::json;

type Params = HashMap<String, String>;

#[derive(Default)]
struct Recorded {
    calls: Mutex<Vec<(String, Params)>>,
}

impl Recorded {
    fn push(&self, path: &str, params: Params) {
        self.calls.lock().unwrap().push((path.to_string(), params));
    }

    fn last(&self, path: &str) -> Option<Params> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(p, _)| p == path)
            .map(|(_, params)| params.clone())
    }
}

async fn session_create(State(rec): State<Arc<Recorded>>, Form(p): Form<Params>) -> Json<serde_json::Value> {
    rec.push("session/create", p.clone());
    if p.get("password").map(String::as_str) == Some("pw") {
        Json(json!({"status": "ok", "session": "T1", "nickname": "Alice", "public_id": "pub-alice"}))
    } else {
        Json(json!({"status": "error", "code": "invalid_user_credentials", "detail": "bad password"}))
    }
}

async fn observe(State(rec): State<Arc<Recorded>>, Query(p): Query<Params>) -> Json<serde_json::Value> {
    rec.push("event/observe", p);
    Json(json!({
        "status": "ok",
        "counter": 17,
        "events": [
            {"event_id": 1, "message": {"id": "m1", "room": "r1", "public_session_id": "pub-alice", "speaker_id": "alice", "text": "mine"}},
            {"event_id": 2, "message": {"id": "m2", "room": "r1", "public_session_id": "pub-bob", "speaker_id": "bob", "text": "theirs"}},
            {"event_id": 3, "unknown": {"room": "r1"}},
            {"event_id": 4, "presence": {"room": "r1", "username": "bob", "status": "online"}}
        ]
    }))
}

async fn say(State(rec): State<Arc<Recorded>>, Query(p): Query<Params>) -> Json<serde_json::Value> {
    rec.push("room/say", p);
    Json(json!({"status": "ok", "message": {}}))
}

async fn archives(State(rec): State<Arc<Recorded>>, Query(p): Query<Params>) -> Json<serde_json::Value> {
    rec.push("room/get_archives", p);
    Json(json!({"status": "ok", "messages": [{"id": "a1", "text": "old"}, {"id": "a2", "text": "older"}]}))
}

async fn broken() -> impl IntoResponse {
    (StatusCode::GATEWAY_TIMEOUT, "upstream timeout")
}

async fn start_fake() -> (String, Arc<Recorded>) {
    let rec = Arc::new(Recorded::default());
    let app = Router::new()
        .route("/api/session/create", post(session_create))
        .route("/api/event/observe", get(observe))
        .route("/api/room/say", get(say))
        .route("/api/room/get_archives", get(archives))
        .route("/api/room/subscribe", get(broken))
        .with_state(Arc::clone(&rec));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}/api/"), rec)
}

fn client(endpoint: &str, password: &str) -> LingrClient {
    LingrClient::new(ClientConfig {
        endpoint: endpoint.to_string(),
        user: "alice".to_string(),
        password: password.to_string(),
        api_key: "KEY".to_string(),
        ..Default::default()
    })
    .unwrap()
}

#[tokio::test]
async fn create_session_stores_identity() {
    let (endpoint, rec) = start_fake().await;
    let mut c = client(&endpoint, "pw");
    let info = c.create_session().await.unwrap().clone();
    assert_eq!(info.session, "T1");
    assert_eq!(info.nickname, "Alice");
    assert_eq!(c.public_id(), Some("pub-alice"));

    let sent = rec.last("session/create").unwrap();
    assert_eq!(sent["user"], "alice");
    assert_eq!(sent["api_key"], "KEY");
}

#[tokio::test]
async fn rejected_credentials_are_status_errors() {
    let (endpoint, _rec) = start_fake().await;
    let mut c = client(&endpoint, "wrong");
    let err = c.create_session().await.unwrap_err();
    match err {
        LingrError::Status { ref status, ref detail } => {
            assert_eq!(status, "error");
            assert_eq!(detail, "bad password");
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert!(!err.is_transient());
    assert!(c.session().is_none());
}

#[tokio::test]
async fn calls_without_session_fail_fast() {
    let (endpoint, rec) = start_fake().await;
    let c = client(&endpoint, "pw");
    assert!(matches!(c.observe(0).await, Err(LingrError::NoSession)));
    assert!(matches!(c.say("r1", "hi").await, Err(LingrError::NoSession)));
    assert!(rec.last("event/observe").is_none());
}

#[tokio::test]
async fn observe_marks_own_messages_and_skips_unknown_events() {
    let (endpoint, rec) = start_fake().await;
    let mut c = client(&endpoint, "pw");
    c.create_session().await.unwrap();

    let obs = c.observe(5).await.unwrap();
    assert_eq!(obs.counter, 17);
    assert_eq!(obs.events.len(), 3);
    match (&obs.events[0], &obs.events[1]) {
        (Event::Message(a), Event::Message(b)) => {
            assert!(a.mine);
            assert!(!b.mine);
        }
        other => panic!("unexpected events {other:?}"),
    }
    assert!(matches!(obs.events[2], Event::Presence(_)));

    let sent = rec.last("event/observe").unwrap();
    assert_eq!(sent["session"], "T1");
    assert_eq!(sent["counter"], "5");
}

#[tokio::test]
async fn http_failure_is_transient() {
    let (endpoint, _rec) = start_fake().await;
    let mut c = client(&endpoint, "pw");
    c.create_session().await.unwrap();
    let err = c.subscribe(&["r1".to_string()], true).await.unwrap_err();
    assert!(matches!(err, LingrError::Transport(_)));
    assert!(err.is_transient());
}

#[tokio::test]
async fn say_and_archives_send_expected_parameters() {
    let (endpoint, rec) = start_fake().await;
    let mut c = client(&endpoint, "pw");
    c.create_session().await.unwrap();

    c.say("r1", "hello world").await.unwrap();
    let sent = rec.last("room/say").unwrap();
    assert_eq!(sent["room"], "r1");
    assert_eq!(sent["nickname"], "Alice");
    assert_eq!(sent["text"], "hello world");

    let messages = c.get_archives("r1", "m9", 2).await.unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].id, "a1");
    let sent = rec.last("room/get_archives").unwrap();
    assert_eq!(sent["before"], "m9");
    assert_eq!(sent["limit"], "2");
}
