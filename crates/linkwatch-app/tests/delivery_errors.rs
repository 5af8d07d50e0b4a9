//! Bot API 오류 응답에 따른 대시보드 전달 처리 통합 테스트

use linkwatch_core::config::AppConfig;
use linkwatch_core::models::chat::MessageHandle;
use linkwatch_core::models::session::SessionKey;
use linkwatch_core::ports::session_store::SessionStore;
use linkwatch_engine::dispatcher::{DeliveryOutcome, Dispatcher};
use linkwatch_engine::health::HealthMonitor;
use linkwatch_engine::incidents::IncidentTracker;
use linkwatch_engine::render::{RenderContext, Renderer};
use linkwatch_engine::sessions::{Session, SessionRegistry};
use linkwatch_engine::status_store::StatusStore;
use linkwatch_network::telegram_client::TelegramClient;
use linkwatch_storage::sqlite::SqliteSessionStore;
use mockito::{Matcher, Server, ServerGuard};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

const TOKEN: &str = "123:abc";

struct Rig {
    store: Arc<dyn SessionStore>,
    incidents: Arc<IncidentTracker>,
    registry: Arc<SessionRegistry>,
    dispatcher: Dispatcher,
}

fn rig(server: &ServerGuard) -> Rig {
    let mut config = AppConfig::default_config();
    config.dispatch.retry_delay_secs = 0;

    let store: Arc<dyn SessionStore> = Arc::new(SqliteSessionStore::open_in_memory().unwrap());
    let (restart_tx, _restart_rx) = mpsc::unbounded_channel();
    let status = Arc::new(StatusStore::new(&config));
    let health = Arc::new(HealthMonitor::new(config.health.clone(), restart_tx));
    let incidents = Arc::new(IncidentTracker::new(
        status.clone(),
        health,
        config.incidents.grace_period(),
        config.incidents.message_limit,
    ));
    let registry = Arc::new(SessionRegistry::new(
        store.clone(),
        incidents.clone(),
        &config.store,
    ));
    let client =
        Arc::new(TelegramClient::new(&server.url(), TOKEN, Duration::from_secs(5)).unwrap());
    let dispatcher = Dispatcher::new(
        client,
        registry.clone(),
        status,
        incidents.clone(),
        Arc::new(Renderer::new(RenderContext::from_config(&config))),
        &config.dispatch,
    );
    Rig {
        store,
        incidents,
        registry,
        dispatcher,
    }
}

fn api_error(code: u16, description: &str) -> String {
    json!({"ok": false, "error_code": code, "description": description}).to_string()
}

fn sent(message_id: i64, chat_id: i64) -> String {
    json!({
        "ok": true,
        "result": {"message_id": message_id, "chat": {"id": chat_id, "type": "private"}}
    })
    .to_string()
}

#[tokio::test]
async fn deleted_dashboard_is_sent_again() {
    let mut server = Server::new_async().await;
    let edit = server
        .mock("POST", format!("/bot{TOKEN}/editMessageText").as_str())
        .match_body(Matcher::PartialJson(json!({"chat_id": 42, "message_id": 5})))
        .with_status(400)
        .with_body(api_error(400, "Bad Request: message to edit not found"))
        .expect(1)
        .create_async()
        .await;
    let send = server
        .mock("POST", format!("/bot{TOKEN}/sendMessage").as_str())
        .with_body(sent(6, 42))
        .expect(1)
        .create_async()
        .await;

    let rig = rig(&server);
    let key = SessionKey::User(42);
    rig.registry.subscribe(key, Session::new("Lee", None)).await;
    rig.registry.update(&key, |s| s.handle = Some(MessageHandle(5)));

    assert_eq!(rig.dispatcher.deliver(key).await, DeliveryOutcome::Sent);
    edit.assert_async().await;
    send.assert_async().await;

    let session = rig.registry.get(&key).unwrap();
    assert_eq!(session.handle, Some(MessageHandle(6)));
    assert!(!session.in_flight);
    assert!(rig.incidents.confirmed().is_empty());
}

#[tokio::test]
async fn unmodified_dashboard_counts_as_delivered() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", format!("/bot{TOKEN}/editMessageText").as_str())
        .with_status(400)
        .with_body(api_error(
            400,
            "Bad Request: message is not modified: specified new message content and reply markup are exactly the same",
        ))
        .create_async()
        .await;
    let send = server
        .mock("POST", format!("/bot{TOKEN}/sendMessage").as_str())
        .expect(0)
        .create_async()
        .await;

    let rig = rig(&server);
    let key = SessionKey::User(42);
    rig.registry.subscribe(key, Session::new("Lee", None)).await;
    rig.registry.update(&key, |s| s.handle = Some(MessageHandle(5)));

    assert_eq!(rig.dispatcher.deliver(key).await, DeliveryOutcome::Edited);
    send.assert_async().await;

    let session = rig.registry.get(&key).unwrap();
    assert_eq!(session.handle, Some(MessageHandle(5)));
    assert!(session.last_hash.is_some());
}

#[tokio::test]
async fn blocked_subscriber_is_removed() {
    let mut server = Server::new_async().await;
    let send = server
        .mock("POST", format!("/bot{TOKEN}/sendMessage").as_str())
        .with_status(403)
        .with_body(api_error(403, "Forbidden: bot was blocked by the user"))
        .expect(1)
        .create_async()
        .await;

    let rig = rig(&server);
    let key = SessionKey::User(42);
    rig.registry.subscribe(key, Session::new("Lee", None)).await;
    assert!(rig.store.load(42).await.unwrap().is_some());

    assert_eq!(rig.dispatcher.deliver(key).await, DeliveryOutcome::Removed);
    send.assert_async().await;

    assert!(!rig.registry.contains(&key));
    assert!(rig.store.load(42).await.unwrap().is_none());
    assert!(rig.incidents.confirmed().is_empty());
}

#[tokio::test]
async fn rate_limited_cycle_is_skipped_without_error() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", format!("/bot{TOKEN}/sendMessage").as_str())
        .with_status(429)
        .with_body(
            json!({
                "ok": false,
                "error_code": 429,
                "description": "Too Many Requests: retry after 12",
                "parameters": {"retry_after": 12}
            })
            .to_string(),
        )
        .expect(1)
        .create_async()
        .await;

    let rig = rig(&server);
    let key = SessionKey::User(42);
    rig.registry.subscribe(key, Session::new("Lee", None)).await;

    assert_eq!(rig.dispatcher.deliver(key).await, DeliveryOutcome::RateLimited);

    let session = rig.registry.get(&key).unwrap();
    assert!(session.handle.is_none());
    assert!(session.last_hash.is_none());
    assert!(!session.in_flight);
    assert!(rig.incidents.confirmed().is_empty());
}

#[tokio::test]
async fn malformed_message_is_rejected_once() {
    let mut server = Server::new_async().await;
    let send = server
        .mock("POST", format!("/bot{TOKEN}/sendMessage").as_str())
        .with_status(400)
        .with_body(api_error(400, "Bad Request: can't parse entities"))
        .expect(1)
        .create_async()
        .await;

    let rig = rig(&server);
    let key = SessionKey::User(42);
    rig.registry.subscribe(key, Session::new("Lee", None)).await;

    assert_eq!(rig.dispatcher.deliver(key).await, DeliveryOutcome::Rejected);
    send.assert_async().await;

    let confirmed = rig.incidents.confirmed();
    assert_eq!(confirmed.len(), 1);
    assert_eq!(confirmed[0].source, "Telegram API");
    assert!(rig.registry.contains(&key));
}

#[tokio::test]
async fn server_error_is_retried_then_confirmed() {
    let mut server = Server::new_async().await;
    let send = server
        .mock("POST", format!("/bot{TOKEN}/sendMessage").as_str())
        .with_status(502)
        .with_body(api_error(502, "Bad Gateway"))
        .expect(3)
        .create_async()
        .await;

    let rig = rig(&server);
    let key = SessionKey::User(42);
    rig.registry.subscribe(key, Session::new("Lee", None)).await;

    assert_eq!(rig.dispatcher.deliver(key).await, DeliveryOutcome::Failed);
    send.assert_async().await;

    let confirmed = rig.incidents.confirmed();
    assert_eq!(confirmed.len(), 1);
    assert_eq!(confirmed[0].source, "Telegram API");
}
