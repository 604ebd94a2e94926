//! Route tests against an in-memory store.
//!
//! Uses `tower::ServiceExt` to exercise the Axum router without binding a
//! port; webhook receivers are real local Axum servers.

use std::sync::{Arc, Mutex};

use axum::Router;
use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::routing::post;
use chrono::{Duration, Utc};
use tower::ServiceExt;
use uuid::Uuid;

use stockwatch_api::routes::create_router;
use stockwatch_api::scheduler::SchedulerStatus;
use stockwatch_api::state::AppState;
use stockwatch_common::config::AppConfig;
use stockwatch_common::types::{Item, WebhookConfig};
use stockwatch_engine::pipeline::NotificationPipeline;
use stockwatch_engine::run_guard::RunGuard;
use stockwatch_engine::store::MemoryStore;

const SECRET: &str = "test-trigger-secret";

// ============================================================
// Helpers
// ============================================================

fn test_config() -> AppConfig {
    AppConfig {
        trigger_secret: Some(SECRET.to_string()),
        webhook_timeout_ms: 2_000,
        ..AppConfig::default()
    }
}

fn build_state(store: Arc<MemoryStore>, guard: RunGuard) -> AppState {
    let config = test_config();
    let pipeline = NotificationPipeline::from_config(store, guard, &config).unwrap();
    AppState::new(Arc::new(pipeline), config, SchedulerStatus::default())
}

type Hits = Arc<Mutex<Vec<String>>>;

async fn spawn_receiver() -> (String, Hits) {
    let hits: Hits = Arc::default();
    let app = Router::new()
        .route(
            "/hook",
            post(|State(hits): State<Hits>, body: String| async move {
                hits.lock().unwrap().push(body);
                StatusCode::OK
            }),
        )
        .with_state(hits.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}/hook", addr), hits)
}

fn seed_expiring_item(store: &MemoryStore, user_id: Uuid, url: &str) {
    let now = Utc::now();
    store.insert_item(Item {
        id: Uuid::new_v4(),
        user_id,
        name: "Spinach".to_string(),
        stock: 1,
        expiration_date: Some(now.date_naive() + Duration::days(1)),
        lifespan_days: Some(7),
        notify_advance_days: 2,
        notify_enabled: true,
        archived: false,
        created_at: now,
        updated_at: now,
    });
    store.insert_webhook(WebhookConfig {
        id: Uuid::new_v4(),
        user_id,
        name: "phone".to_string(),
        url: url.to_string(),
        enabled: true,
        template: r#"{"msg": "{{name}} {{condition}}"}"#.to_string(),
        created_at: now,
    });
}

fn trigger_request(auth: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/api/cron/check-expiry");
    if let Some(value) = auth {
        builder = builder.header("authorization", value);
    }
    builder.body(Body::empty()).unwrap()
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

// ============================================================
// Tests
// ============================================================

#[tokio::test]
async fn test_health_endpoint() {
    let state = build_state(Arc::new(MemoryStore::new()), RunGuard::local());
    let app = create_router(state);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["service"], "stockwatch-api");
    assert_eq!(json["scheduler_running"], false);
}

#[tokio::test]
async fn test_trigger_requires_secret() {
    let store = Arc::new(MemoryStore::new());
    let (url, hits) = spawn_receiver().await;
    seed_expiring_item(&store, Uuid::new_v4(), &url);
    let state = build_state(store.clone(), RunGuard::local());

    for auth in [None, Some("Bearer wrong"), Some(SECRET)] {
        let response = create_router(state.clone())
            .oneshot(trigger_request(auth))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    // Rejected before any pipeline work
    assert!(hits.lock().unwrap().is_empty());
    assert!(store.notification_log().is_empty());
}

#[tokio::test]
async fn test_trigger_runs_pipeline_and_reports_summary() {
    let store = Arc::new(MemoryStore::new());
    let (url, hits) = spawn_receiver().await;
    seed_expiring_item(&store, Uuid::new_v4(), &url);
    let state = build_state(store.clone(), RunGuard::local());
    let auth = format!("Bearer {}", SECRET);

    let response = create_router(state.clone())
        .oneshot(trigger_request(Some(&auth)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["checked"], 1);
    assert_eq!(json["notified"], 1);
    assert_eq!(json["failed"], 0);

    let received = hits.lock().unwrap().clone();
    assert_eq!(received.len(), 1);
    let payload: serde_json::Value = serde_json::from_str(&received[0]).unwrap();
    assert_eq!(payload["msg"], "Spinach expiring");

    // Second trigger inside the cooldown sends nothing
    let response = create_router(state)
        .oneshot(trigger_request(Some(&auth)))
        .await
        .unwrap();
    let json = json_body(response).await;
    assert_eq!(json["notified"], 0);
    assert_eq!(json["suppressed"], 1);
    assert_eq!(hits.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_trigger_conflicts_with_running_pipeline() {
    let guard = RunGuard::local();
    let state = build_state(Arc::new(MemoryStore::new()), guard.clone());
    let _held = guard.try_acquire().await.unwrap().unwrap();

    let response = create_router(state)
        .oneshot(trigger_request(Some(&format!("Bearer {}", SECRET))))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_trigger_store_failure_is_server_error() {
    let store = Arc::new(MemoryStore::new());
    store.set_unavailable(true);
    let state = build_state(store, RunGuard::local());

    let response = create_router(state)
        .oneshot(trigger_request(Some(&format!("Bearer {}", SECRET))))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let json = json_body(response).await;
    assert!(json["error"].as_str().unwrap().contains("unavailable"));
}

#[tokio::test]
async fn test_list_notifications() {
    let store = Arc::new(MemoryStore::new());
    let (url, _hits) = spawn_receiver().await;
    seed_expiring_item(&store, Uuid::new_v4(), &url);
    let state = build_state(store, RunGuard::local());
    let auth = format!("Bearer {}", SECRET);

    create_router(state.clone())
        .oneshot(trigger_request(Some(&auth)))
        .await
        .unwrap();

    let response = create_router(state.clone())
        .oneshot(
            Request::builder()
                .uri("/api/notifications?limit=10")
                .header("authorization", &auth)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    let entries = json.as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["status"], "delivered");
    assert_eq!(entries[0]["condition"], "expiring");

    let response = create_router(state)
        .oneshot(
            Request::builder()
                .uri("/api/notifications?limit=0")
                .header("authorization", &auth)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
