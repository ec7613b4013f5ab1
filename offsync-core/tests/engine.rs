//! End-to-end tests against an in-process REST server.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    extract::{Path, Query, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, put},
    Json, Router,
};
use offsync_core::{
    ActionKind, ConnectivityProbe, EngineConfig, HttpProbe, HttpRemote, NetworkMonitor, Priority,
    SyncEngine,
};
use serde_json::{json, Value};
use tempfile::TempDir;

const TOKEN: &str = "test-token";

#[derive(Default)]
struct MockState {
    requests: Vec<String>,
    collections: HashMap<String, Vec<Value>>,
    failures: HashMap<String, (StatusCode, String)>,
    since: Vec<Option<String>>,
}

type Shared = Arc<Mutex<MockState>>;

struct MockServer {
    addr: SocketAddr,
    state: Shared,
}

impl MockServer {
    async fn start() -> Self {
        let state = Shared::default();

        let api = Router::new()
            .route("/api/{entity}", get(list).post(create))
            .route("/api/{entity}/{id}", put(update).delete(remove))
            .layer(middleware::from_fn(require_token));

        let app = Router::new()
            .route("/health", get(|| async { "ok" }))
            .merge(api)
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state }
    }

    fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    fn requests(&self) -> Vec<String> {
        self.state.lock().unwrap().requests.clone()
    }

    fn since_params(&self) -> Vec<Option<String>> {
        self.state.lock().unwrap().since.clone()
    }

    fn set_collection(&self, entity: &str, entities: Vec<Value>) {
        self.state
            .lock()
            .unwrap()
            .collections
            .insert(entity.to_string(), entities);
    }

    fn fail(&self, entity: &str, status: StatusCode, body: &str) {
        self.state
            .lock()
            .unwrap()
            .failures
            .insert(entity.to_string(), (status, body.to_string()));
    }
}

async fn require_token(request: Request, next: Next) -> Response {
    let authorized = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        == Some(TOKEN);

    if authorized {
        next.run(request).await
    } else {
        (StatusCode::UNAUTHORIZED, "invalid or missing bearer token").into_response()
    }
}

fn record(state: &Shared, line: String, entity: &str) -> Option<Response> {
    let mut state = state.lock().unwrap();
    state.requests.push(line);
    state
        .failures
        .get(entity)
        .cloned()
        .map(|(status, body)| (status, body).into_response())
}

async fn create(
    State(state): State<Shared>,
    Path(entity): Path<String>,
    Json(_body): Json<Value>,
) -> Response {
    record(&state, format!("POST /api/{}", entity), &entity)
        .unwrap_or_else(|| StatusCode::CREATED.into_response())
}

async fn update(
    State(state): State<Shared>,
    Path((entity, id)): Path<(String, String)>,
    Json(_body): Json<Value>,
) -> Response {
    record(&state, format!("PUT /api/{}/{}", entity, id), &entity)
        .unwrap_or_else(|| StatusCode::OK.into_response())
}

async fn remove(State(state): State<Shared>, Path((entity, id)): Path<(String, String)>) -> Response {
    record(&state, format!("DELETE /api/{}/{}", entity, id), &entity)
        .unwrap_or_else(|| StatusCode::NO_CONTENT.into_response())
}

async fn list(
    State(state): State<Shared>,
    Path(entity): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    if let Some(failure) = record(&state, format!("GET /api/{}", entity), &entity) {
        return failure;
    }
    let mut state = state.lock().unwrap();
    state.since.push(params.get("since").cloned());
    let entities = state.collections.get(&entity).cloned().unwrap_or_default();
    Json(json!({ "data": entities })).into_response()
}

fn config(temp: &TempDir) -> EngineConfig {
    EngineConfig {
        sync_interval: Duration::from_secs(3600),
        call_timeout: Duration::from_secs(5),
        ..EngineConfig::new(temp.path().join("offsync.db"))
    }
}

/// Starts an online engine and waits for its initial scheduled pass.
async fn online_engine(server: &MockServer, config: EngineConfig) -> SyncEngine<HttpRemote> {
    let engine = SyncEngine::initialize(
        config,
        Arc::new(HttpRemote::new(server.url())),
        NetworkMonitor::new(true),
        Some(TOKEN.to_string()),
    )
    .await
    .unwrap();

    engine
        .subscribe()
        .wait_for(|s| s.last_sync_at.is_some() && !s.in_progress)
        .await
        .unwrap();
    engine
}

#[tokio::test]
async fn test_offline_queue_drains_in_priority_order_when_online() {
    let server = MockServer::start().await;
    let temp = TempDir::new().unwrap();
    let engine = SyncEngine::initialize(
        config(&temp),
        Arc::new(HttpRemote::new(server.url())),
        NetworkMonitor::new(false),
        Some(TOKEN.to_string()),
    )
    .await
    .unwrap();

    engine
        .enqueue_mutation(
            ActionKind::Create,
            "projects",
            None,
            json!({"name": "Roof repair"}),
            Some(Priority::Low),
        )
        .await
        .unwrap();
    engine
        .enqueue_mutation(
            ActionKind::Update,
            "leads",
            Some("17"),
            json!({"stage": "won"}),
            Some(Priority::High),
        )
        .await
        .unwrap();
    assert_eq!(engine.get_sync_state().pending_count, 2);
    assert!(server.requests().is_empty());

    let mut rx = engine.subscribe();
    engine.network().set_online(true);
    rx.wait_for(|s| s.last_sync_at.is_some() && !s.in_progress)
        .await
        .unwrap();

    assert_eq!(
        server.requests(),
        vec!["PUT /api/leads/17", "POST /api/projects"]
    );
    let state = engine.get_sync_state();
    assert_eq!(state.pending_count, 0);
    assert_eq!(state.failed_count, 0);
    assert!(engine.pending_actions().await.unwrap().is_empty());

    engine.shutdown().await;
}

#[tokio::test]
async fn test_full_sync_mirrors_collections() {
    let server = MockServer::start().await;
    server.set_collection("leads", vec![json!({"id": "1", "name": "Ada"})]);
    let temp = TempDir::new().unwrap();
    let engine = online_engine(&server, config(&temp).with_entity_types(["leads"])).await;

    let report = engine.run_full_sync().await.unwrap();
    assert_eq!(report.pulled.len(), 1);
    assert_eq!(
        engine.get_collection("leads").await.unwrap(),
        vec![json!({"id": "1", "name": "Ada"})]
    );

    // Second pull is incremental
    server.set_collection("leads", vec![json!({"id": "2", "name": "Grace"})]);
    engine.run_full_sync().await.unwrap();
    assert_eq!(
        engine.get_collection("leads").await.unwrap(),
        vec![json!({"id": "2", "name": "Grace"})]
    );

    let since = server.since_params();
    assert_eq!(since.len(), 2);
    assert!(since[0].is_none());
    assert!(since[1].is_some());

    engine.shutdown().await;
}

#[tokio::test]
async fn test_error_body_becomes_reported_message() {
    let server = MockServer::start().await;
    server.fail("projects", StatusCode::UNPROCESSABLE_ENTITY, "name is required");
    let temp = TempDir::new().unwrap();
    let engine = online_engine(&server, config(&temp)).await;

    engine
        .enqueue_mutation(ActionKind::Create, "projects", None, json!({}), None)
        .await
        .unwrap();
    let report = engine.run_sync_pass().await.unwrap();

    assert_eq!(report.failed, 1);
    let state = engine.get_sync_state();
    assert_eq!(state.failed_count, 1);
    assert_eq!(state.pending_count, 1);
    assert_eq!(state.last_errors, vec!["projects CREATE: name is required"]);

    engine.shutdown().await;
}

#[tokio::test]
async fn test_action_dropped_after_three_failed_passes() {
    let server = MockServer::start().await;
    server.fail("leads", StatusCode::INTERNAL_SERVER_ERROR, "database locked");
    let temp = TempDir::new().unwrap();
    let engine = online_engine(&server, config(&temp)).await;

    engine
        .enqueue_mutation(ActionKind::Delete, "leads", Some("9"), Value::Null, None)
        .await
        .unwrap();

    for _ in 0..2 {
        engine.run_sync_pass().await.unwrap();
        assert_eq!(engine.get_sync_state().pending_count, 1);
    }
    let report = engine.run_sync_pass().await.unwrap();

    assert_eq!(report.dropped, 1);
    let state = engine.get_sync_state();
    assert_eq!(state.pending_count, 0);
    assert_eq!(
        state.last_errors,
        vec!["leads DELETE: database locked (dropped after 3 attempts)"]
    );
    assert_eq!(server.requests().len(), 3);

    // Nothing left to send
    engine.run_sync_pass().await.unwrap();
    assert_eq!(server.requests().len(), 3);

    engine.shutdown().await;
}

#[tokio::test]
async fn test_token_change_applies_to_next_call() {
    let server = MockServer::start().await;
    let temp = TempDir::new().unwrap();
    let engine = online_engine(&server, config(&temp)).await;

    engine.set_auth_token(Some("stale".to_string()));
    engine
        .enqueue_mutation(ActionKind::Create, "leads", None, json!({"name": "Lin"}), None)
        .await
        .unwrap();
    engine.run_sync_pass().await.unwrap();
    assert_eq!(
        engine.get_sync_state().last_errors,
        vec!["leads CREATE: invalid or missing bearer token"]
    );

    engine.set_auth_token(Some(TOKEN.to_string()));
    engine.run_sync_pass().await.unwrap();
    let state = engine.get_sync_state();
    assert_eq!(state.pending_count, 0);
    assert!(state.last_errors.is_empty());
    assert_eq!(server.requests(), vec!["POST /api/leads"]);

    engine.shutdown().await;
}

#[tokio::test]
async fn test_queue_survives_restart() {
    let server = MockServer::start().await;
    let temp = TempDir::new().unwrap();

    let engine = SyncEngine::initialize(
        config(&temp),
        Arc::new(HttpRemote::new(server.url())),
        NetworkMonitor::new(false),
        None,
    )
    .await
    .unwrap();
    let id = engine
        .enqueue_mutation(ActionKind::Update, "leads", Some("4"), json!({"x": 1}), None)
        .await
        .unwrap();
    engine.shutdown().await;

    let engine = SyncEngine::initialize(
        config(&temp),
        Arc::new(HttpRemote::new(server.url())),
        NetworkMonitor::new(false),
        None,
    )
    .await
    .unwrap();

    let state = engine.get_sync_state();
    assert_eq!(state.pending_count, 1);
    assert!(!state.in_progress);
    let pending = engine.pending_actions().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, id);
    assert_eq!(pending[0].attempt, 0);

    engine.shutdown().await;
}

#[tokio::test]
async fn test_http_probe() {
    let server = MockServer::start().await;
    assert!(HttpProbe::new(&server.url()).probe().await);

    // Bind and drop to get a port nobody listens on
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    assert!(!HttpProbe::new(&format!("http://{}", addr)).probe().await);
}
