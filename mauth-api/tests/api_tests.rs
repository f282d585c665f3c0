//! Integration tests for mauth-api endpoints
//!
//! Each test gets its own SQLite database and model directory in a temp dir.

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use mauth_api::{build_router, db, AppState};
use mauth_core::{ArtifactStore, FileArtifactStore, MemoryArtifactStore, ModelArtifact};
use serde_json::{json, Value};
use sqlx::SqlitePool;
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tower::util::ServiceExt; // for `oneshot`

struct TestApp {
    _dir: TempDir,
    pool: SqlitePool,
    app: Router,
}

async fn setup_app() -> TestApp {
    let dir = TempDir::new().unwrap();
    let artifacts: Arc<dyn ArtifactStore> = Arc::new(FileArtifactStore::new(dir.path().join("model")));
    setup_app_with_store(dir, artifacts).await
}

async fn setup_app_with_store(dir: TempDir, artifacts: Arc<dyn ArtifactStore>) -> TestApp {
    let pool = db::init_database_pool(&dir.path().join("mauth.db"))
        .await
        .expect("Should open test database");
    let app = build_router(AppState::new(pool.clone(), artifacts));
    TestApp {
        _dir: dir,
        pool,
        app,
    }
}

/// Memory store whose `save` waits for the test to let it through
struct GatedStore {
    inner: MemoryArtifactStore,
    entered: Mutex<mpsc::Sender<()>>,
    release: Mutex<mpsc::Receiver<()>>,
}

impl ArtifactStore for GatedStore {
    fn exists(&self) -> bool {
        self.inner.exists()
    }

    fn load(&self) -> mauth_core::Result<Arc<ModelArtifact>> {
        self.inner.load()
    }

    fn save(&self, artifact: &ModelArtifact) -> mauth_core::Result<()> {
        let _ = self.entered.lock().unwrap().send(());
        let _ = self.release.lock().unwrap().recv_timeout(Duration::from_secs(60));
        self.inner.save(artifact)
    }
}

fn json_request(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn empty_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Should read body");
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

/// Wire-format trace in the movement style of synthetic user 1, 2 or 3
fn user_trace(user: i64, variant: usize) -> Value {
    let v = variant as f64;
    let points: Vec<[f64; 2]> = match user {
        1 => (0..12).map(|i| [i as f64 * (10.0 + v * 0.3), 0.0]).collect(),
        2 => (0..10)
            .map(|i| [i as f64 * (4.0 + v * 0.1), if i % 2 == 0 { 0.0 } else { 15.0 + v * 0.5 }])
            .collect(),
        _ => (0..14)
            .map(|i| {
                let theta = i as f64 * 0.25;
                let r = 50.0 + v * 2.0;
                [r * theta.cos(), r * theta.sin()]
            })
            .collect(),
    };
    json!(points)
}

async fn collect_population(app: &Router, per_user: usize) {
    for user in 1..=3 {
        let sequences: Vec<Value> = (0..per_user).map(|v| user_trace(user, v)).collect();
        let (status, _) = send(
            app,
            json_request("/collect-data", json!({"user_id": user, "sequences": sequences})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }
}

async fn count(pool: &SqlitePool, sql: &str) -> i64 {
    sqlx::query_scalar(sql).fetch_one(pool).await.unwrap()
}

// =============================================================================
// Health
// =============================================================================

#[tokio::test]
async fn test_health_before_training() {
    let t = setup_app().await;
    let (status, body) = send(&t.app, empty_request("GET", "/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "mauth-api");
    assert!(body["version"].is_string());
    assert!(body["uptime_seconds"].is_u64());
    assert!(body["model_version"].is_null());
}

#[tokio::test]
async fn test_build_info() {
    let t = setup_app().await;
    let (status, body) = send(&t.app, empty_request("GET", "/build-info")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["git_hash"].is_string());
    assert!(body["build_profile"].is_string());
}

// =============================================================================
// POST /collect-data
// =============================================================================

#[tokio::test]
async fn test_collect_data_stores_session_and_features() {
    let t = setup_app().await;
    let request = json_request(
        "/collect-data",
        json!({"user_id": 7, "sequences": [user_trace(1, 0), user_trace(1, 1)]}),
    );
    let (status, body) = send(&t.app, request).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "success");
    assert!(body["session_id"].is_string());

    assert_eq!(count(&t.pool, "SELECT COUNT(*) FROM movement_sessions WHERE user_id = 7 AND is_training_data = 1").await, 1);
    assert_eq!(count(&t.pool, "SELECT COUNT(*) FROM movement_sequences WHERE features IS NOT NULL").await, 2);

    let features: String = sqlx::query_scalar("SELECT features FROM movement_sequences LIMIT 1")
        .fetch_one(&t.pool)
        .await
        .unwrap();
    let features: Value = serde_json::from_str(&features).unwrap();
    assert_eq!(features.as_object().unwrap().len(), 11);
    assert!(features["straightness"].as_f64().unwrap() > 0.99);
}

#[tokio::test]
async fn test_collect_data_requires_user_id() {
    let t = setup_app().await;
    let (status, body) = send(&t.app, json_request("/collect-data", json!({"sequences": [user_trace(1, 0)]}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_INPUT");
}

#[tokio::test]
async fn test_collect_data_requires_sequences() {
    let t = setup_app().await;
    let (status, body) = send(&t.app, json_request("/collect-data", json!({"user_id": 1, "sequences": []}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_INPUT");
}

#[tokio::test]
async fn test_collect_data_is_all_or_nothing() {
    let t = setup_app().await;
    let request = json_request(
        "/collect-data",
        json!({"user_id": 1, "sequences": [user_trace(1, 0), [[1, 2, 3]], user_trace(1, 2)]}),
    );
    let (status, body) = send(&t.app, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]["message"].as_str().unwrap().contains("sequences[1]"));
    assert_eq!(count(&t.pool, "SELECT COUNT(*) FROM movement_sessions").await, 0);
    assert_eq!(count(&t.pool, "SELECT COUNT(*) FROM movement_sequences").await, 0);
}

#[tokio::test]
async fn test_collect_data_rejects_overflowing_trace() {
    let t = setup_app().await;
    let request = json_request(
        "/collect-data",
        json!({"user_id": 1, "sequences": [[[-1e308, 0.0], [1e308, 0.0]]]}),
    );
    let (status, body) = send(&t.app, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_INPUT");
    assert!(body["error"]["message"].as_str().unwrap().contains("sequences[0]"));
    assert_eq!(count(&t.pool, "SELECT COUNT(*) FROM movement_sessions").await, 0);
    assert_eq!(count(&t.pool, "SELECT COUNT(*) FROM movement_sequences").await, 0);
}

#[tokio::test]
async fn test_verify_rejects_overflowing_trace() {
    let t = setup_app().await;
    let request = json_request(
        "/verify-user",
        json!({"user_id": 1, "sequence": [[0.0, 0.0], [1e160, 0.0], [4e160, 0.0]]}),
    );
    let (status, body) = send(&t.app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_INPUT");
}

#[tokio::test]
async fn test_malformed_json_body() {
    let t = setup_app().await;
    let request = Request::builder()
        .method("POST")
        .uri("/collect-data")
        .header("content-type", "application/json")
        .body(Body::from("{\"user_id\": 1, \"sequences\": ["))
        .unwrap();
    let (status, body) = send(&t.app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_INPUT");
}

// =============================================================================
// POST /train-model
// =============================================================================

#[tokio::test]
async fn test_train_without_data() {
    let t = setup_app().await;
    let (status, body) = send(&t.app, empty_request("POST", "/train-model")).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "INSUFFICIENT_DATA");
}

#[tokio::test]
async fn test_train_ignores_short_traces() {
    let t = setup_app().await;
    let request = json_request(
        "/collect-data",
        json!({"user_id": 1, "sequences": [[[0, 0], [1, 1]], [[0, 0], [1, 1], [2, 2]], user_trace(1, 0)]}),
    );
    assert_eq!(send(&t.app, request).await.0, StatusCode::CREATED);

    let (status, body) = send(&t.app, empty_request("POST", "/train-model")).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "INSUFFICIENT_DATA");
}

#[tokio::test]
async fn test_train_model() {
    let t = setup_app().await;
    collect_population(&t.app, 8).await;

    let (status, body) = send(&t.app, empty_request("POST", "/train-model")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["model_version"], 1);
    let accuracy = body["test_accuracy"].as_f64().unwrap();
    assert!((0.0..=1.0).contains(&accuracy));

    let (_, body) = send(&t.app, empty_request("POST", "/train-model")).await;
    assert_eq!(body["model_version"], 2);
    assert_eq!(body["test_accuracy"].as_f64().unwrap(), accuracy);

    let (_, health) = send(&t.app, empty_request("GET", "/health")).await;
    assert_eq!(health["model_version"], 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_train_while_training_is_conflict() {
    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();
    let store = Arc::new(GatedStore {
        inner: MemoryArtifactStore::new(),
        entered: Mutex::new(entered_tx),
        release: Mutex::new(release_rx),
    });
    let t = setup_app_with_store(TempDir::new().unwrap(), store).await;
    collect_population(&t.app, 6).await;

    let app = t.app.clone();
    let first = tokio::spawn(async move { send(&app, empty_request("POST", "/train-model")).await });

    // First run is now holding the trainer inside `save`
    tokio::task::spawn_blocking(move || entered_rx.recv_timeout(Duration::from_secs(60)))
        .await
        .unwrap()
        .expect("First training run should reach the store");

    let (status, body) = send(&t.app, empty_request("POST", "/train-model")).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "TRAINING_IN_PROGRESS");

    release_tx.send(()).unwrap();
    let (status, body) = first.await.unwrap();
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["model_version"], 1);
}

// =============================================================================
// POST /verify-user
// =============================================================================

#[tokio::test]
async fn test_verify_before_training() {
    let t = setup_app().await;
    let request = json_request("/verify-user", json!({"user_id": 1, "sequence": user_trace(1, 0)}));
    let (status, body) = send(&t.app, request).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["code"], "MODEL_NOT_TRAINED");
}

#[tokio::test]
async fn test_verify_requires_sequence() {
    let t = setup_app().await;
    let (status, body) = send(&t.app, json_request("/verify-user", json!({"user_id": 1}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_INPUT");
}

#[tokio::test]
async fn test_verify_after_training() {
    let t = setup_app().await;
    collect_population(&t.app, 8).await;
    assert_eq!(send(&t.app, empty_request("POST", "/train-model")).await.0, StatusCode::OK);

    let request = json_request("/verify-user", json!({"user_id": 2, "sequence": user_trace(2, 3)}));
    let (status, body) = send(&t.app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_authentic"], true);
    assert_eq!(body["predicted_user_id"], 2);
    let confidence = body["confidence"].as_f64().unwrap();
    assert!((0.0..=1.0).contains(&confidence));

    let request = json_request("/verify-user", json!({"user_id": 1, "sequence": user_trace(3, 1)}));
    let (status, body) = send(&t.app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_authentic"], false);
    assert_eq!(body["predicted_user_id"], 3);

    // Both attempts kept for audit, never as training data
    assert_eq!(count(&t.pool, "SELECT COUNT(*) FROM movement_sessions WHERE is_training_data = 0").await, 2);
    assert_eq!(count(&t.pool, "SELECT COUNT(*) FROM movement_sessions WHERE is_training_data = 1").await, 3);
}
