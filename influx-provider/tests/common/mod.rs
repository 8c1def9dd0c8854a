//! In-process mock of the InfluxDB v2 bucket API.

#![allow(dead_code)]

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::{SecondsFormat, Utc};
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use uuid::Uuid;

use influx_provider::{InfluxClient, RetryPolicy};

pub const TOKEN: &str = "test-token";

#[derive(Default)]
pub struct Inner {
    /// Buckets keyed by ID, stored in wire format.
    pub buckets: HashMap<String, Value>,
    /// Label IDs attached to each bucket.
    pub labels: HashMap<String, BTreeSet<String>>,
    /// Every request as "METHOD /path".
    pub requests: Vec<String>,
    /// Answer this many bucket GETs with 503.
    pub fail_gets: u32,
    /// Answer this many bucket POSTs with 503.
    pub fail_posts: u32,
}

#[derive(Clone, Default)]
pub struct MockState {
    pub inner: Arc<RwLock<Inner>>,
}

fn error(status: StatusCode, code: &str, message: &str) -> Response {
    (status, Json(json!({ "code": code, "message": message }))).into_response()
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Log the request and check the token.
fn admit(inner: &mut Inner, method: &Method, uri: &Uri, headers: &HeaderMap) -> Option<Response> {
    inner.requests.push(format!("{} {}", method, uri.path()));
    let expected = format!("Token {}", TOKEN);
    match headers.get("authorization").and_then(|v| v.to_str().ok()) {
        Some(value) if value == expected => None,
        _ => Some(error(
            StatusCode::UNAUTHORIZED,
            "unauthorized",
            "unauthorized access",
        )),
    }
}

fn with_labels(inner: &Inner, id: &str, bucket: &Value) -> Value {
    let mut bucket = bucket.clone();
    let labels: Vec<Value> = inner
        .labels
        .get(id)
        .map(|ids| {
            ids.iter()
                .map(|l| json!({ "id": l, "name": format!("name-{}", l) }))
                .collect()
        })
        .unwrap_or_default();
    bucket["labels"] = Value::Array(labels);
    bucket
}

async fn create_bucket(
    State(state): State<MockState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    Json(req): Json<Value>,
) -> Response {
    let mut inner = state.inner.write().await;
    if let Some(denied) = admit(&mut inner, &method, &uri, &headers) {
        return denied;
    }
    if inner.fail_posts > 0 {
        inner.fail_posts -= 1;
        return error(StatusCode::SERVICE_UNAVAILABLE, "unavailable", "service unavailable");
    }

    let Some(name) = req["name"].as_str().filter(|n| !n.is_empty()) else {
        return error(StatusCode::BAD_REQUEST, "invalid", "bucket name is required");
    };
    if inner.buckets.values().any(|b| b["name"] == name) {
        return error(
            StatusCode::UNPROCESSABLE_ENTITY,
            "conflict",
            &format!("bucket with name {} already exists", name),
        );
    }

    let id = Uuid::new_v4().simple().to_string()[..16].to_string();
    let ts = now();
    let mut bucket = json!({
        "id": id,
        "type": "user",
        "name": name,
        "retentionRules": req.get("retentionRules").cloned().unwrap_or(json!([])),
        "createdAt": ts,
        "updatedAt": ts,
    });
    for key in ["description", "orgID", "rp"] {
        if let Some(value) = req.get(key) {
            bucket[key] = value.clone();
        }
    }

    inner.buckets.insert(id.clone(), bucket.clone());
    let body = with_labels(&inner, &id, &bucket);
    (StatusCode::CREATED, Json(body)).into_response()
}

async fn get_bucket(
    State(state): State<MockState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    let mut inner = state.inner.write().await;
    if let Some(denied) = admit(&mut inner, &method, &uri, &headers) {
        return denied;
    }
    if inner.fail_gets > 0 {
        inner.fail_gets -= 1;
        return error(StatusCode::SERVICE_UNAVAILABLE, "unavailable", "service unavailable");
    }

    match inner.buckets.get(&id) {
        Some(bucket) => Json(with_labels(&inner, &id, bucket)).into_response(),
        None => error(StatusCode::NOT_FOUND, "not found", "bucket not found"),
    }
}

async fn patch_bucket(
    State(state): State<MockState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<Value>,
) -> Response {
    let mut inner = state.inner.write().await;
    if let Some(denied) = admit(&mut inner, &method, &uri, &headers) {
        return denied;
    }

    let Some(bucket) = inner.buckets.get_mut(&id) else {
        return error(StatusCode::NOT_FOUND, "not found", "bucket not found");
    };
    for key in ["name", "description", "retentionRules"] {
        if let Some(value) = req.get(key) {
            bucket[key] = value.clone();
        }
    }
    bucket["updatedAt"] = json!(now());
    let bucket = bucket.clone();

    Json(with_labels(&inner, &id, &bucket)).into_response()
}

async fn delete_bucket(
    State(state): State<MockState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    let mut inner = state.inner.write().await;
    if let Some(denied) = admit(&mut inner, &method, &uri, &headers) {
        return denied;
    }

    match inner.buckets.remove(&id) {
        Some(_) => {
            inner.labels.remove(&id);
            StatusCode::NO_CONTENT.into_response()
        }
        None => error(StatusCode::NOT_FOUND, "not found", "bucket not found"),
    }
}

async fn list_labels(
    State(state): State<MockState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    let mut inner = state.inner.write().await;
    if let Some(denied) = admit(&mut inner, &method, &uri, &headers) {
        return denied;
    }
    match inner.buckets.get(&id) {
        Some(bucket) => {
            let bucket = with_labels(&inner, &id, bucket);
            Json(json!({ "labels": bucket["labels"] })).into_response()
        }
        None => error(StatusCode::NOT_FOUND, "not found", "bucket not found"),
    }
}

async fn add_label(
    State(state): State<MockState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<Value>,
) -> Response {
    let mut inner = state.inner.write().await;
    if let Some(denied) = admit(&mut inner, &method, &uri, &headers) {
        return denied;
    }
    if !inner.buckets.contains_key(&id) {
        return error(StatusCode::NOT_FOUND, "not found", "bucket not found");
    }
    let Some(label_id) = req["labelID"].as_str() else {
        return error(StatusCode::BAD_REQUEST, "invalid", "labelID is required");
    };

    inner
        .labels
        .entry(id)
        .or_default()
        .insert(label_id.to_string());
    (
        StatusCode::CREATED,
        Json(json!({ "label": { "id": label_id } })),
    )
        .into_response()
}

async fn remove_label(
    State(state): State<MockState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    Path((id, label_id)): Path<(String, String)>,
) -> Response {
    let mut inner = state.inner.write().await;
    if let Some(denied) = admit(&mut inner, &method, &uri, &headers) {
        return denied;
    }
    let removed = inner
        .labels
        .get_mut(&id)
        .map(|labels| labels.remove(&label_id))
        .unwrap_or(false);
    if removed {
        StatusCode::NO_CONTENT.into_response()
    } else {
        error(StatusCode::NOT_FOUND, "not found", "label not found")
    }
}

fn router(state: MockState) -> Router {
    Router::new()
        .route("/api/v2/buckets", post(create_bucket))
        .route(
            "/api/v2/buckets/{id}",
            get(get_bucket).patch(patch_bucket).delete(delete_bucket),
        )
        .route(
            "/api/v2/buckets/{id}/labels",
            get(list_labels).post(add_label),
        )
        .route(
            "/api/v2/buckets/{id}/labels/{label_id}",
            delete(remove_label),
        )
        .with_state(state)
}

/// Mock server bound to an ephemeral port.
pub struct TestServer {
    pub url: String,
    pub state: MockState,
    handle: JoinHandle<()>,
}

impl TestServer {
    pub async fn spawn() -> Self {
        let state = MockState::default();
        let app = router(state.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Self {
            url: format!("http://{}", addr),
            state,
            handle,
        }
    }

    pub fn client(&self, retry: RetryPolicy) -> InfluxClient {
        InfluxClient::new(
            &self.url,
            Some(TOKEN.to_string()),
            Duration::from_secs(5),
            retry,
        )
        .unwrap()
    }

    pub async fn requests(&self) -> Vec<String> {
        self.state.inner.read().await.requests.clone()
    }

    pub async fn bucket(&self, id: &str) -> Option<Value> {
        self.state.inner.read().await.buckets.get(id).cloned()
    }

    pub async fn labels(&self, id: &str) -> BTreeSet<String> {
        self.state
            .inner
            .read()
            .await
            .labels
            .get(id)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn shutdown(self) {
        self.handle.abort();
    }
}

/// Fast retries for tests.
pub fn quick_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        initial_backoff: Duration::from_millis(5),
    }
}
