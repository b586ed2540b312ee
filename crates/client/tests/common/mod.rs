use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::extract::{Path, Query, State};
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Map, Value};

/// Collection name whose every request fails with a 500.
pub const BROKEN_ENTITY: &str = "Broken";

/// Mutable state of the fake entity backend.
#[derive(Default)]
pub struct FakeState {
    pub tables: HashMap<String, Vec<Value>>,
    /// Number of upcoming requests answered with 429.
    pub throttle_remaining: u32,
    pub requests: u32,
    pub last_authorization: Option<String>,
    next_id: u32,
}

pub type Shared = Arc<Mutex<FakeState>>;

/// A running fake backend bound to an ephemeral port.
pub struct FakeBackend {
    pub base_url: String,
    pub state: Shared,
}

impl FakeBackend {
    pub fn throttle(&self, requests: u32) {
        self.state.lock().unwrap().throttle_remaining = requests;
    }

    pub fn requests(&self) -> u32 {
        self.state.lock().unwrap().requests
    }

    pub fn last_authorization(&self) -> Option<String> {
        self.state.lock().unwrap().last_authorization.clone()
    }

    pub fn rows(&self, entity: &str) -> Vec<Value> {
        self.state
            .lock()
            .unwrap()
            .tables
            .get(entity)
            .cloned()
            .unwrap_or_default()
    }
}

/// Start the fake backend on `127.0.0.1:0`.
pub async fn spawn_backend() -> FakeBackend {
    let state: Shared = Arc::default();
    let app = Router::new()
        .route("/api/entities/{entity}", get(list).post(create))
        .route("/api/entities/{entity}/bulk", post(bulk_create))
        .route(
            "/api/entities/{entity}/{id}",
            get(fetch).put(update).delete(remove),
        )
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    FakeBackend {
        base_url: format!("http://{addr}/api"),
        state,
    }
}

/// Bookkeeping shared by every handler. Returns an early response when the
/// request is throttled or targets the broken collection.
fn gate(state: &Shared, headers: &HeaderMap, entity: &str) -> Option<Response> {
    let mut s = state.lock().unwrap();
    s.requests += 1;
    s.last_authorization = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    if s.throttle_remaining > 0 {
        s.throttle_remaining -= 1;
        return Some((StatusCode::TOO_MANY_REQUESTS, "Too Many Requests").into_response());
    }
    if entity == BROKEN_ENTITY {
        return Some((StatusCode::INTERNAL_SERVER_ERROR, "database   exploded\n").into_response());
    }
    None
}

fn not_found() -> Response {
    (StatusCode::NOT_FOUND, Json(json!({"error": "not found"}))).into_response()
}

fn insert_row(s: &mut FakeState, entity: &str, payload: Map<String, Value>) -> Value {
    s.next_id += 1;
    let mut row = payload;
    row.insert("id".to_string(), json!(format!("row{}", s.next_id)));
    let row = Value::Object(row);
    s.tables.entry(entity.to_string()).or_default().push(row.clone());
    row
}

async fn list(
    State(state): State<Shared>,
    Path(entity): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    if let Some(resp) = gate(&state, &headers, &entity) {
        return resp;
    }
    let predicate: Map<String, Value> = match params.get("q") {
        Some(q) => match serde_json::from_str(q) {
            Ok(p) => p,
            Err(_) => return (StatusCode::BAD_REQUEST, "bad q").into_response(),
        },
        None => Map::new(),
    };
    let s = state.lock().unwrap();
    let rows: Vec<Value> = s
        .tables
        .get(&entity)
        .map(|rows| {
            rows.iter()
                .filter(|row| predicate.iter().all(|(k, v)| row.get(k) == Some(v)))
                .cloned()
                .collect()
        })
        .unwrap_or_default();
    Json(rows).into_response()
}

async fn create(
    State(state): State<Shared>,
    Path(entity): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<Map<String, Value>>,
) -> Response {
    if let Some(resp) = gate(&state, &headers, &entity) {
        return resp;
    }
    let mut s = state.lock().unwrap();
    let row = insert_row(&mut s, &entity, payload);
    (StatusCode::CREATED, Json(row)).into_response()
}

async fn bulk_create(
    State(state): State<Shared>,
    Path(entity): Path<String>,
    headers: HeaderMap,
    Json(payloads): Json<Vec<Map<String, Value>>>,
) -> Response {
    if let Some(resp) = gate(&state, &headers, &entity) {
        return resp;
    }
    let mut s = state.lock().unwrap();
    let rows: Vec<Value> = payloads
        .into_iter()
        .map(|payload| insert_row(&mut s, &entity, payload))
        .collect();
    Json(rows).into_response()
}

async fn fetch(
    State(state): State<Shared>,
    Path((entity, id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    if let Some(resp) = gate(&state, &headers, &entity) {
        return resp;
    }
    let s = state.lock().unwrap();
    match s
        .tables
        .get(&entity)
        .and_then(|rows| rows.iter().find(|r| r["id"] == json!(id)))
    {
        Some(row) => Json(row.clone()).into_response(),
        None => not_found(),
    }
}

async fn update(
    State(state): State<Shared>,
    Path((entity, id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(patch): Json<Map<String, Value>>,
) -> Response {
    if let Some(resp) = gate(&state, &headers, &entity) {
        return resp;
    }
    let mut s = state.lock().unwrap();
    let Some(row) = s
        .tables
        .get_mut(&entity)
        .and_then(|rows| rows.iter_mut().find(|r| r["id"] == json!(id)))
    else {
        return not_found();
    };
    if let Value::Object(fields) = &mut *row {
        for (k, v) in patch {
            fields.insert(k, v);
        }
    }
    Json(row.clone()).into_response()
}

async fn remove(
    State(state): State<Shared>,
    Path((entity, id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    if let Some(resp) = gate(&state, &headers, &entity) {
        return resp;
    }
    let mut s = state.lock().unwrap();
    let Some(rows) = s.tables.get_mut(&entity) else {
        return not_found();
    };
    match rows.iter().position(|r| r["id"] == json!(id)) {
        Some(index) => {
            rows.remove(index);
            StatusCode::NO_CONTENT.into_response()
        }
        None => not_found(),
    }
}
