//! In-process mock of the inventory backend.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Json, Router,
};
use serde_json::{json, Value};

use busstop_client::{ApiClient, Config, Store};

pub const EMAIL: &str = "a@b.com";
pub const PASSWORD: &str = "secret";

/// A request as seen by the backend: path, Authorization and X-Request-ID.
#[derive(Debug, Clone)]
pub struct Seen {
    pub path: String,
    pub authorization: Option<String>,
    pub request_id: Option<String>,
}

#[derive(Default)]
pub struct MockState {
    pub access: Mutex<String>,
    pub refresh: Mutex<String>,
    pub issued: AtomicUsize,
    pub login_expires_in: AtomicI64,
    pub login_omits_user: AtomicBool,
    pub fail_me: AtomicBool,

    pub refresh_calls: AtomicUsize,
    pub refresh_delay_ms: AtomicU64,
    pub fail_refresh: AtomicBool,
    pub reject_all: AtomicBool,
    pub unauthorized: AtomicUsize,

    pub logout_calls: AtomicUsize,
    pub logout_bodies: Mutex<Vec<Value>>,
    pub logout_delay_ms: AtomicU64,

    pub stops: Mutex<Vec<Value>>,
    pub stops_all_calls: AtomicUsize,
    pub stops_all_delays: Mutex<VecDeque<u64>>,
    pub fail_stops_all: AtomicBool,
    pub delete_delay_ms: AtomicU64,
    pub fail_delete: AtomicBool,
    pub set_main_calls: AtomicUsize,

    pub users: Mutex<Vec<Value>>,
    pub users_forbidden: AtomicBool,

    pub seen: Mutex<Vec<Seen>>,
}

impl MockState {
    fn issue(&self) -> (String, String) {
        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        let access = format!("access-{n}");
        let refresh = format!("refresh-{n}");
        *self.access.lock().unwrap() = access.clone();
        *self.refresh.lock().unwrap() = refresh.clone();
        (access, refresh)
    }

    fn record(&self, path: &str, headers: &HeaderMap) {
        let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok()).map(String::from);
        self.seen.lock().unwrap().push(Seen {
            path: path.to_string(),
            authorization: header("authorization"),
            request_id: header("x-request-id"),
        });
    }

    fn authorize(&self, headers: &HeaderMap) -> Result<(), Response> {
        let Some(header) = headers.get("authorization").and_then(|v| v.to_str().ok()) else {
            self.unauthorized.fetch_add(1, Ordering::SeqCst);
            return Err(error(StatusCode::UNAUTHORIZED, "NOT_AUTHENTICATED", "Not authenticated"));
        };
        let access = self.access.lock().unwrap().clone();
        if self.reject_all.load(Ordering::SeqCst) || access.is_empty() || header != format!("Bearer {access}") {
            self.unauthorized.fetch_add(1, Ordering::SeqCst);
            return Err(error(StatusCode::UNAUTHORIZED, "TOKEN_EXPIRED", "Token expired"));
        }
        Ok(())
    }

    pub fn seen_on(&self, path: &str) -> Vec<Seen> {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.path == path)
            .cloned()
            .collect()
    }
}

fn error(status: StatusCode, code: &str, message: &str) -> Response {
    (
        status,
        Json(json!({
            "success": false,
            "error": {
                "code": code,
                "message": message,
                "status_code": status.as_u16(),
                "timestamp": "2024-05-01T12:00:00",
            }
        })),
    )
        .into_response()
}

async fn pause(ms: u64) {
    if ms > 0 {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }
}

pub fn admin_user() -> Value {
    json!({
        "id": 1,
        "email": EMAIL,
        "name": "Admin",
        "role": "admin",
        "is_active": true,
        "created_at": "2024-01-01T00:00:00",
    })
}

pub fn stop_json(id: i64, code: &str, status: &str) -> Value {
    json!({
        "id": id,
        "stop_id": code,
        "address": format!("{id} Lenin Avenue"),
        "district": "Central",
        "latitude": 42.87,
        "longitude": 74.59,
        "status": status,
        "condition": "satisfactory",
        "photos": [],
        "change_logs": [],
    })
}

async fn login(State(s): State<Arc<MockState>>, Json(body): Json<Value>) -> Response {
    if body["email"] != EMAIL || body["password"] != PASSWORD {
        return error(StatusCode::UNAUTHORIZED, "INVALID_CREDENTIALS", "Incorrect email or password");
    }
    let (access, refresh) = s.issue();
    let mut body = json!({
        "access_token": access,
        "refresh_token": refresh,
        "token_type": "bearer",
        "expires_in": s.login_expires_in.load(Ordering::SeqCst),
        "user": { "id": 1, "email": EMAIL, "name": "Admin", "role": "admin" },
    });
    if s.login_omits_user.load(Ordering::SeqCst) {
        body.as_object_mut().unwrap().remove("user");
    }
    Json(body).into_response()
}

async fn refresh(State(s): State<Arc<MockState>>, Json(body): Json<Value>) -> Response {
    s.refresh_calls.fetch_add(1, Ordering::SeqCst);
    pause(s.refresh_delay_ms.load(Ordering::SeqCst)).await;

    let current = s.refresh.lock().unwrap().clone();
    if s.fail_refresh.load(Ordering::SeqCst) || body["refresh_token"] != current.as_str() {
        return error(StatusCode::UNAUTHORIZED, "INVALID_REFRESH_TOKEN", "Refresh token revoked");
    }
    let (access, refresh) = s.issue();
    Json(json!({
        "access_token": access,
        "refresh_token": refresh,
        "token_type": "bearer",
        "expires_in": 900,
    }))
    .into_response()
}

async fn logout(State(s): State<Arc<MockState>>, headers: HeaderMap, body: Bytes) -> Response {
    s.logout_calls.fetch_add(1, Ordering::SeqCst);
    let body: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    s.logout_bodies.lock().unwrap().push(body);
    pause(s.logout_delay_ms.load(Ordering::SeqCst)).await;
    if let Err(resp) = s.authorize(&headers) {
        return resp;
    }
    Json(json!({ "message": "Logged out" })).into_response()
}

async fn me(State(s): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    s.record("/auth/me", &headers);
    if let Err(resp) = s.authorize(&headers) {
        return resp;
    }
    if s.fail_me.load(Ordering::SeqCst) {
        return error(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", "Profile unavailable");
    }
    Json(admin_user()).into_response()
}

async fn stops_all(State(s): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    s.record("/stops/all", &headers);
    if let Err(resp) = s.authorize(&headers) {
        return resp;
    }
    s.stops_all_calls.fetch_add(1, Ordering::SeqCst);
    if s.fail_stops_all.load(Ordering::SeqCst) {
        return error(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", "Database unavailable");
    }
    let snapshot = s.stops.lock().unwrap().clone();
    let delay = s.stops_all_delays.lock().unwrap().pop_front().unwrap_or(0);
    pause(delay).await;
    Json(Value::Array(snapshot)).into_response()
}

fn matches_key(stop: &Value, key: &str) -> bool {
    stop["stop_id"] == key || stop["id"].to_string() == key
}

async fn stop_get(State(s): State<Arc<MockState>>, headers: HeaderMap, Path(key): Path<String>) -> Response {
    if let Err(resp) = s.authorize(&headers) {
        return resp;
    }
    let found = s.stops.lock().unwrap().iter().find(|st| matches_key(st, &key)).cloned();
    match found {
        Some(stop) => Json(stop).into_response(),
        None => error(StatusCode::NOT_FOUND, "NOT_FOUND", "Stop not found"),
    }
}

async fn stop_delete(State(s): State<Arc<MockState>>, headers: HeaderMap, Path(key): Path<String>) -> Response {
    if let Err(resp) = s.authorize(&headers) {
        return resp;
    }
    pause(s.delete_delay_ms.load(Ordering::SeqCst)).await;
    if s.fail_delete.load(Ordering::SeqCst) {
        return error(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", "Database unavailable");
    }
    s.stops.lock().unwrap().retain(|st| !matches_key(st, &key));
    Json(json!({ "message": "Stop deleted" })).into_response()
}

async fn set_main(State(s): State<Arc<MockState>>, headers: HeaderMap, Path(id): Path<i64>) -> Response {
    if let Err(resp) = s.authorize(&headers) {
        return resp;
    }
    s.set_main_calls.fetch_add(1, Ordering::SeqCst);
    for stop in s.stops.lock().unwrap().iter_mut() {
        let Some(photos) = stop["photos"].as_array_mut() else {
            continue;
        };
        if photos.iter().any(|p| p["id"] == id) {
            for photo in photos.iter_mut() {
                let is_main = photo["id"] == id;
                photo["is_main"] = json!(is_main);
            }
        }
    }
    Json(json!({ "message": "Main photo set" })).into_response()
}

async fn users_list(State(s): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    if let Err(resp) = s.authorize(&headers) {
        return resp;
    }
    if s.users_forbidden.load(Ordering::SeqCst) {
        return error(StatusCode::FORBIDDEN, "FORBIDDEN", "Admin access required");
    }
    let users = s.users.lock().unwrap().clone();
    let total = users.len();
    Json(json!({ "users": users, "total": total })).into_response()
}

async fn users_create(State(s): State<Arc<MockState>>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    if let Err(resp) = s.authorize(&headers) {
        return resp;
    }
    let mut users = s.users.lock().unwrap();
    let created = json!({
        "id": 100 + users.len() as i64,
        "email": body["email"],
        "name": body["name"],
        "role": body["role"],
        "is_active": true,
    });
    users.push(created.clone());
    (StatusCode::CREATED, Json(created)).into_response()
}

async fn users_delete(State(s): State<Arc<MockState>>, headers: HeaderMap, Path(id): Path<i64>) -> Response {
    if let Err(resp) = s.authorize(&headers) {
        return resp;
    }
    s.users.lock().unwrap().retain(|u| u["id"] != id);
    Json(json!({ "message": "User deleted" })).into_response()
}

pub struct MockBackend {
    pub state: Arc<MockState>,
    pub api_url: String,
}

impl MockBackend {
    pub async fn start() -> Self {
        let state = Arc::new(MockState::default());
        state.login_expires_in.store(900, Ordering::SeqCst);

        let api = Router::new()
            .route("/auth/login", post(login))
            .route("/auth/refresh", post(refresh))
            .route("/auth/logout", post(logout))
            .route("/auth/me", get(me))
            .route("/stops/all", get(stops_all))
            .route("/stops/{key}", get(stop_get).delete(stop_delete))
            .route("/photos/{id}/set-main", put(set_main))
            .route("/users", get(users_list).post(users_create))
            .route("/users/{id}", delete(users_delete))
            .with_state(state.clone());
        let app = Router::new().nest("/api", api);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            state,
            api_url: format!("http://{addr}/api"),
        }
    }

    pub fn config(&self) -> Config {
        Config::with_api_url(self.api_url.clone())
    }

    pub fn client(&self) -> ApiClient {
        ApiClient::new(&self.config()).unwrap()
    }

    pub fn store(&self) -> Store {
        Store::new(self.client())
    }

    /// Invalidate the issued access token; the refresh token stays valid.
    pub fn expire_access(&self) {
        self.state.access.lock().unwrap().clear();
    }

    pub fn set_stops(&self, stops: Vec<Value>) {
        *self.state.stops.lock().unwrap() = stops;
    }

    pub fn refresh_calls(&self) -> usize {
        self.state.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn unauthorized(&self) -> usize {
        self.state.unauthorized.load(Ordering::SeqCst)
    }
}
