//! In-process fake backend for the integration tests.
//!
//! Serves the same REST surface as the real backend from in-memory rows and
//! records every request it sees (method, path, auth headers, JSON bodies).
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use axum::extract::{Path, Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use jsonwebtoken::{EncodingKey, Header};
use serde::Serialize;
use serde_json::{json, Value};

use apitest_client::auth::FixedClock;
use apitest_client::config::ClientConfig;
use apitest_client::storage::MemoryStore;
use apitest_client::AppContext;

pub const NOW_MS: i64 = 1_760_000_000_000;

#[derive(Serialize)]
struct Claims {
    sub: String,
    exp: i64,
}

/// HS256 token whose payload carries `exp` (seconds).
pub fn mint_token(exp_secs: i64) -> String {
    let claims = Claims {
        sub: "alice".into(),
        exp: exp_secs,
    };
    jsonwebtoken::encode(&Header::default(), &claims, &EncodingKey::from_secret(b"fake-backend"))
        .unwrap()
}

pub fn valid_token() -> String {
    mint_token(NOW_MS / 1000 + 3600)
}

#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    pub path: String,
    pub token: Option<String>,
    pub authorization: Option<String>,
}

pub struct Backend {
    pub token: String,
    pub user: Value,
    pub stats: Value,
    pub projects: Vec<Value>,
    /// (project id, route row)
    pub routes: Vec<(i64, Value)>,
    /// (route id, test row)
    pub tests: Vec<(i64, Value)>,
    pub statuses: HashMap<i64, Value>,
    pub generated: Value,
    pub run_delay: Duration,
    pub requests: Vec<Recorded>,
    /// (path, JSON body) of every request that carried one
    pub bodies: Vec<(String, Value)>,
}

impl Backend {
    pub fn new(token: String) -> Self {
        Self {
            token,
            user: json!({ "username": "alice", "email": "alice@example.com" }),
            stats: json!({
                "total_tests": 12,
                "total_projects": 2,
                "total_routes": 5,
                "weekly_tests": { "2026-10-12": 3, "2026-10-13": 1 }
            }),
            projects: vec![
                json!({
                    "project_id": 1,
                    "projectName": "Shop",
                    "businessLogic": "checkout flow",
                    "projectUrl": "http://shop.local",
                    "total_tests": 3,
                    "percentage": 66.7
                }),
                json!({
                    "project_id": 2,
                    "projectName": "Blog",
                    "businessLogic": "posts",
                    "projectUrl": "http://blog.local",
                    "total_tests": 0,
                    "percentage": 0.0
                }),
            ],
            routes: vec![
                (1, json!({ "route_id": 7, "routename": "/login", "method": "POST", "total_tests": 1, "percentage": 0.0 })),
                (1, json!({ "route_id": 8, "routename": "/items", "method": "GET", "total_tests": 2, "percentage": 50.0 })),
            ],
            tests: vec![
                (7, json!({ "id": 70, "body": { "test_name": "login ok", "request_method": "POST" } })),
                (8, json!({ "id": 80, "body": { "test_name": "lists items" } })),
                (8, json!({ "id": 81, "body": { "test_name": "", "expected_status_code": 404 } })),
            ],
            statuses: HashMap::from([
                (80, json!({ "has_run": true, "passed": true })),
                (81, json!({ "has_run": false, "passed": false })),
            ]),
            generated: json!([
                { "project_id": 1, "route": "/items", "method": "POST", "body": { "test_name": "creates item", "request_method": "POST" } },
                { "route": "/items", "body": { "test_name": "lists items again" } }
            ]),
            run_delay: Duration::from_millis(0),
            requests: Vec::new(),
            bodies: Vec::new(),
        }
    }

    pub fn paths(&self) -> Vec<String> {
        self.requests
            .iter()
            .map(|r| format!("{} {}", r.method, r.path))
            .collect()
    }

    pub fn body_for(&self, path: &str) -> Option<Value> {
        self.bodies.iter().rev().find(|(p, _)| p == path).map(|(_, b)| b.clone())
    }
}

pub type Shared = Arc<Mutex<Backend>>;
type Rejection = (StatusCode, Json<Value>);
type Reply = Result<Json<Value>, Rejection>;

pub fn lock(shared: &Shared) -> MutexGuard<'_, Backend> {
    shared.lock().unwrap()
}

fn reject(status: StatusCode, detail: &str) -> Rejection {
    (status, Json(json!({ "detail": detail })))
}

fn authorize(backend: &Backend, headers: &HeaderMap) -> Result<(), Rejection> {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
    let bearer = format!("Bearer {}", backend.token);
    if header("token") == Some(backend.token.as_str()) || header("authorization") == Some(bearer.as_str()) {
        Ok(())
    } else {
        Err(reject(StatusCode::UNAUTHORIZED, "Invalid token"))
    }
}

async fn record(State(shared): State<Shared>, req: Request, next: Next) -> Response {
    let entry = {
        let header = |name: &str| {
            req.headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        Recorded {
            method: req.method().to_string(),
            path: req.uri().path().to_string(),
            token: header("token"),
            authorization: header("authorization"),
        }
    };
    lock(&shared).requests.push(entry);
    next.run(req).await
}

fn remember(backend: &mut Backend, path: String, body: &Value) {
    backend.bodies.push((path, body.clone()));
}

// --- auth ---

async fn login(State(shared): State<Shared>, Json(body): Json<Value>) -> Reply {
    let mut b = lock(&shared);
    remember(&mut b, "/auth/login".into(), &body);
    if body["password"] == "wrong" {
        return Err(reject(StatusCode::UNAUTHORIZED, "Invalid credentials"));
    }
    Ok(Json(json!({ "token": b.token })))
}

async fn signup(State(shared): State<Shared>, Json(body): Json<Value>) -> Reply {
    let mut b = lock(&shared);
    remember(&mut b, "/auth/signup".into(), &body);
    Ok(Json(json!({ "token": b.token })))
}

async fn me(State(shared): State<Shared>, headers: HeaderMap) -> Reply {
    let b = lock(&shared);
    authorize(&b, &headers)?;
    Ok(Json(b.user.clone()))
}

async fn update_me(
    State(shared): State<Shared>,
    Path(field): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Reply {
    let mut b = lock(&shared);
    authorize(&b, &headers)?;
    remember(&mut b, format!("/auth/me/{}", field), &body);
    if field != "password" {
        b.user[&field] = body[&field].clone();
    }
    Ok(Json(json!({ "message": "updated" })))
}

async fn dashboard(State(shared): State<Shared>, headers: HeaderMap) -> Reply {
    let b = lock(&shared);
    authorize(&b, &headers)?;
    Ok(Json(b.stats.clone()))
}

// --- projects ---

fn project_index(b: &Backend, id: i64) -> Result<usize, Rejection> {
    b.projects
        .iter()
        .position(|p| p["project_id"] == id)
        .ok_or_else(|| reject(StatusCode::NOT_FOUND, "Project not found"))
}

async fn projects_with_stats(State(shared): State<Shared>, headers: HeaderMap) -> Reply {
    let b = lock(&shared);
    authorize(&b, &headers)?;
    Ok(Json(json!({ "projects": b.projects })))
}

async fn create_project(State(shared): State<Shared>, headers: HeaderMap, Json(body): Json<Value>) -> Reply {
    let mut b = lock(&shared);
    authorize(&b, &headers)?;
    remember(&mut b, "/api/projects".into(), &body);
    let id = b.projects.len() as i64 + 1;
    let mut row = body.clone();
    row["project_id"] = json!(id);
    b.projects.push(row);
    Ok(Json(json!({ "project_id": id })))
}

async fn project(State(shared): State<Shared>, Path(id): Path<i64>, headers: HeaderMap) -> Reply {
    let b = lock(&shared);
    authorize(&b, &headers)?;
    let idx = project_index(&b, id)?;
    Ok(Json(b.projects[idx].clone()))
}

async fn update_project(
    State(shared): State<Shared>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Reply {
    let mut b = lock(&shared);
    authorize(&b, &headers)?;
    remember(&mut b, format!("/api/projects/{}", id), &body);
    let idx = project_index(&b, id)?;
    for key in ["projectName", "businessLogic", "projectUrl"] {
        b.projects[idx][key] = body[key].clone();
    }
    Ok(Json(json!({ "message": "Project updated" })))
}

async fn delete_project(State(shared): State<Shared>, Path(id): Path<i64>, headers: HeaderMap) -> Reply {
    let mut b = lock(&shared);
    authorize(&b, &headers)?;
    let idx = project_index(&b, id)?;
    b.projects.remove(idx);
    Ok(Json(json!({ "message": "Project deleted" })))
}

async fn project_test_stats(State(shared): State<Shared>, Path(id): Path<i64>, headers: HeaderMap) -> Reply {
    let b = lock(&shared);
    authorize(&b, &headers)?;
    let idx = project_index(&b, id)?;
    Ok(Json(json!({
        "percentage": if id == 1 { 100.0 } else { 0.0 },
        "total_tests": b.projects[idx]["total_tests"].as_u64().unwrap_or(0),
    })))
}

// --- routes ---

async fn project_routes(State(shared): State<Shared>, Path(id): Path<i64>, headers: HeaderMap) -> Reply {
    let b = lock(&shared);
    authorize(&b, &headers)?;
    project_index(&b, id)?;
    let routes: Vec<&Value> = b.routes.iter().filter(|(p, _)| *p == id).map(|(_, r)| r).collect();
    Ok(Json(json!({ "routes": routes })))
}

async fn update_route(
    State(shared): State<Shared>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Reply {
    let mut b = lock(&shared);
    authorize(&b, &headers)?;
    remember(&mut b, format!("/api/routes/{}", id), &body);
    let route = b
        .routes
        .iter_mut()
        .find(|(_, r)| r["route_id"] == id)
        .ok_or_else(|| reject(StatusCode::NOT_FOUND, "Route not found"))?;
    route.1["routename"] = body["routename"].clone();
    route.1["method"] = body["method"].clone();
    Ok(Json(json!({ "message": "Route updated" })))
}

async fn delete_route(State(shared): State<Shared>, Path(id): Path<i64>, headers: HeaderMap) -> Reply {
    let mut b = lock(&shared);
    authorize(&b, &headers)?;
    b.routes.retain(|(_, r)| r["route_id"] != id);
    Ok(Json(json!({ "message": "Route deleted" })))
}

async fn run_route(
    State(shared): State<Shared>,
    Path((project_id, route_id)): Path<(i64, i64)>,
    headers: HeaderMap,
) -> Reply {
    let delay = {
        let b = lock(&shared);
        authorize(&b, &headers)?;
        b.run_delay
    };
    tokio::time::sleep(delay).await;
    let mut b = lock(&shared);
    let results: Vec<Value> = b
        .tests
        .iter()
        .filter(|(r, _)| *r == route_id)
        .map(|(_, t)| {
            json!({
                "test_id": t["id"],
                "name": t["body"]["test_name"],
                "passed": true,
                "expected_status": 200,
                "actual_status": 200
            })
        })
        .collect();
    for (p, route) in b.routes.iter_mut() {
        if *p == project_id && route["route_id"] == route_id {
            route["percentage"] = json!(100.0);
        }
    }
    Ok(Json(json!({ "results": results })))
}

async fn routes_passed_stats(State(shared): State<Shared>, Path(id): Path<i64>, headers: HeaderMap) -> Reply {
    let b = lock(&shared);
    authorize(&b, &headers)?;
    let routes: Vec<Value> = b
        .routes
        .iter()
        .filter(|(p, _)| *p == id)
        .map(|(_, r)| {
            json!({
                "route_id": r["route_id"],
                "percentage": r["percentage"],
                "total_tests": r["total_tests"],
            })
        })
        .collect();
    Ok(Json(json!({ "routes": routes })))
}

// --- tests ---

async fn route_tests(State(shared): State<Shared>, Path(id): Path<i64>, headers: HeaderMap) -> Reply {
    let b = lock(&shared);
    authorize(&b, &headers)?;
    let tests: Vec<&Value> = b.tests.iter().filter(|(r, _)| *r == id).map(|(_, t)| t).collect();
    Ok(Json(json!({ "tests": tests })))
}

async fn update_test(
    State(shared): State<Shared>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Reply {
    let mut b = lock(&shared);
    authorize(&b, &headers)?;
    remember(&mut b, format!("/api/tests/{}", id), &body);
    if let Some((_, test)) = b.tests.iter_mut().find(|(_, t)| t["id"] == id) {
        test["body"] = body["test"].clone();
    }
    Ok(Json(json!({ "message": "Test updated" })))
}

async fn delete_test(State(shared): State<Shared>, Path(id): Path<i64>, headers: HeaderMap) -> Reply {
    let mut b = lock(&shared);
    authorize(&b, &headers)?;
    b.tests.retain(|(_, t)| t["id"] != id);
    Ok(Json(json!({ "message": "Test deleted" })))
}

async fn test_status(State(shared): State<Shared>, Path(id): Path<i64>, headers: HeaderMap) -> Reply {
    let b = lock(&shared);
    authorize(&b, &headers)?;
    b.statuses
        .get(&id)
        .cloned()
        .map(Json)
        .ok_or_else(|| reject(StatusCode::INTERNAL_SERVER_ERROR, "status unavailable"))
}

async fn run_test(State(shared): State<Shared>, Path(id): Path<i64>, headers: HeaderMap) -> Reply {
    let delay = {
        let b = lock(&shared);
        authorize(&b, &headers)?;
        b.run_delay
    };
    tokio::time::sleep(delay).await;
    Ok(Json(json!({
        "test_id": id,
        "name": "single",
        "passed": false,
        "expected_status": 200,
        "actual_status": 500
    })))
}

async fn save_tests(State(shared): State<Shared>, headers: HeaderMap, Json(body): Json<Value>) -> Reply {
    let mut b = lock(&shared);
    authorize(&b, &headers)?;
    remember(&mut b, "/api/save-tests".into(), &body);
    let count = body["tests"].as_array().map(|t| t.len()).unwrap_or(0);
    let saved: Vec<Value> = (0..count).map(|i| json!({ "test_id": 100 + i })).collect();
    Ok(Json(json!({ "tests": saved })))
}

async fn generate_tests(State(shared): State<Shared>, headers: HeaderMap, Json(body): Json<Value>) -> Reply {
    let mut b = lock(&shared);
    authorize(&b, &headers)?;
    remember(&mut b, "/api/generate-tests".into(), &body);
    Ok(Json(b.generated.clone()))
}

async fn test_connection(State(shared): State<Shared>, headers: HeaderMap, Json(body): Json<Value>) -> Reply {
    let mut b = lock(&shared);
    authorize(&b, &headers)?;
    remember(&mut b, "/api/test-connection".into(), &body);
    Ok(Json(json!({ "reachable": true, "url": body["url"] })))
}

// --- history ---

async fn history_urls(State(shared): State<Shared>, headers: HeaderMap) -> Reply {
    let b = lock(&shared);
    authorize(&b, &headers)?;
    Ok(Json(json!([{ "url_id": 1, "urlname": "http://shop.local/items" }])))
}

async fn history_tests(State(shared): State<Shared>, headers: HeaderMap, Json(body): Json<Value>) -> Reply {
    let mut b = lock(&shared);
    authorize(&b, &headers)?;
    remember(&mut b, "/history/tests".into(), &body);
    Ok(Json(json!([{ "url_id": body["id"], "test_name": "old run" }])))
}

pub fn router(shared: Shared) -> Router {
    Router::new()
        .route("/auth/login", post(login))
        .route("/auth/signup", post(signup))
        .route("/auth/me", get(me))
        .route("/auth/me/:field", put(update_me))
        .route("/dashboard/", get(dashboard))
        .route("/api/projects", post(create_project))
        .route("/api/projects-with-stats", get(projects_with_stats))
        .route(
            "/api/projects/:id",
            get(project).put(update_project).delete(delete_project),
        )
        .route("/api/projects/:id/routes", get(project_routes))
        .route("/api/project-test-stats/:id", get(project_test_stats))
        .route("/api/routes/:id", put(update_route).delete(delete_route))
        .route("/api/routes/:id/tests", get(route_tests))
        .route("/api/routes-passed-stats/:id", get(routes_passed_stats))
        .route("/api/run-tests/:project_id/:route_id", post(run_route))
        .route("/api/run-test/:id", post(run_test))
        .route("/api/test-status/:id", get(test_status))
        .route("/api/tests/:id", put(update_test).delete(delete_test))
        .route("/api/save-tests", post(save_tests))
        .route("/api/generate-tests", post(generate_tests))
        .route("/api/test-connection", post(test_connection))
        .route("/history/url", get(history_urls))
        .route("/history/tests", post(history_tests))
        .layer(middleware::from_fn_with_state(shared.clone(), record))
        .with_state(shared)
}

/// Serve `backend` on an ephemeral port; returns its base URL.
pub async fn spawn(backend: Backend) -> (String, Shared) {
    let shared = Arc::new(Mutex::new(backend));
    let app = router(shared.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}", addr), shared)
}

/// Context over in-memory stores with the clock pinned at [`NOW_MS`].
pub fn context(base_url: &str) -> AppContext {
    let config = ClientConfig::default().with_base_url(base_url).unwrap();
    AppContext::new(
        config,
        Arc::new(MemoryStore::new()),
        Arc::new(MemoryStore::new()),
        Arc::new(FixedClock::at_millis(NOW_MS)),
    )
}
