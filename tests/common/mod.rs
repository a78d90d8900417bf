// Mock ShinyBoard and database Worker servers for integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};

/// Bind an OS-assigned port and return the listener with its base URL.
async fn bind() -> (tokio::net::TcpListener, String) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, format!("http://127.0.0.1:{port}"))
}

fn serve(listener: tokio::net::TcpListener, app: Router) {
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
}

// ── ShinyBoard ───────────────────────────────────────────────────────

/// How the mock board writes `next_page_url`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LinkStyle {
    /// `http://host/api/users/NAME/shinies?page=N`
    #[default]
    Absolute,
    /// `/api/users/NAME/shinies?page=N`
    RootRelative,
    /// `shinies?page=N`
    PathRelative,
    /// `?page=N`
    QueryOnly,
}

/// Canned ShinyBoard pages per user.
#[derive(Default)]
pub struct BoardSetup {
    /// user -> pages, each page being a JSON array of shiny items.
    pub pages: HashMap<String, Vec<Value>>,
    /// (user, page) pairs that answer with HTTP 500.
    pub failing: HashSet<(String, usize)>,
    pub links: LinkStyle,
}

impl BoardSetup {
    pub fn user(mut self, name: &str, pages: Vec<Value>) -> Self {
        self.pages.insert(name.to_string(), pages);
        self
    }

    pub fn fail(mut self, name: &str, page: usize) -> Self {
        self.failing.insert((name.to_string(), page));
        self
    }

    pub fn links(mut self, links: LinkStyle) -> Self {
        self.links = links;
        self
    }
}

#[derive(Clone)]
struct BoardState {
    base: String,
    setup: Arc<BoardSetup>,
    hits: Arc<Mutex<Vec<String>>>,
}

/// Handle to a running mock ShinyBoard.
pub struct MockBoard {
    pub url: String,
    hits: Arc<Mutex<Vec<String>>>,
}

impl MockBoard {
    /// Requests seen so far, as `user:page`.
    pub fn hits(&self) -> Vec<String> {
        self.hits.lock().unwrap().clone()
    }
}

async fn shinies_handler(
    State(state): State<BoardState>,
    Path(name): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let page: usize = query.get("page").and_then(|p| p.parse().ok()).unwrap_or(1);
    state.hits.lock().unwrap().push(format!("{name}:{page}"));

    if state.setup.failing.contains(&(name.clone(), page)) {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    let Some(pages) = state.setup.pages.get(&name) else {
        return (StatusCode::NOT_FOUND, Json(json!({ "error": "User not found" }))).into_response();
    };

    let shinies = pages.get(page.saturating_sub(1)).cloned().unwrap_or_else(|| json!([]));
    let next = if page < pages.len() {
        let next_page = page + 1;
        let path = format!("/api/users/{name}/shinies?page={next_page}");
        let link = match state.setup.links {
            LinkStyle::Absolute => format!("{}{path}", state.base),
            LinkStyle::RootRelative => path,
            LinkStyle::PathRelative => format!("shinies?page={next_page}"),
            LinkStyle::QueryOnly => format!("?page={next_page}"),
        };
        Value::String(link)
    } else {
        Value::Null
    };
    Json(json!({ "shinies": shinies, "next_page_url": next })).into_response()
}

pub async fn spawn_board(setup: BoardSetup) -> MockBoard {
    let (listener, url) = bind().await;
    let hits = Arc::new(Mutex::new(Vec::new()));
    let state = BoardState {
        base: url.clone(),
        setup: Arc::new(setup),
        hits: hits.clone(),
    };
    let app = Router::new()
        .route("/api/users/{name}/shinies", get(shinies_handler))
        .with_state(state);
    serve(listener, app);
    MockBoard { url, hits }
}

/// A ShinyBoard API item.
pub fn board_shiny(pokemon: &str, fields: Value) -> Value {
    let mut item = json!({ "id": 1, "pokemon": { "name": pokemon } });
    if let (Some(obj), Some(extra)) = (item.as_object_mut(), fields.as_object()) {
        for (k, v) in extra {
            obj.insert(k.clone(), v.clone());
        }
    }
    item
}

// ── Database Worker ──────────────────────────────────────────────────

pub const ADMIN_USER: &str = "Hyper";
pub const ADMIN_PASSWORD: &str = "correct-horse";

#[derive(Clone)]
struct StoreState {
    db: Arc<Mutex<Value>>,
    pushes: Arc<Mutex<Vec<Value>>>,
    reads: Arc<AtomicUsize>,
    fail_reads: bool,
    /// Document swapped in after the first read, simulating another operator.
    replace_after_first_read: Option<Value>,
}

/// Handle to a running mock database Worker.
pub struct MockStore {
    /// Admin root, e.g. `http://127.0.0.1:1234/admin`.
    pub url: String,
    db: Arc<Mutex<Value>>,
    pushes: Arc<Mutex<Vec<Value>>>,
    reads: Arc<AtomicUsize>,
}

impl MockStore {
    pub fn database(&self) -> Value {
        self.db.lock().unwrap().clone()
    }

    /// Full bodies of accepted updates.
    pub fn pushes(&self) -> Vec<Value> {
        self.pushes.lock().unwrap().clone()
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

async fn database_handler(State(state): State<StoreState>) -> Response {
    let n = state.reads.fetch_add(1, Ordering::SeqCst);
    if state.fail_reads {
        return StatusCode::BAD_GATEWAY.into_response();
    }
    let current = state.db.lock().unwrap().clone();
    if n == 0 {
        if let Some(next) = &state.replace_after_first_read {
            *state.db.lock().unwrap() = next.clone();
        }
    }
    Json(current).into_response()
}

async fn update_handler(State(state): State<StoreState>, Json(body): Json<Value>) -> Response {
    if body["username"] != ADMIN_USER || body["password"] != ADMIN_PASSWORD {
        return Json(json!({ "success": false, "error": "Invalid credentials" })).into_response();
    }
    let Some(data) = body.get("data").cloned() else {
        return (StatusCode::BAD_REQUEST, "missing data").into_response();
    };
    *state.db.lock().unwrap() = data;
    state.pushes.lock().unwrap().push(body);
    Json(json!({ "success": true })).into_response()
}

async fn spawn_store_with(db: Value, fail_reads: bool, replace_after_first_read: Option<Value>) -> MockStore {
    let (listener, base) = bind().await;
    let state = StoreState {
        db: Arc::new(Mutex::new(db)),
        pushes: Arc::new(Mutex::new(Vec::new())),
        reads: Arc::new(AtomicUsize::new(0)),
        fail_reads,
        replace_after_first_read,
    };
    let handle = MockStore {
        url: format!("{base}/admin"),
        db: state.db.clone(),
        pushes: state.pushes.clone(),
        reads: state.reads.clone(),
    };
    let app = Router::new()
        .route("/admin/database", get(database_handler))
        .route("/admin/update-database", post(update_handler))
        .with_state(state);
    serve(listener, app);
    handle
}

pub async fn spawn_store(db: Value) -> MockStore {
    spawn_store_with(db, false, None).await
}

pub async fn spawn_failing_store() -> MockStore {
    spawn_store_with(json!({}), true, None).await
}

/// Store whose document changes right after the first read.
pub async fn spawn_racing_store(db: Value, replacement: Value) -> MockStore {
    spawn_store_with(db, false, Some(replacement)).await
}
