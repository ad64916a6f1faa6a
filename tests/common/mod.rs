//! In-process stub of the chat collaborator API, enough of it to exercise
//! the engine end to end: in-memory session map, bearer-token role
//! attribution, multipart message intake, per-route hit counters and a
//! failure switch for poll cycles.

use axum::extract::{Multipart, Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use nereid::{Attachment, ChatSession, Message, Participant, Role, Sender, SessionStatus};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

pub const USER_TOKEN: &str = "user-token";
pub const ADMIN_TOKEN: &str = "admin-token";

#[derive(Default)]
pub struct StubState {
    sessions: Mutex<HashMap<String, ChatSession>>,
    pub fetch_hits: AtomicUsize,
    pub list_hits: AtomicUsize,
    pub message_hits: AtomicUsize,
    pub fail_fetches: AtomicBool,
    pub fail_lists: AtomicBool,
    pub list_delay_ms: AtomicU64,
}

pub struct StubServer {
    pub state: Arc<StubState>,
    pub base_url: String,
}

impl StubServer {
    pub async fn start() -> Self {
        let state = Arc::new(StubState::default());
        let app = Router::new()
            .route("/session", post(create_session))
            .route("/session/:id", get(fetch_session))
            .route("/session/:id/end", post(end_session))
            .route("/active-sessions", get(list_active_sessions))
            .route("/message/:id", post(post_message))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            state,
            base_url: format!("http://{}", addr),
        }
    }

    pub fn fetch_hits(&self) -> usize {
        self.state.fetch_hits.load(Ordering::SeqCst)
    }

    pub fn list_hits(&self) -> usize {
        self.state.list_hits.load(Ordering::SeqCst)
    }

    pub fn message_hits(&self) -> usize {
        self.state.message_hits.load(Ordering::SeqCst)
    }

    pub fn set_fail_fetches(&self, fail: bool) {
        self.state.fail_fetches.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_lists(&self, fail: bool) {
        self.state.fail_lists.store(fail, Ordering::SeqCst);
    }

    /// Make list responses slow: the snapshot is taken on arrival but held
    /// back before being sent, like a response stuck in transit.
    pub fn set_list_delay(&self, delay: Duration) {
        self.state
            .list_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Simulate server-side retention deleting a session outright.
    pub fn remove_session(&self, session_id: &str) {
        self.state.sessions.lock().unwrap().remove(session_id);
    }

    pub fn session_status(&self, session_id: &str) -> Option<SessionStatus> {
        self.state
            .sessions
            .lock()
            .unwrap()
            .get(session_id)
            .map(|s| s.status)
    }
}

fn role_for(headers: &HeaderMap) -> Option<Role> {
    let auth = headers.get("authorization")?.to_str().ok()?;
    match auth.strip_prefix("Bearer ")? {
        USER_TOKEN => Some(Role::User),
        ADMIN_TOKEN => Some(Role::Admin),
        _ => None,
    }
}

fn unauthorized() -> axum::response::Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "message": "invalid token" })),
    )
        .into_response()
}

async fn create_session(
    State(state): State<Arc<StubState>>,
    headers: HeaderMap,
) -> axum::response::Response {
    if role_for(&headers).is_none() {
        return unauthorized();
    }
    let id = format!("s-{}", Uuid::new_v4().simple());
    let session = ChatSession {
        id: id.clone(),
        status: SessionStatus::Initialized,
        participant: Participant {
            id: "u-1".into(),
            first_name: "Ada".into(),
            last_name: "Lovelace".into(),
            email: "ada@example.com".into(),
        },
        messages: Vec::new(),
        started_at: Utc::now(),
    };
    state.sessions.lock().unwrap().insert(id, session.clone());
    Json(session).into_response()
}

async fn fetch_session(
    State(state): State<Arc<StubState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> axum::response::Response {
    state.fetch_hits.fetch_add(1, Ordering::SeqCst);
    if role_for(&headers).is_none() {
        return unauthorized();
    }
    if state.fail_fetches.load(Ordering::SeqCst) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "message": "stub offline" })),
        )
            .into_response();
    }
    match state.sessions.lock().unwrap().get(&id) {
        Some(session) => Json(session.clone()).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "message": "session not found" })),
        )
            .into_response(),
    }
}

async fn list_active_sessions(
    State(state): State<Arc<StubState>>,
    headers: HeaderMap,
) -> axum::response::Response {
    state.list_hits.fetch_add(1, Ordering::SeqCst);
    if role_for(&headers) != Some(Role::Admin) {
        return unauthorized();
    }
    if state.fail_lists.load(Ordering::SeqCst) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "message": "stub offline" })),
        )
            .into_response();
    }
    // Snapshot first, then stall: the delayed response carries the state as
    // it was when the request arrived
    let active: Vec<ChatSession> = state
        .sessions
        .lock()
        .unwrap()
        .values()
        .filter(|s| !s.is_closed())
        .cloned()
        .collect();
    let delay = state.list_delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }
    Json(active).into_response()
}

async fn post_message(
    State(state): State<Arc<StubState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> axum::response::Response {
    state.message_hits.fetch_add(1, Ordering::SeqCst);
    let Some(role) = role_for(&headers) else {
        return unauthorized();
    };

    let mut content = String::new();
    let mut attachment = None;
    while let Ok(Some(field)) = multipart.next_field().await {
        match field.name() {
            Some("content") => content = field.text().await.unwrap_or_default(),
            Some("attachment") => {
                let file_name = field.file_name().unwrap_or("upload.bin").to_string();
                let _bytes = field.bytes().await.unwrap_or_default();
                attachment = Some(Attachment {
                    path: format!("/uploads/{}", file_name),
                    file_name,
                });
            }
            _ => {}
        }
    }

    let mut sessions = state.sessions.lock().unwrap();
    let Some(session) = sessions.get_mut(&id) else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "message": "session not found" })),
        )
            .into_response();
    };
    if session.is_closed() {
        return (
            StatusCode::CONFLICT,
            Json(json!({ "message": "session is closed" })),
        )
            .into_response();
    }

    let sender = match role {
        Role::User => Sender::new("u-1", "Ada Lovelace", Role::User),
        Role::Admin => Sender::new("a-1", "Support", Role::Admin),
    };
    session.messages.push(Message {
        id: format!("m-{}", Uuid::new_v4().simple()),
        sender,
        content,
        attachment,
        timestamp: Utc::now(),
    });
    session.status = match role {
        // First user message puts the session in the agent queue
        Role::User if session.status == SessionStatus::Initialized => SessionStatus::Waiting,
        Role::User => session.status,
        // An agent reply means the conversation is live
        Role::Admin => SessionStatus::Active,
    };

    Json(session.clone()).into_response()
}

async fn end_session(
    State(state): State<Arc<StubState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> axum::response::Response {
    if role_for(&headers).is_none() {
        return unauthorized();
    }
    match state.sessions.lock().unwrap().get_mut(&id) {
        Some(session) => {
            session.status = SessionStatus::Closed;
            Json(json!({ "ok": true })).into_response()
        }
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "message": "session not found" })),
        )
            .into_response(),
    }
}
