//! Axum-based HTTP gateway with body limits, timeouts, and CORS.
//!
//! All JSON endpoints return `{"error": message}` on failure:
//! validation problems map to 400, missing/invalid sessions to 401
//! (with one undifferentiated message for login failures), missing
//! stories to 404, and upstream generation failures to 502. Page
//! endpoints redirect instead of erroring.

pub mod pages;

use crate::config::Config;
use crate::generator::{GeminiGenerator, GenerateError, StoryGenerator, StoryRequest};
use crate::session::{SessionKeeper, SESSION_COOKIE};
use crate::store::{new_story_id, StoryRecord, UserRecord, UserStore};
use anyhow::Result;
use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Json},
    routing::{delete, get, post},
    Router,
};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

/// Maximum request body size (64KB) — prevents memory exhaustion
pub const MAX_BODY_SIZE: usize = 65_536;
/// Request timeout (120s) — covers slow upstream generation while preventing abuse
pub const REQUEST_TIMEOUT_SECS: u64 = 120;

/// Minimum username length accepted at registration.
const MIN_USERNAME_CHARS: usize = 3;
/// Minimum password length accepted at registration.
const MIN_PASSWORD_CHARS: usize = 6;

/// Shared state for all axum handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<UserStore>,
    pub sessions: Arc<SessionKeeper>,
    pub generator: Arc<dyn StoryGenerator>,
}

type ApiResponse = (StatusCode, Json<serde_json::Value>);
type CookieResponse = (StatusCode, HeaderMap, Json<serde_json::Value>);

/// Run the HTTP gateway.
pub async fn run_gateway(host: &str, port: u16, config: Config) -> Result<()> {
    let store = Arc::new(UserStore::new(
        &config.store.users_path,
        &config.store.mirror_path,
    ));
    store.ensure_initialized()?;

    if config.session.uses_dev_secret() {
        tracing::warn!(
            "Session secret is the built-in development default — \
             set {} before exposing this server",
            crate::config::ENV_SESSION_SECRET
        );
    }
    if config.generator.api_key.is_empty() {
        tracing::warn!(
            "No story provider API key configured — /generate will fail; set {}",
            crate::config::ENV_API_KEY
        );
    }

    let sessions = Arc::new(SessionKeeper::new(
        &config.session.secret,
        config.session.ttl_secs,
    ));
    let generator: Arc<dyn StoryGenerator> = Arc::new(GeminiGenerator::new(&config.generator));

    let state = AppState {
        store,
        sessions,
        generator,
    };

    let addr: SocketAddr = format!("{host}:{port}").parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let display_addr = listener.local_addr()?;

    println!("📖 StoryLoom listening on http://{display_addr}");
    println!("  POST /auth/register          — create an account");
    println!("  POST /auth/login             — authenticate (sets session cookie)");
    println!("  POST /auth/logout            — clear session cookie");
    println!("  GET  /auth/me                — current session info");
    println!("  POST /generate               — generate a story (auth)");
    println!("  GET  /stories                — list own stories (auth)");
    println!("  GET  /stories/favorites      — list favorited stories (auth)");
    println!("  POST /stories/favorite/{{id}}  — toggle favorite flag (auth)");
    println!("  DELETE /stories/{{id}}         — delete a story (auth)");
    println!("  GET  /health    — health check");
    println!("  Press Ctrl+C to stop.\n");

    let app = router(state);
    axum::serve(listener, app).await?;

    Ok(())
}

/// Build the full route table with middleware layers.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::DELETE,
            axum::http::Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE])
        .max_age(Duration::from_secs(3600));

    Router::new()
        .route("/", get(pages::handle_home))
        .route("/about", get(pages::handle_about))
        .route("/profile", get(pages::handle_profile))
        .route("/health", get(handle_health))
        .route("/auth/register", post(handle_auth_register))
        .route("/auth/login", post(handle_auth_login))
        .route("/auth/logout", post(handle_auth_logout))
        .route("/auth/me", get(handle_auth_me))
        .route("/generate", post(handle_generate))
        .route("/stories", get(handle_stories_list))
        .route("/stories/favorites", get(handle_stories_favorites))
        .route("/stories/favorite/{story_id}", post(handle_story_favorite))
        .route("/stories/{story_id}", delete(handle_story_delete))
        .with_state(state)
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_SIZE))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(REQUEST_TIMEOUT_SECS),
        ))
}

/// Pull the session token out of the `Cookie` header.
fn session_token(headers: &HeaderMap) -> Option<&str> {
    let cookies = headers.get(header::COOKIE)?.to_str().ok()?;
    cookies.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        (name == SESSION_COOKIE).then_some(value)
    })
}

/// Resolve the session cookie to a username, if any.
fn session_user(state: &AppState, headers: &HeaderMap) -> Option<String> {
    session_token(headers).and_then(|token| state.sessions.current_user(token))
}

/// Validate the session cookie. Returns the error response if invalid.
fn require_session(state: &AppState, headers: &HeaderMap) -> Result<String, ApiResponse> {
    session_user(state, headers).ok_or((
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({"error": "Not authenticated"})),
    ))
}

fn set_cookie_headers(value: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(value) {
        headers.insert(header::SET_COOKIE, value);
    }
    headers
}

// ══════════════════════════════════════════════════════════════════════════════
// AXUM HANDLERS
// ══════════════════════════════════════════════════════════════════════════════

/// GET /health — always public (no secrets leaked)
async fn handle_health(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "users": state.store.user_count(),
    }))
}

/// Request body for registration and login.
#[derive(Debug, Deserialize)]
pub struct CredentialsBody {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

/// POST /auth/register — create a new user account.
async fn handle_auth_register(
    State(state): State<AppState>,
    body: Result<Json<CredentialsBody>, axum::extract::rejection::JsonRejection>,
) -> ApiResponse {
    let body = match body {
        Ok(Json(b)) => b,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({"error": format!("Invalid request: {e}")})),
            );
        }
    };

    let username = body.username.trim();
    if username.chars().count() < MIN_USERNAME_CHARS {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({
                "error": "Username must be at least 3 characters"
            })),
        );
    }
    if body.password.chars().count() < MIN_PASSWORD_CHARS {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({
                "error": "Password must be at least 6 characters"
            })),
        );
    }

    match state
        .store
        .create_user(UserRecord::with_password(username, &body.password))
    {
        Ok(()) => {
            tracing::info!(username, "New user registered");
            (StatusCode::OK, Json(serde_json::json!({"ok": true})))
        }
        Err(e) => {
            let msg = e.to_string();
            let status = if msg.contains("already taken") {
                StatusCode::CONFLICT
            } else {
                StatusCode::INTERNAL_SERVER_ERROR
            };
            (status, Json(serde_json::json!({"error": msg})))
        }
    }
}

/// POST /auth/login — authenticate and set the session cookie.
///
/// Unknown usernames and wrong passwords produce byte-identical
/// responses; a dummy derivation keeps the timing of the two paths
/// comparable.
async fn handle_auth_login(
    State(state): State<AppState>,
    body: Result<Json<CredentialsBody>, axum::extract::rejection::JsonRejection>,
) -> CookieResponse {
    let body = match body {
        Ok(Json(b)) => b,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                HeaderMap::new(),
                Json(serde_json::json!({"error": format!("Invalid request: {e}")})),
            );
        }
    };

    let user = state.store.find_user(body.username.trim());
    let verified = match &user {
        Some(user) => user.verify_password(&body.password),
        None => {
            let salt = crate::auth::generate_salt();
            let _ = crate::auth::derive_hash(&body.password, &salt, crate::auth::PBKDF2_ITERATIONS);
            false
        }
    };

    let Some(user) = user.filter(|_| verified) else {
        return (
            StatusCode::UNAUTHORIZED,
            HeaderMap::new(),
            Json(serde_json::json!({"error": "Invalid credentials"})),
        );
    };

    let token = state.sessions.issue(&user.username);
    tracing::info!(username = user.username, "User logged in");
    (
        StatusCode::OK,
        set_cookie_headers(&state.sessions.cookie_for(&token)),
        Json(serde_json::json!({"ok": true, "username": user.username})),
    )
}

/// POST /auth/logout — clear the session cookie.
async fn handle_auth_logout() -> CookieResponse {
    (
        StatusCode::OK,
        set_cookie_headers(&SessionKeeper::clearing_cookie()),
        Json(serde_json::json!({"ok": true})),
    )
}

/// GET /auth/me — report the current session, never an error.
async fn handle_auth_me(State(state): State<AppState>, headers: HeaderMap) -> ApiResponse {
    match session_user(&state, &headers) {
        Some(username) => (
            StatusCode::OK,
            Json(serde_json::json!({"authenticated": true, "username": username})),
        ),
        None => (
            StatusCode::OK,
            Json(serde_json::json!({"authenticated": false})),
        ),
    }
}

/// Request body for story generation.
#[derive(Debug, Deserialize)]
pub struct GenerateBody {
    #[serde(default)]
    pub idea: String,
    #[serde(default)]
    pub genre: String,
    #[serde(default)]
    pub tone: String,
    #[serde(default = "default_size")]
    pub size: u8,
}

fn default_size() -> u8 {
    1
}

/// POST /generate — generate a story and persist it under the caller.
async fn handle_generate(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<GenerateBody>, axum::extract::rejection::JsonRejection>,
) -> ApiResponse {
    let username = match require_session(&state, &headers) {
        Ok(u) => u,
        Err(resp) => return resp,
    };

    let body = match body {
        Ok(Json(b)) => b,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({"error": format!("Invalid request: {e}")})),
            );
        }
    };

    let idea = body.idea.trim().to_string();
    if idea.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": "No idea provided"})),
        );
    }
    if !(1..=3).contains(&body.size) {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": "Size must be 1, 2 or 3"})),
        );
    }

    let request = StoryRequest {
        idea,
        genre: body.genre.trim().to_string(),
        tone: body.tone.trim().to_string(),
        size: body.size,
    };

    let story = match state.generator.generate(&request).await {
        Ok(story) => story,
        Err(e) => {
            match &e {
                GenerateError::Upstream { status, .. } => {
                    tracing::error!(status, "Story provider rejected the request: {e}");
                }
                GenerateError::Transport(_) | GenerateError::EmptyResponse => {
                    tracing::error!("Story generation failed: {e}");
                }
            }
            return (
                StatusCode::BAD_GATEWAY,
                Json(serde_json::json!({"error": e.to_string()})),
            );
        }
    };

    let record = StoryRecord {
        id: new_story_id(),
        idea: request.idea,
        genre: request.genre,
        tone: request.tone,
        size: request.size,
        story: story.clone(),
        favorite: false,
    };
    if let Err(e) = state.store.append_story(&username, record) {
        tracing::error!("Failed to persist generated story: {e}");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({"error": "Failed to save story"})),
        );
    }

    (StatusCode::OK, Json(serde_json::json!({"story": story})))
}

/// GET /stories — the caller's full collection, insertion order.
async fn handle_stories_list(State(state): State<AppState>, headers: HeaderMap) -> ApiResponse {
    let username = match require_session(&state, &headers) {
        Ok(u) => u,
        Err(resp) => return resp,
    };

    let stories = state.store.stories_for(&username);
    (
        StatusCode::OK,
        Json(serde_json::json!({"stories": stories})),
    )
}

/// GET /stories/favorites — bare array of favorited stories, in order.
async fn handle_stories_favorites(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResponse {
    let username = match require_session(&state, &headers) {
        Ok(u) => u,
        Err(resp) => return resp,
    };

    let favorites: Vec<StoryRecord> = state
        .store
        .stories_for(&username)
        .into_iter()
        .filter(|s| s.favorite)
        .collect();
    match serde_json::to_value(favorites) {
        Ok(value) => (StatusCode::OK, Json(value)),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({"error": format!("Serialization failed: {e}")})),
        ),
    }
}

/// POST /stories/favorite/{id} — toggle the favorite flag.
async fn handle_story_favorite(
    State(state): State<AppState>,
    Path(story_id): Path<String>,
    headers: HeaderMap,
) -> ApiResponse {
    let username = match require_session(&state, &headers) {
        Ok(u) => u,
        Err(resp) => return resp,
    };

    match state.store.toggle_favorite(&username, &story_id) {
        Ok(favorite) => (
            StatusCode::OK,
            Json(serde_json::json!({"ok": true, "favorite": favorite})),
        ),
        Err(_) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"error": "Story not found"})),
        ),
    }
}

/// DELETE /stories/{id} — remove one story.
async fn handle_story_delete(
    State(state): State<AppState>,
    Path(story_id): Path<String>,
    headers: HeaderMap,
) -> ApiResponse {
    let username = match require_session(&state, &headers) {
        Ok(u) => u,
        Err(resp) => return resp,
    };

    match state.store.delete_story(&username, &story_id) {
        Ok(()) => (StatusCode::OK, Json(serde_json::json!({"ok": true}))),
        Err(_) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"error": "Story not found"})),
        ),
    }
}
