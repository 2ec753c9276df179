//! Server-rendered HTML pages.
//!
//! The interesting surface of this server is its JSON API; these pages
//! are a minimal shell around it. `/profile` requires a session and
//! redirects to `/` otherwise — page endpoints never answer with JSON
//! errors.

use super::AppState;
use axum::{
    extract::State,
    http::HeaderMap,
    response::{Html, IntoResponse, Redirect},
};

/// GET / — landing page.
pub async fn handle_home(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    let username = super::session_user(&state, &headers);
    Html(render_home(username.as_deref()))
}

/// GET /about
pub async fn handle_about() -> impl IntoResponse {
    Html(render_about())
}

/// GET /profile — session required; anonymous visitors go home.
pub async fn handle_profile(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let Some(username) = super::session_user(&state, &headers) else {
        return Redirect::to("/").into_response();
    };

    let stories = state.store.stories_for(&username);
    let favorites = stories.iter().filter(|s| s.favorite).count();
    Html(render_profile(&username, stories.len(), favorites)).into_response()
}

// ── HTML Templates ────────────────────────────────────────────────────

fn base_style() -> &'static str {
    r#"
    * { margin: 0; padding: 0; box-sizing: border-box; }
    body {
        font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
        background: #f5f5f5; color: #333;
        display: flex; justify-content: center; align-items: center;
        min-height: 100vh; padding: 20px;
    }
    .card {
        background: #fff; border-radius: 16px; padding: 32px;
        max-width: 440px; width: 100%; box-shadow: 0 4px 24px rgba(0,0,0,0.08);
    }
    .logo { text-align: center; margin-bottom: 24px; }
    .logo h1 { font-size: 28px; color: #1a1a2e; }
    .logo p { font-size: 14px; color: #666; margin-top: 4px; }
    .stats { display: flex; gap: 12px; margin: 16px 0; }
    .stat {
        flex: 1; text-align: center; padding: 16px;
        background: #f0f4ff; border-radius: 12px;
    }
    .stat .value { font-size: 32px; font-weight: 700; color: #1a1a2e; }
    .stat .label { font-size: 13px; color: #666; margin-top: 4px; }
    .link { text-align: center; margin-top: 16px; font-size: 14px; color: #666; }
    .link a { color: #4a6cf7; text-decoration: none; }
    .link a:hover { text-decoration: underline; }
    "#
}

fn render_home(username: Option<&str>) -> String {
    let greeting = match username {
        Some(name) => format!("Signed in as <strong>{}</strong>", escape_html(name)),
        None => "Sign in via the API to start generating stories".to_string(),
    };

    format!(
        r#"<!DOCTYPE html>
<html lang="en"><head>
<meta charset="utf-8"><meta name="viewport" content="width=device-width,initial-scale=1">
<title>StoryLoom</title>
<style>{style}</style>
</head><body>
<div class="card">
  <div class="logo"><h1>StoryLoom</h1><p>One-line ideas, full short stories</p></div>
  <p style="text-align:center;font-size:14px;color:#666;">{greeting}</p>
  <div class="link"><a href="/about">About</a> · <a href="/profile">Profile</a></div>
</div>
</body></html>"#,
        style = base_style(),
    )
}

fn render_about() -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en"><head>
<meta charset="utf-8"><meta name="viewport" content="width=device-width,initial-scale=1">
<title>StoryLoom - About</title>
<style>{style}</style>
</head><body>
<div class="card">
  <div class="logo"><h1>About</h1><p>StoryLoom</p></div>
  <p style="font-size:14px;color:#666;line-height:1.6;">
    StoryLoom turns a one-line idea into a complete short story in your
    chosen genre, tone and length. Stories are generated by an external
    language model and saved to your personal collection, where you can
    favorite or delete them.
  </p>
  <div class="link"><a href="/">Home</a></div>
</div>
</body></html>"#,
        style = base_style(),
    )
}

fn render_profile(username: &str, story_count: usize, favorite_count: usize) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en"><head>
<meta charset="utf-8"><meta name="viewport" content="width=device-width,initial-scale=1">
<title>StoryLoom - Profile</title>
<style>{style}</style>
</head><body>
<div class="card">
  <div class="logo"><h1>{username}</h1><p>Your collection</p></div>
  <div class="stats">
    <div class="stat"><div class="value">{story_count}</div><div class="label">Stories</div></div>
    <div class="stat"><div class="value">{favorite_count}</div><div class="label">Favorites</div></div>
  </div>
  <div class="link"><a href="/">Home</a></div>
</div>
</body></html>"#,
        style = base_style(),
        username = escape_html(username),
    )
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::{GenerateError, StoryGenerator, StoryRequest};
    use crate::session::SessionKeeper;
    use crate::store::UserStore;
    use async_trait::async_trait;
    use axum::http::{header, HeaderValue, StatusCode};
    use std::sync::Arc;
    use tempfile::TempDir;

    struct NoGenerator;

    #[async_trait]
    impl StoryGenerator for NoGenerator {
        async fn generate(&self, _req: &StoryRequest) -> Result<String, GenerateError> {
            Err(GenerateError::EmptyResponse)
        }
    }

    fn test_state() -> (TempDir, AppState) {
        let tmp = TempDir::new().unwrap();
        let state = AppState {
            store: Arc::new(UserStore::new(
                tmp.path().join("users.json"),
                tmp.path().join("static").join("users.js"),
            )),
            sessions: Arc::new(SessionKeeper::new("test-secret", 3600)),
            generator: Arc::new(NoGenerator),
        };
        (tmp, state)
    }

    #[tokio::test]
    async fn profile_redirects_anonymous_visitors_home() {
        let (_tmp, state) = test_state();
        let response = handle_profile(State(state), HeaderMap::new())
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            response.headers().get(header::LOCATION),
            Some(&HeaderValue::from_static("/"))
        );
    }

    #[tokio::test]
    async fn profile_renders_for_a_valid_session() {
        let (_tmp, state) = test_state();
        state
            .store
            .create_user(crate::store::UserRecord::with_password("alice", "secret1"))
            .unwrap();

        let token = state.sessions.issue("alice");
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_str(&format!("storyloom_session={token}")).unwrap(),
        );

        let response = handle_profile(State(state), headers).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn rendered_pages_escape_usernames() {
        let page = render_profile("<script>alert(1)</script>", 0, 0);
        assert!(!page.contains("<script>alert"));
        assert!(page.contains("&lt;script&gt;"));
    }
}
