//! Signed-cookie session management.
//!
//! There is no server-side session table: the cookie carries the username
//! and an expiry timestamp, authenticated with HMAC-SHA256 under a
//! server-wide secret. Logout simply clears the cookie; validity is
//! bounded by the embedded expiry and the signature, nothing else.

use crate::auth::constant_time_eq;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::{SystemTime, UNIX_EPOCH};

/// Cookie name carrying the session token.
pub const SESSION_COOKIE: &str = "storyloom_session";

/// Insecure fallback used when no secret is configured. Callers log a
/// warning when this is in effect; it must never reach production.
pub const DEV_SESSION_SECRET: &str = "dev-secret-key-change-me";

/// Default session lifetime: 30 days (seconds).
pub const DEFAULT_SESSION_TTL_SECS: u64 = 30 * 24 * 3600;

/// Issues and validates signed session tokens.
pub struct SessionKeeper {
    key: Vec<u8>,
    ttl_secs: u64,
}

impl SessionKeeper {
    pub fn new(secret: &str, ttl_secs: u64) -> Self {
        Self {
            key: secret.as_bytes().to_vec(),
            ttl_secs,
        }
    }

    /// Create a session token for an authenticated username.
    ///
    /// Token layout: `base64url(username|expires_at) . hex(hmac)`.
    pub fn issue(&self, username: &str) -> String {
        let expires_at = epoch_secs() + self.ttl_secs;
        let payload = format!("{username}|{expires_at}");
        let mac = self.sign(payload.as_bytes()).unwrap_or_default();
        format!("{}.{mac}", URL_SAFE_NO_PAD.encode(payload.as_bytes()))
    }

    /// Validate a token and return the username it identifies.
    /// Returns `None` on a bad signature, malformed payload, or expiry.
    pub fn current_user(&self, token: &str) -> Option<String> {
        let (encoded, mac_hex) = token.split_once('.')?;

        let payload = URL_SAFE_NO_PAD.decode(encoded).ok()?;
        let expected = self.sign(&payload)?;
        if !constant_time_eq(expected.as_bytes(), mac_hex.as_bytes()) {
            return None;
        }

        let payload = String::from_utf8(payload).ok()?;
        let (username, expires_at) = payload.rsplit_once('|')?;
        let expires_at: u64 = expires_at.parse().ok()?;
        if expires_at <= epoch_secs() {
            return None;
        }
        Some(username.to_string())
    }

    /// `Set-Cookie` value establishing a session.
    pub fn cookie_for(&self, token: &str) -> String {
        format!(
            "{SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
            self.ttl_secs
        )
    }

    /// `Set-Cookie` value clearing the session.
    pub fn clearing_cookie() -> String {
        format!("{SESSION_COOKIE}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")
    }

    fn sign(&self, payload: &[u8]) -> Option<String> {
        let mut mac = Hmac::<Sha256>::new_from_slice(&self.key).ok()?;
        mac.update(payload);
        Some(hex::encode(mac.finalize().into_bytes()))
    }
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
