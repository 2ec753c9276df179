//! Startup configuration.
//!
//! Loaded once from a TOML file (every section optional, serde defaults
//! fill the gaps), then overridden by environment variables for the two
//! secrets. The resulting `Config` is passed explicitly into the gateway
//! and session components — nothing reads ambient process state later.

use crate::session::{DEFAULT_SESSION_TTL_SECS, DEV_SESSION_SECRET};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Environment variable carrying the story-provider API key.
pub const ENV_API_KEY: &str = "STORYLOOM_API_KEY";
/// Environment variable carrying the cookie-signing secret.
pub const ENV_SESSION_SECRET: &str = "STORYLOOM_SESSION_SECRET";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub session: SessionConfig,
    pub generator: GeneratorConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            store: StoreConfig::default(),
            session: SessionConfig::default(),
            generator: GeneratorConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 5000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Canonical JSON document.
    pub users_path: String,
    /// Browser mirror (`window.USER_DB = …;`).
    pub mirror_path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            users_path: "users.json".into(),
            mirror_path: "static/users.js".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Cookie-signing secret. The compiled-in default is insecure and is
    /// reported at startup; set `STORYLOOM_SESSION_SECRET` in production.
    pub secret: String,
    pub ttl_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            secret: DEV_SESSION_SECRET.into(),
            ttl_secs: DEFAULT_SESSION_TTL_SECS,
        }
    }
}

impl SessionConfig {
    /// Whether the insecure development secret is still in effect.
    pub fn uses_dev_secret(&self) -> bool {
        self.secret == DEV_SESSION_SECRET
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Base URL of the generateContent-style API.
    pub api_url: String,
    /// Provider API key; normally injected via `STORYLOOM_API_KEY`.
    pub api_key: String,
    pub model: String,
    /// Whole-request timeout for one generation call.
    pub timeout_secs: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            api_url: "https://generativelanguage.googleapis.com/v1beta".into(),
            api_key: String::new(),
            model: "gemini-1.5-flash".into(),
            timeout_secs: 60,
        }
    }
}

impl Config {
    /// Load configuration: TOML file (if present) + environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) if path.exists() => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("reading config {}", path.display()))?;
                toml::from_str(&raw)
                    .with_context(|| format!("parsing config {}", path.display()))?
            }
            _ => Self::default(),
        };
        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Apply environment overrides via a lookup function (injectable for
    /// tests so they never mutate real process environment).
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup(ENV_API_KEY).filter(|v| !v.trim().is_empty()) {
            self.generator.api_key = key.trim().to_string();
        }
        if let Some(secret) = lookup(ENV_SESSION_SECRET).filter(|v| !v.trim().is_empty()) {
            self.session.secret = secret.trim().to_string();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sensible() {
        let config = Config::default();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.store.users_path, "users.json");
        assert_eq!(config.store.mirror_path, "static/users.js");
        assert!(config.session.uses_dev_secret());
        assert_eq!(config.generator.model, "gemini-1.5-flash");
    }

    #[test]
    fn partial_toml_fills_missing_sections_with_defaults() {
        let config: Config = toml::from_str(
            r#"
            [server]
            port = 8080

            [generator]
            model = "gemini-2.0-pro"
            timeout_secs = 15
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.generator.model, "gemini-2.0-pro");
        assert_eq!(config.generator.timeout_secs, 15);
        assert_eq!(config.store.users_path, "users.json");
    }

    #[test]
    fn env_overrides_secrets() {
        let mut config = Config::default();
        config.apply_env(|name| match name {
            ENV_API_KEY => Some("  api-key-from-env  ".into()),
            ENV_SESSION_SECRET => Some("env-secret".into()),
            _ => None,
        });

        assert_eq!(config.generator.api_key, "api-key-from-env");
        assert_eq!(config.session.secret, "env-secret");
        assert!(!config.session.uses_dev_secret());
    }

    #[test]
    fn blank_env_values_are_ignored() {
        let mut config = Config::default();
        config.apply_env(|name| match name {
            ENV_API_KEY => Some("   ".into()),
            _ => None,
        });
        assert!(config.generator.api_key.is_empty());
        assert!(config.session.uses_dev_secret());
    }

    #[test]
    fn missing_config_file_loads_defaults() {
        let config = Config::load(Some(Path::new("/nonexistent/storyloom.toml"))).unwrap();
        assert_eq!(config.server.port, 5000);
    }
}
