//! Configuration types and structures.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default HTTP port.
pub const DEFAULT_PORT: u16 = 5000;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub tasks: TasksConfig,

    #[serde(default)]
    pub analytics: AnalyticsConfig,
}

/// HTTP listener and storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// SQLite database file.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Externally reachable base URL, used for the OAuth redirect.
    /// Defaults to `http://{host}:{port}`.
    #[serde(default)]
    pub public_url: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            db_path: default_db_path(),
            public_url: None,
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_db_path() -> PathBuf {
    PathBuf::from("taskhub/taskhub.db")
}

/// Session and identity provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HS256 signing secret. Generated and persisted next to the database when unset.
    #[serde(default)]
    pub session_secret: Option<String>,

    #[serde(default = "default_session_ttl_hours")]
    pub session_ttl_hours: i64,

    /// Mark cookies `Secure` (enable behind HTTPS).
    #[serde(default)]
    pub cookie_secure: bool,

    #[serde(default)]
    pub google: GoogleConfig,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_secret: None,
            session_ttl_hours: default_session_ttl_hours(),
            cookie_secure: false,
            google: GoogleConfig::default(),
        }
    }
}

fn default_session_ttl_hours() -> i64 {
    24 * 7
}

/// Google OAuth client credentials. Login is disabled unless both are set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GoogleConfig {
    #[serde(default)]
    pub client_id: Option<String>,

    #[serde(default)]
    pub client_secret: Option<String>,
}

impl GoogleConfig {
    /// Both credentials, if configured and non-empty.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        let id = self.client_id.as_deref().filter(|s| !s.is_empty())?;
        let secret = self.client_secret.as_deref().filter(|s| !s.is_empty())?;
        Some((id, secret))
    }
}

/// Task listing limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TasksConfig {
    #[serde(default = "default_page_size")]
    pub default_page_size: u32,

    #[serde(default = "default_max_page_size")]
    pub max_page_size: u32,
}

impl Default for TasksConfig {
    fn default() -> Self {
        Self {
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
        }
    }
}

fn default_page_size() -> u32 {
    20
}

fn default_max_page_size() -> u32 {
    100
}

/// Analytics window limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    #[serde(default = "default_productivity_days")]
    pub default_productivity_days: u32,

    #[serde(default = "default_max_productivity_days")]
    pub max_productivity_days: u32,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            default_productivity_days: default_productivity_days(),
            max_productivity_days: default_max_productivity_days(),
        }
    }
}

fn default_productivity_days() -> u32 {
    7
}

fn default_max_productivity_days() -> u32 {
    365
}

impl Config {
    /// Load configuration from file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        // Empty or comment-only files parse as null
        let config: Option<Config> = serde_yaml::from_str(&content)?;
        Ok(config.unwrap_or_default())
    }

    /// Ensure the database directory exists.
    pub fn ensure_db_dir(&self) -> Result<()> {
        if let Some(parent) = self.server.db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }

    /// Base URL clients reach the server on.
    pub fn public_url(&self) -> String {
        match self.server.public_url.as_deref() {
            Some(url) if !url.is_empty() => url.trim_end_matches('/').to_string(),
            _ => format!("http://{}:{}", self.server.host, self.server.port),
        }
    }

    /// OAuth callback URL registered with Google.
    pub fn google_redirect_url(&self) -> String {
        format!("{}/api/auth/google/callback", self.public_url())
    }

    /// File holding the generated session secret when none is configured.
    pub fn session_secret_path(&self) -> PathBuf {
        self.server
            .db_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join("session-secret")
    }

    /// Clamp a requested page size into `1..=max_page_size`.
    pub fn page_size(&self, requested: Option<u32>) -> u32 {
        requested
            .unwrap_or(self.tasks.default_page_size)
            .clamp(1, self.tasks.max_page_size.max(1))
    }

    /// Clamp a requested productivity window into `1..=max_productivity_days`.
    pub fn productivity_days(&self, requested: Option<u32>) -> u32 {
        requested
            .unwrap_or(self.analytics.default_productivity_days)
            .clamp(1, self.analytics.max_productivity_days.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.server.port, DEFAULT_PORT);
        assert_eq!(config.auth.session_ttl_hours, 168);
        assert_eq!(config.tasks.default_page_size, 20);
        assert_eq!(config.analytics.default_productivity_days, 7);
        assert_eq!(config.public_url(), "http://127.0.0.1:5000");
        assert!(config.auth.google.credentials().is_none());
    }

    #[test]
    fn clamps_page_size_and_window() {
        let config = Config::default();
        assert_eq!(config.page_size(None), 20);
        assert_eq!(config.page_size(Some(0)), 1);
        assert_eq!(config.page_size(Some(1000)), 100);
        assert_eq!(config.productivity_days(Some(30)), 30);
        assert_eq!(config.productivity_days(Some(10_000)), 365);
    }

    #[test]
    fn public_url_override_drops_trailing_slash() {
        let mut config = Config::default();
        config.server.public_url = Some("https://tasks.example.com/".into());
        assert_eq!(
            config.google_redirect_url(),
            "https://tasks.example.com/api/auth/google/callback"
        );
    }

    #[test]
    fn partial_yaml_keeps_defaults() {
        let config: Config = serde_yaml::from_str("server:\n  port: 8080\n").unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.tasks.max_page_size, 100);
    }
}
