//! Server configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the server can start with zero
//! configuration for local development.

use std::net::SocketAddr;
use std::path::PathBuf;

use palaver_shared::constants::DEFAULT_HISTORY_LIMIT;

/// Development-only JWT secret; overridden via `JWT_SECRET` in production.
const DEV_JWT_SECRET: &str = "palaver-dev-secret-change-in-production";

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP/WebSocket (axum) server.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:3000`
    pub http_addr: SocketAddr,

    /// Filesystem path of the SQLite database.
    /// Env: `DATABASE_PATH`
    /// Default: `./palaver.db`
    pub database_path: PathBuf,

    /// Secret used to sign and verify auth tokens.
    /// Env: `JWT_SECRET`
    /// Default: a development-only value (a warning is logged).
    pub jwt_secret: String,

    /// Base URL of the AI collaborator service.
    /// Env: `AI_SERVICE_URL`
    /// Default: `http://localhost:5000`
    pub ai_service_url: String,

    /// Display name the AI collaborator posts under.
    /// Env: `ASSISTANT_NAME`
    /// Default: `"Assistant"`
    pub assistant_name: String,

    /// Name of the default channel every user auto-joins.
    /// Env: `DEFAULT_CHANNEL`
    /// Default: `"general"`
    pub default_channel: String,

    /// Usernames promoted to admin at startup (comma-separated).
    /// Env: `ADMIN_USERS`
    /// Default: empty.
    pub admin_users: Vec<String>,

    /// How many history messages a channel switch returns.
    /// Env: `HISTORY_LIMIT`
    /// Default: `100`
    pub history_limit: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], 3000).into(),
            database_path: PathBuf::from("./palaver.db"),
            jwt_secret: DEV_JWT_SECRET.to_string(),
            ai_service_url: "http://localhost:5000".to_string(),
            assistant_name: "Assistant".to_string(),
            default_channel: "general".to_string(),
            admin_users: Vec::new(),
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("HTTP_ADDR") {
            if let Ok(parsed) = addr.parse::<SocketAddr>() {
                config.http_addr = parsed;
            } else {
                tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default");
            }
        }

        if let Ok(path) = std::env::var("DATABASE_PATH") {
            config.database_path = PathBuf::from(path);
        }

        match std::env::var("JWT_SECRET") {
            Ok(secret) if !secret.is_empty() => config.jwt_secret = secret,
            _ => {
                tracing::warn!("JWT_SECRET not set, using development default");
            }
        }

        if let Ok(url) = std::env::var("AI_SERVICE_URL") {
            config.ai_service_url = url.trim_end_matches('/').to_string();
        }

        if let Ok(name) = std::env::var("ASSISTANT_NAME") {
            if !name.trim().is_empty() {
                config.assistant_name = name.trim().to_string();
            }
        }

        if let Ok(name) = std::env::var("DEFAULT_CHANNEL") {
            if !name.trim().is_empty() {
                config.default_channel = name.trim().to_string();
            }
        }

        if let Ok(list) = std::env::var("ADMIN_USERS") {
            config.admin_users = list
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        if let Ok(val) = std::env::var("HISTORY_LIMIT") {
            if let Ok(n) = val.parse::<u32>() {
                config.history_limit = n;
            }
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter,
        // so we do not store it here.

        config
    }
}
