//! Service configuration loaded from environment variables.
//!
//! Secrets default to development placeholders with a warning so the
//! server can start with zero configuration locally; deployments set the
//! real values.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

/// Service configuration.
#[derive(Clone)]
pub struct Config {
    /// Socket address for the HTTP (axum) API server.
    /// Env: `PARLEY_HTTP_ADDR`
    /// Default: `0.0.0.0:8080`
    pub http_addr: SocketAddr,

    /// SQLite database file path.
    /// Env: `PARLEY_DATABASE_PATH`
    /// Default: `~/.parley/parley.db`
    pub database_path: PathBuf,

    /// Generation backend endpoint (a `generateContent`-style API).
    /// Env: `PARLEY_GENERATION_ENDPOINT`
    pub generation_endpoint: String,

    /// Generation backend API key.
    /// Env: `PARLEY_GENERATION_API_KEY`
    pub generation_api_key: SecretString,

    /// Upper bound on one generation call.
    /// Env: `PARLEY_GENERATION_TIMEOUT_SECS`
    /// Default: `30`
    pub generation_timeout: Duration,

    /// HS256 secret for session bearer tokens.
    /// Env: `PARLEY_SESSION_SECRET`
    pub session_secret: SecretString,

    /// Identity-provider webhook signing secret (`whsec_...` or raw).
    /// Env: `PARLEY_WEBHOOK_SECRET`
    pub webhook_secret: SecretString,

    /// Acceptance window for webhook timestamps, either side of now.
    /// Env: `PARLEY_WEBHOOK_TOLERANCE_SECS`
    /// Default: `300`
    pub webhook_tolerance: Duration,

    /// Minimum prompt length after trimming.
    /// Env: `PARLEY_MIN_PROMPT_CHARS`
    /// Default: `5`
    pub min_prompt_chars: usize,
}

impl Default for Config {
    fn default() -> Self {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
        Self {
            http_addr: ([0, 0, 0, 0], 8080).into(),
            database_path: PathBuf::from(home).join(".parley").join("parley.db"),
            generation_endpoint:
                "https://generativelanguage.googleapis.com/v1beta/models/gemini-1.5-flash:generateContent"
                    .to_string(),
            generation_api_key: SecretString::from(""),
            generation_timeout: Duration::from_secs(30),
            session_secret: SecretString::from("dev-session-secret"),
            webhook_secret: SecretString::from("dev-webhook-secret"),
            webhook_tolerance: Duration::from_secs(300),
            min_prompt_chars: 5,
        }
    }
}

impl Config {
    /// Load configuration from environment variables, falling back to
    /// defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("PARLEY_HTTP_ADDR") {
            if let Ok(parsed) = addr.parse::<SocketAddr>() {
                config.http_addr = parsed;
            } else {
                tracing::warn!(value = %addr, "Invalid PARLEY_HTTP_ADDR, using default");
            }
        }

        if let Ok(path) = std::env::var("PARLEY_DATABASE_PATH") {
            config.database_path = PathBuf::from(path);
        }

        if let Ok(endpoint) = std::env::var("PARLEY_GENERATION_ENDPOINT") {
            config.generation_endpoint = endpoint;
        }

        match std::env::var("PARLEY_GENERATION_API_KEY") {
            Ok(key) if !key.is_empty() => config.generation_api_key = SecretString::from(key),
            _ => tracing::warn!("PARLEY_GENERATION_API_KEY not set, generation calls will fail"),
        }

        if let Ok(val) = std::env::var("PARLEY_GENERATION_TIMEOUT_SECS") {
            if let Ok(secs) = val.parse::<u64>() {
                config.generation_timeout = Duration::from_secs(secs);
            }
        }

        match std::env::var("PARLEY_SESSION_SECRET") {
            Ok(secret) if !secret.is_empty() => config.session_secret = SecretString::from(secret),
            _ => tracing::warn!("PARLEY_SESSION_SECRET not set, using development secret"),
        }

        match std::env::var("PARLEY_WEBHOOK_SECRET") {
            Ok(secret) if !secret.is_empty() => config.webhook_secret = SecretString::from(secret),
            _ => tracing::warn!("PARLEY_WEBHOOK_SECRET not set, using development secret"),
        }

        if let Ok(val) = std::env::var("PARLEY_WEBHOOK_TOLERANCE_SECS") {
            if let Ok(secs) = val.parse::<u64>() {
                config.webhook_tolerance = Duration::from_secs(secs);
            }
        }

        if let Ok(val) = std::env::var("PARLEY_MIN_PROMPT_CHARS") {
            if let Ok(n) = val.parse::<usize>() {
                config.min_prompt_chars = n;
            }
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter.

        config
    }
}
