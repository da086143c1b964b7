use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use std::time::Duration;

use crate::http_client::ClientSettings;

/// Connection and session settings shared by every command
#[derive(Args, Debug, Clone)]
pub struct CliArgs {
    /// Base URL of the PawCare API
    #[arg(short = 'u', long, env = "PAWCARE_API_URL", default_value = "http://localhost:8080/api")]
    pub api_url: String,

    /// Path to the session database
    #[arg(short = 's', long, env = "PAWCARE_SESSION_FILE")]
    pub session_file: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "warn")]
    pub log_level: String,

    /// HTTP request timeout in seconds
    #[arg(long, env = "HTTP_REQUEST_TIMEOUT", default_value = "30")]
    pub http_timeout: u64,

    /// Seconds a request queued behind a session refresh waits before failing
    #[arg(long, env = "REFRESH_QUEUE_TIMEOUT", default_value = "30")]
    pub refresh_queue_timeout: u64,
}

#[derive(Clone, Debug)]
pub struct Config {
    // API
    pub api_base_url: String,
    pub refresh_path: String,
    pub login_path: String,

    // Session storage
    pub session_file: PathBuf,

    // HTTP client
    pub http_max_connections: usize,
    pub http_connect_timeout: u64,
    pub http_request_timeout: u64,

    // Session recovery
    pub refresh_queue_timeout: u64,
    pub redirect_delay_ms: u64,
    pub notification_duration_ms: u64,

    // Logging
    pub log_level: String,
}

impl Config {
    /// Build configuration with priority: CLI > ENV > defaults
    pub fn from_args(args: &CliArgs) -> Result<Self> {
        let session_file = match args.session_file {
            Some(ref s) => expand_tilde(s),
            None => default_session_file()
                .context("Could not determine home directory (set PAWCARE_SESSION_FILE)")?,
        };

        let config = Config {
            api_base_url: args.api_url.clone(),

            refresh_path: std::env::var("PAWCARE_REFRESH_PATH")
                .unwrap_or_else(|_| "/auth/refresh".to_string()),

            login_path: std::env::var("PAWCARE_LOGIN_PATH")
                .unwrap_or_else(|_| "/auth/login".to_string()),

            session_file,

            http_max_connections: env_or("HTTP_MAX_CONNECTIONS", 10),
            http_connect_timeout: env_or("HTTP_CONNECT_TIMEOUT", 10),
            http_request_timeout: args.http_timeout,

            refresh_queue_timeout: args.refresh_queue_timeout,
            redirect_delay_ms: env_or("REDIRECT_DELAY_MS", 1200),
            notification_duration_ms: env_or("NOTIFICATION_DURATION_MS", 3000),

            log_level: args.log_level.clone(),
        };

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if !self.api_base_url.starts_with("http://") && !self.api_base_url.starts_with("https://")
        {
            anyhow::bail!(
                "PAWCARE_API_URL must start with http:// or https://: {}",
                self.api_base_url
            );
        }

        for (name, path) in [
            ("PAWCARE_REFRESH_PATH", &self.refresh_path),
            ("PAWCARE_LOGIN_PATH", &self.login_path),
        ] {
            if !path.starts_with('/') {
                anyhow::bail!("{} must start with '/': {}", name, path);
            }
        }

        if self.refresh_queue_timeout == 0 {
            anyhow::bail!("REFRESH_QUEUE_TIMEOUT must be at least 1 second");
        }

        Ok(())
    }

    /// Session-recovery settings for the API client
    pub fn client_settings(&self) -> ClientSettings {
        ClientSettings {
            refresh_path: self.refresh_path.clone(),
            login_path: self.login_path.clone(),
            queue_wait_timeout: Duration::from_secs(self.refresh_queue_timeout),
            redirect_delay: Duration::from_millis(self.redirect_delay_ms),
            notification_duration: Duration::from_millis(self.notification_duration_ms),
        }
    }
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// Default session database location
fn default_session_file() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".pawcare").join("session.sqlite3"))
}

/// Expand tilde (~) in file paths to user's home directory
fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
