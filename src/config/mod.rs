pub mod session;

use std::env;
use std::str::FromStr;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

/// Process-wide settings read once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub base_url: String,
    pub environment: String,
    /// Exact paths that skip CSRF validation. Empty unless configured.
    pub csrf_exempt_paths: Vec<String>,
    pub mail_queue_capacity: usize,
    pub mail_workers: usize,
    pub session_purge_interval: std::time::Duration,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = parse_env("PORT", 3000u16)?;
        let base_url = env::var("BASE_URL")
            .unwrap_or_else(|_| format!("http://localhost:{}", port))
            .trim_end_matches('/')
            .to_string();

        let csrf_exempt_paths = env::var("CSRF_EXEMPT_PATHS")
            .map(|value| {
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|path| !path.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://data/guestbook.db".to_string()),
            host,
            port,
            base_url,
            environment: current_environment(),
            csrf_exempt_paths,
            mail_queue_capacity: parse_env("MAIL_QUEUE_CAPACITY", 100usize)?,
            mail_workers: parse_env("MAIL_WORKERS", 2usize)?,
            session_purge_interval: std::time::Duration::from_secs(
                parse_env("SESSION_PURGE_INTERVAL_SECS", 3600u64)?.max(1),
            ),
        })
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_env<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(value) => value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            message: format!("{:?}: {}", value, e),
        }),
        Err(_) => Ok(default),
    }
}

pub(crate) fn current_environment() -> String {
    env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string())
}

pub(crate) fn env_flag_enabled(key: &str) -> bool {
    env::var(key)
        .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "True"))
        .unwrap_or(false)
}
