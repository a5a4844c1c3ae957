use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::verification::github::DEFAULT_API_URL;
use crate::verification::orchestrator::{
    DEFAULT_CLAIM_PARALLELISM, DEFAULT_ENGINE_TIMEOUT, DEFAULT_MAX_CONCURRENCY,
};

const DEFAULT_RETENTION_HOURS: i64 = 24;

/// Application configuration loaded from environment variables.
/// Every key is optional; unset keys fall back to defaults.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub rust_log: String,
    /// In-memory storage when unset.
    pub database_url: Option<String>,
    pub github_token: Option<String>,
    pub github_api_url: String,
    /// Enables the LLM entity tagger when set.
    pub anthropic_api_key: Option<String>,
    pub verify_max_concurrency: usize,
    /// Claims of one document verified at the same time.
    pub verify_claim_parallelism: usize,
    pub verify_engine_timeout: Duration,
    pub retention: chrono::Duration,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            port: 8080,
            rust_log: "info".to_string(),
            database_url: None,
            github_token: None,
            github_api_url: DEFAULT_API_URL.to_string(),
            anthropic_api_key: None,
            verify_max_concurrency: DEFAULT_MAX_CONCURRENCY,
            verify_claim_parallelism: DEFAULT_CLAIM_PARALLELISM,
            verify_engine_timeout: DEFAULT_ENGINE_TIMEOUT,
            retention: chrono::Duration::hours(DEFAULT_RETENTION_HOURS),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Config::default();
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let timeout_secs: u64 = parse_or(
            get("VERIFY_ENGINE_TIMEOUT_SECS"),
            defaults.verify_engine_timeout.as_secs(),
        )
        .context("VERIFY_ENGINE_TIMEOUT_SECS must be a whole number of seconds")?;
        let retention_hours: i64 = parse_or(get("RETENTION_HOURS"), DEFAULT_RETENTION_HOURS)
            .context("RETENTION_HOURS must be a whole number of hours")?;

        Ok(Config {
            port: parse_or(get("PORT"), defaults.port)
                .context("PORT must be a valid port number")?,
            rust_log: get("RUST_LOG").unwrap_or(defaults.rust_log),
            database_url: get("DATABASE_URL"),
            github_token: get("GITHUB_TOKEN"),
            github_api_url: get("GITHUB_API_URL").unwrap_or(defaults.github_api_url),
            anthropic_api_key: get("ANTHROPIC_API_KEY"),
            verify_max_concurrency: parse_or(
                get("VERIFY_MAX_CONCURRENCY"),
                defaults.verify_max_concurrency,
            )
            .context("VERIFY_MAX_CONCURRENCY must be a positive integer")?
            .max(1),
            verify_claim_parallelism: parse_or(
                get("VERIFY_CLAIM_PARALLELISM"),
                defaults.verify_claim_parallelism,
            )
            .context("VERIFY_CLAIM_PARALLELISM must be a positive integer")?
            .max(1),
            verify_engine_timeout: Duration::from_secs(timeout_secs.max(1)),
            retention: chrono::Duration::hours(retention_hours.max(1)),
        })
    }
}

fn parse_or<T: FromStr>(value: Option<String>, default: T) -> Result<T, T::Err> {
    match value {
        Some(raw) => raw.parse(),
        None => Ok(default),
    }
}
