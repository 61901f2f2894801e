use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::lifecycle::PollSettings;
use crate::models::optimization::DEFAULT_USER_ID;

/// Application configuration loaded from environment variables.
/// Every setting has a default; malformed values fail start-up.
#[derive(Debug, Clone)]
pub struct Config {
    pub optimizer_api_url: String,
    pub user_id: String,
    pub poll_interval: Duration,
    pub poll_timeout: Option<Duration>,
    pub http_connect_timeout: Duration,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let poll_interval_ms: u64 = parse_or(&lookup, "POLL_INTERVAL_MS", 2000)?;
        if poll_interval_ms == 0 {
            bail!("POLL_INTERVAL_MS must be greater than zero");
        }

        let poll_timeout = match lookup("POLL_TIMEOUT_SECS").filter(|v| !v.trim().is_empty()) {
            Some(raw) => Some(Duration::from_secs(
                raw.trim()
                    .parse::<u64>()
                    .context("POLL_TIMEOUT_SECS must be a whole number of seconds")?,
            )),
            None => None,
        };

        Ok(Config {
            optimizer_api_url: lookup("OPTIMIZER_API_URL")
                .unwrap_or_else(|| "http://localhost:8000/api".to_string()),
            user_id: lookup("OPTIMIZER_USER_ID").unwrap_or_else(|| DEFAULT_USER_ID.to_string()),
            poll_interval: Duration::from_millis(poll_interval_ms),
            poll_timeout,
            http_connect_timeout: Duration::from_secs(parse_or(
                &lookup,
                "HTTP_CONNECT_TIMEOUT_SECS",
                10,
            )?),
            port: parse_or(&lookup, "PORT", 3000)?,
            rust_log: lookup("RUST_LOG").unwrap_or_else(|| "info".to_string()),
        })
    }

    pub fn poll_settings(&self) -> PollSettings {
        PollSettings {
            interval: self.poll_interval,
            deadline: self.poll_timeout,
        }
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} must be a valid number, got '{raw}'")),
        None => Ok(default),
    }
}
