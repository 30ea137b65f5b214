// Client configuration read from the environment

use crate::search::DEFAULT_DEBOUNCE;
use anyhow::{Context, Result};
use std::time::Duration;

const DEFAULT_SERVER_URL: &str = "ws://127.0.0.1:9001/ws";
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server_url: String,
    pub debounce: Duration,
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            server_url: DEFAULT_SERVER_URL.to_string(),
            debounce: DEFAULT_DEBOUNCE,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = ClientConfig::default();

        if let Some(url) = lookup("SERVER_URL") {
            config.server_url = url;
        }
        if let Some(millis) = lookup("SEARCH_DEBOUNCE_MS") {
            config.debounce = parse_millis("SEARCH_DEBOUNCE_MS", &millis)?;
        }
        if let Some(millis) = lookup("REQUEST_TIMEOUT_MS") {
            config.request_timeout = parse_millis("REQUEST_TIMEOUT_MS", &millis)?;
        }

        Ok(config)
    }
}

fn parse_millis(key: &str, value: &str) -> Result<Duration> {
    let millis: u64 = value
        .trim()
        .parse()
        .with_context(|| format!("Invalid {key}: {value}"))?;
    Ok(Duration::from_millis(millis))
}
