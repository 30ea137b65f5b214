// Server configuration read from the environment

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,

    // Snapshot file; the collection is memory-only when unset
    pub data_file: Option<PathBuf>,

    // Simulated latency applied to every reply
    pub response_delay: Duration,

    // Start from the fixture when there is no snapshot to restore
    pub seed_fixture: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 9001)),
            data_file: None,
            response_delay: Duration::ZERO,
            seed_fixture: true,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = ServerConfig::default();

        if let Some(addr) = lookup("BIND_ADDR") {
            config.bind_addr = addr
                .parse()
                .with_context(|| format!("Invalid BIND_ADDR: {addr}"))?;
        }

        config.data_file = lookup("DATA_FILE")
            .filter(|path| !path.is_empty())
            .map(PathBuf::from);

        if let Some(delay) = lookup("RESPONSE_DELAY_MS") {
            let millis: u64 = delay
                .parse()
                .with_context(|| format!("Invalid RESPONSE_DELAY_MS: {delay}"))?;
            config.response_delay = Duration::from_millis(millis);
        }

        if let Some(seed) = lookup("SEED_FIXTURE") {
            config.seed_fixture = seed
                .parse()
                .with_context(|| format!("Invalid SEED_FIXTURE: {seed}"))?;
        }

        Ok(config)
    }
}
