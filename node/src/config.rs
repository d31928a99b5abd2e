//! Configuration management for the node.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use hearth_engine::RetryPolicy;
use url::Url;

use crate::transport::{parse_peer_url, same_peer};

/// Node configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Listen address
    pub host: String,
    /// Listen port
    pub port: u16,
    /// Directory holding `store.json` and `peers.json`
    pub data_dir: PathBuf,
    /// Peers seeded into the directory at start
    pub peers: Vec<String>,
    /// The URL other nodes use to reach this one
    pub public_url: Option<Url>,
    /// Retry delay unit in milliseconds
    pub retry_base_ms: u64,
    /// Reconnects allowed after the first dial
    pub retry_max_attempts: u32,
    /// How often the retry queue is polled, in milliseconds
    pub tick_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            host: "0.0.0.0".to_string(),
            port: 7878,
            data_dir: PathBuf::from("./hearth-data"),
            peers: Vec::new(),
            public_url: None,
            retry_base_ms: policy.base_delay_ms,
            retry_max_attempts: policy.max_attempts,
            tick_ms: 250,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration from any variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let host = lookup("HEARTH_HOST").unwrap_or(defaults.host);

        let port = match lookup("HEARTH_PORT") {
            Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidPort(raw))?,
            None => defaults.port,
        };

        let data_dir = lookup("HEARTH_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.data_dir);

        let peers = lookup("HEARTH_PEERS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        let public_url = match lookup("HEARTH_PUBLIC_URL").filter(|u| !u.trim().is_empty()) {
            Some(raw) => match parse_peer_url(&raw) {
                Ok(url) => Some(url),
                Err(_) => return Err(ConfigError::InvalidPublicUrl(raw)),
            },
            None => None,
        };

        let retry_base_ms = parse_number(&lookup, "HEARTH_RETRY_BASE_MS", defaults.retry_base_ms)?;
        let retry_max_attempts = parse_number(
            &lookup,
            "HEARTH_RETRY_MAX_ATTEMPTS",
            defaults.retry_max_attempts,
        )?;
        let tick_ms = parse_number(&lookup, "HEARTH_TICK_MS", defaults.tick_ms)?;
        if tick_ms == 0 {
            return Err(ConfigError::InvalidNumber {
                name: "HEARTH_TICK_MS",
                value: "0".to_string(),
            });
        }

        Ok(Self {
            host,
            port,
            data_dir,
            peers,
            public_url,
            retry_base_ms,
            retry_max_attempts,
            tick_ms,
        })
    }

    /// `host:port` to bind.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Whether `peer_id` names this node.
    pub fn is_self(&self, peer_id: &str) -> bool {
        match (&self.public_url, parse_peer_url(peer_id)) {
            (Some(own), Ok(peer)) => same_peer(own, &peer),
            _ => false,
        }
    }

    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join("store.json")
    }

    pub fn peers_path(&self) -> PathBuf {
        self.data_dir.join("peers.json")
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_max_attempts,
            base_delay_ms: self.retry_base_ms,
        }
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }
}

fn parse_number<F, N>(lookup: &F, name: &'static str, default: N) -> Result<N, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    N: std::str::FromStr,
{
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidNumber { name, value: raw }),
        None => Ok(default),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid HEARTH_PORT value: {0:?}")]
    InvalidPort(String),

    #[error("Invalid HEARTH_PUBLIC_URL value: {0:?}")]
    InvalidPublicUrl(String),

    #[error("Invalid {name} value: {value:?}")]
    InvalidNumber { name: &'static str, value: String },
}
