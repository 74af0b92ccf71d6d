//! Service configuration.

use crate::broadcast::{BroadcastConfig, DEFAULT_CATCHUP_BATCH};
use crate::store::StoreConfig;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Default HTTP port.
pub const DEFAULT_PORT: u16 = 3001;

/// Everything the service needs to start.
#[derive(Clone, Debug)]
pub struct FeedConfig {
    /// Directory of the durable store.
    pub data_dir: PathBuf,

    /// Keep activities in memory only. Nothing survives a restart.
    pub in_memory: bool,

    /// Address the HTTP gateway binds to.
    pub bind: SocketAddr,

    /// Key required to submit activities. Generated at startup when unset.
    pub api_key: Option<String>,

    /// Origin prefixes allowed to submit without a key.
    pub allowed_origins: Vec<String>,

    pub broadcast: BroadcastConfig,

    /// Activities replayed to a reconnecting listener.
    pub catchup_batch: usize,

    /// Decoded activities cached by the durable store.
    pub cache_size: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            in_memory: false,
            bind: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            api_key: None,
            allowed_origins: Vec::new(),
            broadcast: BroadcastConfig::default(),
            catchup_batch: DEFAULT_CATCHUP_BATCH,
            cache_size: StoreConfig::default().cache_size,
        }
    }
}

impl FeedConfig {
    /// Store configuration derived from this config.
    pub fn store(&self) -> StoreConfig {
        StoreConfig {
            path: self.data_dir.clone(),
            cache_size: self.cache_size,
            ..Default::default()
        }
    }
}

/// Split a comma separated origin list, dropping blanks.
pub fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_defaults() {
        let config = FeedConfig::default();
        assert_eq!(config.bind.port(), 3001);
        assert_eq!(config.catchup_batch, 50);
        assert_eq!(config.broadcast.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(config.store().path, PathBuf::from("./data"));
    }

    #[test]
    fn test_parse_origins() {
        assert_eq!(
            parse_origins(" https://app.example.com, ,http://localhost:3000 "),
            vec!["https://app.example.com", "http://localhost:3000"]
        );
        assert!(parse_origins("").is_empty());
    }
}
