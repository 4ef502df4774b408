use serde::Deserialize;
use std::path::PathBuf;

/// Configuration as stored in TOML files (with optional fields for merging)
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawSublinkConfig {
    /// Directory holding one subdirectory per session
    pub root_dir: Option<PathBuf>,

    #[serde(default)]
    pub pairing: RawPairingConfig,

    #[serde(default)]
    pub reconnect: RawReconnectConfig,

    #[serde(default)]
    pub health: RawHealthConfig,

    #[serde(default)]
    pub loader: RawLoaderConfig,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawPairingConfig {
    /// How long a pairing code stays valid
    pub timeout_secs: Option<u64>,
    pub poll_interval_ms: Option<u64>,
    pub code_request_delay_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawReconnectConfig {
    pub delays_secs: Option<Vec<u64>>,
    /// 0 disables reconnection
    pub max_attempts: Option<u32>,
    pub verify_delay_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawHealthConfig {
    pub interval_secs: Option<u64>,
    pub fail_reset_secs: Option<u64>,
    pub max_consecutive_failures: Option<u32>,
    pub orphan_sweep: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawLoaderConfig {
    pub max_concurrent: Option<usize>,
    pub settle_ms: Option<u64>,
}
