//! Lifecycle configuration types

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the session lifecycle manager
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Directory holding one subdirectory per session
    pub root_dir: PathBuf,

    pub pairing: PairingConfig,

    pub reconnect: ReconnectConfig,

    pub health: HealthConfig,

    pub loader: LoaderConfig,

    pub presence: PresenceConfig,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            root_dir: sublink_paths::sessions_dir(),
            pairing: PairingConfig::default(),
            reconnect: ReconnectConfig::default(),
            health: HealthConfig::default(),
            loader: LoaderConfig::default(),
            presence: PresenceConfig::default(),
        }
    }
}

impl LifecycleConfig {
    /// Default configuration rooted at a specific directory
    pub fn with_root(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            ..Self::default()
        }
    }
}

/// Pairing workflow timing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PairingConfig {
    /// How long a pending session may wait for the pair event
    pub timeout_secs: u64,

    /// Resolution at which the wait loop re-checks the registry
    pub poll_interval_ms: u64,

    /// Pause between connecting and requesting the pairing code
    pub code_request_delay_ms: u64,
}

impl Default for PairingConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 180,
            poll_interval_ms: 1000,
            code_request_delay_ms: 1000,
        }
    }
}

impl PairingConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        // A zero period would make the interval panic
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn code_request_delay(&self) -> Duration {
        Duration::from_millis(self.code_request_delay_ms)
    }
}

/// Reconnection schedule
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReconnectConfig {
    /// Delay before each attempt; attempts past the end reuse the last entry
    pub delays_secs: Vec<u64>,

    /// Attempts before the session is removed; 0 disables reconnection
    pub max_attempts: u32,

    /// Wait after a successful connect before re-checking the link
    pub verify_delay_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            delays_secs: vec![5, 10, 20, 30, 60],
            max_attempts: 5,
            verify_delay_ms: 3000,
        }
    }
}

impl ReconnectConfig {
    pub fn verify_delay(&self) -> Duration {
        Duration::from_millis(self.verify_delay_ms)
    }
}

/// Health sweep thresholds
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HealthConfig {
    pub interval_secs: u64,

    /// Failures older than this no longer count toward escalation
    pub fail_reset_secs: u64,

    /// Consecutive disconnected sweeps before a session is removed
    pub max_consecutive_failures: u32,

    /// Delete untracked session directories that hold no identity
    pub orphan_sweep: bool,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            fail_reset_secs: 300,
            max_consecutive_failures: 10,
            orphan_sweep: true,
        }
    }
}

impl HealthConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }

    pub fn fail_reset(&self) -> Duration {
        Duration::from_secs(self.fail_reset_secs)
    }
}

/// Startup loader limits
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoaderConfig {
    pub max_concurrent: usize,

    /// Wait after connect before verifying a restored session
    pub settle_ms: u64,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 5,
            settle_ms: 500,
        }
    }
}

impl LoaderConfig {
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

/// Redundant presence announcements sent after a session comes online
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PresenceConfig {
    pub paired_repeats: u32,
    pub paired_gap_ms: u64,
    pub connected_repeats: u32,
    pub connected_gap_ms: u64,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            paired_repeats: 2,
            paired_gap_ms: 500,
            connected_repeats: 3,
            connected_gap_ms: 300,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_lifecycle_timings() {
        let config = LifecycleConfig::default();
        assert_eq!(config.pairing.timeout(), Duration::from_secs(180));
        assert_eq!(config.pairing.poll_interval(), Duration::from_secs(1));
        assert_eq!(config.reconnect.delays_secs, vec![5, 10, 20, 30, 60]);
        assert_eq!(config.reconnect.max_attempts, 5);
        assert_eq!(config.reconnect.verify_delay(), Duration::from_secs(3));
        assert_eq!(config.health.interval(), Duration::from_secs(60));
        assert_eq!(config.health.fail_reset(), Duration::from_secs(300));
        assert_eq!(config.health.max_consecutive_failures, 10);
        assert_eq!(config.loader.max_concurrent, 5);
        assert_eq!(config.loader.settle(), Duration::from_millis(500));
    }

    #[test]
    fn with_root_keeps_other_defaults() {
        let config = LifecycleConfig::with_root("/tmp/sessions");
        assert_eq!(config.root_dir, PathBuf::from("/tmp/sessions"));
        assert_eq!(config.health, HealthConfig::default());
    }

    #[test]
    fn partial_toml_fills_in_defaults() {
        let toml_str = r#"
root_dir = "/srv/sublink"

[reconnect]
max_attempts = 3

[health]
orphan_sweep = false
"#;
        let config: LifecycleConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.root_dir, PathBuf::from("/srv/sublink"));
        assert_eq!(config.reconnect.max_attempts, 3);
        assert_eq!(config.reconnect.delays_secs, vec![5, 10, 20, 30, 60]);
        assert!(!config.health.orphan_sweep);
        assert_eq!(config.pairing, PairingConfig::default());
    }

    #[test]
    fn zero_poll_interval_is_clamped() {
        let pairing = PairingConfig {
            poll_interval_ms: 0,
            ..PairingConfig::default()
        };
        assert_eq!(pairing.poll_interval(), Duration::from_millis(1));
    }
}
