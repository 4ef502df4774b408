use super::types::{
    RawHealthConfig, RawLoaderConfig, RawPairingConfig, RawReconnectConfig, RawSublinkConfig,
};
use anyhow::Result;
use std::path::{Path, PathBuf};
use sublink_core::LifecycleConfig;

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load merged configuration (user + project)
    pub fn load() -> Result<LifecycleConfig> {
        Self::load_from(&Self::user_config_path(), &Self::project_config_path())
    }

    /// Load and merge the two layers from explicit paths
    pub fn load_from(user_path: &Path, project_path: &Path) -> Result<LifecycleConfig> {
        let mut raw = RawSublinkConfig::default();

        // Layer 1: User config
        if user_path.exists() {
            raw = Self::merge_raw(raw, Self::read_raw(user_path)?);
        }

        // Layer 2: Project config
        if project_path.exists() {
            raw = Self::merge_raw(raw, Self::read_raw(project_path)?);
        }

        // Convert to final config with defaults applied
        Ok(Self::finalize(raw))
    }

    /// Get user config path (`$XDG_CONFIG_HOME/sublink/config.toml`)
    pub fn user_config_path() -> PathBuf {
        sublink_paths::config_dir().join("config.toml")
    }

    /// Get project config path
    /// Can be overridden with SUBLINK_PROJECT_CONFIG_DIR env var (useful for isolated tests)
    pub fn project_config_path() -> PathBuf {
        if let Ok(dir) = std::env::var("SUBLINK_PROJECT_CONFIG_DIR") {
            PathBuf::from(dir).join("config.toml")
        } else {
            PathBuf::from(".sublink/config.toml")
        }
    }

    fn read_raw(path: &Path) -> Result<RawSublinkConfig> {
        let contents = std::fs::read_to_string(path)?;
        toml::from_str(&contents)
            .map_err(|e| anyhow::anyhow!("Invalid config {}: {}", path.display(), e))
    }

    /// Merge two raw configs (overlay values override base only if explicitly set)
    fn merge_raw(base: RawSublinkConfig, overlay: RawSublinkConfig) -> RawSublinkConfig {
        RawSublinkConfig {
            root_dir: overlay.root_dir.or(base.root_dir),
            pairing: RawPairingConfig {
                timeout_secs: overlay.pairing.timeout_secs.or(base.pairing.timeout_secs),
                poll_interval_ms: overlay
                    .pairing
                    .poll_interval_ms
                    .or(base.pairing.poll_interval_ms),
                code_request_delay_ms: overlay
                    .pairing
                    .code_request_delay_ms
                    .or(base.pairing.code_request_delay_ms),
            },
            reconnect: RawReconnectConfig {
                delays_secs: overlay.reconnect.delays_secs.or(base.reconnect.delays_secs),
                max_attempts: overlay.reconnect.max_attempts.or(base.reconnect.max_attempts),
                verify_delay_ms: overlay
                    .reconnect
                    .verify_delay_ms
                    .or(base.reconnect.verify_delay_ms),
            },
            health: RawHealthConfig {
                interval_secs: overlay.health.interval_secs.or(base.health.interval_secs),
                fail_reset_secs: overlay.health.fail_reset_secs.or(base.health.fail_reset_secs),
                max_consecutive_failures: overlay
                    .health
                    .max_consecutive_failures
                    .or(base.health.max_consecutive_failures),
                orphan_sweep: overlay.health.orphan_sweep.or(base.health.orphan_sweep),
            },
            loader: RawLoaderConfig {
                max_concurrent: overlay.loader.max_concurrent.or(base.loader.max_concurrent),
                settle_ms: overlay.loader.settle_ms.or(base.loader.settle_ms),
            },
        }
    }

    /// Convert raw config to final config with defaults applied
    fn finalize(raw: RawSublinkConfig) -> LifecycleConfig {
        let mut config = LifecycleConfig::default();
        if let Some(root_dir) = raw.root_dir {
            config.root_dir = root_dir;
        }

        let pairing = &mut config.pairing;
        pairing.timeout_secs = raw.pairing.timeout_secs.unwrap_or(pairing.timeout_secs);
        pairing.poll_interval_ms = raw
            .pairing
            .poll_interval_ms
            .unwrap_or(pairing.poll_interval_ms);
        pairing.code_request_delay_ms = raw
            .pairing
            .code_request_delay_ms
            .unwrap_or(pairing.code_request_delay_ms);

        let reconnect = &mut config.reconnect;
        if let Some(delays) = raw.reconnect.delays_secs {
            reconnect.delays_secs = delays;
        }
        reconnect.max_attempts = raw.reconnect.max_attempts.unwrap_or(reconnect.max_attempts);
        reconnect.verify_delay_ms = raw
            .reconnect
            .verify_delay_ms
            .unwrap_or(reconnect.verify_delay_ms);

        let health = &mut config.health;
        health.interval_secs = raw.health.interval_secs.unwrap_or(health.interval_secs);
        health.fail_reset_secs = raw.health.fail_reset_secs.unwrap_or(health.fail_reset_secs);
        health.max_consecutive_failures = raw
            .health
            .max_consecutive_failures
            .unwrap_or(health.max_consecutive_failures);
        health.orphan_sweep = raw.health.orphan_sweep.unwrap_or(health.orphan_sweep);

        let loader = &mut config.loader;
        loader.max_concurrent = raw.loader.max_concurrent.unwrap_or(loader.max_concurrent);
        loader.settle_ms = raw.loader.settle_ms.unwrap_or(loader.settle_ms);

        config
    }
}
