//! Configuration loading
//!
//! Bootstrap TOML file, with individual fields overridable from the CLI
//! (spec §2's ambient config stack), following the teacher's file-then-CLI
//! override pattern.

use std::path::PathBuf;

use serde::Deserialize;

use syncplay_common::{Error, Result};

/// Bootstrap configuration loaded from a TOML file
#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    /// Max deviation (ms) tolerated from a client-supplied timestamp vs
    /// server time before it's clamped to `now` (spec §4.6).
    #[serde(default = "default_time_sync_offset_ms")]
    pub time_sync_offset_ms: i64,

    /// Max divergence (ms) tolerated for client position reports (spec §4.6).
    #[serde(default = "default_max_playback_offset_ms")]
    pub max_playback_offset_ms: i64,

    /// Grace period (seconds) an empty group survives before the background
    /// sweep removes it (spec §5; default 0 = immediate).
    #[serde(default)]
    pub grace_period_secs: u64,
}

fn default_port() -> u16 {
    8921
}

fn default_time_sync_offset_ms() -> i64 {
    2000
}

fn default_max_playback_offset_ms() -> i64 {
    500
}

/// Runtime configuration: TOML file values with CLI overrides applied.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub time_sync_offset_ms: i64,
    pub max_playback_offset_ms: i64,
    pub grace_period_secs: u64,
}

impl Config {
    /// Loads the TOML file at `config_path`, applying any `Some` overrides.
    pub async fn load(
        config_path: &PathBuf,
        port_override: Option<u16>,
        time_sync_offset_override: Option<i64>,
    ) -> Result<Self> {
        let toml_config = match tokio::fs::read_to_string(config_path).await {
            Ok(toml_str) => toml::from_str::<TomlConfig>(&toml_str)
                .map_err(|e| Error::Config(format!("failed to parse {}: {e}", config_path.display())))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => TomlConfig::default(),
            Err(e) => return Err(Error::Io(e)),
        };

        Ok(Config {
            port: port_override.unwrap_or(toml_config.port),
            time_sync_offset_ms: time_sync_offset_override
                .unwrap_or(toml_config.time_sync_offset_ms),
            max_playback_offset_ms: toml_config.max_playback_offset_ms,
            grace_period_secs: toml_config.grace_period_secs,
        })
    }
}
