//! # Driver Configuration
//!
//! Loads runtime options from `wll-config.toml`. Every section and key has a
//! default, so a missing or partial file still yields a runnable driver
//! pointed at the factory-default bridge address.

use std::fs;
use std::path::Path;
use std::time::Duration;

use log::{error, info, warn};
use serde::{Deserialize, Serialize};

/// The bridge refuses faster polling; enforced as a floor, not an error.
pub const MIN_POLL_INTERVAL_SECS: u64 = 10;

/// Application configuration loaded from wll-config.toml.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct Config {
    pub bridge: BridgeConfig,
    pub poll: PollConfig,
    pub station: StationConfig,
}

/// Where the bridge (and optional AirLink unit) live on the LAN.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// WeatherLink Live IP address.
    pub ip: String,
    /// Optional separate AirLink bridge polled for particulate records.
    pub air_quality_ip: Option<String>,
    /// Broadcast listening port.
    pub udp_port: u16,
    /// UDP broadcast duration requested on each re-arm, seconds.
    pub broadcast_duration_secs: u32,
}

/// Polling cadence.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PollConfig {
    /// Seconds between HTTP snapshots; clamped to [`MIN_POLL_INTERVAL_SECS`].
    pub interval_secs: u64,
    /// HTTP polling is skipped within this many seconds of local midnight, on
    /// either side, to avoid racing the bridge's own daily-counter rollover.
    /// 0 disables the quiet window.
    pub quiet_window_secs: u32,
}

/// Transmitter selection.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct StationConfig {
    /// Primary (ISS) transmitter id; auto-discovered from the first snapshot
    /// when unset.
    pub transmitter_id: Option<u8>,
    /// Optional auxiliary transmitter reported under the extra-sensor fields.
    pub auxiliary_id: Option<u8>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        BridgeConfig {
            ip: "192.168.1.47".to_string(),
            air_quality_ip: None,
            udp_port: 22222,
            broadcast_duration_secs: 3600,
        }
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        PollConfig {
            interval_secs: MIN_POLL_INTERVAL_SECS,
            quiet_window_secs: 120,
        }
    }
}

impl Config {
    /// Load configuration from wll-config.toml in the working directory.
    /// Falls back to defaults if the file doesn't exist or is invalid.
    pub fn load() -> Self {
        Self::load_from_path("wll-config.toml")
    }

    /// Load configuration from the given path, falling back to defaults.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(&path) {
            Ok(contents) => match toml::from_str::<Config>(&contents) {
                Ok(config) => {
                    info!("loaded configuration for bridge at {}", config.bridge.ip);
                    config
                }
                Err(e) => {
                    error!("invalid config file format: {e}; using defaults");
                    Self::default()
                }
            },
            Err(_) => {
                info!("no config file found, using defaults");
                Self::default()
            }
        }
    }

    /// Effective HTTP poll interval with the bridge minimum enforced.
    pub fn poll_interval(&self) -> Duration {
        if self.poll.interval_secs < MIN_POLL_INTERVAL_SECS {
            warn!(
                "poll interval {}s below bridge minimum; using {}s",
                self.poll.interval_secs, MIN_POLL_INTERVAL_SECS
            );
        }
        Duration::from_secs(self.poll.interval_secs.max(MIN_POLL_INTERVAL_SECS))
    }
}
