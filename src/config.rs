//! Layered configuration for a replay run.
//!
//! Sources, later ones win:
//!
//! | Layer          | Example                                   |
//! |----------------|-------------------------------------------|
//! | built-in       | see [`ReplayConfig::default`]             |
//! | TOML file      | `endpoint = "ws://sim:8000/..."`          |
//! | environment    | `REPLAY_ENDPOINT`, `REPLAY_DURATION`, …   |

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::Result;
use crate::session::SessionParams;

pub const DEFAULT_ENDPOINT: &str = "ws://localhost:8000/api/scenario/ws/simulation";
pub const DEFAULT_DURATION_SECS: u64 = 3600;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReplayConfig {
    /// WebSocket URL of the simulation channel.
    pub endpoint: String,
    /// Simulated duration in seconds.
    pub duration: u64,
    #[serde(default)]
    pub simulation_speed: Option<f64>,
    #[serde(default)]
    pub block_motorway_links: Option<bool>,
    /// Capacity of the bridge event queue.
    pub event_buffer: usize,
    pub poll_interval_ms: u64,
    /// Seconds between statistics log lines (0 disables).
    pub stats_interval_secs: u64,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.into(),
            duration: DEFAULT_DURATION_SECS,
            simulation_speed: None,
            block_motorway_links: None,
            event_buffer: 1024,
            poll_interval_ms: 50,
            stats_interval_secs: 5,
        }
    }
}

impl ReplayConfig {
    /// Build from defaults, an optional TOML file and `REPLAY_*` variables.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let d = Self::default();
        let mut builder = config::Config::builder()
            .set_default("endpoint", d.endpoint)?
            .set_default("duration", d.duration as i64)?
            .set_default("event_buffer", d.event_buffer as i64)?
            .set_default("poll_interval_ms", d.poll_interval_ms as i64)?
            .set_default("stats_interval_secs", d.stats_interval_secs as i64)?;

        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path).required(false));
        }

        let cfg = builder
            .add_source(config::Environment::with_prefix("REPLAY").try_parsing(true))
            .build()?
            .try_deserialize::<ReplayConfig>()?;
        Ok(cfg)
    }

    pub fn session_params(&self) -> SessionParams {
        SessionParams {
            duration: self.duration,
            initial_speed: self.simulation_speed,
            initial_road_block: self.block_motorway_links,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn stats_interval(&self) -> Option<Duration> {
        (self.stats_interval_secs > 0).then(|| Duration::from_secs(self.stats_interval_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_file() {
        let cfg = ReplayConfig::load(None).unwrap();
        assert_eq!(cfg.duration, DEFAULT_DURATION_SECS);
        assert_eq!(cfg.simulation_speed, None);
    }

    #[test]
    fn missing_file_is_not_an_error() {
        let path = std::env::temp_dir().join("traffic-replay-does-not-exist.toml");
        assert!(ReplayConfig::load(Some(&path)).is_ok());
    }

    #[test]
    fn file_overrides_defaults() {
        let path = std::env::temp_dir().join(format!(
            "traffic-replay-config-{}.toml",
            std::process::id()
        ));
        std::fs::write(
            &path,
            "endpoint = \"ws://sim:9000/ws\"\nduration = 120\nsimulation_speed = 2.5\n",
        )
        .unwrap();

        let cfg = ReplayConfig::load(Some(&path)).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(cfg.endpoint, "ws://sim:9000/ws");
        assert_eq!(cfg.duration, 120);
        assert_eq!(cfg.poll_interval_ms, 50);
        let params = cfg.session_params();
        assert_eq!(params.initial_speed, Some(2.5));
        assert_eq!(params.initial_road_block, None);
    }

    #[test]
    fn zero_stats_interval_disables() {
        let cfg = ReplayConfig {
            stats_interval_secs: 0,
            ..Default::default()
        };
        assert!(cfg.stats_interval().is_none());
        assert_eq!(cfg.poll_interval(), Duration::from_millis(50));
    }
}
