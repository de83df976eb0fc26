//! Pipeline-wide configuration, loaded from a TOML file: a missing file or
//! parse failure falls back to defaults with a logged warning rather than
//! aborting startup.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// What a [`crate::sink::SinkWriter`] does when its queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackpressurePolicy {
    /// Drop the oldest queued record to make room (default: favors recency).
    DropOldest,
    /// Drop the incoming record instead, keeping the queue's existing order.
    DropNewest,
}

impl Default for BackpressurePolicy {
    fn default() -> Self {
        Self::DropOldest
    }
}

/// Top-level pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Dedup window, in milliseconds (see [`crate::dispatcher::DEFAULT_DEDUP_WINDOW_MS`]).
    pub dedup_window_ms: i64,
    /// Bounded queue depth per [`crate::sink::SinkWriter`].
    pub sink_queue_depth: usize,
    pub backpressure_policy: BackpressurePolicy,
    /// Decoder names to disable at startup (everything else registered is
    /// enabled by default).
    pub disabled_decoders: Vec<String>,
    /// Emit one `pulse_data` metadata record per package alongside decoded
    /// records (see [`crate::dispatcher::Dispatcher::with_pulse_data_sidecar`]).
    pub emit_pulse_data: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            dedup_window_ms: crate::dispatcher::DEFAULT_DEDUP_WINDOW_MS,
            sink_queue_depth: 256,
            backpressure_policy: BackpressurePolicy::DropOldest,
            disabled_decoders: Vec::new(),
            emit_pulse_data: false,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    #[error("reading config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("parsing config file: {0}")]
    Parse(#[from] toml::de::Error),
}

impl PipelineConfig {
    /// Load from `path`, falling back to [`PipelineConfig::default`] with a
    /// warning if the file is missing or malformed — startup never fails
    /// because of a bad config file.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "using default pipeline config");
                Self::default()
            }
        }
    }

    pub fn load(path: &Path) -> Result<Self, ConfigLoadError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&raw)?)
    }

    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let raw = toml::to_string_pretty(self).unwrap_or_default();
        std::fs::write(path, raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_documented_values() {
        let cfg = PipelineConfig::default();
        assert_eq!(cfg.dedup_window_ms, 200);
        assert_eq!(cfg.sink_queue_depth, 256);
        assert_eq!(cfg.backpressure_policy, BackpressurePolicy::DropOldest);
    }

    #[test]
    fn missing_file_falls_back_to_default_without_panicking() {
        let cfg = PipelineConfig::load_or_default(Path::new("/nonexistent/pulserx.toml"));
        assert_eq!(cfg, PipelineConfig::default());
    }

    #[test]
    fn round_trips_through_toml() {
        let mut cfg = PipelineConfig::default();
        cfg.disabled_decoders.push("keeloq_generic".to_string());
        let raw = toml::to_string_pretty(&cfg).unwrap();
        let back: PipelineConfig = toml::from_str(&raw).unwrap();
        assert_eq!(cfg, back);
    }
}
