use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("failed to read settings from {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid settings JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid setting {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Tunables for a pipeline run. Missing JSON fields take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// Capture resolution requested from devices.
    pub device_width: u32,
    pub device_height: u32,
    /// Capture rate requested from devices, also their pacing fallback.
    pub device_fps: f64,
    /// Pacing for files whose container declares no frame rate.
    pub file_frame_interval_ms: u64,
    /// How long the detect stage waits for a frame before re-checking stop.
    pub detect_idle_ms: u64,
    pub display_tick_ms: u64,
    /// Upper bound on any capture pacing sleep, and so on stop latency.
    pub max_pacing_ms: u64,
    pub confidence: f64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            device_width: 640,
            device_height: 480,
            device_fps: 30.0,
            file_frame_interval_ms: 30,
            detect_idle_ms: 10,
            display_tick_ms: 6,
            max_pacing_ms: 100,
            confidence: 0.25,
        }
    }
}

const INTERVAL_RANGE_MS: std::ops::RangeInclusive<u64> = 1..=1000;

impl PipelineSettings {
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let json = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    pub fn from_json_str(json: &str) -> Result<Self, SettingsError> {
        let settings: Self = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        for (field, value) in [
            ("file_frame_interval_ms", self.file_frame_interval_ms),
            ("detect_idle_ms", self.detect_idle_ms),
            ("display_tick_ms", self.display_tick_ms),
            ("max_pacing_ms", self.max_pacing_ms),
        ] {
            if !INTERVAL_RANGE_MS.contains(&value) {
                return Err(SettingsError::Invalid {
                    field,
                    reason: format!("{value} ms is outside 1..=1000"),
                });
            }
        }
        if !(self.device_fps.is_finite() && self.device_fps > 0.0) {
            return Err(SettingsError::Invalid {
                field: "device_fps",
                reason: format!("{} must be positive", self.device_fps),
            });
        }
        if self.device_width == 0 || self.device_height == 0 {
            return Err(SettingsError::Invalid {
                field: "device_width/device_height",
                reason: format!("{}x{} has no area", self.device_width, self.device_height),
            });
        }
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(SettingsError::Invalid {
                field: "confidence",
                reason: format!("{} is outside [0, 1]", self.confidence),
            });
        }
        Ok(())
    }

    pub fn device_frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.device_fps)
    }

    pub fn file_frame_interval(&self) -> Duration {
        Duration::from_millis(self.file_frame_interval_ms)
    }

    pub fn detect_idle(&self) -> Duration {
        Duration::from_millis(self.detect_idle_ms)
    }

    pub fn display_tick(&self) -> Duration {
        Duration::from_millis(self.display_tick_ms)
    }

    pub fn max_pacing(&self) -> Duration {
        Duration::from_millis(self.max_pacing_ms)
    }
}
