use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::device::StreamFormat;
use super::error::CaptureError;

/// Bytes per persisted sample (16-bit signed PCM).
pub const BYTES_PER_SAMPLE: u16 = 2;

const MIB: u64 = 1024 * 1024;

/// Static recorder configuration, read once at startup.
///
/// Every field has a default so a partial JSON file is enough.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    /// Capture and output sample rate in Hz.
    pub sample_rate: u32,

    /// Output channel count. Valid values: 1, 2.
    pub channels: u16,

    /// Directory where finalized segments are written.
    pub output_directory: PathBuf,

    /// Target length of one segment file.
    pub segment_duration_secs: f64,

    /// Length of one cancellable capture call.
    pub chunk_duration_secs: f64,

    /// Case-insensitive device name fragment; empty means auto-select.
    pub preferred_device: String,

    /// Free space that must remain after the next segment is written.
    pub min_free_space_mb: u64,

    /// Segment failures in a row before the long pause.
    pub max_consecutive_failures: u32,

    /// Pause after a segment failure or an empty device catalog.
    pub retry_delay_secs: f64,

    /// Pause before re-checking when disk space is insufficient.
    pub disk_check_interval_secs: f64,

    /// Pause after `max_consecutive_failures` failures in a row.
    pub long_pause_secs: f64,

    /// Fraction of full scale the loudest sample is scaled to.
    pub normalization_headroom: f32,
}

impl RecorderConfig {
    /// Parse a JSON document. Missing keys take their defaults.
    pub fn from_json(json: &str) -> Result<Self, CaptureError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| CaptureError::InvalidConfiguration(format!("malformed config: {}", e)))?;
        config
            .validate()
            .map_err(CaptureError::InvalidConfiguration)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.sample_rate == 0 {
            return Err("sample rate must be positive".into());
        }
        if ![1, 2].contains(&self.channels) {
            return Err(format!("unsupported channel count: {}", self.channels));
        }
        if !(self.segment_duration_secs > 0.0) {
            return Err("segment duration must be positive".into());
        }
        if !(self.chunk_duration_secs > 0.0) {
            return Err("chunk duration must be positive".into());
        }
        if self.max_consecutive_failures == 0 {
            return Err("max consecutive failures must be at least 1".into());
        }
        for (name, value) in [
            ("retry delay", self.retry_delay_secs),
            ("disk check interval", self.disk_check_interval_secs),
            ("long pause", self.long_pause_secs),
        ] {
            if !(value >= 0.0) || !value.is_finite() {
                return Err(format!("{} must be a non-negative number of seconds", name));
            }
        }
        if !(self.normalization_headroom > 0.0 && self.normalization_headroom <= 1.0) {
            return Err(format!(
                "normalization headroom must be in (0, 1]: {}",
                self.normalization_headroom
            ));
        }
        Ok(())
    }

    pub fn stream_format(&self) -> StreamFormat {
        StreamFormat {
            sample_rate: self.sample_rate,
            channels: self.channels,
        }
    }

    pub fn segment_duration(&self) -> Duration {
        Duration::from_secs_f64(self.segment_duration_secs)
    }

    pub fn chunk_duration(&self) -> Duration {
        Duration::from_secs_f64(self.chunk_duration_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs_f64(self.retry_delay_secs)
    }

    pub fn disk_check_interval(&self) -> Duration {
        Duration::from_secs_f64(self.disk_check_interval_secs)
    }

    pub fn long_pause(&self) -> Duration {
        Duration::from_secs_f64(self.long_pause_secs)
    }

    pub fn min_free_space_bytes(&self) -> u64 {
        self.min_free_space_mb * MIB
    }
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            channels: 1,
            output_directory: PathBuf::from("/var/lib/mic_recorder"),
            segment_duration_secs: 30.0 * 60.0,
            chunk_duration_secs: 5.0,
            preferred_device: String::new(),
            min_free_space_mb: 200,
            max_consecutive_failures: 5,
            retry_delay_secs: 10.0,
            disk_check_interval_secs: 5.0 * 60.0,
            long_pause_secs: 15.0 * 60.0,
            normalization_headroom: 0.95,
        }
    }
}
