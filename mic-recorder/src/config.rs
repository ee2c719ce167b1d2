//! Daemon configuration: the recorder settings plus process-level choices.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use mic_recorder_core::models::config::RecorderConfig;
use mic_recorder_core::models::error::CaptureError;

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "MIC_RECORDER_CONFIG";

pub const DEFAULT_CONFIG_PATH: &str = "/etc/mic-recorder/config.json";

/// Which capture backend to run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Library capture through cpal.
    #[default]
    Cpal,
    /// `arecord` child process (Linux only).
    Arecord,
}

/// Contents of the config file. Recorder keys sit at the top level.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(flatten)]
    pub recorder: RecorderConfig,

    #[serde(default)]
    pub backend: BackendKind,

    /// Append log output here instead of writing to stderr.
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

/// Where the effective config came from, reported once logging is up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    File(PathBuf),
    Defaults(PathBuf),
}

impl DaemonConfig {
    pub fn from_json(json: &str) -> Result<Self, CaptureError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| CaptureError::InvalidConfiguration(format!("malformed config: {}", e)))?;
        config
            .recorder
            .validate()
            .map_err(CaptureError::InvalidConfiguration)?;
        Ok(config)
    }
}

/// Config path from the value of [`CONFIG_ENV`], if set and non-empty.
pub fn config_path_from(env_value: Option<OsString>) -> PathBuf {
    match env_value {
        Some(value) if !value.is_empty() => PathBuf::from(value),
        _ => PathBuf::from(DEFAULT_CONFIG_PATH),
    }
}

pub fn config_path() -> PathBuf {
    config_path_from(std::env::var_os(CONFIG_ENV))
}

/// Load `path`. A missing file yields defaults; anything else unreadable or
/// invalid is an error.
pub fn load_config(path: &Path) -> Result<(DaemonConfig, ConfigSource), CaptureError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            let source = ConfigSource::Defaults(path.to_path_buf());
            return Ok((DaemonConfig::default(), source));
        }
        Err(e) => {
            return Err(CaptureError::InvalidConfiguration(format!(
                "failed to read {}: {}",
                path.display(),
                e
            )))
        }
    };

    let config = DaemonConfig::from_json(&contents)
        .map_err(|e| CaptureError::InvalidConfiguration(format!("{}: {}", path.display(), e)))?;
    Ok((config, ConfigSource::File(path.to_path_buf())))
}
