//! # mic-recorder-backends
//!
//! Capture backends for mic-recorder.
//!
//! Provides:
//! - `CpalBackend`: library capture via cpal's default host (all platforms)
//! - `ArecordBackend`: ALSA capture via an `arecord` child process (Linux)
//!
//! ## Usage
//! ```ignore
//! use std::sync::Arc;
//! use mic_recorder_backends::CpalBackend;
//! use mic_recorder_core::{CancellationToken, RecorderConfig, RecordingSupervisor};
//!
//! let cancel = CancellationToken::new();
//! let mut supervisor =
//!     RecordingSupervisor::new(Arc::new(CpalBackend::new()), RecorderConfig::default(), cancel)?;
//! supervisor.run();
//! ```

pub mod cpal_backend;
#[cfg(target_os = "linux")]
pub mod arecord;

pub use cpal_backend::CpalBackend;
#[cfg(target_os = "linux")]
pub use arecord::ArecordBackend;
