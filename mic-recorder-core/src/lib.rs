//! # mic-recorder-core
//!
//! Platform-agnostic core of an unattended microphone recorder.
//!
//! Records audio in fixed-length segments, writes each one as a normalized
//! 16-bit WAV file with an atomic rename, and keeps going across device
//! unplugs, capture errors and low disk space. Platform backends implement
//! the `CaptureBackend` trait and plug into the `RecordingSupervisor`.
//!
//! ## Architecture
//!
//! ```text
//! mic-recorder-core (this crate)
//! ├── traits/       ← CaptureBackend, InputStream, SupervisorDelegate
//! ├── models/       ← CaptureError, Device, RecorderConfig, Segment, SupervisorPhase
//! ├── device/       ← catalog enumeration, device selection policy
//! ├── processing/   ← normalization, format conversion, RingBuffer, WAV header generation
//! ├── recorder/     ← ChunkedSegmentRecorder
//! ├── session/      ← RecordingSupervisor (state machine)
//! ├── storage/      ← DiskSpaceGuard, SegmentWriter
//! └── cancel        ← CancellationToken
//! ```

pub mod cancel;
pub mod device;
pub mod models;
pub mod processing;
pub mod recorder;
pub mod session;
pub mod storage;
pub mod traits;

#[cfg(test)]
mod test_support;

// Re-export key types at crate root for convenience.
pub use cancel::CancellationToken;
pub use device::catalog::enumerate;
pub use device::selector::{select_device, SelectionPolicy};
pub use models::config::RecorderConfig;
pub use models::device::{Device, StreamFormat};
pub use models::error::CaptureError;
pub use models::segment::{RecordingResult, Segment};
pub use models::state::{BackoffReason, SupervisorPhase, SupervisorState};
pub use processing::ring_buffer::RingBuffer;
pub use recorder::chunked::ChunkedSegmentRecorder;
pub use session::supervisor::{RecordingSupervisor, SupervisorReport};
pub use storage::disk_guard::{DiskSpaceGuard, FreeSpaceProbe, SpaceCheck};
pub use storage::segment_writer::{sweep_stale_temp_files, SegmentWriter};
pub use traits::capture_backend::{CaptureBackend, InputStream};
pub use traits::supervisor_delegate::SupervisorDelegate;
