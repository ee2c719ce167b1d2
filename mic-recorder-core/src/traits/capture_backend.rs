use crate::models::device::{Device, StreamFormat};
use crate::models::error::CaptureError;

/// Host audio capability the recording core depends on.
///
/// Implemented by:
/// - `CpalBackend` (library capture, all platforms)
/// - `ArecordBackend` (ALSA `arecord` subprocess, Linux)
///
/// The core never assumes which one it is talking to.
pub trait CaptureBackend: Send + Sync {
    /// Every device the host knows about, in host enumeration order,
    /// including devices without input channels.
    fn devices(&self) -> Result<Vec<Device>, CaptureError>;

    /// The host-designated default input device, if there is one.
    fn default_input_device(&self) -> Result<Option<Device>, CaptureError>;

    /// Open a capture stream on `device` delivering `format`.
    ///
    /// Fails with `DeviceNotAvailable` if the device vanished since it was
    /// enumerated.
    fn open_stream(
        &self,
        device: &Device,
        format: &StreamFormat,
    ) -> Result<Box<dyn InputStream>, CaptureError>;
}

/// An open capture stream. Dropping it releases the device.
pub trait InputStream {
    /// Block until exactly `frames` frames have been captured.
    ///
    /// Returns `frames * channels` interleaved samples in `[-1.0, 1.0]`.
    fn read_chunk(&mut self, frames: usize) -> Result<Vec<f32>, CaptureError>;
}
