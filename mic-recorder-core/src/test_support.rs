//! Scripted capture backend for unit tests.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::cancel::CancellationToken;
use crate::models::device::{Device, StreamFormat};
use crate::models::error::CaptureError;
use crate::storage::disk_guard::FreeSpaceProbe;
use crate::traits::capture_backend::{CaptureBackend, InputStream};

pub fn device(id: u32, name: &str, max_input_channels: u16) -> Device {
    Device {
        id,
        name: name.to_string(),
        max_input_channels,
        default_sample_rate: 44100.0,
    }
}

#[derive(Default)]
struct Script {
    devices: Option<Result<Vec<Device>, CaptureError>>,
    default: Option<Result<Option<Device>, CaptureError>>,
    open_error: Option<CaptureError>,
    fail_on_read: Option<usize>,
    cancel_on_read: Option<(usize, CancellationToken)>,
    amplitude: f32,
}

/// Backend whose behavior is fixed up front; records what it was asked.
#[derive(Clone)]
pub struct MockBackend {
    script: Arc<Mutex<Script>>,
    pub requested_frames: Arc<Mutex<Vec<usize>>>,
    pub streams_opened: Arc<AtomicUsize>,
}

impl MockBackend {
    pub fn new(devices: Vec<Device>) -> Self {
        Self {
            script: Arc::new(Mutex::new(Script {
                devices: Some(Ok(devices)),
                amplitude: 0.25,
                ..Default::default()
            })),
            requested_frames: Arc::new(Mutex::new(Vec::new())),
            streams_opened: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn failing_enumeration(self) -> Self {
        let error = CaptureError::DeviceEnumeration("host error".into());
        self.script.lock().devices = Some(Err(error));
        self
    }

    pub fn with_default(self, default: Option<Device>) -> Self {
        self.script.lock().default = Some(Ok(default));
        self
    }

    pub fn failing_default(self) -> Self {
        let error = CaptureError::DeviceEnumeration("no default".into());
        self.script.lock().default = Some(Err(error));
        self
    }

    pub fn failing_open(self) -> Self {
        self.script.lock().open_error = Some(CaptureError::StreamOpen("device busy".into()));
        self
    }

    /// Zero-based read index (per stream) that returns an error.
    pub fn failing_read(self, read: usize) -> Self {
        self.script.lock().fail_on_read = Some(read);
        self
    }

    /// Cancel `token` while serving read `read` (the read itself succeeds).
    pub fn cancelling_during_read(self, read: usize, token: CancellationToken) -> Self {
        self.script.lock().cancel_on_read = Some((read, token));
        self
    }

    pub fn with_amplitude(self, amplitude: f32) -> Self {
        self.script.lock().amplitude = amplitude;
        self
    }

    pub fn set_open_error(&self, error: Option<CaptureError>) {
        self.script.lock().open_error = error;
    }

    pub fn set_devices(&self, devices: Vec<Device>) {
        self.script.lock().devices = Some(Ok(devices));
    }

    pub fn requested(&self) -> Vec<usize> {
        self.requested_frames.lock().clone()
    }
}

impl CaptureBackend for MockBackend {
    fn devices(&self) -> Result<Vec<Device>, CaptureError> {
        self.script
            .lock()
            .devices
            .clone()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    fn default_input_device(&self) -> Result<Option<Device>, CaptureError> {
        self.script.lock().default.clone().unwrap_or(Ok(None))
    }

    fn open_stream(
        &self,
        _device: &Device,
        format: &StreamFormat,
    ) -> Result<Box<dyn InputStream>, CaptureError> {
        let script = self.script.lock();
        if let Some(ref e) = script.open_error {
            return Err(e.clone());
        }
        self.streams_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockStream {
            format: *format,
            reads: 0,
            fail_on_read: script.fail_on_read,
            cancel_on_read: script.cancel_on_read.clone(),
            amplitude: script.amplitude,
            requested: Arc::clone(&self.requested_frames),
        }))
    }
}

struct MockStream {
    format: StreamFormat,
    reads: usize,
    fail_on_read: Option<usize>,
    cancel_on_read: Option<(usize, CancellationToken)>,
    amplitude: f32,
    requested: Arc<Mutex<Vec<usize>>>,
}

impl InputStream for MockStream {
    fn read_chunk(&mut self, frames: usize) -> Result<Vec<f32>, CaptureError> {
        let read = self.reads;
        self.reads += 1;
        self.requested.lock().push(frames);

        if let Some((at, ref token)) = self.cancel_on_read {
            if at == read {
                token.cancel();
            }
        }
        if self.fail_on_read == Some(read) {
            return Err(CaptureError::chunk(read, "device unplugged"));
        }

        let samples = self.format.samples_for(frames);
        let (high, low) = (self.amplitude, -self.amplitude / 2.0);
        Ok((0..samples).map(|i| if i % 2 == 0 { high } else { low }).collect())
    }
}

/// Probe that always reports the same result.
pub struct FixedFreeSpace(pub Result<u64, CaptureError>);

impl FreeSpaceProbe for FixedFreeSpace {
    fn free_bytes(&self, _path: &Path) -> Result<u64, CaptureError> {
        self.0.clone()
    }
}
