//! Library capture through cpal's default host.
//!
//! Devices are captured in their native format and converted to the
//! requested one inside the audio callback, so the core always sees
//! exactly the channel count and rate it asked for.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample, Stream, StreamConfig};
use parking_lot::Mutex;

use mic_recorder_core::models::device::{Device, StreamFormat};
use mic_recorder_core::models::error::CaptureError;
use mic_recorder_core::processing::convert::StreamConverter;
use mic_recorder_core::processing::ring_buffer::RingBuffer;
use mic_recorder_core::traits::capture_backend::{CaptureBackend, InputStream};

/// Seconds of converted audio buffered between the callback and the reader.
const BUFFER_SECONDS: usize = 5;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// How long a stream may deliver nothing before a read fails.
pub const DEFAULT_STALL_TIMEOUT: Duration = Duration::from_secs(5);

/// Capture backend over `cpal::default_host()`.
///
/// Device ids are positions in the host's device list, which is queried
/// fresh on every call.
#[derive(Debug, Clone)]
pub struct CpalBackend {
    stall_timeout: Duration,
}

impl CpalBackend {
    pub fn new() -> Self {
        Self {
            stall_timeout: DEFAULT_STALL_TIMEOUT,
        }
    }

    pub fn with_stall_timeout(mut self, timeout: Duration) -> Self {
        self.stall_timeout = timeout;
        self
    }

    fn host_devices() -> Result<Vec<cpal::Device>, CaptureError> {
        let host = cpal::default_host();
        let devices = host
            .devices()
            .map_err(|e| CaptureError::DeviceEnumeration(format!("{:?}: {}", host.id(), e)))?;
        Ok(devices.collect())
    }
}

impl Default for CpalBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn describe(id: u32, device: &cpal::Device) -> Device {
    let name = device.name().unwrap_or_else(|_| format!("device {}", id));
    let (max_input_channels, default_sample_rate) = match device.default_input_config() {
        Ok(config) => (config.channels(), config.sample_rate().0 as f64),
        Err(_) => (0, 0.0),
    };
    Device {
        id,
        name,
        max_input_channels,
        default_sample_rate,
    }
}

impl CaptureBackend for CpalBackend {
    fn devices(&self) -> Result<Vec<Device>, CaptureError> {
        Ok(Self::host_devices()?
            .iter()
            .enumerate()
            .map(|(index, device)| describe(index as u32, device))
            .collect())
    }

    fn default_input_device(&self) -> Result<Option<Device>, CaptureError> {
        let Some(default) = cpal::default_host().default_input_device() else {
            return Ok(None);
        };
        let Ok(default_name) = default.name() else {
            return Ok(None);
        };

        // Report the default under the same id the catalog uses.
        Ok(self.devices()?.into_iter().find(|d| d.name == default_name))
    }

    fn open_stream(
        &self,
        device: &Device,
        format: &StreamFormat,
    ) -> Result<Box<dyn InputStream>, CaptureError> {
        let unavailable = |reason: String| CaptureError::DeviceNotAvailable {
            id: device.id,
            reason,
        };

        let host_device = Self::host_devices()?
            .into_iter()
            .nth(device.id as usize)
            .ok_or_else(|| unavailable("no longer listed by host".into()))?;
        let current_name = host_device.name().unwrap_or_default();
        if current_name != device.name {
            return Err(unavailable(format!("id now refers to '{}'", current_name)));
        }

        let supported = host_device
            .default_input_config()
            .map_err(|e| unavailable(format!("no input config: {}", e)))?;

        log::info!(
            "Opening {} at {} Hz, {} channels, {:?} (delivering {} Hz, {} channels)",
            device,
            supported.sample_rate().0,
            supported.channels(),
            supported.sample_format(),
            format.sample_rate,
            format.channels
        );

        let sample_format = supported.sample_format();
        let config: StreamConfig = supported.into();
        let capacity = format.samples_for(format.sample_rate as usize * BUFFER_SECONDS);
        let shared = Arc::new(Mutex::new(SharedCapture {
            buffer: RingBuffer::new(capacity),
            error: None,
        }));

        let target = *format;
        let stream = match sample_format {
            SampleFormat::I16 => build_stream::<i16>(&host_device, &config, target, &shared),
            SampleFormat::U16 => build_stream::<u16>(&host_device, &config, target, &shared),
            SampleFormat::F32 => build_stream::<f32>(&host_device, &config, target, &shared),
            other => {
                Err(CaptureError::StreamOpen(format!("unsupported sample format {:?}", other)))
            }
        }?;

        stream
            .play()
            .map_err(|e| CaptureError::StreamOpen(format!("failed to start stream: {}", e)))?;

        Ok(Box::new(CpalInputStream {
            _stream: stream,
            reader: BufferedReader {
                shared,
                format: *format,
                stall_timeout: self.stall_timeout,
            },
        }))
    }
}

/// State shared with the audio callback.
struct SharedCapture {
    buffer: RingBuffer,
    error: Option<String>,
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    target: StreamFormat,
    shared: &Arc<Mutex<SharedCapture>>,
) -> Result<Stream, CaptureError>
where
    T: SizedSample + Send + 'static,
    f32: FromSample<T>,
{
    let mut converter = StreamConverter::new(
        config.channels as usize,
        config.sample_rate.0 as f64,
        target.channels as usize,
        target.sample_rate as f64,
    );

    let sink = Arc::clone(shared);
    let errors = Arc::clone(shared);
    let err_fn = move |err: cpal::StreamError| {
        log::error!("Audio stream error: {}", err);
        errors.lock().error = Some(err.to_string());
    };

    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                let samples: Vec<f32> = data.iter().map(|&s| f32::from_sample(s)).collect();
                let converted = converter.process(&samples);
                sink.lock().buffer.write(&converted);
            },
            err_fn,
            None,
        )
        .map_err(|e| CaptureError::StreamOpen(e.to_string()))
}

/// Open cpal stream. Dropping it stops capture.
struct CpalInputStream {
    _stream: Stream,
    reader: BufferedReader,
}

impl InputStream for CpalInputStream {
    fn read_chunk(&mut self, frames: usize) -> Result<Vec<f32>, CaptureError> {
        self.reader.read_chunk(frames)
    }
}

/// Reader half of the callback buffer.
struct BufferedReader {
    shared: Arc<Mutex<SharedCapture>>,
    format: StreamFormat,
    stall_timeout: Duration,
}

impl BufferedReader {
    fn read_chunk(&mut self, frames: usize) -> Result<Vec<f32>, CaptureError> {
        let needed = self.format.samples_for(frames);
        let mut out = Vec::with_capacity(needed);
        let mut last_progress = Instant::now();

        while out.len() < needed {
            let (moved, dropped) = {
                let mut shared = self.shared.lock();
                if let Some(error) = shared.error.take() {
                    return Err(CaptureError::chunk(0, error));
                }
                let want = needed - out.len();
                let moved = shared.buffer.read_into(&mut out, want);
                (moved, shared.buffer.take_dropped())
            };

            if dropped > 0 {
                log::warn!("Capture buffer overflow: dropped {} samples", dropped);
            }

            if moved > 0 {
                last_progress = Instant::now();
            } else if last_progress.elapsed() > self.stall_timeout {
                let stalled = self.stall_timeout.as_secs_f64();
                return Err(CaptureError::chunk(
                    0,
                    format!("no audio for {:.1}s, stream stalled", stalled),
                ));
            } else {
                thread::sleep(POLL_INTERVAL);
            }
        }

        Ok(out)
    }
}
