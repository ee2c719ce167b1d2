use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::cancel::CancellationToken;
use crate::models::config::RecorderConfig;
use crate::models::device::{Device, StreamFormat};
use crate::models::error::CaptureError;
use crate::models::segment::{AudioChunk, RecordingResult, Segment};
use crate::processing::normalize;
use crate::storage::segment_writer::{remove_temp_file, SegmentWriter};
use crate::traits::capture_backend::CaptureBackend;

/// How often (in captured audio) an info-level progress line is logged.
const PROGRESS_LOG_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// Frame counts for each chunk of a segment.
///
/// `ceil(total / chunk)` chunks; the last one carries the remainder when the
/// total is not an exact multiple. 12 s in 5 s chunks gives 5 s, 5 s, 2 s.
pub fn plan_chunks(total: Duration, chunk: Duration, sample_rate: u32) -> Vec<usize> {
    let total_frames = (total.as_secs_f64() * sample_rate as f64).round() as usize;
    let chunk_frames = ((chunk.as_secs_f64() * sample_rate as f64).round() as usize).max(1);

    let mut plan = Vec::with_capacity(total_frames.div_ceil(chunk_frames));
    let mut remaining = total_frames;
    while remaining > 0 {
        let frames = remaining.min(chunk_frames);
        plan.push(frames);
        remaining -= frames;
    }
    plan
}

/// Records one segment as a sequence of short blocking captures.
///
/// Chunking bounds how long a cancellation request can go unnoticed to one
/// chunk duration. When cancellation is observed the chunks captured so far
/// are still finalized.
///
/// Data flow:
/// ```text
/// [InputStream] → chunk₁..chunkₙ → concat → peak-normalize → PCM16
///              → <final>.tmp → rename → <final>
/// ```
pub struct ChunkedSegmentRecorder {
    backend: Arc<dyn CaptureBackend>,
    format: StreamFormat,
    chunk_duration: Duration,
    headroom: f32,
    cancel: CancellationToken,
}

impl ChunkedSegmentRecorder {
    pub fn new(
        backend: Arc<dyn CaptureBackend>,
        format: StreamFormat,
        chunk_duration: Duration,
        headroom: f32,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            backend,
            format,
            chunk_duration,
            headroom,
            cancel,
        }
    }

    pub fn from_config(
        backend: Arc<dyn CaptureBackend>,
        config: &RecorderConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self::new(
            backend,
            config.stream_format(),
            config.chunk_duration(),
            config.normalization_headroom,
            cancel,
        )
    }

    /// Record `total_duration` from `device` into `output_final_path`.
    pub fn record_segment(
        &self,
        device: &Device,
        total_duration: Duration,
        output_final_path: &Path,
    ) -> Result<RecordingResult, CaptureError> {
        let segment = Segment::at_path(output_final_path.to_path_buf(), total_duration);
        self.record(segment, device)
    }

    /// Capture, normalize and finalize `segment`.
    ///
    /// On error neither the final file nor its temp file exists afterwards.
    pub fn record(
        &self,
        mut segment: Segment,
        device: &Device,
    ) -> Result<RecordingResult, CaptureError> {
        let plan = plan_chunks(
            segment.target_duration,
            self.chunk_duration,
            self.format.sample_rate,
        );
        log::info!(
            "Starting segment {} on device {}: {:.1}s in {} chunks -> {}",
            segment.id,
            device,
            segment.target_duration.as_secs_f64(),
            plan.len(),
            segment.final_path.display()
        );

        let started = Instant::now();
        if let Err(e) = self.capture(&mut segment, device, &plan) {
            log::error!(
                "Segment {} aborted on device {}: {}",
                segment.final_path.display(),
                device,
                e
            );
            segment.chunks.clear();
            remove_temp_file(&segment.temp_path);
            return Err(e);
        }

        let chunks_captured = segment.chunks.len();
        log::info!(
            "Segment capture finished after {:.2}s; combining {} of {} chunks",
            started.elapsed().as_secs_f64(),
            chunks_captured,
            plan.len()
        );

        if chunks_captured == 0 {
            if !self.cancel.is_cancelled() {
                log::error!(
                    "No audio chunks were recorded for {}",
                    segment.final_path.display()
                );
            }
            remove_temp_file(&segment.temp_path);
            return Err(CaptureError::EmptySegment);
        }

        let frames = segment.captured_frames();
        let samples = segment.take_samples();
        let input_peak = normalize::peak_level(&samples);
        let pcm = normalize::normalize_to_pcm16(&samples, self.headroom);
        drop(samples);

        let checksum = SegmentWriter::new(&segment.temp_path, &segment.final_path)
            .finalize(&pcm, self.format.sample_rate, self.format.channels)
            .map_err(|e| {
                log::error!("Failed to finalize {}: {}", segment.final_path.display(), e);
                e
            })?;

        let duration_secs = frames as f64 / self.format.sample_rate as f64;
        log::info!(
            "Finalized {} ({:.1}s, sha256 {})",
            segment.final_path.display(),
            duration_secs,
            checksum
        );

        Ok(RecordingResult {
            segment_id: segment.id,
            file_path: segment.final_path,
            started_at: segment.started_at,
            duration_secs,
            chunks_captured,
            chunks_planned: plan.len(),
            input_peak,
            checksum,
        })
    }

    /// Fill `segment.chunks` following `plan`. The stream is released on return.
    fn capture(
        &self,
        segment: &mut Segment,
        device: &Device,
        plan: &[usize],
    ) -> Result<(), CaptureError> {
        // A device that vanished since selection fails the first chunk.
        let mut stream = self
            .backend
            .open_stream(device, &self.format)
            .map_err(|e| CaptureError::chunk(0, e.to_string()))?;

        let chunk_secs = self.chunk_duration.as_secs_f64().max(f64::EPSILON);
        let chunks_per_log = (PROGRESS_LOG_INTERVAL.as_secs_f64() / chunk_secs).round() as usize;
        let progress_every = chunks_per_log.max(1);

        for (index, &frames) in plan.iter().enumerate() {
            if self.cancel.is_cancelled() {
                log::info!(
                    "Recording stopped by cancellation before chunk {}/{}",
                    index + 1,
                    plan.len()
                );
                break;
            }

            log::debug!(
                "Recording chunk {}/{} ({} frames)",
                index + 1,
                plan.len(),
                frames
            );
            let samples = match stream.read_chunk(frames) {
                Ok(samples) => samples,
                Err(e) if self.cancel.is_cancelled() => {
                    log::info!("Chunk {} interrupted by cancellation: {}", index + 1, e);
                    break;
                }
                Err(e) => {
                    let message = match e {
                        CaptureError::ChunkCapture { message, .. } => message,
                        other => other.to_string(),
                    };
                    return Err(CaptureError::chunk(index, message));
                }
            };

            let expected = self.format.samples_for(frames);
            if samples.len() != expected {
                return Err(CaptureError::chunk(
                    index,
                    format!("expected {} samples, got {}", expected, samples.len()),
                ));
            }

            segment.chunks.push(AudioChunk {
                index,
                frames,
                samples,
            });

            if (index + 1) % progress_every == 0 || index + 1 == plan.len() {
                log::info!(
                    "Recorded chunk {}/{} (approx. {:.1} minutes into segment)",
                    index + 1,
                    plan.len(),
                    segment.captured_frames() as f64 / self.format.sample_rate as f64 / 60.0
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::segment::temp_path_for;
    use crate::test_support::{device, MockBackend};

    const RATE: u32 = 100;

    fn recorder(backend: &MockBackend, cancel: CancellationToken) -> ChunkedSegmentRecorder {
        ChunkedSegmentRecorder::new(
            Arc::new(backend.clone()),
            StreamFormat {
                sample_rate: RATE,
                channels: 1,
            },
            Duration::from_secs(5),
            0.95,
            cancel,
        )
    }

    fn read_back(path: &Path) -> Vec<i16> {
        hound::WavReader::open(path)
            .unwrap()
            .into_samples::<i16>()
            .map(|s| s.unwrap())
            .collect()
    }

    #[test]
    fn plan_has_shorter_last_chunk() {
        let plan = plan_chunks(Duration::from_secs(12), Duration::from_secs(5), 44100);
        assert_eq!(plan, vec![5 * 44100, 5 * 44100, 2 * 44100]);
    }

    #[test]
    fn plan_exact_multiple() {
        let plan = plan_chunks(Duration::from_secs(10), Duration::from_secs(5), 1000);
        assert_eq!(plan, vec![5000, 5000]);
    }

    #[test]
    fn plan_shorter_than_one_chunk() {
        let plan = plan_chunks(Duration::from_secs(3), Duration::from_secs(5), 1000);
        assert_eq!(plan, vec![3000]);
    }

    #[test]
    fn plan_for_zero_duration_is_empty() {
        let plan = plan_chunks(Duration::ZERO, Duration::from_secs(5), 1000);
        assert!(plan.is_empty());
    }

    #[test]
    fn uninterrupted_segment_captures_every_chunk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("recording_a.wav");
        let backend = MockBackend::new(vec![device(0, "Mic", 1)]);

        let result = recorder(&backend, CancellationToken::new())
            .record_segment(&device(0, "Mic", 1), Duration::from_secs(12), &path)
            .unwrap();

        assert_eq!(backend.requested(), vec![500, 500, 200]);
        assert_eq!(result.chunks_captured, 3);
        assert!(!result.is_partial());
        assert_eq!(result.file_path, path);
        assert!((result.duration_secs - 12.0).abs() < 1e-9);
        assert!(!temp_path_for(&path).exists());
    }

    #[test]
    fn finalized_file_round_trips_normalized() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("recording_b.wav");
        let backend = MockBackend::new(vec![device(0, "Mic", 1)]).with_amplitude(0.1);

        let result = recorder(&backend, CancellationToken::new())
            .record_segment(&device(0, "Mic", 1), Duration::from_secs(7), &path)
            .unwrap();

        let reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().sample_rate, RATE);
        assert_eq!(reader.spec().channels, 1);
        assert_eq!(reader.spec().bits_per_sample, 16);
        drop(reader);

        let samples = read_back(&path);
        assert_eq!(samples.len(), 700);
        let peak = samples.iter().map(|s| (*s as i32).abs()).max().unwrap();
        assert!(peak > 0);
        assert!(peak <= i16::MAX as i32);
        assert_eq!(peak, (0.95 * normalize::FULL_SCALE).round() as i32);
        assert!((result.input_peak - 0.1).abs() < 1e-6);
    }

    #[test]
    fn silent_segment_is_written_unscaled() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("recording_silent.wav");
        let backend = MockBackend::new(vec![device(0, "Mic", 1)]).with_amplitude(0.0);

        recorder(&backend, CancellationToken::new())
            .record_segment(&device(0, "Mic", 1), Duration::from_secs(2), &path)
            .unwrap();

        assert!(read_back(&path).iter().all(|&s| s == 0));
    }

    #[test]
    fn cancellation_during_chunk_keeps_chunks_so_far() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("recording_c.wav");
        let cancel = CancellationToken::new();
        // Cancel while the second of four chunks is being captured.
        let backend =
            MockBackend::new(vec![device(0, "Mic", 1)]).cancelling_during_read(1, cancel.clone());

        let result = recorder(&backend, cancel)
            .record_segment(&device(0, "Mic", 1), Duration::from_secs(20), &path)
            .unwrap();

        assert_eq!(backend.requested().len(), 2);
        assert_eq!(result.chunks_captured, 2);
        assert_eq!(result.chunks_planned, 4);
        assert!(result.is_partial());
        assert_eq!(read_back(&path).len(), 1000);
    }

    #[test]
    fn cancellation_before_first_chunk_fails_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("recording_d.wav");
        let cancel = CancellationToken::new();
        cancel.cancel();
        let backend = MockBackend::new(vec![device(0, "Mic", 1)]);

        let err = recorder(&backend, cancel)
            .record_segment(&device(0, "Mic", 1), Duration::from_secs(10), &path)
            .unwrap_err();

        assert_eq!(err, CaptureError::EmptySegment);
        assert!(backend.requested().is_empty());
        assert!(!path.exists());
        assert!(!temp_path_for(&path).exists());
    }

    #[test]
    fn chunk_error_aborts_segment_without_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("recording_e.wav");
        let backend = MockBackend::new(vec![device(0, "Mic", 1)]).failing_read(2);

        let err = recorder(&backend, CancellationToken::new())
            .record_segment(&device(0, "Mic", 1), Duration::from_secs(20), &path)
            .unwrap_err();

        assert!(matches!(err, CaptureError::ChunkCapture { chunk: 2, .. }));
        assert_eq!(backend.requested().len(), 3);
        assert!(!path.exists());
        assert!(!temp_path_for(&path).exists());
    }

    #[test]
    fn open_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("recording_f.wav");
        let backend = MockBackend::new(vec![device(0, "Mic", 1)]).failing_open();

        let err = recorder(&backend, CancellationToken::new())
            .record_segment(&device(0, "Mic", 1), Duration::from_secs(5), &path)
            .unwrap_err();

        match err {
            CaptureError::ChunkCapture { chunk, message } => {
                assert_eq!(chunk, 0);
                assert!(message.contains("device busy"), "{}", message);
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(!path.exists());
    }

    #[test]
    fn write_failure_leaves_no_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("recording_g.wav");
        let backend = MockBackend::new(vec![device(0, "Mic", 1)]);

        let err = recorder(&backend, CancellationToken::new())
            .record_segment(&device(0, "Mic", 1), Duration::from_secs(5), &path)
            .unwrap_err();

        assert!(matches!(err, CaptureError::Storage(_)));
        assert!(!path.exists());
        assert!(!temp_path_for(&path).exists());
    }

    #[test]
    fn stereo_segment_has_two_channels() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("recording_stereo.wav");
        let backend = MockBackend::new(vec![device(0, "Mic", 2)]);
        let rec = ChunkedSegmentRecorder::new(
            Arc::new(backend.clone()),
            StreamFormat {
                sample_rate: RATE,
                channels: 2,
            },
            Duration::from_secs(5),
            0.9,
            CancellationToken::new(),
        );

        rec.record_segment(&device(0, "Mic", 2), Duration::from_secs(3), &path)
            .unwrap();

        let reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().channels, 2);
        assert_eq!(reader.duration(), 300);
    }
}
