use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Local};
use uuid::Uuid;

/// Suffix appended to a segment's final path while it is being written.
pub const TEMP_SUFFIX: &str = ".tmp";

/// One bounded slice of captured audio, interleaved f32 in `[-1.0, 1.0]`.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioChunk {
    pub index: usize,
    pub frames: usize,
    pub samples: Vec<f32>,
}

/// A segment being recorded.
///
/// Owned exclusively by the recorder for its lifetime; the chunk sequence is
/// dropped as soon as it has been encoded.
#[derive(Debug)]
pub struct Segment {
    pub id: Uuid,
    pub started_at: DateTime<Local>,
    pub target_duration: Duration,
    pub final_path: PathBuf,
    pub temp_path: PathBuf,
    pub chunks: Vec<AudioChunk>,
}

impl Segment {
    /// Create a segment named `recording_<YYYYMMDD_HHMMSS>.wav` in `output_dir`.
    ///
    /// If a file with that name already exists (two segments started within
    /// the same second), a numeric suffix is added so nothing is replaced.
    pub fn new(output_dir: &Path, target_duration: Duration, started_at: DateTime<Local>) -> Self {
        let final_path = unique_segment_path(output_dir, &started_at);
        Self {
            id: Uuid::new_v4(),
            started_at,
            target_duration,
            temp_path: temp_path_for(&final_path),
            final_path,
            chunks: Vec::new(),
        }
    }

    /// Create a segment with an explicit final path.
    pub fn at_path(final_path: PathBuf, target_duration: Duration) -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Local::now(),
            target_duration,
            temp_path: temp_path_for(&final_path),
            final_path,
            chunks: Vec::new(),
        }
    }

    pub fn captured_frames(&self) -> usize {
        self.chunks.iter().map(|c| c.frames).sum()
    }

    /// Concatenate chunks in capture order, releasing the chunk buffers.
    pub fn take_samples(&mut self) -> Vec<f32> {
        let total = self.chunks.iter().map(|c| c.samples.len()).sum();
        let mut samples = Vec::with_capacity(total);
        for chunk in self.chunks.drain(..) {
            samples.extend_from_slice(&chunk.samples);
        }
        samples
    }
}

/// `<final_path>.tmp`
pub fn temp_path_for(final_path: &Path) -> PathBuf {
    let mut name = OsString::from(final_path.as_os_str());
    name.push(TEMP_SUFFIX);
    PathBuf::from(name)
}

/// File name stem for a segment started at `started_at`.
pub fn segment_file_stem(started_at: &DateTime<Local>) -> String {
    format!("recording_{}", started_at.format("%Y%m%d_%H%M%S"))
}

fn unique_segment_path(output_dir: &Path, started_at: &DateTime<Local>) -> PathBuf {
    let stem = segment_file_stem(started_at);
    let mut candidate = output_dir.join(format!("{}.wav", stem));
    let mut n = 1;
    while candidate.exists() {
        candidate = output_dir.join(format!("{}_{}.wav", stem, n));
        n += 1;
    }
    candidate
}

/// Result returned when a segment has been finalized.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingResult {
    pub segment_id: Uuid,
    pub file_path: PathBuf,
    pub started_at: DateTime<Local>,
    /// Duration of audio actually written.
    pub duration_secs: f64,
    pub chunks_captured: usize,
    pub chunks_planned: usize,
    /// Peak absolute amplitude of the captured audio before scaling.
    pub input_peak: f32,
    /// SHA-256 hex digest of the finalized file.
    pub checksum: String,
}

impl RecordingResult {
    /// True when cancellation cut the segment short.
    pub fn is_partial(&self) -> bool {
        self.chunks_captured < self.chunks_planned
    }
}
