//! Output directory preparation, run once before the supervisor starts.

use std::fs;
use std::path::Path;

use mic_recorder_core::models::error::CaptureError;
use mic_recorder_core::storage::segment_writer::sweep_stale_temp_files;

/// Name of the probe file written to prove the directory is writable.
pub const WRITABLE_PROBE: &str = ".writable_test";

/// Create `dir` if needed, prove it is writable, and remove temp files a
/// previous run left behind.
///
/// Returns the number of stale temp files removed.
pub fn prepare_output_directory(dir: &Path) -> Result<usize, CaptureError> {
    fs::create_dir_all(dir).map_err(|e| {
        CaptureError::Storage(format!("cannot create output directory {}: {}", dir.display(), e))
    })?;

    let probe = dir.join(WRITABLE_PROBE);
    fs::write(&probe, b"test").map_err(|e| {
        CaptureError::Storage(format!("output directory {} is not writable: {}", dir.display(), e))
    })?;
    if let Err(e) = fs::remove_file(&probe) {
        log::warn!("Could not remove {}: {}", probe.display(), e);
    }
    log::info!("Output directory {} is writable.", dir.display());

    let removed = sweep_stale_temp_files(dir)?;
    if removed > 0 {
        log::warn!(
            "Removed {} incomplete segment(s) from a previous run.",
            removed
        );
    }
    Ok(removed)
}
