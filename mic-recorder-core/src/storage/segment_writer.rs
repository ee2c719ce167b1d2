use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::models::error::CaptureError;
use crate::models::segment::TEMP_SUFFIX;
use crate::processing::wav_format;

/// Writes a finished segment to `<final>.tmp`, then renames it into place.
///
/// A reader listing the output directory never sees a partially written
/// file at the final path: the rename is the only operation that creates it.
/// Any failure after the temp file was created removes the temp file.
///
/// ## File Format
/// ```text
/// [44-byte WAV header]
/// [16-bit little-endian PCM data...]
/// ```
pub struct SegmentWriter<'a> {
    temp_path: &'a Path,
    final_path: &'a Path,
}

impl<'a> SegmentWriter<'a> {
    pub fn new(temp_path: &'a Path, final_path: &'a Path) -> Self {
        Self {
            temp_path,
            final_path,
        }
    }

    /// Encode `pcm`, write it atomically and return the file's SHA-256.
    pub fn finalize(
        &self,
        pcm: &[i16],
        sample_rate: u32,
        channels: u16,
    ) -> Result<String, CaptureError> {
        let bytes = wav_format::encode_pcm16(pcm, sample_rate, channels).ok_or_else(|| {
            CaptureError::Encoding(format!("{} samples exceed the WAV size limit", pcm.len()))
        })?;

        if let Err(e) = self.write_temp(&bytes).and_then(|_| self.promote()) {
            remove_temp_file(self.temp_path);
            return Err(e);
        }

        Ok(hex_encode(&Sha256::digest(&bytes)))
    }

    fn write_temp(&self, bytes: &[u8]) -> Result<(), CaptureError> {
        let mut file = File::create(self.temp_path).map_err(|e| {
            CaptureError::Storage(format!("failed to create {}: {}", self.temp_path.display(), e))
        })?;
        file.write_all(bytes)
            .map_err(|e| CaptureError::Storage(format!("write failed: {}", e)))?;
        file.sync_all()
            .map_err(|e| CaptureError::Storage(format!("sync failed: {}", e)))?;
        Ok(())
    }

    fn promote(&self) -> Result<(), CaptureError> {
        fs::rename(self.temp_path, self.final_path).map_err(|e| {
            CaptureError::Storage(format!(
                "failed to rename {} to {}: {}",
                self.temp_path.display(),
                self.final_path.display(),
                e
            ))
        })?;

        // Persist the directory entry too; failure here does not undo the rename.
        #[cfg(unix)]
        if let Some(parent) = self.final_path.parent() {
            if let Err(e) = File::open(parent).and_then(|d| d.sync_all()) {
                log::debug!("Could not sync directory {}: {}", parent.display(), e);
            }
        }
        Ok(())
    }
}

/// Remove a temp file if it exists, logging anything other than "not found".
pub fn remove_temp_file(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => log::info!("Cleaned up temporary file {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => log::error!("Could not remove temporary file {}: {}", path.display(), e),
    }
}

/// Delete `*.wav.tmp` files left in `dir` by an earlier crash.
///
/// Returns the number of files removed.
pub fn sweep_stale_temp_files(dir: &Path) -> Result<usize, CaptureError> {
    let entries = fs::read_dir(dir)
        .map_err(|e| CaptureError::Storage(format!("failed to list {}: {}", dir.display(), e)))?;

    let suffix = format!(".wav{}", TEMP_SUFFIX);
    let mut removed = 0;
    for entry in entries.filter_map(|e| e.ok()) {
        let path = entry.path();
        let is_stale = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.ends_with(&suffix))
            .unwrap_or(false);
        if is_stale && path.is_file() {
            match fs::remove_file(&path) {
                Ok(()) => {
                    log::warn!("Removed stale temporary file {}", path.display());
                    removed += 1;
                }
                Err(e) => log::error!("Could not remove stale file {}: {}", path.display(), e),
            }
        }
    }
    Ok(removed)
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
