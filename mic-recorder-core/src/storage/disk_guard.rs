//! Point-in-time disk admission check performed before each segment.

use std::path::Path;
use std::time::Duration;

use crate::models::error::CaptureError;

/// Source of free-space figures for a directory's filesystem.
pub trait FreeSpaceProbe: Send + Sync {
    /// Bytes available to an unprivileged writer on the filesystem backing `path`.
    fn free_bytes(&self, path: &Path) -> Result<u64, CaptureError>;
}

/// `statvfs(3)` on Unix; unsupported elsewhere (which makes the guard fail open).
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemFreeSpace;

impl FreeSpaceProbe for SystemFreeSpace {
    #[cfg(unix)]
    fn free_bytes(&self, path: &Path) -> Result<u64, CaptureError> {
        use std::ffi::CString;
        use std::os::unix::ffi::OsStrExt;

        let c_path = CString::new(path.as_os_str().as_bytes()).map_err(|_| {
            CaptureError::DiskSpaceQuery(format!("path contains NUL: {}", path.display()))
        })?;

        // SAFETY: statvfs is a plain C struct of integers; all-zero is a valid value.
        let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
        // SAFETY: c_path is a valid NUL-terminated string and stat is a valid out-pointer.
        let rc = unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) };
        if rc != 0 {
            return Err(CaptureError::DiskSpaceQuery(format!(
                "statvfs({}) failed: {}",
                path.display(),
                std::io::Error::last_os_error()
            )));
        }
        #[allow(clippy::unnecessary_cast)]
        Ok(stat.f_bavail as u64 * stat.f_frsize as u64)
    }

    #[cfg(not(unix))]
    fn free_bytes(&self, path: &Path) -> Result<u64, CaptureError> {
        Err(CaptureError::DiskSpaceQuery(format!(
            "free space query unsupported on this platform ({})",
            path.display()
        )))
    }
}

/// Outcome of one admission check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpaceCheck {
    Sufficient {
        free_bytes: u64,
        required_bytes: u64,
    },
    Insufficient {
        free_bytes: u64,
        required_bytes: u64,
    },
    /// The query failed; callers proceed as if space were sufficient.
    Unknown(CaptureError),
}

impl SpaceCheck {
    pub fn admits(&self) -> bool {
        !matches!(self, Self::Insufficient { .. })
    }
}

/// Bytes one segment will occupy: `duration × rate × channels × bytes_per_sample`.
pub fn estimate_segment_bytes(
    duration: Duration,
    sample_rate: u32,
    channels: u16,
    bytes_per_sample: u16,
) -> u64 {
    let frames = duration.as_secs_f64() * sample_rate as f64;
    let bytes = frames * channels as f64 * bytes_per_sample as f64;
    bytes.ceil() as u64
}

/// Gates each new segment on available disk space.
pub struct DiskSpaceGuard {
    probe: Box<dyn FreeSpaceProbe>,
}

impl DiskSpaceGuard {
    pub fn new(probe: Box<dyn FreeSpaceProbe>) -> Self {
        Self { probe }
    }

    pub fn system() -> Self {
        Self::new(Box::new(SystemFreeSpace))
    }

    /// Check whether one more segment fits with `min_free_margin` bytes to spare.
    pub fn check(
        &self,
        output_directory: &Path,
        planned_segment_duration: Duration,
        sample_rate: u32,
        channels: u16,
        bytes_per_sample: u16,
        min_free_margin: u64,
    ) -> SpaceCheck {
        let estimated = estimate_segment_bytes(
            planned_segment_duration,
            sample_rate,
            channels,
            bytes_per_sample,
        );
        let required = estimated.saturating_add(min_free_margin);

        let free = match self.probe.free_bytes(output_directory) {
            Ok(free) => free,
            Err(e) => {
                log::warn!(
                    "Could not verify disk space for {}: {}. Assuming sufficient for now.",
                    output_directory.display(),
                    e
                );
                return SpaceCheck::Unknown(e);
            }
        };

        log::info!(
            "Available disk space: {:.1} MB. Estimated next segment size: {:.2} MB.",
            to_mb(free),
            to_mb(estimated)
        );

        if free < required {
            log::error!(
                "Insufficient disk space in {}: {:.1} MB free, segment {:.2} MB, margin {:.1} MB.",
                output_directory.display(),
                to_mb(free),
                to_mb(estimated),
                to_mb(min_free_margin)
            );
            SpaceCheck::Insufficient {
                free_bytes: free,
                required_bytes: required,
            }
        } else {
            SpaceCheck::Sufficient {
                free_bytes: free,
                required_bytes: required,
            }
        }
    }

    /// Boolean form of [`check`](Self::check). False only when space is known to be short.
    pub fn has_sufficient_space(
        &self,
        output_directory: &Path,
        planned_segment_duration: Duration,
        sample_rate: u32,
        channels: u16,
        bytes_per_sample: u16,
        min_free_margin: u64,
    ) -> bool {
        self.check(
            output_directory,
            planned_segment_duration,
            sample_rate,
            channels,
            bytes_per_sample,
            min_free_margin,
        )
        .admits()
    }
}

fn to_mb(bytes: u64) -> f64 {
    bytes as f64 / (1024.0 * 1024.0)
}
