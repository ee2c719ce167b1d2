/// A capture-capable device as reported by the host audio subsystem.
///
/// Immutable snapshot; the catalog is re-queried on every selection attempt
/// because devices come and go between queries.
#[derive(Debug, Clone, PartialEq)]
pub struct Device {
    /// Host enumeration handle. Only valid until the host's device list changes.
    pub id: u32,
    pub name: String,
    pub max_input_channels: u16,
    pub default_sample_rate: f64,
}

impl Device {
    pub fn has_input(&self) -> bool {
        self.max_input_channels > 0
    }
}

impl std::fmt::Display for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.id, self.name)
    }
}

/// Format the core asks a backend to deliver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl StreamFormat {
    /// Interleaved sample count for `frames` frames.
    pub fn samples_for(&self, frames: usize) -> usize {
        frames * self.channels as usize
    }
}
