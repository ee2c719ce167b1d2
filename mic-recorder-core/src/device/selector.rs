use crate::models::device::Device;
use crate::traits::capture_backend::CaptureBackend;

use super::catalog;

/// Ordered device preference, first match wins:
///
/// 1. a catalog device whose name contains `preferred_substring` (case-insensitive)
/// 2. the host default input device, if it has input channels
/// 3. the first catalog device
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionPolicy {
    pub preferred_substring: String,
}

impl SelectionPolicy {
    pub fn new(preferred_substring: impl Into<String>) -> Self {
        Self {
            preferred_substring: preferred_substring.into(),
        }
    }

    /// Apply the policy to an already-enumerated catalog.
    ///
    /// An empty catalog yields `None` even if a default device was reported.
    pub fn select(&self, catalog: &[Device], default_device: Option<&Device>) -> Option<Device> {
        if catalog.is_empty() {
            log::error!("No input devices found after listing");
            return None;
        }

        if !self.preferred_substring.is_empty() {
            let wanted = self.preferred_substring.to_lowercase();
            let matches = |d: &&Device| d.name.to_lowercase().contains(&wanted);
            if let Some(device) = catalog.iter().find(matches) {
                log::info!("Preferred device found: ID {} - {}", device.id, device.name);
                return Some(device.clone());
            }
            log::warn!(
                "Preferred device substring '{}' not found. Trying default.",
                self.preferred_substring
            );
        }

        if let Some(default) = default_device.filter(|d| d.has_input()) {
            // Prefer the catalog's snapshot of the same id for a consistent name.
            let device = catalog
                .iter()
                .find(|d| d.id == default.id)
                .cloned()
                .unwrap_or_else(|| default.clone());
            log::info!(
                "Default input device identified: ID {} - {}",
                device.id,
                device.name
            );
            return Some(device);
        }

        let first = catalog[0].clone();
        log::info!(
            "Using first available input device from list: ID {} - {}",
            first.id,
            first.name
        );
        Some(first)
    }
}

/// Enumerate, query the host default and apply `policy`.
///
/// A failing default-device query counts as "no default". No retries here;
/// retry and backoff belong to the supervisor.
pub fn select_device(backend: &dyn CaptureBackend, policy: &SelectionPolicy) -> Option<Device> {
    let catalog = catalog::enumerate(backend);
    if catalog.is_empty() {
        log::error!("No input devices found after listing");
        return None;
    }

    let default = match backend.default_input_device() {
        Ok(default) => {
            if default.is_none() {
                log::warn!("Host reports no default input device");
            }
            default
        }
        Err(e) => {
            log::warn!(
                "Could not determine default input device: {}. Trying first available from list.",
                e
            );
            None
        }
    };

    policy.select(&catalog, default.as_ref())
}
