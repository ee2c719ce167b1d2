use crate::models::device::Device;
use crate::traits::capture_backend::CaptureBackend;

/// Enumerate capture-capable devices in host order.
///
/// Never fails: a host query error is logged and reported as an empty
/// catalog, which the supervisor treats as "no device found".
pub fn enumerate(backend: &dyn CaptureBackend) -> Vec<Device> {
    let devices = match backend.devices() {
        Ok(devices) => devices,
        Err(e) => {
            log::error!("Error listing audio devices: {}", e);
            return Vec::new();
        }
    };

    if devices.is_empty() {
        log::info!("No audio devices reported by host");
        return Vec::new();
    }

    log::info!("Available audio devices:");
    for device in &devices {
        log::info!(
            "Device {}: {}, inputs: {}, default SR: {}",
            device.id,
            device.name,
            device.max_input_channels,
            device.default_sample_rate
        );
    }

    let inputs: Vec<Device> = devices.into_iter().filter(Device::has_input).collect();
    if inputs.is_empty() {
        log::warn!("No devices with input channels found");
    }
    inputs
}
