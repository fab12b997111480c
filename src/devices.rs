//! Video input device discovery.
//!
//! Devices are listed by an injected [`DeviceEnumerator`]. Before camera
//! permission is granted most platforms hide device labels (and sometimes
//! the devices themselves), so callers must treat every listing as
//! best-effort and safe to repeat.

use std::fmt;

/// A single video input device as reported by the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoDevice {
    pub device_id: String,
    /// Empty until the platform discloses labels (usually after permission).
    pub label: String,
}

impl VideoDevice {
    pub fn new(device_id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            label: label.into(),
        }
    }
}

/// Errors that can occur while listing devices.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EnumerationError {
    /// The runtime has no device enumeration capability at all.
    #[error("Camera access is not supported on this platform")]
    Unsupported,

    #[error("Failed to access camera devices: {0}")]
    Failed(String),
}

/// Lists the available video input devices.
pub trait DeviceEnumerator: Send + Sync {
    /// May return an empty list before permission is granted.
    fn list_video_input_devices(&self) -> Result<Vec<VideoDevice>, EnumerationError>;
}

/// Pick the default device from a listing.
///
/// The last entry wins: on phones and tablets the platform lists the
/// rear-facing camera after the front one. Entries with an empty id (hidden
/// pre-permission placeholders) are skipped.
pub fn default_device_id(devices: &[VideoDevice]) -> Option<&str> {
    devices
        .iter()
        .rev()
        .find(|d| !d.device_id.is_empty())
        .map(|d| d.device_id.as_str())
}

/// Human-readable name for the device at `position` in a listing.
///
/// Falls back to `Camera N` (1-based) when the platform has not disclosed a
/// label yet.
pub fn display_label(device: &VideoDevice, position: usize) -> String {
    if device.label.trim().is_empty() {
        format!("Camera {}", position + 1)
    } else {
        device.label.clone()
    }
}

/// Wrapper for printing a device listing.
pub struct DeviceListing<'a>(pub &'a [VideoDevice], pub Option<&'a str>);

impl fmt::Display for DeviceListing<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let DeviceListing(devices, selected) = self;
        writeln!(f, "Video Devices:")?;
        if devices.is_empty() {
            return writeln!(f, "  (none found)");
        }
        for (i, device) in devices.iter().enumerate() {
            let marker = if Some(device.device_id.as_str()) == *selected {
                "*"
            } else {
                " "
            };
            writeln!(
                f,
                " {}[{}] {} ({})",
                marker,
                i,
                display_label(device, i),
                device.device_id
            )?;
        }
        Ok(())
    }
}
