//! In-process camera backend.
//!
//! Stands in for platform media APIs: a fixed device list, a permission
//! subsystem that flips to granted on the first successful acquisition, and
//! streams that render a moving gradient. Failure modes can be forced to
//! exercise the denied/unavailable paths.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use image::{Rgb, RgbImage};
use serde::Deserialize;
use tokio::sync::watch;

use crate::capture::Resolution;
use crate::devices::{DeviceEnumerator, EnumerationError, VideoDevice};
use crate::permissions::{ManualPermission, PermissionSource, PermissionState};
use crate::stream::{AcquireError, MediaStream, MediaStreamProvider, MediaTrack, StreamError, TrackKind};

/// Failure forced on every acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SimulatedFailure {
    #[default]
    None,
    Denied,
    NotFound,
    Busy,
    Unsupported,
}

impl std::str::FromStr for SimulatedFailure {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(SimulatedFailure::None),
            "denied" => Ok(SimulatedFailure::Denied),
            "not-found" => Ok(SimulatedFailure::NotFound),
            "busy" => Ok(SimulatedFailure::Busy),
            "unsupported" => Ok(SimulatedFailure::Unsupported),
            _ => Err(format!(
                "Unknown failure mode '{}'. Available: none, denied, not-found, busy, unsupported",
                s
            )),
        }
    }
}

/// Shared camera "hardware" state.
struct Hardware {
    devices: Vec<VideoDevice>,
    frame_size: Resolution,
    failure: SimulatedFailure,
    permission: ManualPermission,
    live_tracks: AtomicUsize,
    acquisitions: AtomicUsize,
    next_stream: AtomicU64,
}

/// Simulated camera backend. Clones share the same hardware.
#[derive(Clone)]
pub struct SimulatedCamera {
    hw: Arc<Hardware>,
}

impl SimulatedCamera {
    /// Devices get ids `cam0`, `cam1`, ... in the order given.
    pub fn new(labels: &[String], frame_size: Resolution) -> Self {
        Self::with_failure(labels, frame_size, SimulatedFailure::None)
    }

    /// Like [`SimulatedCamera::new`], but every acquisition fails with
    /// `failure`. The mode is fixed for the lifetime of the hardware.
    pub fn with_failure(labels: &[String], frame_size: Resolution, failure: SimulatedFailure) -> Self {
        let devices = labels
            .iter()
            .enumerate()
            .map(|(i, label)| VideoDevice::new(format!("cam{}", i), label.clone()))
            .collect();
        if failure != SimulatedFailure::None {
            log::info!("Simulated camera forced to fail: {:?}", failure);
        }
        Self {
            hw: Arc::new(Hardware {
                devices,
                frame_size,
                failure,
                permission: ManualPermission::default(),
                live_tracks: AtomicUsize::new(0),
                acquisitions: AtomicUsize::new(0),
                next_stream: AtomicU64::new(0),
            }),
        }
    }

    /// Number of tracks currently holding a device.
    pub fn live_tracks(&self) -> usize {
        self.hw.live_tracks.load(Ordering::SeqCst)
    }

    /// Number of successful acquisitions so far.
    pub fn acquisitions(&self) -> usize {
        self.hw.acquisitions.load(Ordering::SeqCst)
    }

    /// Change the platform permission, as a user would in system settings.
    pub fn set_permission(&self, state: PermissionState) {
        self.hw.permission.set(state);
    }

    fn failure_error(&self, device_id: Option<&str>) -> Option<AcquireError> {
        let device_id = device_id.map(str::to_string);
        match self.hw.failure {
            SimulatedFailure::None => None,
            SimulatedFailure::Denied => Some(AcquireError::PermissionDenied),
            SimulatedFailure::NotFound => Some(AcquireError::DeviceNotFound { device_id }),
            SimulatedFailure::Busy => Some(AcquireError::DeviceBusy { device_id }),
            SimulatedFailure::Unsupported => Some(AcquireError::Unsupported),
        }
    }
}

impl DeviceEnumerator for SimulatedCamera {
    fn list_video_input_devices(&self) -> Result<Vec<VideoDevice>, EnumerationError> {
        if self.hw.failure == SimulatedFailure::Unsupported {
            return Err(EnumerationError::Unsupported);
        }
        // Labels stay hidden until the user has granted access
        let disclose = self.hw.permission.current() == PermissionState::Granted;
        Ok(self
            .hw
            .devices
            .iter()
            .map(|d| VideoDevice {
                device_id: d.device_id.clone(),
                label: if disclose { d.label.clone() } else { String::new() },
            })
            .collect())
    }
}

impl MediaStreamProvider for SimulatedCamera {
    fn acquire(&self, device_id: Option<&str>) -> Result<Box<dyn MediaStream>, AcquireError> {
        if let Some(err) = self.failure_error(device_id) {
            if err == AcquireError::PermissionDenied {
                self.hw.permission.set(PermissionState::Denied);
            }
            return Err(err);
        }

        let device = match device_id {
            Some(id) => self.hw.devices.iter().find(|d| d.device_id == id),
            None => self.hw.devices.first(),
        }
        .ok_or_else(|| AcquireError::DeviceNotFound {
            device_id: device_id.map(str::to_string),
        })?;

        self.hw.permission.set(PermissionState::Granted);
        self.hw.acquisitions.fetch_add(1, Ordering::SeqCst);
        self.hw.live_tracks.fetch_add(1, Ordering::SeqCst);
        let seq = self.hw.next_stream.fetch_add(1, Ordering::SeqCst);
        log::debug!("Simulated stream {} opened on {}", seq, device.device_id);

        Ok(Box::new(SimulatedStream {
            device_id: device.device_id.clone(),
            seed: seq,
            frame_no: 0,
            frame_size: self.hw.frame_size,
            track: SimulatedTrack {
                live: true,
                hw: self.hw.clone(),
            },
        }))
    }
}

impl PermissionSource for SimulatedCamera {
    fn subscribe(&self) -> Option<watch::Receiver<PermissionState>> {
        if self.hw.failure == SimulatedFailure::Unsupported {
            return None;
        }
        self.hw.permission.subscribe()
    }
}

struct SimulatedTrack {
    live: bool,
    hw: Arc<Hardware>,
}

impl MediaTrack for SimulatedTrack {
    fn kind(&self) -> TrackKind {
        TrackKind::Video
    }

    fn is_live(&self) -> bool {
        self.live
    }

    fn stop(&mut self) {
        if self.live {
            self.live = false;
            self.hw.live_tracks.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

struct SimulatedStream {
    device_id: String,
    seed: u64,
    frame_no: u64,
    frame_size: Resolution,
    track: SimulatedTrack,
}

impl MediaStream for SimulatedStream {
    fn device_id(&self) -> &str {
        &self.device_id
    }

    fn tracks_mut(&mut self) -> Vec<&mut dyn MediaTrack> {
        vec![&mut self.track as &mut dyn MediaTrack]
    }

    fn current_frame(&mut self) -> Result<RgbImage, StreamError> {
        if !self.track.is_live() {
            return Err(StreamError::Ended);
        }
        self.frame_no += 1;
        let Resolution { width, height } = self.frame_size;
        let phase = ((self.seed * 37 + self.frame_no) % 256) as u8;
        Ok(RgbImage::from_fn(width, height, |x, y| {
            Rgb([
                (x * 255 / width.max(1)) as u8,
                (y * 255 / height.max(1)) as u8,
                phase,
            ])
        }))
    }
}
