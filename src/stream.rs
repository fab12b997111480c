//! Live media streams and the provider that hands them out.
//!
//! A [`MediaStream`] keeps the camera hardware busy for as long as any of its
//! tracks is live. Dropping the handle does not release the device; every
//! track has to be stopped explicitly (see [`stop_all_tracks`]).

use image::RgbImage;

/// Kind of media carried by a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Video,
    Audio,
}

impl TrackKind {
    pub fn name(&self) -> &'static str {
        match self {
            TrackKind::Video => "video",
            TrackKind::Audio => "audio",
        }
    }
}

/// One media channel within a stream.
pub trait MediaTrack: Send {
    fn kind(&self) -> TrackKind;

    /// Whether the track still holds the underlying device.
    fn is_live(&self) -> bool;

    /// Stop the track and release its hold on the device. Idempotent.
    fn stop(&mut self);
}

/// A live handle to one or more tracks from a capture device.
pub trait MediaStream: Send {
    /// Identifier of the device this stream is bound to.
    fn device_id(&self) -> &str;

    fn tracks_mut(&mut self) -> Vec<&mut dyn MediaTrack>;

    /// Snapshot of the frame currently shown by the video track.
    fn current_frame(&mut self) -> Result<RgbImage, StreamError>;
}

/// Failure classes reported by a [`MediaStreamProvider`].
///
/// Platform-specific error names are mapped onto these variants at the
/// provider boundary; nothing above it inspects error strings.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AcquireError {
    #[error("Camera permission was denied")]
    PermissionDenied,

    #[error("No camera device was found")]
    DeviceNotFound { device_id: Option<String> },

    #[error("Camera is already in use by another application")]
    DeviceBusy { device_id: Option<String> },

    #[error("Camera access is not supported on this platform")]
    Unsupported,

    #[error("Error accessing camera: {0}")]
    Other(String),
}

/// Errors raised by an already-acquired stream.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    #[error("Stream has ended")]
    Ended,

    #[error("No frame available yet")]
    NoFrame,

    #[error("Failed to read frame: {0}")]
    ReadFailed(String),
}

/// Grants or denies access to a device and yields a live stream.
pub trait MediaStreamProvider: Send + Sync {
    /// Acquire a video stream for `device_id`, or for any available device
    /// when `None`. May block while the platform prompts the user.
    fn acquire(&self, device_id: Option<&str>) -> Result<Box<dyn MediaStream>, AcquireError>;
}

/// Stop every live track of `stream`, returning how many were stopped.
pub fn stop_all_tracks(stream: &mut dyn MediaStream) -> usize {
    let device_id = stream.device_id().to_string();
    let mut stopped = 0;
    for track in stream.tracks_mut() {
        if track.is_live() {
            log::info!(
                "Stopping camera track: kind={} device={}",
                track.kind().name(),
                device_id
            );
            track.stop();
            stopped += 1;
        }
    }
    stopped
}
