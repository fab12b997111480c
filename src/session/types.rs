//! Capture session types.

use std::fmt;
use std::sync::Arc;

use crate::capture::{CapturedImage, Resolution, UploadLimits};
use crate::devices::VideoDevice;
use crate::identify::IdentificationResult;
use crate::permissions::PermissionState;
use crate::stream::AcquireError;

/// Input source. The two are mutually exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Upload,
    Live,
}

impl Mode {
    pub fn name(&self) -> &'static str {
        match self {
            Mode::Upload => "upload",
            Mode::Live => "live",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Why the camera cannot be used, kept apart from a plain denial so the
/// interface can explain what happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnavailableReason {
    NoDevice,
    DeviceBusy,
    Unsupported,
    /// Permission was withdrawn while the camera was streaming.
    PermissionRevoked,
    Other(String),
}

impl UnavailableReason {
    pub fn message(&self) -> String {
        match self {
            UnavailableReason::NoDevice => "No camera device was found".to_string(),
            UnavailableReason::DeviceBusy => {
                "Camera is already in use by another application".to_string()
            }
            UnavailableReason::Unsupported => {
                "Camera access is not supported on this platform".to_string()
            }
            UnavailableReason::PermissionRevoked => {
                "Camera permission was revoked while streaming".to_string()
            }
            UnavailableReason::Other(msg) => format!("Error accessing camera: {}", msg),
        }
    }
}

/// Lifecycle state of the camera side of the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Upload mode; no camera held.
    Upload,
    /// A stream acquisition is outstanding.
    AwaitingPermission,
    /// A stream is bound and streaming.
    Active,
    /// The user refused camera access.
    Denied,
    Unavailable(UnavailableReason),
}

impl SessionState {
    pub fn is_live(&self) -> bool {
        !matches!(self, SessionState::Upload)
    }

    /// Whether the session is parked until the user explicitly retries.
    pub fn needs_retry(&self) -> bool {
        matches!(self, SessionState::Denied | SessionState::Unavailable(_))
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Upload => write!(f, "idle/upload"),
            SessionState::AwaitingPermission => write!(f, "awaiting-permission"),
            SessionState::Active => write!(f, "live/active"),
            SessionState::Denied => write!(f, "live/denied"),
            SessionState::Unavailable(_) => write!(f, "live/unavailable"),
        }
    }
}

/// Identifies one stream acquisition. Completions carrying an outdated
/// ticket are stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AcquireTicket(pub(crate) u64);

/// Identifies one identification request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IdentifyTicket(pub(crate) u64);

/// Instruction to acquire a stream, returned by session operations that
/// need one. The caller runs the acquisition and reports back through
/// [`CaptureSession::stream_acquired`](super::CaptureSession::stream_acquired).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquireRequest {
    pub ticket: AcquireTicket,
    /// `None` means any available device.
    pub device_id: Option<String>,
}

/// Instruction to identify a freshly produced still. The caller runs the
/// request and reports back through
/// [`CaptureSession::identification_finished`](super::CaptureSession::identification_finished).
#[derive(Debug, Clone)]
pub struct IdentifyRequest {
    pub ticket: IdentifyTicket,
    pub image: Arc<CapturedImage>,
}

/// Result of a mode change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModeChange {
    /// Now live; the stream still has to be acquired.
    Live(AcquireRequest),
    Upload,
}

/// What a completed acquisition did to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// Stream bound. Devices should be re-enumerated now that labels may be
    /// disclosed.
    Active,
    Denied,
    Unavailable(UnavailableReason),
    /// The acquisition was superseded; its stream (if any) was stopped.
    Stale,
}

/// Classify an acquisition failure. `None` means a plain permission denial.
pub fn unavailable_reason(err: &AcquireError) -> Option<UnavailableReason> {
    match err {
        AcquireError::PermissionDenied => None,
        AcquireError::DeviceNotFound { .. } => Some(UnavailableReason::NoDevice),
        AcquireError::DeviceBusy { .. } => Some(UnavailableReason::DeviceBusy),
        AcquireError::Unsupported => Some(UnavailableReason::Unsupported),
        AcquireError::Other(msg) => Some(UnavailableReason::Other(msg.clone())),
    }
}

impl From<&AcquireError> for SessionState {
    fn from(err: &AcquireError) -> Self {
        match unavailable_reason(err) {
            Some(reason) => SessionState::Unavailable(reason),
            None => SessionState::Denied,
        }
    }
}

/// Outcome of the most recent identification.
#[derive(Debug, Clone, PartialEq)]
pub enum Identification {
    Identified(IdentificationResult),
    /// The backend failed; the message is safe to show. Discarded by reset
    /// like a result.
    Failed(String),
}

impl Identification {
    pub fn result(&self) -> Option<&IdentificationResult> {
        match self {
            Identification::Identified(result) => Some(result),
            Identification::Failed(_) => None,
        }
    }
}

/// Tunables for a session.
#[derive(Debug, Clone, Default)]
pub struct SessionSettings {
    /// Size of stills captured from the live stream.
    pub capture_size: Resolution,
    pub upload_limits: UploadLimits,
    /// Device to select instead of the enumeration default.
    pub preferred_device: Option<String>,
}

/// Point-in-time copy of everything an interface renders.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub mode: Mode,
    pub state: SessionState,
    pub permission: PermissionState,
    pub devices: Vec<VideoDevice>,
    pub selected_device: Option<String>,
    pub last_error: Option<String>,
    pub streaming: bool,
    pub analyzing: bool,
    pub image: Option<Arc<CapturedImage>>,
    pub identification: Option<Identification>,
    pub shut_down: bool,
}

impl SessionSnapshot {
    pub fn result(&self) -> Option<&IdentificationResult> {
        self.identification.as_ref().and_then(Identification::result)
    }
}
