//! Errors returned by capture session operations.
//!
//! A rejected operation leaves the session unchanged apart from
//! `last_error`.

use crate::capture::{EncodeError, UploadError};
use crate::stream::StreamError;

use super::types::Mode;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Controls are disabled while an identification is pending.
    #[error("An image is still being analyzed")]
    Analyzing,

    #[error("Operation requires {required} mode, session is in {current} mode")]
    WrongMode { required: Mode, current: Mode },

    #[error("Camera is not active")]
    CameraInactive,

    /// Retry is only meaningful after a denial or failure.
    #[error("Nothing to retry: camera is {0}")]
    NothingToRetry(String),

    #[error("Unknown camera device '{0}'")]
    UnknownDevice(String),

    #[error("Capture session has been shut down")]
    ShutDown,

    #[error(transparent)]
    Frame(#[from] StreamError),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    Upload(#[from] UploadError),
}
