//! Still images submitted for identification.
//!
//! A [`CapturedImage`] comes from one of two places:
//! - a frame drawn from the live stream via [`rasterize_frame`]
//! - a user-supplied file via [`decode_upload`]

mod still;
mod upload;

pub use still::{rasterize_frame, CapturedImage, EncodeError, ImageSource, Resolution};
pub use upload::{decode_upload, read_upload, UploadError, UploadLimits};
