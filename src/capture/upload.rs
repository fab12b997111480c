//! Validation and decoding of user-supplied image files.

use std::io::Cursor;
use std::path::Path;

use image::{ImageFormat, ImageReader, Limits};

use super::still::{CapturedImage, ImageSource};

/// Formats accepted for upload.
const ACCEPTED_FORMATS: &[ImageFormat] = &[
    ImageFormat::Png,
    ImageFormat::Jpeg,
    ImageFormat::Gif,
    ImageFormat::WebP,
    ImageFormat::Bmp,
];

/// Bounds applied to uploaded files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(default)]
pub struct UploadLimits {
    /// Maximum encoded file size in bytes.
    pub max_bytes: u64,
    /// Maximum width or height in pixels.
    pub max_dimension: u32,
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            max_bytes: 10 * 1024 * 1024,
            max_dimension: 8192,
        }
    }
}

/// Reasons an upload is rejected.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("No file was provided")]
    Empty,

    #[error("File is too large: {size} bytes (limit {limit} bytes)")]
    TooLarge { size: u64, limit: u64 },

    #[error("Unsupported image type. Accepted types: PNG, JPEG, GIF, WebP, BMP")]
    UnsupportedFormat,

    #[error("Image is {width}x{height}, larger than the {limit}px limit")]
    DimensionsTooLarge { width: u32, height: u32, limit: u32 },

    #[error("Failed to decode image: {0}")]
    Decode(#[from] image::ImageError),

    #[error("Failed to read '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
}

/// Validate and decode an uploaded file into a still.
///
/// The original encoded bytes are kept as the still's representation. The
/// dimension limit is checked against the header before anything is
/// decoded; the full decode only checks integrity.
pub fn decode_upload(
    bytes: &[u8],
    file_name: Option<&str>,
    limits: &UploadLimits,
) -> Result<CapturedImage, UploadError> {
    if bytes.is_empty() {
        return Err(UploadError::Empty);
    }

    let size = bytes.len() as u64;
    if size > limits.max_bytes {
        return Err(UploadError::TooLarge {
            size,
            limit: limits.max_bytes,
        });
    }

    // Sniff content rather than trusting the file extension
    let format = image::guess_format(bytes).map_err(|_| UploadError::UnsupportedFormat)?;
    if !ACCEPTED_FORMATS.contains(&format) {
        return Err(UploadError::UnsupportedFormat);
    }

    // Header first: a tiny file can declare a huge bitmap
    let (width, height) = ImageReader::with_format(Cursor::new(bytes), format).into_dimensions()?;
    if width > limits.max_dimension || height > limits.max_dimension {
        return Err(UploadError::DimensionsTooLarge {
            width,
            height,
            limit: limits.max_dimension,
        });
    }

    let mut reader = ImageReader::with_format(Cursor::new(bytes), format);
    let mut decode_limits = Limits::default();
    decode_limits.max_image_width = Some(limits.max_dimension);
    decode_limits.max_image_height = Some(limits.max_dimension);
    reader.limits(decode_limits);
    reader.decode()?;

    Ok(CapturedImage::new(
        width,
        height,
        format,
        bytes.to_vec(),
        ImageSource::Upload {
            file_name: file_name.map(str::to_string),
        },
    ))
}

/// Read an upload from disk, checking the size limit before reading.
pub fn read_upload(path: &Path, limits: &UploadLimits) -> Result<Vec<u8>, UploadError> {
    let io_err = |source| UploadError::Io {
        path: path.display().to_string(),
        source,
    };

    let size = std::fs::metadata(path).map_err(io_err)?.len();
    if size > limits.max_bytes {
        return Err(UploadError::TooLarge {
            size,
            limit: limits.max_bytes,
        });
    }
    std::fs::read(path).map_err(io_err)
}
