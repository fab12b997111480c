//! Captured stills and frame rasterization.

use std::fmt;
use std::io::Cursor;
use std::str::FromStr;

use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageFormat, RgbImage};
use sha2::{Digest, Sha256};

/// Largest still the session will produce or accept from config.
const MAX_WIDTH: u32 = 7680;
const MAX_HEIGHT: u32 = 4320;

/// Pixel dimensions of a still.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(try_from = "String")]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    /// Low resolution (320x240)
    pub const LOW: Resolution = Resolution {
        width: 320,
        height: 240,
    };

    /// Medium resolution (640x480), the default capture size
    pub const MEDIUM: Resolution = Resolution {
        width: 640,
        height: 480,
    };

    /// High resolution (1280x720)
    pub const HIGH: Resolution = Resolution {
        width: 1280,
        height: 720,
    };
}

impl Default for Resolution {
    fn default() -> Self {
        Self::MEDIUM
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for Resolution {
    type Err = String;

    /// Parse `WIDTHxHEIGHT`, e.g. `1280x720`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split('x').collect();
        if parts.len() != 2 {
            return Err(format!(
                "Invalid resolution format '{}'. Use WIDTHxHEIGHT (e.g., 640x480)",
                s
            ));
        }
        let width: u32 = parts[0]
            .parse()
            .map_err(|_| format!("Invalid width '{}' in resolution", parts[0]))?;
        let height: u32 = parts[1]
            .parse()
            .map_err(|_| format!("Invalid height '{}' in resolution", parts[1]))?;
        if width == 0 || height == 0 {
            return Err("Resolution width and height must be greater than 0".to_string());
        }
        if width > MAX_WIDTH || height > MAX_HEIGHT {
            return Err(format!(
                "Resolution exceeds maximum supported ({}x{})",
                MAX_WIDTH, MAX_HEIGHT
            ));
        }
        Ok(Resolution { width, height })
    }
}

impl TryFrom<String> for Resolution {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Where a still came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    Upload { file_name: Option<String> },
    Camera { device_id: String },
}

/// An immutable still image: pixel dimensions plus its encoded bytes.
#[derive(Clone)]
pub struct CapturedImage {
    width: u32,
    height: u32,
    format: ImageFormat,
    encoded: Vec<u8>,
    source: ImageSource,
}

impl CapturedImage {
    pub(crate) fn new(
        width: u32,
        height: u32,
        format: ImageFormat,
        encoded: Vec<u8>,
        source: ImageSource,
    ) -> Self {
        Self {
            width,
            height,
            format,
            encoded,
            source,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn resolution(&self) -> Resolution {
        Resolution {
            width: self.width,
            height: self.height,
        }
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    pub fn mime_type(&self) -> &'static str {
        self.format.to_mime_type()
    }

    pub fn encoded(&self) -> &[u8] {
        &self.encoded
    }

    pub fn source(&self) -> &ImageSource {
        &self.source
    }

    /// Hex SHA-256 of the encoded bytes. Stable identifier for logs and
    /// request tracing.
    pub fn digest(&self) -> String {
        hex::encode(Sha256::digest(&self.encoded))
    }

    /// Short form of [`digest`](Self::digest).
    pub fn short_digest(&self) -> String {
        let mut digest = self.digest();
        digest.truncate(12);
        digest
    }
}

impl fmt::Debug for CapturedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapturedImage")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .field("encoded_len", &self.encoded.len())
            .field("source", &self.source)
            .finish()
    }
}

/// Failure to encode a still.
#[derive(Debug, thiserror::Error)]
#[error("Failed to encode still image: {0}")]
pub struct EncodeError(#[from] image::ImageError);

/// Rasterize a video frame into a fixed-size PNG still.
///
/// The frame is scaled to exactly `size`; aspect ratio is not preserved, the
/// identification backend works in the still's pixel space.
pub fn rasterize_frame(
    frame: &RgbImage,
    size: Resolution,
    device_id: &str,
) -> Result<CapturedImage, EncodeError> {
    let scaled = if frame.dimensions() == (size.width, size.height) {
        frame.clone()
    } else {
        imageops::resize(frame, size.width, size.height, FilterType::Triangle)
    };

    let mut encoded = Vec::new();
    DynamicImage::ImageRgb8(scaled).write_to(&mut Cursor::new(&mut encoded), ImageFormat::Png)?;

    Ok(CapturedImage::new(
        size.width,
        size.height,
        ImageFormat::Png,
        encoded,
        ImageSource::Camera {
            device_id: device_id.to_string(),
        },
    ))
}
