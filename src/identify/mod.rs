//! Object identification backends.
//!
//! The capture session hands every new still to an [`Identifier`] exactly
//! once. Two backends exist:
//! - [`MockIdentifier`] returns a fixed payload after a fixed delay
//! - [`RemoteIdentifier`] posts the still to an HTTP service

mod client;
mod mock;
mod retry;
mod types;

use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::capture::CapturedImage;

pub use client::{RemoteIdentifier, DEFAULT_BASE_URL, IDENTIFY_API_KEY_ENV, IDENTIFY_PATH};
pub use mock::{MockIdentifier, MOCK_DELAY};
pub use retry::RetryPolicy;
pub use types::{Attribute, BoundingBox, IdentificationResult};

/// Identifies the object in a still.
pub trait Identifier: Send + Sync {
    /// Start identifying `image`. The returned future owns everything it
    /// needs, so it can be spawned onto the runtime.
    fn identify(
        &self,
        image: Arc<CapturedImage>,
    ) -> BoxFuture<'static, Result<IdentificationResult, IdentifyError>>;
}

#[derive(Debug, thiserror::Error)]
pub enum IdentifyError {
    #[error("API key not configured (set VISIONIQ_API_KEY)")]
    MissingApiKey,

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Identification service error ({status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("Rate limited: {message}")]
    RateLimit {
        message: String,
        /// Retry-After header value in seconds, if provided
        retry_after_secs: Option<u64>,
    },

    #[error("Network error: {message} (after {attempts} attempts)")]
    NetworkError { message: String, attempts: u32 },

    #[error("Invalid response from identification service: {0}")]
    InvalidResponse(String),
}
