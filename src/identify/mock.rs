//! Placeholder identifier standing in for a real analysis backend.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;

use super::{Attribute, BoundingBox, IdentificationResult, Identifier, IdentifyError};
use crate::capture::CapturedImage;

/// Simulated analysis latency.
pub const MOCK_DELAY: Duration = Duration::from_secs(2);

/// Returns the same coffee mug for every image after a fixed delay.
#[derive(Debug, Clone)]
pub struct MockIdentifier {
    delay: Duration,
}

impl MockIdentifier {
    pub fn new() -> Self {
        Self { delay: MOCK_DELAY }
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self { delay }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// The constant payload.
    pub fn payload() -> IdentificationResult {
        IdentificationResult {
            label: "Coffee Mug".to_string(),
            confidence: 0.972,
            attributes: vec![
                Attribute::new("Material", "Ceramic"),
                Attribute::new("Color", "White"),
                Attribute::new("State", "Contains liquid"),
            ],
            bounding_box: BoundingBox {
                x: 128,
                y: 95,
                width: 256,
                height: 320,
            },
        }
    }
}

impl Default for MockIdentifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Identifier for MockIdentifier {
    fn identify(
        &self,
        image: Arc<CapturedImage>,
    ) -> BoxFuture<'static, Result<IdentificationResult, IdentifyError>> {
        let delay = self.delay;
        async move {
            log::debug!(
                "Mock identification of {} ({}x{}), replying in {:?}",
                image.short_digest(),
                image.width(),
                image.height(),
                delay
            );
            tokio::time::sleep(delay).await;
            Ok(Self::payload())
        }
        .boxed()
    }
}
