//! RemoteIdentifier - posts stills to an HTTP identification service.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;

use super::retry::{is_transient, is_transient_status, parse_retry_after, RetryPolicy};
use super::{IdentificationResult, Identifier, IdentifyError};
use crate::capture::CapturedImage;

/// The environment variable name for the identification API key.
pub const IDENTIFY_API_KEY_ENV: &str = "VISIONIQ_API_KEY";

/// Default base URL for the identification service.
pub const DEFAULT_BASE_URL: &str = "https://api.visioniq.app";

/// Path of the identification endpoint, relative to the base URL.
pub const IDENTIFY_PATH: &str = "/v1/identify";

/// Default timeout for HTTP requests (30 seconds).
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default connection timeout (10 seconds).
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Client for the remote identification service.
///
/// Cheap to clone: clones share the underlying connection pool.
#[derive(Debug, Clone)]
pub struct RemoteIdentifier {
    api_key: String,
    base_url: String,
    retry: RetryPolicy,
    http_client: reqwest::Client,
}

impl RemoteIdentifier {
    /// Create a client reading the API key from `VISIONIQ_API_KEY`.
    pub fn from_env(base_url: &str, timeout: Duration) -> Result<Self, IdentifyError> {
        let api_key =
            std::env::var(IDENTIFY_API_KEY_ENV).map_err(|_| IdentifyError::MissingApiKey)?;
        Self::new(api_key, base_url, timeout)
    }

    pub fn new(api_key: String, base_url: &str, timeout: Duration) -> Result<Self, IdentifyError> {
        if api_key.is_empty() {
            return Err(IdentifyError::MissingApiKey);
        }

        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT.min(timeout))
            .build()?;

        Ok(Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            retry: RetryPolicy::default(),
            http_client,
        })
    }

    /// Create a client with default timeouts, e.g. against a mock server.
    pub fn with_base_url(api_key: String, base_url: &str) -> Result<Self, IdentifyError> {
        Self::new(api_key, base_url, DEFAULT_TIMEOUT)
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Send one identification request, without retrying.
    ///
    /// # Errors
    ///
    /// `RateLimit` for 429 responses, `ApiError` for any other non-success
    /// status, `InvalidResponse` when the body does not parse or carries an
    /// out-of-range confidence, and `HttpError` when the request fails.
    pub async fn identify_once(
        &self,
        image: &CapturedImage,
    ) -> Result<IdentificationResult, IdentifyError> {
        let url = format!("{}{}", self.base_url, IDENTIFY_PATH);

        let response = self
            .http_client
            .post(&url)
            .header("Authorization", format!("Key {}", self.api_key))
            .header("Content-Type", image.mime_type())
            .header("X-Image-Digest", image.digest())
            .body(image.encoded().to_vec())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                let retry_after_secs = parse_retry_after(response.headers());
                let message = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Rate limit exceeded".to_string());
                log::warn!(
                    "Rate limited by identification service. Retry-After: {:?} seconds",
                    retry_after_secs
                );
                return Err(IdentifyError::RateLimit {
                    message,
                    retry_after_secs,
                });
            }

            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(IdentifyError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.text().await?;
        let result: IdentificationResult = serde_json::from_str(&body)
            .map_err(|e| IdentifyError::InvalidResponse(e.to_string()))?;
        result.validate().map_err(IdentifyError::InvalidResponse)?;
        Ok(result)
    }

    /// Identify with retries on rate limiting and transient failures.
    pub async fn identify_with_retry(
        &self,
        image: &CapturedImage,
    ) -> Result<IdentificationResult, IdentifyError> {
        let max_retries = self.retry.max_retries;
        let mut attempt = 0;

        loop {
            let delay = match self.identify_once(image).await {
                Ok(result) => return Ok(result),
                Err(IdentifyError::RateLimit {
                    message,
                    retry_after_secs,
                }) => {
                    if attempt >= max_retries {
                        log::error!(
                            "Rate limit exceeded after {} attempts. Giving up.",
                            attempt + 1
                        );
                        return Err(IdentifyError::RateLimit {
                            message,
                            retry_after_secs,
                        });
                    }
                    self.retry.rate_limit_delay(attempt, retry_after_secs)
                }
                Err(IdentifyError::HttpError(e)) if is_transient(&e) => {
                    if attempt >= max_retries {
                        log::error!(
                            "Network error after {} attempts: {}",
                            attempt + 1,
                            e
                        );
                        return Err(IdentifyError::NetworkError {
                            message: e.to_string(),
                            attempts: attempt + 1,
                        });
                    }
                    log::warn!("Transient network error: {}", e);
                    self.retry.backoff(attempt)
                }
                Err(IdentifyError::ApiError { status, message })
                    if reqwest::StatusCode::from_u16(status)
                        .map(is_transient_status)
                        .unwrap_or(false) =>
                {
                    if attempt >= max_retries {
                        log::error!(
                            "Identification service unavailable ({}) after {} attempts",
                            status,
                            attempt + 1
                        );
                        return Err(IdentifyError::NetworkError {
                            message: format!("service returned {}: {}", status, message),
                            attempts: attempt + 1,
                        });
                    }
                    self.retry.backoff(attempt)
                }
                Err(e) => return Err(e),
            };

            log::info!(
                "Identification attempt {}/{} failed. Retrying in {:?}...",
                attempt + 1,
                max_retries + 1,
                delay
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

impl Identifier for RemoteIdentifier {
    fn identify(
        &self,
        image: Arc<CapturedImage>,
    ) -> BoxFuture<'static, Result<IdentificationResult, IdentifyError>> {
        let client = self.clone();
        async move {
            log::info!(
                "Submitting {} ({}x{}, {} bytes) to {}",
                image.short_digest(),
                image.width(),
                image.height(),
                image.encoded().len(),
                client.base_url
            );
            client.identify_with_retry(&image).await
        }
        .boxed()
    }
}
