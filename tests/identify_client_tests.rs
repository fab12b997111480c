//! Mock HTTP tests for RemoteIdentifier.
//!
//! These tests cover:
//! - Request formatting (path, headers, body)
//! - Response parsing and validation
//! - Error mapping
//! - Retry behavior for rate limits and transient failures

use std::sync::Arc;
use std::time::Duration;

use image::RgbImage;
use visioniq::capture::{rasterize_frame, CapturedImage, Resolution};
use visioniq::identify::{
    Identifier, IdentifyError, RemoteIdentifier, RetryPolicy, IDENTIFY_PATH,
};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn still() -> CapturedImage {
    let frame = RgbImage::from_pixel(64, 48, image::Rgb([200, 120, 40]));
    rasterize_frame(&frame, Resolution::LOW, "cam0").unwrap()
}

fn mug_json() -> serde_json::Value {
    serde_json::json!({
        "objectName": "Coffee Mug",
        "confidence": 0.972,
        "attributes": [
            {"name": "Material", "value": "Ceramic"},
            {"name": "Color", "value": "White"}
        ],
        "boundingBox": {"x": 128, "y": 95, "width": 256, "height": 320}
    })
}

fn fast_retry(max_retries: u32) -> RetryPolicy {
    RetryPolicy {
        max_retries,
        backoff_base: Duration::from_millis(1),
        backoff_max: Duration::from_millis(5),
    }
}

fn client(server: &MockServer) -> RemoteIdentifier {
    RemoteIdentifier::with_base_url("test-api-key".to_string(), &server.uri()).unwrap()
}

// === Request Tests ===

#[tokio::test]
async fn test_identify_sends_authorization_and_content_type() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(IDENTIFY_PATH))
        .and(header("Authorization", "Key test-api-key"))
        .and(header("Content-Type", "image/png"))
        .respond_with(ResponseTemplate::new(200).set_body_json(mug_json()))
        .expect(1)
        .mount(&mock_server)
        .await;

    let result = client(&mock_server).identify_once(&still()).await.unwrap();
    assert_eq!(result.label, "Coffee Mug");
    assert_eq!(result.confidence, 0.972);
    assert_eq!(result.attributes.len(), 2);
    assert_eq!(result.bounding_box.x, 128);
    assert_eq!(result.bounding_box.height, 320);
}

#[tokio::test]
async fn test_identify_sends_encoded_still_as_body() {
    let mock_server = MockServer::start().await;
    let image = still();

    Mock::given(method("POST"))
        .and(path(IDENTIFY_PATH))
        .and(wiremock::matchers::body_bytes(image.encoded().to_vec()))
        .and(header("X-Image-Digest", image.digest().as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(mug_json()))
        .expect(1)
        .mount(&mock_server)
        .await;

    assert!(client(&mock_server).identify_once(&image).await.is_ok());
}

#[tokio::test]
async fn test_identifier_trait_object_resolves() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(IDENTIFY_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(mug_json()))
        .expect(1)
        .mount(&mock_server)
        .await;

    let identifier: Arc<dyn Identifier> = Arc::new(client(&mock_server));
    let result = identifier.identify(Arc::new(still())).await.unwrap();
    assert_eq!(result.caption(), "Coffee Mug (97%)");
}

// === Error Mapping Tests ===

#[tokio::test]
async fn test_client_error_maps_to_api_error_without_retry() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(IDENTIFY_PATH))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let err = client(&mock_server)
        .with_retry(fast_retry(3))
        .identify_with_retry(&still())
        .await
        .unwrap_err();
    match err {
        IdentifyError::ApiError { status, message } => {
            assert_eq!(status, 401);
            assert_eq!(message, "bad key");
        }
        other => panic!("Expected ApiError, got {:?}", other),
    }
}

#[tokio::test]
async fn test_malformed_body_is_invalid_response() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(IDENTIFY_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&mock_server)
        .await;

    let err = client(&mock_server).identify_once(&still()).await.unwrap_err();
    assert!(matches!(err, IdentifyError::InvalidResponse(_)));
}

#[tokio::test]
async fn test_out_of_range_confidence_is_rejected() {
    let mock_server = MockServer::start().await;
    let mut body = mug_json();
    body["confidence"] = serde_json::json!(1.7);

    Mock::given(method("POST"))
        .and(path(IDENTIFY_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(&mock_server)
        .await;

    let err = client(&mock_server).identify_once(&still()).await.unwrap_err();
    assert!(matches!(err, IdentifyError::InvalidResponse(_)));
}

// === Retry Tests ===

#[tokio::test]
async fn test_rate_limit_retried_then_succeeds() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(IDENTIFY_PATH))
        .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path(IDENTIFY_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(mug_json()))
        .expect(1)
        .mount(&mock_server)
        .await;

    let result = client(&mock_server)
        .with_retry(fast_retry(2))
        .identify_with_retry(&still())
        .await
        .unwrap();
    assert_eq!(result.label, "Coffee Mug");
}

#[tokio::test]
async fn test_rate_limit_exhausted_returns_rate_limit() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(IDENTIFY_PATH))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
        .expect(3)
        .mount(&mock_server)
        .await;

    let err = client(&mock_server)
        .with_retry(fast_retry(2))
        .identify_with_retry(&still())
        .await
        .unwrap_err();
    match err {
        IdentifyError::RateLimit {
            retry_after_secs, ..
        } => assert_eq!(retry_after_secs, Some(0)),
        other => panic!("Expected RateLimit, got {:?}", other),
    }
}

#[tokio::test]
async fn test_unavailable_service_retried_until_network_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(IDENTIFY_PATH))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .expect(2)
        .mount(&mock_server)
        .await;

    let err = client(&mock_server)
        .with_retry(fast_retry(1))
        .identify_with_retry(&still())
        .await
        .unwrap_err();
    match err {
        IdentifyError::NetworkError { message, attempts } => {
            assert_eq!(attempts, 2);
            assert!(message.contains("503"));
        }
        other => panic!("Expected NetworkError, got {:?}", other),
    }
}

#[tokio::test]
async fn test_no_retry_policy_makes_single_attempt() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(IDENTIFY_PATH))
        .respond_with(ResponseTemplate::new(502))
        .expect(1)
        .mount(&mock_server)
        .await;

    let err = client(&mock_server)
        .with_retry(RetryPolicy::none())
        .identify_with_retry(&still())
        .await
        .unwrap_err();
    assert!(matches!(err, IdentifyError::NetworkError { attempts: 1, .. }));
}
