use hdx_hapi::{Configuration, HapiClient, HapiError, Location, encode_app_identifier};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> HapiClient {
    let config = Configuration::new("test-api-key")
        .with_base_path(server.uri())
        .with_app_identity("test-app", "test@example.org")
        .with_timeout(Duration::from_secs(5));
    HapiClient::new(Arc::new(config)).expect("client should build")
}

/// Test that every request carries the key header and the encoded app identifier
#[tokio::test]
async fn test_requests_carry_credentials() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/metadata/location"))
        .and(header("X-HDX-HAPI-APP-IDENTIFIER", "test-api-key"))
        .and(header("accept", "application/json"))
        .and(query_param(
            "app_identifier",
            encode_app_identifier("test-app", "test@example.org").as_str(),
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
        .expect(1)
        .mount(&server)
        .await;

    let locations = client_for(&server).metadata_locations().await.unwrap();
    assert!(locations.is_empty());
}

/// Test that locations come back in upstream order
#[tokio::test]
async fn test_metadata_locations_preserves_order() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/metadata/location"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                {"code": "SYR", "name": "Syria", "has_hrp": false},
                {"code": "AFG", "name": "Afghanistan", "has_hrp": true}
            ]
        })))
        .mount(&server)
        .await;

    let locations = client_for(&server).metadata_locations().await.unwrap();
    assert_eq!(
        locations,
        vec![
            Location::new("SYR", "Syria", false),
            Location::new("AFG", "Afghanistan", true),
        ]
    );
}

/// Test that a non-success status surfaces as an API error with its code
#[tokio::test]
async fn test_non_success_status_is_api_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/metadata/location"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let err = client_for(&server).metadata_locations().await.unwrap_err();
    match err {
        HapiError::Api { status, message } => {
            assert_eq!(status, 503);
            assert_eq!(message, "maintenance");
        }
        other => panic!("expected API error, got {other:?}"),
    }
}

/// Test that a body of the wrong shape is a parse error
#[tokio::test]
async fn test_malformed_body_is_parse_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/metadata/location"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let err = client_for(&server).metadata_locations().await.unwrap_err();
    assert!(matches!(err, HapiError::Parse(_)));
}

/// Test that JSON missing `data` or `has_hrp` is a parse error, not an empty or defaulted result
#[tokio::test]
async fn test_missing_required_fields_are_parse_errors() {
    for body in [
        json!({"detail": "unexpected shape"}),
        json!({"data": [{"code": "AFG", "name": "Afghanistan"}]}),
    ] {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/metadata/location"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&server)
            .await;

        let err = client_for(&server).metadata_locations().await.unwrap_err();
        assert!(matches!(err, HapiError::Parse(_)));
    }
}

/// Test that the dataset lookup passes the id as a query parameter
#[tokio::test]
async fn test_metadata_dataset_query() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/metadata/dataset"))
        .and(query_param("dataset_hdx_id", "abc-123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"dataset_hdx_id": "abc-123", "dataset_hdx_title": "Test dataset"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let records = client_for(&server).metadata_dataset("abc-123").await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["dataset_hdx_title"], "Test dataset");
}

/// Test that a blank dataset id never reaches the network
#[tokio::test]
async fn test_blank_dataset_id_is_rejected_locally() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let err = client_for(&server).metadata_dataset("   ").await.unwrap_err();
    assert!(matches!(err, HapiError::InvalidArgument(_)));
}

/// Test that a slow upstream trips the configured timeout
#[tokio::test]
async fn test_timeout_is_a_request_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/metadata/location"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"data": []}))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let config = Configuration::new("k")
        .with_base_path(server.uri())
        .with_timeout(Duration::from_millis(50));
    let client = HapiClient::new(Arc::new(config)).unwrap();

    let err = client.metadata_locations().await.unwrap_err();
    assert!(matches!(err, HapiError::Request(ref e) if e.is_timeout()));
}

/// Test that the client's debug output shows where it points but no key
#[test]
fn test_client_debug_output() {
    let config = Configuration::new("secret-value");
    let client = HapiClient::new(Arc::new(config)).unwrap();

    let debug_str = format!("{:?}", client);
    assert!(debug_str.contains("HapiClient"));
    assert!(debug_str.contains("hapi.humdata.org"));
    assert!(!debug_str.contains("secret-value"));
}
