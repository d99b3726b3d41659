use hdx_mcp_server::openapi::{self, OpenApiError};
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn fetches_json_document() {
    let mock = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/openapi.json"))
        .and(header("accept", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"openapi": "3.1.0", "paths": {}})))
        .expect(1)
        .mount(&mock)
        .await;

    let document = openapi::fetch_document(&format!("{}/openapi.json", mock.uri()), TIMEOUT)
        .await
        .unwrap();
    assert_eq!(document["openapi"], "3.1.0");
}

#[tokio::test]
async fn non_success_status_is_an_error() {
    let mock = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock)
        .await;

    let err = openapi::fetch_document(&format!("{}/openapi.json", mock.uri()), TIMEOUT)
        .await
        .unwrap_err();
    assert!(matches!(err, OpenApiError::Status { status: 404, .. }));
}

#[tokio::test]
async fn html_is_a_parse_error() {
    let mock = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&mock)
        .await;

    let err = openapi::fetch_document(&format!("{}/openapi.json", mock.uri()), TIMEOUT)
        .await
        .unwrap_err();
    assert!(matches!(err, OpenApiError::Parse { .. }));
}

#[tokio::test]
async fn slow_server_times_out() {
    let mock = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"paths": {}}))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&mock)
        .await;

    let err = openapi::fetch_document(
        &format!("{}/openapi.json", mock.uri()),
        Duration::from_millis(200),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, OpenApiError::Fetch { .. }));
}

#[test]
fn preparation_is_idempotent() {
    let raw = json!({"paths": {
        "/api/v2/affected-people/refugees-persons-of-concern": {"get": {
            "operationId": "get_refugees",
            "summary": "Refugees",
            "parameters": [
                {"name": "gender", "in": "query", "schema": {"type": "string"}},
                {"name": "location_code", "in": "query",
                 "description": "See the <a href=\"/docs#/Metadata/get_locations_api_v2_metadata_location_get\" target=\"_blank\">location endpoint</a> for details.",
                 "schema": {"type": "string"}}
            ]
        }}
    }});

    let once = openapi::prepare_document(raw).unwrap();
    let twice = openapi::prepare_document(once.clone()).unwrap();
    assert_eq!(once, twice);

    let operation = &once["paths"]["/api/v2/affected-people/refugees-persons-of-concern"]["get"];
    assert_eq!(operation["operationId"], "affected_people_refugees_get");
    assert_eq!(operation["parameters"][0]["schema"]["default"], "all");
    assert_eq!(
        operation["parameters"][1]["description"],
        "Use the metadata_location_get tool to get available location codes and names."
    );
}
