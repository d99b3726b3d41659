use hdx_mcp_server::{HdxMcpServer, Settings, http, openapi};
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::net::TcpListener;

async fn spawn_http() -> String {
    let settings = Settings::from_lookup(|key| match key {
        "HDX_API_KEY" => Some("test-key".to_string()),
        "HDX_BASE_URL" => Some("http://127.0.0.1:1/api/v2".to_string()),
        _ => None,
    })
    .unwrap();
    let document = openapi::prepare_document(json!({"paths": {
        "/api/v2/util/version": {"get": {"operationId": "get_version_api_v2_util_version_get", "summary": "Version"}}
    }}))
    .unwrap();
    let server = Arc::new(HdxMcpServer::from_document(settings, &document).unwrap());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, http::router(server)).await.unwrap();
    });

    format!("http://{addr}")
}

#[tokio::test]
async fn health_endpoint() {
    let base = spawn_http().await;
    let body: Value = reqwest::get(format!("{base}/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body, json!({"status": "ok"}));
}

#[tokio::test]
async fn post_mcp_round_trip() {
    let base = spawn_http().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{base}/mcp"))
        .json(&json!({"jsonrpc": "2.0", "id": "a", "method": "tools/list"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["id"], "a");
    let names: Vec<&str> = body["result"]["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    assert!(names.contains(&"util_version_get"));
    assert!(names.contains(&"hdx_search_locations"));
}

#[tokio::test]
async fn notifications_are_accepted_without_body() {
    let base = spawn_http().await;
    let response = reqwest::Client::new()
        .post(format!("{base}/mcp"))
        .json(&json!({"jsonrpc": "2.0", "method": "notifications/initialized"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 202);
}

#[tokio::test]
async fn malformed_body_is_a_parse_error() {
    let base = spawn_http().await;
    let body: Value = reqwest::Client::new()
        .post(format!("{base}/mcp"))
        .body("{oops")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["error"]["code"], -32700);
}
