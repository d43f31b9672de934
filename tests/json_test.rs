//! JSON Helper Integration Tests

use bytes::Bytes;
use handler_kit::json::{
    error_json, push_json, read_json, write_json, JsonError, JsonOptions, JsonResponse,
};
use http_body_util::{BodyExt, Full};
use hyper::{HeaderMap, Request, StatusCode};
use serde::{Deserialize, Serialize};
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct Greeting {
    name: String,
}

fn post(body: impl Into<Bytes>) -> Request<Full<Bytes>> {
    Request::builder()
        .method("POST")
        .uri("/")
        .body(Full::new(body.into()))
        .unwrap()
}

#[tokio::test]
async fn test_read_json_valid() {
    let greeting: Greeting = read_json(post(r#"{"name": "gopher"}"#), &JsonOptions::default())
        .await
        .unwrap();
    assert_eq!(greeting.name, "gopher");
}

#[tokio::test]
async fn test_read_json_body_over_limit() {
    let options = JsonOptions {
        max_bytes: 16,
        ..JsonOptions::default()
    };
    let body = format!(r#"{{"name": "{}"}}"#, "x".repeat(64));

    let err = read_json::<Greeting, _>(post(body), &options).await.unwrap_err();
    assert!(matches!(err, JsonError::TooLarge { limit: 16 }));
    assert_eq!(err.status_code(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn test_read_json_unknown_fields_toggle() {
    let body = r#"{"name": "gopher", "age": 13}"#;

    let err = read_json::<Greeting, _>(post(body), &JsonOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, JsonError::UnknownField(ref key) if key == "\"age\""));

    let options = JsonOptions {
        allow_unknown_fields: true,
        ..JsonOptions::default()
    };
    let greeting: Greeting = read_json(post(body), &options).await.unwrap();
    assert_eq!(greeting.name, "gopher");
}

#[tokio::test]
async fn test_read_json_rejects_second_value() {
    let body = r#"{"name": "a"} {"name": "b"}"#;
    let err = read_json::<Greeting, _>(post(body), &JsonOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, JsonError::MultipleValues));
}

#[tokio::test]
async fn test_write_json_with_headers() {
    let mut headers = HeaderMap::new();
    headers.insert("x-request-id", "abc".parse().unwrap());

    let response = write_json(
        StatusCode::CREATED,
        &Greeting {
            name: "gopher".into(),
        },
        Some(&headers),
    )
    .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(response.headers()["content-type"], "application/json");
    assert_eq!(response.headers()["x-request-id"], "abc");

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let decoded: Greeting = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(decoded.name, "gopher");
}

#[tokio::test]
async fn test_error_json_payload() {
    let response = error_json(&"something went wrong", Some(StatusCode::SERVICE_UNAVAILABLE));
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let payload: JsonResponse = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(payload, JsonResponse::failure("something went wrong"));
}

#[tokio::test]
async fn test_push_json_to_remote() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/hook"))
        .and(header("content-type", "application/json"))
        .and(body_json(serde_json::json!({ "name": "gopher" })))
        .respond_with(ResponseTemplate::new(202).set_body_string("queued"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = reqwest::Client::new();
    let (response, status) = push_json(
        &client,
        &format!("{}/hook", mock_server.uri()),
        &Greeting {
            name: "gopher".into(),
        },
    )
    .await
    .unwrap();

    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(response.text().await.unwrap(), "queued");
}

#[tokio::test]
async fn test_push_json_unreachable_remote() {
    let client = reqwest::Client::new();
    let err = push_json(&client, "http://127.0.0.1:1/hook", &serde_json::json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, JsonError::Client(_)));
}
