#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{HeaderMap, Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use ascend_pfp::config::{ProviderConfig, StoreConfig};
use ascend_pfp::{server, Client, Config};

pub const ROUTE: &str = "/api/generate-pfp";
pub const GENERATE_PATH: &str = "/v1beta/models/gemini-3-pro-image-preview:generateContent";
pub const BASE_IMAGE_PATH: &str = "/storage/v1/object/images/duvall.png";

pub fn build_gemini_client(base_url: &str) -> Client {
    Client::builder()
        .api_key("test-key")
        .base_url(base_url)
        .build()
        .unwrap()
}

/// Gemini API 后端指向 `provider`，blob store 指向 `store`。
pub fn test_config(provider: &MockServer, store: Option<&MockServer>) -> Config {
    Config {
        provider: ProviderConfig {
            gemini_api_key: Some("test-key".into()),
            base_url: Some(provider.uri()),
            ..ProviderConfig::default()
        },
        store: StoreConfig {
            supabase_url: store.map(MockServer::uri),
            service_role_key: store.map(|_| "service-key".to_string()),
            base_image_url: None,
        },
        ..Config::default()
    }
}

pub fn test_router(config: Config) -> Router {
    server::router(Arc::new(config))
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap()
    }
}

pub async fn send(router: &Router, request: Request<Body>) -> TestResponse {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec();
    TestResponse {
        status,
        headers,
        body,
    }
}

pub fn post_json(body: &Value) -> Request<Body> {
    post_raw(serde_json::to_vec(body).unwrap())
}

pub fn post_raw(body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(ROUTE)
        .header("content-type", "application/json")
        .body(body.into())
        .unwrap()
}

pub fn sample_request() -> Value {
    json!({"imageBase64": "AQIDBA==", "mimeType": "image/png"})
}

pub fn image_response(data_base64: &str) -> Value {
    json!({
        "candidates": [{
            "content": {
                "role": "model",
                "parts": [
                    {"text": "Here is your picture."},
                    {"inlineData": {"mimeType": "image/png", "data": data_base64}}
                ]
            },
            "finishReason": "STOP"
        }]
    })
}

pub async fn mount_base_image(store: &MockServer) {
    Mock::given(method("GET"))
        .and(path(BASE_IMAGE_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "image/png")
                .set_body_bytes(vec![0x89u8, b'P', b'N', b'G']),
        )
        .mount(store)
        .await;
}

pub async fn mount_image_generation(provider: &MockServer) {
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(image_response("BAUG")))
        .mount(provider)
        .await;
}

pub fn assert_cors(headers: &HeaderMap) {
    assert_eq!(headers["access-control-allow-origin"], "*");
    assert_eq!(headers["access-control-allow-methods"], "POST, OPTIONS");
    assert_eq!(headers["access-control-allow-headers"], "Content-Type");
}
