use std::sync::Arc;

use axum::http::{self, Request, StatusCode};
use http_body_util::BodyExt;
use mock_server::{app, app_with, MockConfig, MockState, AD_ACCOUNT_BODY, VIDEO_URN};
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tower::ServiceExt;

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_bytes(response: axum::response::Response) -> bytes::Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

/// A request carrying the headers every `/rest` endpoint requires.
fn api_request(method: &str, uri: &str, body: &str) -> Request<String> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(http::header::AUTHORIZATION, "Bearer test-token")
        .header("LinkedIn-Version", "202406")
        .header("X-Restli-Protocol-Version", "2.0.0")
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(body.to_string())
        .unwrap()
}

// --- ad accounts ---

#[tokio::test]
async fn ad_account_is_served_verbatim() {
    let resp = app()
        .oneshot(api_request("GET", "/rest/adAccounts/123456", ""))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_bytes(resp).await, AD_ACCOUNT_BODY.as_bytes());
}

#[tokio::test]
async fn unknown_ad_account_returns_404() {
    let resp = app()
        .oneshot(api_request("GET", "/rest/adAccounts/999", ""))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body = body_json(resp).await;
    assert_eq!(body["status"], 404);
}

#[tokio::test]
async fn missing_token_returns_401() {
    let resp = app()
        .oneshot(
            Request::builder()
                .uri("/rest/adAccounts/123456")
                .body(String::new())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn campaign_creation_returns_restli_id() {
    let resp = app()
        .oneshot(api_request("POST", "/rest/adAccounts/123456/adCampaigns", r#"{"name":"Spring"}"#))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::CREATED);
    assert_eq!(
        resp.headers().get("x-restli-id").unwrap(),
        "urn:li:sponsoredCampaign:701"
    );
    assert!(body_bytes(resp).await.is_empty());
}

// --- analytics echo ---

#[tokio::test]
async fn analytics_echoes_the_query() {
    let resp = app()
        .oneshot(api_request("GET", "/rest/adAnalytics?q=analytics&pivot=CAMPAIGN", ""))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["tunneled"], false);
    assert_eq!(body["query"], "q=analytics&pivot=CAMPAIGN");
}

#[tokio::test]
async fn tunneled_analytics_reads_the_form_body() {
    let request = Request::builder()
        .method("POST")
        .uri("/rest/adAnalytics")
        .header(http::header::AUTHORIZATION, "Bearer test-token")
        .header("LinkedIn-Version", "202406")
        .header("X-Restli-Protocol-Version", "2.0.0")
        .header("X-HTTP-Method-Override", "GET")
        .header(http::header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body("q=analytics&pivot=CAMPAIGN".to_string())
        .unwrap();
    let resp = app().oneshot(request).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["tunneled"], true);
    assert_eq!(body["method"], "GET");
    assert_eq!(body["query"], "q=analytics&pivot=CAMPAIGN");
}

#[tokio::test]
async fn tunneled_request_without_override_is_rejected() {
    let resp = app()
        .oneshot(api_request("POST", "/rest/adAnalytics", "q=analytics"))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
}

// --- uploads ---

#[tokio::test]
async fn video_initialize_tiles_the_file() {
    let state = Arc::new(RwLock::new(MockState::new(MockConfig {
        part_size: 10,
        ..MockConfig::default()
    })));
    let resp = app_with(state)
        .oneshot(api_request(
            "POST",
            "/rest/videos?action=initializeUpload",
            r#"{"initializeUploadRequest":{"owner":"urn:li:organization:1","fileSizeBytes":25}}"#,
        ))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    let instructions = body["value"]["uploadInstructions"].as_array().unwrap();
    let ranges: Vec<(u64, u64)> = instructions
        .iter()
        .map(|i| (i["firstByte"].as_u64().unwrap(), i["lastByte"].as_u64().unwrap()))
        .collect();
    assert_eq!(ranges, vec![(0, 9), (10, 19), (20, 24)]);
    assert_eq!(body["value"]["video"], VIDEO_URN);
}

#[tokio::test]
async fn initialize_requires_an_owner() {
    let resp = app()
        .oneshot(api_request(
            "POST",
            "/rest/images?action=initializeUpload",
            r#"{"initializeUploadRequest":{}}"#,
        ))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn part_upload_returns_etag_or_scripted_failure() {
    let state = Arc::new(RwLock::new(MockState::new(MockConfig {
        fail_part: Some(1),
        ..MockConfig::default()
    })));
    let app = app_with(state.clone());

    let put = |part: usize| {
        Request::builder()
            .method("PUT")
            .uri(format!("/upload/video/{part}"))
            .body("0123456789".to_string())
            .unwrap()
    };
    let resp = app.clone().oneshot(put(0)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    assert_eq!(resp.headers().get(http::header::ETAG).unwrap(), "\"etag-video-0\"");

    let resp = app.oneshot(put(1)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let state = state.read().await;
    assert_eq!(state.parts.get(&0), Some(&10));
    assert!(!state.parts.contains_key(&1));
    assert_eq!(state.part_auth.get(&0), Some(&false));
}

#[tokio::test]
async fn video_status_follows_the_script() {
    let state = Arc::new(RwLock::new(MockState::new(MockConfig {
        video_statuses: vec!["PROCESSING".to_string(), "AVAILABLE".to_string()],
        ..MockConfig::default()
    })));
    let app = app_with(state.clone());
    let uri = format!("/rest/videos/{}", VIDEO_URN.replace(':', "%3A"));

    let first = body_json(app.clone().oneshot(api_request("GET", &uri, "")).await.unwrap()).await;
    let second = body_json(app.oneshot(api_request("GET", &uri, "")).await.unwrap()).await;
    assert_eq!(first["status"], "PROCESSING");
    assert_eq!(second["status"], "AVAILABLE");
    assert_eq!(state.read().await.status_polls, 2);
}

#[tokio::test]
async fn finalize_is_recorded() {
    let state = Arc::new(RwLock::new(MockState::new(MockConfig::default())));
    let resp = app_with(state.clone())
        .oneshot(api_request(
            "POST",
            "/rest/videos?action=finalizeUpload",
            &json!({"finalizeUploadRequest": {
                "video": VIDEO_URN,
                "uploadToken": "t",
                "uploadedPartIds": ["a", "b"]
            }})
            .to_string(),
        ))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let state = state.read().await;
    assert_eq!(state.finalize_requests.len(), 1);
    assert_eq!(state.finalize_requests[0]["uploadedPartIds"][1], "b");
    assert_eq!(state.count("POST /rest/videos?action=finalizeUpload"), 1);
}
