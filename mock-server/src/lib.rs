//! In-memory mock of the Marketing API endpoints the client exercises.
//!
//! Serves ad accounts, campaign creation, an analytics finder that echoes its
//! query (directly or tunneled), and the image/video upload protocol: initialize,
//! part uploads answering with ETags, finalize, and a scripted video status
//! sequence. Every request is appended to `MockState::log` so tests can assert
//! on ordering.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, Query, RawQuery, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::RwLock};
use uuid::Uuid;

/// Ad account served verbatim by `GET /rest/adAccounts/123456`.
pub const AD_ACCOUNT_ID: &str = "123456";
pub const AD_ACCOUNT_BODY: &str = concat!(
    r#"{"id":123456,"name":"Acme Corp Ads","currency":"USD","status":"ACTIVE","#,
    r#""type":"BUSINESS","reference":"urn:li:organization:2414183","test":false}"#
);

pub const IMAGE_URN: &str = "urn:li:image:C4E10AQFoyyAjHPMQuQ";
pub const VIDEO_URN: &str = "urn:li:video:C5F10AQGKQg_6y2a4sQ";

#[derive(Debug, Clone)]
pub struct MockConfig {
    /// Bytes per video upload instruction.
    pub part_size: u64,
    /// Part index answered with 500.
    pub fail_part: Option<usize>,
    /// Video statuses returned by successive polls; the last one repeats.
    pub video_statuses: Vec<String>,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            part_size: 4 * 1024 * 1024,
            fail_part: None,
            video_statuses: vec!["AVAILABLE".to_string()],
        }
    }
}

#[derive(Debug, Default)]
pub struct MockState {
    pub config: MockConfig,
    /// `METHOD path` of every request, in arrival order.
    pub log: Vec<String>,
    /// Bytes received per part index of the current upload.
    pub parts: BTreeMap<usize, usize>,
    /// Whether each part upload carried an Authorization header.
    pub part_auth: BTreeMap<usize, bool>,
    pub finalize_requests: Vec<Value>,
    pub status_polls: usize,
    pub created: usize,
    statuses: VecDeque<String>,
}

impl MockState {
    pub fn new(config: MockConfig) -> Self {
        Self {
            statuses: config.video_statuses.iter().cloned().collect(),
            config,
            ..Self::default()
        }
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.log.iter().filter(|entry| entry.starts_with(prefix)).count()
    }

    fn next_status(&mut self) -> String {
        if self.statuses.len() > 1 {
            self.statuses.pop_front().unwrap_or_default()
        } else {
            self.statuses.front().cloned().unwrap_or_else(|| "AVAILABLE".to_string())
        }
    }
}

pub type Shared = Arc<RwLock<MockState>>;

pub fn app() -> Router {
    app_with(Arc::new(RwLock::new(MockState::new(MockConfig::default()))))
}

pub fn app_with(state: Shared) -> Router {
    Router::new()
        .route("/rest/adAccounts/{id}", get(get_ad_account))
        .route("/rest/adAccounts/{account}/adCampaigns", post(create_campaign))
        .route("/rest/adAnalytics", get(analytics).post(tunneled_analytics))
        .route("/rest/{collection}", post(upload_action))
        .route("/rest/images/{urn}", get(image_status))
        .route("/rest/videos/{urn}", get(video_status))
        .route("/upload/{kind}/{part}", put(upload_part))
        .layer(DefaultBodyLimit::max(64 * 1024 * 1024))
        .with_state(state)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

pub async fn run_with(listener: TcpListener, state: Shared) -> Result<(), std::io::Error> {
    axum::serve(listener, app_with(state)).await
}

fn error(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(json!({"status": status.as_u16(), "message": message})),
    )
        .into_response()
}

/// Every `/rest` call must carry the bearer token and version headers.
fn check_headers(headers: &HeaderMap) -> Result<(), Response> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("Bearer "));
    if !bearer {
        return Err(error(StatusCode::UNAUTHORIZED, "Empty oauth2 access token"));
    }
    let versioned = ["linkedin-version", "x-restli-protocol-version"]
        .iter()
        .all(|name| headers.contains_key(*name));
    if !versioned {
        return Err(error(StatusCode::BAD_REQUEST, "missing version headers"));
    }
    Ok(())
}

fn host(headers: &HeaderMap) -> String {
    headers
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("127.0.0.1")
        .to_string()
}

async fn get_ad_account(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    state.write().await.log.push(format!("GET /rest/adAccounts/{id}"));
    if let Err(response) = check_headers(&headers) {
        return response;
    }
    if id != AD_ACCOUNT_ID {
        return error(StatusCode::NOT_FOUND, &format!("Not found: urn:li:sponsoredAccount:{id}"));
    }
    ([(header::CONTENT_TYPE, "application/json")], AD_ACCOUNT_BODY).into_response()
}

async fn create_campaign(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(account): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    let mut state = state.write().await;
    state.log.push(format!("POST /rest/adAccounts/{account}/adCampaigns"));
    if let Err(response) = check_headers(&headers) {
        return response;
    }
    if body.get("name").and_then(Value::as_str).is_none() {
        return error(StatusCode::UNPROCESSABLE_ENTITY, "name is required");
    }
    state.created += 1;
    let id = format!("urn:li:sponsoredCampaign:{}", 700 + state.created);
    (StatusCode::CREATED, [("x-restli-id", id)]).into_response()
}

async fn analytics(
    State(state): State<Shared>,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
) -> Response {
    state.write().await.log.push("GET /rest/adAnalytics".to_string());
    if let Err(response) = check_headers(&headers) {
        return response;
    }
    let query = query.unwrap_or_default();
    Json(json!({"tunneled": false, "method": "GET", "query": query})).into_response()
}

/// Query tunneling: POST with the method override and the query as a form body.
async fn tunneled_analytics(
    State(state): State<Shared>,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
    body: String,
) -> Response {
    state.write().await.log.push("POST /rest/adAnalytics".to_string());
    if let Err(response) = check_headers(&headers) {
        return response;
    }
    let method = headers
        .get("x-http-method-override")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();
    if method != "GET" {
        return error(StatusCode::METHOD_NOT_ALLOWED, "adAnalytics only supports GET");
    }
    let form = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("application/x-www-form-urlencoded"));
    if !form {
        return error(StatusCode::UNSUPPORTED_MEDIA_TYPE, "tunneled query must be form encoded");
    }
    if query.is_some_and(|query| !query.is_empty()) {
        return error(StatusCode::BAD_REQUEST, "tunneled request must not carry a query string");
    }
    Json(json!({"tunneled": true, "method": method, "query": body})).into_response()
}

#[derive(Deserialize)]
struct ActionQuery {
    action: String,
}

async fn upload_action(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(collection): Path<String>,
    Query(query): Query<ActionQuery>,
    Json(body): Json<Value>,
) -> Response {
    let mut state = state.write().await;
    state.log.push(format!("POST /rest/{collection}?action={}", query.action));
    if let Err(response) = check_headers(&headers) {
        return response;
    }
    let kind = match collection.as_str() {
        "images" => "image",
        "videos" => "video",
        _ => return error(StatusCode::NOT_FOUND, "unknown collection"),
    };
    match query.action.as_str() {
        "initializeUpload" => initialize(&mut state, kind, &host(&headers), &body),
        "finalizeUpload" => {
            let request = body.get("finalizeUploadRequest").cloned().unwrap_or(Value::Null);
            if request.get(kind).and_then(Value::as_str).is_none() {
                return error(StatusCode::BAD_REQUEST, "finalizeUploadRequest lacks the asset");
            }
            let asset = request[kind].clone();
            state.finalize_requests.push(request);
            if kind == "image" {
                Json(json!({"value": {"image": asset}})).into_response()
            } else {
                StatusCode::OK.into_response()
            }
        }
        other => error(StatusCode::BAD_REQUEST, &format!("unknown action {other}")),
    }
}

fn initialize(state: &mut MockState, kind: &str, host: &str, body: &Value) -> Response {
    let request = &body["initializeUploadRequest"];
    if request.get("owner").and_then(Value::as_str).is_none() {
        return error(StatusCode::BAD_REQUEST, "owner is required");
    }
    state.parts.clear();
    state.part_auth.clear();
    let token = Uuid::new_v4().simple().to_string();

    if kind == "image" {
        return Json(json!({"value": {
            "uploadUrlExpiresAt": 1_700_000_000_000u64,
            "uploadUrl": format!("http://{host}/upload/image/0"),
            "image": IMAGE_URN
        }}))
        .into_response();
    }

    let Some(size) = request.get("fileSizeBytes").and_then(Value::as_u64) else {
        return error(StatusCode::BAD_REQUEST, "fileSizeBytes is required");
    };
    let part_size = state.config.part_size.max(1);
    let count = size.div_ceil(part_size).max(1);
    let instructions: Vec<Value> = (0..count)
        .map(|i| {
            let first = i * part_size;
            let last = ((i + 1) * part_size).min(size).saturating_sub(1);
            json!({
                "uploadUrl": format!("http://{host}/upload/video/{i}"),
                "firstByte": first,
                "lastByte": last
            })
        })
        .collect();
    Json(json!({"value": {
        "uploadUrlsExpireAt": 1_700_000_000_000u64,
        "video": VIDEO_URN,
        "uploadInstructions": instructions,
        "uploadToken": token
    }}))
    .into_response()
}

async fn upload_part(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path((kind, part)): Path<(String, usize)>,
    body: Bytes,
) -> Response {
    let mut state = state.write().await;
    state.log.push(format!("PUT /upload/{kind}/{part}"));
    if state.config.fail_part == Some(part) {
        return error(StatusCode::INTERNAL_SERVER_ERROR, "part storage unavailable");
    }
    state.parts.insert(part, body.len());
    state.part_auth.insert(part, headers.contains_key(header::AUTHORIZATION));
    (StatusCode::CREATED, [(header::ETAG, format!("\"etag-{kind}-{part}\""))]).into_response()
}

async fn image_status(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(urn): Path<String>,
) -> Response {
    state.write().await.log.push(format!("GET /rest/images/{urn}"));
    if let Err(response) = check_headers(&headers) {
        return response;
    }
    Json(json!({"id": urn, "status": "AVAILABLE"})).into_response()
}

async fn video_status(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(urn): Path<String>,
) -> Response {
    let mut state = state.write().await;
    state.log.push(format!("GET /rest/videos/{urn}"));
    if let Err(response) = check_headers(&headers) {
        return response;
    }
    if urn != VIDEO_URN {
        return error(StatusCode::NOT_FOUND, &format!("Not found: {urn}"));
    }
    state.status_polls += 1;
    let status = state.next_status();
    Json(json!({"id": urn, "status": status})).into_response()
}
