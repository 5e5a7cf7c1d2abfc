//! In-memory stand-in for the document viewing API, versioned under `/1`.
//!
//! Good enough to drive the client end to end: token auth, document upload by
//! URL or multipart file, metadata, listing with date filters, rename, delete,
//! content and thumbnail downloads, and sessions. A throttle counter can make
//! the first N requests answer `429` with `Retry-After: 1`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Bytes,
    extract::{FromRequest, Multipart, Path, Query, Request, State},
    http::{header, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::{net::TcpListener, sync::RwLock};
use tracing::{info, warn};
use uuid::Uuid;

pub const DEFAULT_LIST_LIMIT: usize = 10;
pub const DEFAULT_SESSION_MINUTES: i64 = 60;

/// Body served for a thumbnail request: the PNG signature followed by the
/// requested size.
const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Queued,
    Processing,
    Done,
    Error,
}

#[derive(Clone, Debug, Serialize)]
pub struct DocumentView {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub id: String,
    pub name: String,
    pub status: Status,
    pub created_at: String,
}

#[derive(Clone, Debug)]
struct StoredDocument {
    seq: u64,
    id: String,
    name: String,
    status: Status,
    created_at: DateTime<Utc>,
    content: Vec<u8>,
    thumbnails: Option<String>,
    non_svg: bool,
}

impl StoredDocument {
    fn view(&self) -> DocumentView {
        DocumentView {
            kind: "document",
            id: self.id.clone(),
            name: self.name.clone(),
            status: self.status.clone(),
            created_at: timestamp(&self.created_at),
        }
    }
}

#[derive(Clone, Debug)]
struct StoredSession {
    id: String,
    document_id: String,
    expires_at: DateTime<Utc>,
}

/// Shared server state. Cheap to clone behind an `Arc`.
#[derive(Debug)]
pub struct MockState {
    api_key: String,
    throttled: AtomicU32,
    next_seq: AtomicU64,
    documents: RwLock<HashMap<String, StoredDocument>>,
    sessions: RwLock<HashMap<String, StoredSession>>,
}

pub type SharedState = Arc<MockState>;

impl MockState {
    pub fn new(api_key: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            throttled: AtomicU32::new(0),
            next_seq: AtomicU64::new(0),
            documents: RwLock::new(HashMap::new()),
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Answer the next `count` requests with `429 Too Many Requests`.
    pub fn with_throttled_requests(self, count: u32) -> Self {
        self.throttled.store(count, Ordering::SeqCst);
        self
    }

    pub async fn document_count(&self) -> usize {
        self.documents.read().await.len()
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Claims one throttled response if any are left.
    fn take_throttle(&self) -> bool {
        self.throttled
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok()
    }
}

pub fn app(api_key: &str) -> Router {
    app_with_state(Arc::new(MockState::new(api_key)))
}

pub fn app_with_state(state: SharedState) -> Router {
    let api = Router::new()
        .route("/documents", get(list_documents).post(create_document))
        .route(
            "/documents/{id}",
            get(get_document).put(update_document).delete(delete_document),
        )
        .route("/documents/{id}/{asset}", get(document_asset))
        .route("/sessions", post(create_session))
        .route("/sessions/{id}", delete(delete_session))
        .layer(middleware::from_fn_with_state(state.clone(), authorize))
        .layer(middleware::from_fn_with_state(state.clone(), throttle));

    Router::new()
        .nest("/1", api)
        .layer(middleware::from_fn(log_requests))
        .with_state(state)
}

pub async fn run(listener: TcpListener, state: SharedState) -> Result<(), std::io::Error> {
    axum::serve(listener, app_with_state(state)).await
}

fn timestamp(instant: &DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// `{"type": "error", "code": ..., "message": ...}` with the matching status.
fn error(status: StatusCode, message: impl Into<String>) -> Response {
    let code = match status {
        StatusCode::BAD_REQUEST => "bad_request",
        StatusCode::UNAUTHORIZED => "unauthorized",
        StatusCode::NOT_FOUND => "not_found",
        StatusCode::UNSUPPORTED_MEDIA_TYPE => "unsupported_media_type",
        StatusCode::TOO_MANY_REQUESTS => "too_many_requests",
        _ => "server_error",
    };
    let body = json!({
        "type": "error",
        "status": status.as_u16(),
        "code": code,
        "message": message.into(),
    });
    (status, Json(body)).into_response()
}

async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let started = Instant::now();
    let response = next.run(request).await;
    info!(
        %method,
        %uri,
        status = response.status().as_u16(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "request"
    );
    response
}

async fn authorize(State(state): State<SharedState>, request: Request, next: Next) -> Response {
    let expected = format!("Token {}", state.api_key);
    let authorized = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        == Some(expected.as_str());
    if !authorized {
        warn!(uri = %request.uri(), "rejected request without a valid token");
        return error(StatusCode::UNAUTHORIZED, "Invalid or missing API key");
    }
    next.run(request).await
}

async fn throttle(State(state): State<SharedState>, request: Request, next: Next) -> Response {
    if state.take_throttle() {
        info!(uri = %request.uri(), "throttling request");
        let mut response = error(StatusCode::TOO_MANY_REQUESTS, "Too many requests");
        response
            .headers_mut()
            .insert(header::RETRY_AFTER, HeaderValue::from_static("1"));
        return response;
    }
    next.run(request).await
}

#[derive(Debug, Default, Deserialize)]
pub struct FindQuery {
    pub limit: Option<usize>,
    pub created_before: Option<String>,
    pub created_after: Option<String>,
}

fn parse_bound(name: &str, value: Option<&str>) -> Result<Option<DateTime<Utc>>, Response> {
    value
        .map(|text| {
            DateTime::parse_from_rfc3339(text)
                .map(|instant| instant.with_timezone(&Utc))
                .map_err(|_| error(StatusCode::BAD_REQUEST, format!("{name} is not a valid date")))
        })
        .transpose()
}

async fn list_documents(
    State(state): State<SharedState>,
    Query(query): Query<FindQuery>,
) -> Result<Json<serde_json::Value>, Response> {
    let before = parse_bound("created_before", query.created_before.as_deref())?;
    let after = parse_bound("created_after", query.created_after.as_deref())?;
    let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT);

    let documents = state.documents.read().await;
    let mut matching: Vec<&StoredDocument> = documents
        .values()
        .filter(|doc| before.map_or(true, |bound| doc.created_at < bound))
        .filter(|doc| after.map_or(true, |bound| doc.created_at > bound))
        .collect();
    matching.sort_by(|a, b| b.seq.cmp(&a.seq));

    let entries: Vec<DocumentView> = matching.iter().take(limit).map(|doc| doc.view()).collect();
    Ok(Json(json!({
        "document_collection": {
            "total_count": matching.len(),
            "entries": entries,
        }
    })))
}

#[derive(Debug, Default, Deserialize)]
pub struct UploadFields {
    pub url: Option<String>,
    pub name: Option<String>,
    pub thumbnails: Option<String>,
    pub non_svg: Option<bool>,
}

struct Upload {
    fields: UploadFields,
    file_name: Option<String>,
    content: Vec<u8>,
}

async fn read_multipart(mut multipart: Multipart) -> Result<Upload, Response> {
    let bad = |e: axum::extract::multipart::MultipartError| {
        error(StatusCode::BAD_REQUEST, format!("malformed multipart body: {e}"))
    };
    let mut upload = Upload {
        fields: UploadFields::default(),
        file_name: None,
        content: Vec::new(),
    };
    let mut saw_file = false;

    while let Some(field) = multipart.next_field().await.map_err(bad)? {
        let name = field.name().unwrap_or_default().to_string();
        if name == "file" {
            upload.file_name = field.file_name().map(str::to_string);
            upload.content = field.bytes().await.map_err(bad)?.to_vec();
            saw_file = true;
            continue;
        }
        let value = field.text().await.map_err(bad)?;
        match name.as_str() {
            "name" => upload.fields.name = Some(value),
            "thumbnails" => upload.fields.thumbnails = Some(value),
            "non_svg" => upload.fields.non_svg = Some(value == "true"),
            _ => {}
        }
    }

    if !saw_file {
        return Err(error(StatusCode::BAD_REQUEST, "multipart upload has no file part"));
    }
    Ok(upload)
}

async fn create_document(State(state): State<SharedState>, request: Request) -> Response {
    let content_type = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();

    let upload = if content_type.starts_with("multipart/form-data") {
        let multipart = match Multipart::from_request(request, &()).await {
            Ok(multipart) => multipart,
            Err(rejection) => return rejection.into_response(),
        };
        match read_multipart(multipart).await {
            Ok(upload) => upload,
            Err(response) => return response,
        }
    } else if content_type.starts_with("application/json") {
        let Json(fields) = match Json::<UploadFields>::from_request(request, &()).await {
            Ok(fields) => fields,
            Err(rejection) => return rejection.into_response(),
        };
        let Some(url) = fields.url.clone() else {
            return error(StatusCode::BAD_REQUEST, "url is required");
        };
        Upload {
            fields,
            file_name: None,
            content: format!("fetched from {url}").into_bytes(),
        }
    } else {
        return error(
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            "expected application/json or multipart/form-data",
        );
    };

    let fallback_name = upload
        .file_name
        .clone()
        .or_else(|| {
            upload
                .fields
                .url
                .as_deref()
                .and_then(|url| url.rsplit('/').next())
                .map(str::to_string)
        })
        .unwrap_or_else(|| "Untitled".to_string());

    let document = StoredDocument {
        seq: state.next_seq.fetch_add(1, Ordering::SeqCst),
        id: Uuid::new_v4().simple().to_string(),
        name: upload.fields.name.filter(|name| !name.is_empty()).unwrap_or(fallback_name),
        status: Status::Queued,
        created_at: Utc::now(),
        content: upload.content,
        thumbnails: upload.fields.thumbnails,
        non_svg: upload.fields.non_svg.unwrap_or(false),
    };
    info!(
        id = %document.id,
        name = %document.name,
        thumbnails = ?document.thumbnails,
        non_svg = document.non_svg,
        "document created"
    );

    let view = document.view();
    state.documents.write().await.insert(document.id.clone(), document);
    (StatusCode::CREATED, Json(view)).into_response()
}

/// Conversion finishes the first time anyone looks at a document.
fn advance(document: &mut StoredDocument) -> Status {
    let seen = document.status.clone();
    if matches!(document.status, Status::Queued | Status::Processing) {
        document.status = Status::Done;
    }
    seen
}

async fn get_document(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<DocumentView>, Response> {
    let mut documents = state.documents.write().await;
    let document = documents
        .get_mut(&id)
        .ok_or_else(|| error(StatusCode::NOT_FOUND, "document not found"))?;
    let view = document.view();
    advance(document);
    Ok(Json(view))
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateDocument {
    pub name: Option<String>,
}

async fn update_document(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<DocumentView>, Response> {
    let update: UpdateDocument = if body.is_empty() {
        UpdateDocument::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| error(StatusCode::BAD_REQUEST, format!("invalid JSON body: {e}")))?
    };

    let mut documents = state.documents.write().await;
    let document = documents
        .get_mut(&id)
        .ok_or_else(|| error(StatusCode::NOT_FOUND, "document not found"))?;
    if let Some(name) = update.name {
        document.name = name;
    }
    Ok(Json(document.view()))
}

async fn delete_document(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<StatusCode, Response> {
    let removed = state.documents.write().await.remove(&id);
    if removed.is_none() {
        return Err(error(StatusCode::NOT_FOUND, "document not found"));
    }
    state
        .sessions
        .write()
        .await
        .retain(|_, session| session.document_id != id);
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Default, Deserialize)]
pub struct ThumbnailQuery {
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// `content`, `content.pdf`, `content.zip` and `thumbnail`.
async fn document_asset(
    State(state): State<SharedState>,
    Path((id, asset)): Path<(String, String)>,
    Query(size): Query<ThumbnailQuery>,
) -> Response {
    let mut documents = state.documents.write().await;
    let Some(document) = documents.get_mut(&id) else {
        return error(StatusCode::NOT_FOUND, "document not found");
    };

    if advance(document) != Status::Done {
        let mut response = StatusCode::ACCEPTED.into_response();
        response
            .headers_mut()
            .insert(header::RETRY_AFTER, HeaderValue::from_static("1"));
        return response;
    }

    match asset.as_str() {
        "thumbnail" => {
            let (Some(width), Some(height)) = (size.width, size.height) else {
                return error(StatusCode::BAD_REQUEST, "width and height are required");
            };
            let mut body = PNG_SIGNATURE.to_vec();
            body.extend_from_slice(format!("{width}x{height}").as_bytes());
            ([(header::CONTENT_TYPE, "image/png")], body).into_response()
        }
        "content" => (
            [(header::CONTENT_TYPE, "application/octet-stream")],
            document.content.clone(),
        )
            .into_response(),
        "content.pdf" => {
            let mut body = b"%PDF-1.4\n".to_vec();
            body.extend_from_slice(&document.content);
            ([(header::CONTENT_TYPE, "application/pdf")], body).into_response()
        }
        "content.zip" => {
            let mut body = b"PK\x03\x04".to_vec();
            body.extend_from_slice(&document.content);
            ([(header::CONTENT_TYPE, "application/zip")], body).into_response()
        }
        _ => error(StatusCode::NOT_FOUND, format!("unknown asset {asset}")),
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateSession {
    pub document_id: String,
    pub duration: Option<i64>,
    pub expires_at: Option<String>,
    #[serde(default)]
    pub is_downloadable: bool,
    #[serde(default)]
    pub is_text_selectable: bool,
}

async fn create_session(
    State(state): State<SharedState>,
    Json(input): Json<CreateSession>,
) -> Response {
    let document = match state.documents.read().await.get(&input.document_id) {
        Some(document) => document.view(),
        None => return error(StatusCode::BAD_REQUEST, "document_id does not exist"),
    };

    let expires_at = match input.expires_at.as_deref() {
        Some(text) => match DateTime::parse_from_rfc3339(text) {
            Ok(instant) => instant.with_timezone(&Utc),
            Err(_) => return error(StatusCode::BAD_REQUEST, "expires_at is not a valid date"),
        },
        None => {
            Utc::now() + Duration::minutes(input.duration.unwrap_or(DEFAULT_SESSION_MINUTES))
        }
    };

    let session = StoredSession {
        id: Uuid::new_v4().simple().to_string(),
        document_id: input.document_id,
        expires_at,
    };
    info!(
        id = %session.id,
        document_id = %session.document_id,
        downloadable = input.is_downloadable,
        text_selectable = input.is_text_selectable,
        "session created"
    );

    let base = format!("https://view-api.box.com/1/sessions/{}", session.id);
    let body = json!({
        "type": "session",
        "id": session.id,
        "document": document,
        "expires_at": timestamp(&session.expires_at),
        "urls": {
            "view": format!("{base}/view"),
            "assets": format!("{base}/assets/"),
            "realtime": format!("https://view-api.box.com/sse/{}", session.id),
        },
    });
    state.sessions.write().await.insert(session.id.clone(), session);
    (StatusCode::CREATED, Json(body)).into_response()
}

async fn delete_session(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<StatusCode, Response> {
    state
        .sessions
        .write()
        .await
        .remove(&id)
        .map(|_| StatusCode::NO_CONTENT)
        .ok_or_else(|| error(StatusCode::NOT_FOUND, "session not found"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stored(status: Status) -> StoredDocument {
        StoredDocument {
            seq: 0,
            id: "abc".to_string(),
            name: "Sample".to_string(),
            status,
            created_at: DateTime::parse_from_rfc3339("2015-02-02T09:13:20Z")
                .unwrap()
                .with_timezone(&Utc),
            content: Vec::new(),
            thumbnails: None,
            non_svg: false,
        }
    }

    #[test]
    fn document_view_uses_wire_names() {
        let json = serde_json::to_value(stored(Status::Queued).view()).unwrap();
        assert_eq!(json["type"], "document");
        assert_eq!(json["status"], "queued");
        assert_eq!(json["created_at"], "2015-02-02T09:13:20Z");
    }

    #[test]
    fn advance_reports_the_status_before_finishing() {
        let mut document = stored(Status::Queued);
        assert_eq!(advance(&mut document), Status::Queued);
        assert_eq!(advance(&mut document), Status::Done);
    }

    #[test]
    fn failed_documents_stay_failed() {
        let mut document = stored(Status::Error);
        assert_eq!(advance(&mut document), Status::Error);
        assert_eq!(document.status, Status::Error);
    }

    #[test]
    fn throttle_budget_runs_out() {
        let state = MockState::new("key").with_throttled_requests(2);
        assert!(state.take_throttle());
        assert!(state.take_throttle());
        assert!(!state.take_throttle());
    }

    #[test]
    fn session_input_defaults_flags_to_false() {
        let input: CreateSession = serde_json::from_str(r#"{"document_id":"abc"}"#).unwrap();
        assert!(!input.is_downloadable);
        assert!(!input.is_text_selectable);
        assert!(input.duration.is_none());
    }
}
