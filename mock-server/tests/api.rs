use std::sync::Arc;

use axum::http::{self, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use mock_server::{app, app_with_state, MockState};
use serde_json::Value;
use tower::ServiceExt;

const KEY: &str = "test-key";

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_bytes(response: axum::response::Response) -> bytes::Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

fn request(method: &str, uri: &str) -> http::request::Builder {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(http::header::AUTHORIZATION, format!("Token {KEY}"))
}

fn json_request(method: &str, uri: &str, body: &str) -> Request<String> {
    request(method, uri)
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(body.to_string())
        .unwrap()
}

fn empty(method: &str, uri: &str) -> Request<String> {
    request(method, uri).body(String::new()).unwrap()
}

async fn send(app: &Router, request: Request<String>) -> axum::response::Response {
    app.clone().oneshot(request).await.unwrap()
}

async fn upload(app: &Router, body: &str) -> Value {
    let resp = send(app, json_request("POST", "/1/documents", body)).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    body_json(resp).await
}

// --- auth and throttling ---

#[tokio::test]
async fn missing_token_is_unauthorized() {
    let app = app(KEY);
    let resp = send(
        &app,
        Request::builder().uri("/1/documents").body(String::new()).unwrap(),
    )
    .await;

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(resp).await;
    assert_eq!(body["type"], "error");
    assert_eq!(body["code"], "unauthorized");
}

#[tokio::test]
async fn wrong_token_is_unauthorized() {
    let app = app(KEY);
    let resp = send(
        &app,
        Request::builder()
            .uri("/1/documents")
            .header(http::header::AUTHORIZATION, "Token nope")
            .body(String::new())
            .unwrap(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn throttled_requests_carry_retry_after() {
    let app = app_with_state(Arc::new(MockState::new(KEY).with_throttled_requests(1)));

    let first = send(&app, empty("GET", "/1/documents")).await;
    assert_eq!(first.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(first.headers()[http::header::RETRY_AFTER], "1");

    let second = send(&app, empty("GET", "/1/documents")).await;
    assert_eq!(second.status(), StatusCode::OK);
}

// --- documents ---

#[tokio::test]
async fn list_starts_empty() {
    let app = app(KEY);
    let resp = send(&app, empty("GET", "/1/documents")).await;

    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["document_collection"]["total_count"], 0);
    assert_eq!(body["document_collection"]["entries"], Value::Array(Vec::new()));
}

#[tokio::test]
async fn upload_by_url_names_the_document() {
    let app = app(KEY);
    let doc = upload(&app, r#"{"url":"http://example.com/a/report.pdf"}"#).await;

    assert_eq!(doc["type"], "document");
    assert_eq!(doc["name"], "report.pdf");
    assert_eq!(doc["status"], "queued");
    assert!(doc["created_at"].as_str().unwrap().ends_with('Z'));
}

#[tokio::test]
async fn upload_by_url_requires_a_url() {
    let app = app(KEY);
    let resp = send(&app, json_request("POST", "/1/documents", r#"{"name":"x"}"#)).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn upload_multipart_file() {
    let app = app(KEY);
    let boundary = "XyZ";
    let body = format!(
        "--{boundary}\r\nContent-Disposition: form-data; name=\"name\"\r\n\r\nNotes\r\n\
         --{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"notes.txt\"\r\n\
         Content-Type: text/plain\r\n\r\nhello\r\n--{boundary}--\r\n"
    );
    let resp = send(
        &app,
        request("POST", "/1/documents")
            .header(
                http::header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(body)
            .unwrap(),
    )
    .await;

    assert_eq!(resp.status(), StatusCode::CREATED);
    let doc = body_json(resp).await;
    assert_eq!(doc["name"], "Notes");
    let id = doc["id"].as_str().unwrap().to_string();

    // The first asset request finishes conversion and asks to retry.
    let pending = send(&app, empty("GET", &format!("/1/documents/{id}/content"))).await;
    assert_eq!(pending.status(), StatusCode::ACCEPTED);
    assert!(pending.headers().contains_key(http::header::RETRY_AFTER));

    let ready = send(&app, empty("GET", &format!("/1/documents/{id}/content"))).await;
    assert_eq!(ready.status(), StatusCode::OK);
    assert_eq!(&body_bytes(ready).await[..], b"hello");
}

#[tokio::test]
async fn unsupported_upload_body_is_rejected() {
    let app = app(KEY);
    let resp = send(
        &app,
        request("POST", "/1/documents")
            .header(http::header::CONTENT_TYPE, "text/plain")
            .body("hi".to_string())
            .unwrap(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
}

#[tokio::test]
async fn get_reports_status_then_finishes_conversion() {
    let app = app(KEY);
    let doc = upload(&app, r#"{"url":"http://example.com/a.pdf"}"#).await;
    let uri = format!("/1/documents/{}", doc["id"].as_str().unwrap());

    let first = body_json(send(&app, empty("GET", &uri)).await).await;
    assert_eq!(first["status"], "queued");
    let second = body_json(send(&app, empty("GET", &uri)).await).await;
    assert_eq!(second["status"], "done");
}

#[tokio::test]
async fn list_is_newest_first_and_limited() {
    let app = app(KEY);
    for n in 0..3 {
        upload(&app, &format!(r#"{{"url":"http://example.com/{n}.pdf"}}"#)).await;
    }

    let body = body_json(send(&app, empty("GET", "/1/documents?limit=2")).await).await;
    let entries = body["document_collection"]["entries"].as_array().unwrap();
    assert_eq!(body["document_collection"]["total_count"], 3);
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["name"], "2.pdf");
    assert_eq!(entries[1]["name"], "1.pdf");
}

#[tokio::test]
async fn list_filters_by_creation_date() {
    let app = app(KEY);
    upload(&app, r#"{"url":"http://example.com/a.pdf"}"#).await;

    let old = body_json(
        send(&app, empty("GET", "/1/documents?created_before=2000-01-01T00:00:00Z")).await,
    )
    .await;
    assert_eq!(old["document_collection"]["total_count"], 0);

    let recent = body_json(
        send(&app, empty("GET", "/1/documents?created_after=2000-01-01T00:00:00Z")).await,
    )
    .await;
    assert_eq!(recent["document_collection"]["total_count"], 1);

    let bad = send(&app, empty("GET", "/1/documents?created_after=yesterday")).await;
    assert_eq!(bad.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn update_renames() {
    let app = app(KEY);
    let doc = upload(&app, r#"{"url":"http://example.com/a.pdf"}"#).await;
    let uri = format!("/1/documents/{}", doc["id"].as_str().unwrap());

    let resp = send(&app, json_request("PUT", &uri, r#"{"name":"Renamed"}"#)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["name"], "Renamed");
}

#[tokio::test]
async fn delete_returns_204_with_empty_body() {
    let app = app(KEY);
    let doc = upload(&app, r#"{"url":"http://example.com/a.pdf"}"#).await;
    let uri = format!("/1/documents/{}", doc["id"].as_str().unwrap());

    let resp = send(&app, empty("DELETE", &uri)).await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    assert!(body_bytes(resp).await.is_empty());

    let gone = send(&app, empty("GET", &uri)).await;
    assert_eq!(gone.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(gone).await["type"], "error");
}

#[tokio::test]
async fn thumbnail_requires_both_dimensions() {
    let app = app(KEY);
    let doc = upload(&app, r#"{"url":"http://example.com/a.pdf"}"#).await;
    let base = format!("/1/documents/{}", doc["id"].as_str().unwrap());
    send(&app, empty("GET", &base)).await;

    let missing = send(&app, empty("GET", &format!("{base}/thumbnail?width=100"))).await;
    assert_eq!(missing.status(), StatusCode::BAD_REQUEST);

    let resp = send(&app, empty("GET", &format!("{base}/thumbnail?height=50&width=100"))).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = body_bytes(resp).await;
    assert!(bytes.starts_with(b"\x89PNG"));
    assert!(bytes.ends_with(b"100x50"));
}

#[tokio::test]
async fn converted_downloads_by_extension() {
    let app = app(KEY);
    let doc = upload(&app, r#"{"url":"http://example.com/a.pdf"}"#).await;
    let base = format!("/1/documents/{}", doc["id"].as_str().unwrap());
    send(&app, empty("GET", &base)).await;

    let pdf = body_bytes(send(&app, empty("GET", &format!("{base}/content.pdf"))).await).await;
    assert!(pdf.starts_with(b"%PDF"));
    let zip = body_bytes(send(&app, empty("GET", &format!("{base}/content.zip"))).await).await;
    assert!(zip.starts_with(b"PK"));

    let unknown = send(&app, empty("GET", &format!("{base}/content.exe"))).await;
    assert_eq!(unknown.status(), StatusCode::NOT_FOUND);
}

// --- sessions ---

#[tokio::test]
async fn session_embeds_its_document() {
    let app = app(KEY);
    let doc = upload(&app, r#"{"url":"http://example.com/a.pdf"}"#).await;
    let body = format!(r#"{{"document_id":"{}","duration":5}}"#, doc["id"].as_str().unwrap());

    let resp = send(&app, json_request("POST", "/1/sessions", &body)).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let session = body_json(resp).await;
    assert_eq!(session["type"], "session");
    assert_eq!(session["document"]["id"], doc["id"]);
    assert!(session["urls"]["view"].as_str().unwrap().ends_with("/view"));

    let uri = format!("/1/sessions/{}", session["id"].as_str().unwrap());
    assert_eq!(send(&app, empty("DELETE", &uri)).await.status(), StatusCode::NO_CONTENT);
    assert_eq!(send(&app, empty("DELETE", &uri)).await.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn session_for_unknown_document_is_bad_request() {
    let app = app(KEY);
    let resp = send(&app, json_request("POST", "/1/sessions", r#"{"document_id":"nope"}"#)).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn session_honors_explicit_expiry() {
    let app = app(KEY);
    let doc = upload(&app, r#"{"url":"http://example.com/a.pdf"}"#).await;
    let body = format!(
        r#"{{"document_id":"{}","expires_at":"2030-01-01T00:00:00Z"}}"#,
        doc["id"].as_str().unwrap()
    );

    let session = body_json(send(&app, json_request("POST", "/1/sessions", &body)).await).await;
    assert_eq!(session["expires_at"], "2030-01-01T00:00:00Z");
}
