//! Router-level tests for the file API.
//!
//! Each test builds the full application over an in-memory SQLite database
//! and a local object store in a temporary directory.

use axum::{
    Router,
    body::Body,
    http::{HeaderMap, Method, Request, StatusCode, header},
};
use bytes::Bytes;
use filebox::{
    auth::{CredentialVerifier, JwtVerifier},
    repositories::file_repository::{SqliteFileRepository, connect, run_migrations},
    services::file_service::FileService,
    state::AppState,
    storage::{ObjectStore, local::LocalObjectStore},
};
use http_body_util::BodyExt;
use serde_json::Value;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

const SECRET: &str = "test-secret-key-for-testing-only";
const PUBLIC_URL: &str = "http://files.test";
const BOUNDARY: &str = "----filebox-test-boundary";

struct TestApp {
    router: Router,
    verifier: JwtVerifier,
    _dir: TempDir,
}

impl TestApp {
    async fn new() -> Self {
        Self::with_limit(1024 * 1024).await
    }

    async fn with_limit(max_upload_bytes: usize) -> Self {
        Self::build(max_upload_bytes, &[]).await
    }

    async fn with_cors_origins(origins: &[&str]) -> Self {
        let origins: Vec<String> = origins.iter().map(|o| o.to_string()).collect();
        Self::build(1024 * 1024, &origins).await
    }

    async fn build(max_upload_bytes: usize, cors_origins: &[String]) -> Self {
        let db = connect("sqlite::memory:").await.expect("connect");
        run_migrations(&db).await.expect("migrate");

        let dir = tempfile::tempdir().expect("tempdir");
        let local = Arc::new(LocalObjectStore::new(dir.path(), "files", PUBLIC_URL, SECRET));
        let store: Arc<dyn ObjectStore> = local.clone();
        let verifier = JwtVerifier::new(SECRET);
        let shared_verifier: Arc<dyn CredentialVerifier> = Arc::new(verifier.clone());

        let state = AppState {
            files: FileService::new(Arc::new(SqliteFileRepository::new(db.clone())), store.clone()),
            verifier: shared_verifier,
            db,
            store,
            local_store: Some(local),
        };

        Self {
            router: filebox::app(state, max_upload_bytes, cors_origins),
            verifier,
            _dir: dir,
        }
    }

    fn token(&self, user: &str) -> String {
        self.verifier
            .issue(user, chrono::Duration::minutes(5))
            .expect("issue token")
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, HeaderMap, Bytes) {
        let response = self.router.clone().oneshot(request).await.expect("oneshot");
        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .into_body()
            .collect()
            .await
            .expect("read body")
            .to_bytes();
        (status, headers, body)
    }

    async fn call(&self, method: Method, uri: &str, user: Option<&str>) -> (StatusCode, HeaderMap, Bytes) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(user) = user {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", self.token(user)));
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    async fn upload(&self, user: &str, file_name: &str, content: &[u8]) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/upload")
            .header(header::AUTHORIZATION, format!("Bearer {}", self.token(user)))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(multipart_body("file", file_name, "text/plain", content)))
            .unwrap();
        let (status, _, body) = self.send(request).await;
        (status, json(&body))
    }
}

fn multipart_body(field: &str, file_name: &str, content_type: &str, content: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
            field, file_name
        )
        .as_bytes(),
    );
    body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", content_type).as_bytes());
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
    body
}

fn json(body: &[u8]) -> Value {
    serde_json::from_slice(body).unwrap_or(Value::Null)
}

#[tokio::test]
async fn owner_lifecycle_and_cross_user_denial() {
    let app = TestApp::new().await;

    let (status, record) = app.upload("alice", "a.txt", b"0123456789").await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(record["size"], 10);
    assert_eq!(record["fileName"], "a.txt");
    assert_eq!(record["ownerId"], "alice");
    assert_eq!(record["mediaType"], "text/plain");
    let id = record["id"].as_str().unwrap().to_string();
    let path = format!("/files/{}", id);

    let (status, _, body) = app.call(Method::GET, &path, Some("bob")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json(&body)["status"], 403);

    let (status, _, body) = app.call(Method::GET, &path, Some("alice")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body)["id"], id.as_str());

    let (status, _, body) = app.call(Method::DELETE, &path, Some("alice")).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(body.is_empty());

    let (status, _, body) = app.call(Method::GET, &path, Some("alice")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json(&body)["error"], "file not found");
}

#[tokio::test]
async fn every_file_endpoint_requires_a_valid_token() {
    let app = TestApp::new().await;
    let (_, record) = app.upload("alice", "a.txt", b"hello").await;
    let id = record["id"].as_str().unwrap();

    let endpoints = [
        (Method::GET, "/files".to_string()),
        (Method::GET, format!("/files/{}", id)),
        (Method::GET, format!("/files/{}/download", id)),
        (Method::GET, format!("/files/{}/preview", id)),
        (Method::DELETE, format!("/files/{}", id)),
        (Method::POST, "/upload".to_string()),
    ];
    for (method, uri) in endpoints {
        let (status, _, _) = app.call(method.clone(), &uri, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{method} {uri}");

        let request = Request::builder()
            .method(method.clone())
            .uri(&uri)
            .header(header::AUTHORIZATION, "Bearer not-a-jwt")
            .body(Body::empty())
            .unwrap();
        let (status, _, _) = app.send(request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{method} {uri}");
    }

    // Nothing was deleted by the rejected requests.
    let (status, _, _) = app
        .call(Method::GET, &format!("/files/{}", id), Some("alice"))
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn upload_without_file_field_is_bad_request() {
    let app = TestApp::new().await;
    let request = Request::builder()
        .method(Method::POST)
        .uri("/upload")
        .header(header::AUTHORIZATION, format!("Bearer {}", app.token("alice")))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(multipart_body("attachment", "a.txt", "text/plain", b"x")))
        .unwrap();
    let (status, _, body) = app.send(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json(&body)["error"], "no file uploaded");

    let (status, _) = app.upload("alice", "empty.txt", b"").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, _, body) = app.call(Method::GET, "/files", Some("alice")).await;
    assert_eq!(json(&body), Value::Array(vec![]));
}

#[tokio::test]
async fn oversized_upload_is_rejected() {
    let app = TestApp::with_limit(16).await;
    let (status, _) = app.upload("alice", "big.bin", &[7u8; 64]).await;
    assert!(status.is_client_error(), "{status}");

    let (_, _, body) = app.call(Method::GET, "/files", Some("alice")).await;
    assert_eq!(json(&body), Value::Array(vec![]));
}

#[tokio::test]
async fn list_is_scoped_to_the_caller() {
    let app = TestApp::new().await;
    app.upload("alice", "one.txt", b"1").await;
    app.upload("bob", "bobs.txt", b"2").await;
    app.upload("alice", "two.txt", b"3").await;

    let (status, _, body) = app.call(Method::GET, "/files", Some("alice")).await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<String> = json(&body)
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["fileName"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(names, vec!["one.txt", "two.txt"]);

    let (_, _, body) = app.call(Method::GET, "/files", Some("carol")).await;
    assert_eq!(json(&body), Value::Array(vec![]));
}

#[tokio::test]
async fn download_streams_exact_bytes_as_attachment() {
    let app = TestApp::new().await;
    let payload: Vec<u8> = (0..=255u8).cycle().take(200_000).collect();
    let (_, record) = app.upload("alice", "data.bin", &payload).await;
    let id = record["id"].as_str().unwrap();

    let (status, headers, body) = app
        .call(Method::GET, &format!("/files/{}/download", id), Some("alice"))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        headers[header::CONTENT_DISPOSITION],
        "attachment; filename=\"data.bin\""
    );
    assert_eq!(headers[header::CONTENT_TYPE], "text/plain");
    assert_eq!(headers[header::CONTENT_LENGTH], "200000");
    assert_eq!(body.as_ref(), payload.as_slice());
    assert_eq!(record["size"], 200_000);

    let (status, _, body) = app
        .call(Method::GET, &format!("/files/{}/download", id), Some("bob"))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json(&body)["error"], "access denied");
}

#[tokio::test]
async fn preview_url_renders_inline_and_rejects_tampering() {
    let app = TestApp::new().await;
    let (_, record) = app.upload("alice", "note.txt", b"preview me").await;
    let id = record["id"].as_str().unwrap();

    let (status, _, body) = app
        .call(Method::GET, &format!("/files/{}/preview", id), Some("alice"))
        .await;
    assert_eq!(status, StatusCode::OK);
    let preview = json(&body);
    let url = preview["previewUrl"].as_str().unwrap();
    assert!(url.starts_with(PUBLIC_URL));
    assert!(preview["expiresAt"].is_string());

    let signed_path = url.strip_prefix(PUBLIC_URL).unwrap();
    let (status, headers, body) = app.call(Method::GET, signed_path, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "text/plain");
    assert!(
        headers[header::CONTENT_DISPOSITION]
            .to_str()
            .unwrap()
            .starts_with("inline")
    );
    assert_eq!(body.as_ref(), b"preview me");

    let tampered = signed_path.replace("content_type=text%2Fplain", "content_type=text%2Fhtml");
    let (status, _, _) = app.call(Method::GET, &tampered, None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _, _) = app
        .call(Method::GET, &format!("/files/{}/preview", id), Some("bob"))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn malformed_and_unknown_ids_are_not_found() {
    let app = TestApp::new().await;
    for uri in [
        "/files/not-a-uuid",
        "/files/00000000-0000-0000-0000-000000000000",
        "/files/00000000-0000-0000-0000-000000000000/download",
        "/files/00000000-0000-0000-0000-000000000000/preview",
    ] {
        let (status, _, _) = app.call(Method::GET, uri, Some("alice")).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
    }
    let (status, _, _) = app
        .call(Method::DELETE, "/files/not-a-uuid", Some("alice"))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn probes_report_ready() {
    let app = TestApp::new().await;

    let (status, _, body) = app.call(Method::GET, "/healthz", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body)["status"], "ok");

    let (status, _, body) = app.call(Method::GET, "/readyz", None).await;
    assert_eq!(status, StatusCode::OK);
    let body = json(&body);
    assert_eq!(body["checks"]["metadata"]["ok"], true);
    assert_eq!(body["checks"]["object_store"]["ok"], true);
}

#[tokio::test]
async fn upload_keeps_long_file_names() {
    let app = TestApp::new().await;
    let long_name = format!("{}.txt", "a".repeat(246));
    let (status, record) = app.upload("alice", &long_name, b"long name").await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(record["fileName"], long_name.as_str());

    let id = record["id"].as_str().unwrap();
    let (status, _, body) = app
        .call(Method::GET, &format!("/files/{}/download", id), Some("alice"))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_ref(), b"long name");
}

#[tokio::test]
async fn file_part_without_name_is_stored_as_upload_bin() {
    let app = TestApp::new().await;
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    body.extend_from_slice(b"Content-Disposition: form-data; name=\"file\"\r\n\r\n");
    body.extend_from_slice(b"anonymous bytes");
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
    let request = Request::builder()
        .method(Method::POST)
        .uri("/upload")
        .header(header::AUTHORIZATION, format!("Bearer {}", app.token("alice")))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap();
    let (status, _, body) = app.send(request).await;
    assert_eq!(status, StatusCode::CREATED);
    let record = json(&body);
    assert_eq!(record["fileName"], "upload.bin");
    assert_eq!(record["mediaType"], "application/octet-stream");

    let id = record["id"].as_str().unwrap();
    let (_, headers, _) = app
        .call(Method::GET, &format!("/files/{}/download", id), Some("alice"))
        .await;
    assert_eq!(
        headers[header::CONTENT_DISPOSITION],
        "attachment; filename=\"upload.bin\""
    );
}

fn preflight(origin: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::OPTIONS)
        .uri(uri)
        .header(header::ORIGIN, origin)
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "GET")
        .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "authorization")
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn cors_preflight_allows_any_origin_by_default() {
    let app = TestApp::new().await;
    let (status, headers, _) = app.send(preflight("http://localhost:5173", "/files")).await;
    assert!(status.is_success(), "{status}");
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    assert!(headers.contains_key(header::ACCESS_CONTROL_ALLOW_METHODS));

    // Simple requests carry the header too, including error responses.
    let request = Request::builder()
        .uri("/files")
        .header(header::ORIGIN, "http://localhost:5173")
        .body(Body::empty())
        .unwrap();
    let (status, headers, _) = app.send(request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
}

#[tokio::test]
async fn cors_preflight_honours_configured_origins() {
    let app = TestApp::with_cors_origins(&["https://app.example.com"]).await;

    let (_, headers, _) = app
        .send(preflight("https://app.example.com", "/files/some-id/preview"))
        .await;
    assert_eq!(
        headers[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "https://app.example.com"
    );

    let (_, headers, _) = app.send(preflight("https://evil.example.com", "/files")).await;
    assert!(!headers.contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));
}
