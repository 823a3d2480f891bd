use axum::body::{to_bytes, Body};
use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use axum::Router;
use fota_lib::engine::api::{create_router, ApiState};
use fota_lib::engine::auth::Credentials;
use fota_lib::engine::protocol::UpdateEngine;
use fota_lib::engine::upload::UploadLimits;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

// base64("admin:secret")
const AUTH: &str = "Basic YWRtaW46c2VjcmV0";

fn app() -> (TempDir, Router) {
    let dir = tempfile::tempdir().unwrap();
    let limits = UploadLimits {
        max_bytes: 1024 * 1024,
        timeout: Duration::from_secs(5),
    };
    let engine = UpdateEngine::open(dir.path(), limits).unwrap();
    let router = create_router(ApiState::new(engine, Credentials::new("admin", "secret")));
    (dir, router)
}

fn request(method: Method, uri: &str, body: &[u8]) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, AUTH)
        .header(header::CONTENT_LENGTH, body.len())
        .body(Body::from(body.to_vec()))
        .unwrap()
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Vec<u8>) {
    let (status, _, body) = send_with_headers(app, req).await;
    (status, body)
}

async fn send_with_headers(app: &Router, req: Request<Body>) -> (StatusCode, HeaderMap, Vec<u8>) {
    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, headers, body.to_vec())
}

#[tokio::test]
async fn test_unauthenticated_requests_are_forbidden() {
    let (_dir, app) = app();

    for uri in ["/devices", "/devices/esp32-01?app_ver=1.0", "/files/fw.bin", "/nowhere"] {
        let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let (status, _) = send(&app, req).await;
        assert_eq!(status, StatusCode::FORBIDDEN, "{uri}");
    }

    let req = Request::builder()
        .method(Method::DELETE)
        .uri("/devices/esp32-01")
        .header(header::AUTHORIZATION, "Basic YWRtaW46d3Jvbmc=")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_health_is_public() {
    let (_dir, app) = app();
    let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert!(String::from_utf8(body).unwrap().contains("\"ok\""));
}

#[tokio::test]
async fn test_update_flow() {
    let (_dir, app) = app();

    let csv = b"\"esp32-01\",\"1.2.0\",\"fw_1.2.0.bin\"\n";
    let (status, _) = send(&app, request(Method::PUT, "/devices/esp32-01", csv)).await;
    assert_eq!(status, StatusCode::OK);

    // Registered, image not uploaded yet
    let (status, _) = send(&app, request(Method::GET, "/devices/esp32-01?app_ver=1.1.0", b"")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let image: Vec<u8> = (0..=255u8).cycle().take(5000).collect();
    let (status, _) = send(&app, request(Method::PUT, "/files/fw_1.2.0.bin", &image)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, headers, body) =
        send_with_headers(&app, request(Method::GET, "/devices/esp32-01?app_ver=1.1.0", b"")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "text/csv");
    assert_eq!(body, b"fw_1.2.0.bin");

    let (status, body) = send(&app, request(Method::GET, "/devices/esp32-01?app_ver=1.2.0", b"")).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(body.is_empty());

    let (status, headers, body) =
        send_with_headers(&app, request(Method::GET, "/files/fw_1.2.0.bin", b"")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "application/octet-stream");
    assert_eq!(
        headers[header::CONTENT_DISPOSITION],
        "attachment; filename=\"fw_1.2.0.bin\""
    );
    assert_eq!(body, image);
}

#[tokio::test]
async fn test_check_requires_single_version() {
    let (_dir, app) = app();
    for uri in [
        "/devices/esp32-01",
        "/devices/esp32-01?other=1",
        "/devices/esp32-01?app_ver=1&app_ver=2",
    ] {
        let (status, _) = send(&app, request(Method::GET, uri, b"")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
    }

    let (status, _) = send(&app, request(Method::GET, "/devices/ghost?app_ver=1", b"")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_list_and_delete() {
    let (_dir, app) = app();
    for csv in [&b"a,1.0,fw_a.bin"[..], &b"b,2.0,fw_b.bin"[..]] {
        let (status, _) = send(&app, request(Method::PUT, "/devices/x", csv)).await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, headers, body) = send_with_headers(&app, request(Method::GET, "/devices", b"")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "text/csv");
    assert_eq!(
        headers[header::CONTENT_DISPOSITION],
        "attachment; filename=\"devices.csv\""
    );
    let text = String::from_utf8(body).unwrap();
    let mut lines: Vec<&str> = text.lines().collect();
    lines.sort();
    assert_eq!(lines, vec!["\"a\",\"1.0\",\"fw_a.bin\"", "\"b\",\"2.0\",\"fw_b.bin\""]);

    let (status, _) = send(&app, request(Method::DELETE, "/devices/a", b"")).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, request(Method::DELETE, "/devices/a", b"")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_malformed_uploads() {
    let (_dir, app) = app();

    let (status, _) = send(&app, request(Method::PUT, "/devices/esp32-02", b"\"esp32-02\",\"2.0.0\"\n")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(&app, request(Method::GET, "/devices", b"")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.is_empty());

    let no_length = Request::builder()
        .method(Method::PUT)
        .uri("/files/fw.bin")
        .header(header::AUTHORIZATION, AUTH)
        .body(Body::from("abc"))
        .unwrap();
    let (status, _) = send(&app, no_length).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let short_body = Request::builder()
        .method(Method::PUT)
        .uri("/files/fw.bin")
        .header(header::AUTHORIZATION, AUTH)
        .header(header::CONTENT_LENGTH, "100")
        .body(Body::from("abc"))
        .unwrap();
    let (status, _) = send(&app, short_body).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, request(Method::GET, "/files/fw.bin", b"")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, request(Method::PUT, "/files/..%2Fdevices.db", b"x")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, request(Method::PUT, "/files/fw%01.bin", b"abc")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = send(&app, request(Method::GET, "/files/fw%01.bin", b"")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, request(Method::DELETE, "/devices", b"")).await;
    assert!(
        status == StatusCode::METHOD_NOT_ALLOWED || status == StatusCode::BAD_REQUEST,
        "{status}"
    );

    let (status, _) = send(&app, request(Method::GET, "/devices/a/b", b"")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
