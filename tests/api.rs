//! End-to-end API tests driving the router directly

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use memolane::api::{create_router, AppState};
use memolane::config::Config;
use memolane::middleware::RateLimiter;
use memolane::storage::MediaStore;
use memolane::validate::image::MimeSniffer;
use memolane::Database;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

const BOUNDARY: &str = "memolane-test-boundary";

struct TestApp {
    app: Router,
    _dir: TempDir,
}

fn test_app(configure: impl FnOnce(&mut Config)) -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config {
        data_dir: dir.path().to_path_buf(),
        ..Config::default()
    };
    // Generous default so CRUD tests never trip the limiter; the rate-limit
    // test tightens this itself
    config.rate_limit.max_attempts = 1000;
    configure(&mut config);

    let db = Arc::new(Database::in_memory().unwrap());
    let media = Arc::new(MediaStore::new(config.media_dir()).unwrap());
    let rate_limiter = Arc::new(RateLimiter::new(&config.rate_limit));
    let state = AppState {
        db,
        media,
        uploads: config.uploads.clone(),
        sniffer: config.uploads.sniff_mime.then_some(MimeSniffer),
    };
    let app = create_router(state, rate_limiter, &config);

    TestApp { app, _dir: dir }
}

/// Minimal PNG with the given dimensions in its IHDR chunk
fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let mut bytes = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
    bytes.extend_from_slice(&13u32.to_be_bytes());
    bytes.extend_from_slice(b"IHDR");
    bytes.extend_from_slice(&width.to_be_bytes());
    bytes.extend_from_slice(&height.to_be_bytes());
    bytes.extend_from_slice(&[8, 2, 0, 0, 0]);
    bytes.extend_from_slice(&[0; 4]);
    bytes.extend_from_slice(&0u32.to_be_bytes());
    bytes.extend_from_slice(b"IEND");
    bytes.extend_from_slice(&[0; 4]);
    bytes
}

fn multipart_body(fields: &[(&str, &str)], image: Option<(&str, &[u8])>) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    if let Some((filename, bytes)) = image {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"image\"; \
                 filename=\"{filename}\"\r\nContent-Type: image/png\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, serde_json::Value, axum::http::HeaderMap) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, json, headers)
}

async fn register(app: &Router, username: &str) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("POST")
        .uri("/api/register")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            serde_json::json!({ "username": username }).to_string(),
        ))
        .unwrap();
    let (status, json, _) = send(app, request).await;
    (status, json)
}

fn memory_request(token: &str, method: &str, uri: &str, body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

fn get_request(token: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn health_is_public_and_responses_carry_security_headers() {
    let t = test_app(|_| {});

    let request = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let (status, json, headers) = send(&t.app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(headers["x-content-type-options"], "nosniff");
    assert_eq!(headers["x-frame-options"], "DENY");
    assert_eq!(headers["x-xss-protection"], "1; mode=block");
    assert_eq!(headers["referrer-policy"], "strict-origin-when-cross-origin");
    assert!(headers["content-security-policy"]
        .to_str()
        .unwrap()
        .starts_with("default-src 'self';"));
}

#[tokio::test]
async fn register_validates_and_rejects_duplicates() {
    let t = test_app(|_| {});

    let (status, json) = register(&t.app, "admin").await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(json["errors"]["username"]
        .as_str()
        .unwrap()
        .contains("reserved"));

    let (status, _) = register(&t.app, "ab").await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    let (status, _) = register(&t.app, "123abc").await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, json) = register(&t.app, "maria_99").await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(json["token"].as_str().is_some());

    let (status, _) = register(&t.app, "maria_99").await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn unauthenticated_requests_are_rejected() {
    let t = test_app(|_| {});

    let request = Request::builder()
        .uri("/api/memories")
        .body(Body::empty())
        .unwrap();
    let (status, _, _) = send(&t.app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _, _) = send(&t.app, get_request("not-a-real-token", "/api/memories")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn memory_crud_roundtrip() {
    let t = test_app(|_| {});
    let (_, json) = register(&t.app, "maria_99").await;
    let token = json["token"].as_str().unwrap().to_string();

    // Create
    let image = png_bytes(200, 200);
    let body = multipart_body(
        &[
            ("title", "Trip to Lima"),
            ("description", "Our first holiday together in Peru."),
            ("date", "2023-06-01"),
        ],
        Some(("holiday.png", &image)),
    );
    let (status, json, _) = send(&t.app, memory_request(&token, "POST", "/api/memories", body)).await;
    assert_eq!(status, StatusCode::CREATED, "{}", json);
    let id = json["id"].as_str().unwrap().to_string();

    // Timeline
    let (status, json, _) = send(&t.app, get_request(&token, "/api/memories")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["total"], 1);
    assert_eq!(json["memories"][0]["title"], "Trip to Lima");

    // Detail
    let (status, json, _) =
        send(&t.app, get_request(&token, &format!("/api/memories/{}", id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["date"], "2023-06-01");

    // Image bytes round-trip
    let request = get_request(&token, &format!("/api/memories/{}/image", id));
    let response = t.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(bytes.as_ref(), image.as_slice());

    // Count
    let (status, json, _) = send(&t.app, get_request(&token, "/api/memories/count")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["count"], 1);
    assert_eq!(json["user"], "maria_99");

    // Update without replacing the image
    let body = multipart_body(
        &[
            ("title", "Trip to Lima, updated"),
            ("description", "Our first holiday together in Peru."),
            ("date", "2023-06-02"),
        ],
        None,
    );
    let (status, _, _) = send(
        &t.app,
        memory_request(&token, "PATCH", &format!("/api/memories/{}", id), body),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, json, _) = send(&t.app, get_request(&token, &format!("/api/memories/{}", id))).await;
    assert_eq!(json["title"], "Trip to Lima, updated");
    assert_eq!(json["date"], "2023-06-02");

    // Delete, then the memory is gone
    let request = Request::builder()
        .method("DELETE")
        .uri(format!("/api/memories/{}", id))
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap();
    let (status, _, _) = send(&t.app, request).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _, _) = send(&t.app, get_request(&token, &format!("/api/memories/{}", id))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn invalid_fields_are_reported_together() {
    let t = test_app(|_| {});
    let (_, json) = register(&t.app, "maria_99").await;
    let token = json["token"].as_str().unwrap().to_string();

    let image = png_bytes(50, 50);
    let body = multipart_body(
        &[
            ("title", "ab"),
            ("description", "short"),
            ("date", "2999-01-01"),
        ],
        Some(("tiny.png", &image)),
    );
    let (status, json, _) = send(&t.app, memory_request(&token, "POST", "/api/memories", body)).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    let errors = &json["errors"];
    assert!(errors["title"].as_str().unwrap().contains("at least 3"));
    assert!(errors["description"]
        .as_str()
        .unwrap()
        .contains("at least 10"));
    assert!(errors["date"].as_str().unwrap().contains("future"));
    assert!(errors["image"].as_str().unwrap().contains("at least 100x100"));
}

#[tokio::test]
async fn other_users_memories_are_invisible() {
    let t = test_app(|_| {});
    let (_, json) = register(&t.app, "maria_99").await;
    let token_a = json["token"].as_str().unwrap().to_string();
    let (_, json) = register(&t.app, "pedro_77").await;
    let token_b = json["token"].as_str().unwrap().to_string();

    let image = png_bytes(200, 200);
    let body = multipart_body(
        &[
            ("title", "Trip to Lima"),
            ("description", "Our first holiday together in Peru."),
            ("date", "2023-06-01"),
        ],
        Some(("holiday.png", &image)),
    );
    let (_, json, _) = send(
        &t.app,
        memory_request(&token_a, "POST", "/api/memories", body),
    )
    .await;
    let id = json["id"].as_str().unwrap().to_string();

    // Owner sees it; the other account gets a 404, not a 403
    let (status, _, _) =
        send(&t.app, get_request(&token_a, &format!("/api/memories/{}", id))).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _, _) =
        send(&t.app, get_request(&token_b, &format!("/api/memories/{}", id))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let request = Request::builder()
        .method("DELETE")
        .uri(format!("/api/memories/{}", id))
        .header(header::AUTHORIZATION, format!("Bearer {}", token_b))
        .body(Body::empty())
        .unwrap();
    let (status, _, _) = send(&t.app, request).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, json, _) = send(&t.app, get_request(&token_b, "/api/memories")).await;
    assert_eq!(json["total"], 0);
}

#[tokio::test]
async fn rate_limiter_rejects_after_cap() {
    let t = test_app(|config| {
        config.rate_limit.max_attempts = 3;
    });

    let post = |client: &'static str| {
        Request::builder()
            .method("POST")
            .uri("/api/register")
            .header("x-forwarded-for", client)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                serde_json::json!({ "username": "zz" }).to_string(),
            ))
            .unwrap()
    };

    for _ in 0..3 {
        let (status, _, _) = send(&t.app, post("203.0.113.9")).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    // Over the cap: rejected before the handler, still with security headers
    let (status, _, headers) = send(&t.app, post("203.0.113.9")).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(headers["x-content-type-options"], "nosniff");

    // A different client key is unaffected
    let (status, _, _) = send(&t.app, post("203.0.113.10")).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    // Reads never count against the cap
    let request = Request::builder()
        .uri("/health")
        .header("x-forwarded-for", "203.0.113.9")
        .body(Body::empty())
        .unwrap();
    let (status, _, _) = send(&t.app, request).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn non_image_bytes_are_rejected_as_unprocessable() {
    let t = test_app(|_| {});
    let (_, json) = register(&t.app, "maria_99").await;
    let token = json["token"].as_str().unwrap().to_string();

    let body = multipart_body(
        &[
            ("title", "Trip to Lima"),
            ("description", "Our first holiday together in Peru."),
            ("date", "2023-06-01"),
        ],
        Some(("fake.jpg", b"definitely not image data")),
    );
    let (status, json, _) = send(&t.app, memory_request(&token, "POST", "/api/memories", body)).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(json["errors"]["image"]
        .as_str()
        .unwrap()
        .contains("Could not process"));
}
