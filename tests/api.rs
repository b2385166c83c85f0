use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use myimages::{
    app::build_app,
    config::{AppConfig, BulkUploadMode, OwnershipMode},
    state::AppState,
};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

const BOUNDARY: &str = "----myimages-test-boundary";

async fn setup(tweak: impl FnOnce(&mut AppConfig)) -> (Router, TempDir) {
    let (_, app, root) = setup_with_state(tweak).await;
    (app, root)
}

async fn setup_with_state(tweak: impl FnOnce(&mut AppConfig)) -> (AppState, Router, TempDir) {
    let root = tempfile::tempdir().unwrap();
    let mut config = AppConfig::with_root("sqlite::memory:", root.path());
    tweak(&mut config);
    let state = AppState::in_memory(config).await.unwrap();
    (state.clone(), build_app(state), root)
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Vec<u8>) {
    let res = app.clone().oneshot(req).await.unwrap();
    let status = res.status();
    let body = res.into_body().collect().await.unwrap().to_bytes().to_vec();
    (status, body)
}

async fn send_json(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let req = Request::builder().method(method).uri(uri);
    let req = match body {
        Some(v) => req
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(v.to_string()))
            .unwrap(),
        None => req.body(Body::empty()).unwrap(),
    };
    let (status, bytes) = send(app, req).await;
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

fn multipart(field: &str, files: &[(&str, &[u8])]) -> Body {
    let mut body = Vec::new();
    for (file_name, data) in files {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    Body::from(body)
}

async fn upload(app: &Router, uri: &str, field: &str, files: &[(&str, &[u8])]) -> (StatusCode, Value) {
    let req = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(multipart(field, files))
        .unwrap();
    let (status, bytes) = send(app, req).await;
    (status, serde_json::from_slice(&bytes).unwrap())
}

async fn register(app: &Router, email: &str) -> Value {
    let (status, body) = send_json(
        app,
        Method::POST,
        "/users/",
        Some(json!({"username": "a", "fullname": "A", "email": email, "password": "p"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    body
}

#[tokio::test]
async fn register_then_duplicate_email_is_rejected() {
    let (app, _root) = setup(|_| {}).await;

    let user = register(&app, "a@x.com").await;
    assert_eq!(user["id"], 1);
    assert_eq!(user["is_active"], true);
    assert_eq!(user["email"], "a@x.com");
    assert!(user.get("password").is_none());
    assert!(user.get("hashed_password").is_none());

    let (status, body) = send_json(
        &app,
        Method::POST,
        "/users/",
        Some(json!({"username": "b", "fullname": "B", "email": "a@x.com", "password": "q"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"], "Email already registered");

    let (status, users) = send_json(&app, Method::GET, "/users", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(users.as_array().unwrap().len(), 1);
    assert!(!users.to_string().contains("argon2"));
}

#[tokio::test]
async fn read_user_and_missing_user() {
    let (app, _root) = setup(|_| {}).await;
    register(&app, "a@x.com").await;

    let (status, user) = send_json(&app, Method::GET, "/users/1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(user["fullname"], "A");

    let (status, body) = send_json(&app, Method::GET, "/users/99", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["detail"], "User not found");
}

#[tokio::test]
async fn invalid_email_is_bad_request() {
    let (app, _root) = setup(|_| {}).await;
    let (status, _) = send_json(
        &app,
        Method::POST,
        "/users/",
        Some(json!({"username": "a", "fullname": "A", "email": "nope", "password": "p"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn upload_then_fetch_file_returns_same_bytes() {
    let (app, root) = setup(|_| {}).await;
    register(&app, "a@x.com").await;

    let (status, body) = upload(&app, "/users/1/images/photo", "file", &[("photo", &[1, 2, 3])]).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body, json!({"filename": "photo"}));
    assert!(root.path().join("users/images/1/photo").is_file());

    let (status, image) = send_json(&app, Method::GET, "/users/1/images/1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(image["name"], "photo");
    assert_eq!(image["owner_id"], 1);

    let req = Request::builder()
        .uri("/users/1/images/1/file")
        .body(Body::empty())
        .unwrap();
    let (status, bytes) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(bytes, vec![1, 2, 3]);
}

#[tokio::test]
async fn file_response_has_guessed_content_type() {
    let (app, _root) = setup(|_| {}).await;
    register(&app, "a@x.com").await;
    upload(&app, "/users/1/images/cat", "file", &[("cat.png", b"\x89PNG")]).await;

    let req = Request::builder()
        .uri("/users/1/images/1/file")
        .body(Body::empty())
        .unwrap();
    let res = app.clone().oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()[header::CONTENT_TYPE], "image/png");
}

#[tokio::test]
async fn logical_name_and_physical_name_can_differ() {
    let (app, root) = setup(|_| {}).await;
    register(&app, "a@x.com").await;

    let (_, body) = upload(&app, "/users/1/images/holiday", "file", &[("IMG_0001.jpg", b"jpg")]).await;
    assert_eq!(body["filename"], "IMG_0001.jpg");

    let (_, images) = send_json(&app, Method::GET, "/users/1/images/", None).await;
    let images = images.as_array().unwrap();
    assert_eq!(images.len(), 1);
    assert_eq!(images[0]["name"], "holiday");
    let expected = root.path().join("users/images/1/IMG_0001.jpg");
    assert_eq!(images[0]["path"], &*expected.to_string_lossy());
}

#[tokio::test]
async fn delete_removes_record_but_keeps_file() {
    let (app, root) = setup(|_| {}).await;
    register(&app, "a@x.com").await;
    upload(&app, "/users/1/images/photo", "file", &[("photo.png", b"abc")]).await;
    let file = root.path().join("users/images/1/photo.png");

    let (status, body) = send_json(&app, Method::DELETE, "/users/1/images/1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["msg"], "image deleted");

    let (_, images) = send_json(&app, Method::GET, "/images/", None).await;
    assert!(images.as_array().unwrap().is_empty());
    assert!(file.is_file());

    // deleting again still confirms
    let (status, body) = send_json(&app, Method::DELETE, "/users/1/images/1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["msg"], "image deleted");

    let (status, _) = send_json(&app, Method::GET, "/users/1/images/1", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn bulk_upload_returns_last_file_name() {
    let (app, _root) = setup(|_| {}).await;
    register(&app, "a@x.com").await;

    let (status, body) = upload(
        &app,
        "/users/1/images/uploadfiles/",
        "files",
        &[("one.png", b"1"), ("two.png", b"22")],
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body, json!({"filename": "two.png"}));

    let (_, images) = send_json(&app, Method::GET, "/images", None).await;
    assert_eq!(images.as_array().unwrap().len(), 2);

    let (_, page) = send_json(&app, Method::GET, "/images?limit=1&offset=1", None).await;
    let page = page.as_array().unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page[0]["name"], "two.png");
}

#[tokio::test]
async fn upload_reports_the_name_the_file_was_stored_under() {
    let (app, root) = setup(|_| {}).await;
    register(&app, "a@x.com").await;

    let (status, body) = upload(&app, "/users/1/images/photo", "file", &[(" a.png ", b"abc")]).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body, json!({"filename": "a.png"}));

    let stored = root.path().join("users/images/1").join(body["filename"].as_str().unwrap());
    assert_eq!(std::fs::read(stored).unwrap(), b"abc");
}

#[tokio::test]
async fn upload_over_the_size_cap_is_payload_too_large() {
    let (app, root) = setup(|c| c.max_upload_bytes = Some(16)).await;
    register(&app, "a@x.com").await;

    let big = vec![7u8; 4096];
    let (status, _) = upload(&app, "/users/1/images/photo", "file", &[("big.png", &big[..])]).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);

    let (_, images) = send_json(&app, Method::GET, "/images", None).await;
    assert!(images.as_array().unwrap().is_empty());
    assert!(!root.path().join("users/images/1/big.png").exists());
}

#[tokio::test]
async fn failed_record_insert_reports_orphaned_path() {
    let (state, app, root) = setup_with_state(|_| {}).await;
    register(&app, "a@x.com").await;
    sqlx::query("DROP TABLE images").execute(&state.db).await.unwrap();

    let (status, body) = upload(&app, "/users/1/images/photo", "file", &[("x.png", b"orphan")]).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["detail"], "File stored but image record was not created");

    let orphan = root.path().join("users/images/1/x.png");
    assert_eq!(body["orphaned_path"], orphan.display().to_string());
    assert_eq!(std::fs::read(&orphan).unwrap(), b"orphan");
}

#[tokio::test]
async fn legacy_bulk_upload_writes_flat_files_without_records() {
    let (app, root) = setup(|c| c.bulk_upload = BulkUploadMode::Legacy).await;

    let (status, body) = upload(
        &app,
        "/users/5/images/uploadfiles",
        "files",
        &[("one.png", b"1"), ("two.png", b"22")],
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body, json!({"filename": "two.png"}));

    assert_eq!(std::fs::read(root.path().join("uploads/two.png")).unwrap(), b"22");
    let (_, images) = send_json(&app, Method::GET, "/images", None).await;
    assert!(images.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn strict_ownership_hides_other_users_images() {
    let (app, _root) = setup(|_| {}).await;
    register(&app, "a@x.com").await;
    register(&app, "b@x.com").await;
    upload(&app, "/users/1/images/photo", "file", &[("photo.png", b"abc")]).await;

    let (status, _) = send_json(&app, Method::GET, "/users/2/images/1", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // strict delete through the wrong user leaves the record alone
    send_json(&app, Method::DELETE, "/users/2/images/1", None).await;
    let (status, _) = send_json(&app, Method::GET, "/users/1/images/1", None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn loose_ownership_resolves_by_image_id_only() {
    let (app, _root) = setup(|c| c.ownership = OwnershipMode::Loose).await;
    register(&app, "a@x.com").await;
    register(&app, "b@x.com").await;
    upload(&app, "/users/1/images/photo", "file", &[("photo.png", b"abc")]).await;

    let (status, image) = send_json(&app, Method::GET, "/users/2/images/1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(image["owner_id"], 1);
}

#[tokio::test]
async fn upload_for_unknown_user_is_not_found() {
    let (app, _root) = setup(|_| {}).await;
    let (status, body) = upload(&app, "/users/7/images/photo", "file", &[("photo.png", b"x")]).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["detail"], "User not found");
}

#[tokio::test]
async fn health_is_ok() {
    let (app, _root) = setup(|_| {}).await;
    let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"ok");
}
