//! API integration tests for smriti-server.
//!
//! These tests drive the router with realistic multipart requests over the
//! in-memory object store, the mock recognizer and a static event directory.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::Value;
use smriti_core::{
    EventScope, InMemoryObjectStore, MockRecognizer, PipelineConfig, RetryPolicy,
    StaticEventDirectory,
};
use smriti_server::state::DEFAULT_SESSION_TTL;
use smriti_server::{create_router, AppState};
use tower::ServiceExt;

const BUCKET: &str = "photos";
const PREFIX: &str = "Wedding_images/asha/";
const GUEST_KEY: &str = "guest-asha";
const OWNER_KEY: &str = "owner-asha";
const SELFIE: &[u8] = b"\xFF\xD8\xFF\xE0\0\x10JFIF\0selfie";
const COLLECTION: &str = "asha_faces";

struct TestApp {
    router: Router,
    state: AppState,
    store: Arc<InMemoryObjectStore>,
    recognizer: Arc<MockRecognizer>,
}

impl TestApp {
    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
        (status, json)
    }
}

fn event_store(photos: &[&str]) -> InMemoryObjectStore {
    photos.iter().fold(InMemoryObjectStore::new(), |store, name| {
        store.with_object(BUCKET, &format!("{PREFIX}{name}"), name.as_bytes().to_vec())
    })
}

fn create_test_app(store: InMemoryObjectStore, recognizer: MockRecognizer) -> TestApp {
    create_test_app_with_ttl(store, recognizer, DEFAULT_SESSION_TTL)
}

fn create_test_app_with_ttl(
    store: InMemoryObjectStore,
    recognizer: MockRecognizer,
    session_ttl: Duration,
) -> TestApp {
    let store = Arc::new(store);
    let recognizer = Arc::new(recognizer);
    let directory = StaticEventDirectory::new().with_event(
        GUEST_KEY,
        OWNER_KEY,
        EventScope::new(PREFIX, COLLECTION),
    );
    let pipeline = PipelineConfig::new(BUCKET, PREFIX)
        .with_collection(COLLECTION)
        .with_batch_size(2)
        .with_retry(RetryPolicy::immediate(3));
    let state = AppState::new(
        store.clone(),
        recognizer.clone(),
        Arc::new(directory),
        pipeline,
    )
    .with_session_ttl(session_ttl);
    TestApp {
        router: create_router(state.clone()),
        state,
        store,
        recognizer,
    }
}

/// Helper to create a multipart body with a passkey and any number of files
fn create_multipart(passkey: Option<&str>, files: &[(&str, &str, &[u8])]) -> (String, Vec<u8>) {
    let boundary = "----TestBoundary7MA4YWxkTrZu0gW";
    let mut body = Vec::new();

    if let Some(passkey) = passkey {
        body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
        body.extend_from_slice(b"Content-Disposition: form-data; name=\"passkey\"\r\n\r\n");
        body.extend_from_slice(passkey.as_bytes());
        body.extend_from_slice(b"\r\n");
    }

    for (filename, content_type, content) in files {
        body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\n",
                filename
            )
            .as_bytes(),
        );
        body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", content_type).as_bytes());
        body.extend_from_slice(content);
        body.extend_from_slice(b"\r\n");
    }

    // End boundary
    body.extend_from_slice(format!("--{}--\r\n", boundary).as_bytes());

    (format!("multipart/form-data; boundary={}", boundary), body)
}

fn post_multipart(uri: &str, (content_type, body): (String, Vec<u8>)) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", content_type)
        .body(Body::from(body))
        .unwrap()
}

fn post_empty(uri: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn selfie_form(passkey: &str) -> (String, Vec<u8>) {
    create_multipart(Some(passkey), &[("me.jpg", "image/jpeg", SELFIE)])
}

async fn start_search(app: &TestApp) -> String {
    start_search_with(app, SELFIE).await
}

async fn start_search_with(app: &TestApp, selfie: &[u8]) -> String {
    let form = create_multipart(Some(GUEST_KEY), &[("me.jpg", "image/jpeg", selfie)]);
    let (status, json) = app.send(post_multipart("/searches", form)).await;
    assert_eq!(status, StatusCode::OK, "{json}");
    json["search_id"].as_str().unwrap().to_string()
}

// ============================================================================
// Health & Readiness Tests
// ============================================================================

#[tokio::test]
async fn test_health_endpoint_returns_ok() {
    let app = create_test_app(InMemoryObjectStore::new(), MockRecognizer::new());

    let (status, json) = app.send(get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["service"], "smriti-server");
    assert_eq!(json["active_searches"], 0);
}

#[tokio::test]
async fn test_ready_endpoint_returns_ok() {
    let app = create_test_app(InMemoryObjectStore::new(), MockRecognizer::new());

    let (status, json) = app.send(get("/ready")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["ready"], true);
}

#[tokio::test]
async fn test_openapi_document_lists_search_paths() {
    let app = create_test_app(InMemoryObjectStore::new(), MockRecognizer::new());

    let (status, json) = app.send(get("/api-docs/openapi.json")).await;

    assert_eq!(status, StatusCode::OK);
    assert!(json["paths"]["/searches"].is_object());
    assert!(json["paths"]["/searches/{search_id}/step"].is_object());
    assert!(json["paths"]["/photos"].is_object());
}

// ============================================================================
// Search Flow Tests
// ============================================================================

#[tokio::test]
async fn test_full_search_flow() {
    let app = create_test_app(
        event_store(&["a.jpg", "b.jpg", "c.jpg"]),
        MockRecognizer::new().with_matches([format!("{PREFIX}b.jpg")]),
    );

    let (status, json) = app
        .send(post_multipart("/searches", selfie_form(GUEST_KEY)))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["state"], "searching");
    assert_eq!(json["cursor"], 0);
    assert_eq!(json["total"], 3);
    let id = json["search_id"].as_str().unwrap().to_string();

    let (status, json) = app.send(post_empty(&format!("/searches/{id}/step"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["processed"], 2);
    assert_eq!(json["new_matches"][0], format!("{PREFIX}b.jpg"));
    assert_eq!(json["state"], "searching");

    let (_, json) = app.send(post_empty(&format!("/searches/{id}/step"))).await;
    assert_eq!(json["processed"], 1);
    assert_eq!(json["cursor"], 3);
    assert_eq!(json["total_matches"], 1);
    assert_eq!(json["state"], "exhausted");

    // Stepping an exhausted search is a no-op
    let (status, json) = app.send(post_empty(&format!("/searches/{id}/step"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["processed"], 0);

    let (status, json) = app.send(get(&format!("/searches/{id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["matches"], serde_json::json!([format!("{PREFIX}b.jpg")]));
    assert_eq!(json["links"][0]["name"], "b.jpg");
    assert!(json["links"][0]["url"].is_string());
}

#[tokio::test]
async fn test_archive_download() {
    let app = create_test_app(
        event_store(&["a.jpg", "b.jpg"]),
        MockRecognizer::new().with_matches([format!("{PREFIX}a.jpg"), format!("{PREFIX}b.jpg")]),
    );
    let id = start_search(&app).await;
    app.send(post_empty(&format!("/searches/{id}/step"))).await;

    let response = app
        .router
        .clone()
        .oneshot(get(&format!("/searches/{id}/archive")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "application/zip");
    assert!(response.headers()["content-disposition"]
        .to_str()
        .unwrap()
        .contains("smriti_matched_moments.zip"));

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes.to_vec())).unwrap();
    assert_eq!(archive.len(), 2);
    assert!(archive.by_name("a.jpg").is_ok());
}

#[tokio::test]
async fn test_archive_without_matches_is_not_found() {
    let app = create_test_app(event_store(&["a.jpg"]), MockRecognizer::new());
    let id = start_search(&app).await;

    let (status, json) = app.send(get(&format!("/searches/{id}/archive"))).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_no_face_in_selfie_returns_guidance() {
    let app = create_test_app(
        event_store(&["a.jpg"]),
        MockRecognizer::new().with_no_face_detected(),
    );

    let (status, json) = app
        .send(post_multipart("/searches", selfie_form(GUEST_KEY)))
        .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["code"], "NO_FACE_DETECTED");
    assert!(json["error"].as_str().unwrap().contains("selfie"));
}

#[tokio::test]
async fn test_empty_event_is_exhausted_immediately() {
    let app = create_test_app(InMemoryObjectStore::new(), MockRecognizer::new());

    let (status, json) = app
        .send(post_multipart("/searches", selfie_form(GUEST_KEY)))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["state"], "exhausted");
    assert_eq!(json["notice"], "nothing_to_search");
    assert_eq!(json["total"], 0);
}

#[tokio::test]
async fn test_unknown_passkey_is_rejected() {
    let app = create_test_app(event_store(&["a.jpg"]), MockRecognizer::new());

    let (status, json) = app
        .send(post_multipart("/searches", selfie_form("not-a-guest")))
        .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["code"], "INVALID_PASSKEY");
}

#[tokio::test]
async fn test_owner_passkey_cannot_search() {
    let app = create_test_app(event_store(&["a.jpg"]), MockRecognizer::new());

    let (status, _) = app
        .send(post_multipart("/searches", selfie_form(OWNER_KEY)))
        .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_missing_passkey_is_bad_request() {
    let app = create_test_app(event_store(&["a.jpg"]), MockRecognizer::new());

    let (status, json) = app
        .send(post_multipart(
            "/searches",
            create_multipart(None, &[("me.jpg", "image/jpeg", SELFIE)]),
        ))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "INVALID_INPUT");
}

#[tokio::test]
async fn test_non_image_selfie_is_rejected() {
    let app = create_test_app(event_store(&["a.jpg"]), MockRecognizer::new());

    let (status, json) = app
        .send(post_multipart(
            "/searches",
            create_multipart(
                Some(GUEST_KEY),
                &[("me.jpg", "application/octet-stream", b"definitely not an image")],
            ),
        ))
        .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["code"], "INVALID_REFERENCE");
}

#[tokio::test]
async fn test_wrong_content_type_is_rejected() {
    let app = create_test_app(event_store(&["a.jpg"]), MockRecognizer::new());

    let (status, _) = app
        .send(post_multipart(
            "/searches",
            create_multipart(Some(GUEST_KEY), &[("me.html", "text/html", b"<html>")]),
        ))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_fatal_batch_error_keeps_progress_and_resumes() {
    let app = create_test_app(
        event_store(&["a.jpg", "b.jpg", "c.jpg"]),
        MockRecognizer::new()
            .with_matches([format!("{PREFIX}a.jpg"), format!("{PREFIX}c.jpg")])
            .with_fatal_error(format!("{PREFIX}c.jpg")),
    );
    let id = start_search(&app).await;

    let (_, json) = app.send(post_empty(&format!("/searches/{id}/step"))).await;
    assert_eq!(json["total_matches"], 1);

    let (status, json) = app.send(post_empty(&format!("/searches/{id}/step"))).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(json["code"], "RECOGNITION_ERROR");

    let (_, json) = app.send(get(&format!("/searches/{id}"))).await;
    assert_eq!(json["state"], "idle");
    assert_eq!(json["cursor"], 2);
    assert_eq!(json["matches"], serde_json::json!([format!("{PREFIX}a.jpg")]));
    assert!(json["last_error"].is_string());

    // The next step resumes the failed batch, which fails again
    let (status, _) = app.send(post_empty(&format!("/searches/{id}/step"))).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    let (_, json) = app.send(get(&format!("/searches/{id}"))).await;
    assert_eq!(json["cursor"], 2);
}

#[tokio::test]
async fn test_unknown_search_is_not_found() {
    let app = create_test_app(InMemoryObjectStore::new(), MockRecognizer::new());
    let id = uuid::Uuid::new_v4();

    let (status, _) = app.send(post_empty(&format!("/searches/{id}/step"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app.send(get(&format!("/searches/{id}"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_delete_search() {
    let app = create_test_app(event_store(&["a.jpg"]), MockRecognizer::new());
    let id = start_search(&app).await;

    let delete = |id: &str| {
        Request::builder()
            .method("DELETE")
            .uri(format!("/searches/{id}"))
            .body(Body::empty())
            .unwrap()
    };

    assert_eq!(app.recognizer.faces(COLLECTION).len(), 1);

    let (status, _) = app.send(delete(&id)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(app.recognizer.faces(COLLECTION).is_empty());

    let (status, _) = app.send(delete(&id)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_concurrent_guests_get_their_own_matches() {
    let asha: &[u8] = b"\xFF\xD8\xFF\xE0\0\x10JFIF\0asha";
    let ravi: &[u8] = b"\xFF\xD8\xFF\xE0\0\x10JFIF\0ravi";
    let app = create_test_app(
        event_store(&["asha.jpg", "group.jpg", "ravi.jpg"]),
        MockRecognizer::new()
            .with_person(asha, [format!("{PREFIX}asha.jpg"), format!("{PREFIX}group.jpg")])
            .with_person(ravi, [format!("{PREFIX}ravi.jpg"), format!("{PREFIX}group.jpg")]),
    );

    let first = start_search_with(&app, asha).await;
    let second = start_search_with(&app, ravi).await;
    assert_eq!(app.recognizer.faces(COLLECTION).len(), 2);

    for _ in 0..2 {
        for id in [&first, &second] {
            let (status, _) = app.send(post_empty(&format!("/searches/{id}/step"))).await;
            assert_eq!(status, StatusCode::OK);
        }
    }

    let (_, json) = app.send(get(&format!("/searches/{first}"))).await;
    assert_eq!(json["state"], "exhausted");
    assert_eq!(
        json["matches"],
        serde_json::json!([format!("{PREFIX}asha.jpg"), format!("{PREFIX}group.jpg")])
    );
    let (_, json) = app.send(get(&format!("/searches/{second}"))).await;
    assert_eq!(
        json["matches"],
        serde_json::json!([format!("{PREFIX}group.jpg"), format!("{PREFIX}ravi.jpg")])
    );

    // Exhausted searches no longer hold a reference face
    assert!(app.recognizer.faces(COLLECTION).is_empty());
}

#[tokio::test]
async fn test_idle_sessions_expire_and_release_their_face() {
    let app = create_test_app_with_ttl(
        event_store(&["a.jpg", "b.jpg", "c.jpg"]),
        MockRecognizer::new(),
        Duration::ZERO,
    );
    let id = start_search(&app).await;
    assert_eq!(app.recognizer.faces(COLLECTION).len(), 1);

    assert_eq!(app.state.cleanup_expired().await, 1);
    let (status, _) = app.send(get(&format!("/searches/{id}"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(app.recognizer.faces(COLLECTION).is_empty());
}

#[tokio::test]
async fn test_active_sessions_survive_cleanup() {
    let app = create_test_app(event_store(&["a.jpg"]), MockRecognizer::new());
    let id = start_search(&app).await;

    assert_eq!(app.state.cleanup_expired().await, 0);
    let (status, _) = app.send(get(&format!("/searches/{id}"))).await;
    assert_eq!(status, StatusCode::OK);
}

// ============================================================================
// Photo Upload Tests
// ============================================================================

#[tokio::test]
async fn test_upload_photos() {
    let app = create_test_app(event_store(&["a.jpg"]), MockRecognizer::new());

    let (status, json) = app
        .send(post_multipart(
            "/photos",
            create_multipart(
                Some(OWNER_KEY),
                &[
                    ("new.jpg", "image/jpeg", b"new"),
                    ("a.jpg", "image/jpeg", b"dup"),
                    ("notes.txt", "application/octet-stream", b"txt"),
                ],
            ),
        ))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["uploaded"], 2);
    assert_eq!(json["failed"], 1);
    assert_eq!(json["files"][0]["key"], format!("{PREFIX}new.jpg"));
    assert!(json["files"][2]["error"].is_string());

    // The colliding name got a suffix; the original is untouched
    let suffixed = json["files"][1]["key"].as_str().unwrap();
    assert!(suffixed.starts_with(&format!("{PREFIX}a-")));
    assert!(suffixed.ends_with(".jpg"));
    assert_eq!(app.store.keys(BUCKET).len(), 3);
}

#[tokio::test]
async fn test_uploaded_photos_are_searched() {
    let app = create_test_app(
        event_store(&["a.jpg"]),
        MockRecognizer::new().with_matches([format!("{PREFIX}new.jpg")]),
    );

    // Prime the listing cache
    start_search(&app).await;

    let (status, _) = app
        .send(post_multipart(
            "/photos",
            create_multipart(Some(OWNER_KEY), &[("new.jpg", "image/jpeg", b"new")]),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, json) = app
        .send(post_multipart("/searches", selfie_form(GUEST_KEY)))
        .await;
    assert_eq!(json["total"], 2);
}

#[tokio::test]
async fn test_guest_passkey_cannot_upload() {
    let app = create_test_app(InMemoryObjectStore::new(), MockRecognizer::new());

    let (status, json) = app
        .send(post_multipart(
            "/photos",
            create_multipart(Some(GUEST_KEY), &[("new.jpg", "image/jpeg", b"new")]),
        ))
        .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["code"], "INVALID_PASSKEY");
}

#[tokio::test]
async fn test_upload_without_files_is_bad_request() {
    let app = create_test_app(InMemoryObjectStore::new(), MockRecognizer::new());

    let (status, _) = app
        .send(post_multipart("/photos", create_multipart(Some(OWNER_KEY), &[])))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}
