//! End-to-end tests driving the real router in process.

use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use filedepot::events::listeners::default_pipeline;
use filedepot::handlers::AppState;
use filedepot::identity::ContentValidator;
use filedepot::routes::routes::routes;
use filedepot::store::Stores;
use filedepot::store::disk::DiskBinaryStore;
use filedepot::store::sqlite::SqliteMetadataStore;
use http_body_util::BodyExt;
use serde_json::Value;
use sqlx::sqlite::SqlitePoolOptions;
use std::sync::Arc;
use tower::ServiceExt;

async fn build_app() -> (Router, tempfile::TempDir) {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();

    for statement in include_str!("../migrations/0001_init.sql")
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        sqlx::query(statement).execute(&pool).await.unwrap();
    }

    let metadata = Arc::new(SqliteMetadataStore::new(Arc::new(pool)));
    let dir = tempfile::tempdir().unwrap();
    let stores = Stores {
        metadata: metadata.clone(),
        short_urls: metadata,
        binary: Arc::new(DiskBinaryStore::new(dir.path())),
    };
    let validator = Arc::new(ContentValidator::default());
    let manager = default_pipeline(validator.clone());

    let app = routes().with_state(AppState::new(manager, stores, validator));
    (app, dir)
}

/// 1024 bytes of deterministic printable text; sniffs as text/plain.
fn text_payload() -> Vec<u8> {
    let alphabet = b"the quick brown fox jumps over a lazy dog ";
    alphabet.iter().copied().cycle().take(1024).collect()
}

fn digest(data: &[u8]) -> String {
    format!("{:x}", md5::compute(data))
}

async fn send(app: &Router, request: Request<Body>) -> Response<Body> {
    app.clone().oneshot(request).await.unwrap()
}

async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

async fn body_json(response: Response<Body>) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

fn put(uri: &str, body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method("PUT")
        .uri(uri)
        .body(Body::from(body))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn delete(uri: &str) -> Request<Body> {
    Request::builder()
        .method("DELETE")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn put_get_delete_round_trip() {
    let (app, _dir) = build_app().await;
    let payload = text_payload();
    let id = digest(&payload);
    let uri = format!("/users/acme/files/{id}");

    // PUT: fresh content is a 201 with the verified identity in the ack.
    let response = send(&app, put(&uri, payload.clone())).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(
        response
            .headers()
            .get("x-imbo-fileidentifier")
            .and_then(|v| v.to_str().ok()),
        Some(id.as_str())
    );
    let ack = body_json(response).await;
    assert_eq!(ack["fileIdentifier"], Value::String(id.clone()));
    assert_eq!(ack["extension"], Value::String("txt".into()));

    // GET: the exact original bytes, typed by sniffed mime.
    let response = send(&app, get(&uri)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok()),
        Some("text/plain")
    );
    assert_eq!(
        response
            .headers()
            .get("x-imbo-originalfilesize")
            .and_then(|v| v.to_str().ok()),
        Some("1024")
    );
    assert!(response.headers().contains_key("last-modified"));
    assert_eq!(body_bytes(response).await, payload);

    // DELETE: acknowledged with the identifier.
    let response = send(&app, delete(&uri)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let ack = body_json(response).await;
    assert_eq!(ack["fileIdentifier"], Value::String(id.clone()));

    // Gone afterwards.
    let response = send(&app, get(&uri)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let error = body_json(response).await;
    assert_eq!(error["error"]["errorCode"], Value::Number(301.into()));
}

#[tokio::test]
async fn repeated_put_is_a_touch() {
    let (app, _dir) = build_app().await;
    let payload = text_payload();
    let uri = format!("/users/acme/files/{}", digest(&payload));

    let response = send(&app, put(&uri, payload.clone())).await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = send(&app, put(&uri, payload)).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn put_with_wrong_identifier_is_rejected() {
    let (app, _dir) = build_app().await;

    let response = send(
        &app,
        put(
            "/users/acme/files/00000000000000000000000000000000",
            b"some honest text".to_vec(),
        ),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let error = body_json(response).await;
    assert_eq!(error["error"]["errorCode"], Value::Number(202.into()));
}

#[tokio::test]
async fn empty_body_is_rejected() {
    let (app, _dir) = build_app().await;

    let response = send(
        &app,
        put(&format!("/users/acme/files/{}", digest(b"")), Vec::new()),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let error = body_json(response).await;
    assert_eq!(error["error"]["errorCode"], Value::Number(201.into()));
}

#[tokio::test]
async fn unsupported_content_is_rejected() {
    let (app, _dir) = build_app().await;
    let payload: Vec<u8> = vec![0x00, 0x01, 0xfe, 0xff, 0x03, 0x80, 0x99, 0x12];
    let uri = format!("/users/acme/files/{}", digest(&payload));

    let response = send(&app, put(&uri, payload)).await;

    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    let error = body_json(response).await;
    assert_eq!(error["error"]["errorCode"], Value::Number(203.into()));
}

#[tokio::test]
async fn malformed_identifier_in_path_is_rejected() {
    let (app, _dir) = build_app().await;

    let response = send(&app, get("/users/acme/files/not-a-valid-digest")).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let error = body_json(response).await;
    assert_eq!(error["error"]["errorCode"], Value::Number(205.into()));
}

#[tokio::test]
async fn head_computes_headers_without_body() {
    let (app, _dir) = build_app().await;
    let payload = text_payload();
    let id = digest(&payload);
    let uri = format!("/users/acme/files/{id}");
    send(&app, put(&uri, payload)).await;

    let request = Request::builder()
        .method("HEAD")
        .uri(&uri)
        .body(Body::empty())
        .unwrap();
    let response = send(&app, request).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get("content-length")
            .and_then(|v| v.to_str().ok()),
        Some("1024")
    );
    assert!(body_bytes(response).await.is_empty());
}

#[tokio::test]
async fn listing_applies_field_projection() {
    let (app, _dir) = build_app().await;
    let first = text_payload();
    let mut second = text_payload();
    second.extend_from_slice(b"tail");

    send(
        &app,
        put(&format!("/users/acme/files/{}", digest(&first)), first),
    )
    .await;
    send(
        &app,
        put(&format!("/users/acme/files/{}", digest(&second)), second),
    )
    .await;

    let response = send(&app, get("/users/acme/files?fields=fileIdentifier,size")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let listing = body_json(response).await;
    let entries = listing.as_array().unwrap();
    assert_eq!(entries.len(), 2);
    for entry in entries {
        let entry = entry.as_object().unwrap();
        assert_eq!(entry.len(), 2);
        assert!(entry.contains_key("fileIdentifier"));
        assert!(entry.contains_key("size"));
    }
}

#[tokio::test]
async fn listing_scopes_to_the_account() {
    let (app, _dir) = build_app().await;
    let payload = text_payload();

    send(
        &app,
        put(&format!("/users/acme/files/{}", digest(&payload)), payload),
    )
    .await;

    let listing = body_json(send(&app, get("/users/megacorp/files")).await).await;
    assert_eq!(listing.as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn listing_renders_xml_when_asked() {
    let (app, _dir) = build_app().await;
    let payload = text_payload();
    send(
        &app,
        put(&format!("/users/acme/files/{}", digest(&payload)), payload),
    )
    .await;

    let response = send(&app, get("/users/acme/files.xml")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok()),
        Some("application/xml")
    );
    let body = String::from_utf8(body_bytes(response).await).unwrap();
    assert!(body.contains("<files><file>"));
}

#[tokio::test]
async fn listing_supports_jsonp() {
    let (app, _dir) = build_app().await;

    let response = send(&app, get("/users/acme/files?callback=handle")).await;
    let body = String::from_utf8(body_bytes(response).await).unwrap();

    assert!(body.starts_with("handle("));
    assert!(body.ends_with(')'));
}

#[tokio::test]
async fn metadata_crud_round_trip() {
    let (app, _dir) = build_app().await;
    let payload = text_payload();
    let id = digest(&payload);
    send(&app, put(&format!("/users/acme/files/{id}"), payload)).await;
    let meta_uri = format!("/users/acme/files/{id}/metadata");

    // Replace the (empty) set.
    let request = Request::builder()
        .method("PUT")
        .uri(&meta_uri)
        .body(Body::from(r#"{"artist":"banksy","year":2006}"#))
        .unwrap();
    let response = send(&app, request).await;
    assert_eq!(response.status(), StatusCode::OK);
    let ack = body_json(response).await;
    assert_eq!(ack["fileIdentifier"], Value::String(id.clone()));

    // Read it back.
    let metadata = body_json(send(&app, get(&meta_uri)).await).await;
    assert_eq!(metadata["artist"], Value::String("banksy".into()));
    assert_eq!(metadata["year"], Value::Number(2006.into()));

    // Replace-whole-set semantics: the old keys do not survive.
    let request = Request::builder()
        .method("PUT")
        .uri(&meta_uri)
        .body(Body::from(r#"{"city":"london"}"#))
        .unwrap();
    send(&app, request).await;
    let metadata = body_json(send(&app, get(&meta_uri)).await).await;
    assert!(metadata.get("artist").is_none());
    assert_eq!(metadata["city"], Value::String("london".into()));

    // Delete clears the set.
    let response = send(&app, delete(&meta_uri)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let metadata = body_json(send(&app, get(&meta_uri)).await).await;
    assert_eq!(metadata, Value::Object(serde_json::Map::new()));
}

#[tokio::test]
async fn metadata_of_missing_file_is_not_found() {
    let (app, _dir) = build_app().await;

    let response = send(
        &app,
        get("/users/acme/files/aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa/metadata"),
    )
    .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn invalid_metadata_body_is_rejected() {
    let (app, _dir) = build_app().await;
    let payload = text_payload();
    let id = digest(&payload);
    send(&app, put(&format!("/users/acme/files/{id}"), payload)).await;

    let request = Request::builder()
        .method("PUT")
        .uri(format!("/users/acme/files/{id}/metadata"))
        .body(Body::from("[1, 2, 3]"))
        .unwrap();
    let response = send(&app, request).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let error = body_json(response).await;
    assert_eq!(error["error"]["errorCode"], Value::Number(206.into()));
}

#[tokio::test]
async fn metadata_listing_and_query() {
    let (app, _dir) = build_app().await;
    let first = text_payload();
    let mut second = text_payload();
    second.extend_from_slice(b"tail");
    let first_id = digest(&first);
    let second_id = digest(&second);

    send(&app, put(&format!("/users/acme/files/{first_id}"), first)).await;
    send(&app, put(&format!("/users/acme/files/{second_id}"), second)).await;

    for (id, body) in [
        (&first_id, r#"{"artist":"banksy"}"#),
        (&second_id, r#"{"artist":"hirst"}"#),
    ] {
        let request = Request::builder()
            .method("PUT")
            .uri(format!("/users/acme/files/{id}/metadata"))
            .body(Body::from(body))
            .unwrap();
        send(&app, request).await;
    }

    let uri = format!(
        "/users/acme/files?metadata=true&query={}",
        "%7B%22artist%22%3A%22banksy%22%7D"
    );
    let listing = body_json(send(&app, get(&uri)).await).await;
    let entries = listing.as_array().unwrap();

    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["fileIdentifier"], Value::String(first_id));
    assert_eq!(entries[0]["metadata"]["artist"], Value::String("banksy".into()));
}

#[tokio::test]
async fn short_urls_resolve_and_die_with_the_record() {
    let (app, _dir) = build_app().await;
    let payload = text_payload();
    let id = digest(&payload);
    let uri = format!("/users/acme/files/{id}");
    send(&app, put(&uri, payload.clone())).await;

    // Serving the file issues (or echoes) an alias.
    let response = send(&app, get(&uri)).await;
    let short_url = response
        .headers()
        .get("x-imbo-shorturl")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap();
    assert!(short_url.starts_with("/s/"));

    // Same tuple, same alias.
    let response = send(&app, get(&uri)).await;
    assert_eq!(
        response
            .headers()
            .get("x-imbo-shorturl")
            .and_then(|v| v.to_str().ok()),
        Some(short_url.as_str())
    );

    // The alias serves the same bytes.
    let response = send(&app, get(&short_url)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await, payload);

    // Deleting the record cascades over its aliases.
    send(&app, delete(&uri)).await;
    let response = send(&app, get(&short_url)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn health_endpoints_respond() {
    let (app, _dir) = build_app().await;

    let response = send(&app, get("/healthz")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = send(&app, get("/readyz")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], Value::String("ok".into()));
}
