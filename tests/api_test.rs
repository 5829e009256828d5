//! Router-level tests: requests go through the full axum stack via `oneshot`
//! against a temporary database.

use std::sync::Arc;

use abode::config::{Config, Environment};
use abode::db;
use abode::db::models::ImageRef;
use abode::routes;
use abode::state::AppState;
use abode::storage::{AssetError, AssetService};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use bytes::Bytes;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

const TEST_COST: u32 = 4;
const BOUNDARY: &str = "abode-test-boundary";

fn test_config(dir: &std::path::Path) -> Config {
    let mut config = Config::default();
    config.resolve_paths(dir);
    config.auth.bcrypt_cost = TEST_COST;
    config
}

fn test_app() -> (Router, TempDir) {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    let pool = db::create_pool(&config.db_path()).unwrap();
    db::run_migrations(&pool).unwrap();
    (routes::app(AppState::new(pool, config).unwrap()), tmp)
}

/// Asset service that stores nothing and whose release always fails.
struct BrokenStorage;

#[async_trait]
impl AssetService for BrokenStorage {
    async fn upload(&self, _data: Bytes, _content_type: &str) -> Result<ImageRef, AssetError> {
        let asset_id = format!("{}.png", uuid::Uuid::now_v7());
        Ok(ImageRef {
            url: format!("/uploads/{asset_id}"),
            asset_id,
        })
    }

    async fn release(&self, _asset_id: &str) -> Result<(), AssetError> {
        Err(AssetError::Unavailable("bucket offline".into()))
    }
}

fn app_with_broken_storage(environment: Environment) -> (Router, TempDir) {
    let tmp = TempDir::new().unwrap();
    let mut config = test_config(tmp.path());
    config.server.environment = environment;
    let pool = db::create_pool(&config.db_path()).unwrap();
    db::run_migrations(&pool).unwrap();
    let state = AppState::with_assets(pool, config, Arc::new(BrokenStorage)).unwrap();
    (routes::app(state), tmp)
}

async fn call(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

async fn register(app: &Router, name: &str, email: &str) -> String {
    let (status, body) = call(
        app,
        "POST",
        "/api/v1/users/register",
        None,
        Some(json!({
            "name": name,
            "email": email,
            "phoneNumber": "+1 555 010 2030",
            "password": "correct horse",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["token"].as_str().unwrap().to_string()
}

/// POST `count` PNG parts to the upload route; returns the stored image refs.
async fn upload(app: &Router, token: &str, count: usize) -> Value {
    let mut body = Vec::new();
    for n in 0..count {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"images\"; \
                 filename=\"{n}.png\"\r\nContent-Type: image/png\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(b"\x89PNG\r\n\x1a\nfake\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/houses/multiple")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: Value = serde_json::from_slice(&bytes).unwrap();
    json["results"].clone()
}

fn sunny_flat(images: Value) -> Value {
    json!({
        "title": "Sunny Flat",
        "description": "Bright flat near the park",
        "address": "1 Main St",
        "price": 500,
        "houseType": "apartment",
        "numberOfRooms": 2,
        "image": images,
    })
}

fn titled(title: &str, images: Value) -> Value {
    let mut listing = sunny_flat(images);
    listing["title"] = json!(title);
    listing
}

#[tokio::test]
async fn sunny_flat_lifecycle() {
    let (app, _tmp) = test_app();
    let alice = register(&app, "Alice", "alice@example.com").await;
    let bob = register(&app, "Bob", "bob@example.com").await;

    let images = upload(&app, &alice, 1).await;
    let (status, created) =
        call(&app, "POST", "/api/v1/houses", Some(&alice), Some(sunny_flat(images.clone()))).await;
    assert_eq!(status, StatusCode::CREATED, "{created}");
    let id = created["data"]["id"].as_str().unwrap().to_string();
    assert_eq!(created["data"]["slug"], "sunny-flat");
    assert_eq!(created["data"]["user"]["name"], "Alice");
    assert_eq!(created["data"]["category"]["name"], "apartment");
    assert_eq!(created["data"]["image"], images);

    let (status, found) = call(
        &app,
        "GET",
        "/api/v1/houses/search?minPrice=400&maxPrice=600&rooms=2&houseType=apartment",
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(found["success"], true);
    assert_eq!(found["total"], 1);
    assert_eq!(found["totalPages"], 1);
    assert_eq!(found["currentPage"], 1);
    assert_eq!(found["data"][0]["id"], id.as_str());

    let (_, villas) = call(&app, "GET", "/api/v1/houses/search?houseType=villa", None, None).await;
    assert_eq!(villas["data"], json!([]));
    assert_eq!(villas["total"], 0);

    let (status, body) = call(
        &app,
        "PUT",
        &format!("/api/v1/houses/{id}"),
        Some(&bob),
        Some(json!({ "price": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["kind"], "AuthorizationError");

    let (status, _) = call(&app, "DELETE", &format!("/api/v1/houses/{id}"), Some(&alice), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = call(&app, "GET", "/api/v1/houses/sunny-flat", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["kind"], "NotFoundError");
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn reads_by_id_slug_and_category() {
    let (app, _tmp) = test_app();
    let alice = register(&app, "Alice", "alice@example.com").await;
    let images = upload(&app, &alice, 1).await;
    let (_, created) = call(&app, "POST", "/api/v1/houses", Some(&alice), Some(sunny_flat(images))).await;
    let id = created["data"]["id"].as_str().unwrap();
    let category_id = created["data"]["category"]["id"].as_str().unwrap();

    let (status, by_id) = call(&app, "GET", &format!("/api/v1/houses/id/{id}"), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(by_id["data"]["title"], "Sunny Flat");

    let (status, by_slug) = call(&app, "GET", "/api/v1/houses/sunny-flat", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(by_slug["data"]["id"], id);

    let (status, by_category) = call(
        &app,
        "GET",
        &format!("/api/v1/houses/category/{category_id}"),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(by_category["count"], 1);

    let (status, _) = call(&app, "GET", "/api/v1/houses/category/unknown", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, categories) = call(&app, "GET", "/api/v1/categories", None, None).await;
    assert_eq!(categories["data"][0]["name"], "apartment");
}

#[tokio::test]
async fn duplicate_title_conflicts() {
    let (app, _tmp) = test_app();
    let alice = register(&app, "Alice", "alice@example.com").await;
    let images = upload(&app, &alice, 2).await;
    let (status, _) = call(
        &app,
        "POST",
        "/api/v1/houses",
        Some(&alice),
        Some(sunny_flat(json!([images[0]]))),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = call(
        &app,
        "POST",
        "/api/v1/houses",
        Some(&alice),
        Some(sunny_flat(json!([images[1]]))),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "ConflictError");
}

#[tokio::test]
async fn missing_fields_are_listed() {
    let (app, _tmp) = test_app();
    let alice = register(&app, "Alice", "alice@example.com").await;

    let (status, body) = call(
        &app,
        "POST",
        "/api/v1/houses",
        Some(&alice),
        Some(json!({ "title": "Lonely", "numberOfRooms": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["message"],
        "Missing required fields: description, address, price, houseType, image"
    );
}

#[tokio::test]
async fn mutations_require_a_token() {
    let (app, _tmp) = test_app();
    let listing = sunny_flat(json!([{ "assetId": "a.jpg", "url": "/uploads/a.jpg" }]));

    let (status, body) = call(&app, "POST", "/api/v1/houses", None, Some(listing.clone())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["kind"], "AuthenticationError");
    assert_eq!(body["message"], "Authorization required");

    let bogus = "0".repeat(64);
    let (status, body) = call(&app, "POST", "/api/v1/houses", Some(&bogus), Some(listing)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Invalid token");
}

#[tokio::test]
async fn quoted_bearer_tokens_are_accepted() {
    let (app, _tmp) = test_app();
    let alice = register(&app, "Alice", "alice@example.com").await;
    let quoted = format!("\"{alice}\"");
    let images = upload(&app, &alice, 1).await;

    let (status, _) = call(&app, "POST", "/api/v1/houses", Some(&quoted), Some(sunny_flat(images))).await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn pagination_is_validated() {
    let (app, _tmp) = test_app();

    for uri in [
        "/api/v1/houses/search?page=0",
        "/api/v1/houses/search?limit=0",
        "/api/v1/houses?page=0",
        "/api/v1/houses/search?minPrice=cheap",
    ] {
        let (status, body) = call(&app, "GET", uri, None, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(body["kind"], "ValidationError", "{uri}");
    }
}

#[tokio::test]
async fn page_past_the_end_is_empty_with_totals() {
    let (app, _tmp) = test_app();
    let alice = register(&app, "Alice", "alice@example.com").await;
    let images = upload(&app, &alice, 3).await;
    for (n, title) in ["One", "Two", "Three"].into_iter().enumerate() {
        let listing = titled(title, json!([images[n]]));
        let (status, _) = call(&app, "POST", "/api/v1/houses", Some(&alice), Some(listing)).await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, body) = call(&app, "GET", "/api/v1/houses?page=4&limit=2", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!([]));
    assert_eq!(body["total"], 3);
    assert_eq!(body["totalPages"], 2);
    assert_eq!(body["currentPage"], 4);
}

#[tokio::test]
async fn login_and_profile() {
    let (app, _tmp) = test_app();
    register(&app, "Alice", "alice@example.com").await;

    let (status, session) = call(
        &app,
        "POST",
        "/api/v1/users/login",
        None,
        Some(json!({ "email": "ALICE@example.com", "password": "correct horse" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(session["user"].get("passwordHash").is_none());
    let user_id = session["user"]["id"].as_str().unwrap();

    let (status, profile) = call(&app, "GET", &format!("/api/v1/users/{user_id}"), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(profile["data"]["email"], "alice@example.com");

    let (status, body) = call(
        &app,
        "POST",
        "/api/v1/users/login",
        None,
        Some(json!({ "email": "alice@example.com", "password": "wrong horse" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Invalid email or password");
}

#[tokio::test]
async fn duplicate_registration_conflicts() {
    let (app, _tmp) = test_app();
    register(&app, "Alice", "alice@example.com").await;

    let (status, body) = call(
        &app,
        "POST",
        "/api/v1/users/register",
        None,
        Some(json!({
            "name": "Alice Again",
            "email": "Alice@Example.com",
            "phoneNumber": "+1 555 010 2030",
            "password": "correct horse",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "ConflictError");
}

#[tokio::test]
async fn malformed_json_is_a_validation_error() {
    let (app, _tmp) = test_app();
    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/users/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn asset_failure_aborts_delete() {
    let (app, _tmp) = app_with_broken_storage(Environment::Production);
    let alice = register(&app, "Alice", "alice@example.com").await;
    let images = upload(&app, &alice, 1).await;
    let (_, created) = call(&app, "POST", "/api/v1/houses", Some(&alice), Some(sunny_flat(images))).await;
    let id = created["data"]["id"].as_str().unwrap();

    let (status, body) = call(&app, "DELETE", &format!("/api/v1/houses/{id}"), Some(&alice), None).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["kind"], "AssetServiceError");
    assert!(body.get("detail").is_none());

    let (status, _) = call(&app, "GET", &format!("/api/v1/houses/id/{id}"), None, None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn development_responses_carry_error_detail() {
    let (app, _tmp) = app_with_broken_storage(Environment::Development);
    let alice = register(&app, "Alice", "alice@example.com").await;
    let images = upload(&app, &alice, 1).await;
    let (_, created) = call(&app, "POST", "/api/v1/houses", Some(&alice), Some(sunny_flat(images))).await;
    let id = created["data"]["id"].as_str().unwrap();

    let (status, body) = call(&app, "DELETE", &format!("/api/v1/houses/{id}"), Some(&alice), None).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["detail"].as_str().unwrap().contains("bucket offline"));
}

#[tokio::test]
async fn unknown_routes_use_the_error_shape() {
    let (app, _tmp) = test_app();
    let (status, body) = call(&app, "GET", "/api/v2/nothing", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["kind"], "NotFoundError");
}

#[tokio::test]
async fn asset_ids_that_leave_the_upload_directory_are_rejected() {
    let (app, _tmp) = test_app();
    let alice = register(&app, "Alice", "alice@example.com").await;

    let listing = sunny_flat(json!([{ "assetId": "../x.jpg", "url": "/uploads/../x.jpg" }]));
    let (status, body) = call(&app, "POST", "/api/v1/houses", Some(&alice), Some(listing)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "ValidationError");
}

#[tokio::test]
async fn listings_only_take_the_callers_own_uploads() {
    let (app, _tmp) = test_app();
    let alice = register(&app, "Alice", "alice@example.com").await;
    let bob = register(&app, "Bob", "bob@example.com").await;
    let images = upload(&app, &alice, 1).await;
    let url = images[0]["url"].as_str().unwrap().to_string();

    let (status, _) = call(&app, "POST", "/api/v1/houses", Some(&alice), Some(sunny_flat(images.clone()))).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = call(
        &app,
        "POST",
        "/api/v1/houses",
        Some(&bob),
        Some(titled("Bob's Flat", images)),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["kind"], "AuthorizationError");

    // Alice's file is still there
    let request = Request::builder().uri(url).body(Body::empty()).unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
