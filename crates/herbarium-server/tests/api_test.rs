//! HTTP-level tests for the herbarium API

use std::io::Cursor;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use herbarium_server::seed::ensure_admin;
use herbarium_server::{create_router, AppState, ServerConfig};
use serde_json::{json, Value};
use tower::ServiceExt; // for `oneshot`

const BOUNDARY: &str = "herbarium-test-boundary";

/// Router plus its state, backed by a temporary database and upload dir.
async fn create_test_app() -> (Router, AppState, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let config = ServerConfig {
        database_path: dir.path().join("herbarium.db"),
        upload_dir: dir.path().join("uploads"),
        token_signing_seed: Some([7u8; 32]),
        ..ServerConfig::default()
    };

    let state = AppState::new(config).await.unwrap();
    ensure_admin(&state.db, &state.config).await.unwrap();

    (create_router(state.clone()), state, dir)
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, json)
}

fn json_request(method: &str, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

fn delete(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method("DELETE")
        .uri(uri)
        .header("authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap()
}

enum Part<'a> {
    Text(&'a str, &'a str),
    File {
        filename: &'a str,
        content_type: &'a str,
        data: Vec<u8>,
    },
}

fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match part {
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n")
                        .as_bytes(),
                );
            }
            Part::File {
                filename,
                content_type,
                data,
            } => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"images\"; filename=\"{filename}\"\r\n\
                         Content-Type: {content_type}\r\n\r\n"
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(data);
                body.extend_from_slice(b"\r\n");
            }
        }
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn multipart(method: &str, uri: &str, token: &str, parts: &[Part<'_>]) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", format!("Bearer {token}"))
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(multipart_body(parts)))
        .unwrap()
}

fn png(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, 120])
    });
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, image::ImageFormat::Png).unwrap();
    buf.into_inner()
}

fn png_part(filename: &str) -> Part<'_> {
    Part::File {
        filename,
        content_type: "image/png",
        data: png(80, 60),
    }
}

const INGA_TAXONOMY: &str =
    r#"{"family":"Fabaceae","genus":"Inga","scientificName":"Inga edulis"}"#;

async fn login(app: &Router, email: &str, password: &str) -> String {
    let (status, json) = send(
        app,
        json_request(
            "POST",
            "/api/auth/login",
            None,
            json!({"email": email, "password": password}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "login failed: {json}");
    json["data"]["token"].as_str().unwrap().to_string()
}

async fn admin_token(app: &Router) -> String {
    login(app, "admin@utpl.edu.ec", "Admin123!").await
}

async fn create_inga(app: &Router, token: &str, extra: Vec<Part<'_>>) -> (StatusCode, Value) {
    let mut parts = vec![
        Part::Text("taxonomy", INGA_TAXONOMY),
        Part::Text("catalogNumber", "HUTPL-0001"),
        Part::Text("locality", "Loja, San Cayetano"),
    ];
    parts.extend(extra);
    send(app, multipart("POST", "/api/plants", token, &parts)).await
}

#[tokio::test]
async fn test_health_check() {
    let (app, _state, _dir) = create_test_app().await;

    let (status, json) = send(&app, get("/api/health", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "OK");
    assert!(json["timestamp"].is_string());
}

#[tokio::test]
async fn test_unknown_route() {
    let (app, _state, _dir) = create_test_app().await;

    let (status, json) = send(&app, get("/api/nothing-here", None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["success"], false);
}

#[tokio::test]
async fn test_register_login_profile() {
    let (app, _state, _dir) = create_test_app().await;

    let (status, json) = send(
        &app,
        json_request(
            "POST",
            "/api/auth/register",
            None,
            json!({"name": "Ana Quizhpe", "email": "Ana@UTPL.edu.ec", "password": "herbario2024"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["data"]["user"]["role"], "CATALOGER");
    assert_eq!(json["data"]["user"]["email"], "ana@utpl.edu.ec");
    assert!(json["data"]["user"].get("passwordHash").is_none());

    let token = login(&app, "ana@utpl.edu.ec", "herbario2024").await;
    let (status, json) = send(&app, get("/api/auth/profile", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["user"]["name"], "Ana Quizhpe");

    // non-admins cannot list users
    let (status, json) = send(&app, get("/api/auth/users", Some(&token))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["error"], "FORBIDDEN");

    let admin = admin_token(&app).await;
    let (status, json) = send(&app, get("/api/auth/users", Some(&admin))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["users"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_register_rejections() {
    let (app, _state, _dir) = create_test_app().await;

    let (status, _) = send(
        &app,
        json_request(
            "POST",
            "/api/auth/register",
            None,
            json!({"name": "Root", "email": "root@utpl.edu.ec", "password": "longenough", "role": "ADMIN"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, json) = send(
        &app,
        json_request(
            "POST",
            "/api/auth/register",
            None,
            json!({"name": "Dup", "email": "admin@utpl.edu.ec", "password": "longenough"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["error"], "DUPLICATE_KEY");
}

#[tokio::test]
async fn test_bad_credentials() {
    let (app, _state, _dir) = create_test_app().await;

    let (status, json) = send(
        &app,
        json_request(
            "POST",
            "/api/auth/login",
            None,
            json!({"email": "admin@utpl.edu.ec", "password": "wrong-password"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["error"], "UNAUTHORIZED");
}

#[tokio::test]
async fn test_protected_routes_require_token() {
    let (app, _state, _dir) = create_test_app().await;

    let (status, json) = send(&app, get("/api/plants", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["error"], "UNAUTHORIZED");

    let (status, _) = send(&app, get("/api/plants", Some("garbage"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_create_without_images() {
    let (app, _state, _dir) = create_test_app().await;
    let token = admin_token(&app).await;

    let (status, json) = create_inga(&app, &token, Vec::new()).await;
    assert_eq!(status, StatusCode::CREATED, "{json}");

    let plant = &json["data"]["plant"];
    assert!(!plant["occurrenceID"].as_str().unwrap().is_empty());
    assert_eq!(plant["taxonomy"]["kingdom"], "Plantae");
    assert_eq!(plant["images"].as_array().unwrap().len(), 0);
    assert_eq!(json["data"]["imagesUploaded"], 0);
    assert!(json["data"]["qrCode"]
        .as_str()
        .unwrap()
        .starts_with("data:image/png;base64,"));
}

#[tokio::test]
async fn test_create_with_images_serves_variants() {
    let (app, _state, dir) = create_test_app().await;
    let token = admin_token(&app).await;

    let (status, json) = create_inga(
        &app,
        &token,
        vec![
            png_part("haz.png"),
            png_part("enves.png"),
            Part::Text("imageDescriptions", "Haz"),
            Part::Text("imageDescriptions", "Envés"),
        ],
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{json}");
    assert_eq!(json["data"]["imagesUploaded"], 2);

    let images = json["data"]["plant"]["images"].as_array().unwrap();
    assert_eq!(images[0]["originalName"], "haz.png");
    assert_eq!(images[1]["description"], "Envés");
    assert_eq!(images[0]["mimetype"], "image/webp");

    let files = std::fs::read_dir(dir.path().join("uploads/images")).unwrap().count();
    assert_eq!(files, 4);

    let url = images[0]["url"].as_str().unwrap();
    let response = app.clone().oneshot(get(url, None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_pdf_in_batch_rejects_everything() {
    let (app, _state, dir) = create_test_app().await;
    let token = admin_token(&app).await;

    let (status, json) = create_inga(
        &app,
        &token,
        vec![
            png_part("a.png"),
            png_part("b.png"),
            Part::File {
                filename: "permit.pdf",
                content_type: "application/pdf",
                data: b"%PDF-1.4 not an image".to_vec(),
            },
            png_part("c.png"),
            png_part("d.png"),
        ],
    )
    .await;
    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert_eq!(json["error"], "UNSUPPORTED_MEDIA_TYPE");

    let files = std::fs::read_dir(dir.path().join("uploads/images")).unwrap().count();
    assert_eq!(files, 0);

    let (_, json) = send(&app, get("/api/plants", Some(&token))).await;
    assert_eq!(json["pagination"]["total"], 0);
}

#[tokio::test]
async fn test_corrupt_image_is_unprocessable() {
    let (app, _state, _dir) = create_test_app().await;
    let token = admin_token(&app).await;

    let (status, json) = create_inga(
        &app,
        &token,
        vec![Part::File {
            filename: "broken.png",
            content_type: "image/png",
            data: b"definitely not a png".to_vec(),
        }],
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["error"], "CORRUPT_IMAGE");
}

#[tokio::test]
async fn test_malformed_taxonomy_is_validation_error() {
    let (app, _state, _dir) = create_test_app().await;
    let token = admin_token(&app).await;

    let (status, json) = send(
        &app,
        multipart(
            "POST",
            "/api/plants",
            &token,
            &[Part::Text("taxonomy", "{family: Fabaceae")],
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_viewer_cannot_create() {
    let (app, _state, _dir) = create_test_app().await;

    send(
        &app,
        json_request(
            "POST",
            "/api/auth/register",
            None,
            json!({"name": "Visitante", "email": "viewer@utpl.edu.ec", "password": "longenough", "role": "VIEWER"}),
        ),
    )
    .await;
    let token = login(&app, "viewer@utpl.edu.ec", "longenough").await;

    let (status, json) = create_inga(&app, &token, Vec::new()).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["error"], "FORBIDDEN");

    // reads are open to every role
    let (status, _) = send(&app, get("/api/plants", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_update_and_image_management() {
    let (app, _state, _dir) = create_test_app().await;
    let token = admin_token(&app).await;

    let (_, created) = create_inga(&app, &token, vec![png_part("first.png")]).await;
    let id = created["data"]["plant"]["id"].as_str().unwrap().to_string();
    let occurrence_id = created["data"]["plant"]["occurrenceID"].clone();

    let (status, json) = send(
        &app,
        json_request(
            "PUT",
            &format!("/api/plants/{id}"),
            Some(&token),
            json!({"occurrenceID": "CHANGED", "habitat": "Bosque montano"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{json}");
    assert_eq!(json["data"]["plant"]["occurrenceID"], occurrence_id);
    assert_eq!(json["data"]["plant"]["habitat"], "Bosque montano");

    let (status, json) = send(
        &app,
        multipart(
            "POST",
            &format!("/api/plants/{id}/images"),
            &token,
            &[png_part("second.png"), png_part("third.png")],
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{json}");
    assert_eq!(json["data"]["total"], 3);

    let (status, json) = send(
        &app,
        multipart(
            "POST",
            &format!("/api/plants/{id}/images"),
            &token,
            &[Part::Text("note", "no files")],
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "NO_FILES_PROVIDED");

    let first_image = created["data"]["plant"]["images"][0]["id"]
        .as_str()
        .unwrap()
        .to_string();
    let (status, json) = send(
        &app,
        delete(&format!("/api/plants/{id}/images/{first_image}"), &token),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["total"], 2);
}

#[tokio::test]
async fn test_add_images_to_missing_record() {
    let (app, _state, _dir) = create_test_app().await;
    let token = admin_token(&app).await;

    let (status, json) = send(
        &app,
        multipart(
            "POST",
            &format!("/api/plants/{}/images", uuid::Uuid::new_v4()),
            &token,
            &[Part::Text("note", "no files")],
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND, "{json}");
    assert_eq!(json["error"], "NOT_FOUND");
}

#[tokio::test]
async fn test_delete_missing_image() {
    let (app, _state, _dir) = create_test_app().await;
    let token = admin_token(&app).await;

    let (_, created) = create_inga(&app, &token, vec![png_part("only.png")]).await;
    let id = created["data"]["plant"]["id"].as_str().unwrap().to_string();

    let (status, json) = send(
        &app,
        delete(
            &format!("/api/plants/{id}/images/00000000-0000-0000-0000-000000000000"),
            &token,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"], "IMAGE_NOT_FOUND");

    let (_, json) = send(&app, get(&format!("/api/plants/{id}"), Some(&token))).await;
    assert_eq!(json["data"]["plant"]["images"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_soft_deleted_records_are_hidden() {
    let (app, _state, _dir) = create_test_app().await;
    let token = admin_token(&app).await;

    let (_, created) = create_inga(&app, &token, Vec::new()).await;
    let id = created["data"]["plant"]["id"].as_str().unwrap().to_string();
    let occurrence_id = created["data"]["plant"]["occurrenceID"]
        .as_str()
        .unwrap()
        .to_string();

    let (status, json) = send(
        &app,
        get(&format!("/public/specimen/{occurrence_id}"), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["publicAccess"], true);
    assert!(json["data"]["specimen"].get("createdBy").is_none());

    let (status, _) = send(&app, delete(&format!("/api/plants/{id}"), &token)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&app, get(&format!("/api/plants/{id}"), Some(&token))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &app,
        get(&format!("/public/plants/{occurrence_id}"), None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, json) = send(&app, get("/api/plants", Some(&token))).await;
    assert_eq!(json["pagination"]["total"], 0);

    let (_, json) = send(&app, get("/public/stats", None)).await;
    assert_eq!(json["data"]["statistics"]["totalSpecimens"], 0);
}

#[tokio::test]
async fn test_public_list_clamps_limit() {
    let (app, state, _dir) = create_test_app().await;

    for i in 0..3 {
        let Value::Object(fields) = json!({
            "catalogNumber": format!("HUTPL-{i}"),
            "taxonomy": {"family": "Rosaceae", "genus": "Rubus", "scientificName": "Rubus idaeus"},
        }) else {
            unreachable!()
        };
        state.catalog.create(fields, Vec::new(), None).await.unwrap();
    }

    let (status, json) = send(&app, get("/public/specimens?limit=200", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["pagination"]["limit"], 50);
    assert_eq!(json["pagination"]["total"], 3);
    assert_eq!(json["pagination"]["totalPages"], 1);
    assert_eq!(json["data"]["specimens"].as_array().unwrap().len(), 3);

    let (_, json) = send(&app, get("/public/specimens?family=rosa&limit=2&page=2", None)).await;
    assert_eq!(json["data"]["specimens"].as_array().unwrap().len(), 1);
    assert_eq!(json["pagination"]["totalPages"], 2);

    let (_, json) = send(&app, get("/public/families", None)).await;
    assert_eq!(json["data"]["families"][0]["_id"], "Rosaceae");
    assert_eq!(json["data"]["families"][0]["count"], 3);
}
