mod common;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use std::sync::Arc;

use serde_json::{json, Value};
use tower::ServiceExt;

use issue_tracker::{build_router, services::repository::Repositories, utils::files::LocalFileUtility};
use common::{
    multipart_body, multipart_content_type, setup_test_app, setup_test_app_with, TestApp, TEST_PASSWORD, TEST_USERNAME,
};

fn create_test_router(app: &TestApp) -> Router {
    build_router(app.state.clone()).expect("Failed to build router")
}

fn json_request(method: Method, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get_request(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(Method::GET).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::empty()).unwrap()
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, value)
}

async fn create_issue(router: &Router, app: &TestApp, title: &str) -> String {
    let (status, body) = send(
        router,
        json_request(Method::POST, "/api/v1/issues", Some(&app.token), json!({ "title": title })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    body["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_login_returns_token_and_cookie() {
    let app = setup_test_app().await;
    let router = create_test_router(&app);

    let request = json_request(
        Method::POST,
        "/api/v1/login",
        None,
        json!({ "username": TEST_USERNAME, "password": TEST_PASSWORD }),
    );
    let response = router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let cookie = response.headers().get(header::SET_COOKIE).unwrap().to_str().unwrap().to_string();
    assert!(cookie.starts_with("auth_token="));
    assert!(cookie.contains("HttpOnly"));

    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["message"], "Authenticated");
    let token = body["token"].as_str().unwrap();
    assert!(!token.is_empty());

    let (status, _) = send(&router, get_request("/api/v1/issues", Some(token))).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_login_with_wrong_password() {
    let app = setup_test_app().await;
    let router = create_test_router(&app);

    let (status, body) = send(
        &router,
        json_request(
            Method::POST,
            "/api/v1/login",
            None,
            json!({ "username": TEST_USERNAME, "password": "wrong" }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["message"], "Invalid username or password");
    assert_eq!(body["error"]["code"], 401);
}

#[tokio::test]
async fn test_missing_required_field_is_reported() {
    let app = setup_test_app().await;
    let router = create_test_router(&app);

    let (status, body) = send(
        &router,
        json_request(Method::POST, "/api/v1/login", None, json!({ "username": TEST_USERNAME })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["name"], "ValidationError");
    let details = body["error"]["details"].as_array().unwrap();
    assert_eq!(details.len(), 1);
    assert_eq!(details[0]["section"], "body");
    assert_eq!(details[0]["field"], "password");
    assert_eq!(details[0]["kind"], "required");
}

#[tokio::test]
async fn test_requests_without_token_are_rejected() {
    let app = setup_test_app().await;
    let router = create_test_router(&app);

    let (status, body) = send(&router, get_request("/api/v1/issues", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["name"], "UnauthorizedError");

    let (status, _) = send(&router, get_request("/api/v1/issues", Some("not-a-jwt"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_token_cookie_is_accepted() {
    let app = setup_test_app().await;
    let router = create_test_router(&app);

    let request = Request::builder()
        .method(Method::GET)
        .uri("/api/v1/issues")
        .header(header::COOKIE, format!("theme=dark; auth_token={}", app.token))
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&router, request).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let app = setup_test_app().await;
    let router = create_test_router(&app);

    let (status, body) = send(&router, get_request("/api/v1/nothing-here", None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["message"], "Endpoint not found (GET /api/v1/nothing-here)");
    assert_eq!(body["error"]["name"], "EndpointNotFoundError");
}

#[tokio::test]
async fn test_unregistered_method_on_known_path_is_404() {
    let app = setup_test_app().await;
    let router = create_test_router(&app);

    let (status, body) = send(
        &router,
        json_request(Method::PATCH, "/api/v1/issues", Some(&app.token), json!({ "title": "patched" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["message"], "Endpoint not found (PATCH /api/v1/issues)");
    assert_eq!(body["error"]["name"], "EndpointNotFoundError");

    let download = format!("/api/v1/documents/{}/download", mongodb::bson::oid::ObjectId::new().to_hex());
    let (status, body) = send(&router, json_request(Method::POST, &download, Some(&app.token), json!({}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["message"], format!("Endpoint not found (POST {})", download));
}

#[tokio::test]
async fn test_issue_listing_is_paginated_in_creation_order() {
    let app = setup_test_app().await;
    let router = create_test_router(&app);

    create_issue(&router, &app, "issue1").await;
    create_issue(&router, &app, "issue2").await;

    let (status, body) = send(&router, get_request("/api/v1/issues?page=1&page_size=2", Some(&app.token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 2);
    assert_eq!(body["page"], 1);
    assert_eq!(body["pages"], 1);
    assert_eq!(body["limit"], 2);
    assert_eq!(body["docs"][0]["title"], "issue1");
    assert_eq!(body["docs"][1]["title"], "issue2");
    assert_eq!(body["docs"][0]["author"]["username"], TEST_USERNAME);

    // query keys are normalised before validation
    let (status, body) = send(&router, get_request("/api/v1/issues?Page-Size=1&page=2", Some(&app.token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["pages"], 2);
    assert_eq!(body["docs"][0]["title"], "issue2");
}

#[tokio::test]
async fn test_non_positive_page_size_is_rejected() {
    let app = setup_test_app().await;
    let router = create_test_router(&app);

    let (status, body) = send(&router, get_request("/api/v1/issues?page_size=0", Some(&app.token))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["details"][0]["field"], "page_size");
    assert_eq!(body["error"]["details"][0]["kind"], "min");

    let (status, body) = send(&router, get_request("/api/v1/issues?page=first", Some(&app.token))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["details"][0]["kind"], "type");
}

#[tokio::test]
async fn test_issue_body_constraints() {
    let app = setup_test_app().await;
    let router = create_test_router(&app);

    let (status, body) = send(
        &router,
        json_request(
            Method::POST,
            "/api/v1/issues",
            Some(&app.token),
            json!({ "title": "x".repeat(201), "status": "someday" }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let kinds: Vec<_> = body["error"]["details"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| (d["field"].as_str().unwrap().to_string(), d["kind"].as_str().unwrap().to_string()))
        .collect();
    assert!(kinds.contains(&("title".to_string(), "max_length".to_string())));
    assert!(kinds.contains(&("status".to_string(), "enum".to_string())));
}

#[tokio::test]
async fn test_unknown_body_fields_are_stripped() {
    let app = setup_test_app().await;
    let router = create_test_router(&app);

    let (status, body) = send(
        &router,
        json_request(
            Method::POST,
            "/api/v1/issues",
            Some(&app.token),
            json!({ "title": "T", "content": "C", "status": "in_progress", "author": "someone" }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["title"], "T");
    assert_eq!(body["content"], "C");
    assert_eq!(body["status"], "in_progress");
    assert_eq!(body["author"]["id"], app.user.id.to_hex());
}

#[tokio::test]
async fn test_malformed_id_fails_pattern() {
    let app = setup_test_app().await;
    let router = create_test_router(&app);

    let (status, body) = send(&router, get_request("/api/v1/issues/not-an-id", Some(&app.token))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["details"][0]["section"], "params");
    assert_eq!(body["error"]["details"][0]["kind"], "pattern");
}

#[tokio::test]
async fn test_deleted_issue_stays_readable_but_locked() {
    let app = setup_test_app().await;
    let router = create_test_router(&app);
    let id = create_issue(&router, &app, "short lived").await;
    let uri = format!("/api/v1/issues/{}", id);

    let request = Request::builder()
        .method(Method::DELETE)
        .uri(&uri)
        .header(header::AUTHORIZATION, app.bearer())
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&router, request).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["deleted_at"].is_string());

    let (status, body) = send(&router, get_request(&uri, Some(&app.token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["title"], "short lived");

    let (status, body) = send(
        &router,
        json_request(
            Method::POST,
            &format!("{}/comments", uri),
            Some(&app.token),
            json!({ "content": "anyone?" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["name"], "IssueDeletedError");

    let (_, body) = send(&router, get_request("/api/v1/issues", Some(&app.token))).await;
    assert_eq!(body["total"], 0);
}

#[tokio::test]
async fn test_comments_round_trip() {
    let app = setup_test_app().await;
    let router = create_test_router(&app);
    let id = create_issue(&router, &app, "chatty").await;
    let uri = format!("/api/v1/issues/{}/comments", id);

    let (status, body) = send(
        &router,
        json_request(Method::POST, &uri, Some(&app.token), json!({ "content": "hello" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["issue"], id);

    let (status, body) = send(&router, get_request(&uri, Some(&app.token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);
    assert_eq!(body["docs"][0]["content"], "hello");
    assert_eq!(body["docs"][0]["author"]["username"], TEST_USERNAME);
}

#[tokio::test]
async fn test_upload_and_download_document() {
    let app = setup_test_app().await;
    let router = create_test_router(&app);
    let id = create_issue(&router, &app, "with files").await;

    let request = Request::builder()
        .method(Method::POST)
        .uri(format!("/api/v1/issues/{}/documents", id))
        .header(header::AUTHORIZATION, app.bearer())
        .header(header::CONTENT_TYPE, multipart_content_type())
        .body(Body::from(multipart_body(&[("file", Some("diagram.png"), "not really a png")])))
        .unwrap();
    let (status, body) = send(&router, request).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["filename"], "diagram.png");
    assert_eq!(body["extension"], "png");
    let document_id = body["id"].as_str().unwrap().to_string();

    let (status, body) = send(
        &router,
        get_request(&format!("/api/v1/issues/{}/documents", id), Some(&app.token)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);
    assert_eq!(body["docs"][0]["id"], document_id);

    let response = router
        .clone()
        .oneshot(get_request(
            &format!("/api/v1/documents/{}/download", document_id),
            Some(&app.token),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_DISPOSITION).unwrap(),
        "attachment; filename=\"diagram.png\""
    );
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&body[..], b"not really a png");
}

#[tokio::test]
async fn test_upload_without_files_is_rejected() {
    let app = setup_test_app().await;
    let router = create_test_router(&app);
    let id = create_issue(&router, &app, "empty upload").await;

    let request = Request::builder()
        .method(Method::POST)
        .uri(format!("/api/v1/issues/{}/documents", id))
        .header(header::AUTHORIZATION, app.bearer())
        .header(header::CONTENT_TYPE, multipart_content_type())
        .body(Body::from(multipart_body(&[("note", None, "forgot the file")])))
        .unwrap();
    let (status, body) = send(&router, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["message"], "No files were uploaded");
    assert_eq!(body["error"]["name"], "UploadError");
}

#[tokio::test]
async fn test_download_of_unknown_document_is_404() {
    let app = setup_test_app().await;
    let router = create_test_router(&app);

    let (status, body) = send(
        &router,
        get_request(
            &format!("/api/v1/documents/{}/download", mongodb::bson::oid::ObjectId::new().to_hex()),
            Some(&app.token),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["name"], "DocumentNotFoundError");
}

#[tokio::test]
async fn test_openapi_document_lists_routed_endpoints() {
    let app = setup_test_app().await;
    let router = create_test_router(&app);

    let (status, body) = send(&router, get_request("/docs/openapi.json", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["servers"][0]["url"], "/api/v1");

    let issue = &body["paths"]["/issues/{id}"];
    assert!(issue["get"].is_object());
    assert!(issue["put"].is_object());
    assert!(issue["delete"].is_object());

    let listing = &body["paths"]["/issues"]["get"];
    let parameters: Vec<_> = listing["parameters"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["name"].as_str().unwrap().to_string())
        .collect();
    assert!(parameters.contains(&"page".to_string()));
    assert!(parameters.contains(&"page_size".to_string()));
    assert!(parameters.contains(&"Authorization".to_string()));

    assert!(body["paths"]["/login"]["post"]["requestBody"].is_object());

    let download = &body["paths"]["/documents/{id}/download"]["get"]["responses"]["200"];
    assert!(download["content"]["application/octet-stream"].is_object());
}

#[tokio::test]
async fn test_disabled_validation_skips_schema_checks() {
    let app = setup_test_app_with(
        |config| config.server.enable_validation = false,
        Repositories::memory(),
        Arc::new(LocalFileUtility),
    )
    .await;
    let router = create_test_router(&app);

    let title = "x".repeat(201);
    let (status, body) = send(
        &router,
        json_request(Method::POST, "/api/v1/issues", Some(&app.token), json!({ "title": title })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["title"], title);

    // authentication still applies
    let (status, _) = send(&router, get_request("/api/v1/issues", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_server_errors_are_masked_when_configured() {
    let blocker = tempfile::NamedTempFile::new().unwrap();
    let uploads = blocker.path().join("uploads");
    let app = setup_test_app_with(
        |config| {
            config.server.internal_errors = false;
            config.server.stack_traces = false;
            config.uploads.directory = uploads.to_string_lossy().into_owned();
        },
        Repositories::memory(),
        Arc::new(LocalFileUtility),
    )
    .await;
    let router = create_test_router(&app);
    let id = create_issue(&router, &app, "no room for uploads").await;

    let request = Request::builder()
        .method(Method::POST)
        .uri(format!("/api/v1/issues/{}/documents", id))
        .header(header::AUTHORIZATION, app.bearer())
        .header(header::CONTENT_TYPE, multipart_content_type())
        .body(Body::from(multipart_body(&[("file", Some("a.txt"), "a")])))
        .unwrap();
    let (status, body) = send(&router, request).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"]["message"], "Internal server error");
    assert_eq!(body["error"]["code"], 500);
    assert!(body["error"].get("stack").is_none());

    // client errors keep their message but lose the trace
    let (status, body) = send(&router, get_request("/api/v1/nothing-here", None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["message"], "Endpoint not found (GET /api/v1/nothing-here)");
    assert!(body["error"].get("stack").is_none());
}
