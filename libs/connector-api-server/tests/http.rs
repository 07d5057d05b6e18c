use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use connector_api_server::{router, AppState, Observability, ServiceLabels};
use pipeline::AppendEngine;
use sheets_client::{MemorySessionFactory, MemorySheets, OAuthClient, OAuthConfig};

fn app_with(sheets: Arc<MemorySheets>, oauth: bool) -> Router {
    let oauth = oauth.then(|| {
        Arc::new(OAuthClient::new(
            reqwest::Client::new(),
            OAuthConfig::new("client-1", "secret", "http://localhost:8080/api/google-sheets/integrate/callback"),
        ))
    });
    router(AppState {
        oauth,
        sessions: Arc::new(MemorySessionFactory::new(sheets)),
        engine: Arc::new(AppendEngine::new()),
        observability: Observability::install(ServiceLabels {
            id: "connector-test".into(),
            ..Default::default()
        }),
    })
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn create_request(body: Value) -> Request<Body> {
    Request::post("/api/google-sheets/create")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

// ═══════════════════════════════════════════════════════════════
//  OAuth
// ═══════════════════════════════════════════════════════════════

#[tokio::test]
async fn integrate_redirects_to_consent_screen() {
    let app = app_with(MemorySheets::new(), true);
    let response = app
        .oneshot(Request::get("/api/google-sheets/integrate").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    let location = response.headers()[header::LOCATION].to_str().unwrap();
    assert!(location.starts_with("https://accounts.google.com/o/oauth2/auth?"));
    assert!(location.contains("client_id=client-1"));
    assert!(location.contains("response_type=code"));
    assert!(location.contains("access_type=offline"));
}

#[tokio::test]
async fn integrate_without_oauth_is_unavailable() {
    let app = app_with(MemorySheets::new(), false);
    let response = app
        .oneshot(Request::get("/api/google-sheets/integrate").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn callback_user_denied_is_forbidden() {
    let app = app_with(MemorySheets::new(), true);
    let response = app
        .oneshot(
            Request::get("/api/google-sheets/integrate/callback?error_reason=user_denied")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(response).await["error"], json!("user denied permission"));
}

#[tokio::test]
async fn callback_without_code_is_bad_request() {
    let app = app_with(MemorySheets::new(), true);
    let response = app
        .oneshot(
            Request::get("/api/google-sheets/integrate/callback")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// ═══════════════════════════════════════════════════════════════
//  Create
// ═══════════════════════════════════════════════════════════════

#[tokio::test]
async fn create_returns_document_with_header_row() {
    let sheets = MemorySheets::new();
    let app = app_with(Arc::clone(&sheets), false);

    let response = app
        .oneshot(create_request(json!({
            "title": "Answers",
            "token": { "access_token": "valid-token" }
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["title"], json!("Answers"));
    assert_eq!(body["token"]["access_token"], json!("valid-token"));
    assert_eq!(body["sheets"][0]["title"], json!("Sheet1"));

    let id = body["id"].as_str().unwrap();
    let rows = sheets.rows(id, "Sheet1");
    assert_eq!(rows.len(), 1);
    assert!(rows[0].contains(&json!("ANSWER_ID")));
    assert!(sheets.is_header_formatted(id, "Sheet1"));
}

#[tokio::test]
async fn create_with_empty_title_is_bad_request() {
    let sheets = MemorySheets::new();
    let app = app_with(Arc::clone(&sheets), false);
    let response = app
        .oneshot(create_request(json!({
            "title": "  ",
            "token": { "access_token": "valid-token" }
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(sheets.calls(), 0);
}

#[tokio::test]
async fn create_with_revoked_token_is_unauthorized() {
    let sheets = MemorySheets::new();
    sheets.revoke("revoked-token");
    let app = app_with(sheets, false);
    let response = app
        .oneshot(create_request(json!({
            "title": "Answers",
            "token": { "access_token": "revoked-token" }
        })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn create_when_sink_fails_is_bad_gateway() {
    let sheets = MemorySheets::new();
    sheets.set_fail_appends(true);
    let app = app_with(sheets, false);
    let response = app
        .oneshot(create_request(json!({
            "title": "Answers",
            "token": { "access_token": "valid-token" }
        })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}

// ═══════════════════════════════════════════════════════════════
//  Metrics
// ═══════════════════════════════════════════════════════════════

#[tokio::test]
async fn requests_are_counted_per_endpoint() {
    let app = app_with(MemorySheets::new(), false);

    let response = app
        .clone()
        .oneshot(Request::get("/api/google-sheets/integrate").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    let response = app
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();

    assert!(text.lines().any(|l| l.starts_with("http_requests_total")
        && l.contains("gsc_endpoint=\"/api/google-sheets/integrate\"")
        && l.contains("gsc_id=\"connector-test\"")));
    assert!(text.lines().any(|l| l.starts_with("response_status")
        && l.contains("gsc_response_status=\"503\"")));
    assert!(text.contains("requests_latency_seconds"));
}
