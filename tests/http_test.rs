mod helpers;

use std::sync::{Arc, Mutex};

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use mnemo::config::MnemoConfig;
use mnemo::server::http::{router, AppState};
use rusqlite::Connection;
use serde_json::{json, Value};
use tower::ServiceExt;

fn app(conn: Connection) -> Router {
    router(AppState::new(
        Arc::new(Mutex::new(conn)),
        Arc::new(MnemoConfig::default()),
    ))
}

fn get(uri: &str, key: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(key) = key {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {key}"));
    }
    builder.body(Body::empty()).unwrap()
}

fn post_json(uri: &str, key: Option<&str>, body: &Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(key) = key {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {key}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn new_observation(visibility: Option<&str>) -> Value {
    let mut body = json!({
        "memory_session_id": "s1",
        "project": "acme/app",
        "type": "decision",
        "title": "use sqlite",
    });
    if let Some(v) = visibility {
        body["visibility"] = json!(v);
    }
    body
}

#[tokio::test]
async fn health_needs_no_credentials() {
    let response = app(helpers::test_db()).oneshot(get("/api/health", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn missing_header_is_a_legacy_caller() {
    let conn = helpers::test_db();
    helpers::insert_observation(&conn, &helpers::observation("acme/app", "open"), None, "project");
    helpers::insert_observation(
        &conn,
        &helpers::observation("acme/app", "secret"),
        Some(("alice@host", "eng")),
        "private",
    );

    let response = app(conn).oneshot(get("/api/observations", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["count"], 1);
    assert_eq!(body["results"][0]["title"], "open");
}

#[tokio::test]
async fn agent_key_unlocks_its_private_records() {
    let mut conn = helpers::test_db();
    let key = helpers::register_agent(&mut conn, "alice@host", "eng");
    helpers::insert_observation(
        &conn,
        &helpers::observation("acme/app", "secret"),
        Some(("alice@host", "eng")),
        "private",
    );

    let response = app(conn)
        .oneshot(get("/api/observations", Some(&key)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["count"], 1);
}

#[tokio::test]
async fn unknown_key_is_unauthorized() {
    let response = app(helpers::test_db())
        .oneshot(get("/api/observations", Some("mnm_00000000deadbeef")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(body_json(response).await["error"].is_string());
}

#[tokio::test]
async fn malformed_header_is_a_bad_request() {
    let request = Request::builder()
        .uri("/api/observations")
        .header(header::AUTHORIZATION, "Basic dXNlcjpwYXNz")
        .body(Body::empty())
        .unwrap();
    let response = app(helpers::test_db()).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn locked_agent_gets_429_with_retry_after() {
    let mut conn = helpers::test_db();
    let key = helpers::register_agent(&mut conn, "alice@host", "eng");
    conn.execute(
        "UPDATE agents SET locked_until = strftime('%s', 'now') + 120 WHERE id = 'alice@host'",
        [],
    )
    .unwrap();

    let response = app(conn)
        .oneshot(get("/api/observations", Some(&key)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let retry_after: i64 = response
        .headers()
        .get(header::RETRY_AFTER)
        .unwrap()
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!(retry_after > 0 && retry_after <= 120, "{retry_after}");
}

#[tokio::test]
async fn read_only_agent_cannot_write() {
    let mut conn = helpers::test_db();
    let key = helpers::register_with_permissions(&mut conn, "reader@host", "eng", &["read"]);

    let response = app(conn)
        .oneshot(post_json("/api/observations", Some(&key), &new_observation(None)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn agent_write_is_stamped_with_its_identity() {
    let mut conn = helpers::test_db();
    let key = helpers::register_agent(&mut conn, "alice@host", "eng");
    let db = Arc::new(Mutex::new(conn));
    let app = router(AppState::new(Arc::clone(&db), Arc::new(MnemoConfig::default())));

    let response = app
        .oneshot(post_json(
            "/api/observations",
            Some(&key),
            &new_observation(Some("department")),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let id = body_json(response).await["id"].as_i64().unwrap();

    let conn = db.lock().unwrap();
    let (agent, department, visibility): (String, String, String) = conn
        .query_row(
            "SELECT agent, department, visibility FROM observations WHERE id = ?1",
            [id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .unwrap();
    assert_eq!(agent, "alice@host");
    assert_eq!(department, "eng");
    assert_eq!(visibility, "department");
}

#[tokio::test]
async fn invalid_visibility_is_a_bad_request() {
    let response = app(helpers::test_db())
        .oneshot(post_json("/api/observations", None, &new_observation(Some("everyone"))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_order_by_is_a_bad_request() {
    let response = app(helpers::test_db())
        .oneshot(get("/api/observations?order_by=sideways", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn verify_endpoint_reports_key_ownership() {
    let mut conn = helpers::test_db();
    let key = helpers::register_agent(&mut conn, "alice@host", "eng");

    let response = app(conn)
        .oneshot(post_json(
            "/api/agents/verify",
            None,
            &json!({ "id": "alice@host", "api_key": key }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["verified"], true);
}
