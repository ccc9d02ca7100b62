use super::middleware::{AuditLayer, AuditSettings};
use super::models::OperationType;
use super::recorder::testing::MemoryAuditStore;
use super::recorder::{AuditRecorder, AuditRow};
use axum::{
    body::Body,
    extract::Request,
    http::{Method, StatusCode},
    response::IntoResponse,
    routing::{delete, get, post, put},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

async fn ok_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({"success": true})))
}

async fn created_handler() -> impl IntoResponse {
    (StatusCode::CREATED, Json(json!({"success": true})))
}

async fn delete_with_snapshot_handler() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "deleted": [
                {"id": 7, "name": "Old Welcome"},
                {"id": 8, "name": "Old Goodbye"}
            ]
        })),
    )
}

async fn failing_handler() -> impl IntoResponse {
    (StatusCode::BAD_REQUEST, Json(json!({"error": "invalid"})))
}

fn test_app() -> (Router, Arc<MemoryAuditStore>) {
    let store = Arc::new(MemoryAuditStore::new());
    let layer = AuditLayer::with_settings(
        AuditRecorder::new(store.clone()),
        AuditSettings::default(),
    );

    let app = Router::new()
        .route("/cms/sound/save", post(created_handler))
        .route("/cms/sound/del", post(ok_handler))
        .route("/cms/workout/del", post(delete_with_snapshot_handler))
        .route("/cms/sound/:id", put(ok_handler))
        .route("/cms/sound/:id", delete(delete_with_snapshot_handler))
        .route("/cms/sound/page", get(ok_handler))
        .route("/cms/sound/page", post(ok_handler))
        .route("/cms/user/login", post(ok_handler))
        .route("/cms/program/enable", post(ok_handler))
        .route("/cms/broken/save", post(failing_handler))
        .layer(layer);

    (app, store)
}

async fn send(app: Router, method: Method, uri: &str, body: serde_json::Value) -> StatusCode {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();

    // Recording runs on a detached task strictly after the response.
    tokio::time::sleep(Duration::from_millis(100)).await;
    status
}

fn single_row(store: &MemoryAuditStore) -> AuditRow {
    let rows = store.rows();
    assert_eq!(rows.len(), 1, "expected exactly one audit row");
    rows.into_iter().next().unwrap()
}

#[tokio::test]
async fn test_save_without_id_records_add() {
    let (app, store) = test_app();

    let status = send(
        app,
        Method::POST,
        "/cms/sound/save",
        json!({"name": "Welcome"}),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let row = single_row(&store);
    assert_eq!(row.biz_type, "biz_sound");
    assert_eq!(row.operation_type, OperationType::Add.as_str());
    assert_eq!(row.data_info, "Welcome");
    assert_eq!(row.data_id, 0);
}

#[tokio::test]
async fn test_save_with_id_records_update() {
    let (app, store) = test_app();

    send(
        app,
        Method::POST,
        "/cms/sound/save",
        json!({"id": 42, "name": "Welcome v2"}),
    )
    .await;

    let row = single_row(&store);
    assert_eq!(row.operation_type, OperationType::Update.as_str());
    assert_eq!(row.data_id, 42);
    assert_eq!(row.data_info, "Welcome v2");
}

#[tokio::test]
async fn test_batch_delete_without_snapshot_describes_count() {
    let (app, store) = test_app();

    send(
        app,
        Method::POST,
        "/cms/sound/del",
        json!({"idList": [7, 8, 9]}),
    )
    .await;

    let row = single_row(&store);
    assert_eq!(row.operation_type, OperationType::Delete.as_str());
    assert_eq!(row.data_info, "3 records deleted");
    assert!(row.data_before.is_none());
}

#[tokio::test]
async fn test_delete_prefers_handler_snapshot_over_body() {
    let (app, store) = test_app();

    // The body carries a name, but the handler reported what it deleted;
    // the first reported item wins.
    send(
        app,
        Method::POST,
        "/cms/workout/del",
        json!({"name": "Body Name", "idList": [7, 8]}),
    )
    .await;

    let row = single_row(&store);
    assert_eq!(row.biz_type, "biz_workout");
    assert_eq!(row.operation_type, OperationType::Delete.as_str());
    assert_eq!(row.data_info, "Old Welcome");
    assert!(row.data_before.as_deref().unwrap().contains("Old Welcome"));
    assert_eq!(row.data_id, 7);
}

#[tokio::test]
async fn test_delete_by_numeric_path() {
    let (app, store) = test_app();

    send(app, Method::DELETE, "/cms/sound/7", json!({})).await;

    let row = single_row(&store);
    assert_eq!(row.operation_type, OperationType::Delete.as_str());
    assert_eq!(row.data_id, 7);
    assert_eq!(row.data_info, "Old Welcome");
}

#[tokio::test]
async fn test_put_numeric_path_records_update() {
    let (app, store) = test_app();

    // Body shape is irrelevant; the path id decides.
    send(
        app,
        Method::PUT,
        "/cms/sound/123",
        json!({"whatever": [1, 2, 3]}),
    )
    .await;

    let row = single_row(&store);
    assert_eq!(row.operation_type, OperationType::Update.as_str());
    assert_eq!(row.data_id, 123);
}

#[tokio::test]
async fn test_get_never_records() {
    let (app, store) = test_app();

    send(app, Method::GET, "/cms/sound/page", json!({})).await;

    assert!(store.rows().is_empty());
}

#[tokio::test]
async fn test_excluded_path_never_records() {
    let (app, store) = test_app();

    // Method qualifies, the path does not.
    let status = send(
        app,
        Method::POST,
        "/cms/user/login",
        json!({"userName": "coach", "password": "x"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    assert!(store.rows().is_empty());
}

#[tokio::test]
async fn test_read_suffix_never_records() {
    let (app, store) = test_app();

    send(app, Method::POST, "/cms/sound/page", json!({"pageNo": 1})).await;

    assert!(store.rows().is_empty());
}

#[tokio::test]
async fn test_failed_response_not_recorded() {
    let (app, store) = test_app();

    let status = send(
        app,
        Method::POST,
        "/cms/broken/save",
        json!({"name": "nope"}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert!(store.rows().is_empty());
}

#[tokio::test]
async fn test_enable_action() {
    let (app, store) = test_app();

    send(
        app,
        Method::POST,
        "/cms/program/enable",
        json!({"id": 3, "name": "Morning Flow"}),
    )
    .await;

    let row = single_row(&store);
    assert_eq!(row.biz_type, "biz_program");
    assert_eq!(row.operation_type, OperationType::Enable.as_str());
    assert_eq!(row.data_id, 3);
}

#[tokio::test]
async fn test_actor_from_header() {
    let (app, store) = test_app();

    let request = Request::builder()
        .method(Method::POST)
        .uri("/cms/sound/save")
        .header("content-type", "application/json")
        .header("x-user-id", "99")
        .body(Body::from(json!({"name": "Welcome"}).to_string()))
        .unwrap();

    app.oneshot(request).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(single_row(&store).operation_user, "99");
}

#[tokio::test]
async fn test_actor_falls_back_to_ip_marker() {
    let (app, store) = test_app();

    send(
        app,
        Method::POST,
        "/cms/sound/save",
        json!({"name": "Welcome"}),
    )
    .await;

    // No session, header or legacy field; no socket info in oneshot.
    assert_eq!(single_row(&store).operation_user, "ip:unknown");
}

#[tokio::test]
async fn test_original_uri_header_wins_for_classification() {
    let (app, store) = test_app();

    // The routing path matches a registered route, but the gateway says
    // the client actually called the prod-api URL.
    let request = Request::builder()
        .method(Method::POST)
        .uri("/cms/sound/save")
        .header("content-type", "application/json")
        .header("x-original-uri", "/prod-api/cms/sound/save?lang=en")
        .body(Body::from(json!({"name": "Welcome"}).to_string()))
        .unwrap();

    app.oneshot(request).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(single_row(&store).biz_type, "biz_sound");
}

#[tokio::test]
async fn test_storage_failure_does_not_affect_response() {
    let store = Arc::new(MemoryAuditStore::failing());
    let layer = AuditLayer::with_settings(
        AuditRecorder::new(store.clone()),
        AuditSettings::default(),
    );
    let app = Router::new()
        .route("/cms/sound/save", post(created_handler))
        .layer(layer);

    let status = send(
        app,
        Method::POST,
        "/cms/sound/save",
        json!({"name": "Welcome"}),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert!(store.rows().is_empty());
}

#[tokio::test]
async fn test_repeated_requests_classify_identically() {
    let (app, store) = test_app();

    for _ in 0..3 {
        send(
            app.clone(),
            Method::POST,
            "/cms/sound/save",
            json!({"name": "Welcome"}),
        )
        .await;
    }

    let rows = store.rows();
    assert_eq!(rows.len(), 3);
    assert!(rows.iter().all(|r| r.biz_type == "biz_sound"));
    assert!(rows
        .iter()
        .all(|r| r.operation_type == OperationType::Add.as_str()));
}

#[tokio::test]
async fn test_unclassifiable_mutation_records_nothing() {
    let store = Arc::new(MemoryAuditStore::new());
    let layer = AuditLayer::with_settings(
        AuditRecorder::new(store.clone()),
        AuditSettings::default(),
    );
    let app = Router::new()
        .route("/totally/opaque/transcode", post(ok_handler))
        .layer(layer);

    send(
        app,
        Method::POST,
        "/totally/opaque/transcode",
        json!({"name": "x"}),
    )
    .await;

    assert!(store.rows().is_empty());
}
