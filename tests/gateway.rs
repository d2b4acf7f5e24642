//! Gateway behaviour against an in-process mock backend

use attend_display::api::{DisplayApi, HttpGateway};
use attend_display::controller::{EndReason, Phase};
use attend_display::error::ApiErrorKind;
use attend_display::{Config, DisplayCore, DisplayError};
use axum::{
    extract::Path,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

const CODE: &str = "CS-101-2023-A";

async fn validate(Json(body): Json<Value>) -> Response {
    if body["sessionCode"] == CODE {
        Json(json!({
            "session": {"id": "s1", "className": "CS101", "facultyName": "Dr. Rao"},
            "studentsScanned": 0,
            "totalEnrolled": 50
        }))
        .into_response()
    } else {
        (
            StatusCode::NOT_FOUND,
            Json(json!({"message": "Invalid or expired session code"})),
        )
            .into_response()
    }
}

async fn qr_token(Path(id): Path<String>) -> Response {
    match id.as_str() {
        "s1" => Json(json!({"qrData": "abc", "studentsScanned": 0})).into_response(),
        "over" => (
            StatusCode::GONE,
            Json(json!({"message": "Session has ended"})),
        )
            .into_response(),
        "slow" => {
            tokio::time::sleep(Duration::from_secs(2)).await;
            Json(json!({"qrData": "late", "studentsScanned": 0})).into_response()
        }
        "garbled" => Json(json!({"unexpected": true})).into_response(),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "oops").into_response(),
    }
}

async fn recent_scans(Path(_id): Path<String>) -> Json<Value> {
    Json(json!({"recentScans": [
        {"student_name": "Asha", "roll_number": "21CS07"},
        {"student_name": "Ravi", "roll_number": "21CS12"}
    ]}))
}

async fn stats(Path(_id): Path<String>) -> Json<Value> {
    Json(json!({"studentsScanned": 3, "totalEnrolled": 50, "lastScanAt": "2026-10-19T09:03:00Z"}))
}

async fn end(Path(_id): Path<String>, Json(body): Json<Value>) -> Response {
    if body["sessionCode"] == CODE {
        Json(json!({"markedPresent": 44, "markedAbsent": 6, "durationMinutes": 52}))
            .into_response()
    } else {
        (
            StatusCode::FORBIDDEN,
            Json(json!({"message": "Invalid session code"})),
        )
            .into_response()
    }
}

/// Start the mock backend and return its API base URL
async fn spawn_backend() -> String {
    let app = Router::new()
        .route("/api/display/validate", post(validate))
        .route("/api/display/:id/qr-token", get(qr_token))
        .route("/api/display/:id/recent-scans", get(recent_scans))
        .route("/api/display/:id/stats", get(stats))
        .route("/api/display/:id/end", post(end));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}/api", addr)
}

fn gateway(base_url: &str, timeout: Duration) -> HttpGateway {
    HttpGateway::new(base_url, timeout).unwrap()
}

#[tokio::test]
async fn test_validated_session_id_is_accepted() {
    let base = spawn_backend().await;
    let api = gateway(&base, Duration::from_secs(5));

    let validated = api.validate_code(CODE).await.unwrap();
    assert_eq!(validated.session.id, "s1");
    assert_eq!(validated.session.title(), "CS101");
    assert_eq!(validated.total_enrolled, Some(50));

    let token = api.fetch_token(&validated.session.id).await.unwrap();
    assert_eq!(token.qr_data, "abc");
    assert_eq!(token.students_scanned, 0);
}

#[tokio::test]
async fn test_invalid_code_surfaces_server_message() {
    let base = spawn_backend().await;
    let api = gateway(&base, Duration::from_secs(5));

    let err = api.validate_code("NOPE").await.unwrap_err();
    assert_eq!(err.kind, ApiErrorKind::Http(404));
    assert_eq!(err.message, "Invalid or expired session code");
}

#[tokio::test]
async fn test_session_over_and_plain_errors() {
    let base = spawn_backend().await;
    let api = gateway(&base, Duration::from_secs(5));

    let over = api.fetch_token("over").await.unwrap_err();
    assert!(over.is_session_over());

    let broken = api.fetch_token("broken").await.unwrap_err();
    assert_eq!(broken.kind, ApiErrorKind::Http(500));
    assert_eq!(broken.message, "HTTP 500");
    assert!(!broken.is_session_over());

    let garbled = api.fetch_token("garbled").await.unwrap_err();
    assert_eq!(garbled.kind, ApiErrorKind::Decode);
}

#[tokio::test]
async fn test_timeout_aborts_only_that_call() {
    let base = spawn_backend().await;
    let api = gateway(&base, Duration::from_millis(300));

    let (slow, fast) = tokio::join!(api.fetch_token("slow"), api.fetch_token("s1"));
    let slow = slow.unwrap_err();
    assert!(slow.is_timeout());
    assert_eq!(slow.message, "Request timed out, please retry");
    assert_eq!(fast.unwrap().qr_data, "abc");
}

#[tokio::test]
async fn test_unreachable_backend_is_network_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let api = gateway(&format!("http://{}/api", addr), Duration::from_secs(5));
    let err = api.fetch_token("s1").await.unwrap_err();
    assert_eq!(err.kind, ApiErrorKind::Network);
}

#[tokio::test]
async fn test_scans_stats_and_end() {
    let base = spawn_backend().await;
    let api = gateway(&base, Duration::from_secs(5));

    let scans = api.fetch_recent_scans("s1").await.unwrap();
    assert_eq!(scans.len(), 2);
    assert_eq!(scans[0].student_name, "Asha");

    let stats = api.fetch_stats("s1").await.unwrap();
    assert_eq!(stats.students_scanned, 3);
    assert!(stats.extra.contains_key("lastScanAt"));

    let err = api.end_session("s1", "WRONG").await.unwrap_err();
    assert_eq!(err.message, "Invalid session code");

    let result = api.end_session("s1", CODE).await.unwrap();
    assert_eq!(result.marked_present, Some(44));
    assert_eq!(result.duration_minutes, Some(52));
}

#[tokio::test]
async fn test_display_flow_end_to_end() {
    let base = spawn_backend().await;
    let mut config = Config::default();
    config.api.base_url = base.clone();
    let core = DisplayCore::with_api(config, Arc::new(gateway(&base, Duration::from_secs(5))));

    assert!(matches!(
        core.setup("bad-code").await,
        Err(DisplayError::Api(_))
    ));
    assert!(core.store().retrieve().is_none());

    let record = core.setup("  cs-101-2023-a ").await.unwrap();
    assert_eq!(record.session_code, CODE);
    assert_eq!(core.store().retrieve(), Some(record));

    let controller = core.start().unwrap();
    assert_eq!(controller.masked_code(), "***********-A");

    let mut rx = controller.subscribe();
    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| s.qr_data.is_some()))
        .await
        .unwrap()
        .unwrap();

    let err = controller.end_session(Some("WRONG")).await.unwrap_err();
    assert_eq!(err.to_string(), "Invalid session code");
    assert!(controller.is_active());

    controller.end_session(None).await.unwrap();
    let state = controller.state();
    assert_eq!(state.phase, Phase::Ended(EndReason::Operator));
    assert_eq!(state.summary.unwrap().present, 44);
    assert!(core.store().retrieve().is_none());
}
