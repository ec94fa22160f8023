mod common;

use axum::http::{Method, StatusCode};
use serde_json::json;

use common::app::spawn_test_app;
use common::http::{assert_json_error, assert_status_ok_json, request, response_json};

#[tokio::test]
async fn it_uncalibrated_returns_defaults() {
    let app = spawn_test_app().await;

    let resp = request(&app.app, Method::GET, "/api/calibration", None).await;
    let (status, _, body) = response_json(resp).await;
    assert_status_ok_json(status, &body);
    assert_eq!(body["data"]["calibrated"], false);
    assert_eq!(body["data"]["calibration"]["openBaseline"], 0.25);
    assert_eq!(body["data"]["calibration"]["closedBaseline"], 0.05);
    assert_eq!(body["data"]["calibration"]["threshold"], 0.15);
    assert_eq!(body["data"]["calibration"]["timestamp"], 0);
}

#[tokio::test]
async fn it_manual_threshold_is_saved_and_applied() {
    let app = spawn_test_app().await;

    let resp = request(
        &app.app,
        Method::PUT,
        "/api/calibration",
        Some(json!({ "threshold": 0.4 })),
    )
    .await;
    let (status, _, body) = response_json(resp).await;
    assert_status_ok_json(status, &body);
    assert_eq!(body["data"]["calibrated"], true);
    assert_eq!(body["data"]["activeThreshold"], 0.4);
    assert_eq!(app.state.detection().threshold(), 0.4);

    let stored = app.state.store().load_calibration().unwrap().unwrap();
    assert_eq!(stored.threshold, 0.4);
    assert!(stored.timestamp > 0);
}

#[tokio::test]
async fn it_full_record_round_trips() {
    let app = spawn_test_app().await;
    let record = json!({
        "openBaseline": 0.06,
        "closedBaseline": 0.7,
        "threshold": 0.38,
        "timestamp": 1_700_000_000_000_i64
    });

    let resp = request(&app.app, Method::PUT, "/api/calibration", Some(record.clone())).await;
    let (status, _, _) = response_json(resp).await;
    assert_eq!(status, StatusCode::OK);

    let resp = request(&app.app, Method::GET, "/api/calibration", None).await;
    let (_, _, body) = response_json(resp).await;
    assert_eq!(body["data"]["calibration"], record);
    assert_eq!(body["data"]["activeThreshold"], 0.38);
}

#[tokio::test]
async fn it_out_of_range_threshold_is_rejected() {
    let app = spawn_test_app().await;
    let resp = request(
        &app.app,
        Method::PUT,
        "/api/calibration",
        Some(json!({ "threshold": 1.7 })),
    )
    .await;
    let (status, _, body) = response_json(resp).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_json_error(&body, "VALIDATION_ERROR");
    assert_eq!(app.state.detection().threshold(), 0.15);
}

#[tokio::test]
async fn it_delete_restores_configured_threshold() {
    let app = spawn_test_app().await;
    request(
        &app.app,
        Method::PUT,
        "/api/calibration",
        Some(json!({ "threshold": 0.5 })),
    )
    .await;

    let resp = request(&app.app, Method::DELETE, "/api/calibration", None).await;
    let (status, _, body) = response_json(resp).await;
    assert_status_ok_json(status, &body);
    assert_eq!(body["data"]["calibrated"], false);
    assert_eq!(app.state.detection().threshold(), app.config.detection.threshold);
    assert!(app.state.store().load_calibration().unwrap().is_none());
}
