mod common;

use std::sync::Arc;

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use serde_json::Value;
use tower::ServiceExt;

use saferoute::config::EngineConfig;
use saferoute::{SafetyRouter, api};

use common::{Grid, Islands, Landmarks, Weather};

fn app() -> axum::Router {
    let engine = SafetyRouter::new(&EngineConfig::default(), Grid::default(), Weather::smoggy_rain()).unwrap();
    api::router(Arc::new(engine), Landmarks)
}

fn post(json: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/route")
        .header("content-type", "application/json")
        .body(Body::from(json.to_string()))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health() {
    let response = app()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_route_returns_ranked_candidates() {
    let response = app()
        .oneshot(post(
            r#"{"origin": [28.6139, 77.2090], "destination": "28.7041,77.1025"}"#,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    let candidates = body["candidates"].as_array().unwrap();
    assert!(!candidates.is_empty());
    assert_eq!(candidates[0]["rank"], 1);
    assert_eq!(candidates[0]["geometry"]["type"], "LineString");
    assert!(candidates[0]["safety_score"].as_u64().unwrap() <= 100);
    assert_eq!(body["radius_clamped"], true);
    assert_eq!(body["environment"]["condition"], "rain");
}

#[tokio::test]
async fn test_route_between_place_names() {
    let response = app()
        .oneshot(post(
            r#"{"origin": "India Gate", "destination": "Connaught Place"}"#,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert!(!body["candidates"].as_array().unwrap().is_empty());
    assert_eq!(body["radius_clamped"], false);
}

#[tokio::test]
async fn test_unknown_place_is_not_found() {
    let response = app()
        .oneshot(post(r#"{"origin": "Atlantis", "destination": "India Gate"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let body = json_body(response).await;
    assert_eq!(body["error"], "place_not_found");
    assert!(body["message"].as_str().unwrap().contains("Atlantis"));
}

#[tokio::test]
async fn test_invalid_coordinate_is_bad_request() {
    let response = app()
        .oneshot(post(r#"{"origin": [128.0, 77.2], "destination": [28.7, 77.1]}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = json_body(response).await;
    assert_eq!(body["error"], "invalid_coordinate");
    assert!(body["message"].as_str().unwrap().contains("latitude"));
}

#[tokio::test]
async fn test_malformed_body_is_bad_request() {
    let response = app().oneshot(post(r#"{"origin": 5}"#)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "bad_request");
}

#[tokio::test]
async fn test_far_points_are_unprocessable() {
    let response = app()
        .oneshot(post(r#"{"origin": [28.61, 77.21], "destination": [19.07, 72.87]}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json_body(response).await["error"], "region_too_large");
}

#[tokio::test]
async fn test_no_path_is_not_found() {
    let engine = SafetyRouter::new(&EngineConfig::default(), Islands, Weather::smoggy_rain()).unwrap();
    let response = api::router(Arc::new(engine), Landmarks)
        .oneshot(post(r#"{"origin": [28.6, 77.2], "destination": [28.609, 77.2]}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(response).await["error"], "no_path_found");
}
