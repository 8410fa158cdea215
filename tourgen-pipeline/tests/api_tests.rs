//! Router integration tests
//!
//! Requests go through `tower::ServiceExt::oneshot` against the real router
//! backed by a scripted pipeline.

mod helpers;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::util::ServiceExt;
use tourgen_pipeline::AppState;

use helpers::*;

fn create_test_app() -> axum::Router {
    let pipeline = build_pipeline(
        &[
            MockCoordinateSource::fixed("plus-code", 37.5796, 126.9770, 0.95, Some("KR")),
            MockCoordinateSource::failing("place-search"),
        ],
        &[MockFactSource::new("wikidata", 0.8, &["Gyeongbokgung"])],
        MockNarrator::new(&[("Gwanghwamun Gate", "The main gate."), ("Geunjeongjeon Hall", "The throne hall.")]),
        Duration::from_secs(2),
    );
    let state = AppState::new(Arc::new(pipeline.orchestrator), pipeline.breakers);
    tourgen_pipeline::build_router(state)
}

async fn send(app: axum::Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_health() {
    let (status, body) = send(create_test_app(), get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "tourgen-pipeline");
}

#[tokio::test]
async fn test_resolve() {
    let (status, body) = send(
        create_test_app(),
        post_json("/resolve", json!({"name": "Gyeongbokgung", "language": "en"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["country_code"], "KOR");
    assert_eq!(body["resolution_tier"], 0);
}

#[tokio::test]
async fn test_resolve_rejects_bad_input() {
    let app = create_test_app();
    let (status, body) = send(app.clone(), post_json("/resolve", json!({"name": " ", "language": "en"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");

    let (status, _) = send(
        app,
        post_json("/resolve", json!({"name": "x", "language": "en", "min_confidence": 1.5})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_resolve_exhausted_is_unprocessable() {
    let (status, body) = send(
        create_test_app(),
        post_json(
            "/resolve",
            json!({"name": "Nowhere In Particular", "language": "en", "min_confidence": 0.99}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "RESOLUTION_EXHAUSTED");
}

#[tokio::test]
async fn test_facts() {
    let (status, body) = send(
        create_test_app(),
        post_json("/facts", json!({"subject": "Gyeongbokgung", "language": "en", "budget_ms": 500})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["bundle"]["sources_succeeded"], json!(["wikidata"]));
    assert_eq!(body["sources"][0]["status"], "succeeded");
}

#[tokio::test]
async fn test_guide_generate_then_load() {
    let app = create_test_app();

    let (status, body) = send(
        app.clone(),
        post_json("/guide", json!({"name": "Gyeongbokgung", "language": "en"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let stops = body["stops"].as_array().unwrap();
    assert_eq!(stops.len(), 2);
    assert!(stops.iter().all(|s| s["coordinate"].is_object()));

    let (status, stored) = send(app.clone(), get("/guide?name=gyeongbokgung&language=en")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stored["run_id"], body["run_id"]);

    let (status, _) = send(app, get("/guide?name=gyeongbokgung&language=fr")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_breakers_listed_after_use() {
    let app = create_test_app();
    send(
        app.clone(),
        post_json("/resolve", json!({"name": "Gyeongbokgung", "language": "en"})),
    )
    .await;

    let (status, body) = send(app, get("/breakers")).await;
    assert_eq!(status, StatusCode::OK);
    let sources: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|b| b["source"].as_str().unwrap())
        .collect();
    assert!(sources.contains(&"plus-code"));
    assert!(body.as_array().unwrap().iter().all(|b| b["state"] == "CLOSED"));
}
