use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use tower::ServiceExt;

use heliosync_server::services::Clock;

mod common;
use common::mock_app::MockApp;

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn request(uri: &str, method: Method, token: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .uri(uri)
        .method(method)
        .header("Authorization", format!("Bearer {token}"))
        .header("Content-Type", "application/json");

    match body {
        Some(body) => builder.body(Body::from(body.to_string())).unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

#[tokio::test]
async fn test_period_window_filters_samples() {
    let app = MockApp::new().await.with_energy_router();
    let user = app.create_test_user("energy@test.com").await;
    app.create_test_device("SOLAR-0001", &user).await;
    let token = app.token_for(&user);

    let now = app.clock.now();
    app.energy_repository
        .insert("SOLAR-0001", 1.0, 5.0, now - Duration::days(2))
        .await
        .unwrap();
    app.energy_repository
        .insert("SOLAR-0001", 2.0, 6.0, now - Duration::minutes(10))
        .await
        .unwrap();

    let response = app
        .router
        .clone()
        .oneshot(request(
            "/api/devices/SOLAR-0001/energy?period=1h",
            Method::GET,
            &token,
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["period"], "1h");
    assert_eq!(body["count"], 1);

    let response = app
        .router
        .clone()
        .oneshot(request(
            "/api/devices/SOLAR-0001/energy?period=all",
            Method::GET,
            &token,
            None,
        ))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["count"], 2);
}

#[tokio::test]
async fn test_manual_sample_ingest() {
    let app = MockApp::new().await.with_energy_router();
    let user = app.create_test_user("energy@test.com").await;
    app.create_test_device("SOLAR-0001", &user).await;
    let token = app.token_for(&user);

    let response = app
        .router
        .clone()
        .oneshot(request(
            "/api/devices/SOLAR-0001/energy",
            Method::POST,
            &token,
            Some(json!({ "powerKw": 1.25, "energyKwh": 14.8 })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let data = app
        .energy_repository
        .find_since("SOLAR-0001", None, 10)
        .await
        .unwrap();
    assert_eq!(data.len(), 1);
    assert_eq!(data[0].power_kw, 1.25);
}

#[tokio::test]
async fn test_stats_summarize_the_window() {
    let app = MockApp::new().await.with_energy_router();
    let user = app.create_test_user("energy@test.com").await;
    app.create_test_device("SOLAR-0001", &user).await;
    let token = app.token_for(&user);

    let now = app.clock.now();
    for (offset, power, energy) in [(30, 0.5, 10.0), (20, 1.5, 11.0), (10, 1.0, 12.5)] {
        app.energy_repository
            .insert("SOLAR-0001", power, energy, now - Duration::minutes(offset))
            .await
            .unwrap();
    }

    let response = app
        .router
        .clone()
        .oneshot(request(
            "/api/devices/SOLAR-0001/energy/stats?period=24h",
            Method::GET,
            &token,
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    let stats = &body["stats"];
    assert_eq!(stats["totalRecords"], 3);
    assert_eq!(stats["power"]["min"], 0.5);
    assert_eq!(stats["power"]["max"], 1.5);
    assert_eq!(stats["energy"]["start"], 10.0);
    assert_eq!(stats["energy"]["end"], 12.5);
    assert_eq!(stats["energy"]["generated"], 2.5);
}

#[tokio::test]
async fn test_clear_is_owner_only() {
    let app = MockApp::new().await.with_energy_router();
    let owner = app.create_test_user("owner@test.com").await;
    let friend = app.create_test_user("friend@test.com").await;
    let device = app.create_test_device("SOLAR-0001", &owner).await;

    let mut tx = app.storage.get_pool().begin().await.unwrap();
    app.device_repository
        .link_user(friend.id, device.id, false, &mut tx)
        .await
        .unwrap();
    tx.commit().await.unwrap();

    app.energy_repository
        .insert("SOLAR-0001", 1.0, 5.0, Utc::now())
        .await
        .unwrap();

    let response = app
        .router
        .clone()
        .oneshot(request(
            "/api/devices/SOLAR-0001/energy",
            Method::DELETE,
            &app.token_for(&friend),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .router
        .clone()
        .oneshot(request(
            "/api/devices/SOLAR-0001/energy",
            Method::DELETE,
            &app.token_for(&owner),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["deletedCount"], 1);
}
