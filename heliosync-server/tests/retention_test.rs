use chrono::{DateTime, Duration, TimeZone, Utc};
use chrono_tz::Europe::Kyiv;

use heliosync_server::services::RetentionService;

mod common;
use common::mock_app::{MockApp, TEST_ZONE};

fn kyiv(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Utc> {
    Kyiv.with_ymd_and_hms(y, m, d, h, min, s)
        .unwrap()
        .with_timezone(&Utc)
}

fn retention(app: &MockApp) -> RetentionService {
    RetentionService::new(
        app.energy_repository.clone(),
        app.cache.clone(),
        app.sink.clone(),
        app.clock.clone(),
        TEST_ZONE,
    )
}

#[tokio::test]
async fn test_sweep_drops_samples_from_previous_local_days() {
    let app = MockApp::new().await;
    let user = app.create_test_user("retention@test.com").await;
    app.create_test_device("SOLAR-0001", &user).await;

    // Just after Kyiv midnight; yesterday's samples are due for purge.
    app.clock.set(kyiv(2024, 6, 10, 0, 0, 30));

    app.energy_repository
        .insert("SOLAR-0001", 0.8, 9.5, kyiv(2024, 6, 9, 23, 50, 0))
        .await
        .unwrap();
    app.energy_repository
        .insert("SOLAR-0001", 0.0, 0.0, kyiv(2024, 6, 10, 0, 0, 10))
        .await
        .unwrap();

    retention(&app).sweep().await.unwrap();

    let remaining = app
        .energy_repository
        .find_since("SOLAR-0001", None, 10)
        .await
        .unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].timestamp, kyiv(2024, 6, 10, 0, 0, 10));
}

#[tokio::test]
async fn test_sweep_keeps_everything_from_today() {
    let app = MockApp::new().await;
    let user = app.create_test_user("retention@test.com").await;
    app.create_test_device("SOLAR-0001", &user).await;

    app.clock.set(kyiv(2024, 6, 10, 12, 0, 0));

    for offset in [1, 6, 11] {
        app.energy_repository
            .insert(
                "SOLAR-0001",
                1.0,
                10.0,
                kyiv(2024, 6, 10, 12, 0, 0) - Duration::hours(offset),
            )
            .await
            .unwrap();
    }

    retention(&app).sweep().await.unwrap();

    let remaining = app
        .energy_repository
        .find_since("SOLAR-0001", None, 10)
        .await
        .unwrap();
    assert_eq!(remaining.len(), 3);
}

#[tokio::test]
async fn test_sweep_resets_online_controllers_only() {
    let app = MockApp::new().await;

    app.cache.update_status("SOLAR-0001", Default::default()).await;
    app.cache.set_online("SOLAR-0002", false).await;

    app.clock.set(kyiv(2024, 6, 10, 0, 0, 30));
    retention(&app).sweep().await.unwrap();

    let commands = app.sink.commands();
    assert_eq!(commands.len(), 1);
    assert_eq!(commands[0].0, "SOLAR-0001");
    assert_eq!(commands[0].1["command"], "resetEnergy");
    assert_eq!(commands[0].1["reason"], "daily_reset");
}
