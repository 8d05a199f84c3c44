use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::Europe::Kyiv;

use heliosync_server::models::{Mode, Schedule};
use heliosync_server::repositories::ScheduleDraft;
use heliosync_server::services::SchedulerService;

mod common;
use common::mock_app::{MockApp, TEST_ZONE};

// 2024-06-10 is a Monday; Kyiv runs UTC+3 in June.
fn kyiv(h: u32, m: u32) -> DateTime<Utc> {
    Kyiv.with_ymd_and_hms(2024, 6, 10, h, m, 0)
        .unwrap()
        .with_timezone(&Utc)
}

fn scheduler(app: &MockApp) -> SchedulerService {
    SchedulerService::new(
        app.schedule_repository.clone(),
        app.mode_repository.clone(),
        app.sink.clone(),
        app.clock.clone(),
        TEST_ZONE,
        Duration::from_secs(60),
    )
}

fn draft(device_id: &str, user_id: i32) -> ScheduleDraft {
    ScheduleDraft {
        device_id: device_id.to_string(),
        user_id,
        name: "Evening grid".to_string(),
        target_mode: "grid".to_string(),
        schedule_type: "time".to_string(),
        hour: Some(8),
        minute: Some(0),
        start_hour: None,
        start_minute: None,
        end_hour: None,
        end_minute: None,
        secondary_mode: None,
        repeat_type: "once".to_string(),
        repeat_days: None,
        is_enabled: true,
        next_execution: Some(kyiv(8, 0)),
    }
}

async fn reload(app: &MockApp, schedule: &Schedule) -> Schedule {
    sqlx::query_as("SELECT * FROM energy_schedules WHERE id = $1")
        .bind(schedule.id)
        .fetch_one(app.storage.get_pool())
        .await
        .unwrap()
}

#[tokio::test]
async fn test_due_once_schedule_fires_and_disables() {
    let app = MockApp::new().await;
    let user = app.create_test_user("sched@test.com").await;
    app.create_test_device("SOLAR-0001", &user).await;

    let schedule = app
        .schedule_repository
        .create(&draft("SOLAR-0001", user.id))
        .await
        .unwrap();

    app.clock.set(kyiv(8, 0) + chrono::Duration::seconds(30));
    scheduler(&app).tick().await.unwrap();

    let mode = app.mode_repository.get("SOLAR-0001").await.unwrap().unwrap();
    assert_eq!(mode.current_mode, "grid");
    assert_eq!(mode.changed_by, "schedule");

    let history = app
        .mode_repository
        .find_history("SOLAR-0001", 10)
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].from_mode, None);
    assert_eq!(history[0].to_mode, "grid");
    assert_eq!(history[0].schedule_id, Some(schedule.id));
    assert_eq!(history[0].schedule_name.as_deref(), Some("Evening grid"));

    let stored = reload(&app, &schedule).await;
    assert!(!stored.is_enabled);
    assert!(stored.next_execution.is_none());
    assert!(stored.last_executed.is_some());

    // The publish is detached from the commit.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let commands = app.sink.commands();
    assert_eq!(commands.len(), 1);
    assert_eq!(commands[0].0, "SOLAR-0001");
    assert_eq!(commands[0].1["command"], "setEnergyMode");
    assert_eq!(commands[0].1["mode"], "grid");
    assert_eq!(commands[0].1["source"], "schedule");
    assert_eq!(commands[0].1["scheduleName"], "Evening grid");
}

#[tokio::test]
async fn test_due_schedule_does_not_fire_twice() {
    let app = MockApp::new().await;
    let user = app.create_test_user("sched@test.com").await;
    app.create_test_device("SOLAR-0001", &user).await;

    app.schedule_repository
        .create(&draft("SOLAR-0001", user.id))
        .await
        .unwrap();

    app.clock.set(kyiv(8, 0) + chrono::Duration::seconds(30));
    let engine = scheduler(&app);
    engine.tick().await.unwrap();
    engine.tick().await.unwrap();

    let history = app
        .mode_repository
        .find_history("SOLAR-0001", 10)
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
}

#[tokio::test]
async fn test_recurring_schedule_stays_enabled_with_future_due_time() {
    let app = MockApp::new().await;
    let user = app.create_test_user("sched@test.com").await;
    app.create_test_device("SOLAR-0001", &user).await;

    let mut recurring = draft("SOLAR-0001", user.id);
    recurring.repeat_type = "daily".to_string();
    let schedule = app.schedule_repository.create(&recurring).await.unwrap();

    let now = kyiv(8, 0) + chrono::Duration::seconds(30);
    app.clock.set(now);
    scheduler(&app).tick().await.unwrap();

    let stored = reload(&app, &schedule).await;
    assert!(stored.is_enabled);
    let next = stored.next_execution.unwrap();
    assert!(next > now);
    assert_eq!(next, kyiv(8, 0) + chrono::Duration::days(1));
}

#[tokio::test]
async fn test_bad_schedule_row_does_not_block_the_rest() {
    let app = MockApp::new().await;
    let user = app.create_test_user("sched@test.com").await;
    app.create_test_device("SOLAR-0001", &user).await;

    // Due first, but carrying a mode no firmware knows. The tick must
    // step over it and still fire the healthy schedule behind it.
    let mut poisoned = draft("SOLAR-0001", user.id);
    poisoned.name = "Broken".to_string();
    poisoned.target_mode = "diesel".to_string();
    app.schedule_repository.create(&poisoned).await.unwrap();

    let healthy = app
        .schedule_repository
        .create(&draft("SOLAR-0001", user.id))
        .await
        .unwrap();

    app.clock.set(kyiv(8, 0) + chrono::Duration::seconds(30));
    scheduler(&app).tick().await.unwrap();

    let mode = app.mode_repository.get("SOLAR-0001").await.unwrap().unwrap();
    assert_eq!(mode.current_mode, "grid");

    let history = app
        .mode_repository
        .find_history("SOLAR-0001", 10)
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].schedule_id, Some(healthy.id));
}

#[tokio::test]
async fn test_nothing_due_changes_nothing() {
    let app = MockApp::new().await;
    let user = app.create_test_user("sched@test.com").await;
    app.create_test_device("SOLAR-0001", &user).await;

    app.schedule_repository
        .create(&draft("SOLAR-0001", user.id))
        .await
        .unwrap();

    app.clock.set(kyiv(7, 59));
    scheduler(&app).tick().await.unwrap();

    assert!(app.mode_repository.get("SOLAR-0001").await.unwrap().is_none());
    assert!(app.sink.commands().is_empty());
}

fn range_draft(device_id: &str, user_id: i32) -> ScheduleDraft {
    ScheduleDraft {
        device_id: device_id.to_string(),
        user_id,
        name: "Daylight solar".to_string(),
        target_mode: "solar".to_string(),
        schedule_type: "range".to_string(),
        hour: None,
        minute: None,
        start_hour: Some(8),
        start_minute: Some(0),
        end_hour: Some(20),
        end_minute: Some(0),
        secondary_mode: Some("grid".to_string()),
        repeat_type: "daily".to_string(),
        repeat_days: None,
        is_enabled: true,
        next_execution: None,
    }
}

#[tokio::test]
async fn test_range_start_boundary_switches_mode() {
    let app = MockApp::new().await;
    let user = app.create_test_user("range@test.com").await;
    app.create_test_device("SOLAR-0001", &user).await;

    app.schedule_repository
        .create(&range_draft("SOLAR-0001", user.id))
        .await
        .unwrap();

    app.mode_repository
        .set_mode("SOLAR-0001", Mode::Grid, heliosync_server::models::ChangedBy::Manual, None)
        .await
        .unwrap();

    app.clock.set(kyiv(8, 0));
    scheduler(&app).tick().await.unwrap();

    let mode = app.mode_repository.get("SOLAR-0001").await.unwrap().unwrap();
    assert_eq!(mode.current_mode, "solar");
    assert_eq!(mode.changed_by, "schedule_range");
}

#[tokio::test]
async fn test_range_between_boundaries_never_fires() {
    let app = MockApp::new().await;
    let user = app.create_test_user("range@test.com").await;
    app.create_test_device("SOLAR-0001", &user).await;

    app.schedule_repository
        .create(&range_draft("SOLAR-0001", user.id))
        .await
        .unwrap();

    // In-window mismatch, but not a boundary minute.
    app.mode_repository
        .set_mode("SOLAR-0001", Mode::Grid, heliosync_server::models::ChangedBy::Manual, None)
        .await
        .unwrap();

    app.clock.set(kyiv(12, 30));
    scheduler(&app).tick().await.unwrap();

    let mode = app.mode_repository.get("SOLAR-0001").await.unwrap().unwrap();
    assert_eq!(mode.current_mode, "grid");
    assert_eq!(mode.changed_by, "manual");
}

#[tokio::test]
async fn test_range_end_boundary_switches_to_secondary() {
    let app = MockApp::new().await;
    let user = app.create_test_user("range@test.com").await;
    app.create_test_device("SOLAR-0001", &user).await;

    app.schedule_repository
        .create(&range_draft("SOLAR-0001", user.id))
        .await
        .unwrap();

    app.mode_repository
        .set_mode("SOLAR-0001", Mode::Solar, heliosync_server::models::ChangedBy::Manual, None)
        .await
        .unwrap();

    app.clock.set(kyiv(20, 0));
    scheduler(&app).tick().await.unwrap();

    let mode = app.mode_repository.get("SOLAR-0001").await.unwrap().unwrap();
    assert_eq!(mode.current_mode, "grid");
    assert_eq!(mode.changed_by, "schedule_range");
}

#[tokio::test]
async fn test_range_boundary_is_idempotent_within_the_minute() {
    let app = MockApp::new().await;
    let user = app.create_test_user("range@test.com").await;
    app.create_test_device("SOLAR-0001", &user).await;

    app.schedule_repository
        .create(&range_draft("SOLAR-0001", user.id))
        .await
        .unwrap();

    app.mode_repository
        .set_mode("SOLAR-0001", Mode::Grid, heliosync_server::models::ChangedBy::Manual, None)
        .await
        .unwrap();

    app.clock.set(kyiv(8, 0));
    let engine = scheduler(&app);
    engine.tick().await.unwrap();
    engine.tick().await.unwrap();

    let history = app
        .mode_repository
        .find_history("SOLAR-0001", 10)
        .await
        .unwrap();
    // One manual entry plus exactly one range transition.
    assert_eq!(history.len(), 2);
}

#[tokio::test]
async fn test_midnight_wrapping_range() {
    let app = MockApp::new().await;
    let user = app.create_test_user("range@test.com").await;
    app.create_test_device("SOLAR-0001", &user).await;

    let mut night = range_draft("SOLAR-0001", user.id);
    night.name = "Night grid".to_string();
    night.target_mode = "grid".to_string();
    night.secondary_mode = Some("solar".to_string());
    night.start_hour = Some(22);
    night.end_hour = Some(6);
    app.schedule_repository.create(&night).await.unwrap();

    app.mode_repository
        .set_mode("SOLAR-0001", Mode::Solar, heliosync_server::models::ChangedBy::Manual, None)
        .await
        .unwrap();

    app.clock.set(kyiv(22, 0));
    scheduler(&app).tick().await.unwrap();

    let mode = app.mode_repository.get("SOLAR-0001").await.unwrap().unwrap();
    assert_eq!(mode.current_mode, "grid");
}

#[tokio::test]
async fn test_weekly_range_skips_unlisted_day() {
    let app = MockApp::new().await;
    let user = app.create_test_user("range@test.com").await;
    app.create_test_device("SOLAR-0001", &user).await;

    // Tuesday only; the clock is on a Monday.
    let mut weekly = range_draft("SOLAR-0001", user.id);
    weekly.repeat_type = "weekly".to_string();
    weekly.repeat_days = Some("[2]".to_string());
    app.schedule_repository.create(&weekly).await.unwrap();

    app.mode_repository
        .set_mode("SOLAR-0001", Mode::Grid, heliosync_server::models::ChangedBy::Manual, None)
        .await
        .unwrap();

    app.clock.set(kyiv(8, 0));
    scheduler(&app).tick().await.unwrap();

    let mode = app.mode_repository.get("SOLAR-0001").await.unwrap().unwrap();
    assert_eq!(mode.current_mode, "grid");
}
