use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Datelike, Timelike, Utc};
use chrono_tz::Tz;
use tokio::time::MissedTickBehavior;

use crate::models::{ChangedBy, RepeatType, Schedule, ScheduleKind};
use crate::repositories::{EnergyModeRepository, ScheduleRepository};
use crate::services::clock::Clock;
use crate::services::dispatcher::{commands, CommandSink};
use crate::services::recurrence::next_fire_time;

/// Whether a range schedule is active on the given weekday
/// (0 = Sunday .. 6 = Saturday).
pub fn should_run_today(repeat: RepeatType, repeat_days: &[u32], weekday: u32) -> bool {
    match repeat {
        RepeatType::Once | RepeatType::Daily => true,
        RepeatType::Weekdays => (1..=5).contains(&weekday),
        RepeatType::Weekends => weekday == 0 || weekday == 6,
        RepeatType::Weekly => repeat_days.contains(&weekday),
    }
}

/// Minute-of-day range test. `end <= start` means the window crosses
/// midnight.
pub fn in_range(now_minutes: u32, start_minutes: u32, end_minutes: u32) -> bool {
    if end_minutes <= start_minutes {
        now_minutes >= start_minutes || now_minutes < end_minutes
    } else {
        now_minutes >= start_minutes && now_minutes < end_minutes
    }
}

/// The tick engine: the only writer that mutates schedules based on
/// time. One pass per tick interval; fixed-time schedules fire when
/// their precomputed next-fire time arrives, range schedules fire only
/// at exact boundary minutes. A tick that overruns delays the next
/// tick, it never overlaps it.
pub struct SchedulerService {
    schedule_repository: Arc<ScheduleRepository>,
    mode_repository: Arc<EnergyModeRepository>,
    dispatcher: Arc<dyn CommandSink>,
    clock: Arc<dyn Clock>,
    zone: Tz,
    tick_interval: Duration,
}

impl SchedulerService {
    pub fn new(
        schedule_repository: Arc<ScheduleRepository>,
        mode_repository: Arc<EnergyModeRepository>,
        dispatcher: Arc<dyn CommandSink>,
        clock: Arc<dyn Clock>,
        zone: Tz,
        tick_interval: Duration,
    ) -> Self {
        Self {
            schedule_repository,
            mode_repository,
            dispatcher,
            clock,
            zone,
            tick_interval,
        }
    }

    pub async fn run(self: Arc<Self>) {
        let mut interval = tokio::time::interval(self.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            zone = %self.zone,
            period_secs = self.tick_interval.as_secs(),
            "schedule checker started"
        );

        loop {
            interval.tick().await;
            if let Err(e) = self.tick().await {
                tracing::error!("schedule tick failed: {}", e);
            }
        }
    }

    /// One evaluation pass. The clock snapshot taken here is used for
    /// every comparison in the pass, so a tick straddling a minute
    /// boundary stays internally consistent.
    pub async fn tick(&self) -> Result<(), sqlx::Error> {
        let now = self.clock.now();
        let local = now.with_timezone(&self.zone);
        let current_hour = local.hour();
        let current_minute = local.minute();
        let current_weekday = local.weekday().num_days_from_sunday();

        let due = self.schedule_repository.find_due_fixed(now).await?;
        if !due.is_empty() {
            tracing::info!(count = due.len(), "fixed-time schedules due");
        }

        for schedule in due {
            if let Err(e) = self.execute_fixed(&schedule, now).await {
                tracing::error!(
                    schedule_id = schedule.id,
                    device_id = %schedule.device_id,
                    "error executing fixed-time schedule: {}",
                    e
                );
            }
        }

        let ranges = self.schedule_repository.find_enabled_range().await?;
        for schedule in ranges {
            if let Err(e) = self
                .evaluate_range(&schedule, now, current_hour, current_minute, current_weekday)
                .await
            {
                tracing::error!(
                    schedule_id = schedule.id,
                    device_id = %schedule.device_id,
                    "error evaluating range schedule: {}",
                    e
                );
            }
        }

        Ok(())
    }

    async fn execute_fixed(&self, schedule: &Schedule, now: DateTime<Utc>) -> anyhow::Result<()> {
        let Some(ScheduleKind::FixedTime { hour, minute }) = schedule.kind() else {
            tracing::warn!(schedule_id = schedule.id, "skipping malformed schedule row");
            return Ok(());
        };
        let Some(target) = schedule.target() else {
            tracing::warn!(schedule_id = schedule.id, "skipping schedule with invalid mode");
            return Ok(());
        };

        tracing::info!(
            schedule_id = schedule.id,
            device_id = %schedule.device_id,
            name = %schedule.name,
            mode = %target,
            "executing fixed-time schedule"
        );

        // Mode write, history append and schedule bookkeeping commit
        // as one unit; dispatch only happens once this is durable.
        let mut tx = self.schedule_repository.get_pool().begin().await?;

        let previous = self
            .mode_repository
            .get_in_tx(&schedule.device_id, &mut tx)
            .await?
            .and_then(|m| m.mode());

        self.mode_repository
            .upsert(&schedule.device_id, target, ChangedBy::Schedule, &mut tx)
            .await?;
        self.mode_repository
            .append_history(
                &schedule.device_id,
                previous,
                target,
                ChangedBy::Schedule,
                Some(schedule.id),
                &mut tx,
            )
            .await?;

        match schedule.repeat() {
            RepeatType::Once => {
                self.schedule_repository
                    .mark_fired_once(schedule.id, now, &mut tx)
                    .await?;
            }
            repeat => {
                let next = next_fire_time(
                    hour,
                    minute,
                    repeat,
                    &schedule.repeat_days(),
                    now.with_timezone(&self.zone),
                )
                .with_timezone(&Utc);

                self.schedule_repository
                    .mark_fired_recurring(schedule.id, now, next, &mut tx)
                    .await?;
            }
        }

        tx.commit().await?;

        self.dispatch_detached(
            schedule.device_id.clone(),
            commands::set_energy_mode(
                target,
                ChangedBy::Schedule,
                Some(&schedule.name),
                now.timestamp_millis(),
            ),
        );

        Ok(())
    }

    async fn evaluate_range(
        &self,
        schedule: &Schedule,
        now: DateTime<Utc>,
        current_hour: u32,
        current_minute: u32,
        current_weekday: u32,
    ) -> anyhow::Result<()> {
        let Some(ScheduleKind::Range {
            start_hour,
            start_minute,
            end_hour,
            end_minute,
            secondary_mode,
        }) = schedule.kind()
        else {
            tracing::warn!(schedule_id = schedule.id, "skipping malformed schedule row");
            return Ok(());
        };
        let Some(target) = schedule.target() else {
            tracing::warn!(schedule_id = schedule.id, "skipping schedule with invalid mode");
            return Ok(());
        };

        if !should_run_today(schedule.repeat(), &schedule.repeat_days(), current_weekday) {
            return Ok(());
        }

        let now_minutes = current_hour * 60 + current_minute;
        let start_minutes = start_hour * 60 + start_minute;
        let end_minutes = end_hour * 60 + end_minute;

        let effective_secondary = secondary_mode.unwrap_or_else(|| target.complement());
        let expected = if in_range(now_minutes, start_minutes, end_minutes) {
            target
        } else {
            effective_secondary
        };

        // Edge trigger only: the window re-asserts its mode at the
        // exact start/end minute, never on the ticks in between.
        let at_start = current_hour == start_hour && current_minute == start_minute;
        let at_end = current_hour == end_hour && current_minute == end_minute;
        if !at_start && !at_end {
            return Ok(());
        }

        let current = self
            .mode_repository
            .get(&schedule.device_id)
            .await?
            .and_then(|m| m.mode());

        if current == Some(expected) {
            return Ok(());
        }

        tracing::info!(
            schedule_id = schedule.id,
            device_id = %schedule.device_id,
            name = %schedule.name,
            boundary = if at_start { "start" } else { "end" },
            from = ?current,
            to = %expected,
            "range schedule transition"
        );

        let mut tx = self.schedule_repository.get_pool().begin().await?;

        self.mode_repository
            .upsert(&schedule.device_id, expected, ChangedBy::ScheduleRange, &mut tx)
            .await?;
        self.mode_repository
            .append_history(
                &schedule.device_id,
                current,
                expected,
                ChangedBy::ScheduleRange,
                Some(schedule.id),
                &mut tx,
            )
            .await?;
        self.schedule_repository
            .mark_range_fired(schedule.id, now, &mut tx)
            .await?;

        tx.commit().await?;

        self.dispatch_detached(
            schedule.device_id.clone(),
            commands::set_energy_mode(
                expected,
                ChangedBy::ScheduleRange,
                Some(&schedule.name),
                now.timestamp_millis(),
            ),
        );

        Ok(())
    }

    /// Publishing is detached from the commit path so slow transport
    /// I/O cannot starve the remaining schedules in a tick.
    fn dispatch_detached(&self, device_id: String, payload: serde_json::Value) {
        let sink = Arc::clone(&self.dispatcher);
        tokio::spawn(async move {
            if let Err(e) = sink.publish_command(&device_id, payload).await {
                tracing::error!(device_id = %device_id, "failed to dispatch command: {}", e);
            }
        });
    }
}
