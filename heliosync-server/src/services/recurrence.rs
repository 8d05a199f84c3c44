use chrono::{DateTime, Datelike, Duration, LocalResult, NaiveDateTime, TimeZone, Weekday};
use chrono_tz::Tz;

use crate::models::RepeatType;

/// Computes the next instant a fixed-time schedule should fire, always
/// strictly after `from`.
///
/// Weekday numbers follow the legacy backend and the firmware:
/// 0 = Sunday .. 6 = Saturday. Out-of-range hour/minute values are
/// clamped; the API layer rejects them before they are persisted.
///
/// Pure function: no hidden state, identical inputs yield identical
/// output.
pub fn next_fire_time(
    hour: u32,
    minute: u32,
    repeat: RepeatType,
    repeat_days: &[u32],
    from: DateTime<Tz>,
) -> DateTime<Tz> {
    let zone = from.timezone();
    let from_local = from.naive_local();

    let mut candidate = from_local
        .date()
        .and_hms_opt(hour.min(23), minute.min(59), 0)
        .unwrap_or(from_local);

    // Time already passed today: start from tomorrow.
    if candidate <= from_local {
        candidate += Duration::days(1);
    }

    match repeat {
        RepeatType::Once | RepeatType::Daily => resolve_local(&zone, candidate),
        RepeatType::Weekdays => {
            while matches!(candidate.weekday(), Weekday::Sat | Weekday::Sun) {
                candidate += Duration::days(1);
            }
            resolve_local(&zone, candidate)
        }
        RepeatType::Weekends => {
            while !matches!(candidate.weekday(), Weekday::Sat | Weekday::Sun) {
                candidate += Duration::days(1);
            }
            resolve_local(&zone, candidate)
        }
        RepeatType::Weekly => {
            if repeat_days.is_empty() {
                // Degrades to once semantics, matching the legacy
                // backend's fallthrough.
                return resolve_local(&zone, candidate);
            }

            // Canonical ascending order so equal-distance duplicates
            // cannot make the winner depend on list order.
            let mut days = repeat_days.to_vec();
            days.sort_unstable();
            days.dedup();

            let current_day = candidate.weekday().num_days_from_sunday();
            let mut min_days_ahead = 7;

            for target_day in days {
                let mut days_ahead = (target_day % 7 + 7 - current_day) % 7;

                // Today and the time has not passed yet: fire today.
                if days_ahead == 0 && candidate > from_local {
                    return resolve_local(&zone, candidate);
                }

                // Today but already passed: wrap a full week.
                if days_ahead == 0 {
                    days_ahead = 7;
                }

                min_days_ahead = min_days_ahead.min(days_ahead);
            }

            candidate += Duration::days(i64::from(min_days_ahead));
            resolve_local(&zone, candidate)
        }
    }
}

/// Maps a wall-clock time back onto the zone's timeline. Ambiguous
/// times (autumn fold) take the earlier instant; nonexistent times
/// (spring gap) roll forward to the first valid instant.
fn resolve_local(zone: &Tz, local: NaiveDateTime) -> DateTime<Tz> {
    match zone.from_local_datetime(&local) {
        LocalResult::Single(instant) => instant,
        LocalResult::Ambiguous(earliest, _) => earliest,
        LocalResult::None => {
            let mut probe = local;
            loop {
                probe += Duration::minutes(30);
                if let Some(instant) = zone.from_local_datetime(&probe).earliest() {
                    break instant;
                }
            }
        }
    }
}
