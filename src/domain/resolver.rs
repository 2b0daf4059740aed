use crate::domain::models::{
    minutes_of_day, EventName, ResolvedEvent, TimingTable, MINUTES_PER_DAY,
};
use chrono::{NaiveTime, Timelike};

/// Next primary event after `now` and the whole seconds left until it.
///
/// When every event of the day has passed the result is tomorrow's Fajr, computed
/// from today's Fajr time. That approximation can drift by a few minutes near the
/// solstices and at high latitudes.
pub fn resolve(table: &TimingTable, now: NaiveTime) -> ResolvedEvent {
    let now_minutes = minutes_of_day(now);
    let now_seconds = i64::from(now.second());

    for (event, event_minutes) in table.primary_events() {
        if event_minutes > now_minutes {
            return ResolvedEvent {
                next: event,
                remaining_seconds: (event_minutes - now_minutes) * 60 - now_seconds,
                wraps_to_tomorrow: false,
            };
        }
    }

    let fajr_tomorrow = table.fajr_minutes() + MINUTES_PER_DAY;
    ResolvedEvent {
        next: EventName::Fajr,
        remaining_seconds: (fajr_tomorrow - now_minutes) * 60 - now_seconds,
        wraps_to_tomorrow: true,
    }
}

/// Signed seconds from `now` to `event` on the same calendar day.
///
/// Zero at the event's minute boundary, negative once it has passed.
pub fn seconds_until(table: &TimingTable, event: EventName, now: NaiveTime) -> Option<i64> {
    let event_minutes = table.minutes(event)?;
    let now_total = minutes_of_day(now) * 60 + i64::from(now.second());
    Some(event_minutes * 60 - now_total)
}
