use chrono::{DateTime, Duration, FixedOffset, TimeZone};
use serde::{Deserialize, Serialize};

use crate::calendar::{
    add_units, day_key, elapsed_units, local_midnight, period_start, unit_label, CalendarUnit,
};
use crate::item::{to_fixed, RecurringItem};

/// The bucketed window a recurring item is evaluated against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodInfo {
    pub start: DateTime<FixedOffset>,
    /// Inclusive: one second before the next period starts.
    pub end: DateTime<FixedOffset>,
    pub start_day_key: String,
    pub end_day_key: String,
    pub period_label: String,
    pub bucket_index: i64,
}

impl PeriodInfo {
    /// Whether a `yyyy-MM-dd` key falls inside the period's day range.
    pub fn contains_day(&self, key: &str) -> bool {
        key >= self.start_day_key.as_str() && key <= self.end_day_key.as_str()
    }

    pub fn contains<Tz: TimeZone>(&self, at: &DateTime<Tz>) -> bool {
        let at = to_fixed(at);
        at >= self.start && at <= self.end
    }
}

/// Computes the period `item` currently belongs to, in `now`'s time zone.
///
/// Returns `None` only for non-recurring items; intervals are capped so
/// every period stays inside chrono's date range. Items created after
/// `now` resolve to their first period.
pub fn resolve_period<Tz: TimeZone>(
    item: &RecurringItem,
    now: &DateTime<Tz>,
) -> Option<PeriodInfo> {
    let unit = item.recurrence_unit.calendar_unit()?;
    let tz = now.timezone();
    let interval = item.interval();

    let created_local = item.created_at.with_timezone(&tz).date_naive();
    let anchor = period_start(created_local, unit);
    let cursor = period_start(now.date_naive(), unit);
    let elapsed = elapsed_units(anchor, cursor, unit).max(0);
    let bucket_index = elapsed / i64::from(interval);

    let start_date = add_units(anchor, bucket_index * i64::from(interval), unit)?;
    let next_start_date = add_units(start_date, i64::from(interval), unit)?;

    let start = local_midnight(&tz, start_date);
    let end = local_midnight(&tz, next_start_date) - Duration::seconds(1);

    Some(PeriodInfo {
        start_day_key: day_key(start.date_naive()),
        end_day_key: day_key(end.date_naive()),
        start: to_fixed(&start),
        end: to_fixed(&end),
        period_label: unit_label(unit, interval),
        bucket_index,
    })
}

/// Label for an item's period, independent of any clock.
pub fn period_label(item: &RecurringItem) -> Option<String> {
    let unit: CalendarUnit = item.recurrence_unit.calendar_unit()?;
    Some(unit_label(unit, item.interval()))
}
