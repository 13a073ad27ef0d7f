use chrono::{DateTime, TimeZone};

use crate::calendar::{add_units, local_midnight, start_of_day};
use crate::item::{ItemPatch, Recurrence, RecurringItem, Timestamp, MAX_INTERVAL};
use crate::status::{derive_status, ItemStatus};

/// Next due instant: local midnight of `from`'s day plus `interval` units.
///
/// `None` for non-recurring units or when the date leaves chrono's range.
pub fn compute_next_occurrence<Tz: TimeZone>(
    unit: Recurrence,
    interval: u32,
    from: &DateTime<Tz>,
) -> Option<DateTime<Tz>> {
    let unit = unit.calendar_unit()?;
    let interval = interval.clamp(1, MAX_INTERVAL);
    let base = from.date_naive();
    let next = add_units(base, i64::from(interval), unit)?;
    Some(local_midnight(&from.timezone(), next))
}

/// Patch recording a completion at `now` and pushing the due date forward.
pub fn log_completion<Tz: TimeZone>(
    item: &RecurringItem,
    now: &DateTime<Tz>,
) -> Option<ItemPatch> {
    let next = compute_next_occurrence(item.recurrence_unit, item.interval(), now)?;
    Some(ItemPatch {
        last_completed_at: Some(Some(Timestamp::from_datetime(now))),
        next_occurrence_at: Some(Some(Timestamp::from_datetime(&next))),
        active: Some(false),
        completed: None,
    })
}

/// Patch returning a satisfied item to due without advancing its schedule.
pub fn uncomplete<Tz: TimeZone>(now: &DateTime<Tz>) -> ItemPatch {
    ItemPatch {
        last_completed_at: Some(None),
        next_occurrence_at: Some(Some(Timestamp::from_datetime(&start_of_day(now)))),
        active: Some(true),
        completed: None,
    }
}

/// Whether a recurring item's stored due date is before today.
pub fn is_overdue<Tz: TimeZone>(item: &RecurringItem, now: &DateTime<Tz>) -> bool {
    if !item.is_recurring() {
        return false;
    }
    let today = start_of_day(now);
    item.next_occurrence_in(&now.timezone())
        .is_some_and(|next| next < today)
}

/// Recurring items whose due date fell behind without being touched.
pub fn find_overdue<'a, Tz: TimeZone>(
    items: &'a [RecurringItem],
    now: &DateTime<Tz>,
) -> Vec<&'a RecurringItem> {
    items.iter().filter(|item| is_overdue(item, now)).collect()
}

/// Patch repairing an overdue item: due again one interval from today.
///
/// The stale completion is cleared so the item reads as due immediately.
/// Returns `None` when the item is not overdue, which makes repeated sweeps
/// no-ops.
pub fn reschedule_overdue<Tz: TimeZone>(
    item: &RecurringItem,
    now: &DateTime<Tz>,
) -> Option<ItemPatch> {
    if !is_overdue(item, now) {
        return None;
    }
    let next = compute_next_occurrence(item.recurrence_unit, item.interval(), now)?;
    Some(ItemPatch {
        last_completed_at: Some(None),
        next_occurrence_at: Some(Some(Timestamp::from_datetime(&next))),
        active: Some(true),
        completed: None,
    })
}

/// Flips an item between due and satisfied.
pub fn toggle<Tz: TimeZone>(item: &RecurringItem, now: &DateTime<Tz>) -> Option<ItemPatch> {
    if !item.is_recurring() {
        return Some(ItemPatch {
            completed: Some(!item.completed),
            ..ItemPatch::default()
        });
    }
    match derive_status(item, now) {
        ItemStatus::Completed => Some(uncomplete(now)),
        ItemStatus::Active => log_completion(item, now),
    }
}
