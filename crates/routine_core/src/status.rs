use std::fmt;

use chrono::{DateTime, TimeZone};
use serde::{Deserialize, Serialize};

use crate::item::RecurringItem;

/// Display classification of an item, computed on read.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Active,
    Completed,
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemStatus::Active => f.write_str("active"),
            ItemStatus::Completed => f.write_str("completed"),
        }
    }
}

/// Classifies `item` as due or satisfied at `now`.
///
/// Recurring items are active until their first completion, and active
/// again once `now` reaches the stored next occurrence. An unreadable next
/// occurrence counts as missing, which keeps the item active.
pub fn derive_status<Tz: TimeZone>(item: &RecurringItem, now: &DateTime<Tz>) -> ItemStatus {
    if !item.is_recurring() {
        return if item.completed {
            ItemStatus::Completed
        } else {
            ItemStatus::Active
        };
    }
    if !item.has_been_completed() {
        return ItemStatus::Active;
    }
    match item.next_occurrence_in(&now.timezone()) {
        Some(next) if next > *now => ItemStatus::Completed,
        _ => ItemStatus::Active,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::{ItemKind, Recurrence, Timestamp};
    use chrono::Utc;

    fn routine() -> RecurringItem {
        let created = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        RecurringItem::new("r", "me", ItemKind::Routine, "Water plants", created)
            .with_recurrence(Recurrence::Daily, 1)
    }

    #[test]
    fn one_off_items_follow_their_flag() {
        let now = Utc::now();
        let mut task = routine().with_recurrence(Recurrence::None, 1);
        assert_eq!(derive_status(&task, &now), ItemStatus::Active);
        task.completed = true;
        assert_eq!(derive_status(&task, &now), ItemStatus::Completed);
    }

    #[test]
    fn never_completed_is_active_even_with_future_due_date() {
        let mut item = routine();
        item.next_occurrence_at = Some(Timestamp::new("2099-01-01T00:00:00Z"));
        assert_eq!(derive_status(&item, &Utc::now()), ItemStatus::Active);
    }

    #[test]
    fn completed_until_next_occurrence_passes() {
        let mut item = routine();
        item.last_completed_at = Some(Timestamp::new("2026-02-01T00:00:00Z"));
        item.next_occurrence_at = Some(Timestamp::new("2026-02-02T00:00:00Z"));

        let midday = Utc.with_ymd_and_hms(2026, 2, 1, 12, 0, 0).unwrap();
        assert_eq!(derive_status(&item, &midday), ItemStatus::Completed);

        let due = Utc.with_ymd_and_hms(2026, 2, 2, 0, 0, 0).unwrap();
        assert_eq!(derive_status(&item, &due), ItemStatus::Active);

        let after = Utc.with_ymd_and_hms(2026, 2, 2, 0, 0, 1).unwrap();
        assert_eq!(derive_status(&item, &after), ItemStatus::Active);
    }

    #[test]
    fn malformed_or_missing_next_occurrence_is_active() {
        let now = Utc.with_ymd_and_hms(2026, 2, 1, 12, 0, 0).unwrap();
        let mut item = routine();
        item.last_completed_at = Some(Timestamp::new("2026-02-01T00:00:00Z"));

        for raw in ["not a date", "", "2026-13-45", "2026-02-02T25:00:00Z"] {
            item.next_occurrence_at = Some(Timestamp::new(raw));
            assert_eq!(derive_status(&item, &now), ItemStatus::Active, "input {raw:?}");
        }
        item.next_occurrence_at = None;
        assert_eq!(derive_status(&item, &now), ItemStatus::Active);
    }
}
