use chrono::{DateTime, NaiveTime, TimeZone, Utc};
use tracing::instrument;

use crate::{
    error::{Error, Result},
    item::{ItemKind, ItemPatch, RecurringItem},
    notifications::{NotificationRequest, NotificationSink},
    schedule,
    status::{derive_status, ItemStatus},
    store::{MemoryStore, RoutineStore},
    sweep::{SweepFailure, SweepReport, SweepToken},
};

/// Wires the pure recurrence engine to a store and a reminder sink.
///
/// Every mutation goes through a named operation here; callers feed the
/// returned record back into their view collection.
pub struct RoutineService {
    owner_id: String,
    store: Box<dyn RoutineStore>,
    notification_sink: Option<Box<dyn NotificationSink>>,
    reminder_time: NaiveTime,
}

pub struct RoutineServiceBuilder {
    owner_id: String,
    store: Option<Box<dyn RoutineStore>>,
    notification_sink: Option<Box<dyn NotificationSink>>,
    reminder_time: NaiveTime,
}

impl Default for RoutineServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RoutineServiceBuilder {
    pub fn new() -> Self {
        Self {
            owner_id: String::new(),
            store: None,
            notification_sink: None,
            reminder_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap_or(NaiveTime::MIN),
        }
    }

    pub fn owner(mut self, owner_id: impl Into<String>) -> Self {
        self.owner_id = owner_id.into();
        self
    }

    pub fn with_store(mut self, store: Box<dyn RoutineStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_notification_sink(mut self, sink: Box<dyn NotificationSink>) -> Self {
        self.notification_sink = Some(sink);
        self
    }

    /// Local time of day reminders fire on the due date.
    pub fn reminder_time(mut self, time: NaiveTime) -> Self {
        self.reminder_time = time;
        self
    }

    pub fn build(self) -> RoutineService {
        RoutineService {
            owner_id: self.owner_id,
            store: self.store.unwrap_or_else(|| Box::new(MemoryStore::new())),
            notification_sink: self.notification_sink,
            reminder_time: self.reminder_time,
        }
    }
}

impl RoutineService {
    pub fn builder() -> RoutineServiceBuilder {
        RoutineServiceBuilder::new()
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    pub fn items(&self, kind: ItemKind) -> Result<Vec<RecurringItem>> {
        self.store.list_items(&self.owner_id, kind)
    }

    /// Tasks followed by routines.
    pub fn all_items(&self) -> Result<Vec<RecurringItem>> {
        let mut items = Vec::new();
        for kind in ItemKind::ALL {
            items.extend(self.items(kind)?);
        }
        Ok(items)
    }

    pub fn get_item(&self, id: &str) -> Result<RecurringItem> {
        let item = self.store.get_item(id)?;
        self.ensure_owned(&item)?;
        Ok(item)
    }

    /// Inserts a new record owned by this service's owner.
    #[instrument(skip(self, item), fields(id = %item.id))]
    pub fn add_item(&self, mut item: RecurringItem) -> Result<RecurringItem> {
        item.owner_id = self.owner_id.clone();
        item.recurrence_interval = item.interval();
        self.store.insert_item(item)
    }

    #[instrument(skip(self))]
    pub fn delete_item(&self, id: &str) -> Result<()> {
        let item = self.get_item(id)?;
        self.store.delete_item(id)?;
        if let Some(sink) = &self.notification_sink {
            sink.clear_for_item(&item);
        }
        Ok(())
    }

    /// Marks a recurring item done at `now` and schedules its next reminder.
    #[instrument(skip(self, now))]
    pub fn log_completion<Tz: TimeZone>(
        &self,
        id: &str,
        now: &DateTime<Tz>,
    ) -> Result<RecurringItem> {
        // The patch is computed in the caller's zone so local midnight of
        // the next due date follows any offset change in between.
        let plan = |item: &RecurringItem| schedule::log_completion(item, now);
        let updated = self
            .store
            .complete_and_reschedule(id, &self.owner_id, &plan)?;
        tracing::debug!(
            next = ?updated.next_occurrence_at,
            "completion logged"
        );
        self.schedule_reminder(&updated, now);
        Ok(updated)
    }

    /// Returns an item to due without advancing its schedule.
    #[instrument(skip(self, now))]
    pub fn uncomplete<Tz: TimeZone>(
        &self,
        id: &str,
        now: &DateTime<Tz>,
    ) -> Result<RecurringItem> {
        let item = self.get_item(id)?;
        let patch = if item.is_recurring() {
            schedule::uncomplete(now)
        } else {
            ItemPatch {
                completed: Some(false),
                ..ItemPatch::default()
            }
        };
        let updated = self.store.update_item(id, &patch)?;
        if let Some(sink) = &self.notification_sink {
            sink.clear_for_item(&updated);
        }
        Ok(updated)
    }

    /// Completes an active item or un-completes a completed one.
    #[instrument(skip(self, now))]
    pub fn toggle<Tz: TimeZone>(&self, id: &str, now: &DateTime<Tz>) -> Result<RecurringItem> {
        let item = self.get_item(id)?;
        if !item.is_recurring() {
            let patch = schedule::toggle(&item, now).ok_or_else(|| Error::Schedule(id.into()))?;
            return self.store.update_item(id, &patch);
        }
        match derive_status(&item, now) {
            ItemStatus::Active => self.log_completion(id, now),
            ItemStatus::Completed => self.uncomplete(id, now),
        }
    }

    /// Repairs recurring items whose due date slipped into the past.
    ///
    /// Candidates are processed one by one. A failed update is logged and
    /// recorded in the report without stopping the sweep; cancelling
    /// `token` stops it before the next item.
    #[instrument(skip(self, now, token))]
    pub fn reschedule_overdue<Tz: TimeZone>(
        &self,
        now: &DateTime<Tz>,
        token: &SweepToken,
    ) -> Result<SweepReport> {
        let items = self.all_items()?;
        let candidates = schedule::find_overdue(&items, now);
        let mut report = SweepReport::default();

        for item in candidates {
            if token.is_cancelled() {
                report.cancelled = true;
                report.skipped.push(item.id.clone());
                continue;
            }
            let Some(patch) = schedule::reschedule_overdue(item, now) else {
                continue;
            };
            match self.store.update_item(&item.id, &patch) {
                Ok(updated) => {
                    tracing::debug!(id = %updated.id, "rescheduled overdue item");
                    report.repaired.push(updated.id);
                }
                Err(err) => {
                    tracing::warn!(id = %item.id, %err, "failed to reschedule overdue item");
                    report.failed.push(SweepFailure {
                        item_id: item.id.clone(),
                        message: err.to_string(),
                    });
                }
            }
        }

        if report.cancelled {
            tracing::debug!(skipped = report.skipped.len(), "overdue sweep cancelled");
        }
        Ok(report)
    }
}

impl RoutineService {
    fn ensure_owned(&self, item: &RecurringItem) -> Result<()> {
        if item.owner_id != self.owner_id {
            return Err(Error::OwnerMismatch {
                id: item.id.clone(),
                owner_id: self.owner_id.clone(),
            });
        }
        Ok(())
    }

    fn schedule_reminder<Tz: TimeZone>(&self, item: &RecurringItem, now: &DateTime<Tz>) {
        let Some(sink) = &self.notification_sink else {
            return;
        };
        let tz = now.timezone();
        let Some(next) = item.next_occurrence_in(&tz) else {
            return;
        };
        let naive = next.date_naive().and_time(self.reminder_time);
        let Some(when) = tz.from_local_datetime(&naive).earliest() else {
            return;
        };
        let title = if item.title.is_empty() {
            format!("Routine {}", item.id)
        } else {
            item.title.clone()
        };
        sink.schedule(NotificationRequest {
            item_id: item.id.clone(),
            title,
            body: format!("Due on {}", next.date_naive()),
            scheduled_for: when.with_timezone(&Utc),
        });
    }
}
