use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::item::RecurringItem;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationRequest {
    pub item_id: String,
    pub title: String,
    pub body: String,
    pub scheduled_for: DateTime<Utc>,
}

/// Platform-specific reminder adapters implement this trait.
pub trait NotificationSink: Send + Sync {
    fn schedule(&self, notification: NotificationRequest);
    fn clear_for_item(&self, item: &RecurringItem);
}

/// Sink that only records reminders in the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotificationSink;

impl NotificationSink for LogNotificationSink {
    fn schedule(&self, notification: NotificationRequest) {
        tracing::info!(
            item = %notification.item_id,
            at = %notification.scheduled_for,
            title = %notification.title,
            "reminder scheduled"
        );
    }

    fn clear_for_item(&self, item: &RecurringItem) {
        tracing::info!(item = %item.id, "reminders cleared");
    }
}
