//! Per-view item collection.
//!
//! A view owns one [`ItemCollection`] and changes it only by dispatching
//! [`Action`]s, so every mutation of displayed state has a name.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;

use crate::item::{ItemKind, RecurringItem};
use crate::period::{resolve_period, PeriodInfo};
use crate::status::{derive_status, ItemStatus};

/// An item together with what the engine derived for it at one instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemView {
    pub item: RecurringItem,
    pub status: ItemStatus,
    pub period: Option<PeriodInfo>,
    pub next_occurrence: Option<DateTime<Utc>>,
}

impl ItemView {
    pub fn evaluate<Tz: TimeZone>(item: RecurringItem, now: &DateTime<Tz>) -> Self {
        let status = derive_status(&item, now);
        let period = resolve_period(&item, now);
        let next_occurrence = item
            .next_occurrence_in(&now.timezone())
            .map(|next| next.with_timezone(&Utc));
        Self {
            item,
            status,
            period,
            next_occurrence,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum StatusFilter {
    #[default]
    All,
    Active,
    Completed,
}

impl StatusFilter {
    pub fn matches(self, status: ItemStatus) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::Active => status == ItemStatus::Active,
            StatusFilter::Completed => status == ItemStatus::Completed,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum SortKey {
    /// Soonest due first; items without a due date last.
    #[default]
    NextOccurrence,
    Title,
    CreatedAt,
}

#[derive(Debug, Clone)]
pub enum Action {
    Loaded(Vec<RecurringItem>),
    Upserted(RecurringItem),
    Removed(String),
}

#[derive(Debug, Clone, Default)]
pub struct ItemCollection {
    kind: Option<ItemKind>,
    items: Vec<RecurringItem>,
}

impl ItemCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collection that ignores records from other kinds.
    pub fn for_kind(kind: ItemKind) -> Self {
        Self {
            kind: Some(kind),
            items: Vec::new(),
        }
    }

    pub fn dispatch(&mut self, action: Action) {
        match action {
            Action::Loaded(items) => {
                self.items = items.into_iter().filter(|item| self.accepts(item)).collect();
            }
            Action::Upserted(item) => {
                if !self.accepts(&item) {
                    self.items.retain(|existing| existing.id != item.id);
                    return;
                }
                match self.items.iter_mut().find(|existing| existing.id == item.id) {
                    Some(existing) => *existing = item,
                    None => self.items.push(item),
                }
            }
            Action::Removed(id) => self.items.retain(|item| item.id != id),
        }
    }

    pub fn items(&self) -> &[RecurringItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Evaluated, filtered and sorted rows for display.
    pub fn views<Tz: TimeZone>(
        &self,
        now: &DateTime<Tz>,
        filter: StatusFilter,
        sort: SortKey,
    ) -> Vec<ItemView> {
        let mut views: Vec<ItemView> = self
            .items
            .iter()
            .cloned()
            .map(|item| ItemView::evaluate(item, now))
            .filter(|view| filter.matches(view.status))
            .collect();
        sort_views(&mut views, sort);
        views
    }

    fn accepts(&self, item: &RecurringItem) -> bool {
        self.kind.map_or(true, |kind| item.kind == kind)
    }
}

pub fn sort_views(views: &mut [ItemView], sort: SortKey) {
    views.sort_by(|a, b| {
        let primary = match sort {
            SortKey::NextOccurrence => match (a.next_occurrence, b.next_occurrence) {
                (Some(left), Some(right)) => left.cmp(&right),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            },
            SortKey::Title => a
                .item
                .title
                .to_lowercase()
                .cmp(&b.item.title.to_lowercase()),
            SortKey::CreatedAt => a.item.created_at.cmp(&b.item.created_at),
        };
        primary.then_with(|| a.item.id.cmp(&b.item.id))
    });
}

/// Splits rows into active and completed, preserving order.
pub fn group_by_status(views: Vec<ItemView>) -> (Vec<ItemView>, Vec<ItemView>) {
    views
        .into_iter()
        .partition(|view| view.status == ItemStatus::Active)
}

/// Groups recurring rows by their period label; one-off items go under
/// `"one-off"`.
pub fn group_by_period_label(views: Vec<ItemView>) -> BTreeMap<String, Vec<ItemView>> {
    let mut groups: BTreeMap<String, Vec<ItemView>> = BTreeMap::new();
    for view in views {
        let label = view
            .period
            .as_ref()
            .map(|period| period.period_label.clone())
            .unwrap_or_else(|| "one-off".to_string());
        groups.entry(label).or_default().push(view);
    }
    groups
}
