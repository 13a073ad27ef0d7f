use std::fmt;

use chrono::{
    DateTime, FixedOffset, NaiveDate, NaiveDateTime, Offset, SecondsFormat, TimeZone, Utc,
};
use serde::{Deserialize, Deserializer, Serialize};

use crate::calendar::{local_midnight, CalendarUnit};

/// Recurrence cadence stored on an item. `None` marks a one-off task.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Recurrence {
    #[default]
    None,
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl Recurrence {
    /// Calendar unit driving the period math, or `None` for one-off items.
    pub fn calendar_unit(self) -> Option<CalendarUnit> {
        match self {
            Recurrence::None => None,
            Recurrence::Daily => Some(CalendarUnit::Day),
            Recurrence::Weekly => Some(CalendarUnit::Week),
            Recurrence::Monthly => Some(CalendarUnit::Month),
            Recurrence::Yearly => Some(CalendarUnit::Year),
        }
    }

    pub fn is_recurring(self) -> bool {
        self != Recurrence::None
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "none" | "" => Some(Recurrence::None),
            "daily" | "day" | "d" => Some(Recurrence::Daily),
            "weekly" | "week" | "w" => Some(Recurrence::Weekly),
            "monthly" | "month" | "m" => Some(Recurrence::Monthly),
            "yearly" | "year" | "y" => Some(Recurrence::Yearly),
            _ => None,
        }
    }
}

impl fmt::Display for Recurrence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Recurrence::None => "none",
            Recurrence::Daily => "daily",
            Recurrence::Weekly => "weekly",
            Recurrence::Monthly => "monthly",
            Recurrence::Yearly => "yearly",
        };
        f.write_str(text)
    }
}

/// The two logical collections items live in.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    #[default]
    Task,
    Routine,
}

impl ItemKind {
    pub const ALL: [ItemKind; 2] = [ItemKind::Task, ItemKind::Routine];

    pub fn collection_name(self) -> &'static str {
        match self {
            ItemKind::Task => "tasks",
            ItemKind::Routine => "routines",
        }
    }
}

/// Clamps a raw interval to a whole number of units, at least one.
///
/// Fractions are floored; NaN, infinities and anything below one become 1.
/// Values above [`MAX_INTERVAL`] are capped.
pub fn normalize_interval(raw: f64) -> u32 {
    if !raw.is_finite() {
        return 1;
    }
    let floored = raw.floor();
    if floored < 1.0 {
        1
    } else if floored >= f64::from(MAX_INTERVAL) {
        MAX_INTERVAL
    } else {
        floored as u32
    }
}

/// Largest interval the engine schedules with. Keeps every period of a
/// recurring item inside chrono's date range.
pub const MAX_INTERVAL: u32 = 10_000;

/// Accepts numbers, numeric strings and null for `recurrenceInterval`.
fn deserialize_interval<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    let raw = match value {
        Some(serde_json::Value::Number(number)) => number.as_f64().unwrap_or(f64::NAN),
        Some(serde_json::Value::String(text)) => text.trim().parse::<f64>().unwrap_or(f64::NAN),
        _ => f64::NAN,
    };
    Ok(normalize_interval(raw))
}

/// Null or unknown units read as one-off so a bad row still loads.
fn deserialize_recurrence<'de, D>(deserializer: D) -> Result<Recurrence, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(text)) => Recurrence::parse(&text).unwrap_or_default(),
        _ => Recurrence::None,
    })
}

/// Unreadable creation times fall back to the Unix epoch.
fn deserialize_created_at<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(text)) => {
            Timestamp::new(text).parse_in(&Utc).unwrap_or_default()
        }
        _ => DateTime::<Utc>::default(),
    })
}

fn default_interval() -> u32 {
    1
}

/// Stored ISO-8601 timestamp, kept as written and parsed on demand.
///
/// Parsing never fails loudly: text that cannot be read is reported as
/// `None`, which callers treat the same as an absent value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(String);

impl Timestamp {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn from_datetime<Tz: TimeZone>(at: &DateTime<Tz>) -> Self {
        Self(
            at.with_timezone(&Utc)
                .to_rfc3339_opts(SecondsFormat::Millis, true),
        )
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// Parses the stored text. Offset-less values are read as wall-clock
    /// time in `tz`; a bare date is local midnight.
    pub fn parse_in<Tz: TimeZone>(&self, tz: &Tz) -> Option<DateTime<Tz>> {
        let text = self.0.trim();
        if text.is_empty() {
            return None;
        }
        if let Ok(at) = DateTime::parse_from_rfc3339(text) {
            return Some(at.with_timezone(tz));
        }
        for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
            if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
                return tz.from_local_datetime(&naive).earliest();
            }
        }
        NaiveDate::parse_from_str(text, "%Y-%m-%d")
            .ok()
            .map(|date| local_midnight(tz, date))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A task or routine record as the store hands it to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecurringItem {
    pub id: String,
    #[serde(default)]
    pub owner_id: String,
    #[serde(default)]
    pub kind: ItemKind,
    #[serde(default)]
    pub title: String,
    #[serde(default, deserialize_with = "deserialize_created_at")]
    pub created_at: DateTime<Utc>,
    #[serde(default, deserialize_with = "deserialize_recurrence")]
    pub recurrence_unit: Recurrence,
    #[serde(default = "default_interval", deserialize_with = "deserialize_interval")]
    pub recurrence_interval: u32,
    #[serde(default)]
    pub completed: bool,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub last_completed_at: Option<Timestamp>,
    #[serde(default)]
    pub next_occurrence_at: Option<Timestamp>,
}

fn default_active() -> bool {
    true
}

impl RecurringItem {
    pub fn new(
        id: impl Into<String>,
        owner_id: impl Into<String>,
        kind: ItemKind,
        title: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            owner_id: owner_id.into(),
            kind,
            title: title.into(),
            created_at,
            recurrence_unit: Recurrence::None,
            recurrence_interval: 1,
            completed: false,
            active: true,
            last_completed_at: None,
            next_occurrence_at: None,
        }
    }

    pub fn with_recurrence(mut self, unit: Recurrence, interval: u32) -> Self {
        self.recurrence_unit = unit;
        self.recurrence_interval = interval.clamp(1, MAX_INTERVAL);
        self
    }

    pub fn is_recurring(&self) -> bool {
        self.recurrence_unit.is_recurring()
    }

    /// Interval clamped to `1..=MAX_INTERVAL`.
    pub fn interval(&self) -> u32 {
        self.recurrence_interval.clamp(1, MAX_INTERVAL)
    }

    /// A blank `lastCompletedAt` counts as never completed.
    pub fn has_been_completed(&self) -> bool {
        self.last_completed_at
            .as_ref()
            .is_some_and(|stamp| !stamp.is_blank())
    }

    pub fn next_occurrence_in<Tz: TimeZone>(&self, tz: &Tz) -> Option<DateTime<Tz>> {
        self.next_occurrence_at
            .as_ref()
            .and_then(|stamp| stamp.parse_in(tz))
    }

    pub fn last_completed_in<Tz: TimeZone>(&self, tz: &Tz) -> Option<DateTime<Tz>> {
        self.last_completed_at
            .as_ref()
            .and_then(|stamp| stamp.parse_in(tz))
    }

    /// Applies a patch produced by the scheduler flows.
    pub fn apply(&mut self, patch: &ItemPatch) {
        if let Some(value) = &patch.last_completed_at {
            self.last_completed_at = value.clone();
        }
        if let Some(value) = &patch.next_occurrence_at {
            self.next_occurrence_at = value.clone();
        }
        if let Some(active) = patch.active {
            self.active = active;
        }
        if let Some(completed) = patch.completed {
            self.completed = completed;
        }
    }
}

/// Partial update of the mutable recurrence fields.
///
/// The outer `Option` says whether a field is written; the inner one is the
/// new value, so `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_completed_at: Option<Option<Timestamp>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_occurrence_at: Option<Option<Timestamp>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
}

impl ItemPatch {
    pub fn is_empty(&self) -> bool {
        self.last_completed_at.is_none()
            && self.next_occurrence_at.is_none()
            && self.active.is_none()
            && self.completed.is_none()
    }
}

/// Converts any zoned instant to the fixed offset it was observed at.
pub fn to_fixed<Tz: TimeZone>(at: &DateTime<Tz>) -> DateTime<FixedOffset> {
    at.with_timezone(&at.offset().fix())
}
