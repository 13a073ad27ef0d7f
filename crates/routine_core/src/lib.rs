pub mod calendar;
pub mod collection;
pub mod error;
pub mod item;
pub mod notifications;
pub mod period;
pub mod schedule;
pub mod service;
pub mod status;
pub mod store;
pub mod sweep;

pub use crate::error::{Error, Result};
pub use crate::item::{ItemKind, ItemPatch, Recurrence, RecurringItem, Timestamp};
pub use crate::period::{resolve_period, PeriodInfo};
pub use crate::schedule::{compute_next_occurrence, find_overdue};
pub use crate::service::{RoutineService, RoutineServiceBuilder};
pub use crate::status::{derive_status, ItemStatus};
pub use crate::store::{JsonFileStore, MemoryStore, RoutineStore};
pub use crate::sweep::{SweepReport, SweepToken};
