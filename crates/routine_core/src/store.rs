//! Storage seam for task and routine records.
//!
//! The engine never talks to a database directly. Everything it needs from
//! persistence goes through [`RoutineStore`]: listing an owner's items,
//! patching a single record, and the atomic complete-and-reschedule step.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;

use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::RwLock;

use crate::error::{Error, Result};
use crate::item::{ItemKind, ItemPatch, RecurringItem};

/// Computes the completion patch for the row as currently stored.
///
/// Returning `None` means no next occurrence could be scheduled.
pub type CompletionPlan<'a> = &'a dyn Fn(&RecurringItem) -> Option<ItemPatch>;

pub trait RoutineStore: Send + Sync {
    /// All items of `kind` owned by `owner_id`, oldest first.
    fn list_items(&self, owner_id: &str, kind: ItemKind) -> Result<Vec<RecurringItem>>;

    fn get_item(&self, id: &str) -> Result<RecurringItem>;

    fn insert_item(&self, item: RecurringItem) -> Result<RecurringItem>;

    /// Writes the fields present in `patch` and returns the updated row.
    fn update_item(&self, id: &str, patch: &ItemPatch) -> Result<RecurringItem>;

    /// Checks ownership, runs `plan` against the stored row and writes its
    /// patch, all under one lock.
    fn complete_and_reschedule(
        &self,
        id: &str,
        owner_id: &str,
        plan: CompletionPlan<'_>,
    ) -> Result<RecurringItem>;

    fn delete_item(&self, id: &str) -> Result<()>;
}

/// Rows shared by both store implementations.
#[derive(Debug, Default, Clone)]
struct ItemTable {
    items: Vec<RecurringItem>,
}

impl ItemTable {
    fn list(&self, owner_id: &str, kind: ItemKind) -> Vec<RecurringItem> {
        let mut items: Vec<RecurringItem> = self
            .items
            .iter()
            .filter(|item| item.kind == kind && item.owner_id == owner_id)
            .cloned()
            .collect();
        items.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        items
    }

    fn get(&self, id: &str) -> Result<&RecurringItem> {
        self.items
            .iter()
            .find(|item| item.id == id)
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    fn get_mut(&mut self, id: &str) -> Result<&mut RecurringItem> {
        self.items
            .iter_mut()
            .find(|item| item.id == id)
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    fn insert(&mut self, item: RecurringItem) -> Result<RecurringItem> {
        if self.items.iter().any(|existing| existing.id == item.id) {
            return Err(Error::DuplicateId(item.id));
        }
        self.items.push(item.clone());
        Ok(item)
    }

    fn update(&mut self, id: &str, patch: &ItemPatch) -> Result<RecurringItem> {
        let item = self.get_mut(id)?;
        item.apply(patch);
        Ok(item.clone())
    }

    fn complete(
        &mut self,
        id: &str,
        owner_id: &str,
        plan: CompletionPlan<'_>,
    ) -> Result<RecurringItem> {
        let item = self.get_mut(id)?;
        if item.owner_id != owner_id {
            return Err(Error::OwnerMismatch {
                id: id.to_string(),
                owner_id: owner_id.to_string(),
            });
        }
        if !item.is_recurring() {
            return Err(Error::NotRecurring(id.to_string()));
        }
        let patch = plan(item).ok_or_else(|| Error::Schedule(id.to_string()))?;
        item.apply(&patch);
        Ok(item.clone())
    }

    fn remove(&mut self, id: &str) -> Result<RecurringItem> {
        let index = self
            .items
            .iter()
            .position(|item| item.id == id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        Ok(self.items.remove(index))
    }
}

/// Store kept entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    table: RwLock<ItemTable>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_items(items: impl IntoIterator<Item = RecurringItem>) -> Self {
        Self {
            table: RwLock::new(ItemTable {
                items: items.into_iter().collect(),
            }),
        }
    }
}

impl RoutineStore for MemoryStore {
    fn list_items(&self, owner_id: &str, kind: ItemKind) -> Result<Vec<RecurringItem>> {
        Ok(self.table.read().list(owner_id, kind))
    }

    fn get_item(&self, id: &str) -> Result<RecurringItem> {
        self.table.read().get(id).cloned()
    }

    fn insert_item(&self, item: RecurringItem) -> Result<RecurringItem> {
        self.table.write().insert(item)
    }

    fn update_item(&self, id: &str, patch: &ItemPatch) -> Result<RecurringItem> {
        self.table.write().update(id, patch)
    }

    fn complete_and_reschedule(
        &self,
        id: &str,
        owner_id: &str,
        plan: CompletionPlan<'_>,
    ) -> Result<RecurringItem> {
        self.table.write().complete(id, owner_id, plan)
    }

    fn delete_item(&self, id: &str) -> Result<()> {
        self.table.write().remove(id).map(|_| ())
    }
}

/// Store backed by one JSON array per collection: `tasks.json` and
/// `routines.json` inside a directory.
///
/// Writes go to disk before the in-memory rows change, so a failed write
/// leaves the store as it was.
pub struct JsonFileStore {
    dir: PathBuf,
    table: Arc<RwLock<ItemTable>>,
    watcher: Option<RecommendedWatcher>,
}

impl JsonFileStore {
    /// Opens (creating if needed) the store directory and loads both files.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        let table = load_table(&dir)?;
        tracing::debug!(
            dir = %dir.display(),
            items = table.items.len(),
            "opened json store"
        );
        Ok(Self {
            dir,
            table: Arc::new(RwLock::new(table)),
            watcher: None,
        })
    }

    pub fn collection_path(&self, kind: ItemKind) -> PathBuf {
        collection_path(&self.dir, kind)
    }

    /// Re-reads both collection files, replacing in-memory rows.
    pub fn reload(&self) -> Result<()> {
        let fresh = load_table(&self.dir)?;
        *self.table.write() = fresh;
        Ok(())
    }

    /// Reloads the collections whenever another writer touches the files.
    ///
    /// The returned receiver gets one message per successful reload; it
    /// disconnects once the store is dropped.
    pub fn watch(&mut self) -> Result<Receiver<()>> {
        self.watcher = None;
        let (reloaded, reloads) = mpsc::channel();
        let dir = self.dir.clone();
        let table = Arc::clone(&self.table);
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            let event = match res {
                Ok(event) => event,
                Err(err) => {
                    tracing::warn!(%err, "store watcher error");
                    return;
                }
            };
            if !matches!(
                event.kind,
                EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
            ) {
                return;
            }
            tracing::debug!(?event, "store change detected");
            match load_table(&dir) {
                Ok(fresh) => {
                    *table.write() = fresh;
                    let _ = reloaded.send(());
                }
                Err(err) => tracing::warn!(%err, "failed to reload store after change"),
            }
        })?;
        watcher.watch(&self.dir, RecursiveMode::NonRecursive)?;
        self.watcher = Some(watcher);
        Ok(reloads)
    }

    /// Applies `change` to a copy of the rows, writes the affected
    /// collection, then swaps the copy in.
    fn write_through<T>(
        &self,
        change: impl FnOnce(&mut ItemTable) -> Result<(T, ItemKind)>,
    ) -> Result<T> {
        let mut table = self.table.write();
        let mut staged = table.clone();
        let (value, kind) = change(&mut staged)?;
        self.persist(&staged, kind)?;
        *table = staged;
        Ok(value)
    }

    fn persist(&self, table: &ItemTable, kind: ItemKind) -> Result<()> {
        let rows: Vec<&RecurringItem> = table
            .items
            .iter()
            .filter(|item| item.kind == kind)
            .collect();
        let contents = serde_json::to_string_pretty(&rows)?;
        fs::write(collection_path(&self.dir, kind), contents)?;
        Ok(())
    }
}

impl RoutineStore for JsonFileStore {
    fn list_items(&self, owner_id: &str, kind: ItemKind) -> Result<Vec<RecurringItem>> {
        Ok(self.table.read().list(owner_id, kind))
    }

    fn get_item(&self, id: &str) -> Result<RecurringItem> {
        self.table.read().get(id).cloned()
    }

    fn insert_item(&self, item: RecurringItem) -> Result<RecurringItem> {
        self.write_through(|table| {
            let inserted = table.insert(item)?;
            let kind = inserted.kind;
            Ok((inserted, kind))
        })
    }

    fn update_item(&self, id: &str, patch: &ItemPatch) -> Result<RecurringItem> {
        if patch.is_empty() {
            return self.get_item(id);
        }
        self.write_through(|table| {
            let updated = table.update(id, patch)?;
            let kind = updated.kind;
            Ok((updated, kind))
        })
    }

    fn complete_and_reschedule(
        &self,
        id: &str,
        owner_id: &str,
        plan: CompletionPlan<'_>,
    ) -> Result<RecurringItem> {
        self.write_through(|table| {
            let updated = table.complete(id, owner_id, plan)?;
            let kind = updated.kind;
            Ok((updated, kind))
        })
    }

    fn delete_item(&self, id: &str) -> Result<()> {
        self.write_through(|table| {
            let removed = table.remove(id)?;
            Ok(((), removed.kind))
        })
    }
}

fn collection_path(dir: &Path, kind: ItemKind) -> PathBuf {
    dir.join(format!("{}.json", kind.collection_name()))
}

fn load_table(dir: &Path) -> Result<ItemTable> {
    let mut items = Vec::new();
    for kind in ItemKind::ALL {
        let path = collection_path(dir, kind);
        if !path.is_file() {
            continue;
        }
        let raw = fs::read_to_string(&path)?;
        if raw.trim().is_empty() {
            continue;
        }
        let rows: Vec<RecurringItem> = serde_json::from_str(&raw)?;
        // The file an item lives in decides its collection.
        items.extend(rows.into_iter().map(|mut item| {
            item.kind = kind;
            item
        }));
    }
    Ok(ItemTable { items })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::{Recurrence, Timestamp};
    use crate::schedule;
    use chrono::{DateTime, FixedOffset, TimeZone, Utc};
    use std::time::{Duration, Instant};
    use tempfile::tempdir;

    fn routine(id: &str, owner: &str) -> RecurringItem {
        let created = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        RecurringItem::new(id, owner, ItemKind::Routine, "Run", created)
            .with_recurrence(Recurrence::Daily, 1)
    }

    fn now() -> DateTime<FixedOffset> {
        FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2026, 1, 5, 7, 0, 0)
            .unwrap()
    }

    fn log_at_now(item: &RecurringItem) -> Option<ItemPatch> {
        schedule::log_completion(item, &now())
    }

    #[test]
    fn memory_store_lists_by_owner_and_kind() {
        let store = MemoryStore::with_items([
            routine("a", "me"),
            routine("b", "someone-else"),
            RecurringItem::new("t", "me", ItemKind::Task, "Call", Utc::now()),
        ]);
        let routines = store.list_items("me", ItemKind::Routine).unwrap();
        assert_eq!(routines.len(), 1);
        assert_eq!(routines[0].id, "a");
        assert_eq!(store.list_items("me", ItemKind::Task).unwrap().len(), 1);
    }

    #[test]
    fn complete_and_reschedule_checks_owner_and_recurrence() {
        let store = MemoryStore::with_items([
            routine("a", "me"),
            RecurringItem::new("t", "me", ItemKind::Task, "Call", Utc::now()),
        ]);
        assert!(matches!(
            store.complete_and_reschedule("a", "intruder", &log_at_now),
            Err(Error::OwnerMismatch { .. })
        ));
        assert!(matches!(
            store.complete_and_reschedule("t", "me", &log_at_now),
            Err(Error::NotRecurring(_))
        ));
        assert!(matches!(
            store.complete_and_reschedule("zzz", "me", &log_at_now),
            Err(Error::NotFound(_))
        ));

        let updated = store.complete_and_reschedule("a", "me", &log_at_now).unwrap();
        assert_eq!(
            updated.next_occurrence_in(&Utc),
            Some(Utc.with_ymd_and_hms(2026, 1, 6, 0, 0, 0).unwrap())
        );
        assert_eq!(store.get_item("a").unwrap(), updated);
    }

    #[test]
    fn duplicate_inserts_are_rejected() {
        let store = MemoryStore::new();
        store.insert_item(routine("a", "me")).unwrap();
        assert!(matches!(
            store.insert_item(routine("a", "me")),
            Err(Error::DuplicateId(_))
        ));
    }

    #[test]
    fn json_store_persists_each_collection_separately() {
        let temp = tempdir().expect("tempdir");
        let store = JsonFileStore::open(temp.path()).expect("open store");
        store.insert_item(routine("a", "me")).unwrap();
        store
            .insert_item(RecurringItem::new("t", "me", ItemKind::Task, "Call", Utc::now()))
            .unwrap();
        store
            .update_item(
                "a",
                &ItemPatch {
                    next_occurrence_at: Some(Some(Timestamp::new("2026-01-09T00:00:00Z"))),
                    ..ItemPatch::default()
                },
            )
            .unwrap();

        let routines_raw = fs::read_to_string(store.collection_path(ItemKind::Routine)).unwrap();
        assert!(routines_raw.contains("\"nextOccurrenceAt\": \"2026-01-09T00:00:00Z\""));
        assert!(!routines_raw.contains("\"t\""));

        let reopened = JsonFileStore::open(temp.path()).expect("reopen store");
        assert_eq!(reopened.list_items("me", ItemKind::Routine).unwrap().len(), 1);
        assert_eq!(reopened.list_items("me", ItemKind::Task).unwrap().len(), 1);

        reopened.delete_item("t").unwrap();
        let tasks_raw = fs::read_to_string(reopened.collection_path(ItemKind::Task)).unwrap();
        assert_eq!(tasks_raw.trim(), "[]");
    }

    #[test]
    fn json_store_reload_picks_up_external_edits() {
        let temp = tempdir().expect("tempdir");
        let store = JsonFileStore::open(temp.path()).expect("open store");
        assert!(store.list_items("me", ItemKind::Routine).unwrap().is_empty());

        fs::write(
            temp.path().join("routines.json"),
            r#"[{"id":"x","ownerId":"me","createdAt":"2026-01-01T00:00:00Z","recurrenceUnit":"weekly","recurrenceInterval":"2"}]"#,
        )
        .unwrap();
        store.reload().unwrap();

        let routines = store.list_items("me", ItemKind::Routine).unwrap();
        assert_eq!(routines.len(), 1);
        assert_eq!(routines[0].kind, ItemKind::Routine);
        assert_eq!(routines[0].recurrence_interval, 2);
    }

    #[test]
    fn failed_json_writes_leave_rows_untouched() {
        let temp = tempdir().expect("tempdir");
        let store = JsonFileStore::open(temp.path()).expect("open store");
        store.insert_item(routine("a", "me")).unwrap();
        let before = store.get_item("a").unwrap();

        // A directory where the collection file should be makes every write fail.
        let path = store.collection_path(ItemKind::Routine);
        fs::remove_file(&path).unwrap();
        fs::create_dir(&path).unwrap();

        let patch = ItemPatch {
            next_occurrence_at: Some(Some(Timestamp::new("2030-01-01T00:00:00Z"))),
            ..ItemPatch::default()
        };
        assert!(store.update_item("a", &patch).is_err());
        assert!(store.complete_and_reschedule("a", "me", &log_at_now).is_err());
        assert!(store.insert_item(routine("b", "me")).is_err());
        assert!(store.delete_item("a").is_err());

        assert_eq!(store.get_item("a").unwrap(), before);
        assert!(matches!(store.get_item("b"), Err(Error::NotFound(_))));
    }

    #[test]
    fn empty_patches_skip_the_write() {
        let temp = tempdir().expect("tempdir");
        let store = JsonFileStore::open(temp.path()).expect("open store");
        store.insert_item(routine("a", "me")).unwrap();
        let path = store.collection_path(ItemKind::Routine);
        fs::remove_file(&path).unwrap();

        let unchanged = store.update_item("a", &ItemPatch::default()).unwrap();
        assert_eq!(unchanged.id, "a");
        assert!(!path.exists());
    }

    #[test]
    fn damaged_rows_do_not_block_opening() {
        let temp = tempdir().expect("tempdir");
        fs::write(
            temp.path().join("routines.json"),
            r#"[
  {"id":"ok","ownerId":"me","createdAt":"2026-01-01T00:00:00Z","recurrenceUnit":"daily"},
  {"id":"bad","ownerId":"me","createdAt":"2026-01-02T00:00:00Z","recurrenceUnit":null}
]"#,
        )
        .unwrap();
        let store = JsonFileStore::open(temp.path()).expect("open store");
        let routines = store.list_items("me", ItemKind::Routine).unwrap();
        assert_eq!(routines.len(), 2);
        assert!(routines[0].is_recurring());
        assert!(!routines[1].is_recurring());
    }

    #[test]
    fn watcher_reloads_after_outside_writes() {
        let temp = tempdir().expect("tempdir");
        let mut store = JsonFileStore::open(temp.path()).expect("open store");
        let reloads = store.watch().expect("watch store");

        fs::write(
            temp.path().join("routines.json"),
            r#"[{"id":"x","ownerId":"me","createdAt":"2026-01-01T00:00:00Z","recurrenceUnit":"daily"}]"#,
        )
        .unwrap();

        let deadline = Instant::now() + Duration::from_secs(10);
        while store.list_items("me", ItemKind::Routine).unwrap().is_empty() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            assert!(!remaining.is_zero(), "store was never reloaded");
            let _ = reloads.recv_timeout(remaining);
        }
        assert_eq!(store.get_item("x").unwrap().recurrence_unit, Recurrence::Daily);
    }
}
