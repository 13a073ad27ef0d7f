use std::fs;
use std::path::PathBuf;

use chrono::{TimeZone, Utc};
use routine_core::{
    collection::{Action, ItemCollection, SortKey, StatusFilter},
    derive_status, ItemKind, ItemStatus, JsonFileStore, RoutineService, SweepToken,
};
use tempfile::tempdir;

fn write_file(path: &PathBuf, contents: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent dirs");
    }
    fs::write(path, contents).expect("write fixture");
}

#[test]
fn sweep_complete_and_uncomplete_round_trip_through_disk() {
    let temp = tempdir().expect("tempdir");
    let root = temp.path().join("store");

    write_file(
        &root.join("routines.json"),
        r#"[
  {
    "id": "stretch",
    "ownerId": "me",
    "title": "Morning stretch",
    "createdAt": "2026-01-01T07:00:00Z",
    "recurrenceUnit": "daily",
    "recurrenceInterval": 1,
    "lastCompletedAt": "2026-01-01T07:30:00Z",
    "nextOccurrenceAt": "2026-01-02T00:00:00Z"
  },
  {
    "id": "review",
    "ownerId": "me",
    "title": "Weekly review",
    "createdAt": "2026-01-01T07:00:00Z",
    "recurrenceUnit": "weekly",
    "recurrenceInterval": "not a number",
    "nextOccurrenceAt": "garbage"
  }
]"#,
    );
    write_file(
        &root.join("tasks.json"),
        r#"[{"id":"letter","ownerId":"me","title":"Post letter","createdAt":"2026-01-03T10:00:00Z"}]"#,
    );

    let service = RoutineService::builder()
        .owner("me")
        .with_store(Box::new(JsonFileStore::open(&root).expect("open store")))
        .build();

    let now = Utc.with_ymd_and_hms(2026, 1, 10, 9, 0, 0).unwrap();

    let report = service
        .reschedule_overdue(&now, &SweepToken::new())
        .expect("sweep");
    assert_eq!(report.repaired, vec!["stretch".to_string()]);

    let mut routines = ItemCollection::for_kind(ItemKind::Routine);
    routines.dispatch(Action::Loaded(
        service.items(ItemKind::Routine).expect("routines"),
    ));
    let active = routines.views(&now, StatusFilter::Active, SortKey::Title);
    assert_eq!(active.len(), 2, "repaired and malformed routines are both due");

    let review = service.get_item("review").expect("review");
    assert_eq!(review.recurrence_interval, 1);

    let done = service.log_completion("stretch", &now).expect("complete");
    assert_eq!(derive_status(&done, &now), ItemStatus::Completed);
    routines.dispatch(Action::Upserted(done));
    assert_eq!(
        routines
            .views(&now, StatusFilter::Completed, SortKey::Title)
            .len(),
        1
    );

    let reopened = JsonFileStore::open(&root).expect("reopen store");
    let persisted = stored_item(&reopened, "stretch");
    assert_eq!(
        persisted.next_occurrence_in(&Utc),
        Some(Utc.with_ymd_and_hms(2026, 1, 11, 0, 0, 0).unwrap())
    );

    let undone = service.uncomplete("stretch", &now).expect("uncomplete");
    assert_eq!(derive_status(&undone, &now), ItemStatus::Active);

    let letter = service.toggle("letter", &now).expect("toggle task");
    assert!(letter.completed);
    let tasks_raw = fs::read_to_string(root.join("tasks.json")).expect("read tasks");
    assert!(tasks_raw.contains("\"completed\": true"));
}

fn stored_item(store: &JsonFileStore, id: &str) -> routine_core::RecurringItem {
    use routine_core::RoutineStore;
    store.get_item(id).expect("persisted item")
}
