use std::fs;
use std::sync::{Arc, Barrier};
use std::thread;

use chrono::{Duration, NaiveDate, NaiveDateTime};

use taskdeck::error::Error;
use taskdeck::model::{Epic, Scheduled, Status, Subtask, Task};
use taskdeck::persist::{self, FileBackedStore};
use taskdeck::store::TaskStore;

const TIMEOUT_MS: u64 = 1000;

fn at(hour: u32, minute: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, 4)
        .and_then(|date| date.and_hms_opt(hour, minute, 0))
        .expect("valid timestamp")
}

#[test]
fn saved_store_reloads_with_derived_state() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("tasks.csv");

    let mut store = TaskStore::new();
    store.add_task(
        Task::new("Write report", "quarterly, draft").scheduled(at(9, 0), Duration::minutes(30)),
    )?;
    let epic = store.add_epic(Epic::new("Launch", "say \"hi\""));
    store.add_subtask(
        Subtask::new(epic, "Copy", "line one\nline two")
            .with_status(Status::InProgress)
            .scheduled(at(10, 0), Duration::hours(1)),
    )?;
    store.add_subtask(Subtask::new(epic, "Assets", "").with_status(Status::Done))?;
    persist::save(&store, &path, TIMEOUT_MS)?;

    let loaded = persist::load(&path, TIMEOUT_MS)?;
    assert_eq!(loaded.next_id(), 5);
    assert_eq!(loaded.tasks().len(), 1);
    let task = loaded.peek_task(1).expect("task");
    assert_eq!(task.description, "quarterly, draft");
    assert_eq!(task.end_time(), Some(at(9, 30)));

    let epic = loaded.peek_epic(epic).expect("epic");
    assert_eq!(epic.description, "say \"hi\"");
    assert_eq!(epic.subtask_ids(), &[3, 4]);
    assert_eq!(epic.status(), Status::InProgress);
    assert_eq!(epic.start_time(), Some(at(10, 0)));

    let copy = loaded.peek_subtask(3).expect("subtask");
    assert_eq!(copy.description, "line one\nline two");
    assert!(loaded.history().is_empty());
    Ok(())
}

#[test]
fn missing_file_is_an_empty_store() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let store = persist::load(&dir.path().join("absent.csv"), TIMEOUT_MS)?;
    assert!(store.is_empty());
    assert_eq!(store.next_id(), 1);
    Ok(())
}

#[test]
fn file_backed_store_saves_after_each_mutation() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("board.csv");

    let mut backed = FileBackedStore::open(&path, TIMEOUT_MS)?;
    let id = backed.apply(|store| store.add_task(Task::new("persisted", "")))?;
    assert!(path.exists());

    let failed = backed.apply(|store| {
        store.add_task(Task::new("a", "").scheduled(at(9, 0), Duration::minutes(10)))?;
        store.add_task(Task::new("b", "").scheduled(at(9, 5), Duration::minutes(10)))
    });
    assert!(matches!(failed, Err(Error::Validation(_))));
    drop(backed);

    let reopened = FileBackedStore::open(&path, TIMEOUT_MS)?;
    assert!(reopened.store().peek_task(id).is_some());
    assert_eq!(reopened.store().tasks().len(), 1);
    Ok(())
}

#[test]
fn corrupt_file_reports_persistence_error() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("tasks.csv");
    fs::write(
        &path,
        "id,type,name,description,status,startTime,duration,endTime,epicId\n1,SUBTASK,x,,NEW,,,,9\n",
    )?;

    let err = persist::load(&path, TIMEOUT_MS).expect_err("orphan subtask");
    match err {
        Error::Persistence { path: reported, .. } => assert_eq!(reported, path),
        other => panic!("unexpected error: {other}"),
    }
    Ok(())
}

#[test]
fn stored_durations_round_trip_exactly() -> Result<(), Box<dyn std::error::Error>> {
    let mut store = TaskStore::new();
    let odd = Duration::seconds(3725);
    let id = store.add_task(Task::new("odd length", "").scheduled(at(9, 0), odd))?;
    assert!(store
        .add_task(Task::new("fractional", "").scheduled(at(12, 0), Duration::milliseconds(1500)))
        .is_err());

    let reloaded = persist::from_csv(&persist::to_csv(&store), std::path::Path::new("mem.csv"))?;
    let task = reloaded.peek_task(id).expect("task");
    assert_eq!(task.duration, Some(odd));
    assert_eq!(task.end_time(), Some(at(10, 2) + Duration::seconds(5)));
    Ok(())
}

#[test]
fn writer_holds_the_lock_until_dropped() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("tasks.csv");

    let mut writer = FileBackedStore::open(&path, TIMEOUT_MS)?;
    writer.apply(|store| store.add_task(Task::new("first", "")))?;

    assert!(matches!(
        FileBackedStore::open(&path, 50),
        Err(Error::LockFailed(_))
    ));
    assert!(matches!(
        FileBackedStore::open_read_only(&path, 50),
        Err(Error::LockFailed(_))
    ));

    drop(writer);
    let snapshot = FileBackedStore::open_read_only(&path, TIMEOUT_MS)?;
    assert_eq!(snapshot.store().tasks().len(), 1);
    Ok(())
}

#[test]
fn concurrent_writers_never_reuse_ids() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("tasks.csv");

    let writers = 8;
    let barrier = Arc::new(Barrier::new(writers));
    let handles: Vec<_> = (0..writers)
        .map(|idx| {
            let barrier = Arc::clone(&barrier);
            let path = path.clone();
            thread::spawn(move || {
                barrier.wait();
                let mut backed = FileBackedStore::open(&path, 10_000).expect("open");
                backed
                    .apply(|store| store.add_task(Task::new(format!("writer {idx}"), "")))
                    .expect("add")
            })
        })
        .collect();

    let mut ids: Vec<u64> = handles
        .into_iter()
        .map(|handle| handle.join().expect("join"))
        .collect();
    ids.sort_unstable();
    assert_eq!(ids, (1..=8).collect::<Vec<u64>>());

    let store = persist::load(&path, TIMEOUT_MS)?;
    assert_eq!(store.tasks().len(), writers);
    assert_eq!(store.next_id(), 9);
    Ok(())
}
