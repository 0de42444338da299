//! CSV persistence for the task store.
//!
//! # File Format
//!
//! ```text
//! id,type,name,description,status,startTime,duration,endTime,epicId
//! 1,TASK,Write report,,NEW,2024-01-01T09:00:00,1800,2024-01-01T09:30:00,
//! 2,EPIC,Launch,"site, docs",IN_PROGRESS,,,,
//! 3,SUBTASK,Copy,,IN_PROGRESS,,,,2
//! ```
//!
//! Rows are written tasks first, then epics, then subtasks, each by id.
//! `duration` is whole seconds. Fields containing a comma, quote or line
//! break are double-quoted with `""` escapes. Epic status and time columns
//! are informational; they are recomputed from subtasks on load.

use std::path::{Path, PathBuf};

use chrono::{Duration, NaiveDateTime};
use tracing::debug;

use crate::error::{Error, Result};
use crate::lock::{
    lock_path_for, read_locked_str, read_optional_str, write_atomic, write_atomic_locked, FileLock,
};
use crate::model::{parse_start_time, Epic, Item, Status, Subtask, Task, TaskId, TaskKind};
use crate::store::TaskStore;

pub const HEADER: [&str; 9] = [
    "id",
    "type",
    "name",
    "description",
    "status",
    "startTime",
    "duration",
    "endTime",
    "epicId",
];

const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Render the whole store as CSV text.
pub fn to_csv(store: &TaskStore) -> String {
    let mut out = String::new();
    push_row(&mut out, HEADER.iter().map(|column| column.to_string()));

    for task in store.tasks() {
        push_row(
            &mut out,
            row(
                task.id,
                TaskKind::Task,
                &task.name,
                &task.description,
                task.status,
                task.start_time,
                task.duration,
                None,
            ),
        );
    }
    for epic in store.epics() {
        push_row(
            &mut out,
            row(
                epic.id,
                TaskKind::Epic,
                &epic.name,
                &epic.description,
                epic.status(),
                epic.start_time(),
                epic.duration(),
                None,
            ),
        );
    }
    for subtask in store.subtasks() {
        push_row(
            &mut out,
            row(
                subtask.id,
                TaskKind::Subtask,
                &subtask.name,
                &subtask.description,
                subtask.status,
                subtask.start_time,
                subtask.duration,
                Some(subtask.epic_id),
            ),
        );
    }

    out
}

/// Parse CSV text produced by [`to_csv`] back into a store.
///
/// Empty input yields an empty store. `source` is only used in error messages.
pub fn from_csv(content: &str, source: &Path) -> Result<TaskStore> {
    let records = split_records(content).map_err(|message| persistence(source, message))?;

    let mut records = records.into_iter();
    let Some((line, header)) = records.next() else {
        return Ok(TaskStore::new());
    };
    if header.iter().map(String::as_str).ne(HEADER.iter().copied()) {
        return Err(persistence(
            source,
            format!("line {line}: unexpected header '{}'", header.join(",")),
        ));
    }

    let mut items = Vec::new();
    for (line, fields) in records {
        if fields.len() == 1 && fields[0].trim().is_empty() {
            continue;
        }
        let item = parse_row(&fields)
            .map_err(|message| persistence(source, format!("line {line}: {message}")))?;
        items.push(item);
    }

    TaskStore::restore(items).map_err(|err| persistence(source, err.to_string()))
}

/// Load a store from `path`. A missing file yields an empty store.
pub fn load(path: &Path, lock_timeout_ms: u64) -> Result<TaskStore> {
    restore_from(path, read_locked_str(path, lock_timeout_ms)?)
}

/// Write the store to `path` atomically.
pub fn save(store: &TaskStore, path: &Path, lock_timeout_ms: u64) -> Result<()> {
    let content = to_csv(store);
    let written = write_atomic_locked(path, content.as_bytes(), lock_timeout_ms);
    saved(path, content.len(), written)
}

fn load_unlocked(path: &Path) -> Result<TaskStore> {
    restore_from(path, read_optional_str(path)?)
}

fn save_unlocked(store: &TaskStore, path: &Path) -> Result<()> {
    let content = to_csv(store);
    let written = write_atomic(path, content.as_bytes());
    saved(path, content.len(), written)
}

fn restore_from(path: &Path, content: Option<String>) -> Result<TaskStore> {
    match content {
        Some(content) => {
            let store = from_csv(&content, path)?;
            debug!(path = %path.display(), next_id = store.next_id(), "loaded data file");
            Ok(store)
        }
        None => {
            debug!(path = %path.display(), "data file missing; starting empty");
            Ok(TaskStore::new())
        }
    }
}

fn saved(path: &Path, bytes: usize, written: Result<()>) -> Result<()> {
    written.map_err(|err| match err {
        Error::Io(io) => persistence(path, io.to_string()),
        other => other,
    })?;
    debug!(path = %path.display(), bytes, "saved data file");
    Ok(())
}

/// A task store saved to a CSV file after every successful mutation.
///
/// [`FileBackedStore::open`] holds the data file's lock until the value is
/// dropped, so a load, mutate and save cycle is never interleaved with another
/// writer. [`FileBackedStore::open_read_only`] releases the lock once loaded.
///
/// If a save fails the in-memory store keeps the mutation and the error is
/// returned to the caller.
#[derive(Debug)]
pub struct FileBackedStore {
    store: TaskStore,
    path: PathBuf,
    lock_timeout_ms: u64,
    lock: Option<FileLock>,
}

impl FileBackedStore {
    /// Open for writing, holding the lock until dropped.
    pub fn open(path: impl Into<PathBuf>, lock_timeout_ms: u64) -> Result<Self> {
        let path = path.into();
        let lock = FileLock::acquire(lock_path_for(&path), lock_timeout_ms)?;
        let store = load_unlocked(&path)?;
        Ok(Self {
            store,
            path,
            lock_timeout_ms,
            lock: Some(lock),
        })
    }

    /// Open a snapshot for lookups. The lock is only held while loading.
    pub fn open_read_only(path: impl Into<PathBuf>, lock_timeout_ms: u64) -> Result<Self> {
        let path = path.into();
        let store = load(&path, lock_timeout_ms)?;
        Ok(Self {
            store,
            path,
            lock_timeout_ms,
            lock: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn store(&self) -> &TaskStore {
        &self.store
    }

    /// Mutable access for lookups that record history.
    ///
    /// Changes made through this handle are not saved until [`Self::save`].
    pub fn store_mut(&mut self) -> &mut TaskStore {
        &mut self.store
    }

    /// Run a mutation and save when it succeeds.
    pub fn apply<T, F>(&mut self, mutation: F) -> Result<T>
    where
        F: FnOnce(&mut TaskStore) -> Result<T>,
    {
        let out = mutation(&mut self.store)?;
        self.save()?;
        Ok(out)
    }

    /// Save now. A read-only snapshot takes the lock just for the write.
    pub fn save(&self) -> Result<()> {
        if self.lock.is_some() {
            save_unlocked(&self.store, &self.path)
        } else {
            save(&self.store, &self.path, self.lock_timeout_ms)
        }
    }

    pub fn into_inner(self) -> TaskStore {
        self.store
    }
}

fn persistence(path: &Path, message: impl Into<String>) -> Error {
    Error::Persistence {
        path: path.to_path_buf(),
        message: message.into(),
    }
}

#[allow(clippy::too_many_arguments)]
fn row(
    id: TaskId,
    kind: TaskKind,
    name: &str,
    description: &str,
    status: Status,
    start_time: Option<NaiveDateTime>,
    duration: Option<Duration>,
    epic_id: Option<TaskId>,
) -> Vec<String> {
    let end_time = crate::model::end_time(start_time, duration);
    vec![
        id.to_string(),
        kind.as_str().to_string(),
        name.to_string(),
        description.to_string(),
        status.as_str().to_string(),
        format_time(start_time),
        duration
            .map(|duration| duration.num_seconds().to_string())
            .unwrap_or_default(),
        format_time(end_time),
        epic_id.map(|id| id.to_string()).unwrap_or_default(),
    ]
}

fn format_time(time: Option<NaiveDateTime>) -> String {
    time.map(|time| time.format(TIME_FORMAT).to_string())
        .unwrap_or_default()
}

fn push_row<I>(out: &mut String, fields: I)
where
    I: IntoIterator<Item = String>,
{
    let encoded: Vec<String> = fields.into_iter().map(|field| escape_field(&field)).collect();
    out.push_str(&encoded.join(","));
    out.push('\n');
}

fn escape_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Split CSV text into records, tracking the line each record starts on.
fn split_records(content: &str) -> std::result::Result<Vec<(usize, Vec<String>)>, String> {
    let mut records = Vec::new();
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut line = 1;
    let mut record_line = 1;
    let mut chars = content.chars().peekable();

    while let Some(ch) = chars.next() {
        if in_quotes {
            match ch {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                '\n' => {
                    line += 1;
                    field.push(ch);
                }
                _ => field.push(ch),
            }
            continue;
        }

        match ch {
            '"' if field.is_empty() => in_quotes = true,
            ',' => fields.push(std::mem::take(&mut field)),
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' => {
                fields.push(std::mem::take(&mut field));
                records.push((record_line, std::mem::take(&mut fields)));
                line += 1;
                record_line = line;
            }
            _ => field.push(ch),
        }
    }

    if in_quotes {
        return Err(format!("line {record_line}: unterminated quoted field"));
    }
    if !field.is_empty() || !fields.is_empty() {
        fields.push(field);
        records.push((record_line, fields));
    }

    Ok(records)
}

fn parse_row(fields: &[String]) -> std::result::Result<Item, String> {
    if fields.len() != HEADER.len() {
        return Err(format!(
            "expected {} fields, found {}",
            HEADER.len(),
            fields.len()
        ));
    }

    let id: TaskId = fields[0]
        .trim()
        .parse()
        .map_err(|_| format!("invalid id '{}'", fields[0]))?;
    let kind: TaskKind = fields[1].parse().map_err(|err: Error| err.to_string())?;
    let name = fields[2].clone();
    let description = fields[3].clone();
    let status: Status = fields[4].parse().map_err(|err: Error| err.to_string())?;
    let start_time = optional(&fields[5])
        .map(parse_start_time)
        .transpose()
        .map_err(|err| err.to_string())?;
    let duration = optional(&fields[6])
        .map(|secs| {
            secs.parse::<i64>()
                .ok()
                .and_then(Duration::try_seconds)
                .ok_or_else(|| format!("invalid duration '{secs}'"))
        })
        .transpose()?;

    let item = match kind {
        TaskKind::Task => {
            let mut task = Task::new(name, description).with_status(status);
            task.id = id;
            task.start_time = start_time;
            task.duration = duration;
            Item::Task(task)
        }
        TaskKind::Epic => {
            let mut epic = Epic::new(name, description);
            epic.id = id;
            Item::Epic(epic)
        }
        TaskKind::Subtask => {
            let epic_id = optional(&fields[8])
                .ok_or_else(|| format!("subtask {id} has no epicId"))?
                .parse::<TaskId>()
                .map_err(|_| format!("invalid epicId '{}'", fields[8]))?;
            let mut subtask = Subtask::new(epic_id, name, description).with_status(status);
            subtask.id = id;
            subtask.start_time = start_time;
            subtask.duration = duration;
            Item::Subtask(subtask)
        }
    };

    Ok(item)
}

fn optional(field: &str) -> Option<&str> {
    let trimmed = field.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Identified;

    fn source() -> PathBuf {
        PathBuf::from("tasks.csv")
    }

    #[test]
    fn quoted_fields_survive_commas_quotes_and_newlines() {
        let records = split_records("a,\"b, c\",\"say \"\"hi\"\"\",\"two\nlines\"\nnext\n")
            .expect("split");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].0, 1);
        assert_eq!(
            records[0].1,
            vec!["a", "b, c", "say \"hi\"", "two\nlines"]
        );
        assert_eq!(records[1], (3, vec!["next".to_string()]));
    }

    #[test]
    fn crlf_line_endings_are_accepted() {
        let records = split_records("a,b\r\nc,d\r\n").expect("split");
        assert_eq!(records[0].1, vec!["a", "b"]);
        assert_eq!(records[1].1, vec!["c", "d"]);
    }

    #[test]
    fn unterminated_quote_is_an_error() {
        assert!(split_records("1,\"open").is_err());
    }

    #[test]
    fn escape_only_quotes_when_needed() {
        assert_eq!(escape_field("plain"), "plain");
        assert_eq!(escape_field("a,b"), "\"a,b\"");
        assert_eq!(escape_field("a\"b"), "\"a\"\"b\"");
    }

    #[test]
    fn empty_content_is_an_empty_store() {
        let store = from_csv("", &source()).expect("parse");
        assert!(store.is_empty());

        let header_only = format!("{}\n", HEADER.join(","));
        let store = from_csv(&header_only, &source()).expect("parse");
        assert!(store.is_empty());
    }

    #[test]
    fn wrong_header_is_rejected() {
        let err = from_csv("id,name\n1,x\n", &source()).expect_err("header");
        assert!(matches!(err, Error::Persistence { .. }));
    }

    #[test]
    fn bad_rows_report_their_line() {
        let content = format!("{}\n1,TASK,a,,NEW,,,,\n2,TASK,b,,LATER,,,,\n", HEADER.join(","));
        let err = from_csv(&content, &source()).expect_err("bad status");
        assert!(err.to_string().contains("line 3"), "{err}");
    }

    #[test]
    fn subtask_rows_require_epic_id() {
        let content = format!("{}\n1,EPIC,e,,NEW,,,,\n2,SUBTASK,s,,NEW,,,,\n", HEADER.join(","));
        let err = from_csv(&content, &source()).expect_err("missing epic id");
        assert!(err.to_string().contains("epicId"), "{err}");
    }

    #[test]
    fn parses_rows_regardless_of_kind_order() {
        let content = format!(
            "{}\n3,SUBTASK,s,,DONE,2024-01-01T09:00:00,600,2024-01-01T09:10:00,2\n2,EPIC,e,,NEW,,,,\n",
            HEADER.join(",")
        );
        let store = from_csv(&content, &source()).expect("parse");
        let epic = store.peek_epic(2).expect("epic");
        assert_eq!(epic.status(), Status::Done);
        assert_eq!(epic.duration(), Some(Duration::minutes(10)));
        assert_eq!(store.prioritized()[0].id(), 3);
        assert_eq!(store.next_id(), 4);
    }
}
