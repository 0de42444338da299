//! Entity model for taskdeck.
//!
//! Three record kinds share one id space: plain [`Task`]s, [`Epic`]s and
//! epic-owned [`Subtask`]s. Equality and hashing are by id alone. A subtask
//! refers to its epic by id; the epic keeps the ordered list of its subtask
//! ids. Epic status and timing are derived and can only be written by the
//! store.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Identifier shared by tasks, epics and subtasks.
pub type TaskId = u64;

const START_TIME_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    #[default]
    New,
    InProgress,
    Done,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::New => "NEW",
            Status::InProgress => "IN_PROGRESS",
            Status::Done => "DONE",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "new" => Ok(Status::New),
            "in_progress" => Ok(Status::InProgress),
            "done" => Ok(Status::Done),
            other => Err(Error::InvalidArgument(format!(
                "Invalid status '{other}'. Expected: new, in_progress, done"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskKind {
    Task,
    Epic,
    Subtask,
}

impl TaskKind {
    /// Name used in the `type` column of data files
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Task => "TASK",
            TaskKind::Epic => "EPIC",
            TaskKind::Subtask => "SUBTASK",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskKind::Task => "Task",
            TaskKind::Epic => "Epic",
            TaskKind::Subtask => "Subtask",
        };
        f.write_str(name)
    }
}

impl FromStr for TaskKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "TASK" => Ok(TaskKind::Task),
            "EPIC" => Ok(TaskKind::Epic),
            "SUBTASK" => Ok(TaskKind::Subtask),
            other => Err(Error::InvalidArgument(format!("Unknown task type '{other}'"))),
        }
    }
}

/// Anything with a store-assigned id.
pub trait Identified {
    fn id(&self) -> TaskId;
}

/// Entities that may occupy a slot in time.
pub trait Scheduled: Identified {
    fn start_time(&self) -> Option<NaiveDateTime>;
    fn duration(&self) -> Option<Duration>;

    fn end_time(&self) -> Option<NaiveDateTime> {
        end_time(self.start_time(), self.duration())
    }
}

pub(crate) fn end_time(
    start: Option<NaiveDateTime>,
    duration: Option<Duration>,
) -> Option<NaiveDateTime> {
    match (start, duration) {
        (Some(start), Some(duration)) => start.checked_add_signed(duration),
        _ => None,
    }
}

/// A standalone unit of work.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    #[serde(default)]
    pub id: TaskId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: Status,
    #[serde(default)]
    pub start_time: Option<NaiveDateTime>,
    #[serde(default, with = "duration_secs")]
    pub duration: Option<Duration>,
}

impl Task {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: 0,
            name: name.into(),
            description: description.into(),
            status: Status::New,
            start_time: None,
            duration: None,
        }
    }

    pub fn with_status(mut self, status: Status) -> Self {
        self.status = status;
        self
    }

    pub fn scheduled(mut self, start_time: NaiveDateTime, duration: Duration) -> Self {
        self.start_time = Some(start_time);
        self.duration = Some(duration);
        self
    }
}

/// A container of subtasks whose status and timing are derived from them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Epic {
    #[serde(default)]
    pub id: TaskId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    subtask_ids: Vec<TaskId>,
    #[serde(default)]
    status: Status,
    #[serde(default)]
    start_time: Option<NaiveDateTime>,
    #[serde(default, with = "duration_secs")]
    duration: Option<Duration>,
}

impl Epic {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: 0,
            name: name.into(),
            description: description.into(),
            subtask_ids: Vec::new(),
            status: Status::New,
            start_time: None,
            duration: None,
        }
    }

    /// Subtask ids in the order they were added
    pub fn subtask_ids(&self) -> &[TaskId] {
        &self.subtask_ids
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn start_time(&self) -> Option<NaiveDateTime> {
        self.start_time
    }

    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }

    pub fn end_time(&self) -> Option<NaiveDateTime> {
        end_time(self.start_time, self.duration)
    }

    pub(crate) fn link_subtask(&mut self, id: TaskId) {
        if !self.subtask_ids.contains(&id) {
            self.subtask_ids.push(id);
        }
    }

    pub(crate) fn unlink_subtask(&mut self, id: TaskId) {
        self.subtask_ids.retain(|existing| *existing != id);
    }

    pub(crate) fn clear_subtasks(&mut self) {
        self.subtask_ids.clear();
    }

    /// Drop any caller-supplied derived state before the epic enters the store.
    pub(crate) fn reset_derived(&mut self) {
        self.subtask_ids.clear();
        self.status = Status::New;
        self.start_time = None;
        self.duration = None;
    }

    pub(crate) fn set_derived(
        &mut self,
        status: Status,
        start_time: Option<NaiveDateTime>,
        duration: Option<Duration>,
    ) {
        self.status = status;
        self.start_time = start_time;
        self.duration = duration;
    }
}

/// A unit of work owned by exactly one epic.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subtask {
    #[serde(default)]
    pub id: TaskId,
    pub epic_id: TaskId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: Status,
    #[serde(default)]
    pub start_time: Option<NaiveDateTime>,
    #[serde(default, with = "duration_secs")]
    pub duration: Option<Duration>,
}

impl Subtask {
    pub fn new(epic_id: TaskId, name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: 0,
            epic_id,
            name: name.into(),
            description: description.into(),
            status: Status::New,
            start_time: None,
            duration: None,
        }
    }

    pub fn with_status(mut self, status: Status) -> Self {
        self.status = status;
        self
    }

    pub fn scheduled(mut self, start_time: NaiveDateTime, duration: Duration) -> Self {
        self.start_time = Some(start_time);
        self.duration = Some(duration);
        self
    }
}

macro_rules! id_identity {
    ($($ty:ty),*) => {
        $(
            impl Identified for $ty {
                fn id(&self) -> TaskId {
                    self.id
                }
            }

            impl PartialEq for $ty {
                fn eq(&self, other: &Self) -> bool {
                    self.id == other.id
                }
            }

            impl Eq for $ty {}

            impl Hash for $ty {
                fn hash<H: Hasher>(&self, state: &mut H) {
                    self.id.hash(state);
                }
            }
        )*
    };
}

id_identity!(Task, Epic, Subtask);

impl Scheduled for Task {
    fn start_time(&self) -> Option<NaiveDateTime> {
        self.start_time
    }

    fn duration(&self) -> Option<Duration> {
        self.duration
    }
}

impl Scheduled for Subtask {
    fn start_time(&self) -> Option<NaiveDateTime> {
        self.start_time
    }

    fn duration(&self) -> Option<Duration> {
        self.duration
    }
}

/// Any stored entity, tagged with its kind for output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Item {
    Task(Task),
    Epic(Epic),
    Subtask(Subtask),
}

impl Item {
    pub fn kind(&self) -> TaskKind {
        match self {
            Item::Task(_) => TaskKind::Task,
            Item::Epic(_) => TaskKind::Epic,
            Item::Subtask(_) => TaskKind::Subtask,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Item::Task(task) => &task.name,
            Item::Epic(epic) => &epic.name,
            Item::Subtask(subtask) => &subtask.name,
        }
    }

    pub fn status(&self) -> Status {
        match self {
            Item::Task(task) => task.status,
            Item::Epic(epic) => epic.status(),
            Item::Subtask(subtask) => subtask.status,
        }
    }

    pub fn start_time(&self) -> Option<NaiveDateTime> {
        match self {
            Item::Task(task) => task.start_time,
            Item::Epic(epic) => epic.start_time(),
            Item::Subtask(subtask) => subtask.start_time,
        }
    }

    pub fn duration(&self) -> Option<Duration> {
        match self {
            Item::Task(task) => task.duration,
            Item::Epic(epic) => epic.duration(),
            Item::Subtask(subtask) => subtask.duration,
        }
    }

    pub fn end_time(&self) -> Option<NaiveDateTime> {
        end_time(self.start_time(), self.duration())
    }
}

impl Identified for Item {
    fn id(&self) -> TaskId {
        match self {
            Item::Task(task) => task.id,
            Item::Epic(epic) => epic.id,
            Item::Subtask(subtask) => subtask.id,
        }
    }
}

impl From<Task> for Item {
    fn from(task: Task) -> Self {
        Item::Task(task)
    }
}

impl From<Epic> for Item {
    fn from(epic: Epic) -> Self {
        Item::Epic(epic)
    }
}

impl From<Subtask> for Item {
    fn from(subtask: Subtask) -> Self {
        Item::Subtask(subtask)
    }
}

/// Serde adapter storing durations as whole seconds.
pub(crate) mod duration_secs {
    use chrono::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(duration) => serializer.serialize_some(&duration.num_seconds()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let seconds = Option::<i64>::deserialize(deserializer)?;
        seconds
            .map(|secs| {
                Duration::try_seconds(secs)
                    .ok_or_else(|| serde::de::Error::custom("duration out of range"))
            })
            .transpose()
    }
}

/// Parse a start timestamp such as `2024-01-01T09:00` or `2024-01-01 09:00:30`.
pub fn parse_start_time(s: &str) -> Result<NaiveDateTime> {
    let s = s.trim();
    START_TIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(s, format).ok())
        .ok_or_else(|| {
            Error::InvalidArgument(format!(
                "Invalid start time '{s}'. Expected YYYY-MM-DDTHH:MM[:SS]"
            ))
        })
}

/// Parse a duration like "30m", "2h", "1h30m" or "45" (minutes).
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();

    if s.is_empty() {
        return Err(Error::InvalidArgument("Duration cannot be empty".to_string()));
    }

    if s.chars().all(|c| c.is_ascii_digit()) {
        return duration_from_parts(s, "m");
    }

    let mut total = Duration::zero();
    let mut rest = s;
    while !rest.is_empty() {
        let num_end = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len());
        let (num_str, tail) = rest.split_at(num_end);
        let unit_end = tail
            .find(|c: char| c.is_ascii_digit())
            .unwrap_or(tail.len());
        let (unit, next) = tail.split_at(unit_end);
        if unit.is_empty() {
            return Err(Error::InvalidArgument(format!(
                "Missing duration unit after '{num_str}' in '{s}'"
            )));
        }
        let part = duration_from_parts(num_str, unit)?;
        total = total
            .checked_add(&part)
            .ok_or_else(|| Error::InvalidArgument(format!("Duration out of range: '{s}'")))?;
        rest = next;
    }

    Ok(total)
}

fn duration_from_parts(num_str: &str, unit: &str) -> Result<Duration> {
    let num: i64 = num_str
        .parse()
        .map_err(|_| Error::InvalidArgument(format!("Invalid duration number: '{num_str}'")))?;

    let duration = match unit.to_lowercase().as_str() {
        "s" | "sec" | "second" | "seconds" => Duration::try_seconds(num),
        "m" | "min" | "minute" | "minutes" => Duration::try_minutes(num),
        "h" | "hr" | "hour" | "hours" => Duration::try_hours(num),
        "d" | "day" | "days" => Duration::try_days(num),
        "w" | "week" | "weeks" => Duration::try_weeks(num),
        _ => {
            return Err(Error::InvalidArgument(format!(
                "Invalid duration unit '{unit}'. Expected: s, m, h, d, w"
            )));
        }
    };

    duration.ok_or_else(|| Error::InvalidArgument(format!("Duration out of range: {num}{unit}")))
}

/// Render a duration compactly, e.g. `1h30m`, `45m`, `20s`.
pub fn format_duration(duration: Duration) -> String {
    let total = duration.num_seconds();
    if total == 0 {
        return "0m".to_string();
    }
    let sign = if total < 0 { "-" } else { "" };
    let total = total.abs();
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);

    let mut out = String::from(sign);
    if hours > 0 {
        out.push_str(&format!("{hours}h"));
    }
    if minutes > 0 {
        out.push_str(&format!("{minutes}m"));
    }
    if seconds > 0 {
        out.push_str(&format!("{seconds}s"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .and_then(|date| date.and_hms_opt(hour, minute, 0))
            .expect("valid timestamp")
    }

    #[test]
    fn equality_is_by_id_only() {
        let mut left = Task::new("Write docs", "first draft");
        let mut right = Task::new("Something else", "").with_status(Status::Done);
        left.id = 7;
        right.id = 7;
        assert_eq!(left, right);

        right.id = 8;
        assert_ne!(left, right);
    }

    #[test]
    fn end_time_requires_start_and_duration() {
        let task = Task::new("a", "").scheduled(at(9, 0), Duration::minutes(30));
        assert_eq!(task.end_time(), Some(at(9, 30)));

        let mut untimed = Task::new("b", "");
        untimed.duration = Some(Duration::minutes(30));
        assert_eq!(untimed.end_time(), None);
    }

    #[test]
    fn status_parses_loose_spellings() {
        assert_eq!("in-progress".parse::<Status>().expect("status"), Status::InProgress);
        assert_eq!("DONE".parse::<Status>().expect("status"), Status::Done);
        assert!("closed".parse::<Status>().is_err());
    }

    #[test]
    fn parse_duration_handles_units_and_compounds() {
        assert_eq!(parse_duration("30m").expect("30m"), Duration::minutes(30));
        assert_eq!(parse_duration("45").expect("45"), Duration::minutes(45));
        assert_eq!(parse_duration("2h").expect("2h"), Duration::hours(2));
        assert_eq!(
            parse_duration("1h30m").expect("1h30m"),
            Duration::minutes(90)
        );
        assert!(parse_duration("").is_err());
        assert!(parse_duration("3x").is_err());
        assert!(parse_duration("h").is_err());
    }

    #[test]
    fn parse_duration_rejects_compound_overflow() {
        let err = parse_duration("15000000000w15000000000w").expect_err("overflow");
        assert!(matches!(err, Error::InvalidArgument(_)), "{err}");
    }

    #[test]
    fn format_duration_is_compact() {
        assert_eq!(format_duration(Duration::minutes(90)), "1h30m");
        assert_eq!(format_duration(Duration::seconds(20)), "20s");
        assert_eq!(format_duration(Duration::zero()), "0m");
    }

    #[test]
    fn parse_start_time_accepts_common_forms() {
        assert_eq!(parse_start_time("2024-01-01T09:00").expect("t"), at(9, 0));
        assert_eq!(parse_start_time("2024-01-01 09:30:00").expect("t"), at(9, 30));
        assert!(parse_start_time("tomorrow").is_err());
    }

    #[test]
    fn item_json_uses_type_tag_and_seconds() {
        let mut subtask = Subtask::new(1, "Draft", "outline")
            .scheduled(at(9, 0), Duration::minutes(30))
            .with_status(Status::InProgress);
        subtask.id = 2;

        let json = serde_json::to_value(Item::from(subtask)).expect("serialize");
        assert_eq!(json["type"], "SUBTASK");
        assert_eq!(json["epicId"], 1);
        assert_eq!(json["status"], "IN_PROGRESS");
        assert_eq!(json["startTime"], "2024-01-01T09:00:00");
        assert_eq!(json["duration"], 1800);
    }

    #[test]
    fn task_json_defaults_optional_fields() {
        let task: Task = serde_json::from_str(r#"{"name":"Plan"}"#).expect("parse");
        assert_eq!(task.status, Status::New);
        assert!(task.start_time.is_none());
        assert!(task.duration.is_none());
    }
}
