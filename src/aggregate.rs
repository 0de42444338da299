//! Epic status and timing derived from subtasks.

use chrono::{Duration, NaiveDateTime};

use crate::model::{end_time, Status, Subtask};

/// Derived epic fields, recomputed from scratch on every subtask change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EpicSummary {
    pub status: Status,
    pub start_time: Option<NaiveDateTime>,
    pub duration: Option<Duration>,
}

impl EpicSummary {
    pub fn end_time(&self) -> Option<NaiveDateTime> {
        end_time(self.start_time, self.duration)
    }
}

/// Epic status rule:
/// no subtasks -> NEW; any IN_PROGRESS -> IN_PROGRESS; all DONE -> DONE;
/// anything else -> NEW.
pub fn aggregate_status<I>(statuses: I) -> Status
where
    I: IntoIterator<Item = Status>,
{
    let mut any = false;
    let mut all_done = true;
    for status in statuses {
        any = true;
        match status {
            Status::InProgress => return Status::InProgress,
            Status::Done => {}
            Status::New => all_done = false,
        }
    }

    if any && all_done {
        Status::Done
    } else {
        Status::New
    }
}

/// Sum of `durations`, or `None` if the sum leaves chrono's range.
/// An empty input sums to zero.
pub fn checked_total<I>(durations: I) -> Option<Duration>
where
    I: IntoIterator<Item = Duration>,
{
    durations
        .into_iter()
        .try_fold(Duration::zero(), |total, duration| total.checked_add(&duration))
}

/// Summarize an epic's direct subtasks.
///
/// Subtasks without a start time do not contribute to the earliest start.
/// The duration is the sum of the durations that are set, saturating at
/// `Duration::MAX`. The store refuses subtasks that would saturate it.
pub fn summarize<'a, I>(subtasks: I) -> EpicSummary
where
    I: IntoIterator<Item = &'a Subtask>,
{
    let subtasks: Vec<&Subtask> = subtasks.into_iter().collect();

    let status = aggregate_status(subtasks.iter().map(|subtask| subtask.status));
    let start_time = subtasks.iter().filter_map(|subtask| subtask.start_time).min();
    let duration = subtasks
        .iter()
        .filter_map(|subtask| subtask.duration)
        .reduce(|total, duration| total.checked_add(&duration).unwrap_or(Duration::MAX));

    EpicSummary {
        status,
        start_time,
        duration,
    }
}
