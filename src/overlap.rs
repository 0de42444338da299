//! Scheduling conflict detection.
//!
//! Intervals are half-open: `[start, start + duration)`. Two intervals
//! conflict iff `s1 < e2 && s2 < e1`, so back-to-back slots are allowed.
//! Untimed entities and zero-length slots never conflict with anything.

use chrono::{Duration, NaiveDateTime};

use crate::model::{Scheduled, TaskId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl Interval {
    /// Build the slot an entity occupies, if it occupies one at all.
    ///
    /// A slot running past the end of the calendar is clamped to
    /// `NaiveDateTime::MAX` rather than treated as untimed.
    pub fn from_parts(start: Option<NaiveDateTime>, duration: Option<Duration>) -> Option<Self> {
        let (start, duration) = (start?, duration?);
        if duration <= Duration::zero() {
            return None;
        }
        let end = start
            .checked_add_signed(duration)
            .unwrap_or(NaiveDateTime::MAX);
        Some(Self { start, end })
    }

    pub fn of<S: Scheduled + ?Sized>(entity: &S) -> Option<Self> {
        Self::from_parts(entity.start_time(), entity.duration())
    }

    pub fn overlaps(&self, other: &Interval) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Find the first stored entity whose slot intersects `candidate`.
///
/// `exclude` skips one id so an entity being updated does not collide with
/// its own previous slot.
pub fn find_conflict<'a, S, I>(
    candidate: Option<Interval>,
    exclude: Option<TaskId>,
    existing: I,
) -> Option<TaskId>
where
    S: Scheduled + ?Sized + 'a,
    I: IntoIterator<Item = &'a S>,
{
    let candidate = candidate?;
    existing
        .into_iter()
        .filter(|entity| Some(entity.id()) != exclude)
        .find(|entity| {
            Interval::of(*entity)
                .map(|slot| slot.overlaps(&candidate))
                .unwrap_or(false)
        })
        .map(|entity| entity.id())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Task;
    use chrono::NaiveDate;

    fn at(hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .and_then(|date| date.and_hms_opt(hour, minute, 0))
            .expect("valid timestamp")
    }

    fn slot(hour: u32, minute: u32, minutes: i64) -> Option<Interval> {
        Interval::from_parts(Some(at(hour, minute)), Some(Duration::minutes(minutes)))
    }

    fn stored(id: TaskId, hour: u32, minute: u32, minutes: i64) -> Task {
        let mut task = Task::new(format!("task {id}"), "")
            .scheduled(at(hour, minute), Duration::minutes(minutes));
        task.id = id;
        task
    }

    fn has_conflict(candidate: Option<Interval>, exclude: Option<TaskId>, existing: &[Task]) -> bool {
        find_conflict(candidate, exclude, existing).is_some()
    }

    #[test]
    fn slot_past_the_calendar_end_still_conflicts() {
        let huge = Duration::try_weeks(15_000_000_000).expect("in range");
        let huge_slot = Interval::from_parts(Some(at(9, 0)), Some(huge)).expect("timed");
        assert_eq!(huge_slot.end, NaiveDateTime::MAX);

        let mut endless = Task::new("endless", "");
        endless.id = 1;
        endless.start_time = Some(at(9, 0));
        endless.duration = Some(huge);
        assert!(has_conflict(slot(10, 0, 30), None, &[endless]));
    }

    #[test]
    fn overlapping_slot_is_reported() {
        let existing = vec![stored(1, 9, 0, 30)];
        assert_eq!(find_conflict(slot(9, 15, 30), None, &existing), Some(1));
    }

    #[test]
    fn touching_endpoints_do_not_conflict() {
        let existing = vec![stored(1, 9, 0, 30)];
        assert!(!has_conflict(slot(9, 30, 30), None, &existing));
        assert!(!has_conflict(slot(8, 30, 30), None, &existing));
    }

    #[test]
    fn containment_conflicts_both_ways() {
        let existing = vec![stored(1, 9, 0, 120)];
        assert!(has_conflict(slot(9, 30, 10), None, &existing));

        let existing = vec![stored(1, 9, 30, 10)];
        assert!(has_conflict(slot(9, 0, 120), None, &existing));
    }

    #[test]
    fn untimed_and_zero_length_never_conflict() {
        let existing = vec![stored(1, 9, 0, 60), stored(2, 9, 10, 0)];
        assert!(!has_conflict(None, None, &existing));
        assert!(!has_conflict(slot(9, 10, 0), None, &existing));

        let mut untimed = Task::new("untimed", "");
        untimed.id = 3;
        untimed.duration = Some(Duration::minutes(30));
        let obstacles = vec![untimed, stored(2, 9, 10, 0)];
        assert!(!has_conflict(slot(9, 0, 60), None, &obstacles));
    }

    #[test]
    fn excluded_id_is_skipped() {
        let existing = vec![stored(1, 9, 0, 30), stored(2, 10, 0, 30)];
        assert!(!has_conflict(slot(9, 10, 30), Some(1), &existing));
        assert_eq!(find_conflict(slot(9, 50, 30), Some(1), &existing), Some(2));
    }
}
