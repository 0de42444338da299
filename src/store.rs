//! In-memory task store.
//!
//! The store owns every task, epic and subtask, hands out ids from a single
//! counter, keeps the priority view of all tasks and subtasks, and owns the
//! view history. All mutations are all-or-nothing: validation runs before any
//! map is touched.
//!
//! The store is plain single-threaded state. Callers sharing it between
//! threads must serialize access (for example with a `Mutex<TaskStore>`).

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashSet};

use chrono::{Duration, NaiveDateTime};
use tracing::{debug, warn};

use crate::aggregate;
use crate::error::{Error, Result};
use crate::history::HistoryTracker;
use crate::model::{Epic, Identified, Item, Scheduled, Subtask, Task, TaskId, TaskKind};
use crate::overlap::{self, Interval};

const FIRST_ID: TaskId = 1;

/// Sort key of the priority view: start ascending with untimed entries last,
/// then id ascending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PriorityKey {
    start: Option<NaiveDateTime>,
    id: TaskId,
}

impl PriorityKey {
    fn of<S: Scheduled + ?Sized>(entity: &S) -> Self {
        Self {
            start: entity.start_time(),
            id: entity.id(),
        }
    }
}

impl Ord for PriorityKey {
    fn cmp(&self, other: &Self) -> Ordering {
        let by_start = match (self.start, other.start) {
            (Some(left), Some(right)) => left.cmp(&right),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        by_start.then_with(|| self.id.cmp(&other.id))
    }
}

impl PartialOrd for PriorityKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Clone)]
pub struct TaskStore {
    tasks: BTreeMap<TaskId, Task>,
    epics: BTreeMap<TaskId, Epic>,
    subtasks: BTreeMap<TaskId, Subtask>,
    prioritized: BTreeSet<PriorityKey>,
    history: HistoryTracker<Item>,
    next_id: TaskId,
}

impl Default for TaskStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskStore {
    pub fn new() -> Self {
        Self {
            tasks: BTreeMap::new(),
            epics: BTreeMap::new(),
            subtasks: BTreeMap::new(),
            prioritized: BTreeSet::new(),
            history: HistoryTracker::new(),
            next_id: FIRST_ID,
        }
    }

    /// Rebuild a store from previously issued entities.
    ///
    /// Epics are linked first, subtasks are attached to their epics in
    /// ascending id order, derived epic fields are recomputed and the id
    /// counter resumes after the largest id seen. Scheduling conflicts are
    /// not re-checked.
    pub fn restore<I>(items: I) -> Result<Self>
    where
        I: IntoIterator<Item = Item>,
    {
        let mut store = Self::new();
        let mut seen = HashSet::new();
        let mut tasks = Vec::new();
        let mut epics = Vec::new();
        let mut subtasks = Vec::new();

        for item in items {
            if !seen.insert(item.id()) {
                return Err(Error::Validation(format!("duplicate id {}", item.id())));
            }
            match item {
                Item::Task(task) => tasks.push(task),
                Item::Epic(epic) => epics.push(epic),
                Item::Subtask(subtask) => subtasks.push(subtask),
            }
        }

        for mut epic in epics {
            epic.reset_derived();
            store.epics.insert(epic.id, epic);
        }
        for task in tasks {
            store.prioritized.insert(PriorityKey::of(&task));
            store.tasks.insert(task.id, task);
        }
        subtasks.sort_by_key(|subtask| subtask.id);
        for subtask in subtasks {
            let epic = store
                .epics
                .get_mut(&subtask.epic_id)
                .ok_or_else(|| Error::not_found(TaskKind::Epic, subtask.epic_id))?;
            epic.link_subtask(subtask.id);
            store.prioritized.insert(PriorityKey::of(&subtask));
            store.subtasks.insert(subtask.id, subtask);
        }

        let epic_ids: Vec<TaskId> = store.epics.keys().copied().collect();
        for epic_id in epic_ids {
            store.refresh_epic(epic_id);
        }
        store.next_id = seen.into_iter().max().map_or(FIRST_ID, |max| max + 1);

        debug!(
            tasks = store.tasks.len(),
            epics = store.epics.len(),
            subtasks = store.subtasks.len(),
            next_id = store.next_id,
            "restored task store"
        );
        Ok(store)
    }

    /// The id the next added entity will receive
    pub fn next_id(&self) -> TaskId {
        self.next_id
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty() && self.epics.is_empty() && self.subtasks.is_empty()
    }

    // =========================================================================
    // Tasks
    // =========================================================================

    pub fn add_task(&mut self, mut task: Task) -> Result<TaskId> {
        validate_schedule(TaskKind::Task, &task)?;
        self.ensure_free_slot(TaskKind::Task, Interval::of(&task), None)?;

        task.id = self.issue_id();
        self.prioritized.insert(PriorityKey::of(&task));
        debug!(id = task.id, name = %task.name, "added task");
        let id = task.id;
        self.tasks.insert(id, task);
        Ok(id)
    }

    pub fn update_task(&mut self, task: Task) -> Result<()> {
        let previous = self
            .tasks
            .get(&task.id)
            .map(PriorityKey::of)
            .ok_or_else(|| Error::not_found(TaskKind::Task, task.id))?;
        validate_schedule(TaskKind::Task, &task)?;
        self.ensure_free_slot(TaskKind::Task, Interval::of(&task), Some(task.id))?;

        self.prioritized.remove(&previous);
        self.prioritized.insert(PriorityKey::of(&task));
        self.history.refresh(Item::Task(task.clone()));
        debug!(id = task.id, "updated task");
        self.tasks.insert(task.id, task);
        Ok(())
    }

    /// Look up a task, recording the view in history.
    pub fn get_task(&mut self, id: TaskId) -> Option<&Task> {
        let task = self.tasks.get(&id)?;
        self.history.record(Item::Task(task.clone()));
        Some(task)
    }

    /// Look up a task without touching history.
    pub fn peek_task(&self, id: TaskId) -> Option<&Task> {
        self.tasks.get(&id)
    }

    pub fn tasks(&self) -> Vec<&Task> {
        self.tasks.values().collect()
    }

    /// Remove a task. Unknown ids are a no-op.
    pub fn remove_task(&mut self, id: TaskId) -> Option<Task> {
        let task = self.tasks.remove(&id)?;
        self.prioritized.remove(&PriorityKey::of(&task));
        self.history.remove(id);
        debug!(id, "removed task");
        Some(task)
    }

    pub fn delete_all_tasks(&mut self) -> usize {
        let tasks = std::mem::take(&mut self.tasks);
        for task in tasks.values() {
            self.prioritized.remove(&PriorityKey::of(task));
            self.history.remove(task.id);
        }
        debug!(count = tasks.len(), "deleted all tasks");
        tasks.len()
    }

    // =========================================================================
    // Epics
    // =========================================================================

    /// Add an epic. Any subtask ids or derived fields on the input are ignored.
    pub fn add_epic(&mut self, mut epic: Epic) -> TaskId {
        epic.reset_derived();
        epic.id = self.issue_id();
        debug!(id = epic.id, name = %epic.name, "added epic");
        let id = epic.id;
        self.epics.insert(id, epic);
        id
    }

    /// Update an epic's name and description. Derived fields cannot be set.
    pub fn update_epic(&mut self, epic: Epic) -> Result<()> {
        let stored = self
            .epics
            .get_mut(&epic.id)
            .ok_or_else(|| Error::not_found(TaskKind::Epic, epic.id))?;
        stored.name = epic.name;
        stored.description = epic.description;
        self.history.refresh(Item::Epic(stored.clone()));
        debug!(id = epic.id, "updated epic");
        Ok(())
    }

    /// Look up an epic, recording the view in history.
    pub fn get_epic(&mut self, id: TaskId) -> Option<&Epic> {
        let epic = self.epics.get(&id)?;
        self.history.record(Item::Epic(epic.clone()));
        Some(epic)
    }

    /// Look up an epic without touching history.
    pub fn peek_epic(&self, id: TaskId) -> Option<&Epic> {
        self.epics.get(&id)
    }

    pub fn epics(&self) -> Vec<&Epic> {
        self.epics.values().collect()
    }

    /// Remove an epic together with all of its subtasks. Unknown ids are a no-op.
    pub fn remove_epic(&mut self, id: TaskId) -> Option<Epic> {
        let epic = self.epics.remove(&id)?;
        for subtask_id in epic.subtask_ids() {
            if let Some(subtask) = self.subtasks.remove(subtask_id) {
                self.prioritized.remove(&PriorityKey::of(&subtask));
            }
            self.history.remove(*subtask_id);
        }
        self.history.remove(id);
        debug!(id, subtasks = epic.subtask_ids().len(), "removed epic");
        Some(epic)
    }

    /// Remove every epic, and with them every subtask.
    pub fn delete_all_epics(&mut self) -> usize {
        let subtasks = std::mem::take(&mut self.subtasks);
        for subtask in subtasks.values() {
            self.prioritized.remove(&PriorityKey::of(subtask));
            self.history.remove(subtask.id);
        }
        let epics = std::mem::take(&mut self.epics);
        for id in epics.keys() {
            self.history.remove(*id);
        }
        debug!(epics = epics.len(), subtasks = subtasks.len(), "deleted all epics");
        epics.len()
    }

    /// Subtasks of an epic in insertion order. Ids that no longer resolve are
    /// skipped; an unknown epic yields an empty list.
    pub fn subtasks_of_epic(&self, epic_id: TaskId) -> Vec<&Subtask> {
        self.epics
            .get(&epic_id)
            .map(|epic| {
                epic.subtask_ids()
                    .iter()
                    .filter_map(|id| self.subtasks.get(id))
                    .collect()
            })
            .unwrap_or_default()
    }

    // =========================================================================
    // Subtasks
    // =========================================================================

    pub fn add_subtask(&mut self, mut subtask: Subtask) -> Result<TaskId> {
        if !self.epics.contains_key(&subtask.epic_id) {
            warn!(epic_id = subtask.epic_id, "subtask references unknown epic");
            return Err(Error::not_found(TaskKind::Epic, subtask.epic_id));
        }
        validate_schedule(TaskKind::Subtask, &subtask)?;
        self.ensure_epic_total_fits(&subtask)?;
        self.ensure_free_slot(TaskKind::Subtask, Interval::of(&subtask), None)?;

        subtask.id = self.issue_id();
        let (id, epic_id) = (subtask.id, subtask.epic_id);
        self.prioritized.insert(PriorityKey::of(&subtask));
        self.subtasks.insert(id, subtask);
        if let Some(epic) = self.epics.get_mut(&epic_id) {
            epic.link_subtask(id);
        }
        self.refresh_epic(epic_id);
        debug!(id, epic_id, "added subtask");
        Ok(id)
    }

    /// Replace a subtask's mutable fields. The owning epic cannot change.
    pub fn update_subtask(&mut self, subtask: Subtask) -> Result<()> {
        let previous = self
            .subtasks
            .get(&subtask.id)
            .ok_or_else(|| Error::not_found(TaskKind::Subtask, subtask.id))?;
        if previous.epic_id != subtask.epic_id {
            return Err(Error::InvalidArgument(format!(
                "Subtask {} belongs to epic {} and cannot move to epic {}",
                subtask.id, previous.epic_id, subtask.epic_id
            )));
        }
        let previous = PriorityKey::of(previous);
        validate_schedule(TaskKind::Subtask, &subtask)?;
        self.ensure_epic_total_fits(&subtask)?;
        self.ensure_free_slot(TaskKind::Subtask, Interval::of(&subtask), Some(subtask.id))?;

        let (id, epic_id) = (subtask.id, subtask.epic_id);
        self.prioritized.remove(&previous);
        self.prioritized.insert(PriorityKey::of(&subtask));
        self.history.refresh(Item::Subtask(subtask.clone()));
        self.subtasks.insert(id, subtask);
        self.refresh_epic(epic_id);
        debug!(id, epic_id, "updated subtask");
        Ok(())
    }

    /// Look up a subtask, recording the view in history.
    pub fn get_subtask(&mut self, id: TaskId) -> Option<&Subtask> {
        let subtask = self.subtasks.get(&id)?;
        self.history.record(Item::Subtask(subtask.clone()));
        Some(subtask)
    }

    /// Look up a subtask without touching history.
    pub fn peek_subtask(&self, id: TaskId) -> Option<&Subtask> {
        self.subtasks.get(&id)
    }

    pub fn subtasks(&self) -> Vec<&Subtask> {
        self.subtasks.values().collect()
    }

    /// Remove a subtask and re-derive its epic. Unknown ids are a no-op.
    pub fn remove_subtask(&mut self, id: TaskId) -> Option<Subtask> {
        let subtask = self.subtasks.remove(&id)?;
        self.prioritized.remove(&PriorityKey::of(&subtask));
        self.history.remove(id);
        if let Some(epic) = self.epics.get_mut(&subtask.epic_id) {
            epic.unlink_subtask(id);
        }
        self.refresh_epic(subtask.epic_id);
        debug!(id, epic_id = subtask.epic_id, "removed subtask");
        Some(subtask)
    }

    /// Remove every subtask. Epics stay, each with no subtasks.
    pub fn delete_all_subtasks(&mut self) -> usize {
        let subtasks = std::mem::take(&mut self.subtasks);
        for subtask in subtasks.values() {
            self.prioritized.remove(&PriorityKey::of(subtask));
            self.history.remove(subtask.id);
        }
        let epic_ids: Vec<TaskId> = self.epics.keys().copied().collect();
        for epic_id in epic_ids {
            if let Some(epic) = self.epics.get_mut(&epic_id) {
                epic.clear_subtasks();
            }
            self.refresh_epic(epic_id);
        }
        debug!(count = subtasks.len(), "deleted all subtasks");
        subtasks.len()
    }

    // =========================================================================
    // Cross-kind views
    // =========================================================================

    /// Look up any entity by id, recording the view in history.
    pub fn get(&mut self, id: TaskId) -> Option<Item> {
        let item = self.item(id)?;
        self.history.record(item.clone());
        Some(item)
    }

    /// Look up any entity by id without touching history.
    pub fn item(&self, id: TaskId) -> Option<Item> {
        if let Some(task) = self.tasks.get(&id) {
            return Some(Item::Task(task.clone()));
        }
        if let Some(epic) = self.epics.get(&id) {
            return Some(Item::Epic(epic.clone()));
        }
        self.subtasks
            .get(&id)
            .map(|subtask| Item::Subtask(subtask.clone()))
    }

    /// Views in order, most recent last
    pub fn history(&self) -> Vec<Item> {
        self.history.list()
    }

    /// All tasks and subtasks by start time (untimed last), then id.
    pub fn prioritized(&self) -> Vec<Item> {
        self.prioritized
            .iter()
            .filter_map(|key| {
                self.tasks
                    .get(&key.id)
                    .map(|task| Item::Task(task.clone()))
                    .or_else(|| {
                        self.subtasks
                            .get(&key.id)
                            .map(|subtask| Item::Subtask(subtask.clone()))
                    })
            })
            .collect()
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn issue_id(&mut self) -> TaskId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn scheduled(&self, id: TaskId) -> Option<&dyn Scheduled> {
        if let Some(task) = self.tasks.get(&id) {
            return Some(task as &dyn Scheduled);
        }
        self.subtasks
            .get(&id)
            .map(|subtask| subtask as &dyn Scheduled)
    }

    fn ensure_free_slot(
        &self,
        kind: TaskKind,
        candidate: Option<Interval>,
        exclude: Option<TaskId>,
    ) -> Result<()> {
        let obstacles = self
            .prioritized
            .iter()
            .filter_map(|key| self.scheduled(key.id));
        match overlap::find_conflict(candidate, exclude, obstacles) {
            Some(conflict) => {
                warn!(?exclude, conflict, "rejected overlapping {kind}");
                Err(Error::Validation(format!(
                    "{kind} overlaps with existing item {conflict}"
                )))
            }
            None => Ok(()),
        }
    }

    /// The epic's summed duration must stay representable once `candidate`
    /// is added or replaces its previous version.
    fn ensure_epic_total_fits(&self, candidate: &Subtask) -> Result<()> {
        let Some(duration) = candidate.duration else {
            return Ok(());
        };
        let siblings = self
            .subtasks_of_epic(candidate.epic_id)
            .into_iter()
            .filter(|sibling| sibling.id != candidate.id)
            .filter_map(|sibling| sibling.duration);
        if aggregate::checked_total(std::iter::once(duration).chain(siblings)).is_none() {
            warn!(epic_id = candidate.epic_id, "rejected subtask overflowing epic duration");
            return Err(Error::Validation(format!(
                "total duration of epic {} would exceed the supported range",
                candidate.epic_id
            )));
        }
        Ok(())
    }

    fn refresh_epic(&mut self, epic_id: TaskId) {
        let Some(epic) = self.epics.get(&epic_id) else {
            return;
        };
        let summary = aggregate::summarize(
            epic.subtask_ids()
                .iter()
                .filter_map(|id| self.subtasks.get(id)),
        );
        if let Some(epic) = self.epics.get_mut(&epic_id) {
            epic.set_derived(summary.status, summary.start_time, summary.duration);
            self.history.refresh(Item::Epic(epic.clone()));
        }
    }
}

/// Durations are non-negative whole seconds, and a timed slot must end
/// within the representable calendar.
fn validate_schedule<S: Scheduled + ?Sized>(kind: TaskKind, entity: &S) -> Result<()> {
    let Some(duration) = entity.duration() else {
        return Ok(());
    };
    if duration < Duration::zero() {
        return Err(Error::Validation(format!(
            "{kind} duration cannot be negative"
        )));
    }
    if duration.subsec_nanos() != 0 {
        return Err(Error::Validation(format!(
            "{kind} duration must be a whole number of seconds"
        )));
    }
    if let Some(start) = entity.start_time() {
        if start.checked_add_signed(duration).is_none() {
            return Err(Error::Validation(format!(
                "{kind} ends beyond the supported time range"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Status;
    use chrono::NaiveDate;

    fn at(hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .and_then(|date| date.and_hms_opt(hour, minute, 0))
            .expect("valid timestamp")
    }

    fn key(start: Option<NaiveDateTime>, id: TaskId) -> PriorityKey {
        PriorityKey { start, id }
    }

    #[test]
    fn priority_key_orders_untimed_last_then_by_id() {
        let mut keys = vec![
            key(None, 1),
            key(Some(at(10, 0)), 4),
            key(Some(at(9, 0)), 5),
            key(None, 0),
            key(Some(at(9, 0)), 2),
        ];
        keys.sort();
        let ids: Vec<TaskId> = keys.iter().map(|key| key.id).collect();
        assert_eq!(ids, vec![2, 5, 4, 0, 1]);
    }

    #[test]
    fn ids_are_shared_across_kinds() {
        let mut store = TaskStore::new();
        let task = store.add_task(Task::new("t", "")).expect("task");
        let epic = store.add_epic(Epic::new("e", ""));
        let subtask = store.add_subtask(Subtask::new(epic, "s", "")).expect("subtask");
        assert_eq!((task, epic, subtask), (1, 2, 3));
        assert_eq!(store.next_id(), 4);
    }

    #[test]
    fn rejected_add_does_not_consume_an_id() {
        let mut store = TaskStore::new();
        store
            .add_task(Task::new("a", "").scheduled(at(9, 0), Duration::minutes(30)))
            .expect("first");
        let err = store
            .add_task(Task::new("b", "").scheduled(at(9, 10), Duration::minutes(5)))
            .expect_err("overlap");
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(store.next_id(), 2);
        assert_eq!(store.tasks().len(), 1);
    }

    #[test]
    fn negative_duration_is_rejected() {
        let mut store = TaskStore::new();
        let err = store
            .add_task(Task::new("a", "").scheduled(at(9, 0), Duration::minutes(-5)))
            .expect_err("negative");
        assert!(matches!(err, Error::Validation(_)));
        assert!(store.is_empty());
    }

    #[test]
    fn update_refreshes_history_snapshot_in_place() {
        let mut store = TaskStore::new();
        let first = store.add_task(Task::new("first", "")).expect("first");
        let second = store.add_task(Task::new("second", "")).expect("second");
        store.get_task(first);
        store.get_task(second);

        let mut renamed = store.peek_task(first).cloned().expect("stored");
        renamed.name = "renamed".to_string();
        renamed.status = Status::Done;
        store.update_task(renamed).expect("update");

        let history = store.history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].id(), first);
        assert_eq!(history[0].name(), "renamed");
        assert_eq!(history[1].id(), second);
    }

    #[test]
    fn restore_resumes_counter_and_relinks() {
        let mut epic = Epic::new("epic", "");
        epic.id = 4;
        let mut late = Subtask::new(4, "late", "").with_status(Status::Done);
        late.id = 9;
        let mut early = Subtask::new(4, "early", "").with_status(Status::InProgress);
        early.id = 6;

        let store = TaskStore::restore(vec![
            Item::Subtask(late),
            Item::Epic(epic),
            Item::Subtask(early),
        ])
        .expect("restore");

        assert_eq!(store.next_id(), 10);
        let epic = store.peek_epic(4).expect("epic");
        assert_eq!(epic.subtask_ids(), &[6, 9]);
        assert_eq!(epic.status(), Status::InProgress);
    }

    #[test]
    fn restore_rejects_orphans_and_duplicates() {
        let mut orphan = Subtask::new(42, "orphan", "");
        orphan.id = 1;
        let err = TaskStore::restore(vec![Item::Subtask(orphan)]).expect_err("orphan");
        assert!(matches!(err, Error::NotFound { kind: TaskKind::Epic, id: 42 }));

        let mut a = Task::new("a", "");
        a.id = 3;
        let mut b = Epic::new("b", "");
        b.id = 3;
        let err = TaskStore::restore(vec![Item::Task(a), Item::Epic(b)]).expect_err("dup");
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn empty_restore_starts_at_first_id() {
        let store = TaskStore::restore(Vec::new()).expect("restore");
        assert_eq!(store.next_id(), FIRST_ID);
        assert!(store.is_empty());
    }
}
