//! taskdeck subtask command implementations.

use crate::cli::task::parse_status;
use crate::cli::{item_line, push_item_summary, ClearReport, Context, ScheduleArgs};
use crate::error::{Error, Result};
use crate::model::{Item, Subtask, TaskId, TaskKind};
use crate::output::{emit_success, HumanOutput};

pub struct AddOptions {
    pub epic_id: TaskId,
    pub name: String,
    pub description: String,
    pub status: Option<String>,
    pub schedule: ScheduleArgs,
}

pub struct UpdateOptions {
    pub id: TaskId,
    pub name: Option<String>,
    pub description: Option<String>,
    pub status: Option<String>,
    pub schedule: ScheduleArgs,
    pub unschedule: bool,
}

pub fn run_add(ctx: &Context, options: AddOptions) -> Result<()> {
    let schedule = options.schedule.parse()?;
    let status = parse_status(options.status.as_deref())?.unwrap_or_default();

    let mut subtask =
        Subtask::new(options.epic_id, options.name, options.description).with_status(status);
    subtask.start_time = schedule.start;
    subtask.duration = schedule.duration;

    let mut store = ctx.open_store()?;
    let id = store.apply(|store| store.add_subtask(subtask))?;
    let item = stored_item(store.store().peek_subtask(id), id)?;

    let mut human = HumanOutput::new(format!("taskdeck subtask add: {id}"));
    push_item_summary(&mut human, &item, ctx.time_format());
    if let Some(epic) = store.store().peek_epic(options.epic_id) {
        human.push_summary("epic status", epic.status().to_string());
    }
    human.push_next_step(format!("taskdeck epic show {}", options.epic_id));

    emit_success(ctx.output, "subtask add", &item, Some(&human))
}

pub fn run_show(ctx: &Context, id: TaskId) -> Result<()> {
    let mut store = ctx.open_snapshot()?;
    let item = stored_item(store.store_mut().get_subtask(id), id)?;

    let mut human = HumanOutput::new(format!("taskdeck subtask show: {id}"));
    push_item_summary(&mut human, &item, ctx.time_format());

    emit_success(ctx.output, "subtask show", &item, Some(&human))
}

pub fn run_list(ctx: &Context) -> Result<()> {
    let store = ctx.open_snapshot()?;
    let items: Vec<Item> = store
        .store()
        .subtasks()
        .into_iter()
        .cloned()
        .map(Item::Subtask)
        .collect();

    let mut human = HumanOutput::new(format!(
        "taskdeck subtask list: {} subtask(s)",
        items.len()
    ));
    for item in &items {
        human.push_detail(item_line(item, ctx.time_format()));
    }

    emit_success(ctx.output, "subtask list", &items, Some(&human))
}

pub fn run_update(ctx: &Context, options: UpdateOptions) -> Result<()> {
    let id = options.id;
    let schedule = options.schedule.parse()?;
    let status = parse_status(options.status.as_deref())?;

    let mut store = ctx.open_store()?;
    let mut subtask = store
        .store()
        .peek_subtask(id)
        .cloned()
        .ok_or_else(|| Error::not_found(TaskKind::Subtask, id))?;

    if let Some(name) = options.name {
        subtask.name = name;
    }
    if let Some(description) = options.description {
        subtask.description = description;
    }
    if let Some(status) = status {
        subtask.status = status;
    }
    if options.unschedule {
        subtask.start_time = None;
        subtask.duration = None;
    }
    if schedule.start.is_some() {
        subtask.start_time = schedule.start;
    }
    if schedule.duration.is_some() {
        subtask.duration = schedule.duration;
    }
    let epic_id = subtask.epic_id;

    store.apply(|store| store.update_subtask(subtask))?;
    let item = stored_item(store.store().peek_subtask(id), id)?;

    let mut human = HumanOutput::new(format!("taskdeck subtask update: {id}"));
    push_item_summary(&mut human, &item, ctx.time_format());
    if let Some(epic) = store.store().peek_epic(epic_id) {
        human.push_summary("epic status", epic.status().to_string());
    }

    emit_success(ctx.output, "subtask update", &item, Some(&human))
}

pub fn run_rm(ctx: &Context, id: TaskId) -> Result<()> {
    let mut store = ctx.open_store()?;
    let subtask = store.apply(|store| {
        store
            .remove_subtask(id)
            .ok_or_else(|| Error::not_found(TaskKind::Subtask, id))
    })?;
    let item = Item::Subtask(subtask);

    let human = HumanOutput::new(format!("taskdeck subtask rm: {id} ({})", item.name()));
    emit_success(ctx.output, "subtask rm", &item, Some(&human))
}

pub fn run_clear(ctx: &Context) -> Result<()> {
    let mut store = ctx.open_store()?;
    let removed = store.apply(|store| Ok(store.delete_all_subtasks()))?;

    let human = HumanOutput::new(format!(
        "taskdeck subtask clear: removed {removed} subtask(s)"
    ));
    emit_success(ctx.output, "subtask clear", &ClearReport { removed }, Some(&human))
}

fn stored_item(subtask: Option<&Subtask>, id: TaskId) -> Result<Item> {
    subtask
        .cloned()
        .map(Item::Subtask)
        .ok_or_else(|| Error::not_found(TaskKind::Subtask, id))
}
