//! taskdeck task command implementations.

use crate::cli::{item_line, push_item_summary, ClearReport, Context, ScheduleArgs};
use crate::error::{Error, Result};
use crate::model::{Item, Status, Task, TaskId, TaskKind};
use crate::output::{emit_success, HumanOutput};

pub struct AddOptions {
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

    let mut task = Task::new(options.name, options.description).with_status(status);
    task.start_time = schedule.start;
    task.duration = schedule.duration;

    let mut store = ctx.open_store()?;
    let id = store.apply(|store| store.add_task(task))?;
    let item = stored_item(store.store().peek_task(id), id)?;

    let mut human = HumanOutput::new(format!("taskdeck task add: {id}"));
    push_item_summary(&mut human, &item, ctx.time_format());
    human.push_next_step(format!("taskdeck task show {id}"));

    emit_success(ctx.output, "task add", &item, Some(&human))
}

pub fn run_show(ctx: &Context, id: TaskId) -> Result<()> {
    let mut store = ctx.open_snapshot()?;
    let item = stored_item(store.store_mut().get_task(id), id)?;

    let mut human = HumanOutput::new(format!("taskdeck task show: {id}"));
    push_item_summary(&mut human, &item, ctx.time_format());

    emit_success(ctx.output, "task show", &item, Some(&human))
}

pub fn run_list(ctx: &Context) -> Result<()> {
    let store = ctx.open_snapshot()?;
    let items: Vec<Item> = store
        .store()
        .tasks()
        .into_iter()
        .cloned()
        .map(Item::Task)
        .collect();

    let mut human = HumanOutput::new(format!("taskdeck task list: {} task(s)", items.len()));
    for item in &items {
        human.push_detail(item_line(item, ctx.time_format()));
    }

    emit_success(ctx.output, "task list", &items, Some(&human))
}

pub fn run_update(ctx: &Context, options: UpdateOptions) -> Result<()> {
    let id = options.id;
    let schedule = options.schedule.parse()?;
    let status = parse_status(options.status.as_deref())?;

    let mut store = ctx.open_store()?;
    let mut task = store
        .store()
        .peek_task(id)
        .cloned()
        .ok_or_else(|| Error::not_found(TaskKind::Task, id))?;

    if let Some(name) = options.name {
        task.name = name;
    }
    if let Some(description) = options.description {
        task.description = description;
    }
    if let Some(status) = status {
        task.status = status;
    }
    if options.unschedule {
        task.start_time = None;
        task.duration = None;
    }
    if schedule.start.is_some() {
        task.start_time = schedule.start;
    }
    if schedule.duration.is_some() {
        task.duration = schedule.duration;
    }

    store.apply(|store| store.update_task(task))?;
    let item = stored_item(store.store().peek_task(id), id)?;

    let mut human = HumanOutput::new(format!("taskdeck task update: {id}"));
    push_item_summary(&mut human, &item, ctx.time_format());

    emit_success(ctx.output, "task update", &item, Some(&human))
}

pub fn run_rm(ctx: &Context, id: TaskId) -> Result<()> {
    let mut store = ctx.open_store()?;
    let task = store.apply(|store| {
        store
            .remove_task(id)
            .ok_or_else(|| Error::not_found(TaskKind::Task, id))
    })?;
    let item = Item::Task(task);

    let human = HumanOutput::new(format!("taskdeck task rm: {id} ({})", item.name()));
    emit_success(ctx.output, "task rm", &item, Some(&human))
}

pub fn run_clear(ctx: &Context) -> Result<()> {
    let mut store = ctx.open_store()?;
    let removed = store.apply(|store| Ok(store.delete_all_tasks()))?;

    let human = HumanOutput::new(format!("taskdeck task clear: removed {removed} task(s)"));
    emit_success(ctx.output, "task clear", &ClearReport { removed }, Some(&human))
}

pub(crate) fn parse_status(status: Option<&str>) -> Result<Option<Status>> {
    status.map(str::parse::<Status>).transpose()
}

fn stored_item(task: Option<&Task>, id: TaskId) -> Result<Item> {
    task.cloned()
        .map(Item::Task)
        .ok_or_else(|| Error::not_found(TaskKind::Task, id))
}
