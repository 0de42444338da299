//! taskdeck epic command implementations.

use crate::cli::{item_line, push_item_summary, ClearReport, Context};
use crate::error::{Error, Result};
use crate::model::{Epic, Item, TaskId, TaskKind};
use crate::output::{emit_success, HumanOutput};

pub fn run_add(ctx: &Context, name: String, description: String) -> Result<()> {
    let mut store = ctx.open_store()?;
    let id = store.apply(|store| Ok(store.add_epic(Epic::new(name, description))))?;
    let item = stored_item(store.store().peek_epic(id), id)?;

    let mut human = HumanOutput::new(format!("taskdeck epic add: {id}"));
    push_item_summary(&mut human, &item, ctx.time_format());
    human.push_next_step(format!("taskdeck subtask add {id} <name>"));

    emit_success(ctx.output, "epic add", &item, Some(&human))
}

pub fn run_show(ctx: &Context, id: TaskId) -> Result<()> {
    let mut store = ctx.open_snapshot()?;
    let item = stored_item(store.store_mut().get_epic(id), id)?;

    let mut human = HumanOutput::new(format!("taskdeck epic show: {id}"));
    push_item_summary(&mut human, &item, ctx.time_format());
    if item_has_subtasks(&item) {
        human.push_next_step(format!("taskdeck epic subtasks {id}"));
    }

    emit_success(ctx.output, "epic show", &item, Some(&human))
}

pub fn run_list(ctx: &Context) -> Result<()> {
    let store = ctx.open_snapshot()?;
    let items: Vec<Item> = store
        .store()
        .epics()
        .into_iter()
        .cloned()
        .map(Item::Epic)
        .collect();

    let mut human = HumanOutput::new(format!("taskdeck epic list: {} epic(s)", items.len()));
    for item in &items {
        human.push_detail(item_line(item, ctx.time_format()));
    }

    emit_success(ctx.output, "epic list", &items, Some(&human))
}

pub fn run_update(
    ctx: &Context,
    id: TaskId,
    name: Option<String>,
    description: Option<String>,
) -> Result<()> {
    if name.is_none() && description.is_none() {
        return Err(Error::InvalidArgument(
            "Nothing to update: pass --name and/or --description".to_string(),
        ));
    }

    let mut store = ctx.open_store()?;
    let mut epic = store
        .store()
        .peek_epic(id)
        .cloned()
        .ok_or_else(|| Error::not_found(TaskKind::Epic, id))?;
    if let Some(name) = name {
        epic.name = name;
    }
    if let Some(description) = description {
        epic.description = description;
    }

    store.apply(|store| store.update_epic(epic))?;
    let item = stored_item(store.store().peek_epic(id), id)?;

    let mut human = HumanOutput::new(format!("taskdeck epic update: {id}"));
    push_item_summary(&mut human, &item, ctx.time_format());

    emit_success(ctx.output, "epic update", &item, Some(&human))
}

pub fn run_rm(ctx: &Context, id: TaskId) -> Result<()> {
    let mut store = ctx.open_store()?;
    let epic = store.apply(|store| {
        store
            .remove_epic(id)
            .ok_or_else(|| Error::not_found(TaskKind::Epic, id))
    })?;
    let removed_subtasks = epic.subtask_ids().len();
    let item = Item::Epic(epic);

    let mut human = HumanOutput::new(format!("taskdeck epic rm: {id} ({})", item.name()));
    if removed_subtasks > 0 {
        human.push_summary("subtasks removed", removed_subtasks.to_string());
    }
    emit_success(ctx.output, "epic rm", &item, Some(&human))
}

pub fn run_clear(ctx: &Context) -> Result<()> {
    let mut store = ctx.open_store()?;
    let removed = store.apply(|store| Ok(store.delete_all_epics()))?;

    let human = HumanOutput::new(format!(
        "taskdeck epic clear: removed {removed} epic(s) and their subtasks"
    ));
    emit_success(ctx.output, "epic clear", &ClearReport { removed }, Some(&human))
}

pub fn run_subtasks(ctx: &Context, id: TaskId) -> Result<()> {
    let store = ctx.open_snapshot()?;
    if store.store().peek_epic(id).is_none() {
        return Err(Error::not_found(TaskKind::Epic, id));
    }
    let items: Vec<Item> = store
        .store()
        .subtasks_of_epic(id)
        .into_iter()
        .cloned()
        .map(Item::Subtask)
        .collect();

    let mut human = HumanOutput::new(format!(
        "taskdeck epic subtasks: {id} has {} subtask(s)",
        items.len()
    ));
    for item in &items {
        human.push_detail(item_line(item, ctx.time_format()));
    }

    emit_success(ctx.output, "epic subtasks", &items, Some(&human))
}

fn item_has_subtasks(item: &Item) -> bool {
    matches!(item, Item::Epic(epic) if !epic.subtask_ids().is_empty())
}

fn stored_item(epic: Option<&Epic>, id: TaskId) -> Result<Item> {
    epic.cloned()
        .map(Item::Epic)
        .ok_or_else(|| Error::not_found(TaskKind::Epic, id))
}
