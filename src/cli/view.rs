//! Cross-kind views: priority order and view history.

use crate::cli::{item_line, Context};
use crate::error::{Error, Result};
use crate::model::{Item, TaskId};
use crate::output::{emit_success, HumanOutput};

pub fn run_prioritized(ctx: &Context) -> Result<()> {
    let store = ctx.open_snapshot()?;
    let items = store.store().prioritized();

    let mut human = HumanOutput::new(format!(
        "taskdeck prioritized: {} item(s)",
        items.len()
    ));
    for item in &items {
        human.push_detail(item_line(item, ctx.time_format()));
    }

    emit_success(ctx.output, "prioritized", &items, Some(&human))
}

/// History lives in memory, so it only reflects the views made by this invocation.
pub fn run_history(ctx: &Context, ids: Vec<TaskId>) -> Result<()> {
    let mut store = ctx.open_snapshot()?;
    for id in ids {
        store
            .store_mut()
            .get(id)
            .ok_or(Error::UnknownId(id))?;
    }
    let items: Vec<Item> = store.store().history();

    let mut human = HumanOutput::new(format!("taskdeck history: {} item(s)", items.len()));
    for item in &items {
        human.push_detail(item_line(item, ctx.time_format()));
    }

    emit_success(ctx.output, "history", &items, Some(&human))
}
