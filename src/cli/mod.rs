//! Command-line interface for taskdeck
//!
//! This module defines the CLI structure using clap derive macros.
//! Each command group is implemented in its own submodule.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::Config;
use crate::error::Result;
use crate::model::{format_duration, parse_duration, parse_start_time, Identified, Item, TaskId};
use crate::output::{HumanOutput, OutputOptions};
use crate::persist::FileBackedStore;

mod epic;
mod subtask;
mod task;
mod view;

/// taskdeck - tasks, epics and subtasks with conflict-free scheduling
#[derive(Parser, Debug)]
#[command(name = "taskdeck")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Directory holding `.taskdeck.toml` and the data file (defaults to current directory)
    #[arg(long, global = true, env = "TASKDECK_DIR")]
    pub dir: Option<PathBuf>,

    /// Data file to use instead of the configured one
    #[arg(long, global = true, env = "TASKDECK_FILE")]
    pub file: Option<PathBuf>,

    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Standalone tasks
    #[command(subcommand)]
    Task(TaskCommands),

    /// Epics and their derived status
    #[command(subcommand)]
    Epic(EpicCommands),

    /// Subtasks owned by an epic
    #[command(subcommand)]
    Subtask(SubtaskCommands),

    /// Tasks and subtasks ordered by start time (untimed last)
    Prioritized,

    /// View the given ids in order and print the resulting history
    History {
        /// Ids of tasks, epics or subtasks to view
        ids: Vec<TaskId>,
    },
}

/// Start time and duration flags shared by tasks and subtasks
#[derive(Args, Debug, Clone, Default)]
pub struct ScheduleArgs {
    /// Start time, e.g. 2024-01-01T09:00
    #[arg(long)]
    pub start: Option<String>,

    /// Duration, e.g. 30m, 2h, 1h30m (plain number = minutes)
    #[arg(long)]
    pub duration: Option<String>,
}

/// Task subcommands
#[derive(Subcommand, Debug)]
pub enum TaskCommands {
    /// Add a task
    Add {
        /// Task name
        name: String,

        /// Longer description
        #[arg(short, long, default_value = "")]
        description: String,

        /// Initial status: new, in_progress, done
        #[arg(long)]
        status: Option<String>,

        #[command(flatten)]
        schedule: ScheduleArgs,
    },

    /// Show a task
    Show {
        /// Task id
        id: TaskId,
    },

    /// List all tasks
    List,

    /// Change a task
    Update {
        /// Task id
        id: TaskId,

        /// New name
        #[arg(long)]
        name: Option<String>,

        /// New description
        #[arg(short, long)]
        description: Option<String>,

        /// New status: new, in_progress, done
        #[arg(long)]
        status: Option<String>,

        #[command(flatten)]
        schedule: ScheduleArgs,

        /// Clear start time and duration
        #[arg(long, conflicts_with_all = ["start", "duration"])]
        unschedule: bool,
    },

    /// Remove a task
    Rm {
        /// Task id
        id: TaskId,
    },

    /// Remove all tasks
    Clear,
}

/// Epic subcommands
#[derive(Subcommand, Debug)]
pub enum EpicCommands {
    /// Add an epic
    Add {
        /// Epic name
        name: String,

        /// Longer description
        #[arg(short, long, default_value = "")]
        description: String,
    },

    /// Show an epic
    Show {
        /// Epic id
        id: TaskId,
    },

    /// List all epics
    List,

    /// Rename or re-describe an epic
    Update {
        /// Epic id
        id: TaskId,

        /// New name
        #[arg(long)]
        name: Option<String>,

        /// New description
        #[arg(short, long)]
        description: Option<String>,
    },

    /// Remove an epic and all of its subtasks
    Rm {
        /// Epic id
        id: TaskId,
    },

    /// Remove all epics and subtasks
    Clear,

    /// List the subtasks of an epic
    Subtasks {
        /// Epic id
        id: TaskId,
    },
}

/// Subtask subcommands
#[derive(Subcommand, Debug)]
pub enum SubtaskCommands {
    /// Add a subtask to an epic
    Add {
        /// Owning epic id
        epic_id: TaskId,

        /// Subtask name
        name: String,

        /// Longer description
        #[arg(short, long, default_value = "")]
        description: String,

        /// Initial status: new, in_progress, done
        #[arg(long)]
        status: Option<String>,

        #[command(flatten)]
        schedule: ScheduleArgs,
    },

    /// Show a subtask
    Show {
        /// Subtask id
        id: TaskId,
    },

    /// List all subtasks
    List,

    /// Change a subtask
    Update {
        /// Subtask id
        id: TaskId,

        /// New name
        #[arg(long)]
        name: Option<String>,

        /// New description
        #[arg(short, long)]
        description: Option<String>,

        /// New status: new, in_progress, done
        #[arg(long)]
        status: Option<String>,

        #[command(flatten)]
        schedule: ScheduleArgs,

        /// Clear start time and duration
        #[arg(long, conflicts_with_all = ["start", "duration"])]
        unschedule: bool,
    },

    /// Remove a subtask
    Rm {
        /// Subtask id
        id: TaskId,
    },

    /// Remove all subtasks (epics are kept)
    Clear,
}

/// Resolved settings shared by every command
pub(crate) struct Context {
    pub config: Config,
    pub data_file: PathBuf,
    pub output: OutputOptions,
}

impl Context {
    fn resolve(dir: Option<PathBuf>, file: Option<PathBuf>, output: OutputOptions) -> Self {
        let dir = dir.unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
        let config = Config::load_from_dir(&dir);
        let data_file = match file {
            Some(file) if file.is_absolute() => file,
            Some(file) => dir.join(file),
            None => config.data_file(&dir),
        };
        Self {
            config,
            data_file,
            output,
        }
    }

    /// Open for a mutation; the data file stays locked until the store is dropped.
    pub fn open_store(&self) -> Result<FileBackedStore> {
        FileBackedStore::open(&self.data_file, self.config.storage.lock_timeout_ms)
    }

    pub fn open_snapshot(&self) -> Result<FileBackedStore> {
        FileBackedStore::open_read_only(&self.data_file, self.config.storage.lock_timeout_ms)
    }

    pub fn time_format(&self) -> &str {
        &self.config.display.time_format
    }
}

/// Result of a bulk delete
#[derive(serde::Serialize)]
pub(crate) struct ClearReport {
    pub removed: usize,
}

/// Parsed form of [`ScheduleArgs`]
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Schedule {
    pub start: Option<chrono::NaiveDateTime>,
    pub duration: Option<chrono::Duration>,
}

impl ScheduleArgs {
    pub(crate) fn parse(&self) -> Result<Schedule> {
        Ok(Schedule {
            start: self.start.as_deref().map(parse_start_time).transpose()?,
            duration: self.duration.as_deref().map(parse_duration).transpose()?,
        })
    }
}

/// One-line rendering used by list views
pub(crate) fn item_line(item: &Item, time_format: &str) -> String {
    let mut line = format!(
        "#{} [{}] {} ({})",
        item.id(),
        item.kind().as_str(),
        item.name(),
        item.status()
    );
    if let Some(start) = item.start_time() {
        line.push_str(&format!(" @ {}", start.format(time_format)));
    }
    if let Some(duration) = item.duration() {
        line.push_str(&format!(" for {}", format_duration(duration)));
    }
    if let Item::Subtask(subtask) = item {
        line.push_str(&format!(" in epic #{}", subtask.epic_id));
    }
    line
}

/// Summary block used by show/add/update views
pub(crate) fn push_item_summary(human: &mut HumanOutput, item: &Item, time_format: &str) {
    human.push_summary("id", item.id().to_string());
    human.push_summary("type", item.kind().as_str());
    human.push_summary("name", item.name());
    human.push_summary("status", item.status().to_string());
    match item {
        Item::Task(task) => human.push_summary("description", task.description.clone()),
        Item::Epic(epic) => {
            human.push_summary("description", epic.description.clone());
            let ids: Vec<String> = epic.subtask_ids().iter().map(ToString::to_string).collect();
            human.push_summary("subtasks", ids.join(", "));
        }
        Item::Subtask(subtask) => {
            human.push_summary("description", subtask.description.clone());
            human.push_summary("epic", subtask.epic_id.to_string());
        }
    }
    if let Some(start) = item.start_time() {
        human.push_summary("start", start.format(time_format).to_string());
    }
    if let Some(duration) = item.duration() {
        human.push_summary("duration", format_duration(duration));
    }
    if let Some(end) = item.end_time() {
        human.push_summary("end", end.format(time_format).to_string());
    }
}

impl Cli {
    /// Execute the CLI command
    pub fn run(self) -> Result<()> {
        let ctx = Context::resolve(
            self.dir,
            self.file,
            OutputOptions {
                json: self.json,
                quiet: self.quiet,
            },
        );

        match self.command {
            Commands::Task(cmd) => match cmd {
                TaskCommands::Add {
                    name,
                    description,
                    status,
                    schedule,
                } => task::run_add(
                    &ctx,
                    task::AddOptions {
                        name,
                        description,
                        status,
                        schedule,
                    },
                ),
                TaskCommands::Show { id } => task::run_show(&ctx, id),
                TaskCommands::List => task::run_list(&ctx),
                TaskCommands::Update {
                    id,
                    name,
                    description,
                    status,
                    schedule,
                    unschedule,
                } => task::run_update(
                    &ctx,
                    task::UpdateOptions {
                        id,
                        name,
                        description,
                        status,
                        schedule,
                        unschedule,
                    },
                ),
                TaskCommands::Rm { id } => task::run_rm(&ctx, id),
                TaskCommands::Clear => task::run_clear(&ctx),
            },
            Commands::Epic(cmd) => match cmd {
                EpicCommands::Add { name, description } => epic::run_add(&ctx, name, description),
                EpicCommands::Show { id } => epic::run_show(&ctx, id),
                EpicCommands::List => epic::run_list(&ctx),
                EpicCommands::Update {
                    id,
                    name,
                    description,
                } => epic::run_update(&ctx, id, name, description),
                EpicCommands::Rm { id } => epic::run_rm(&ctx, id),
                EpicCommands::Clear => epic::run_clear(&ctx),
                EpicCommands::Subtasks { id } => epic::run_subtasks(&ctx, id),
            },
            Commands::Subtask(cmd) => match cmd {
                SubtaskCommands::Add {
                    epic_id,
                    name,
                    description,
                    status,
                    schedule,
                } => subtask::run_add(
                    &ctx,
                    subtask::AddOptions {
                        epic_id,
                        name,
                        description,
                        status,
                        schedule,
                    },
                ),
                SubtaskCommands::Show { id } => subtask::run_show(&ctx, id),
                SubtaskCommands::List => subtask::run_list(&ctx),
                SubtaskCommands::Update {
                    id,
                    name,
                    description,
                    status,
                    schedule,
                    unschedule,
                } => subtask::run_update(
                    &ctx,
                    subtask::UpdateOptions {
                        id,
                        name,
                        description,
                        status,
                        schedule,
                        unschedule,
                    },
                ),
                SubtaskCommands::Rm { id } => subtask::run_rm(&ctx, id),
                SubtaskCommands::Clear => subtask::run_clear(&ctx),
            },
            Commands::Prioritized => view::run_prioritized(&ctx),
            Commands::History { ids } => view::run_history(&ctx, ids),
        }
    }
}
