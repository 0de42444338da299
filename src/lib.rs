//! taskdeck - task tracking library
//!
//! This library provides the core of the taskdeck CLI: a store of tasks,
//! epics and subtasks with a shared id counter, derived epic status,
//! conflict-free scheduling and a view history.
//!
//! # Core Concepts
//!
//! - **Tasks**: standalone units of work with an optional time slot
//! - **Epics**: containers whose status and schedule derive from their subtasks
//! - **Subtasks**: units of work owned by exactly one epic
//! - **Priority view**: timed items by start, untimed last
//! - **History**: most recently viewed items, no duplicates
//!
//! # Module Organization
//!
//! - `model`: Entity types, status and time parsing
//! - `store`: The task store and its indexes
//! - `aggregate`: Epic status and schedule derivation
//! - `overlap`: Half-open interval conflict checks
//! - `history`: Recency list with O(1) removal
//! - `persist`: CSV codec and the file-backed store
//! - `lock`: File locking and atomic writes
//! - `config`: Configuration loading from `.taskdeck.toml`
//! - `output`: Human and JSON output envelopes
//! - `error`: Error types and result aliases
//! - `cli`: Command-line interface using clap

pub mod aggregate;
pub mod cli;
pub mod config;
pub mod error;
pub mod history;
pub mod lock;
pub mod model;
pub mod output;
pub mod overlap;
pub mod persist;
pub mod store;

pub use error::{Error, Result};
pub use model::{Epic, Item, Status, Subtask, Task, TaskId, TaskKind};
pub use store::TaskStore;
