//! CLI command implementations.

pub mod serve;
pub mod sync;
pub mod tasks;

use thiserror::Error;

/// Errors reported by CLI commands before reaching the engine.
#[derive(Error, Debug)]
pub enum CliError {
    /// The deadline is not a `YYYY-MM-DD` date.
    #[error("invalid deadline '{0}', expected YYYY-MM-DD")]
    InvalidDeadline(String),

    /// No live task has this identifier.
    #[error("no task with id {0}")]
    NoSuchTask(i64),

    /// Unknown output format.
    #[error("unknown format '{0}', expected text or json")]
    UnknownFormat(String),

    /// The title is empty.
    #[error("title must not be empty")]
    EmptyTitle,
}
