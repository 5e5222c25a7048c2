//! Log record entity module
//!
//! The structured history schema. Every task action the scheduler takes
//! becomes one record: a `run` when a task launches and exactly one terminal
//! record (`success`, `fail`, or `terminate`) when the execution ends.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Category of a log record
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// An execution was launched
    Run,
    /// The body returned without error
    Success,
    /// The body failed; the record carries the failure text
    Fail,
    /// The execution was cut short by a timeout, end condition, or shutdown
    Terminate,
}

impl Action {
    /// Checks whether the action ends an execution
    ///
    /// # Returns
    ///
    /// `true` for `success`, `fail`, and `terminate`
    pub fn is_terminal(&self) -> bool {
        matches!(self, Action::Success | Action::Fail | Action::Terminate)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Action::Run => "run",
            Action::Success => "success",
            Action::Fail => "fail",
            Action::Terminate => "terminate",
        };
        write!(f, "{text}")
    }
}

/// One entry in a task's history
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogRecord {
    /// Name of the task the record belongs to
    pub task_name: String,
    /// What happened
    pub action: Action,
    /// When it happened; strictly increasing within a session log
    pub asctime: DateTime<Utc>,
    /// Failure text for `fail` records; for subprocess failures this is the
    /// child's stderr, traceback included
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exc_text: Option<String>,
}

/// Counts the records carrying the given action
///
/// # Arguments
///
/// * `records` - The history to count over
/// * `action` - The action to count
///
/// # Returns
///
/// How many records carry the action
pub fn count_action(records: &[LogRecord], action: Action) -> usize {
    records.iter().filter(|r| r.action == action).count()
}
