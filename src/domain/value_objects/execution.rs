//! Execution mode value object module
//!
//! Defines the isolation level a task body runs under.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a task body executes
///
/// `Main` runs inline on the scheduler thread and blocks the loop until the
/// body returns. `Thread` runs on a worker thread that the scheduler polls.
/// `Process` runs in a worker subprocess whose outcome travels back through
/// the log queue; it is reserved for command-backed tasks.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Execution {
    /// Inline on the scheduler thread
    #[default]
    Main,
    /// On a worker thread the scheduler polls
    Thread,
    /// In a worker subprocess; command-backed tasks only
    Process,
}

impl fmt::Display for Execution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Execution::Main => "main",
            Execution::Thread => "thread",
            Execution::Process => "process",
        };
        write!(f, "{text}")
    }
}
