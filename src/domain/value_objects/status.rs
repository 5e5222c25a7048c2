//! Task status value object module

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a task
///
/// Terminal states revert to `Idle` at the next scheduler cycle boundary; a
/// direct synchronous invocation leaves the terminal state visible.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// No execution outstanding; the task may be launched
    #[default]
    Idle,
    /// An execution is in flight
    Run,
    /// The last execution returned without error
    Success,
    /// The last execution failed
    Fail,
    /// The last execution was cut short
    Terminate,
}

impl Status {
    /// Checks whether an execution is in flight
    ///
    /// # Returns
    ///
    /// `true` while the task is in the `run` state
    pub fn is_running(&self) -> bool {
        matches!(self, Status::Run)
    }

    /// Checks whether the status records a finished execution
    ///
    /// # Returns
    ///
    /// `true` for `success`, `fail`, and `terminate`
    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Success | Status::Fail | Status::Terminate)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Status::Idle => "idle",
            Status::Run => "run",
            Status::Success => "success",
            Status::Fail => "fail",
            Status::Terminate => "terminate",
        };
        write!(f, "{text}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(Status::Run.is_running());
        assert!(!Status::Run.is_terminal());
        assert!(Status::Success.is_terminal());
        assert!(Status::Fail.is_terminal());
        assert!(Status::Terminate.is_terminal());
        assert!(!Status::Idle.is_terminal());
    }
}
