//! Force state value object module
//!
//! The per-task override of the start condition. The two set states are
//! deliberately asymmetric: a forced run is consumed by the run it causes,
//! while a forced stop suppresses the task until it is explicitly cleared.

use serde::{Deserialize, Serialize};

/// Tri-valued start-condition override
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ForceState {
    /// No override; the start condition decides
    #[default]
    Unset,
    /// Run once regardless of the start condition, then reset to `Unset`
    ForceRun,
    /// Never run regardless of the start condition; persists until cleared
    ForceStop,
}

impl ForceState {
    /// Checks for the one-shot run override
    ///
    /// # Returns
    ///
    /// `true` if the next eligibility check must start the task
    pub fn is_forced_run(&self) -> bool {
        matches!(self, ForceState::ForceRun)
    }

    /// Checks for the standing suppression override
    ///
    /// # Returns
    ///
    /// `true` if the task must not start regardless of its start condition
    pub fn is_forced_stop(&self) -> bool {
        matches!(self, ForceState::ForceStop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_unset() {
        assert_eq!(ForceState::default(), ForceState::Unset);
    }

    #[test]
    fn test_predicates() {
        assert!(ForceState::ForceRun.is_forced_run());
        assert!(!ForceState::ForceRun.is_forced_stop());
        assert!(ForceState::ForceStop.is_forced_stop());
    }
}
