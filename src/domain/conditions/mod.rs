//! Condition algebra module
//!
//! Conditions are boolean expression trees evaluated at a moment in time.
//! Leaves are statements (observations over task history, scheduler state, or
//! the calendar); interior nodes combine them with short-circuit `and`, `or`,
//! and `not`. The trees are built with the `&`, `|`, and `!` operators.

pub mod statement;

pub use statement::{
    scheduler_cycles, scheduler_started, task_finished, task_started, time_within, CmpOp,
    Statement, StatementError,
};

use chrono::{DateTime, Utc};
use std::ops::{BitAnd, BitOr, Not};

use crate::domain::entities::Session;

/// Scheduler state exposed to condition evaluation
#[derive(Debug, Clone)]
pub struct SchedulerInfo {
    /// The scheduler's current name
    pub name: String,
    /// When the scheduler's run began
    pub started_at: DateTime<Utc>,
    /// When the cycle under evaluation began
    pub cycle_started_at: DateTime<Utc>,
    /// Completed cycles so far
    pub n_cycles: u64,
}

/// Everything a condition may observe
///
/// Built fresh for each evaluation; holds the evaluation instant, the session
/// whose histories statements count over, and the running scheduler's state
/// when one exists.
pub struct EvalContext<'a> {
    /// The instant the condition is evaluated at
    pub now: DateTime<Utc>,
    /// The session whose task histories statements observe
    pub session: &'a Session,
    /// State of the running scheduler, absent outside a scheduler run
    pub scheduler: Option<&'a SchedulerInfo>,
}

impl<'a> EvalContext<'a> {
    /// Creates an evaluation context
    ///
    /// # Arguments
    ///
    /// * `now` - The evaluation instant
    /// * `session` - The session to observe
    /// * `scheduler` - The running scheduler's state, if any
    ///
    /// # Returns
    ///
    /// A new EvalContext borrowing the given session
    pub fn new(
        now: DateTime<Utc>,
        session: &'a Session,
        scheduler: Option<&'a SchedulerInfo>,
    ) -> Self {
        Self {
            now,
            session,
            scheduler,
        }
    }
}

/// A boolean expression tree over statements
#[derive(Debug, Clone)]
pub enum Condition {
    /// Sentinel that always evaluates true
    AlwaysTrue,
    /// Sentinel that always evaluates false
    AlwaysFalse,
    /// Negation of the inner condition
    Not(Box<Condition>),
    /// Conjunction; the right side is skipped when the left is false
    And(Box<Condition>, Box<Condition>),
    /// Disjunction; the right side is skipped when the left is true
    Or(Box<Condition>, Box<Condition>),
    /// A statement leaf
    Statement(Statement),
}

impl Condition {
    /// Evaluates the tree at the context instant
    ///
    /// `and`/`or` short-circuit and statement failures count as false, so
    /// evaluation never blocks and never panics.
    ///
    /// # Arguments
    ///
    /// * `ctx` - The evaluation context
    ///
    /// # Returns
    ///
    /// The truth value of the tree
    pub fn evaluate(&self, ctx: &EvalContext) -> bool {
        match self {
            Condition::AlwaysTrue => true,
            Condition::AlwaysFalse => false,
            Condition::Not(inner) => !inner.evaluate(ctx),
            Condition::And(left, right) => left.evaluate(ctx) && right.evaluate(ctx),
            Condition::Or(left, right) => left.evaluate(ctx) || right.evaluate(ctx),
            Condition::Statement(statement) => statement.truth(ctx),
        }
    }
}

impl From<Statement> for Condition {
    fn from(statement: Statement) -> Self {
        Condition::Statement(statement)
    }
}

impl BitAnd for Condition {
    type Output = Condition;

    fn bitand(self, rhs: Condition) -> Condition {
        Condition::And(Box::new(self), Box::new(rhs))
    }
}

impl BitOr for Condition {
    type Output = Condition;

    fn bitor(self, rhs: Condition) -> Condition {
        Condition::Or(Box::new(self), Box::new(rhs))
    }
}

impl Not for Condition {
    type Output = Condition;

    fn not(self) -> Condition {
        Condition::Not(Box::new(self))
    }
}

impl BitAnd<Statement> for Condition {
    type Output = Condition;

    fn bitand(self, rhs: Statement) -> Condition {
        self & Condition::from(rhs)
    }
}

impl BitOr<Statement> for Condition {
    type Output = Condition;

    fn bitor(self, rhs: Statement) -> Condition {
        self | Condition::from(rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn ctx_session() -> Session {
        Session::new()
    }

    #[test]
    fn test_sentinels() {
        let session = ctx_session();
        let ctx = EvalContext::new(Utc::now(), &session, None);
        assert!(Condition::AlwaysTrue.evaluate(&ctx));
        assert!(!Condition::AlwaysFalse.evaluate(&ctx));
    }

    #[test]
    fn test_boolean_composition() {
        let session = ctx_session();
        let ctx = EvalContext::new(Utc::now(), &session, None);

        let cond = Condition::AlwaysTrue & Condition::AlwaysFalse;
        assert!(!cond.evaluate(&ctx));

        let cond = Condition::AlwaysTrue | Condition::AlwaysFalse;
        assert!(cond.evaluate(&ctx));

        let cond = !(Condition::AlwaysFalse | Condition::AlwaysFalse);
        assert!(cond.evaluate(&ctx));
    }

    #[test]
    fn test_and_short_circuits() {
        let session = ctx_session();
        let ctx = EvalContext::new(Utc::now(), &session, None);

        let calls = Arc::new(AtomicUsize::new(0));
        let observed = calls.clone();
        let probe = Statement::custom("probe", false, false, move |_, _| {
            observed.fetch_add(1, Ordering::SeqCst);
            Ok(1.0)
        });

        let cond = Condition::AlwaysFalse & Condition::from(probe);
        assert!(!cond.evaluate(&ctx));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_observation_error_is_false() {
        let session = ctx_session();
        let ctx = EvalContext::new(Utc::now(), &session, None);

        let failing = Statement::custom("boom", false, false, |_, _| {
            Err(anyhow::anyhow!("no history yet"))
        });
        assert!(!Condition::from(failing.clone()).evaluate(&ctx));

        // The negation of a failing observation is true
        assert!((!Condition::from(failing)).evaluate(&ctx));
    }
}
