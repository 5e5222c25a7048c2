//! Statement module
//!
//! A statement is a named observation bound into the condition algebra. Two
//! flags shape its behaviour: *historical* statements observe only a time
//! window computed from their period's `rollback` at evaluation time, and
//! *quantitative* statements yield a number that comparison builders can
//! threshold. Builders clone; a derived statement never mutates its origin.
//! The windowing builders are reserved for historical statements and refuse
//! anything else, so a bound period is always consumed by evaluation.

use chrono::NaiveDateTime;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use super::{Condition, EvalContext};
use crate::domain::entities::record::{Action, LogRecord};
use crate::domain::time::{
    Interval, Period, TimeError, TimeOfDay, TimeOfHour, TimeOfMonth, TimeOfWeek, TimeOfYear,
};

type ObserveFn = dyn Fn(&EvalContext, Option<&Interval>) -> anyhow::Result<f64> + Send + Sync;

/// Errors from statement construction and derivation
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StatementError {
    /// A windowing builder was applied to a statement that is not historical
    #[error("statement '{statement}' is not historical and cannot be windowed")]
    NotHistorical {
        /// Name of the statement the builder was applied to
        statement: String,
    },
    /// The requested window could not be built from its calendar inputs
    #[error(transparent)]
    Time(#[from] TimeError),
}

/// Comparison operators storable on a quantitative statement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    /// Observation equals the threshold
    Eq,
    /// Observation differs from the threshold
    Ne,
    /// Observation is below the threshold
    Lt,
    /// Observation is above the threshold
    Gt,
    /// Observation is at or below the threshold
    Le,
    /// Observation is at or above the threshold
    Ge,
}

impl CmpOp {
    /// Applies the comparison to an observed value
    ///
    /// # Arguments
    ///
    /// * `lhs` - The observed value
    /// * `rhs` - The stored threshold
    ///
    /// # Returns
    ///
    /// `true` if the comparison holds
    fn holds(self, lhs: f64, rhs: f64) -> bool {
        match self {
            CmpOp::Eq => lhs == rhs,
            CmpOp::Ne => lhs != rhs,
            CmpOp::Lt => lhs < rhs,
            CmpOp::Gt => lhs > rhs,
            CmpOp::Le => lhs <= rhs,
            CmpOp::Ge => lhs >= rhs,
        }
    }
}

#[derive(Clone)]
enum StatementKind {
    /// Count of `run` records of a task in the active window
    TaskStarted { task: String },
    /// Count of terminal records of a task in the active window
    TaskFinished { task: String },
    /// Whether the scheduler's start instant lies in the active window
    SchedulerStarted,
    /// Number of completed scheduler cycles
    SchedulerCycles,
    /// Whether the evaluation instant lies inside the bound period
    TimeWithin,
    /// User observation function
    Custom {
        name: String,
        historical: bool,
        quantitative: bool,
        observe: Arc<ObserveFn>,
    },
}

/// A named observation usable as a condition leaf
///
/// Statements are immutable values: the fluent builders (`between`, `past`,
/// `in_period`, `in_cycle`, and the comparison methods) consume a copy and
/// return a derived statement, leaving the original untouched.
#[derive(Clone)]
pub struct Statement {
    /// The observation and its historical/quantitative flags
    kind: StatementKind,
    /// Period whose `rollback` supplies the active window (historical
    /// statements), or the subject period of `time_within`
    period: Option<Period>,
    /// When set, the active window is the scheduler cycle under evaluation
    in_cycle: bool,
    /// Comparison thresholds; all must hold for the statement to be true
    comparisons: Vec<(CmpOp, f64)>,
}

/// Creates a statement counting `run` records of the named task in the
/// active window
///
/// # Arguments
///
/// * `task` - Name of the task whose starts are counted
///
/// # Returns
///
/// A historical, quantitative statement
pub fn task_started(task: &str) -> Statement {
    Statement::of(StatementKind::TaskStarted {
        task: task.to_string(),
    })
}

/// Creates a statement counting `success`, `fail`, and `terminate` records
/// of the named task in the active window
///
/// # Arguments
///
/// * `task` - Name of the task whose finishes are counted
///
/// # Returns
///
/// A historical, quantitative statement
pub fn task_finished(task: &str) -> Statement {
    Statement::of(StatementKind::TaskFinished {
        task: task.to_string(),
    })
}

/// Creates a statement that is true while the scheduler's start instant lies
/// in the period's rollback window
///
/// Its negation is the usual shut-down-after-elapsed idiom.
///
/// # Arguments
///
/// * `period` - Period whose rollback window is checked against the
///   scheduler's start instant
///
/// # Returns
///
/// A historical statement bound to the given period
pub fn scheduler_started(period: Period) -> Statement {
    let mut statement = Statement::of(StatementKind::SchedulerStarted);
    statement.period = Some(period);
    statement
}

/// Creates a statement observing the number of completed scheduler cycles
///
/// # Returns
///
/// A quantitative statement, usually combined with a comparison builder
pub fn scheduler_cycles() -> Statement {
    Statement::of(StatementKind::SchedulerCycles)
}

/// Creates a statement that is true while the evaluation instant lies inside
/// an occurrence of the period
///
/// # Arguments
///
/// * `period` - The calendar period to test membership of
///
/// # Returns
///
/// A statement bound to the given period
pub fn time_within(period: Period) -> Statement {
    let mut statement = Statement::of(StatementKind::TimeWithin);
    statement.period = Some(period);
    statement
}

impl Statement {
    fn of(kind: StatementKind) -> Self {
        Self {
            kind,
            period: None,
            in_cycle: false,
            comparisons: Vec::new(),
        }
    }

    /// Creates a statement around a user observation function
    ///
    /// The function receives the evaluation context and, for historical
    /// statements, the active window. Errors make the statement false.
    ///
    /// # Arguments
    ///
    /// * `name` - Display name used in diagnostics
    /// * `historical` - Whether the observation is time-windowed
    /// * `quantitative` - Whether the observation yields a comparable number
    /// * `observe` - The observation function
    ///
    /// # Returns
    ///
    /// A new custom statement with the given flags
    pub fn custom(
        name: &str,
        historical: bool,
        quantitative: bool,
        observe: impl Fn(&EvalContext, Option<&Interval>) -> anyhow::Result<f64>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Self::of(StatementKind::Custom {
            name: name.to_string(),
            historical,
            quantitative,
            observe: Arc::new(observe),
        })
    }

    /// Returns the statement's display name
    pub fn name(&self) -> &str {
        match &self.kind {
            StatementKind::TaskStarted { .. } => "task_started",
            StatementKind::TaskFinished { .. } => "task_finished",
            StatementKind::SchedulerStarted => "scheduler_started",
            StatementKind::SchedulerCycles => "scheduler_cycles",
            StatementKind::TimeWithin => "time_within",
            StatementKind::Custom { name, .. } => name,
        }
    }

    /// Whether the statement observes a time window
    ///
    /// Only historical statements accept the windowing builders, and only
    /// they receive an active window during evaluation.
    ///
    /// # Returns
    ///
    /// `true` if the statement is historical
    pub fn historical(&self) -> bool {
        match &self.kind {
            StatementKind::TaskStarted { .. }
            | StatementKind::TaskFinished { .. }
            | StatementKind::SchedulerStarted => true,
            StatementKind::SchedulerCycles | StatementKind::TimeWithin => false,
            StatementKind::Custom { historical, .. } => *historical,
        }
    }

    /// Whether the observation yields a number
    ///
    /// Quantitative statements without a comparison are true when the
    /// observation is greater than zero.
    ///
    /// # Returns
    ///
    /// `true` if the statement is quantitative
    pub fn quantitative(&self) -> bool {
        match &self.kind {
            StatementKind::TaskStarted { .. }
            | StatementKind::TaskFinished { .. }
            | StatementKind::SchedulerCycles => true,
            StatementKind::SchedulerStarted | StatementKind::TimeWithin => false,
            StatementKind::Custom { quantitative, .. } => *quantitative,
        }
    }

    /// Binds the statement to a period; the active window becomes
    /// `period.rollback(now)`
    ///
    /// # Arguments
    ///
    /// * `period` - The period supplying the window
    ///
    /// # Returns
    ///
    /// The derived statement, or `StatementError::NotHistorical` when the
    /// statement does not observe a window
    pub fn with_period(mut self, period: Period) -> Result<Self, StatementError> {
        self.require_historical()?;
        self.period = Some(period);
        self.in_cycle = false;
        Ok(self)
    }

    /// Windows the statement between two calendar points
    ///
    /// The period family is inferred from the string shapes: `"10:00"`-style
    /// clock times give a time-of-day span, weekday names a time-of-week
    /// span, and `"15."` style day numbers a time-of-month span.
    ///
    /// # Arguments
    ///
    /// * `start` - Start of the span
    /// * `end` - End of the span
    ///
    /// # Returns
    ///
    /// The derived statement, or an error when the statement is not
    /// historical or the span cannot be parsed
    pub fn between(self, start: &str, end: &str) -> Result<Self, StatementError> {
        let period = infer_between(start, end)?;
        self.with_period(period)
    }

    /// Windows the statement to the trailing duration
    ///
    /// # Arguments
    ///
    /// * `length` - Length of the sliding window ending at the evaluation
    ///   instant
    ///
    /// # Returns
    ///
    /// The derived statement, or `StatementError::NotHistorical` when the
    /// statement does not observe a window
    pub fn past(self, length: std::time::Duration) -> Result<Self, StatementError> {
        self.with_period(Period::delta(length))
    }

    /// Windows the statement to a named calendar unit
    ///
    /// # Arguments
    ///
    /// * `name` - One of `"minute"`, `"hour"`, `"today"`/`"day"`, `"week"`,
    ///   `"month"`, or `"year"`
    ///
    /// # Returns
    ///
    /// The derived statement, or an error when the statement is not
    /// historical or the name is unknown
    pub fn in_period(self, name: &str) -> Result<Self, StatementError> {
        let period = match name.to_ascii_lowercase().as_str() {
            "minute" => Period::every_minute(),
            "hour" => TimeOfHour::between(0, 59)?,
            "today" | "day" => TimeOfDay::between("00:00", "24:00")?,
            "week" => TimeOfWeek::between("Mon", "Sun")?,
            "month" => TimeOfMonth::between(1, 31)?,
            "year" => TimeOfYear::between_months(1, 12)?,
            other => {
                return Err(StatementError::Time(TimeError::Unparsable {
                    what: "named window",
                    value: other.to_string(),
                }))
            }
        };
        self.with_period(period)
    }

    /// Windows the statement to the scheduler cycle under evaluation
    ///
    /// # Returns
    ///
    /// The derived statement, or `StatementError::NotHistorical` when the
    /// statement does not observe a window
    pub fn in_cycle(mut self) -> Result<Self, StatementError> {
        self.require_historical()?;
        self.period = None;
        self.in_cycle = true;
        Ok(self)
    }

    fn require_historical(&self) -> Result<(), StatementError> {
        if self.historical() {
            Ok(())
        } else {
            Err(StatementError::NotHistorical {
                statement: self.name().to_string(),
            })
        }
    }

    /// Requires the observation to equal the threshold
    ///
    /// # Arguments
    ///
    /// * `value` - The threshold to compare against
    ///
    /// # Returns
    ///
    /// The derived statement carrying the comparison
    pub fn eq(self, value: impl Into<f64>) -> Self {
        self.compare(CmpOp::Eq, value)
    }

    /// Requires the observation to differ from the threshold
    ///
    /// # Arguments
    ///
    /// * `value` - The threshold to compare against
    ///
    /// # Returns
    ///
    /// The derived statement carrying the comparison
    pub fn ne(self, value: impl Into<f64>) -> Self {
        self.compare(CmpOp::Ne, value)
    }

    /// Requires the observation to be below the threshold
    ///
    /// # Arguments
    ///
    /// * `value` - The threshold to compare against
    ///
    /// # Returns
    ///
    /// The derived statement carrying the comparison
    pub fn lt(self, value: impl Into<f64>) -> Self {
        self.compare(CmpOp::Lt, value)
    }

    /// Requires the observation to be above the threshold
    ///
    /// # Arguments
    ///
    /// * `value` - The threshold to compare against
    ///
    /// # Returns
    ///
    /// The derived statement carrying the comparison
    pub fn gt(self, value: impl Into<f64>) -> Self {
        self.compare(CmpOp::Gt, value)
    }

    /// Requires the observation to be at or below the threshold
    ///
    /// # Arguments
    ///
    /// * `value` - The threshold to compare against
    ///
    /// # Returns
    ///
    /// The derived statement carrying the comparison
    pub fn le(self, value: impl Into<f64>) -> Self {
        self.compare(CmpOp::Le, value)
    }

    /// Requires the observation to be at or above the threshold
    ///
    /// # Arguments
    ///
    /// * `value` - The threshold to compare against
    ///
    /// # Returns
    ///
    /// The derived statement carrying the comparison
    pub fn ge(self, value: impl Into<f64>) -> Self {
        self.compare(CmpOp::Ge, value)
    }

    fn compare(mut self, op: CmpOp, value: impl Into<f64>) -> Self {
        self.comparisons.push((op, value.into()));
        self
    }

    /// Evaluates the statement's truth at the context instant
    ///
    /// Observation errors and missing windows evaluate to false; nothing
    /// escapes this method.
    ///
    /// # Arguments
    ///
    /// * `ctx` - The evaluation context
    ///
    /// # Returns
    ///
    /// `true` if the observation (reduced through any stored comparisons)
    /// holds
    pub fn truth(&self, ctx: &EvalContext) -> bool {
        let value = match self.observe(ctx) {
            Ok(value) => value,
            Err(error) => {
                tracing::trace!(statement = self.name(), %error, "observation failed");
                return false;
            }
        };
        if self.comparisons.is_empty() {
            if self.quantitative() {
                value > 0.0
            } else {
                value != 0.0
            }
        } else {
            self.comparisons
                .iter()
                .all(|(op, rhs)| op.holds(value, *rhs))
        }
    }

    /// Computes the raw observation value
    ///
    /// # Arguments
    ///
    /// * `ctx` - The evaluation context
    ///
    /// # Returns
    ///
    /// The observed number, or an error when the observation cannot be made
    /// (unknown task, no running scheduler, window with no occurrence)
    pub fn observe(&self, ctx: &EvalContext) -> anyhow::Result<f64> {
        let window = self.window(ctx)?;
        match &self.kind {
            StatementKind::TaskStarted { task } => {
                let records = self.task_records(ctx, task)?;
                Ok(count_in_window(records, window.as_ref(), |action| {
                    action == Action::Run
                }))
            }
            StatementKind::TaskFinished { task } => {
                let records = self.task_records(ctx, task)?;
                Ok(count_in_window(records, window.as_ref(), |action| {
                    action.is_terminal()
                }))
            }
            StatementKind::SchedulerStarted => {
                let info = ctx
                    .scheduler
                    .ok_or_else(|| anyhow::anyhow!("no scheduler is running"))?;
                let started = info.started_at.naive_utc();
                let inside = window.as_ref().map_or(true, |iv| within(iv, started));
                Ok(if inside { 1.0 } else { 0.0 })
            }
            StatementKind::SchedulerCycles => {
                let info = ctx
                    .scheduler
                    .ok_or_else(|| anyhow::anyhow!("no scheduler is running"))?;
                Ok(info.n_cycles as f64)
            }
            StatementKind::TimeWithin => {
                let period = self
                    .period
                    .as_ref()
                    .ok_or_else(|| anyhow::anyhow!("time_within requires a period"))?;
                Ok(if period.contains(ctx.now.naive_utc()) {
                    1.0
                } else {
                    0.0
                })
            }
            StatementKind::Custom { observe, .. } => observe(ctx, window.as_ref()),
        }
    }

    fn task_records<'s>(
        &self,
        ctx: &'s EvalContext,
        task: &str,
    ) -> anyhow::Result<&'s [LogRecord]> {
        ctx.session
            .get_history(task)
            .ok_or_else(|| anyhow::anyhow!("unknown task '{task}'"))
    }

    /// Computes the active window for a historical observation
    ///
    /// Non-historical statements never get a window, whatever else is set on
    /// them. For historical statements the window is the bound period's
    /// rollback interval, the current scheduler cycle for `in_cycle`, or the
    /// whole history when neither is bound.
    ///
    /// # Arguments
    ///
    /// * `ctx` - The evaluation context
    ///
    /// # Returns
    ///
    /// The active window, `None` for the whole history, or an error when the
    /// window cannot be computed
    fn window(&self, ctx: &EvalContext) -> anyhow::Result<Option<Interval>> {
        if !self.historical() {
            return Ok(None);
        }
        if let Some(period) = &self.period {
            let interval = period
                .rollback(ctx.now.naive_utc())
                .ok_or_else(|| anyhow::anyhow!("period has no occurrence to roll back to"))?;
            return Ok(Some(interval));
        }
        if self.in_cycle {
            let info = ctx
                .scheduler
                .ok_or_else(|| anyhow::anyhow!("no scheduler cycle to window on"))?;
            let interval = Interval::new(
                info.cycle_started_at.naive_utc(),
                ctx.now.naive_utc(),
                crate::domain::time::Closed::Both,
            )?;
            return Ok(Some(interval));
        }
        Ok(None)
    }
}

fn within(interval: &Interval, t: NaiveDateTime) -> bool {
    // Window membership is boundary-tolerant: a record stamped exactly at
    // either edge counts
    interval.left() <= t && t <= interval.right()
}

fn count_in_window(
    records: &[LogRecord],
    window: Option<&Interval>,
    select: impl Fn(Action) -> bool,
) -> f64 {
    records
        .iter()
        .filter(|record| select(record.action))
        .filter(|record| window.map_or(true, |iv| within(iv, record.asctime.naive_utc())))
        .count() as f64
}

fn infer_between(start: &str, end: &str) -> Result<Period, TimeError> {
    if start.contains(':') && end.contains(':') {
        return TimeOfDay::between(start, end);
    }
    if let Ok(period) = TimeOfWeek::between(start, end) {
        return Ok(period);
    }
    let day = |text: &str| {
        text.trim_end_matches('.')
            .parse::<u32>()
            .map_err(|_| TimeError::Unparsable {
                what: "calendar point",
                value: text.to_string(),
            })
    };
    TimeOfMonth::between(day(start)?, day(end)?)
}

impl fmt::Debug for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Statement")
            .field("name", &self.name())
            .field("period", &self.period)
            .field("in_cycle", &self.in_cycle)
            .field("comparisons", &self.comparisons)
            .finish()
    }
}

impl std::ops::Not for Statement {
    type Output = Condition;

    fn not(self) -> Condition {
        !Condition::from(self)
    }
}

impl std::ops::BitAnd for Statement {
    type Output = Condition;

    fn bitand(self, rhs: Statement) -> Condition {
        Condition::from(self) & Condition::from(rhs)
    }
}

impl std::ops::BitOr for Statement {
    type Output = Condition;

    fn bitor(self, rhs: Statement) -> Condition {
        Condition::from(self) | Condition::from(rhs)
    }
}

impl std::ops::BitAnd<Condition> for Statement {
    type Output = Condition;

    fn bitand(self, rhs: Condition) -> Condition {
        Condition::from(self) & rhs
    }
}

impl std::ops::BitOr<Condition> for Statement {
    type Output = Condition;

    fn bitor(self, rhs: Condition) -> Condition {
        Condition::from(self) | rhs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::conditions::SchedulerInfo;
    use crate::domain::entities::{Session, Task};
    use chrono::{Duration, Utc};

    fn session_with(name: &str, actions: &[Action]) -> Session {
        let mut session = Session::new();
        session
            .add_task(Task::func(name, |_| Ok(())))
            .expect("task registers");
        for action in actions {
            session.record(name, *action, None);
        }
        session
    }

    #[test]
    fn test_count_defaults_to_more_than_zero() {
        let session = session_with("job", &[Action::Run, Action::Success]);
        let ctx = EvalContext::new(Utc::now(), &session, None);

        assert!(task_started("job").truth(&ctx));
        assert!(task_finished("job").truth(&ctx));
        assert!(!task_started("other").truth(&ctx));
    }

    #[test]
    fn test_comparisons() {
        let session = session_with(
            "job",
            &[Action::Run, Action::Success, Action::Run, Action::Fail],
        );
        let ctx = EvalContext::new(Utc::now(), &session, None);

        assert!(task_started("job").ge(2).truth(&ctx));
        assert!(task_started("job").eq(2).truth(&ctx));
        assert!(!task_started("job").gt(2).truth(&ctx));
        assert!(task_started("job").ne(3).truth(&ctx));
        assert!(task_started("job").lt(3).truth(&ctx));

        // All recorded comparisons must hold together
        assert!(task_started("job").ge(1).le(2).truth(&ctx));
        assert!(!task_started("job").ge(1).le(1).truth(&ctx));
    }

    #[test]
    fn test_terminal_actions_counted_as_finished() {
        let session = session_with(
            "job",
            &[
                Action::Run,
                Action::Fail,
                Action::Run,
                Action::Terminate,
                Action::Run,
                Action::Success,
            ],
        );
        let ctx = EvalContext::new(Utc::now(), &session, None);
        assert!(task_finished("job").eq(3).truth(&ctx));
    }

    #[test]
    fn test_builders_clone_instead_of_mutating() {
        let base = task_started("job");
        let derived = base
            .clone()
            .past(std::time::Duration::from_secs(60))
            .unwrap()
            .ge(3);
        assert!(base.period.is_none());
        assert!(base.comparisons.is_empty());
        assert!(derived.period.is_some());
        assert_eq!(derived.comparisons.len(), 1);
    }

    #[test]
    fn test_past_window_excludes_old_records() {
        let mut session = Session::new();
        session
            .add_task(Task::func("job", |_| Ok(())))
            .expect("task registers");

        // One run far in the past, one just now
        let old = Utc::now() - Duration::hours(2);
        session.record_at("job", Action::Run, None, old);
        session.record("job", Action::Run, None);

        let ctx = EvalContext::new(Utc::now(), &session, None);
        assert!(task_started("job")
            .past(std::time::Duration::from_secs(600))
            .unwrap()
            .eq(1)
            .truth(&ctx));
        assert!(task_started("job").eq(2).truth(&ctx));
    }

    #[test]
    fn test_between_inference() {
        let clock = task_started("job").between("10:00", "13:00").unwrap();
        assert!(matches!(clock.period, Some(Period::OfDay { .. })));

        let week = task_started("job").between("Mon", "Fri").unwrap();
        assert!(matches!(week.period, Some(Period::OfWeek { .. })));

        let month = task_started("job").between("1.", "15.").unwrap();
        assert!(matches!(month.period, Some(Period::OfMonth { .. })));

        assert!(task_started("job").between("no", "idea").is_err());
    }

    #[test]
    fn test_windowing_requires_historical() {
        // scheduler_cycles is quantitative only; every windowing builder
        // refuses it instead of binding a period evaluation would ignore
        assert_eq!(
            scheduler_cycles()
                .past(std::time::Duration::from_secs(60))
                .unwrap_err(),
            StatementError::NotHistorical {
                statement: "scheduler_cycles".to_string()
            }
        );
        assert!(scheduler_cycles().in_cycle().is_err());
        assert!(scheduler_cycles().between("10:00", "11:00").is_err());
        assert!(scheduler_cycles().in_period("today").is_err());
        assert!(scheduler_cycles()
            .with_period(Period::every_minute())
            .is_err());

        // time_within carries a subject period but is not windowed
        assert!(time_within(Period::every_minute())
            .with_period(Period::Always)
            .is_err());

        // A non-historical custom statement is refused the same way
        let plain = Statement::custom("plain", false, true, |_, _| Ok(1.0));
        assert!(plain.past(std::time::Duration::from_secs(1)).is_err());
    }

    #[test]
    fn test_custom_window_follows_historical_flag() {
        let session = Session::new();
        let now = Utc::now();
        let info = SchedulerInfo {
            name: "scheduler".to_string(),
            started_at: now,
            cycle_started_at: now,
            n_cycles: 0,
        };
        let ctx = EvalContext::new(now, &session, Some(&info));

        // Historical custom statements receive the window their period rolls
        // back to
        let windowed = Statement::custom("windowed", true, true, |_, window| {
            anyhow::ensure!(window.is_some(), "expected a window");
            Ok(1.0)
        })
        .past(std::time::Duration::from_secs(60))
        .unwrap();
        assert!(windowed.truth(&ctx));

        // Without a bound period a historical statement observes the whole
        // history, and a non-historical one never sees a window at all
        let unbounded = Statement::custom("unbounded", true, true, |_, window| {
            anyhow::ensure!(window.is_none(), "expected the whole history");
            Ok(1.0)
        });
        assert!(unbounded.truth(&ctx));

        let plain = Statement::custom("plain", false, true, |_, window| {
            anyhow::ensure!(window.is_none(), "expected no window");
            Ok(1.0)
        });
        assert!(plain.truth(&ctx));
    }

    #[test]
    fn test_scheduler_started_windows() {
        let session = Session::new();
        let now = Utc::now();
        let info = SchedulerInfo {
            name: "scheduler".to_string(),
            started_at: now - Duration::seconds(30),
            cycle_started_at: now,
            n_cycles: 0,
        };
        let ctx = EvalContext::new(now, &session, Some(&info));

        // Started within the last minute, but not within the last second
        let recent = scheduler_started(Period::delta(std::time::Duration::from_secs(60)));
        assert!(recent.truth(&ctx));
        let stale = scheduler_started(Period::delta(std::time::Duration::from_secs(1)));
        assert!(!stale.truth(&ctx));
        assert!((!stale).evaluate(&ctx));

        // Without a running scheduler the observation fails, hence false
        let bare = EvalContext::new(now, &session, None);
        assert!(!recent.truth(&bare));
    }

    #[test]
    fn test_scheduler_cycles() {
        let session = Session::new();
        let now = Utc::now();
        let info = SchedulerInfo {
            name: "scheduler".to_string(),
            started_at: now,
            cycle_started_at: now,
            n_cycles: 4,
        };
        let ctx = EvalContext::new(now, &session, Some(&info));
        assert!(scheduler_cycles().ge(3).truth(&ctx));
        assert!(!scheduler_cycles().ge(5).truth(&ctx));
    }

    #[test]
    fn test_in_cycle_window() {
        let mut session = Session::new();
        session
            .add_task(Task::func("job", |_| Ok(())))
            .expect("task registers");
        let before_cycle = Utc::now() - Duration::seconds(30);
        session.record_at("job", Action::Run, None, before_cycle);

        let now = Utc::now();
        let info = SchedulerInfo {
            name: "scheduler".to_string(),
            started_at: before_cycle,
            cycle_started_at: now - Duration::seconds(1),
            n_cycles: 1,
        };
        let ctx = EvalContext::new(now, &session, Some(&info));

        assert!(!task_started("job").in_cycle().unwrap().truth(&ctx));
        session.record("job", Action::Run, None);
        let ctx = EvalContext::new(Utc::now(), &session, Some(&info));
        assert!(task_started("job").in_cycle().unwrap().eq(1).truth(&ctx));
    }

    #[test]
    fn test_time_within() {
        let session = Session::new();
        let ctx = EvalContext::new(Utc::now(), &session, None);
        // Whole minutes tile the timeline, so any instant is inside one
        assert!(time_within(Period::every_minute()).truth(&ctx));
        assert!(time_within(Period::Always).truth(&ctx));
    }
}
