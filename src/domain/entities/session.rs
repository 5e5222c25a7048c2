//! Session entity module
//!
//! The session owns the task registry, the global parameter mapping, and the
//! aggregated log. A scheduler borrows the session for the duration of a run;
//! everything the run produced stays queryable on the session afterwards.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

use crate::domain::entities::record::{Action, LogRecord};
use crate::domain::entities::task::{CancelToken, Task, TaskArgs};
use crate::domain::value_objects::Parameters;

/// Process-wide scheduling state: tasks, global parameters, aggregated log
///
/// The session is the single owner of every registered task and therefore of
/// every task history; the aggregated log is a time-ordered view over them.
#[derive(Debug, Default)]
pub struct Session {
    /// Registered tasks keyed by their unique names
    tasks: HashMap<String, Task>,
    /// Task names in registration order, for stable iteration
    order: Vec<String>,
    /// Global parameters, the lowest-precedence scope of task arguments
    pub parameters: Parameters,
    /// Timestamp of the most recent record, backing the monotonic log clock
    last_stamp: Option<DateTime<Utc>>,
}

impl Session {
    /// Creates an empty session
    ///
    /// # Returns
    ///
    /// A new Session with no tasks, no parameters, and an empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a task under its unique name
    ///
    /// # Arguments
    ///
    /// * `task` - The task to register
    ///
    /// # Returns
    ///
    /// `Ok` on registration
    ///
    /// # Errors
    ///
    /// Returns an error when a task with the same name is already registered.
    pub fn add_task(&mut self, task: Task) -> Result<()> {
        let name = task.name().to_string();
        if self.tasks.contains_key(&name) {
            return Err(anyhow!("task '{name}' is already registered"));
        }
        self.order.push(name.clone());
        self.tasks.insert(name, task);
        Ok(())
    }

    /// Looks up a task by name
    ///
    /// # Arguments
    ///
    /// * `name` - The task name
    ///
    /// # Returns
    ///
    /// The task, or `None` when no task with that name is registered
    pub fn get_task(&self, name: &str) -> Option<&Task> {
        self.tasks.get(name)
    }

    /// Looks up a task by name for mutation
    ///
    /// # Arguments
    ///
    /// * `name` - The task name
    ///
    /// # Returns
    ///
    /// The task, or `None` when no task with that name is registered
    pub fn get_task_mut(&mut self, name: &str) -> Option<&mut Task> {
        self.tasks.get_mut(name)
    }

    /// Returns the registered task names in insertion order
    ///
    /// # Returns
    ///
    /// The names as a slice
    pub fn task_names(&self) -> &[String] {
        &self.order
    }

    /// Returns one task's history
    ///
    /// # Arguments
    ///
    /// * `name` - The task name
    ///
    /// # Returns
    ///
    /// The ordered records, or `None` when no task with that name is
    /// registered
    pub fn get_history(&self, name: &str) -> Option<&[LogRecord]> {
        self.tasks.get(name).map(Task::get_history)
    }

    /// Builds the time-ordered merge of every task's history
    ///
    /// # Returns
    ///
    /// All records of all tasks, sorted by timestamp
    pub fn get_task_log(&self) -> Vec<LogRecord> {
        let mut records: Vec<LogRecord> = self
            .order
            .iter()
            .filter_map(|name| self.tasks.get(name))
            .flat_map(|task| task.get_history().iter().cloned())
            .collect();
        records.sort_by_key(|record| record.asctime);
        records
    }

    /// Runs a task synchronously on the calling thread
    ///
    /// Records `run` and the terminal action around the invocation; the
    /// terminal status stays visible because no scheduler cycle reverts it.
    ///
    /// # Arguments
    ///
    /// * `name` - Name of the task to run
    /// * `params` - Explicit call parameters, the highest-precedence scope
    ///
    /// # Returns
    ///
    /// `Ok` when the body succeeded; the body's error, after it has been
    /// recorded as a `fail`, otherwise
    pub fn run_task(&mut self, name: &str, params: Option<Parameters>) -> Result<()> {
        let (runner, resolved) = {
            let task = self
                .get_task(name)
                .ok_or_else(|| anyhow!("unknown task '{name}'"))?;
            let resolved = task.resolve_args(params.as_ref(), &self.parameters);
            (task.runner().clone(), resolved)
        };
        let started = self.record(name, Action::Run, None);
        let args = TaskArgs::new(resolved, name, started, CancelToken::new());
        match runner.invoke(&args) {
            Ok(()) => {
                self.record(name, Action::Success, None);
                Ok(())
            }
            Err(error) => {
                self.record(name, Action::Fail, Some(format!("{error:#}")));
                Err(error)
            }
        }
    }

    /// Clears the registry, the global parameters, and the aggregated log
    pub fn reset(&mut self) {
        self.tasks.clear();
        self.order.clear();
        self.parameters.clear();
        self.last_stamp = None;
    }

    /// Appends a record to the named task's history
    ///
    /// The log clock is strictly monotonic: when wall time does not advance
    /// between appends, the stamp is bumped by a microsecond, so same-cycle
    /// records keep their append order.
    ///
    /// # Arguments
    ///
    /// * `name` - Name of the task the record belongs to
    /// * `action` - The action that happened
    /// * `exc_text` - Failure text for `fail` records
    ///
    /// # Returns
    ///
    /// The timestamp the record was stamped with
    pub(crate) fn record(
        &mut self,
        name: &str,
        action: Action,
        exc_text: Option<String>,
    ) -> DateTime<Utc> {
        let stamp = self.next_stamp(Utc::now());
        self.append(name, action, exc_text, stamp);
        stamp
    }

    /// Appends a record with an explicit timestamp, still keeping the log
    /// clock monotonic
    ///
    /// # Arguments
    ///
    /// * `name` - Name of the task the record belongs to
    /// * `action` - The action that happened
    /// * `exc_text` - Failure text for `fail` records
    /// * `at` - The requested timestamp
    ///
    /// # Returns
    ///
    /// The timestamp the record was stamped with
    #[cfg(test)]
    pub(crate) fn record_at(
        &mut self,
        name: &str,
        action: Action,
        exc_text: Option<String>,
        at: DateTime<Utc>,
    ) -> DateTime<Utc> {
        let stamp = self.next_stamp(at);
        self.append(name, action, exc_text, stamp);
        stamp
    }

    fn append(&mut self, name: &str, action: Action, exc_text: Option<String>, stamp: DateTime<Utc>) {
        match self.tasks.get_mut(name) {
            Some(task) => task.apply_record(LogRecord {
                task_name: name.to_string(),
                action,
                asctime: stamp,
                exc_text,
            }),
            None => tracing::warn!(task = name, %action, "record for unknown task dropped"),
        }
    }

    fn next_stamp(&mut self, at: DateTime<Utc>) -> DateTime<Utc> {
        let stamp = match self.last_stamp {
            Some(last) if at <= last => last + Duration::microseconds(1),
            _ => at,
        };
        self.last_stamp = Some(stamp);
        stamp
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::record::count_action;
    use serde_json::json;

    #[test]
    fn test_duplicate_names_rejected() {
        let mut session = Session::new();
        session.add_task(Task::func("job", |_| Ok(()))).unwrap();
        assert!(session.add_task(Task::func("job", |_| Ok(()))).is_err());
    }

    #[test]
    fn test_run_task_records_success() {
        let mut session = Session::new();
        session.add_task(Task::func("job", |_| Ok(()))).unwrap();
        session.run_task("job", None).unwrap();

        let history = session.get_history("job").unwrap();
        assert_eq!(count_action(history, Action::Run), 1);
        assert_eq!(count_action(history, Action::Success), 1);
        assert_eq!(
            session.get_task("job").unwrap().status(),
            crate::domain::value_objects::Status::Success
        );
    }

    #[test]
    fn test_run_task_records_failure_with_text() {
        let mut session = Session::new();
        session
            .add_task(Task::func("job", |_| {
                Err(anyhow!("boom").context("task body failed"))
            }))
            .unwrap();
        assert!(session.run_task("job", None).is_err());

        let history = session.get_history("job").unwrap();
        assert_eq!(count_action(history, Action::Fail), 1);
        let text = history[1].exc_text.as_deref().unwrap();
        assert!(text.contains("task body failed"));
        assert!(text.contains("boom"));
    }

    #[test]
    fn test_run_task_resolves_globals() {
        let mut session = Session::new();
        session.parameters.insert("int_5", json!(5));
        session
            .add_task(Task::func("job", |args| {
                anyhow::ensure!(args.require("int_5")? == &json!(5), "wrong value");
                Ok(())
            }))
            .unwrap();
        session.run_task("job", None).unwrap();
    }

    #[test]
    fn test_task_log_merges_in_time_order() {
        let mut session = Session::new();
        session.add_task(Task::func("a", |_| Ok(()))).unwrap();
        session.add_task(Task::func("b", |_| Ok(()))).unwrap();

        session.record("a", Action::Run, None);
        session.record("b", Action::Run, None);
        session.record("a", Action::Success, None);

        let log = session.get_task_log();
        assert_eq!(log.len(), 3);
        assert_eq!(log[0].task_name, "a");
        assert_eq!(log[1].task_name, "b");
        assert_eq!(log[2].task_name, "a");
        assert!(log[0].asctime < log[1].asctime);
        assert!(log[1].asctime < log[2].asctime);
    }

    #[test]
    fn test_log_clock_is_strictly_monotonic() {
        let mut session = Session::new();
        session.add_task(Task::func("a", |_| Ok(()))).unwrap();

        let mut last = None;
        for _ in 0..50 {
            let stamp = session.record("a", Action::Run, None);
            if let Some(previous) = last {
                assert!(stamp > previous);
            }
            last = Some(stamp);
        }
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut session = Session::new();
        session.parameters.insert("key", json!(1));
        session.add_task(Task::func("job", |_| Ok(()))).unwrap();
        session.record("job", Action::Run, None);

        session.reset();
        assert!(session.task_names().is_empty());
        assert!(session.parameters.is_empty());
        assert!(session.get_task_log().is_empty());
    }
}
