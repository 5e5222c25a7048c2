//! Schedule file module
//!
//! Loads a JSON schedule document into a session, tasks, and scheduler
//! options. The file format covers script-backed tasks with cron start
//! conditions, per-task execution modes, priorities, timeouts, and the
//! global parameter mapping.

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::application::scheduler::SchedulerOptions;
use crate::domain::conditions::{scheduler_cycles, task_started, time_within, Condition};
use crate::domain::entities::{Session, Task};
use crate::domain::time::Crontab;
use crate::domain::value_objects::{Execution, Parameters};
use crate::infrastructure::scripts::ScriptRunner;

/// Top-level shape of a schedule file
#[derive(Debug, Deserialize)]
pub struct ScheduleFile {
    #[serde(default)]
    pub name: Option<String>,
    /// Session-wide global parameters
    #[serde(default)]
    pub parameters: HashMap<String, Value>,
    #[serde(default)]
    pub cycle_sleep_ms: Option<u64>,
    /// Scheduler-wide timeout applied to tasks without their own
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// When set, the scheduler shuts down after this many cycles
    #[serde(default)]
    pub shut_after_cycles: Option<u64>,
    #[serde(default)]
    pub tasks: Vec<TaskSpec>,
}

/// One task entry in a schedule file
#[derive(Debug, Deserialize)]
pub struct TaskSpec {
    pub name: String,
    /// Path of the script or executable to run
    pub script: PathBuf,
    #[serde(default)]
    pub entry: Option<String>,
    #[serde(default)]
    pub search_paths: Vec<PathBuf>,
    #[serde(default)]
    pub args: Vec<String>,
    /// Five-field cron expression gating the task's starts
    #[serde(default)]
    pub cron: Option<String>,
    #[serde(default)]
    pub execution: Execution,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub parameters: HashMap<String, Value>,
}

/// Reads and parses a schedule file
///
/// # Arguments
///
/// * `path` - Path of the JSON schedule document
///
/// # Returns
///
/// The parsed schedule, or an error naming the file and the parse failure
pub fn load<P: AsRef<Path>>(path: P) -> Result<ScheduleFile> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read schedule file {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("failed to parse schedule file {}", path.display()))
}

impl ScheduleFile {
    /// Builds the session, tasks, and options the schedule describes
    ///
    /// # Returns
    ///
    /// The session carrying the global parameters, the tasks ready to
    /// register, and the scheduler options; or an error when a task entry
    /// is invalid
    pub fn into_setup(self) -> Result<(Session, Vec<Task>, SchedulerOptions)> {
        let mut session = Session::new();
        for (name, value) in self.parameters {
            session.parameters.insert(name, value);
        }

        let mut tasks = Vec::with_capacity(self.tasks.len());
        for spec in self.tasks {
            tasks.push(spec.into_task()?);
        }

        let mut options = SchedulerOptions::default();
        if let Some(name) = self.name {
            options.name = name;
        }
        if let Some(ms) = self.cycle_sleep_ms {
            options.cycle_sleep = Duration::from_millis(ms);
        }
        options.timeout = self.timeout_secs.map(Duration::from_secs);
        if let Some(cycles) = self.shut_after_cycles {
            options.shut_condition = scheduler_cycles().ge(cycles as f64).into();
        }

        Ok((session, tasks, options))
    }
}

impl TaskSpec {
    /// Builds the task this entry describes
    ///
    /// # Returns
    ///
    /// The task, or an error when the cron expression is invalid
    fn into_task(self) -> Result<Task> {
        let mut runner = ScriptRunner::new(self.script);
        if let Some(entry) = self.entry {
            runner = runner.with_entry(entry);
        }
        runner = runner
            .with_search_paths(self.search_paths)
            .with_args(self.args);

        let mut task = Task::script(self.name.clone(), runner)
            .with_execution(self.execution)
            .with_priority(self.priority);
        if let Some(secs) = self.timeout_secs {
            task = task.with_timeout(Duration::from_secs(secs));
        }
        if !self.parameters.is_empty() {
            task = task.with_parameters(Parameters::from(self.parameters));
        }
        if let Some(cron) = &self.cron {
            task = task.with_start_cond(cron_start_cond(&self.name, cron)?);
        }
        Ok(task)
    }
}

/// Builds a cron-gated start condition
///
/// The condition holds while the instant lies inside an occurrence and the
/// task has not yet started within that occurrence, so each occurrence fires
/// exactly once.
///
/// # Arguments
///
/// * `task_name` - Name of the task the condition gates
/// * `cron` - The five-field cron expression
///
/// # Returns
///
/// The start condition, or an error naming the task and the bad expression
fn cron_start_cond(task_name: &str, cron: &str) -> Result<Condition> {
    let tab: Crontab = cron
        .parse()
        .with_context(|| format!("task '{task_name}': invalid cron expression {cron:?}"))?;
    let period = tab.subperiod().clone();
    let started_in_occurrence = task_started(task_name).with_period(period.clone())?;
    Ok(time_within(period) & started_in_occurrence.eq(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> ScheduleFile {
        serde_json::from_str(text).unwrap()
    }

    #[test]
    fn test_minimal_schedule() {
        let schedule = parse(r#"{ "tasks": [ { "name": "job", "script": "job.sh" } ] }"#);
        let (session, tasks, options) = schedule.into_setup().unwrap();
        assert!(session.parameters.is_empty());
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].name(), "job");
        assert_eq!(tasks[0].execution(), Execution::Main);
        assert!(matches!(options.shut_condition, Condition::AlwaysFalse));
    }

    #[test]
    fn test_full_schedule() {
        let schedule = parse(
            r#"{
                "name": "nightly",
                "parameters": { "env": "prod" },
                "cycle_sleep_ms": 250,
                "timeout_secs": 60,
                "shut_after_cycles": 10,
                "tasks": [
                    {
                        "name": "report",
                        "script": "bin/report.sh",
                        "entry": "main",
                        "cron": "30 2 * * *",
                        "execution": "process",
                        "priority": 5,
                        "timeout_secs": 30,
                        "parameters": { "int_5": 5 }
                    }
                ]
            }"#,
        );
        let (session, tasks, options) = schedule.into_setup().unwrap();
        assert_eq!(session.parameters.get("env"), Some(&serde_json::json!("prod")));
        assert_eq!(options.name, "nightly");
        assert_eq!(options.cycle_sleep, Duration::from_millis(250));
        assert_eq!(options.timeout, Some(Duration::from_secs(60)));
        assert!(!matches!(options.shut_condition, Condition::AlwaysFalse));

        let task = &tasks[0];
        assert_eq!(task.execution(), Execution::Process);
        assert_eq!(task.priority(), 5);
        assert_eq!(task.timeout(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_invalid_cron_is_rejected_with_task_name() {
        let schedule = parse(
            r#"{ "tasks": [ { "name": "job", "script": "job.sh", "cron": "61 * * * *" } ] }"#,
        );
        let error = schedule.into_setup().unwrap_err();
        assert!(format!("{error:#}").contains("job"));
    }

    #[test]
    fn test_unknown_execution_is_rejected() {
        let result: std::result::Result<ScheduleFile, _> = serde_json::from_str(
            r#"{ "tasks": [ { "name": "job", "script": "job.sh", "execution": "fiber" } ] }"#,
        );
        assert!(result.is_err());
    }
}
