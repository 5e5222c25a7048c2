//! Task entity module
//!
//! A task pairs a runnable body with the conditions, priority, and execution
//! mode that govern when and where the scheduler runs it. The entity also
//! carries the per-task history and the force-state override.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::domain::conditions::Condition;
use crate::domain::entities::record::{Action, LogRecord};
use crate::domain::value_objects::{Execution, ForceState, Parameters, Status};

/// Cooperative cancellation flag shared between the scheduler and a worker
///
/// Long-running task bodies should poll `is_cancelled` and return early; the
/// scheduler trips the flag on timeout, end condition, and shutdown.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    /// Shared flag; clones observe the same cancellation
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Creates a new, untripped token
    ///
    /// # Returns
    ///
    /// A new CancelToken whose flag is not set
    pub fn new() -> Self {
        Self::default()
    }

    /// Trips the flag, asking every holder of a clone to stop
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Checks whether cancellation has been requested
    ///
    /// # Returns
    ///
    /// `true` if `cancel` has been called on this token or any clone of it
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Mutable scheduler surface handed to maintainer task bodies
///
/// Changes are copied back into the scheduler after the body returns.
#[derive(Debug, Clone)]
pub struct SchedulerControl {
    /// The scheduler's name; maintainers may rename it
    pub name: String,
    /// Set to request an orderly shutdown at the end of the current cycle
    pub shutdown: bool,
}

/// The resolved inputs handed to a task body
///
/// `values` holds the parameter scope already merged (call parameters over
/// task locals over session globals) and filtered to the names the body
/// declares.
#[derive(Debug, Clone)]
pub struct TaskArgs {
    /// The merged, filtered parameter bindings
    values: Parameters,
    /// Name of the task the body belongs to
    task_name: String,
    /// When the execution's `run` record was stamped
    started: DateTime<Utc>,
    /// Cancellation flag for this execution
    cancel: CancelToken,
}

impl TaskArgs {
    /// Creates the argument bundle for one execution
    ///
    /// # Arguments
    ///
    /// * `values` - The merged and filtered parameter bindings
    /// * `task_name` - Name of the task being executed
    /// * `started` - Timestamp of the execution's `run` record
    /// * `cancel` - The execution's cancellation token
    ///
    /// # Returns
    ///
    /// A new TaskArgs instance
    pub(crate) fn new(
        values: Parameters,
        task_name: impl Into<String>,
        started: DateTime<Utc>,
        cancel: CancelToken,
    ) -> Self {
        Self {
            values,
            task_name: task_name.into(),
            started,
            cancel,
        }
    }

    /// Looks up an optional parameter
    ///
    /// # Arguments
    ///
    /// * `name` - The parameter name
    ///
    /// # Returns
    ///
    /// The bound value, or `None` when the parameter is absent
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Looks up a parameter the body cannot run without
    ///
    /// The returned error turns the run into a `fail` record when it
    /// propagates out of the body.
    ///
    /// # Arguments
    ///
    /// * `name` - The parameter name
    ///
    /// # Returns
    ///
    /// The bound value, or an error naming the missing parameter
    pub fn require(&self, name: &str) -> anyhow::Result<&Value> {
        self.values
            .get(name)
            .ok_or_else(|| anyhow::anyhow!("required parameter '{name}' was not provided"))
    }

    /// Iterates over every resolved parameter binding
    ///
    /// # Returns
    ///
    /// An iterator of name and value pairs
    pub fn values(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    /// Returns the name of the task being executed
    ///
    /// # Returns
    ///
    /// The task name as a string slice
    pub fn task_name(&self) -> &str {
        &self.task_name
    }

    /// Returns when this execution started
    ///
    /// # Returns
    ///
    /// The timestamp of the execution's `run` record
    pub fn started(&self) -> DateTime<Utc> {
        self.started
    }

    /// Checks whether the scheduler has asked this execution to stop
    ///
    /// # Returns
    ///
    /// `true` if the execution's cancel token has been tripped
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Seam for command-backed task bodies (user scripts, external programs)
///
/// `run` executes to completion on the calling thread; `spawn` starts the
/// body as a child process for subprocess execution.
pub trait CommandRunner: Send + Sync {
    /// Runs the command to completion on the calling thread
    ///
    /// # Arguments
    ///
    /// * `args` - The execution's resolved arguments
    ///
    /// # Returns
    ///
    /// `Ok` on a successful exit, an error carrying the failure text
    /// otherwise
    fn run(&self, args: &TaskArgs) -> anyhow::Result<()>;

    /// Starts the command as a child process
    ///
    /// # Arguments
    ///
    /// * `args` - The execution's resolved arguments
    ///
    /// # Returns
    ///
    /// The spawned child, or an error when it could not be started
    fn spawn(&self, args: &TaskArgs) -> anyhow::Result<std::process::Child>;
}

type TaskFn = dyn Fn(&TaskArgs) -> anyhow::Result<()> + Send + Sync;
type MaintainerFn = dyn Fn(&TaskArgs, &mut SchedulerControl) -> anyhow::Result<()> + Send + Sync;

/// A task body
#[derive(Clone)]
pub enum Runner {
    /// In-process function
    Func(Arc<TaskFn>),
    /// In-process function that may mutate the scheduler; always runs on the
    /// scheduler thread
    Maintainer(Arc<MaintainerFn>),
    /// Command-backed body; the only kind that can execute as a subprocess
    Script(Arc<dyn CommandRunner>),
}

impl Runner {
    /// Runs the body to completion on the calling thread
    ///
    /// # Arguments
    ///
    /// * `args` - The execution's resolved arguments
    ///
    /// # Returns
    ///
    /// The body's outcome; maintainer bodies are an error here because they
    /// need the scheduler control surface
    pub fn invoke(&self, args: &TaskArgs) -> anyhow::Result<()> {
        match self {
            Runner::Func(body) => body(args),
            Runner::Script(script) => script.run(args),
            Runner::Maintainer(_) => {
                anyhow::bail!("maintainer body invoked without scheduler control")
            }
        }
    }

    /// Runs the body with the scheduler control surface attached
    ///
    /// # Arguments
    ///
    /// * `args` - The execution's resolved arguments
    /// * `control` - The mutable scheduler surface
    ///
    /// # Returns
    ///
    /// The body's outcome; non-maintainer bodies run as if plainly invoked
    pub fn invoke_maintainer(
        &self,
        args: &TaskArgs,
        control: &mut SchedulerControl,
    ) -> anyhow::Result<()> {
        match self {
            Runner::Maintainer(body) => body(args, control),
            other => other.invoke(args),
        }
    }

    /// Checks whether this body is a maintainer
    ///
    /// # Returns
    ///
    /// `true` if the body needs the scheduler control surface
    pub fn is_maintainer(&self) -> bool {
        matches!(self, Runner::Maintainer(_))
    }

    /// Returns the command-backed body, if this is one
    ///
    /// # Returns
    ///
    /// The script runner, or `None` for in-process bodies
    pub fn as_script(&self) -> Option<&Arc<dyn CommandRunner>> {
        match self {
            Runner::Script(script) => Some(script),
            _ => None,
        }
    }
}

impl fmt::Debug for Runner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            Runner::Func(_) => "Func",
            Runner::Maintainer(_) => "Maintainer",
            Runner::Script(_) => "Script",
        };
        write!(f, "Runner::{kind}")
    }
}

/// A schedulable unit of work
///
/// A Task is the fundamental unit the scheduler drives: its start and end
/// conditions decide when it is due and when a running execution should be
/// cut short, its execution mode decides where the body runs, and its
/// history records everything that happened to it.
#[derive(Debug, Clone)]
pub struct Task {
    /// Unique task name; the key in the session registry
    name: String,
    /// The body executed on each run
    runner: Runner,
    /// Condition deciding when the task is eligible to start
    pub(crate) start_cond: Condition,
    /// Condition that terminates a running execution when it becomes true
    pub(crate) end_cond: Condition,
    /// Isolation level the body runs under
    pub(crate) execution: Execution,
    /// Launch order within a cycle; lower numbers launch earlier
    pub(crate) priority: i32,
    /// Task-local parameters, overriding session globals
    pub(crate) parameters: Parameters,
    /// Per-task timeout, overriding the scheduler-wide one
    pub(crate) timeout: Option<Duration>,
    /// Parameter names the body accepts; `None` accepts everything
    param_names: Option<Vec<String>>,
    /// Tri-valued override of the start condition
    force_state: ForceState,
    /// Current lifecycle state
    status: Status,
    /// Ordered record of everything that happened to this task
    history: Vec<LogRecord>,
}

impl Task {
    fn new(name: impl Into<String>, runner: Runner) -> Self {
        Self {
            name: name.into(),
            runner,
            start_cond: Condition::AlwaysTrue,
            end_cond: Condition::AlwaysFalse,
            execution: Execution::default(),
            priority: 0,
            parameters: Parameters::new(),
            timeout: None,
            param_names: None,
            force_state: ForceState::default(),
            status: Status::default(),
            history: Vec::new(),
        }
    }

    /// Creates a task around an in-process function
    ///
    /// # Arguments
    ///
    /// * `name` - Unique task name
    /// * `body` - The function executed on each run
    ///
    /// # Returns
    ///
    /// A new Task with default conditions, priority, and execution mode
    pub fn func(
        name: impl Into<String>,
        body: impl Fn(&TaskArgs) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> Self {
        Self::new(name, Runner::Func(Arc::new(body)))
    }

    /// Creates a maintainer task
    ///
    /// Its body receives the scheduler control surface and always executes
    /// on the scheduler thread.
    ///
    /// # Arguments
    ///
    /// * `name` - Unique task name
    /// * `body` - The function executed on each run
    ///
    /// # Returns
    ///
    /// A new maintainer Task
    pub fn maintainer(
        name: impl Into<String>,
        body: impl Fn(&TaskArgs, &mut SchedulerControl) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> Self {
        Self::new(name, Runner::Maintainer(Arc::new(body)))
    }

    /// Creates a task around a command-backed body
    ///
    /// # Arguments
    ///
    /// * `name` - Unique task name
    /// * `runner` - The command-backed body
    ///
    /// # Returns
    ///
    /// A new Task; the only kind that may use subprocess execution
    pub fn script(name: impl Into<String>, runner: impl CommandRunner + 'static) -> Self {
        Self::new(name, Runner::Script(Arc::new(runner)))
    }

    /// Sets the start condition
    ///
    /// # Arguments
    ///
    /// * `cond` - Condition deciding when the task is eligible to start
    ///
    /// # Returns
    ///
    /// The task with the condition applied
    pub fn with_start_cond(mut self, cond: impl Into<Condition>) -> Self {
        self.start_cond = cond.into();
        self
    }

    /// Sets the end condition
    ///
    /// # Arguments
    ///
    /// * `cond` - Condition that terminates a running execution when true
    ///
    /// # Returns
    ///
    /// The task with the condition applied
    pub fn with_end_cond(mut self, cond: impl Into<Condition>) -> Self {
        self.end_cond = cond.into();
        self
    }

    /// Sets the execution mode
    ///
    /// # Arguments
    ///
    /// * `execution` - The isolation level the body runs under
    ///
    /// # Returns
    ///
    /// The task with the mode applied
    pub fn with_execution(mut self, execution: Execution) -> Self {
        self.execution = execution;
        self
    }

    /// Sets the priority; lower numbers launch earlier within a cycle
    ///
    /// # Arguments
    ///
    /// * `priority` - The launch-order rank
    ///
    /// # Returns
    ///
    /// The task with the priority applied
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the task-local parameters
    ///
    /// # Arguments
    ///
    /// * `parameters` - Bindings that override session globals for this task
    ///
    /// # Returns
    ///
    /// The task with the parameters applied
    pub fn with_parameters(mut self, parameters: Parameters) -> Self {
        self.parameters = parameters;
        self
    }

    /// Sets the per-task timeout, overriding the scheduler-wide one
    ///
    /// # Arguments
    ///
    /// * `timeout` - Longest a single execution may run
    ///
    /// # Returns
    ///
    /// The task with the timeout applied
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Declares the parameter names the body accepts
    ///
    /// Anything else is filtered out of its arguments. Without a declaration
    /// the body receives the whole merged scope.
    ///
    /// # Arguments
    ///
    /// * `names` - The accepted parameter names
    ///
    /// # Returns
    ///
    /// The task with the declaration applied
    pub fn with_param_names<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.param_names = Some(names.into_iter().map(Into::into).collect());
        self
    }

    /// Returns the task's unique name
    ///
    /// # Returns
    ///
    /// The name as a string slice
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the task's body
    ///
    /// # Returns
    ///
    /// A reference to the runner
    pub fn runner(&self) -> &Runner {
        &self.runner
    }

    /// Returns the execution mode
    ///
    /// # Returns
    ///
    /// The isolation level the body runs under
    pub fn execution(&self) -> Execution {
        self.execution
    }

    /// Returns the priority
    ///
    /// # Returns
    ///
    /// The launch-order rank; lower numbers launch earlier
    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// Returns the current lifecycle state
    ///
    /// # Returns
    ///
    /// The task's status
    pub fn status(&self) -> Status {
        self.status
    }

    /// Returns the start-condition override
    ///
    /// # Returns
    ///
    /// The task's force state
    pub fn force_state(&self) -> ForceState {
        self.force_state
    }

    /// Returns the per-task timeout
    ///
    /// # Returns
    ///
    /// The timeout, or `None` when the scheduler-wide timeout applies
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Returns the ordered sequence of this task's log records
    ///
    /// # Returns
    ///
    /// The history, oldest record first
    pub fn get_history(&self) -> &[LogRecord] {
        &self.history
    }

    /// Requests one forced run, overriding the start condition
    ///
    /// The override is consumed when the forced run leaves the `run` state.
    pub fn force_run(&mut self) {
        self.force_state = ForceState::ForceRun;
    }

    /// Suppresses all runs until the override is cleared
    ///
    /// Unlike a forced run, a forced stop is never consumed automatically.
    pub fn force_stop(&mut self) {
        self.force_state = ForceState::ForceStop;
    }

    /// Clears the force-state override
    pub fn clear_force(&mut self) {
        self.force_state = ForceState::Unset;
    }

    /// Merges the three parameter scopes and filters to the declared names
    ///
    /// # Arguments
    ///
    /// * `call_params` - Explicit call parameters, the highest-precedence
    ///   scope
    /// * `globals` - The session's global parameters, the lowest-precedence
    ///   scope
    ///
    /// # Returns
    ///
    /// The resolved bindings handed to the body
    pub(crate) fn resolve_args(
        &self,
        call_params: Option<&Parameters>,
        globals: &Parameters,
    ) -> Parameters {
        let mut resolved = self.parameters.merged_over(globals);
        if let Some(call) = call_params {
            resolved = call.merged_over(&resolved);
        }
        resolved.retain_names(self.param_names.as_deref());
        resolved
    }

    /// Appends a record and advances the state machine
    ///
    /// A forced run is consumed on the transition out of `run`; a forced
    /// stop never is.
    ///
    /// # Arguments
    ///
    /// * `record` - The record to append
    pub(crate) fn apply_record(&mut self, record: LogRecord) {
        self.status = match record.action {
            Action::Run => Status::Run,
            Action::Success => Status::Success,
            Action::Fail => Status::Fail,
            Action::Terminate => Status::Terminate,
        };
        if record.action.is_terminal() && self.force_state.is_forced_run() {
            self.force_state = ForceState::Unset;
        }
        self.history.push(record);
    }

    /// Reverts a terminal status to idle; called at cycle boundaries
    pub(crate) fn settle(&mut self) {
        if self.status.is_terminal() {
            self.status = Status::Idle;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let task = Task::func("job", |_| Ok(()));
        assert_eq!(task.name(), "job");
        assert_eq!(task.status(), Status::Idle);
        assert_eq!(task.force_state(), ForceState::Unset);
        assert_eq!(task.execution(), Execution::Main);
        assert_eq!(task.priority(), 0);
        assert!(task.get_history().is_empty());
    }

    #[test]
    fn test_resolve_args_precedence_and_filtering() {
        let mut locals = Parameters::new();
        locals.insert("int_5", json!(5));
        locals.insert("only_local", json!("l"));

        let mut globals = Parameters::new();
        globals.insert("int_5", json!(0));
        globals.insert("extra_param", json!("something"));

        let task = Task::func("job", |_| Ok(()))
            .with_parameters(locals)
            .with_param_names(["int_5", "only_local", "from_call"]);

        let mut call = Parameters::new();
        call.insert("from_call", json!(true));
        call.insert("unknown", json!("dropped"));

        let resolved = task.resolve_args(Some(&call), &globals);
        assert_eq!(resolved.get("int_5"), Some(&json!(5)));
        assert_eq!(resolved.get("only_local"), Some(&json!("l")));
        assert_eq!(resolved.get("from_call"), Some(&json!(true)));
        assert!(resolved.get("extra_param").is_none());
        assert!(resolved.get("unknown").is_none());
    }

    #[test]
    fn test_open_signature_receives_everything() {
        let mut globals = Parameters::new();
        globals.insert("anything", json!(1));

        let task = Task::func("job", |_| Ok(()));
        let resolved = task.resolve_args(None, &globals);
        assert_eq!(resolved.get("anything"), Some(&json!(1)));
    }

    #[test]
    fn test_forced_run_consumed_on_terminal_transition() {
        let mut task = Task::func("job", |_| Ok(()));
        task.force_run();

        let record = |action| LogRecord {
            task_name: "job".to_string(),
            action,
            asctime: Utc::now(),
            exc_text: None,
        };

        task.apply_record(record(Action::Run));
        assert_eq!(task.force_state(), ForceState::ForceRun);
        task.apply_record(record(Action::Success));
        assert_eq!(task.force_state(), ForceState::Unset);
        assert_eq!(task.status(), Status::Success);
    }

    #[test]
    fn test_forced_stop_persists() {
        let mut task = Task::func("job", |_| Ok(()));
        task.force_stop();
        task.settle();
        assert_eq!(task.force_state(), ForceState::ForceStop);
        task.clear_force();
        assert_eq!(task.force_state(), ForceState::Unset);
    }

    #[test]
    fn test_settle_reverts_terminal_only() {
        let mut task = Task::func("job", |_| Ok(()));
        let record = |action| LogRecord {
            task_name: "job".to_string(),
            action,
            asctime: Utc::now(),
            exc_text: None,
        };

        task.apply_record(record(Action::Run));
        task.settle();
        assert_eq!(task.status(), Status::Run);

        task.apply_record(record(Action::Terminate));
        task.settle();
        assert_eq!(task.status(), Status::Idle);
    }

    #[test]
    fn test_require_reports_missing_parameter() {
        let args = TaskArgs::new(
            Parameters::new(),
            "job",
            Utc::now(),
            CancelToken::new(),
        );
        let error = args.require("int_5").unwrap_err();
        assert!(error.to_string().contains("int_5"));
    }
}
