//! Scheduler module
//!
//! The cyclic state machine that drives a session's tasks. Each cycle the
//! scheduler reverts terminal statuses, launches eligible tasks in priority
//! order, drains worker outcomes from the log queue, enforces timeouts and
//! end conditions, runs maintainer tasks, and checks the shut condition.
//! Everything the loop decides is written into the session's history.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::application::workers::{
    spawn_process_worker, spawn_thread_worker, Outcome, RunningWorker, WorkerMessage,
};
use crate::domain::conditions::{Condition, EvalContext, SchedulerInfo};
use crate::domain::entities::record::Action;
use crate::domain::entities::task::{CancelToken, SchedulerControl, Task, TaskArgs};
use crate::domain::entities::Session;
use crate::domain::value_objects::Execution;

/// Final wait for workers that were told to stop during shutdown
const SHUTDOWN_KILL_WAIT: Duration = Duration::from_secs(1);

/// Errors from scheduler construction and the run loop
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Subprocess execution was configured for an in-process body
    #[error("task '{task}' cannot run as a subprocess: only command-backed tasks can")]
    UnsupportedExecution {
        /// Name of the offending task
        task: String,
    },
    /// The log queue disconnected while the scheduler was still running
    #[error("worker channel closed unexpectedly")]
    ChannelClosed,
    /// The operating system refused to start a worker thread
    #[error("failed to spawn worker for task '{task}'")]
    WorkerSpawn {
        /// Name of the task whose worker could not be spawned
        task: String,
        /// The underlying spawn failure
        #[source]
        source: std::io::Error,
    },
    /// Any other failure, typically a duplicate task registration
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Tuning knobs for a scheduler run
#[derive(Debug)]
pub struct SchedulerOptions {
    /// The scheduler's name, used in logs and exposed to conditions
    pub name: String,
    /// The run ends when this condition becomes true
    pub shut_condition: Condition,
    /// Scheduler-wide timeout; a task's own timeout overrides it
    pub timeout: Option<Duration>,
    /// End-of-cycle sleep; also the bound on each queue drain
    pub cycle_sleep: Duration,
    /// How long shutdown waits for in-flight work to finish naturally
    pub shutdown_grace: Duration,
    /// Tasks evaluated after the user tasks each cycle, with the scheduler
    /// control surface attached; never run as subprocesses
    pub maintainer_tasks: Vec<Task>,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            name: "scheduler".to_string(),
            shut_condition: Condition::AlwaysFalse,
            timeout: None,
            cycle_sleep: Duration::from_millis(100),
            shutdown_grace: Duration::from_secs(2),
            maintainer_tasks: Vec::new(),
        }
    }
}

/// The cyclic task scheduler
#[derive(Debug)]
pub struct Scheduler {
    /// The session owning every task and history for this run
    session: Session,
    /// Names of the user tasks, in registration order
    user_tasks: Vec<String>,
    /// Names of the maintainer tasks, evaluated after the user tasks
    maintainers: Vec<String>,
    /// The scheduler's current name; maintainers may change it
    name: String,
    /// The run ends when this condition becomes true
    shut_condition: Condition,
    /// Scheduler-wide timeout applied to tasks without their own
    timeout: Option<Duration>,
    /// End-of-cycle sleep, doubling as the queue drain bound
    cycle_sleep: Duration,
    /// How long shutdown waits for in-flight work to finish naturally
    shutdown_grace: Duration,
    /// Completed cycles so far
    n_cycles: u64,
    /// When the current run began; unset before `run` is called
    started_at: Option<DateTime<Utc>>,
    /// Set when a maintainer asked for an orderly shutdown
    shutdown_requested: bool,
    /// Executions currently in flight, keyed by task name
    running: HashMap<String, RunningWorker>,
    /// Identifier given to the next launch, for stale-outcome filtering
    next_run_id: u64,
    /// Producer end of the log queue, cloned into every worker
    tx: Sender<WorkerMessage>,
    /// Consumer end of the log queue, drained on the scheduler thread
    rx: Receiver<WorkerMessage>,
}

impl Scheduler {
    /// Builds a scheduler over a fresh session
    ///
    /// # Arguments
    ///
    /// * `tasks` - The user tasks to drive
    /// * `options` - Tuning knobs for the run
    ///
    /// # Returns
    ///
    /// A new Scheduler, or an error when a task is invalid
    pub fn new(tasks: Vec<Task>, options: SchedulerOptions) -> Result<Self, SchedulerError> {
        Self::with_session(Session::new(), tasks, options)
    }

    /// Builds a scheduler over an existing session, registering the given
    /// tasks into it
    ///
    /// # Arguments
    ///
    /// * `session` - The session to own; existing parameters and tasks are
    ///   kept
    /// * `tasks` - The user tasks to register and drive
    /// * `options` - Tuning knobs for the run
    ///
    /// # Returns
    ///
    /// A new Scheduler owning the session
    ///
    /// # Errors
    ///
    /// Rejects duplicate task names and subprocess execution on tasks whose
    /// body is not command-backed.
    pub fn with_session(
        mut session: Session,
        tasks: Vec<Task>,
        options: SchedulerOptions,
    ) -> Result<Self, SchedulerError> {
        let mut user_tasks = Vec::new();
        for task in tasks {
            validate(&task)?;
            user_tasks.push(task.name().to_string());
            session.add_task(task)?;
        }
        let mut maintainers = Vec::new();
        for task in options.maintainer_tasks {
            validate(&task)?;
            maintainers.push(task.name().to_string());
            session.add_task(task)?;
        }
        let (tx, rx) = mpsc::channel();
        Ok(Self {
            session,
            user_tasks,
            maintainers,
            name: options.name,
            shut_condition: options.shut_condition,
            timeout: options.timeout,
            cycle_sleep: options.cycle_sleep,
            shutdown_grace: options.shutdown_grace,
            n_cycles: 0,
            started_at: None,
            shutdown_requested: false,
            running: HashMap::new(),
            next_run_id: 0,
            tx,
            rx,
        })
    }

    /// Returns the scheduler's current name
    ///
    /// # Returns
    ///
    /// The name, reflecting any rename a maintainer performed
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of completed cycles
    ///
    /// # Returns
    ///
    /// The cycle count; after shutdown, the total for the whole run
    pub fn n_cycles(&self) -> u64 {
        self.n_cycles
    }

    /// Returns the session the scheduler drives
    ///
    /// # Returns
    ///
    /// A shared reference to the session
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Returns the session the scheduler drives, for mutation
    ///
    /// # Returns
    ///
    /// A mutable reference to the session
    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    /// Consumes the scheduler, handing its session back to the caller
    ///
    /// # Returns
    ///
    /// The session with every history the run produced
    pub fn into_session(self) -> Session {
        self.session
    }

    /// Runs cycles until the shut condition fires, then shuts down
    ///
    /// On return every `run` record has its terminal counterpart: workers
    /// that finished inside the grace window got their natural outcome,
    /// stragglers a `terminate` record.
    ///
    /// # Returns
    ///
    /// `Ok` after an orderly shutdown; a `SchedulerError` when the run was
    /// cut short by an internal failure (best-effort terminations are still
    /// performed first)
    pub fn run(&mut self) -> Result<(), SchedulerError> {
        self.started_at = Some(Utc::now());
        info!(scheduler = %self.name, "scheduler starting");
        let result = self.run_cycles();
        self.shutdown();
        match &result {
            Ok(()) => info!(scheduler = %self.name, cycles = self.n_cycles, "scheduler stopped"),
            Err(error) => warn!(scheduler = %self.name, %error, "scheduler stopped on error"),
        }
        result
    }

    fn run_cycles(&mut self) -> Result<(), SchedulerError> {
        loop {
            let cycle_started = Utc::now();

            // Terminal statuses revert to idle at the cycle boundary
            let names: Vec<String> = self.session.task_names().to_vec();
            for name in &names {
                if let Some(task) = self.session.get_task_mut(name) {
                    task.settle();
                }
            }

            // Launch eligible user tasks, highest priority (lowest number)
            // first; the sort is stable so ties keep registration order
            let mut order: Vec<(i32, String)> = self
                .user_tasks
                .iter()
                .filter_map(|name| {
                    self.session
                        .get_task(name)
                        .map(|task| (task.priority(), name.clone()))
                })
                .collect();
            order.sort_by_key(|(priority, _)| *priority);
            for (_, name) in &order {
                self.process_task(name, cycle_started)?;
            }

            self.drain_queue(Duration::ZERO)?;
            self.check_terminations(cycle_started);

            let maintainers = self.maintainers.clone();
            for name in &maintainers {
                self.process_task(name, cycle_started)?;
            }

            self.n_cycles += 1;
            let shut = {
                let info = self.scheduler_info(cycle_started);
                let ctx = EvalContext::new(Utc::now(), &self.session, Some(&info));
                self.shut_condition.evaluate(&ctx)
            };
            if shut || self.shutdown_requested {
                debug!(scheduler = %self.name, cycles = self.n_cycles, "shut condition met");
                return Ok(());
            }

            self.drain_queue(self.cycle_sleep)?;
        }
    }

    /// Evaluates one task's eligibility and launches it when due
    ///
    /// Eligibility follows the forcing rules: a forced stop always blocks, a
    /// forced run always starts, and only the unset state consults the
    /// task's start condition. A task with an execution in flight is never
    /// relaunched.
    ///
    /// # Arguments
    ///
    /// * `name` - Name of the task to consider
    /// * `cycle_started` - Start instant of the cycle under evaluation
    fn process_task(
        &mut self,
        name: &str,
        cycle_started: DateTime<Utc>,
    ) -> Result<(), SchedulerError> {
        let eligible = {
            let Some(task) = self.session.get_task(name) else {
                return Ok(());
            };
            if task.status().is_running() || self.running.contains_key(name) {
                false
            } else if task.force_state().is_forced_stop() {
                false
            } else if task.force_state().is_forced_run() {
                true
            } else {
                let info = self.scheduler_info(cycle_started);
                let ctx = EvalContext::new(Utc::now(), &self.session, Some(&info));
                task.start_cond.evaluate(&ctx)
            }
        };
        if eligible {
            self.launch(name)?;
        }
        Ok(())
    }

    /// Records the `run` and hands the body to its execution mode
    ///
    /// The run record lands before launch returns so same-cycle condition
    /// counters already see it. Maintainer bodies always execute inline with
    /// the control surface attached, whatever execution mode they carry.
    ///
    /// # Arguments
    ///
    /// * `name` - Name of the task to launch
    fn launch(&mut self, name: &str) -> Result<(), SchedulerError> {
        let (runner, execution, resolved) = {
            let Some(task) = self.session.get_task(name) else {
                return Ok(());
            };
            let execution = if task.runner().is_maintainer() {
                Execution::Main
            } else {
                task.execution()
            };
            (
                task.runner().clone(),
                execution,
                task.resolve_args(None, &self.session.parameters),
            )
        };
        let run_id = self.next_run_id;
        self.next_run_id += 1;
        let cancel = CancelToken::new();
        let started = self.session.record(name, Action::Run, None);
        debug!(task = name, %execution, "task started");
        let args = TaskArgs::new(resolved, name, started, cancel.clone());

        match execution {
            Execution::Main => {
                let outcome = if runner.is_maintainer() {
                    let mut control = SchedulerControl {
                        name: self.name.clone(),
                        shutdown: false,
                    };
                    let result = runner.invoke_maintainer(&args, &mut control);
                    self.name = control.name;
                    if control.shutdown {
                        self.shutdown_requested = true;
                    }
                    result
                } else {
                    runner.invoke(&args)
                };
                match outcome {
                    Ok(()) => {
                        self.session.record(name, Action::Success, None);
                    }
                    Err(error) => {
                        self.session
                            .record(name, Action::Fail, Some(format!("{error:#}")));
                    }
                }
            }
            Execution::Thread => {
                let handle =
                    spawn_thread_worker(name.to_string(), run_id, runner, args, self.tx.clone())
                        .map_err(|source| self.spawn_failed(name, source))?;
                self.running.insert(
                    name.to_string(),
                    RunningWorker {
                        run_id,
                        started: Instant::now(),
                        cancel,
                        handle,
                    },
                );
            }
            Execution::Process => {
                let script = runner
                    .as_script()
                    .cloned()
                    .ok_or_else(|| SchedulerError::UnsupportedExecution {
                        task: name.to_string(),
                    })?;
                let handle =
                    spawn_process_worker(name.to_string(), run_id, script, args, self.tx.clone())
                        .map_err(|source| self.spawn_failed(name, source))?;
                self.running.insert(
                    name.to_string(),
                    RunningWorker {
                        run_id,
                        started: Instant::now(),
                        cancel,
                        handle,
                    },
                );
            }
        }
        Ok(())
    }

    /// A failed worker spawn is fatal; the open run record is closed with a
    /// best-effort terminate before the error propagates
    ///
    /// # Arguments
    ///
    /// * `name` - Name of the task whose worker failed to spawn
    /// * `source` - The underlying spawn failure
    ///
    /// # Returns
    ///
    /// The scheduler error to propagate
    fn spawn_failed(&mut self, name: &str, source: std::io::Error) -> SchedulerError {
        self.session.record(name, Action::Terminate, None);
        SchedulerError::WorkerSpawn {
            task: name.to_string(),
            source,
        }
    }

    /// Applies queued worker outcomes for up to `wait`
    ///
    /// This is the loop's only suspension point: a zero wait drains whatever
    /// is already queued, a non-zero wait doubles as the end-of-cycle sleep.
    ///
    /// # Arguments
    ///
    /// * `wait` - Upper bound on how long to block for further messages
    fn drain_queue(&mut self, wait: Duration) -> Result<(), SchedulerError> {
        let deadline = Instant::now() + wait;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let message = if remaining.is_zero() {
                match self.rx.try_recv() {
                    Ok(message) => message,
                    Err(TryRecvError::Empty) => return Ok(()),
                    Err(TryRecvError::Disconnected) => return Err(SchedulerError::ChannelClosed),
                }
            } else {
                match self.rx.recv_timeout(remaining) {
                    Ok(message) => message,
                    Err(RecvTimeoutError::Timeout) => return Ok(()),
                    Err(RecvTimeoutError::Disconnected) => {
                        return Err(SchedulerError::ChannelClosed)
                    }
                }
            };
            self.apply_message(message);
        }
    }

    /// Turns one worker message into the matching history record
    ///
    /// Messages whose run id no longer matches the live execution are
    /// dropped; they belong to runs the scheduler already terminated.
    ///
    /// # Arguments
    ///
    /// * `message` - The worker outcome to apply
    fn apply_message(&mut self, message: WorkerMessage) {
        let current = self
            .running
            .get(&message.task_name)
            .is_some_and(|worker| worker.run_id == message.run_id);
        if !current {
            // Late outcome of an execution already terminated
            debug!(task = %message.task_name, "stale worker outcome dropped");
            return;
        }
        if let Some(worker) = self.running.remove(&message.task_name) {
            // The worker has reported, so it is done; reclaim its thread
            let _ = worker.handle.join();
        }
        match message.outcome {
            Outcome::Success => {
                self.session.record(&message.task_name, Action::Success, None);
            }
            Outcome::Fail(text) => {
                self.session
                    .record(&message.task_name, Action::Fail, Some(text));
            }
            Outcome::Cancelled => {
                self.session
                    .record(&message.task_name, Action::Terminate, None);
            }
        }
    }

    /// Terminates workers whose effective timeout expired or whose end
    /// condition came true
    ///
    /// The task-level timeout overrides the scheduler-wide one. Termination
    /// trips the worker's cancel token and records `terminate` immediately;
    /// any late outcome from the worker is dropped as stale.
    ///
    /// # Arguments
    ///
    /// * `cycle_started` - Start instant of the cycle under evaluation
    fn check_terminations(&mut self, cycle_started: DateTime<Utc>) {
        let now = Instant::now();
        let expired: Vec<String> = {
            let info = self.scheduler_info(cycle_started);
            let ctx = EvalContext::new(Utc::now(), &self.session, Some(&info));
            self.running
                .iter()
                .filter_map(|(name, worker)| {
                    let task = self.session.get_task(name)?;
                    let limit = task.timeout().or(self.timeout);
                    let timed_out =
                        limit.is_some_and(|limit| now.duration_since(worker.started) > limit);
                    let ended = task.end_cond.evaluate(&ctx);
                    (timed_out || ended).then(|| name.clone())
                })
                .collect()
        };
        for name in expired {
            if let Some(worker) = self.running.remove(&name) {
                warn!(task = %name, "terminating worker");
                worker.cancel.cancel();
                self.session.record(&name, Action::Terminate, None);
            }
        }
    }

    /// Stops launching, lets in-flight work finish inside the grace window,
    /// then cancels and closes any stragglers with terminate records
    fn shutdown(&mut self) {
        let deadline = Instant::now() + self.shutdown_grace;
        while !self.running.is_empty() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match self.rx.recv_timeout(remaining) {
                Ok(message) => self.apply_message(message),
                Err(_) => break,
            }
        }

        if !self.running.is_empty() {
            for worker in self.running.values() {
                worker.cancel.cancel();
            }
            let deadline = Instant::now() + SHUTDOWN_KILL_WAIT;
            while !self.running.is_empty() {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    break;
                }
                match self.rx.recv_timeout(remaining) {
                    Ok(message) => self.apply_message(message),
                    Err(_) => break,
                }
            }
        }

        let stragglers: Vec<String> = self.running.keys().cloned().collect();
        for name in stragglers {
            warn!(task = %name, "worker abandoned at shutdown");
            self.running.remove(&name);
            self.session.record(&name, Action::Terminate, None);
        }
    }

    /// Snapshots the scheduler state conditions may observe
    ///
    /// # Arguments
    ///
    /// * `cycle_started` - Start instant of the cycle under evaluation
    ///
    /// # Returns
    ///
    /// A new SchedulerInfo for one evaluation
    fn scheduler_info(&self, cycle_started: DateTime<Utc>) -> SchedulerInfo {
        SchedulerInfo {
            name: self.name.clone(),
            started_at: self.started_at.unwrap_or(cycle_started),
            cycle_started_at: cycle_started,
            n_cycles: self.n_cycles,
        }
    }
}

/// Checks a task's configuration before registration
///
/// # Arguments
///
/// * `task` - The task to check
///
/// # Returns
///
/// `Ok` when the task can be scheduled, `UnsupportedExecution` when
/// subprocess execution is configured for an in-process body
fn validate(task: &Task) -> Result<(), SchedulerError> {
    if task.execution() == Execution::Process && task.runner().as_script().is_none() {
        return Err(SchedulerError::UnsupportedExecution {
            task: task.name().to_string(),
        });
    }
    Ok(())
}
