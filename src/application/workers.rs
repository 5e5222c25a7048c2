//! Worker plumbing module
//!
//! Task executions that leave the scheduler thread report back through one
//! mpsc log queue: worker threads run the body in-process, subprocess
//! monitors spawn a child and poll it. The scheduler thread is the only
//! writer of history; workers only ever send messages.

use chrono::{DateTime, Utc};
use std::io::Read;
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::debug;

use crate::domain::entities::task::{CancelToken, CommandRunner, Runner, TaskArgs};

/// Interval at which a subprocess monitor polls its child
const CHILD_POLL: Duration = Duration::from_millis(10);

/// How a worker's execution ended
#[derive(Debug)]
pub enum Outcome {
    /// The body returned without error
    Success,
    /// The body failed; the text becomes the `fail` record's `exc_text`
    Fail(String),
    /// The worker noticed its cancel token; the scheduler decides whether a
    /// terminate record is still owed
    Cancelled,
}

/// One entry on the log queue
#[derive(Debug)]
pub struct WorkerMessage {
    /// Name of the task the execution belonged to
    pub task_name: String,
    /// Identifier of the launch, for stale-outcome filtering
    pub run_id: u64,
    /// How the execution ended
    pub outcome: Outcome,
    /// When the worker finished
    pub finished: DateTime<Utc>,
}

/// Scheduler-side bookkeeping for an execution in flight
#[derive(Debug)]
pub struct RunningWorker {
    /// Identifier of the launch this worker carries out
    pub run_id: u64,
    /// When the worker was launched, for timeout accounting
    pub started: Instant,
    /// Cancellation flag shared with the worker
    pub cancel: CancelToken,
    /// The worker or monitor thread, reclaimed when its outcome arrives
    pub handle: JoinHandle<()>,
}

/// Runs the body on a worker thread; the outcome travels over the queue
///
/// # Arguments
///
/// * `task_name` - Name of the task being executed
/// * `run_id` - Identifier of this launch
/// * `runner` - The body to run
/// * `args` - The execution's resolved arguments
/// * `tx` - Producer end of the log queue
///
/// # Returns
///
/// The worker thread's handle, or the spawn failure
pub(crate) fn spawn_thread_worker(
    task_name: String,
    run_id: u64,
    runner: Runner,
    args: TaskArgs,
    tx: Sender<WorkerMessage>,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(format!("worker-{task_name}"))
        .spawn(move || {
            let result = runner.invoke(&args);
            let outcome = if args.is_cancelled() {
                Outcome::Cancelled
            } else {
                match result {
                    Ok(()) => Outcome::Success,
                    Err(error) => Outcome::Fail(format!("{error:#}")),
                }
            };
            let _ = tx.send(WorkerMessage {
                task_name,
                run_id,
                outcome,
                finished: Utc::now(),
            });
        })
}

/// Spawns the command-backed body as a child process and monitors it
///
/// The monitor polls `try_wait` at a small interval, kills the child when
/// the cancel token trips, and ships the child's stderr as the failure text
/// on a non-zero exit.
///
/// # Arguments
///
/// * `task_name` - Name of the task being executed
/// * `run_id` - Identifier of this launch
/// * `script` - The command-backed body to spawn
/// * `args` - The execution's resolved arguments
/// * `tx` - Producer end of the log queue
///
/// # Returns
///
/// The monitor thread's handle, or the spawn failure
pub(crate) fn spawn_process_worker(
    task_name: String,
    run_id: u64,
    script: Arc<dyn CommandRunner>,
    args: TaskArgs,
    tx: Sender<WorkerMessage>,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(format!("monitor-{task_name}"))
        .spawn(move || {
            let mut child = match script.spawn(&args) {
                Ok(child) => child,
                Err(error) => {
                    let _ = tx.send(WorkerMessage {
                        task_name,
                        run_id,
                        outcome: Outcome::Fail(format!("{error:#}")),
                        finished: Utc::now(),
                    });
                    return;
                }
            };
            loop {
                if args.is_cancelled() {
                    debug!(task = %task_name, "killing worker subprocess");
                    let _ = child.kill();
                    let _ = child.wait();
                    let _ = tx.send(WorkerMessage {
                        task_name,
                        run_id,
                        outcome: Outcome::Cancelled,
                        finished: Utc::now(),
                    });
                    return;
                }
                match child.try_wait() {
                    Ok(Some(status)) => {
                        let outcome = if status.success() {
                            Outcome::Success
                        } else {
                            let stderr = drain_stderr(&mut child);
                            let text = if stderr.trim().is_empty() {
                                format!("process exited with {status}")
                            } else {
                                stderr
                            };
                            Outcome::Fail(text)
                        };
                        let _ = tx.send(WorkerMessage {
                            task_name,
                            run_id,
                            outcome,
                            finished: Utc::now(),
                        });
                        return;
                    }
                    Ok(None) => thread::sleep(CHILD_POLL),
                    Err(error) => {
                        let _ = tx.send(WorkerMessage {
                            task_name,
                            run_id,
                            outcome: Outcome::Fail(format!("{error:#}")),
                            finished: Utc::now(),
                        });
                        return;
                    }
                }
            }
        })
}

fn drain_stderr(child: &mut std::process::Child) -> String {
    let mut text = String::new();
    if let Some(stderr) = child.stderr.as_mut() {
        let _ = stderr.read_to_string(&mut text);
    }
    text
}
