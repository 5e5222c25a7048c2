//! Script runner module
//!
//! Command-backed task bodies: a user script or executable loaded from a
//! filesystem path. The runner hands the task's resolved parameters to the
//! child through environment variables, prepends configured search paths to
//! `PATH` so scripts find their helpers, and captures stderr so a failing
//! child's diagnostics (a traceback, say) survive into the `fail` record.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::env;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};

use crate::domain::entities::task::{CommandRunner, TaskArgs};

/// A task body executed from a script or program on disk
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScriptRunner {
    /// Filesystem path of the script or executable
    path: PathBuf,
    /// Entry point name passed as the first argument, when selected
    entry: Option<String>,
    /// Directories prepended to the child's `PATH`
    search_paths: Vec<PathBuf>,
    /// Fixed arguments appended after the entry point
    args: Vec<String>,
}

impl ScriptRunner {
    /// Creates a runner for the script at the given path
    ///
    /// # Arguments
    ///
    /// * `path` - Filesystem path of the script or executable
    ///
    /// # Returns
    ///
    /// A new ScriptRunner with no entry point, search paths, or arguments
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entry: None,
            search_paths: Vec::new(),
            args: Vec::new(),
        }
    }

    /// Selects a named entry point, passed to the script as its first
    /// argument
    ///
    /// # Arguments
    ///
    /// * `entry` - The entry point name
    ///
    /// # Returns
    ///
    /// The runner with the entry point applied
    pub fn with_entry(mut self, entry: impl Into<String>) -> Self {
        self.entry = Some(entry.into());
        self
    }

    /// Sets directories prepended to `PATH` for the child, so the script can
    /// resolve helpers relative to its own layout
    ///
    /// # Arguments
    ///
    /// * `paths` - The directories to prepend
    ///
    /// # Returns
    ///
    /// The runner with the search paths applied
    pub fn with_search_paths(mut self, paths: impl IntoIterator<Item = PathBuf>) -> Self {
        self.search_paths = paths.into_iter().collect();
        self
    }

    /// Sets extra fixed arguments appended after the entry point
    ///
    /// # Arguments
    ///
    /// * `args` - The arguments to append
    ///
    /// # Returns
    ///
    /// The runner with the arguments applied
    pub fn with_args<S: Into<String>>(mut self, args: impl IntoIterator<Item = S>) -> Self {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Returns the script's filesystem path
    ///
    /// # Returns
    ///
    /// The path as given at construction
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn command(&self, task_args: &TaskArgs) -> Command {
        let mut command = Command::new(&self.path);
        if let Some(entry) = &self.entry {
            command.arg(entry);
        }
        command.args(&self.args);
        for (name, value) in task_args.values() {
            command.env(name, render_value(value));
        }
        if !self.search_paths.is_empty() {
            let mut paths = self.search_paths.clone();
            if let Some(existing) = env::var_os("PATH") {
                paths.extend(env::split_paths(&existing));
            }
            if let Ok(joined) = env::join_paths(paths) {
                command.env("PATH", joined);
            }
        }
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        command
    }
}

impl CommandRunner for ScriptRunner {
    /// Runs the script to completion on the calling thread
    ///
    /// # Arguments
    ///
    /// * `args` - The execution's resolved arguments, exported to the child
    ///   as environment variables
    ///
    /// # Returns
    ///
    /// `Ok` on a zero exit; a non-zero exit becomes an error carrying the
    /// child's stderr
    fn run(&self, args: &TaskArgs) -> Result<()> {
        let output = self
            .command(args)
            .output()
            .with_context(|| format!("failed to run script {}", self.path.display()))?;
        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.trim().is_empty() {
            anyhow::bail!("script {} exited with {}", self.path.display(), output.status);
        }
        anyhow::bail!("{}", stderr.trim_end())
    }

    /// Starts the script as a child process for subprocess execution
    ///
    /// # Arguments
    ///
    /// * `args` - The execution's resolved arguments, exported to the child
    ///   as environment variables
    ///
    /// # Returns
    ///
    /// The spawned child with stdout and stderr piped
    fn spawn(&self, args: &TaskArgs) -> Result<Child> {
        self.command(args)
            .spawn()
            .with_context(|| format!("failed to spawn script {}", self.path.display()))
    }
}

/// Renders a parameter value for the child's environment
///
/// # Arguments
///
/// * `value` - The value to render
///
/// # Returns
///
/// Strings verbatim, everything else as JSON
fn render_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
