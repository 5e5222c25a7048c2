//! CLI commands module
//!
//! Command implementations behind the CLI: running a schedule file to
//! completion and validating one without running it.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

use crate::application::scheduler::Scheduler;
use crate::domain::entities::record::Action;
use crate::domain::time::Crontab;
use crate::infrastructure::config;
use crate::infrastructure::output::CsvLogWriter;

/// Runs a schedule file until its shut condition fires
pub struct RunCommand;

impl RunCommand {
    /// Loads the schedule, runs the scheduler to shutdown, and prints a
    /// summary
    ///
    /// # Arguments
    ///
    /// * `config_path` - Path of the schedule file
    /// * `log_output` - Optional destination for the history CSV
    ///
    /// # Returns
    ///
    /// `Ok` after an orderly shutdown and, when requested, a written log
    pub fn execute(config_path: &Path, log_output: Option<&Path>) -> Result<()> {
        let schedule = config::load(config_path)?;
        let (session, tasks, options) = schedule.into_setup()?;

        info!(schedule = %config_path.display(), tasks = tasks.len(), "running schedule");
        let mut scheduler = Scheduler::with_session(session, tasks, options)?;
        scheduler.run()?;

        Self::print_summary(&scheduler);

        if let Some(path) = log_output {
            let log = scheduler.session().get_task_log();
            CsvLogWriter::new()
                .write(&log, path)
                .with_context(|| format!("failed to write log to {}", path.display()))?;
            info!(log = %path.display(), records = log.len(), "history exported");
        }
        Ok(())
    }

    /// Prints the run summary to the console
    ///
    /// Shows the completed cycle count and per-task action counts in
    /// registration order.
    ///
    /// # Arguments
    ///
    /// * `scheduler` - The scheduler whose run is summarised
    fn print_summary(scheduler: &Scheduler) {
        println!("\n{}", "=".repeat(60));
        println!("SCHEDULE SUMMARY: {}", scheduler.name());
        println!("{}", "=".repeat(60));
        println!("  Completed cycles: {}", scheduler.n_cycles());

        // Per-task action counts in registration order
        for name in scheduler.session().task_names() {
            let Some(history) = scheduler.session().get_history(name) else {
                continue;
            };
            let mut counts: BTreeMap<String, usize> = BTreeMap::new();
            for record in history {
                *counts.entry(record.action.to_string()).or_default() += 1;
            }
            let runs = counts.get(&Action::Run.to_string()).copied().unwrap_or(0);
            let summary: Vec<String> = counts
                .iter()
                .map(|(action, count)| format!("{action}: {count}"))
                .collect();
            println!("  {name:<30} runs: {runs:<4} ({})", summary.join(", "));
        }
        println!("{}", "=".repeat(60));
    }
}

/// Validates a schedule file and previews upcoming cron occurrences
pub struct CheckCommand;

impl CheckCommand {
    /// Validates a schedule file without running it
    ///
    /// Parses every cron expression, prints each cron task's next
    /// occurrence, and builds the scheduler once to exercise the remaining
    /// validations.
    ///
    /// # Arguments
    ///
    /// * `config_path` - Path of the schedule file
    /// * `at` - Optional RFC3339 instant to preview occurrences from
    ///
    /// # Returns
    ///
    /// `Ok` when the schedule is valid
    pub fn execute(config_path: &Path, at: Option<&str>) -> Result<()> {
        let schedule = config::load(config_path)?;

        let from = match at {
            Some(text) => DateTime::parse_from_rfc3339(text)
                .with_context(|| format!("invalid RFC3339 instant {text:?}"))?
                .with_timezone(&Utc),
            None => Utc::now(),
        };

        println!("Schedule: {}", config_path.display());
        for spec in &schedule.tasks {
            match &spec.cron {
                Some(cron) => {
                    let tab: Crontab = cron
                        .parse()
                        .with_context(|| format!("task '{}': invalid cron {cron:?}", spec.name))?;
                    match tab.rollforward(from.naive_utc()) {
                        Some(window) => println!(
                            "  {:<30} {cron:<24} next: {}",
                            spec.name,
                            window.left()
                        ),
                        None => println!(
                            "  {:<30} {cron:<24} never occurs after {from}",
                            spec.name
                        ),
                    }
                }
                None => println!("  {:<30} starts every cycle", spec.name),
            }
        }

        // Building the scheduler runs the remaining validations (duplicate
        // names, execution modes) without starting it
        let (session, tasks, options) = schedule.into_setup()?;
        Scheduler::with_session(session, tasks, options)?;
        println!("Schedule OK");
        Ok(())
    }
}
