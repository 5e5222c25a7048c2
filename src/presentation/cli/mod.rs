pub mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "taskweaver")]
#[command(author = "TaskWeaver Team")]
#[command(version = "0.1.0")]
#[command(about = "Condition-driven task scheduler", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(about = "Run a schedule file until its shut condition fires")]
    Run {
        #[arg(short, long, value_name = "FILE", help = "Schedule file (JSON)")]
        config: PathBuf,

        #[arg(short, long, value_name = "FILE", help = "Write the aggregated history as CSV")]
        log_output: Option<PathBuf>,
    },

    #[command(about = "Validate a schedule file and preview upcoming cron occurrences")]
    Check {
        #[arg(short, long, value_name = "FILE", help = "Schedule file (JSON)")]
        config: PathBuf,

        #[arg(short, long, value_name = "WHEN", help = "Preview occurrences from this RFC3339 instant instead of now")]
        at: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_arguments_parse() {
        let cli = Cli::try_parse_from([
            "taskweaver",
            "run",
            "--config",
            "schedule.json",
            "--log-output",
            "log.csv",
        ])
        .unwrap();
        assert!(!cli.verbose);
        match cli.command {
            Commands::Run { config, log_output } => {
                assert_eq!(config, PathBuf::from("schedule.json"));
                assert_eq!(log_output, Some(PathBuf::from("log.csv")));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_check_arguments_parse() {
        let cli = Cli::try_parse_from([
            "taskweaver",
            "-v",
            "check",
            "--config",
            "schedule.json",
        ])
        .unwrap();
        assert!(cli.verbose);
        assert!(matches!(cli.command, Commands::Check { .. }));
    }
}
