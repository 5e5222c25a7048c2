use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use taskweaver::presentation::cli::commands::{CheckCommand, RunCommand};
use taskweaver::presentation::cli::{Cli, Commands};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("taskweaver=debug,info")
    } else {
        EnvFilter::new("taskweaver=info")
    };

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Run { config, log_output } => {
            RunCommand::execute(&config, log_output.as_deref())?
        }
        Commands::Check { config, at } => CheckCommand::execute(&config, at.as_deref())?,
    }

    Ok(())
}
