//! Command-line arguments.

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "bucketlog-server",
    version,
    about = "Load bucket access and storage logs into BigQuery"
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Serve the HTTP trigger (default)
    Serve,
    /// Run one ingest pass and exit
    Run {
        /// Print the run report as JSON on stdout
        #[arg(long)]
        json: bool,
    },
}

impl CliArgs {
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Serve)
    }
}
