//! CLI argument definitions using clap derive API

use clap::{ArgGroup, Args, Parser, Subcommand, ValueEnum};
use sl_core::Version;

/// Sluice - versioned SQL migrations for DuckDB and Snowflake
#[derive(Parser, Debug)]
#[command(name = "sluice")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Global options
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Global arguments available to all commands
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to project directory
    #[arg(short = 'p', long, global = true, default_value = ".")]
    pub project_dir: String,

    /// Override config file path
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Override target (database connection)
    #[arg(short, long, global = true)]
    pub target: Option<String>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Apply pending migrations
    Migrate(MigrateArgs),

    /// Show the state of every known version
    Status(StatusArgs),

    /// Fix the history after a drifted, failed or interrupted migration
    Repair(RepairArgs),

    /// Check migration files without connecting to the database
    Validate(ValidateArgs),
}

/// Arguments for the migrate command
#[derive(Args, Debug)]
pub struct MigrateArgs {
    /// Apply pending versions up to and including this one
    #[arg(long)]
    pub target_version: Option<Version>,

    /// Print the plan without executing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub output: OutputFormat,
}

/// Arguments for the status command
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub output: OutputFormat,
}

/// Arguments for the repair command
#[derive(Args, Debug)]
#[command(group(
    ArgGroup::new("action")
        .required(true)
        .args(["realign", "reset", "release_lock"])
))]
pub struct RepairArgs {
    /// Record the current file of this version as applied
    #[arg(long, value_name = "VERSION")]
    pub realign: Option<Version>,

    /// Return this failed or interrupted version to pending
    #[arg(long, value_name = "VERSION")]
    pub reset: Option<Version>,

    /// Remove a run lock left behind by a crashed runner
    #[arg(long)]
    pub release_lock: bool,

    /// Show what would be recorded without writing it
    #[arg(long)]
    pub dry_run: bool,
}

/// Arguments for the validate command
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Treat destructive-statement warnings as errors
    #[arg(long)]
    pub strict: bool,
}

/// Output formats for migrate and status
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable text
    Text,
    /// JSON on stdout
    Json,
}

#[cfg(test)]
#[path = "cli_test.rs"]
mod tests;
