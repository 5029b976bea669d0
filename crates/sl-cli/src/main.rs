//! Sluice CLI - versioned SQL migrations

use clap::Parser;

mod cli;
mod commands;

use cli::Cli;
use commands::common::ExitCode;
use commands::{migrate, repair, status, validate};

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    init_logging(cli.global.verbose);

    let result = match &cli.command {
        cli::Commands::Migrate(args) => migrate::execute(args, &cli.global).await,
        cli::Commands::Status(args) => status::execute(args, &cli.global).await,
        cli::Commands::Repair(args) => repair::execute(args, &cli.global).await,
        cli::Commands::Validate(args) => validate::execute(args, &cli.global).await,
    };

    match result {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(err) => match err.downcast_ref::<ExitCode>() {
            Some(ExitCode(code)) => std::process::ExitCode::from(exit_status(*code)),
            None => {
                eprintln!("Error: {:#}", err);
                std::process::ExitCode::FAILURE
            }
        },
    }
}

/// Log to stderr; `RUST_LOG` wins over `--verbose`
fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_target(false)
        .format_timestamp(None)
        .init();
}

fn exit_status(code: i32) -> u8 {
    u8::try_from(code).unwrap_or(1)
}
