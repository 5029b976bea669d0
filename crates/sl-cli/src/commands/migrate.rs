//! Migrate command implementation

use anyhow::Result;
use sl_engine::{MigrateOptions, RunReport, ScriptReport, ScriptStatus, StatementStatus};

use crate::cli::{GlobalArgs, MigrateArgs, OutputFormat};
use crate::commands::common::{self, build_migrator};

/// Execute the migrate command
pub async fn execute(args: &MigrateArgs, global: &GlobalArgs) -> Result<()> {
    let (project, migrator, target) = build_migrator(global).await?;

    let token = migrator.cancellation_token();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupt received, stopping after the current migration");
            token.cancel();
        }
    });

    let options = MigrateOptions {
        dry_run: args.dry_run,
        target_version: args.target_version,
    };
    let mut report = RunReport::new(&target, args.dry_run);
    let result = migrator.migrate(&options, &mut report).await;
    interrupt.abort();

    let results_path = project.target_dir().join("migrate_results.json");
    if let Err(e) = common::write_json_results(&results_path, &report) {
        eprintln!("Warning: {:#}", e);
    }

    match args.output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => print_text(&report),
    }

    match result {
        Ok(_) => Ok(()),
        Err(e) => Err(common::fail(&e)),
    }
}

fn print_text(report: &RunReport) {
    if report.dry_run {
        if report.scripts.is_empty() {
            println!("Dry run: nothing to apply.");
            return;
        }
        println!("Dry run: {} migration(s) would be applied\n", report.planned);
        for script in &report.scripts {
            println!("  - V{} {} ({})", script.version, script.description, script.script);
        }
        return;
    }

    if report.scripts.is_empty() && report.error.is_none() {
        println!("Schema is up to date.");
        return;
    }

    for script in &report.scripts {
        print_script(script);
    }

    println!();
    println!(
        "Applied: {}  Failed: {}  Skipped: {}  ({:.2}s)",
        report.applied, report.failed, report.skipped, report.elapsed_secs
    );
}

fn print_script(script: &ScriptReport) {
    match script.status {
        ScriptStatus::Applied => println!(
            "  \u{2713} V{} {} ({}ms)",
            script.version, script.description, script.duration_ms
        ),
        ScriptStatus::Failed => {
            println!(
                "  \u{2717} V{} {} ({}ms)",
                script.version, script.description, script.duration_ms
            );
            let failed = script
                .statements
                .iter()
                .find(|s| s.status == StatementStatus::Failed);
            if let Some(stmt) = failed {
                println!(
                    "      statement {} (line {}): {}",
                    stmt.index,
                    stmt.line,
                    stmt.error.as_deref().unwrap_or("unknown error")
                );
            }
        }
        ScriptStatus::Skipped => {
            println!("  - V{} {} (skipped)", script.version, script.description)
        }
        ScriptStatus::Planned => println!("  - V{} {}", script.version, script.description),
    }
}
