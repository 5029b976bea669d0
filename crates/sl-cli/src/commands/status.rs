//! Status command implementation

use anyhow::Result;
use serde::Serialize;
use sl_core::Version;
use sl_engine::{StatusReport, SurveyRow, VersionStatus};

use crate::cli::{GlobalArgs, OutputFormat, StatusArgs};
use crate::commands::common::{self, build_migrator, ExitCode};

#[derive(Serialize)]
struct StatusIssue {
    code: &'static str,
    message: String,
}

#[derive(Serialize)]
struct StatusOutput<'a> {
    target: &'a str,
    backend: &'a str,
    dialect: &'a str,
    history_table: &'a str,
    transactional: bool,
    current_version: Option<Version>,
    pending: usize,
    versions: &'a [SurveyRow],
    issues: Vec<StatusIssue>,
}

/// Execute the status command
///
/// Exits with the code of the first problem `migrate` would hit.
pub async fn execute(args: &StatusArgs, global: &GlobalArgs) -> Result<()> {
    let (_project, migrator, target) = build_migrator(global).await?;
    let report = migrator.status().await.map_err(|e| common::fail(&e))?;

    match args.output {
        OutputFormat::Json => {
            let output = StatusOutput {
                target: &target,
                backend: report.backend,
                dialect: report.dialect,
                history_table: &report.history_table,
                transactional: report.transactional,
                current_version: report.survey.current_version(),
                pending: report.survey.count(VersionStatus::Pending),
                versions: &report.survey.rows,
                issues: report
                    .survey
                    .issues
                    .iter()
                    .map(|e| StatusIssue {
                        code: e.code(),
                        message: e.to_string(),
                    })
                    .collect(),
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Text => print_text(&report, &target),
    }

    match report.survey.issues.first() {
        Some(first) => Err(ExitCode(first.exit_code()).into()),
        None => Ok(()),
    }
}

fn print_text(report: &StatusReport, target: &str) {
    let survey = &report.survey;
    println!("Target: {} ({}, {} dialect)", target, report.backend, report.dialect);
    println!("History table: {}", report.history_table);
    println!(
        "Current version: {}",
        survey
            .current_version()
            .map(|v| v.to_string())
            .unwrap_or_else(|| "none".to_string())
    );
    println!();

    if survey.rows.is_empty() {
        println!("No migrations found.");
    } else {
        let rows: Vec<Vec<String>> = survey
            .rows
            .iter()
            .map(|row| {
                vec![
                    row.version.to_string(),
                    row.description.clone(),
                    row.status.to_string(),
                    row.installed_rank
                        .map(|r| r.to_string())
                        .unwrap_or_else(|| "-".to_string()),
                    row.applied_at
                        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                        .unwrap_or_else(|| "-".to_string()),
                ]
            })
            .collect();
        common::print_table(
            &["VERSION", "DESCRIPTION", "STATUS", "RANK", "APPLIED AT"],
            &rows,
        );
    }

    println!();
    println!(
        "{} applied, {} pending",
        survey.count(VersionStatus::Applied),
        survey.count(VersionStatus::Pending)
    );

    if !survey.issues.is_empty() {
        println!("\nIssues:");
        for issue in &survey.issues {
            println!("  {}", issue);
        }
    }
}
