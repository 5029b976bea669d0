//! Validate command implementation
//!
//! Offline checks: nothing here touches the database.

use anyhow::Result;
use sl_engine::{discover, survey, HistorySnapshot, MigrateError, MigrationScript, MigratorSettings};
use sl_sql::{scan_statement, RiskKind, SqlDialect};

use crate::cli::{GlobalArgs, ValidateArgs};
use crate::commands::common::{load_project, ExitCode};

/// Validation result severity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Severity {
    Warning,
    Error,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Warning => write!(f, "WARNING"),
            Severity::Error => write!(f, "ERROR"),
        }
    }
}

/// A single validation issue
struct ValidationIssue {
    severity: Severity,
    code: String,
    message: String,
    file: Option<String>,
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.file {
            Some(file) => write!(
                f,
                "[{}] {}: {} ({})",
                self.severity, self.code, self.message, file
            ),
            None => write!(f, "[{}] {}: {}", self.severity, self.code, self.message),
        }
    }
}

/// Collect validation issues
struct ValidationContext {
    issues: Vec<ValidationIssue>,
    /// Exit status of the first engine error, if any
    exit_code: Option<i32>,
}

impl ValidationContext {
    fn new() -> Self {
        Self {
            issues: Vec::new(),
            exit_code: None,
        }
    }

    fn engine_error(&mut self, err: &MigrateError) {
        self.exit_code.get_or_insert(err.exit_code());
        let message = err.to_string();
        // The code is already part of the message
        let message = message
            .strip_prefix(&format!("[{}] ", err.code()))
            .unwrap_or(&message)
            .to_string();
        self.issues.push(ValidationIssue {
            severity: Severity::Error,
            code: err.code().to_string(),
            message,
            file: None,
        });
    }

    fn warning(&mut self, code: &str, message: impl Into<String>, file: Option<String>) {
        self.issues.push(ValidationIssue {
            severity: Severity::Warning,
            code: code.to_string(),
            message: message.into(),
            file,
        });
    }

    fn error_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Error)
            .count()
    }

    fn warning_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Warning)
            .count()
    }
}

/// Execute the validate command
pub async fn execute(args: &ValidateArgs, global: &GlobalArgs) -> Result<()> {
    let project = load_project(global)?;

    println!("Validating project: {}\n", project.config.name);

    let mut ctx = ValidationContext::new();
    let target = sl_core::Config::resolve_target(global.target.as_deref());
    let settings = match MigratorSettings::from_project(&project, target.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            ctx.engine_error(&e);
            return print_issues_and_summary(&ctx, args.strict);
        }
    };

    if let Some(scripts) = validate_files(&settings, &mut ctx) {
        validate_versions(&scripts, &settings, &mut ctx);
        validate_destructive_statements(&scripts, settings.dialect.as_ref(), &mut ctx);
    }

    print_issues_and_summary(&ctx, args.strict)
}

/// Discover, name-check, read and split every script
fn validate_files(
    settings: &MigratorSettings,
    ctx: &mut ValidationContext,
) -> Option<Vec<MigrationScript>> {
    print!("Checking migration files... ");
    match discover(
        &settings.migration_paths,
        settings.dialect.as_ref(),
        &settings.exclude,
    ) {
        Ok(scripts) => {
            let statements: usize = scripts.iter().map(|s| s.statements.len()).sum();
            println!(
                "\u{2713} ({} scripts, {} statements)",
                scripts.len(),
                statements
            );
            Some(scripts)
        }
        Err(e) => {
            println!("\u{2717}");
            ctx.engine_error(&e);
            None
        }
    }
}

/// Duplicate versions and, with `require_contiguous`, gaps
fn validate_versions(
    scripts: &[MigrationScript],
    settings: &MigratorSettings,
    ctx: &mut ValidationContext,
) {
    print!("Checking versions... ");
    let survey = survey(scripts, &HistorySnapshot::default(), &settings.plan);
    if survey.issues.is_empty() {
        println!("\u{2713}");
    } else {
        println!("{} issue(s)", survey.issues.len());
        for issue in &survey.issues {
            ctx.engine_error(issue);
        }
    }
}

fn validate_destructive_statements(
    scripts: &[MigrationScript],
    dialect: &dyn SqlDialect,
    ctx: &mut ValidationContext,
) {
    print!("Checking for destructive statements... ");
    let mut found = 0;

    for script in scripts {
        for statement in &script.statements {
            for finding in scan_statement(statement, dialect) {
                let code = match finding.kind {
                    RiskKind::DropObject => "W001",
                    RiskKind::Truncate => "W002",
                    RiskKind::DropColumn => "W003",
                };
                ctx.warning(
                    code,
                    format!(
                        "{} {} in statement {} (line {})",
                        finding.kind, finding.target, finding.statement_index, finding.line
                    ),
                    Some(script.path.display().to_string()),
                );
                found += 1;
            }
        }
    }

    if found == 0 {
        println!("\u{2713}");
    } else {
        println!("{} warning(s)", found);
    }
}

fn print_issues_and_summary(ctx: &ValidationContext, strict: bool) -> Result<()> {
    println!();
    for issue in &ctx.issues {
        println!("{}", issue);
    }

    let error_count = ctx.error_count();
    let warning_count = ctx.warning_count();

    println!();
    if error_count == 0 && (warning_count == 0 || !strict) {
        println!(
            "Validation passed: {} errors, {} warnings",
            error_count, warning_count
        );
        Ok(())
    } else if error_count == 0 {
        println!(
            "Validation failed (strict mode): {} errors, {} warnings",
            error_count, warning_count
        );
        Err(ExitCode(1).into())
    } else {
        println!(
            "Validation failed: {} errors, {} warnings",
            error_count, warning_count
        );
        Err(ExitCode(ctx.exit_code.unwrap_or(1)).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sl_core::Version;
    use std::path::PathBuf;

    #[test]
    fn test_engine_error_strips_code_prefix_and_keeps_exit_code() {
        let mut ctx = ValidationContext::new();
        ctx.engine_error(&MigrateError::DuplicateVersion {
            version: Version::new(3),
            first: PathBuf::from("a/V003__x.sql"),
            second: PathBuf::from("b/V3__y.sql"),
        });

        assert_eq!(ctx.error_count(), 1);
        assert_eq!(ctx.exit_code, Some(4));
        let line = ctx.issues[0].to_string();
        assert!(line.starts_with("[ERROR] G003: Duplicate migration version 3"));
    }

    #[test]
    fn test_strict_mode_fails_on_warnings_only() {
        let mut ctx = ValidationContext::new();
        ctx.warning("W002", "truncate staging.events", None);

        assert!(print_issues_and_summary(&ctx, false).is_ok());
        let err = print_issues_and_summary(&ctx, true).unwrap_err();
        assert_eq!(err.downcast_ref::<ExitCode>().map(|c| c.0), Some(1));
    }
}
