//! Destructive-statement lint.
//!
//! Flags statements that drop objects, truncate tables or drop columns. The
//! statement is parsed with sqlparser in the configured dialect; when that
//! fails (procedural bodies, dialect extensions) the text is scanned with
//! regular expressions instead. Findings are warnings; the engine never
//! refuses to run a statement because of them.

use crate::dialect::SqlDialect;
use crate::splitter::SqlStatement;
use regex::Regex;
use serde::Serialize;
use sqlparser::ast::Statement;
use std::fmt;
use std::sync::OnceLock;

/// Category of destructive operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskKind {
    /// `DROP <object type> <name>`
    DropObject,
    /// `TRUNCATE [TABLE] <name>`
    Truncate,
    /// `ALTER TABLE <name> DROP COLUMN <column>`
    DropColumn,
}

impl fmt::Display for RiskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskKind::DropObject => write!(f, "drop"),
            RiskKind::Truncate => write!(f, "truncate"),
            RiskKind::DropColumn => write!(f, "drop column"),
        }
    }
}

/// A destructive operation found in a statement
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RiskFinding {
    pub kind: RiskKind,
    /// Human-readable target, e.g. `TABLE sales.orders` or `hr.employees.ssn`
    pub target: String,
    /// Statement index within the script
    pub statement_index: usize,
    /// Line where the statement starts
    pub line: usize,
}

fn drop_object_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\bDROP\s+(TABLE|VIEW|MATERIALIZED\s+VIEW|SCHEMA|DATABASE|SEQUENCE|STAGE|FILE\s+FORMAT|PROCEDURE|FUNCTION|ROLE)\s+(?:IF\s+EXISTS\s+)?([^\s;(]+)",
        )
        .expect("valid regex literal")
    })
}

fn truncate_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\bTRUNCATE\s+(?:TABLE\s+)?(?:IF\s+EXISTS\s+)?([^\s;]+)")
            .expect("valid regex literal")
    })
}

fn drop_column_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\bALTER\s+TABLE\s+(?:IF\s+EXISTS\s+)?(\S+)\s+DROP\s+COLUMN\s+(?:IF\s+EXISTS\s+)?([^\s;,]+)",
        )
        .expect("valid regex literal")
    })
}

/// Scan one statement for destructive operations.
pub fn scan_statement(statement: &SqlStatement, dialect: &dyn SqlDialect) -> Vec<RiskFinding> {
    let finding = |kind: RiskKind, target: String| RiskFinding {
        kind,
        target,
        statement_index: statement.index,
        line: statement.line,
    };

    let mut findings = Vec::new();
    match dialect.parse(&statement.text) {
        Ok(parsed) => {
            for stmt in &parsed {
                match stmt {
                    Statement::Drop {
                        object_type, names, ..
                    } => {
                        for name in names {
                            findings.push(finding(
                                RiskKind::DropObject,
                                format!("{} {}", object_type, name),
                            ));
                        }
                    }
                    Statement::Truncate { .. } => {
                        for caps in truncate_re().captures_iter(&statement.text) {
                            findings.push(finding(RiskKind::Truncate, caps[1].to_string()));
                        }
                    }
                    _ => {}
                }
            }
        }
        Err(e) => {
            log::debug!(
                "Statement {} (line {}) did not parse, scanning text instead: {}",
                statement.index,
                statement.line,
                e
            );
            for caps in drop_object_re().captures_iter(&statement.text) {
                let object_type = caps[1].split_whitespace().collect::<Vec<_>>().join(" ");
                findings.push(finding(
                    RiskKind::DropObject,
                    format!("{} {}", object_type.to_uppercase(), &caps[2]),
                ));
            }
            for caps in truncate_re().captures_iter(&statement.text) {
                findings.push(finding(RiskKind::Truncate, caps[1].to_string()));
            }
        }
    }

    for caps in drop_column_re().captures_iter(&statement.text) {
        findings.push(finding(
            RiskKind::DropColumn,
            format!("{}.{}", &caps[1], &caps[2]),
        ));
    }

    findings
}

#[cfg(test)]
#[path = "risk_test.rs"]
mod tests;
