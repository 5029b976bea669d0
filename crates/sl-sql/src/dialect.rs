//! Per-dialect lexical rules for migration scripts.
//!
//! A dialect tells the splitter which escapes and comment forms it must
//! honour, and gives the risk scanner a sqlparser grammar to read single
//! statements with.

use sqlparser::ast::Statement;
use sqlparser::dialect::{
    Dialect, DuckDbDialect as SqlParserDuckDb, SnowflakeDialect as SqlParserSnowflake,
};
use sqlparser::parser::Parser;

use crate::error::{SqlError, SqlResult};

/// Lexical rules of a target's SQL dialect
pub trait SqlDialect: Send + Sync {
    /// sqlparser grammar for this dialect
    fn parser_dialect(&self) -> &dyn Dialect;

    /// Parse a statement, reporting where the grammar gave up
    fn parse(&self, sql: &str) -> SqlResult<Vec<Statement>> {
        Parser::parse_sql(self.parser_dialect(), sql).map_err(|e| {
            let message = e.to_string();
            let (line, column) = error_location(&message);
            SqlError::ParseError {
                message,
                line,
                column,
            }
        })
    }

    /// `\'` escapes a quote inside single-quoted strings
    fn backslash_escapes(&self) -> bool;

    /// `//` starts a comment running to the end of the line
    fn slash_line_comments(&self) -> bool {
        false
    }

    /// Name used in `sluice.yml`
    fn name(&self) -> &'static str;
}

/// Look up a dialect by its `sluice.yml` name, ignoring case
pub fn dialect_from_name(name: &str) -> SqlResult<Box<dyn SqlDialect>> {
    if name.eq_ignore_ascii_case("duckdb") {
        Ok(Box::new(DuckDbDialect::new()))
    } else if name.eq_ignore_ascii_case("snowflake") {
        Ok(Box::new(SnowflakeDialect::new()))
    } else {
        Err(SqlError::UnknownDialect(name.to_string()))
    }
}

/// `(line, column)` named by a parser message ending `at Line: 3, Column: 14`.
///
/// Messages without a position give `(0, 0)`.
fn error_location(msg: &str) -> (usize, usize) {
    match (number_after(msg, "Line: "), number_after(msg, "Column: ")) {
        (Some(line), Some(column)) => (line, column),
        _ => (0, 0),
    }
}

fn number_after(msg: &str, label: &str) -> Option<usize> {
    let rest = &msg[msg.find(label)? + label.len()..];
    let end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    rest[..end].parse().ok()
}

/// DuckDB: standard string escapes, `--` and `/* */` comments only
#[derive(Debug, Default, Clone, Copy)]
pub struct DuckDbDialect;

impl DuckDbDialect {
    pub fn new() -> Self {
        DuckDbDialect
    }
}

impl SqlDialect for DuckDbDialect {
    fn parser_dialect(&self) -> &dyn Dialect {
        &SqlParserDuckDb {}
    }

    fn backslash_escapes(&self) -> bool {
        false
    }

    fn name(&self) -> &'static str {
        "duckdb"
    }
}

/// Snowflake: backslash escapes in strings and `//` line comments
#[derive(Debug, Default, Clone, Copy)]
pub struct SnowflakeDialect;

impl SnowflakeDialect {
    pub fn new() -> Self {
        SnowflakeDialect
    }
}

impl SqlDialect for SnowflakeDialect {
    fn parser_dialect(&self) -> &dyn Dialect {
        &SqlParserSnowflake {}
    }

    fn backslash_escapes(&self) -> bool {
        true
    }

    fn slash_line_comments(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "snowflake"
    }
}

#[cfg(test)]
#[path = "dialect_test.rs"]
mod tests;
