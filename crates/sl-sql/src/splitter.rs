//! Statement splitting for migration scripts.
//!
//! A script is split on `;` only where the semicolon is in plain code. The
//! following contexts suppress the delimiter:
//!
//! - single-quoted strings (`''` escape, and `\'` when the dialect allows it)
//! - double-quoted identifiers (`""` escape)
//! - `--` line comments and `/* */` block comments
//! - `//` line comments, for dialects that have them (Snowflake)
//! - dollar-quoted blocks, `$$ ... $$` or `$tag$ ... $tag$`
//!
//! Dollar-quoted blocks carry procedural bodies (`CREATE PROCEDURE ... AS $$ ... $$`)
//! and are passed through as one opaque blob. Unquoted Snowflake scripting
//! blocks (`BEGIN ... END;` without `$$`) are not recognised.
//!
//! The scanner works on bytes: every character it cares about is ASCII, and
//! UTF-8 continuation bytes never collide with ASCII, so slicing at the
//! positions it finds always lands on a character boundary.

use crate::dialect::SqlDialect;
use crate::error::{SqlError, SqlResult};
use serde::Serialize;

/// One executable statement of a script
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SqlStatement {
    /// 1-based position within the script
    pub index: usize,
    /// 1-based line where the statement starts
    pub line: usize,
    /// Statement text without the trailing delimiter
    pub text: String,
}

enum Context {
    Code,
    SingleQuote { line: usize },
    DoubleQuote { line: usize },
    LineComment,
    BlockComment { line: usize },
    DollarQuote { tag: String, line: usize },
}

/// Statement currently being accumulated
struct Pending {
    /// Byte offset of the first code character, if any code was seen
    code_start: Option<usize>,
    line: usize,
}

impl Pending {
    fn empty() -> Self {
        Self {
            code_start: None,
            line: 0,
        }
    }

    fn touch(&mut self, pos: usize, line: usize) {
        if self.code_start.is_none() {
            self.code_start = Some(pos);
            self.line = line;
        }
    }
}

/// Split a script into executable statements.
pub fn split_statements(sql: &str, dialect: &dyn SqlDialect) -> SqlResult<Vec<SqlStatement>> {
    let bytes = sql.as_bytes();
    let backslash = dialect.backslash_escapes();
    let slash_comments = dialect.slash_line_comments();

    let mut statements = Vec::new();
    let mut context = Context::Code;
    let mut pending = Pending::empty();
    let mut line = 1usize;
    let mut i = 0usize;

    while i < bytes.len() {
        let b = bytes[i];
        let next = bytes.get(i + 1).copied();

        match &context {
            Context::Code => match b {
                b'\'' => {
                    pending.touch(i, line);
                    context = Context::SingleQuote { line };
                }
                b'"' => {
                    pending.touch(i, line);
                    context = Context::DoubleQuote { line };
                }
                b'-' if next == Some(b'-') => {
                    context = Context::LineComment;
                    i += 1;
                }
                b'/' if next == Some(b'/') && slash_comments => {
                    context = Context::LineComment;
                    i += 1;
                }
                b'/' if next == Some(b'*') => {
                    context = Context::BlockComment { line };
                    i += 1;
                }
                b'$' => {
                    pending.touch(i, line);
                    if let Some(tag) = dollar_tag_at(bytes, i) {
                        i += tag.len() - 1;
                        context = Context::DollarQuote { tag, line };
                    }
                }
                b';' => {
                    push_statement(sql, &mut statements, &pending, i);
                    pending = Pending::empty();
                }
                b'\n' => line += 1,
                _ if b.is_ascii_whitespace() => {}
                _ => pending.touch(i, line),
            },
            Context::SingleQuote { .. } => match b {
                b'\\' if backslash => {
                    if next == Some(b'\n') {
                        line += 1;
                    }
                    i += 1;
                }
                b'\'' if next == Some(b'\'') => i += 1,
                b'\'' => context = Context::Code,
                b'\n' => line += 1,
                _ => {}
            },
            Context::DoubleQuote { .. } => match b {
                b'"' if next == Some(b'"') => i += 1,
                b'"' => context = Context::Code,
                b'\n' => line += 1,
                _ => {}
            },
            Context::LineComment => {
                if b == b'\n' {
                    line += 1;
                    context = Context::Code;
                }
            }
            Context::BlockComment { .. } => match b {
                b'*' if next == Some(b'/') => {
                    context = Context::Code;
                    i += 1;
                }
                b'\n' => line += 1,
                _ => {}
            },
            Context::DollarQuote { tag, .. } => {
                if bytes[i..].starts_with(tag.as_bytes()) {
                    i += tag.len() - 1;
                    context = Context::Code;
                } else if b == b'\n' {
                    line += 1;
                }
            }
        }
        i += 1;
    }

    match context {
        Context::Code | Context::LineComment => {}
        Context::SingleQuote { line } => {
            return Err(SqlError::Unterminated {
                kind: "string literal",
                line,
            })
        }
        Context::DoubleQuote { line } => {
            return Err(SqlError::Unterminated {
                kind: "quoted identifier",
                line,
            })
        }
        Context::BlockComment { line } => {
            return Err(SqlError::Unterminated {
                kind: "block comment",
                line,
            })
        }
        Context::DollarQuote { line, .. } => {
            return Err(SqlError::Unterminated {
                kind: "dollar-quoted block",
                line,
            })
        }
    }

    push_statement(sql, &mut statements, &pending, bytes.len());
    Ok(statements)
}

/// Recognise a dollar-quote opener (`$$` or `$tag$`) at `pos`.
///
/// A `$` that continues an identifier (`price$usd`) or introduces a positional
/// parameter (`$1`) is not an opener.
fn dollar_tag_at(bytes: &[u8], pos: usize) -> Option<String> {
    if pos > 0 {
        let prev = bytes[pos - 1];
        if prev.is_ascii_alphanumeric() || prev == b'_' || prev == b'$' {
            return None;
        }
    }

    let mut end = pos + 1;
    match bytes.get(end) {
        Some(b'$') => return Some("$$".to_string()),
        Some(c) if c.is_ascii_alphabetic() || *c == b'_' => {}
        _ => return None,
    }
    while let Some(c) = bytes.get(end) {
        if c.is_ascii_alphanumeric() || *c == b'_' {
            end += 1;
        } else {
            break;
        }
    }
    if bytes.get(end) == Some(&b'$') {
        String::from_utf8(bytes[pos..=end].to_vec()).ok()
    } else {
        None
    }
}

fn push_statement(sql: &str, statements: &mut Vec<SqlStatement>, pending: &Pending, end: usize) {
    let Some(start) = pending.code_start else {
        return;
    };
    let text = sql[start..end].trim_end();
    if text.is_empty() {
        return;
    }
    statements.push(SqlStatement {
        index: statements.len() + 1,
        line: pending.line,
        text: text.to_string(),
    });
}

#[cfg(test)]
#[path = "splitter_test.rs"]
mod tests;
