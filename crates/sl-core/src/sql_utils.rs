//! SQL identifier quoting utilities
//!
//! Provides safe quoting for SQL identifiers and string literals used when the
//! engine builds its own bookkeeping statements.

/// Quote a SQL identifier to prevent injection.
///
/// Wraps the identifier in double quotes and escapes any embedded double quotes
/// by doubling them, following the SQL standard.
///
/// # Examples
/// ```
/// use sl_core::sql_utils::quote_ident;
/// assert_eq!(quote_ident("users"), r#""users""#);
/// assert_eq!(quote_ident(r#"my"table"#), r#""my""table""#);
/// ```
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Quote a table name with an optional schema.
///
/// # Examples
/// ```
/// use sl_core::sql_utils::qualified_table;
/// assert_eq!(qualified_table(None, "history"), r#""history""#);
/// assert_eq!(qualified_table(Some("ops"), "history"), r#""ops"."history""#);
/// ```
pub fn qualified_table(schema: Option<&str>, table: &str) -> String {
    match schema {
        Some(schema) => format!("{}.{}", quote_ident(schema), quote_ident(table)),
        None => quote_ident(table),
    }
}

/// Escape a SQL string literal value by doubling single quotes.
///
/// This is for use inside single-quoted SQL string literals, not identifiers.
pub fn escape_sql_string(value: &str) -> String {
    value.replace('\'', "''")
}

/// Render a value as a single-quoted SQL string literal.
pub fn string_literal(value: &str) -> String {
    format!("'{}'", escape_sql_string(value))
}
