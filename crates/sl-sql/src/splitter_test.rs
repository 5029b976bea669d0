use super::*;
use crate::dialect::{DuckDbDialect, SnowflakeDialect};

fn split(sql: &str) -> Vec<SqlStatement> {
    split_statements(sql, &DuckDbDialect::new()).unwrap()
}

fn texts(sql: &str) -> Vec<String> {
    split(sql).into_iter().map(|s| s.text).collect()
}

#[test]
fn test_split_simple_statements() {
    assert_eq!(
        texts("CREATE TABLE a (id INT);\nCREATE TABLE b (id INT);\n"),
        vec!["CREATE TABLE a (id INT)", "CREATE TABLE b (id INT)"]
    );
}

#[test]
fn test_last_statement_without_delimiter() {
    assert_eq!(texts("SELECT 1;\nSELECT 2"), vec!["SELECT 1", "SELECT 2"]);
}

#[test]
fn test_indexes_and_lines() {
    let stmts = split("SELECT 1;\n\n-- second\nSELECT 2;\n");
    assert_eq!(stmts[0].index, 1);
    assert_eq!(stmts[0].line, 1);
    assert_eq!(stmts[1].index, 2);
    assert_eq!(stmts[1].line, 4);
}

#[test]
fn test_semicolon_inside_string_literal() {
    assert_eq!(
        texts("INSERT INTO t VALUES ('a;b');SELECT 1;"),
        vec!["INSERT INTO t VALUES ('a;b')", "SELECT 1"]
    );
}

#[test]
fn test_doubled_quote_escape() {
    assert_eq!(
        texts("INSERT INTO t VALUES ('it''s; fine');SELECT 2;"),
        vec!["INSERT INTO t VALUES ('it''s; fine')", "SELECT 2"]
    );
}

#[test]
fn test_backslash_escape_depends_on_dialect() {
    let sql = r"SELECT 'a\';b';SELECT 2;";
    let sf = split_statements(sql, &SnowflakeDialect::new()).unwrap();
    assert_eq!(sf.len(), 2);
    assert_eq!(sf[0].text, r"SELECT 'a\';b'");

    // Without backslash escapes the string closes at \' and the quote after b is unterminated
    let err = split_statements(sql, &DuckDbDialect::new()).unwrap_err();
    assert!(matches!(err, SqlError::Unterminated { kind: "string literal", .. }));
}

#[test]
fn test_semicolon_inside_quoted_identifier() {
    assert_eq!(
        texts(r#"CREATE TABLE "odd;name" (id INT);SELECT 1"#),
        vec![r#"CREATE TABLE "odd;name" (id INT)"#, "SELECT 1"]
    );
}

#[test]
fn test_semicolon_inside_comments() {
    let sql = "-- setup; do not split\nSELECT 1 /* a; b */;\nSELECT 2;";
    assert_eq!(texts(sql), vec!["SELECT 1 /* a; b */", "SELECT 2"]);
}

#[test]
fn test_comment_only_fragments_are_dropped() {
    assert_eq!(texts("SELECT 1;\n-- trailing note\n/* and more */\n"), vec!["SELECT 1"]);
    assert!(texts(";;\n  ;").is_empty());
}

#[test]
fn test_dollar_quoted_procedure_body_is_opaque() {
    let sql = r#"
CREATE OR REPLACE PROCEDURE admin.grant_roles(role_name STRING)
RETURNS STRING
LANGUAGE SQL
AS
$$
DECLARE
    stmt STRING;
BEGIN
    stmt := 'GRANT USAGE ON WAREHOUSE wh TO ROLE ' || role_name || ';';
    EXECUTE IMMEDIATE stmt;
    RETURN 'ok';
EXCEPTION
    WHEN OTHER THEN
        RETURN 'failed: ' || SQLERRM;
END;
$$;
GRANT USAGE ON PROCEDURE admin.grant_roles(STRING) TO ROLE sysadmin;
"#;
    let stmts = split_statements(sql, &SnowflakeDialect::new()).unwrap();
    assert_eq!(stmts.len(), 2);
    assert!(stmts[0].text.starts_with("CREATE OR REPLACE PROCEDURE"));
    assert!(stmts[0].text.ends_with("END;\n$$"));
    assert!(stmts[0].text.contains("EXECUTE IMMEDIATE stmt;"));
    assert_eq!(stmts[0].line, 2);
    assert!(stmts[1].text.starts_with("GRANT USAGE ON PROCEDURE"));
}

#[test]
fn test_tagged_dollar_quote() {
    let sql = "CREATE FUNCTION f() AS $body$ SELECT '$$'; $body$;SELECT 1;";
    assert_eq!(
        texts(sql),
        vec!["CREATE FUNCTION f() AS $body$ SELECT '$$'; $body$", "SELECT 1"]
    );
}

#[test]
fn test_positional_parameter_is_not_a_quote() {
    assert_eq!(
        texts("PREPARE p AS SELECT $1;SELECT 2;"),
        vec!["PREPARE p AS SELECT $1", "SELECT 2"]
    );
}

#[test]
fn test_dollar_inside_identifier_is_not_a_quote() {
    assert_eq!(
        texts("SELECT price$usd$ FROM t;SELECT 2;"),
        vec!["SELECT price$usd$ FROM t", "SELECT 2"]
    );
}

#[test]
fn test_unterminated_dollar_quote() {
    let err = split_statements("SELECT 1;\nCREATE PROCEDURE p() AS $$ BEGIN", &SnowflakeDialect::new())
        .unwrap_err();
    match err {
        SqlError::Unterminated { kind, line } => {
            assert_eq!(kind, "dollar-quoted block");
            assert_eq!(line, 2);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_unterminated_block_comment() {
    let err = split_statements("SELECT 1; /* never closed", &DuckDbDialect::new()).unwrap_err();
    assert!(matches!(err, SqlError::Unterminated { kind: "block comment", line: 1 }));
}

#[test]
fn test_multibyte_text_survives() {
    assert_eq!(
        texts("COMMENT ON TABLE t IS 'Überblick; ü';SELECT 'é'"),
        vec!["COMMENT ON TABLE t IS 'Überblick; ü'", "SELECT 'é'"]
    );
}

#[test]
fn test_line_comment_at_end_of_file_without_newline() {
    assert_eq!(texts("SELECT 1; -- done"), vec!["SELECT 1"]);
}

#[test]
fn test_snowflake_slash_comment_hides_quote_and_semicolon() {
    let stmts = split_statements(
        "// don't split here; really\nCREATE TABLE a (x INT);\nCREATE TABLE b (y INT); // trailing; note\n",
        &SnowflakeDialect::new(),
    )
    .unwrap();
    let texts: Vec<&str> = stmts.iter().map(|s| s.text.as_str()).collect();
    assert_eq!(texts, vec!["CREATE TABLE a (x INT)", "CREATE TABLE b (y INT)"]);
    assert_eq!(stmts[0].line, 2);
}

#[test]
fn test_duckdb_double_slash_is_integer_division() {
    assert_eq!(
        texts("SELECT 7 // 2;\nSELECT 'x';"),
        vec!["SELECT 7 // 2", "SELECT 'x'"]
    );
}
