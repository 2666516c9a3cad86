//! SQL comment and whitespace stripping.
//!
//! Runs before risk analysis and before execution so that nothing hidden in a
//! comment reaches either of them.

use std::sync::LazyLock;

use regex::Regex;

static BLOCK_COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)/\*.*?\*/").expect("valid block comment regex"));
static LINE_COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"--[^\n]*").expect("valid line comment regex"));
static HASH_COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"#[^\n]*").expect("valid hash comment regex"));
static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

/// Removes comments from SQL text and normalizes its whitespace.
pub struct SqlSanitizer;

impl SqlSanitizer {
    /// Strips `/* */`, `--` and `#` comments, collapses whitespace runs and
    /// trims both ends.
    ///
    /// Block comments are replaced by a space so that removing one can never
    /// glue its neighbours into a new comment marker; this keeps the function
    /// idempotent.
    pub fn sanitize(sql: &str) -> String {
        let sql = BLOCK_COMMENT.replace_all(sql, " ");
        let sql = LINE_COMMENT.replace_all(&sql, "");
        let sql = HASH_COMMENT.replace_all(&sql, "");
        let sql = WHITESPACE.replace_all(&sql, " ");
        sql.trim().to_string()
    }
}
