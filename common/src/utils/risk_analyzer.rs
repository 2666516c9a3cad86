//! Rule based SQL risk analyzer.
//!
//! A shallow lexical classifier, not a parser. Rule groups are evaluated in
//! priority order and the first match is reported.

use std::sync::LazyLock;

use regex::Regex;

use crate::models::risk::{RiskLevel, RiskVerdict};

/// A named pattern.
struct Rule {
    label: &'static str,
    pattern: Regex,
}

impl Rule {
    fn new(label: &'static str, pattern: &str) -> Self {
        Self {
            label,
            pattern: Regex::new(pattern).expect("valid risk rule regex"),
        }
    }
}

/// Data modifying or destroying statements.
static DANGEROUS_STATEMENTS: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    vec![
        Rule::new("DELETE FROM", "DELETE FROM"),
        Rule::new("DROP TABLE", "DROP TABLE"),
        Rule::new("DROP DATABASE", "DROP DATABASE"),
        Rule::new("TRUNCATE TABLE", "TRUNCATE TABLE"),
        Rule::new("ALTER TABLE", "ALTER TABLE"),
        Rule::new("UPDATE ... SET", "UPDATE.*SET"),
        Rule::new("INSERT INTO", "INSERT INTO"),
    ]
});

/// Functions and clauses that reach outside the query's own data.
static DANGEROUS_FUNCTIONS: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    vec![
        Rule::new("SLEEP", "SLEEP"),
        Rule::new("BENCHMARK", "BENCHMARK"),
        Rule::new("LOAD_FILE", "LOAD_FILE"),
        Rule::new("INTO OUTFILE", "INTO OUTFILE"),
        Rule::new("INTO DUMPFILE", "INTO DUMPFILE"),
        Rule::new("INFORMATION_SCHEMA", "INFORMATION_SCHEMA"),
    ]
});

/// Shapes typical of string-concatenation injection.
static INJECTION_PATTERNS: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    vec![
        Rule::new("quote OR quote", "'.*OR.*'"),
        Rule::new("quote AND quote", "'.*AND.*'"),
        Rule::new("line comment", "--.*"),
        Rule::new("block comment", r"/\*.*\*/"),
        Rule::new("hash comment", "#.*"),
        Rule::new("UNION SELECT", "UNION.*SELECT"),
        Rule::new("CONCAT()", r"CONCAT\(.*\)"),
    ]
});

const MODIFY_SUGGESTION: &str =
    "confirm that data must be modified and restrict the affected range with a WHERE clause";
const FUNCTION_SUGGESTION: &str = "avoid sensitive system functions";
const INJECTION_SUGGESTION: &str = "use parameterized queries instead of concatenating SQL";

/// Classifies SQL statements into low, medium and high risk.
pub struct RiskAnalyzer;

impl RiskAnalyzer {
    /// Analyzes a (sanitized) SQL statement.
    ///
    /// The statement is upper-cased and trimmed before matching.
    pub fn analyze(sql: &str) -> RiskVerdict {
        let sql = sql.trim().to_uppercase();

        if let Some(rule) = first_match(&DANGEROUS_STATEMENTS, &sql) {
            return RiskVerdict::new(
                RiskLevel::High,
                format!("dangerous operation: {}", rule.label),
                MODIFY_SUGGESTION,
            );
        }

        if let Some(rule) = first_match(&DANGEROUS_FUNCTIONS, &sql) {
            return RiskVerdict::new(
                RiskLevel::High,
                format!("dangerous function: {}", rule.label),
                FUNCTION_SUGGESTION,
            );
        }

        if let Some(rule) = first_match(&INJECTION_PATTERNS, &sql) {
            tracing::debug!(pattern = rule.label, "injection pattern matched");
            return RiskVerdict::new(
                RiskLevel::High,
                "suspected SQL injection",
                INJECTION_SUGGESTION,
            );
        }

        if sql.contains("SELECT") {
            if !sql.contains("WHERE") {
                return RiskVerdict::new(
                    RiskLevel::Medium,
                    "full table scan risk",
                    "add a WHERE clause to limit the rows scanned",
                );
            }
            if sql.contains("SELECT *") {
                return RiskVerdict::new(
                    RiskLevel::Medium,
                    "SELECT * may read columns that are not needed",
                    "list the required columns explicitly",
                );
            }
            if sql.contains("GROUP BY") {
                return RiskVerdict::new(
                    RiskLevel::Low,
                    "statement groups rows",
                    "check that the grouping columns are indexed",
                );
            }
            if sql.contains("ORDER BY") {
                return RiskVerdict::new(
                    RiskLevel::Low,
                    "statement sorts rows",
                    "check that the sort columns are indexed",
                );
            }
        }

        RiskVerdict::new(RiskLevel::Low, "SQL statement is safe", "")
    }
}

fn first_match<'a>(rules: &'a [Rule], sql: &str) -> Option<&'a Rule> {
    rules.iter().find(|rule| rule.pattern.is_match(sql))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_destructive_statements_are_high_in_any_case() {
        for sql in [
            "DROP TABLE users",
            "drop table users",
            "delete from orders where id = 1",
            "Truncate Table logs",
        ] {
            let verdict = RiskAnalyzer::analyze(sql);
            assert_eq!(verdict.risk, RiskLevel::High, "sql: {}", sql);
            assert!(verdict.description.starts_with("dangerous operation"));
            assert!(verdict.is_blocked());
        }
    }

    #[test]
    fn test_update_set_names_keyword() {
        let verdict = RiskAnalyzer::analyze("update users set name = 'x' where id = 1");
        assert_eq!(verdict.description, "dangerous operation: UPDATE ... SET");
    }

    #[test]
    fn test_statement_rule_wins_over_function_rule() {
        let verdict = RiskAnalyzer::analyze("INSERT INTO t SELECT SLEEP(5)");
        assert_eq!(verdict.description, "dangerous operation: INSERT INTO");
    }

    #[test]
    fn test_dangerous_functions() {
        let verdict = RiskAnalyzer::analyze("SELECT SLEEP(10) FROM dual WHERE 1 = 1");
        assert_eq!(verdict.risk, RiskLevel::High);
        assert_eq!(verdict.description, "dangerous function: SLEEP");

        let verdict = RiskAnalyzer::analyze("select table_name from information_schema.tables");
        assert_eq!(verdict.description, "dangerous function: INFORMATION_SCHEMA");
    }

    #[test]
    fn test_injection_shapes() {
        for sql in [
            "SELECT id FROM users WHERE name = '' OR '1'='1'",
            "SELECT id FROM a WHERE x = 1 UNION SELECT password FROM users",
            "SELECT CONCAT(a, b) FROM t WHERE id = 1",
        ] {
            let verdict = RiskAnalyzer::analyze(sql);
            assert_eq!(verdict.risk, RiskLevel::High, "sql: {}", sql);
            assert_eq!(verdict.description, "suspected SQL injection");
        }
    }

    #[test]
    fn test_select_star_without_where_is_full_scan() {
        let verdict = RiskAnalyzer::analyze("SELECT * FROM t");
        assert_eq!(verdict.risk, RiskLevel::Medium);
        assert_eq!(verdict.description, "full table scan risk");
    }

    #[test]
    fn test_select_star_with_where() {
        let verdict = RiskAnalyzer::analyze("SELECT * FROM t WHERE id = 1");
        assert_eq!(verdict.risk, RiskLevel::Medium);
        assert!(verdict.description.contains("SELECT *"));
    }

    #[test]
    fn test_sorting_and_grouping_notes() {
        let verdict = RiskAnalyzer::analyze("SELECT id FROM t WHERE a = 1 ORDER BY id");
        assert_eq!(verdict.risk, RiskLevel::Low);
        assert_eq!(verdict.description, "statement sorts rows");

        let verdict =
            RiskAnalyzer::analyze("SELECT a, COUNT(1) FROM t WHERE b = 1 GROUP BY a ORDER BY a");
        assert_eq!(verdict.description, "statement groups rows");
    }

    #[test]
    fn test_plain_statements_are_low() {
        let verdict = RiskAnalyzer::analyze("SELECT id FROM t WHERE id = 1");
        assert_eq!(verdict.risk, RiskLevel::Low);
        assert!(verdict.suggestion.is_empty());

        assert_eq!(RiskAnalyzer::analyze("SHOW TABLES").risk, RiskLevel::Low);
    }

    #[test]
    fn test_sanitized_comment_does_not_trigger() {
        let sql = crate::utils::SqlSanitizer::sanitize("SELECT 1 -- drop table x");
        let verdict = RiskAnalyzer::analyze(&sql);
        assert_ne!(verdict.risk, RiskLevel::High);
    }
}
