//! Affected-rows estimation for previewed mutations.
//!
//! Transactional statements are executed inside a transaction that is always
//! rolled back, which gives an exact count. Everything else, or a probe that
//! fails, falls back to a per-operation heuristic.

use crate::db::executor::quote_mysql_identifier;
use crate::db::{Database, Row};
use crate::error::{DbError, DbResult};
use crate::sql::classifier::{
    OperationKind, classify_operation, is_transactional, strip_leading_comments,
};
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;
use tracing::{debug, warn};

/// Sentinel for "cannot estimate".
pub const UNKNOWN_ROWS: i64 = -1;

static DELETE_FROM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^DELETE\s+FROM\b").expect("valid regex"));

static UPDATE_TARGET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)^UPDATE\s+(\S+)\s+SET\s").expect("valid regex"));

static TRUNCATE_TARGET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^TRUNCATE\s+(?:TABLE\s+)?([^\s;]+)").expect("valid regex")
});

static VALUES_KEYWORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bVALUES?\b").expect("valid regex"));

/// Result of an estimation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowEstimate {
    /// Row count, or [`UNKNOWN_ROWS`].
    pub rows: i64,
    /// True only when the count came from a rolled-back execution.
    pub is_exact: bool,
}

impl RowEstimate {
    fn exact(rows: u64) -> Self {
        Self {
            rows: i64::try_from(rows).unwrap_or(i64::MAX),
            is_exact: true,
        }
    }

    fn heuristic(rows: i64) -> Self {
        Self {
            rows,
            is_exact: false,
        }
    }

    fn unknown() -> Self {
        Self::heuristic(UNKNOWN_ROWS)
    }

    pub fn is_unknown(&self) -> bool {
        self.rows < 0
    }
}

/// Estimate how many rows `sql` would affect.
///
/// Errors from the DELETE/UPDATE count queries are returned to the caller;
/// no other path fails.
pub async fn estimate_affected_rows<D: Database>(db: &D, sql: &str) -> DbResult<RowEstimate> {
    if is_transactional(sql) {
        match db.run_in_rollback_only_transaction(sql).await {
            Ok(rows) => {
                debug!(rows, "Exact estimate from rolled-back probe");
                return Ok(RowEstimate::exact(rows));
            }
            Err(e) => warn!(error = %e, "Rollback probe failed, falling back to heuristic estimate"),
        }
    }

    heuristic_estimate(db, sql).await
}

async fn heuristic_estimate<D: Database>(db: &D, sql: &str) -> DbResult<RowEstimate> {
    let stmt = strip_leading_comments(sql);

    match classify_operation(sql) {
        OperationKind::Delete => {
            if !DELETE_FROM.is_match(stmt) {
                // multi-table DELETE t1 FROM t1 JOIN ...
                return Ok(RowEstimate::unknown());
            }
            let count_sql = DELETE_FROM.replace(stmt, "SELECT COUNT(*) AS count FROM");
            let rows = db.run_query(&count_sql).await?;
            Ok(RowEstimate::heuristic(first_count(&rows)?))
        }
        OperationKind::Update => match update_count_query(stmt) {
            Some(count_sql) => {
                let rows = db.run_query(&count_sql).await?;
                Ok(RowEstimate::heuristic(first_count(&rows)?))
            }
            None => Ok(RowEstimate::unknown()),
        },
        OperationKind::Insert | OperationKind::Replace => {
            Ok(RowEstimate::heuristic(count_value_groups(stmt).max(1) as i64))
        }
        OperationKind::Truncate => Ok(truncate_estimate(db, stmt).await),
        OperationKind::Create => Ok(RowEstimate::heuristic(0)),
        OperationKind::Drop | OperationKind::Alter | OperationKind::Unknown => {
            Ok(RowEstimate::unknown())
        }
    }
}

/// `SELECT COUNT(*)` over the target of a single-table UPDATE, keeping its
/// WHERE clause. `None` when the statement has any other shape.
fn update_count_query(stmt: &str) -> Option<String> {
    let caps = UPDATE_TARGET.captures(stmt)?;
    let table = caps.get(1)?.as_str();
    let assignments = &stmt[caps.get(0)?.end()..];

    match find_where(assignments)? {
        Some(at) => Some(format!(
            "SELECT COUNT(*) AS count FROM {} {}",
            table,
            assignments[at..].trim_end()
        )),
        None => Some(format!("SELECT COUNT(*) AS count FROM {}", table)),
    }
}

/// Byte offset of the first `WHERE` keyword outside quotes and parentheses.
///
/// `None` when a quote is left open, since the clause boundaries are then
/// unknowable.
fn find_where(text: &str) -> Option<Option<usize>> {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut quote: Option<u8> = None;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        if let Some(q) = quote {
            if b == b'\\' {
                i += 1;
            } else if b == q {
                if bytes.get(i + 1) == Some(&q) {
                    i += 1;
                } else {
                    quote = None;
                }
            }
            i += 1;
            continue;
        }

        match b {
            b'\'' | b'"' | b'`' => quote = Some(b),
            b'(' => depth += 1,
            b')' => depth = depth.saturating_sub(1),
            b'w' | b'W' if depth == 0 && is_where_at(bytes, i) => return Some(Some(i)),
            _ => {}
        }
        i += 1;
    }

    match quote {
        Some(_) => None,
        None => Some(None),
    }
}

fn is_where_at(bytes: &[u8], i: usize) -> bool {
    let is_word = |b: &u8| b.is_ascii_alphanumeric() || *b == b'_';
    bytes.len() >= i + 5
        && bytes[i..i + 5].eq_ignore_ascii_case(b"WHERE")
        && !(i > 0 && is_word(&bytes[i - 1]))
        && !bytes.get(i + 5).is_some_and(is_word)
}

async fn truncate_estimate<D: Database>(db: &D, stmt: &str) -> RowEstimate {
    let Some(table) = TRUNCATE_TARGET
        .captures(stmt)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
    else {
        return RowEstimate::unknown();
    };

    let count_sql = format!(
        "SELECT COUNT(*) AS count FROM {}",
        quote_mysql_identifier(table)
    );
    match db.run_query(&count_sql).await {
        Ok(rows) => match first_count(&rows) {
            Ok(n) => RowEstimate::heuristic(n),
            Err(e) => {
                warn!(error = %e, "Unreadable row count for TRUNCATE target");
                RowEstimate::unknown()
            }
        },
        Err(e) => {
            warn!(error = %e, table, "Failed to count rows for TRUNCATE target");
            RowEstimate::unknown()
        }
    }
}

/// Number of top-level `( ... )` groups following VALUES.
///
/// Scanning stops at the first token that is neither a group nor a comma,
/// so `ON DUPLICATE KEY UPDATE x = VALUES(x)` is not counted.
pub fn count_value_groups(stmt: &str) -> usize {
    for m in VALUES_KEYWORD.find_iter(stmt) {
        if names_insert_target(&stmt[..m.start()]) {
            continue;
        }
        let rest = stmt[m.end()..].trim_start();
        if rest.starts_with('(') {
            return count_groups(rest);
        }
    }
    0
}

/// True when the word following `before` is the target table of the INSERT,
/// as in `INSERT INTO value (a) VALUES ...`.
fn names_insert_target(before: &str) -> bool {
    if before.ends_with(['`', '"', '.']) {
        return true;
    }
    let previous = before
        .trim_end()
        .rsplit(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .next()
        .unwrap_or_default()
        .to_ascii_uppercase();
    matches!(
        previous.as_str(),
        "INTO" | "INSERT" | "REPLACE" | "IGNORE" | "DELAYED" | "LOW_PRIORITY" | "HIGH_PRIORITY"
    )
}

fn count_groups(text: &str) -> usize {
    let mut groups = 0;
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if let Some(q) = quote {
            match c {
                '\\' => {
                    chars.next();
                }
                _ if c == q => {
                    // doubled quote is an escaped quote
                    if chars.peek() == Some(&q) {
                        chars.next();
                    } else {
                        quote = None;
                    }
                }
                _ => {}
            }
            continue;
        }

        match c {
            '\'' | '"' | '`' if depth > 0 => quote = Some(c),
            '(' => depth += 1,
            ')' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    groups += 1;
                }
            }
            _ if depth > 0 => {}
            ',' => {}
            c if c.is_whitespace() => {}
            _ => break,
        }
    }
    groups
}

/// Row count from the first column of the first row.
fn first_count(rows: &[Row]) -> DbResult<i64> {
    match rows.first().and_then(|row| row.values().next()) {
        Some(value) => coerce_row_count(value),
        None => Ok(0),
    }
}

/// Coerce a count value (number or numeric text) to `i64`.
pub fn coerce_row_count(value: &Value) -> DbResult<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_u64().map(|u| i64::try_from(u).unwrap_or(i64::MAX)))
            .or_else(|| n.as_f64().map(|f| f as i64))
            .ok_or_else(|| DbError::estimation(format!("cannot convert {} to a row count", n))),
        Value::String(s) => {
            let trimmed = s.trim();
            trimmed
                .parse::<i64>()
                .ok()
                .or_else(|| trimmed.parse::<f64>().ok().map(|f| f as i64))
                .ok_or_else(|| {
                    DbError::estimation(format!("cannot convert '{}' to a row count", s))
                })
        }
        other => Err(DbError::estimation(format!(
            "cannot convert {} to a row count",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::mock::MockDatabase;
    use serde_json::json;

    #[tokio::test]
    async fn test_transactional_statement_uses_probe() {
        let db = MockDatabase::new().with_probe(5);
        let est = estimate_affected_rows(&db, "DELETE FROM orders WHERE status = 'old'")
            .await
            .unwrap();
        assert_eq!(
            est,
            RowEstimate {
                rows: 5,
                is_exact: true
            }
        );
        assert!(db.calls_starting_with("query:").is_empty());
    }

    #[tokio::test]
    async fn test_failed_probe_falls_back_to_count() {
        let db = MockDatabase::new().with_count(json!(7));
        let est = estimate_affected_rows(&db, "DELETE FROM orders WHERE id > 3")
            .await
            .unwrap();
        assert_eq!(est.rows, 7);
        assert!(!est.is_exact);
        assert_eq!(
            db.calls_starting_with("query:"),
            vec!["query:SELECT COUNT(*) AS count FROM orders WHERE id > 3"]
        );
    }

    #[tokio::test]
    async fn test_delete_count_error_is_hard_error() {
        let db = MockDatabase::new().with_query(|_| {
            Err(DbError::database("Table 'x' doesn't exist", None, "check"))
        });
        let result = estimate_affected_rows(&db, "DELETE FROM x").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_multi_table_delete_is_unknown_without_query() {
        let db = MockDatabase::new();
        let est = estimate_affected_rows(&db, "DELETE t1 FROM t1 JOIN t2 ON t1.id = t2.id")
            .await
            .unwrap();
        assert_eq!(est.rows, UNKNOWN_ROWS);
        assert!(db.calls_starting_with("query:").is_empty());
    }

    #[tokio::test]
    async fn test_update_heuristic_keeps_where_clause() {
        let db = MockDatabase::new().with_count(json!("12"));
        let est = estimate_affected_rows(&db, "UPDATE users SET active = 0 WHERE last_login < '2020-01-01'")
            .await
            .unwrap();
        assert_eq!(est.rows, 12);
        assert_eq!(
            db.calls_starting_with("query:"),
            vec!["query:SELECT COUNT(*) AS count FROM users WHERE last_login < '2020-01-01'"]
        );
    }

    #[tokio::test]
    async fn test_update_without_where_counts_whole_table() {
        let db = MockDatabase::new().with_count(json!(40));
        let est = estimate_affected_rows(&db, "update users set active = 0")
            .await
            .unwrap();
        assert_eq!(est.rows, 40);
        assert_eq!(
            db.calls_starting_with("query:"),
            vec!["query:SELECT COUNT(*) AS count FROM users"]
        );
    }

    #[tokio::test]
    async fn test_unrecognized_update_shape_is_unknown() {
        let db = MockDatabase::new();
        let est = estimate_affected_rows(&db, "UPDATE a JOIN b ON a.id = b.id SET a.x = b.x")
            .await
            .unwrap();
        assert_eq!(est.rows, UNKNOWN_ROWS);
    }

    #[tokio::test]
    async fn test_insert_counts_value_groups() {
        let db = MockDatabase::new();
        let est = estimate_affected_rows(&db, "INSERT INTO t (a, b) VALUES (1, 'x'), (2, 'y'), (3, 'z')")
            .await
            .unwrap();
        assert_eq!(est.rows, 3);
        assert!(!est.is_exact);
    }

    #[tokio::test]
    async fn test_insert_without_values_assumes_one() {
        let db = MockDatabase::new();
        let est = estimate_affected_rows(&db, "INSERT INTO t SELECT * FROM s")
            .await
            .unwrap();
        assert_eq!(est.rows, 1);
    }

    #[tokio::test]
    async fn test_drop_and_alter_are_unknown_and_never_probed() {
        let db = MockDatabase::new().with_probe(99);
        for sql in ["DROP TABLE t", "ALTER TABLE t ADD c INT"] {
            let est = estimate_affected_rows(&db, sql).await.unwrap();
            assert_eq!(est.rows, UNKNOWN_ROWS, "sql: {}", sql);
            assert!(!est.is_exact);
        }
        assert!(db.calls_starting_with("probe:").is_empty());
    }

    #[tokio::test]
    async fn test_create_estimates_zero() {
        let db = MockDatabase::new();
        let est = estimate_affected_rows(&db, "CREATE TABLE t (id INT)")
            .await
            .unwrap();
        assert_eq!(est.rows, 0);
    }

    #[tokio::test]
    async fn test_truncate_counts_table() {
        let db = MockDatabase::new().with_count(json!(250));
        let est = estimate_affected_rows(&db, "TRUNCATE TABLE app.logs;")
            .await
            .unwrap();
        assert_eq!(est.rows, 250);
        assert_eq!(
            db.calls_starting_with("query:"),
            vec!["query:SELECT COUNT(*) AS count FROM `app`.`logs`"]
        );
    }

    #[tokio::test]
    async fn test_truncate_failure_degrades_to_unknown() {
        let db = MockDatabase::new()
            .with_query(|_| Err(DbError::database("no such table", None, "check")));
        let est = estimate_affected_rows(&db, "TRUNCATE logs").await.unwrap();
        assert_eq!(est.rows, UNKNOWN_ROWS);

        let db = MockDatabase::new().with_count(json!("many"));
        let est = estimate_affected_rows(&db, "TRUNCATE logs").await.unwrap();
        assert_eq!(est.rows, UNKNOWN_ROWS);
    }

    #[test]
    fn test_count_value_groups() {
        let cases = [
            ("INSERT INTO t VALUES (1)", 1),
            ("INSERT INTO t VALUES(1),(2)", 2),
            ("INSERT INTO t (value) VALUES (1), (2)", 2),
            ("INSERT INTO value (a) VALUES (1), (2)", 2),
            ("INSERT INTO `values` (a) VALUES (1), (2), (3)", 3),
            ("INSERT INTO app.value (a) VALUES (1), (2)", 2),
            ("REPLACE value (a) VALUE (1), (2)", 2),
            ("INSERT INTO t VALUES ('a(b', ')'), ('c')", 2),
            ("INSERT INTO t VALUES ('it''s', f(1, 2)), (2, 3)", 2),
            ("INSERT INTO t VALUES ('a\\'b'), ('c')", 2),
            (
                "INSERT INTO t (a) VALUES (1), (2) ON DUPLICATE KEY UPDATE a = VALUES(a)",
                2,
            ),
            ("INSERT INTO t SET a = 1", 0),
            ("INSERT INTO t SELECT 1", 0),
        ];
        for (sql, expected) in cases {
            assert_eq!(count_value_groups(sql), expected, "sql: {:?}", sql);
        }
    }

    #[test]
    fn test_coerce_row_count() {
        assert_eq!(coerce_row_count(&json!(42)).unwrap(), 42);
        assert_eq!(coerce_row_count(&json!(u64::MAX)).unwrap(), i64::MAX);
        assert_eq!(coerce_row_count(&json!(3.9)).unwrap(), 3);
        assert_eq!(coerce_row_count(&json!(" 17 ")).unwrap(), 17);
        assert_eq!(coerce_row_count(&json!("8.0")).unwrap(), 8);
        assert!(coerce_row_count(&json!("lots")).is_err());
        assert!(coerce_row_count(&json!(null)).is_err());
        assert!(coerce_row_count(&json!(true)).is_err());
    }

    #[test]
    fn test_update_count_query() {
        assert_eq!(
            update_count_query("UPDATE t SET a = 1 WHERE b = 2").as_deref(),
            Some("SELECT COUNT(*) AS count FROM t WHERE b = 2")
        );
        assert_eq!(
            update_count_query("UPDATE t SET note = 'NOWHERE' WHERE id IN (1, 2)\n").as_deref(),
            Some("SELECT COUNT(*) AS count FROM t WHERE id IN (1, 2)")
        );
        assert_eq!(update_count_query("UPDATE t"), None);
    }

    #[test]
    fn test_update_count_query_skips_quoted_and_nested_where() {
        assert_eq!(
            update_count_query("UPDATE t SET note = 'x WHERE y' WHERE id = 1").as_deref(),
            Some("SELECT COUNT(*) AS count FROM t WHERE id = 1")
        );
        assert_eq!(
            update_count_query("UPDATE t SET a = (SELECT MAX(b) FROM s WHERE s.c = 1)").as_deref(),
            Some("SELECT COUNT(*) AS count FROM t")
        );
        assert_eq!(
            update_count_query("UPDATE t SET a = 'it''s' WHERE `where` = 2").as_deref(),
            Some("SELECT COUNT(*) AS count FROM t WHERE `where` = 2")
        );
        assert_eq!(update_count_query("UPDATE t SET a = 'open WHERE id = 1"), None);
    }

    #[tokio::test]
    async fn test_update_with_quoted_where_counts_real_clause() {
        let db = MockDatabase::new().with_count(json!(1));
        let est = estimate_affected_rows(&db, "UPDATE t SET note = 'x WHERE y' WHERE id = 1")
            .await
            .unwrap();
        assert_eq!(est.rows, 1);
        assert_eq!(
            db.calls_starting_with("query:"),
            vec!["query:SELECT COUNT(*) AS count FROM t WHERE id = 1"]
        );
    }
}
