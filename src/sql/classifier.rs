//! Lexical statement classification.
//!
//! Decides which tool a statement belongs to by looking at its first keyword
//! after leading whitespace and comments. This is not a parser:
//! statements hidden behind `CALL` or later statements of a batch are not
//! inspected.

use schemars::JsonSchema;
use serde::Serialize;
use std::fmt;

/// Mutation keyword a statement starts with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, JsonSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum OperationKind {
    Insert,
    Update,
    Delete,
    Create,
    Drop,
    Alter,
    Truncate,
    Replace,
    Unknown,
}

impl OperationKind {
    /// Recognized mutation keywords, in match order.
    const KEYWORDS: [(&'static str, OperationKind); 8] = [
        ("INSERT", OperationKind::Insert),
        ("UPDATE", OperationKind::Update),
        ("DELETE", OperationKind::Delete),
        ("CREATE", OperationKind::Create),
        ("DROP", OperationKind::Drop),
        ("ALTER", OperationKind::Alter),
        ("TRUNCATE", OperationKind::Truncate),
        ("REPLACE", OperationKind::Replace),
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::Create => "CREATE",
            Self::Drop => "DROP",
            Self::Alter => "ALTER",
            Self::Truncate => "TRUNCATE",
            Self::Replace => "REPLACE",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// DROP and TRUNCATE destroy data without any way back.
    pub fn is_critical(&self) -> bool {
        matches!(self, Self::Drop | Self::Truncate)
    }

    /// Data-definition statements (as opposed to DML).
    pub fn is_ddl(&self) -> bool {
        matches!(
            self,
            Self::Create | Self::Drop | Self::Alter | Self::Truncate
        )
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Leading keywords of statements MySQL cannot roll back, or that end the
/// surrounding transaction themselves.
const NON_TRANSACTIONAL_KEYWORDS: &[&str] = &[
    "CREATE", "DROP", "ALTER", "TRUNCATE", "ANALYZE", "CHECK", "OPTIMIZE", "REPAIR", "LOCK",
    "UNLOCK", "SET", "START", "COMMIT", "ROLLBACK",
];

/// Strip leading whitespace and any number of leading comments.
///
/// Handles `-- ...`, `# ...` (MySQL) and `/* ... */`. An unterminated block
/// comment swallows the rest of the text.
pub fn strip_leading_comments(sql: &str) -> &str {
    let mut rest = sql.trim_start();
    loop {
        if rest.starts_with("--") || rest.starts_with('#') {
            rest = match rest.find('\n') {
                Some(idx) => rest[idx + 1..].trim_start(),
                None => "",
            };
        } else if let Some(body) = rest.strip_prefix("/*") {
            rest = match body.find("*/") {
                Some(idx) => body[idx + 2..].trim_start(),
                None => "",
            };
        } else {
            return rest;
        }
    }
}

/// First keyword of the statement, upper-cased. Empty when there is none.
pub fn first_keyword(sql: &str) -> String {
    strip_leading_comments(sql)
        .chars()
        .take_while(|c| c.is_ascii_alphabetic() || *c == '_')
        .collect::<String>()
        .to_ascii_uppercase()
}

/// True when the statement is a SELECT.
pub fn is_read_statement(sql: &str) -> bool {
    first_keyword(sql) == "SELECT"
}

/// Classify the mutation keyword the statement begins with.
pub fn classify_operation(sql: &str) -> OperationKind {
    let keyword = first_keyword(sql);
    OperationKind::KEYWORDS
        .iter()
        .find(|(name, _)| *name == keyword)
        .map(|(_, kind)| *kind)
        .unwrap_or(OperationKind::Unknown)
}

/// True when the statement can be executed inside a transaction and rolled
/// back without leaving side effects.
pub fn is_transactional(sql: &str) -> bool {
    let keyword = first_keyword(sql);
    !keyword.is_empty() && !NON_TRANSACTIONAL_KEYWORDS.contains(&keyword.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_read_statement() {
        let cases = [
            ("SELECT * FROM users", true),
            ("SELECT id, name FROM users WHERE age > 18", true),
            ("select * from users", true),
            ("   SELECT * FROM users", true),
            ("-- This is a comment\nSELECT * FROM users", true),
            ("/* hint */ SELECT 1", true),
            ("UPDATE users SET name = 'John'", false),
            ("DELETE FROM users WHERE id = 1", false),
            ("INSERT INTO users (name) VALUES ('John')", false),
            ("DROP TABLE users", false),
            ("SELECTED", false),
            ("", false),
        ];
        for (sql, expected) in cases {
            assert_eq!(is_read_statement(sql), expected, "sql: {:?}", sql);
        }
    }

    #[test]
    fn test_classify_operation() {
        let cases = [
            ("INSERT INTO users (name) VALUES ('John')", OperationKind::Insert),
            ("UPDATE users SET name = 'John'", OperationKind::Update),
            ("DELETE FROM users WHERE id = 1", OperationKind::Delete),
            ("CREATE TABLE users (id INT)", OperationKind::Create),
            ("DROP TABLE users", OperationKind::Drop),
            ("ALTER TABLE users ADD COLUMN age INT", OperationKind::Alter),
            ("TRUNCATE TABLE users", OperationKind::Truncate),
            ("REPLACE INTO users VALUES (1)", OperationKind::Replace),
            ("SELECT * FROM users", OperationKind::Unknown),
            ("CALL cleanup()", OperationKind::Unknown),
            ("update users set name = 'John'", OperationKind::Update),
        ];
        for (sql, expected) in cases {
            assert_eq!(classify_operation(sql), expected, "sql: {:?}", sql);
        }
    }

    #[test]
    fn test_classify_ignores_leading_comments() {
        assert_eq!(
            classify_operation("  -- note\nupdate t set x=1"),
            OperationKind::Update
        );
        assert_eq!(
            classify_operation("/* a */ /* b */\n# c\n  DeLeTe FROM t"),
            OperationKind::Delete
        );
        assert_eq!(classify_operation("-- only a comment"), OperationKind::Unknown);
        assert_eq!(classify_operation("/* unterminated DROP"), OperationKind::Unknown);
    }

    #[test]
    fn test_keyword_prefix_is_not_enough() {
        // "UPDATED" is an identifier, not the UPDATE keyword
        assert_eq!(classify_operation("UPDATED"), OperationKind::Unknown);
        assert_eq!(classify_operation("INSERTS"), OperationKind::Unknown);
    }

    #[test]
    fn test_is_transactional() {
        assert!(is_transactional("DELETE FROM orders"));
        assert!(is_transactional("update t set x = 1"));
        assert!(is_transactional("INSERT INTO t VALUES (1)"));
        assert!(is_transactional("REPLACE INTO t VALUES (1)"));
        assert!(!is_transactional("DROP TABLE t"));
        assert!(!is_transactional("truncate t"));
        assert!(!is_transactional("CREATE INDEX i ON t (x)"));
        assert!(!is_transactional("-- c\nALTER TABLE t ADD y INT"));
        assert!(!is_transactional("SET autocommit = 0"));
        assert!(!is_transactional("LOCK TABLES t WRITE"));
        assert!(!is_transactional(""));
    }

    #[test]
    fn test_critical_and_ddl() {
        assert!(OperationKind::Drop.is_critical());
        assert!(OperationKind::Truncate.is_critical());
        assert!(!OperationKind::Alter.is_critical());
        assert!(OperationKind::Alter.is_ddl());
        assert!(!OperationKind::Delete.is_ddl());
    }

    #[test]
    fn test_operation_serializes_uppercase() {
        assert_eq!(
            serde_json::to_string(&OperationKind::Truncate).unwrap(),
            "\"TRUNCATE\""
        );
        assert_eq!(OperationKind::Unknown.to_string(), "UNKNOWN");
    }
}
