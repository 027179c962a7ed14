//! Scripted in-memory [`Database`] for unit tests.

use crate::db::{Database, Row};
use crate::error::{DbError, DbResult};
use serde_json::Value;
use std::sync::Mutex;

type QueryHandler = Box<dyn Fn(&str) -> DbResult<Vec<Row>> + Send + Sync>;

/// Records every call and answers from canned results.
pub struct MockDatabase {
    probe: Option<u64>,
    statement: Result<u64, String>,
    query: QueryHandler,
    tables: Vec<String>,
    calls: Mutex<Vec<String>>,
}

impl MockDatabase {
    pub fn new() -> Self {
        Self {
            probe: None,
            statement: Ok(0),
            query: Box::new(|_| Ok(Vec::new())),
            tables: Vec::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Make the rollback probe succeed with `rows`. Without this the probe fails.
    pub fn with_probe(mut self, rows: u64) -> Self {
        self.probe = Some(rows);
        self
    }

    pub fn with_statement_result(mut self, result: Result<u64, &str>) -> Self {
        self.statement = result.map_err(str::to_string);
        self
    }

    pub fn with_query<F>(mut self, handler: F) -> Self
    where
        F: Fn(&str) -> DbResult<Vec<Row>> + Send + Sync + 'static,
    {
        self.query = Box::new(handler);
        self
    }

    /// Answer every query with a single `count` row.
    pub fn with_count(self, count: Value) -> Self {
        self.with_query(move |_| Ok(vec![single_row("count", count.clone())]))
    }

    pub fn with_tables(mut self, tables: &[&str]) -> Self {
        self.tables = tables.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_starting_with(&self, prefix: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.starts_with(prefix))
            .collect()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

pub fn single_row(column: &str, value: Value) -> Row {
    let mut row = Row::new();
    row.insert(column.to_string(), value);
    row
}

impl Database for MockDatabase {
    async fn run_query(&self, sql: &str) -> DbResult<Vec<Row>> {
        self.record(format!("query:{}", sql));
        (self.query)(sql)
    }

    async fn run_in_rollback_only_transaction(&self, sql: &str) -> DbResult<u64> {
        self.record(format!("probe:{}", sql));
        self.probe
            .ok_or_else(|| DbError::database("probe refused", None, "mock"))
    }

    async fn run_statement(&self, sql: &str) -> DbResult<u64> {
        self.record(format!("exec:{}", sql));
        self.statement
            .clone()
            .map_err(|m| DbError::database(m, None, "mock"))
    }

    async fn list_tables(&self) -> DbResult<Vec<String>> {
        self.record("tables".to_string());
        Ok(self.tables.clone())
    }

    async fn describe_table(&self, table: &str) -> DbResult<Vec<Row>> {
        self.record(format!("describe:{}", table));
        if self.tables.iter().any(|t| t == table) {
            Ok(vec![single_row("Field", Value::String("id".into()))])
        } else {
            Err(DbError::database(
                format!("Table '{}' doesn't exist", table),
                Some("42S02".to_string()),
                "mock",
            ))
        }
    }
}
