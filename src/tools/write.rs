//! Write operation tool.
//!
//! This module implements the `execute` MCP tool. Every mutation goes
//! through two calls: a dry run that estimates the impact and issues a
//! confirmation token, then a confirmed call that redeems the token and
//! runs the statement for real.

use crate::db::Database;
use crate::error::{ConfirmationError, DbError, DbResult};
use crate::session::confirmation::{ConfirmationStore, PendingMutation};
use crate::sql::{OperationKind, classify_operation, estimate_affected_rows, is_read_statement};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Estimates above this many rows get a `large` warning.
pub const LARGE_OPERATION_ROWS: i64 = 1000;

/// Input for the execute tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ExecuteInput {
    /// SQL statement to execute (INSERT, UPDATE, DELETE, REPLACE, or DDL like CREATE/DROP/ALTER/TRUNCATE)
    pub sql: String,
    /// Preview the operation without executing it. Default: true
    #[serde(default)]
    pub dry_run: Option<bool>,
    /// Token returned by the dry run. Required when dry_run is false
    #[serde(default)]
    pub confirm_token: Option<String>,
}

/// Severity of a previewed mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum WarningTier {
    None,
    /// More than 1000 rows
    Large,
    /// The estimate is unknown
    Unknown,
    /// DROP or TRUNCATE
    Critical,
}

impl WarningTier {
    pub fn classify(operation: OperationKind, estimated_rows: i64) -> Self {
        if operation.is_critical() {
            Self::Critical
        } else if estimated_rows < 0 {
            Self::Unknown
        } else if estimated_rows > LARGE_OPERATION_ROWS {
            Self::Large
        } else {
            Self::None
        }
    }

    /// Headline and detail shown to the user.
    fn message(&self, operation: OperationKind, estimated_rows: i64) -> Option<(String, String)> {
        match self {
            Self::None => None,
            Self::Large => Some((
                format!("WARNING: This operation will affect {} rows", estimated_rows),
                "This is a large number of rows. Please ensure this is intentional.".to_string(),
            )),
            Self::Unknown => Some((
                "WARNING: Unable to estimate affected rows for this operation".to_string(),
                format!(
                    "Operation type: {} - This operation may affect the entire table or database structure.",
                    operation
                ),
            )),
            Self::Critical if operation == OperationKind::Truncate => Some((
                "CRITICAL: TRUNCATE will delete ALL rows from the table".to_string(),
                "This operation cannot be rolled back and resets AUTO_INCREMENT.".to_string(),
            )),
            Self::Critical => Some((
                format!(
                    "CRITICAL: {} operation will permanently delete database objects",
                    operation
                ),
                "This operation cannot be undone. All data will be permanently lost.".to_string(),
            )),
        }
    }
}

/// Output from the execute tool.
///
/// Dry runs fill the preview fields; confirmed executions fill
/// `rows_affected` and, when the estimate was off, `estimate_note`.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct ExecuteOutput {
    /// True when nothing was executed
    pub dry_run: bool,
    /// Leading statement keyword
    pub operation: OperationKind,
    /// Human-readable summary of the result
    pub summary: String,
    /// Estimated affected rows; -1 when unknown
    pub estimated_rows: i64,
    /// True when the estimate came from a rolled-back execution
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_exact_count: Option<bool>,
    /// none, large, unknown or critical
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning_tier: Option<WarningTier>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning_detail: Option<String>,
    /// DROP, TRUNCATE or ALTER
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_dangerous_operation: Option<bool>,
    /// Pass this with dry_run=false to execute the previewed statement
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirm_token: Option<String>,
    /// Seconds until the token expires
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in_secs: Option<u64>,
    /// Token expiry as RFC 3339
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requires_user_confirmation: Option<bool>,
    /// Question to put to the user before executing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmation_prompt: Option<String>,
    /// Steps the assistant must follow before confirming
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_instruction: Option<String>,
    /// Rows actually affected by the executed statement
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows_affected: Option<u64>,
    /// Set when the actual count differs from a known estimate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimate_note: Option<String>,
    /// Execution time in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_time_ms: Option<u64>,
}

pub struct WriteToolHandler<D> {
    db: Arc<D>,
    confirmations: Arc<ConfirmationStore>,
}

impl<D: Database> WriteToolHandler<D> {
    pub fn new(db: Arc<D>, confirmations: Arc<ConfirmationStore>) -> Self {
        Self { db, confirmations }
    }

    pub async fn execute(&self, input: ExecuteInput) -> DbResult<ExecuteOutput> {
        let sql = input.sql.as_str();
        if sql.trim().is_empty() {
            return Err(DbError::invalid_input("SQL parameter is required"));
        }

        if is_read_statement(sql) {
            return Err(DbError::wrong_tool(
                "SELECT queries should use the 'query' tool instead. Use the 'query' tool for SELECT statements.",
                "query",
            ));
        }

        if input.dry_run.unwrap_or(true) {
            return self.dry_run(sql).await;
        }

        let token = input
            .confirm_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(ConfirmationError::MissingToken)?;
        self.confirmed(sql, token).await
    }

    async fn dry_run(&self, sql: &str) -> DbResult<ExecuteOutput> {
        let operation = classify_operation(sql);
        let estimate = estimate_affected_rows(self.db.as_ref(), sql)
            .await
            .map_err(|e| DbError::estimation(e.to_string()))?;

        let pending = self.confirmations.issue(sql, estimate, operation).await;
        Ok(self.preview(pending))
    }

    fn preview(&self, pending: PendingMutation) -> ExecuteOutput {
        let operation = pending.operation;
        let rows = pending.estimated_rows;
        let tier = WarningTier::classify(operation, rows);
        let (warning, warning_detail) = tier.message(operation, rows).unzip();
        let is_dangerous = matches!(
            operation,
            OperationKind::Drop | OperationKind::Truncate | OperationKind::Alter
        );

        let rows_text = if pending.is_exact_count {
            format!("{} (exact count using transaction rollback)", rows)
        } else if rows < 0 {
            "cannot be determined".to_string()
        } else {
            format!("{} (estimated)", rows)
        };

        let prompt = if is_dangerous {
            format!(
                "This is a DANGEROUS {} operation. Are you ABSOLUTELY SURE you want to proceed? Please type 'yes' to confirm.",
                operation
            )
        } else if rows < 0 {
            format!(
                "Do you want to proceed with this {} operation? The number of affected rows is unknown.",
                operation
            )
        } else {
            format!(
                "Do you want to proceed with this {} operation that will affect {} rows?",
                operation, rows
            )
        };

        let mut instruction = format!(
            "IMPORTANT: Before executing this query, you MUST:\n\
             1. Show the user this dry-run result: {} operation, affected rows: {}\n\
             2. Ask the user explicitly: \"{}\"\n\
             3. Only proceed with execution if the user clearly confirms (yes, proceed, confirm, etc.)\n\
             4. If the user declines or is unsure, do not execute the query",
            operation, rows_text, prompt
        );
        if let Some(w) = &warning {
            instruction.push_str(&format!("\n5. Emphasize the warning: {}", w));
        }
        if is_dangerous {
            instruction.push_str(
                "\n6. For dangerous operations, require an explicit 'yes' confirmation\
                 \n7. Remind the user this operation cannot be undone",
            );
        }

        let ttl = self.confirmations.ttl();
        let expires_at = chrono::Utc::now()
            + chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::zero());

        let summary = format!(
            "DRY RUN RESULT - Operation: {}. Affected rows: {}. To execute after user confirmation, \
             call the execute tool with dry_run=false and confirm_token='{}'",
            operation, rows_text, pending.token
        );

        ExecuteOutput {
            dry_run: true,
            operation,
            summary,
            estimated_rows: rows,
            is_exact_count: Some(pending.is_exact_count),
            warning_tier: Some(tier),
            warning,
            warning_detail,
            is_dangerous_operation: Some(is_dangerous),
            confirm_token: Some(pending.token),
            expires_in_secs: Some(ttl.as_secs()),
            expires_at: Some(expires_at.to_rfc3339()),
            requires_user_confirmation: Some(true),
            confirmation_prompt: Some(prompt),
            ai_instruction: Some(instruction),
            rows_affected: None,
            estimate_note: None,
            execution_time_ms: None,
        }
    }

    async fn confirmed(&self, sql: &str, token: &str) -> DbResult<ExecuteOutput> {
        // The token is consumed here, before execution, so a failed
        // statement cannot be retried with it.
        let pending = self.confirmations.redeem(token, sql).await?;

        let start = Instant::now();
        let rows_affected = match self.db.run_statement(sql).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!(token = %token, operation = %pending.operation, error = %e, "Confirmed statement failed");
                return Err(DbError::execution(e.to_string()));
            }
        };
        let execution_time_ms = start.elapsed().as_millis() as u64;

        info!(
            token = %token,
            operation = %pending.operation,
            estimated_rows = pending.estimated_rows,
            rows_affected,
            execution_time_ms,
            "Confirmed statement executed"
        );

        Ok(ExecuteOutput {
            dry_run: false,
            operation: pending.operation,
            summary: format!(
                "{} operation completed successfully. Rows affected: {}",
                pending.operation, rows_affected
            ),
            estimated_rows: pending.estimated_rows,
            is_exact_count: None,
            warning_tier: None,
            warning: None,
            warning_detail: None,
            is_dangerous_operation: None,
            confirm_token: None,
            expires_in_secs: None,
            expires_at: None,
            requires_user_confirmation: None,
            confirmation_prompt: None,
            ai_instruction: None,
            rows_affected: Some(rows_affected),
            estimate_note: estimate_note(pending.estimated_rows, rows_affected),
            execution_time_ms: Some(execution_time_ms),
        })
    }
}

/// Note comparing the actual count against a known estimate.
pub fn estimate_note(estimated: i64, actual: u64) -> Option<String> {
    if estimated < 0 {
        return None;
    }
    let actual = i64::try_from(actual).unwrap_or(i64::MAX);
    match actual.cmp(&estimated) {
        std::cmp::Ordering::Equal => None,
        std::cmp::Ordering::Greater => Some(format!(
            "Actual affected rows ({}) exceeded estimate ({}) by {} rows",
            actual,
            estimated,
            actual - estimated
        )),
        std::cmp::Ordering::Less => Some(format!(
            "Actual affected rows ({}) were less than estimate ({})",
            actual, estimated
        )),
    }
}
