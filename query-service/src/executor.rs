//! Query executor.
//!
//! Every statement goes through sanitize, classify, acquire and run. Each
//! attempt that reaches the risk check leaves exactly one audit record,
//! whatever the outcome.

use std::sync::Arc;
use std::time::Instant;

use common::errors::{AppError, AppResult};
use common::models::{Actor, AuditRecord, ColumnDescriptor, QueryResult, TableInfo};
use common::utils::{RiskAnalyzer, SqlSanitizer};

use crate::registry::ConnectionRegistry;
use crate::store::AuditStore;

/// Runs ad-hoc SQL against registered databases.
pub struct QueryExecutor {
    registry: Arc<ConnectionRegistry>,
    audits: Arc<dyn AuditStore>,
}

impl QueryExecutor {
    pub fn new(registry: Arc<ConnectionRegistry>, audits: Arc<dyn AuditStore>) -> Self {
        Self { registry, audits }
    }

    /// Executes one statement on behalf of `actor`.
    ///
    /// High-risk statements are rejected before any connection is acquired.
    pub async fn execute(
        &self,
        database_id: u64,
        sql: &str,
        actor: &Actor,
    ) -> AppResult<QueryResult> {
        let sql = SqlSanitizer::sanitize(sql);
        if sql.is_empty() {
            return Err(AppError::Validation(
                "SQL statement is empty after removing comments".into(),
            ));
        }

        let attempt = AuditRecord::attempt(database_id, actor, &sql);

        let verdict = RiskAnalyzer::analyze(&sql);
        if verdict.is_blocked() {
            let err = AppError::RiskRejected {
                description: verdict.description,
                suggestion: verdict.suggestion,
            };
            tracing::warn!(
                database_id,
                user_id = actor.user_id,
                error = %err,
                "High risk SQL rejected"
            );
            self.record(attempt.failed(&err, 0)).await;
            return Err(err);
        }

        let handle = match self.registry.get(database_id).await {
            Ok(handle) => handle,
            Err(err) => {
                self.record(attempt.failed(&err, 0)).await;
                return Err(err);
            }
        };

        let start = Instant::now();
        let outcome = handle.fetch(&sql).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(mut result) => {
                result.execution_time_ms = duration_ms;
                tracing::info!(
                    database_id,
                    user_id = actor.user_id,
                    rows = result.row_count,
                    duration_ms,
                    "Query executed"
                );
                self.record(attempt.succeeded(result.row_count as u64, duration_ms))
                    .await;
                Ok(result)
            }
            Err(err) => {
                tracing::warn!(database_id, duration_ms, error = %err, "Query failed");
                self.record(attempt.failed(&err, duration_ms)).await;
                Err(err)
            }
        }
    }

    /// Tables of a registered database. Not risk checked, not audited.
    pub async fn list_tables(&self, database_id: u64) -> AppResult<Vec<TableInfo>> {
        let handle = self.registry.get(database_id).await?;
        handle.list_tables().await
    }

    /// Column descriptors of one table. Not risk checked, not audited.
    pub async fn list_table_schema(
        &self,
        database_id: u64,
        table_name: &str,
    ) -> AppResult<Vec<ColumnDescriptor>> {
        let handle = self.registry.get(database_id).await?;
        handle.list_columns(table_name).await
    }

    /// Audit write failures are logged and never fail the query.
    async fn record(&self, record: AuditRecord) {
        if let Err(e) = self.audits.append(&record).await {
            tracing::error!(
                database_id = record.database_id,
                status = %record.status,
                error = %e,
                "Failed to write audit record"
            );
        }
    }
}
