//! MySQL-backed audit trail.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{MySql, MySqlPool, QueryBuilder};

use common::errors::{AppError, AppResult};
use common::models::{AuditRecord, ListAuditsQuery};

use super::{page_offset, store_err, AuditStore};

#[derive(sqlx::FromRow)]
struct AuditRow {
    id: u64,
    database_id: u64,
    user_id: u64,
    username: String,
    sql_text: String,
    duration_ms: u64,
    status: String,
    error_message: Option<String>,
    affected_rows: u64,
    client_ip: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<AuditRow> for AuditRecord {
    type Error = AppError;

    fn try_from(row: AuditRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: Some(row.id),
            database_id: row.database_id,
            user_id: row.user_id,
            username: row.username,
            sql: row.sql_text,
            duration_ms: row.duration_ms,
            status: row.status.parse().map_err(AppError::MetadataStore)?,
            error: row.error_message,
            affected_rows: row.affected_rows,
            client_ip: row.client_ip,
            created_at: row.created_at,
        })
    }
}

/// Audit records persisted in the `sql_audits` table.
pub struct MySqlAuditStore {
    pool: MySqlPool,
}

impl MySqlAuditStore {
    /// Creates the store, creating the `sql_audits` table if it is missing.
    pub async fn new(pool: MySqlPool) -> AppResult<Self> {
        let store = Self { pool };
        store.ensure_table().await?;
        Ok(store)
    }

    async fn ensure_table(&self) -> AppResult<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS `sql_audits` (
                `id`            BIGINT UNSIGNED NOT NULL AUTO_INCREMENT,
                `database_id`   BIGINT UNSIGNED NOT NULL,
                `user_id`       BIGINT UNSIGNED NOT NULL,
                `username`      VARCHAR(50)     NOT NULL,
                `sql_text`      MEDIUMTEXT      NOT NULL,
                `duration_ms`   BIGINT UNSIGNED NOT NULL DEFAULT 0,
                `status`        VARCHAR(10)     NOT NULL,
                `error_message` MEDIUMTEXT      DEFAULT NULL,
                `affected_rows` BIGINT UNSIGNED NOT NULL DEFAULT 0,
                `client_ip`     VARCHAR(64)     NOT NULL,
                `created_at`    DATETIME(3)     NOT NULL,
                PRIMARY KEY (`id`),
                KEY `idx_database_id` (`database_id`),
                KEY `idx_created_at` (`created_at`)
            ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci",
        )
        .execute(&self.pool)
        .await
        .map_err(store_err("failed to create sql_audits table"))?;

        tracing::info!("Metadata table `sql_audits` ensured");
        Ok(())
    }
}

fn push_filters(qb: &mut QueryBuilder<'_, MySql>, query: &ListAuditsQuery) {
    qb.push(" WHERE 1 = 1");
    if let Some(database_id) = query.database_id {
        qb.push(" AND `database_id` = ").push_bind(database_id);
    }
    if let Some(status) = query.status {
        qb.push(" AND `status` = ").push_bind(status.as_str());
    }
}

#[async_trait]
impl AuditStore for MySqlAuditStore {
    async fn append(&self, record: &AuditRecord) -> AppResult<u64> {
        let result = sqlx::query(
            "INSERT INTO `sql_audits` (`database_id`, `user_id`, `username`, `sql_text`, `duration_ms`, `status`, `error_message`, `affected_rows`, `client_ip`, `created_at`)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(record.database_id)
        .bind(record.user_id)
        .bind(&record.username)
        .bind(&record.sql)
        .bind(record.duration_ms)
        .bind(record.status.as_str())
        .bind(&record.error)
        .bind(record.affected_rows)
        .bind(&record.client_ip)
        .bind(record.created_at)
        .execute(&self.pool)
        .await
        .map_err(store_err("failed to save audit record"))?;

        Ok(result.last_insert_id())
    }

    async fn list(&self, query: &ListAuditsQuery) -> AppResult<(Vec<AuditRecord>, u64)> {
        let mut count = QueryBuilder::<MySql>::new("SELECT COUNT(*) FROM `sql_audits`");
        push_filters(&mut count, query);
        let total: i64 = count
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await
            .map_err(store_err("failed to count audit records"))?;

        let mut select = QueryBuilder::<MySql>::new(
            "SELECT `id`, `database_id`, `user_id`, `username`, `sql_text`, `duration_ms`, `status`, \
             `error_message`, `affected_rows`, `client_ip`, `created_at` FROM `sql_audits`",
        );
        push_filters(&mut select, query);
        select
            .push(" ORDER BY `id` DESC LIMIT ")
            .push_bind(u64::from(query.page_size))
            .push(" OFFSET ")
            .push_bind(page_offset(query.page, query.page_size));

        let rows = select
            .build_query_as::<AuditRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(store_err("failed to list audit records"))?;

        let records = rows
            .into_iter()
            .map(AuditRecord::try_from)
            .collect::<AppResult<Vec<_>>>()?;

        Ok((records, total.max(0) as u64))
    }
}
