//! MySQL driver.

use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::mysql::{MySqlConnectOptions, MySqlPoolOptions, MySqlRow, MySqlSslMode};
use sqlx::{Column, MySqlPool, Row, TypeInfo};

use common::errors::{AppError, AppResult};
use common::models::{
    CellValue, ColumnDescriptor, ConnectionParams, EngineKind, QueryResult, TableInfo,
};

use super::{ConnectionHandle, EngineDriver, PoolLimits};

const LIST_TABLES: &str = "SELECT CAST(TABLE_NAME AS CHAR) AS name, \
        CAST(IFNULL(TABLE_COMMENT, '') AS CHAR) AS comment \
    FROM information_schema.TABLES \
    WHERE TABLE_SCHEMA = ? \
    ORDER BY TABLE_NAME";

const LIST_COLUMNS: &str = "SELECT CAST(COLUMN_NAME AS CHAR) AS name, \
        CAST(DATA_TYPE AS CHAR) AS data_type, \
        CAST(IFNULL(CHARACTER_MAXIMUM_LENGTH, IFNULL(NUMERIC_PRECISION, 0)) AS SIGNED) AS length, \
        CAST(IS_NULLABLE = 'YES' AS SIGNED) AS nullable, \
        CAST(COLUMN_KEY = 'PRI' AS SIGNED) AS is_primary_key, \
        CAST(EXTRA LIKE '%auto_increment%' AS SIGNED) AS is_auto_increment, \
        CAST(COLUMN_DEFAULT AS CHAR) AS default_value, \
        CAST(IFNULL(COLUMN_COMMENT, '') AS CHAR) AS comment \
    FROM information_schema.COLUMNS \
    WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ? \
    ORDER BY ORDINAL_POSITION";

/// Opens MySQL pools with `utf8mb4`, the server's session time zone and TLS
/// disabled.
pub struct MySqlDriver;

impl MySqlDriver {
    fn connect_options(params: &ConnectionParams) -> MySqlConnectOptions {
        MySqlConnectOptions::new()
            .host(&params.host)
            .port(params.port)
            .username(&params.username)
            .password(&params.password)
            .database(&params.database)
            .charset("utf8mb4")
            .timezone(None::<String>)
            .ssl_mode(MySqlSslMode::Disabled)
    }
}

#[async_trait]
impl EngineDriver for MySqlDriver {
    fn kind(&self) -> EngineKind {
        EngineKind::MySQL
    }

    fn dsn(&self, params: &ConnectionParams) -> String {
        format!(
            "mysql://{}:***@{}:{}/{}?charset=utf8mb4",
            params.username, params.host, params.port, params.database
        )
    }

    async fn open(
        &self,
        params: &ConnectionParams,
        limits: &PoolLimits,
    ) -> AppResult<Arc<dyn ConnectionHandle>> {
        let pool = MySqlPoolOptions::new()
            .max_connections(limits.max_connections)
            .acquire_timeout(limits.connect_timeout)
            .idle_timeout(Some(limits.idle_timeout))
            .connect_with(Self::connect_options(params))
            .await
            .map_err(|e| AppError::DatabaseConnection(e.to_string()))?;

        tracing::debug!(dsn = %self.dsn(params), "MySQL pool opened");
        Ok(Arc::new(MySqlHandle {
            pool,
            schema: params.database.clone(),
        }))
    }

    fn list_tables_query(&self) -> &'static str {
        LIST_TABLES
    }

    fn list_columns_query(&self) -> &'static str {
        LIST_COLUMNS
    }
}

/// Pooled MySQL connection bound to one schema.
pub struct MySqlHandle {
    pool: MySqlPool,
    schema: String,
}

#[derive(sqlx::FromRow)]
struct ColumnRow {
    name: String,
    data_type: String,
    length: i64,
    nullable: i64,
    is_primary_key: i64,
    is_auto_increment: i64,
    default_value: Option<String>,
    comment: String,
}

impl From<ColumnRow> for ColumnDescriptor {
    fn from(row: ColumnRow) -> Self {
        Self {
            name: row.name,
            data_type: row.data_type,
            length: row.length,
            nullable: row.nullable != 0,
            is_primary_key: row.is_primary_key != 0,
            is_auto_increment: row.is_auto_increment != 0,
            default_value: row.default_value.unwrap_or_default(),
            comment: row.comment,
        }
    }
}

#[async_trait]
impl ConnectionHandle for MySqlHandle {
    fn engine(&self) -> EngineKind {
        EngineKind::MySQL
    }

    async fn fetch(&self, sql: &str) -> AppResult<QueryResult> {
        let rows = sqlx::query(sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::QueryExecution(e.to_string()))?;

        // No rows, no column names.
        let columns = rows
            .first()
            .map(|row| {
                row.columns()
                    .iter()
                    .map(|col| col.name().to_string())
                    .collect()
            })
            .unwrap_or_default();

        let rows = rows
            .iter()
            .map(|row| (0..row.len()).map(|idx| extract_value(row, idx)).collect())
            .collect();

        Ok(QueryResult::new(columns, rows))
    }

    async fn list_tables(&self) -> AppResult<Vec<TableInfo>> {
        let rows: Vec<(String, String)> = sqlx::query_as(MySqlDriver.list_tables_query())
            .bind(&self.schema)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::QueryExecution(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|(name, comment)| TableInfo { name, comment })
            .collect())
    }

    async fn list_columns(&self, table: &str) -> AppResult<Vec<ColumnDescriptor>> {
        let rows: Vec<ColumnRow> = sqlx::query_as(MySqlDriver.list_columns_query())
            .bind(&self.schema)
            .bind(table)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::QueryExecution(e.to_string()))?;

        Ok(rows.into_iter().map(ColumnDescriptor::from).collect())
    }

    async fn ping(&self) -> AppResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseConnection(e.to_string()))?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

/// Converts one MySQL column value into a [`CellValue`].
///
/// Unsigned types are tried first so that `BIGINT UNSIGNED` is not rejected by
/// the signed decoders.
fn extract_value(row: &MySqlRow, idx: usize) -> CellValue {
    if let Ok(v) = row.try_get::<Option<u64>, _>(idx) {
        return v
            .map(|u| match i64::try_from(u) {
                Ok(i) => CellValue::Integer(i),
                Err(_) => CellValue::Text(u.to_string()),
            })
            .into();
    }
    if let Ok(v) = row.try_get::<Option<i64>, _>(idx) {
        return v.into();
    }
    if let Ok(v) = row.try_get::<Option<i32>, _>(idx) {
        return v.map(i64::from).into();
    }
    if let Ok(v) = row.try_get::<Option<u32>, _>(idx) {
        return v.map(i64::from).into();
    }
    if let Ok(v) = row.try_get::<Option<i16>, _>(idx) {
        return v.map(i64::from).into();
    }
    if let Ok(v) = row.try_get::<Option<u16>, _>(idx) {
        return v.map(i64::from).into();
    }
    if let Ok(v) = row.try_get::<Option<i8>, _>(idx) {
        return v.map(i64::from).into();
    }
    if let Ok(v) = row.try_get::<Option<u8>, _>(idx) {
        return v.map(i64::from).into();
    }
    if let Ok(v) = row.try_get::<Option<bool>, _>(idx) {
        return v.into();
    }
    if let Ok(v) = row.try_get::<Option<f64>, _>(idx) {
        return v.map(float_cell).into();
    }
    if let Ok(v) = row.try_get::<Option<f32>, _>(idx) {
        return v.map(|f| float_cell(f64::from(f))).into();
    }
    if let Ok(v) = row.try_get::<Option<Decimal>, _>(idx) {
        return v.map(|d| d.to_string()).into();
    }
    if let Ok(v) = row.try_get::<Option<String>, _>(idx) {
        return v.into();
    }
    if let Ok(v) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(idx) {
        return v.map(|dt| dt.to_rfc3339()).into();
    }
    if let Ok(v) = row.try_get::<Option<chrono::NaiveDateTime>, _>(idx) {
        return v
            .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
            .into();
    }
    if let Ok(v) = row.try_get::<Option<chrono::NaiveDate>, _>(idx) {
        return v.map(|d| d.format("%Y-%m-%d").to_string()).into();
    }
    if let Ok(v) = row.try_get::<Option<chrono::NaiveTime>, _>(idx) {
        return v.map(|t| t.format("%H:%M:%S").to_string()).into();
    }
    if let Ok(v) = row.try_get::<Option<Vec<u8>>, _>(idx) {
        return v.map(|b| CellValue::from_bytes(&b)).into();
    }
    if let Ok(v) = row.try_get::<Option<serde_json::Value>, _>(idx) {
        return v.map(|j| j.to_string()).into();
    }

    // out-of-range DECIMAL, BIT, GEOMETRY and the like: render the wire bytes
    match row.try_get_unchecked::<Option<Vec<u8>>, _>(idx) {
        Ok(bytes) => {
            tracing::debug!(
                column = idx,
                r#type = row.column(idx).type_info().name(),
                "no typed decoder for MySQL value, rendering raw bytes"
            );
            raw_cell(bytes.as_deref())
        }
        Err(e) => {
            tracing::debug!(
                column = idx,
                r#type = row.column(idx).type_info().name(),
                error = %e,
                "undecodable MySQL value, returning null"
            );
            CellValue::Null
        }
    }
}

/// Renders a value no typed decoder accepted. Only SQL NULL maps to null.
pub(crate) fn raw_cell(bytes: Option<&[u8]>) -> CellValue {
    bytes.map_or(CellValue::Null, CellValue::from_bytes)
}

pub(crate) fn float_cell(f: f64) -> CellValue {
    if f.is_finite() {
        CellValue::Float(f)
    } else {
        CellValue::Text(f.to_string())
    }
}
