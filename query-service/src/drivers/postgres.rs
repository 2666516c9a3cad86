//! PostgreSQL driver.

use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgRow, PgSslMode};
use sqlx::{Column, PgPool, Row, TypeInfo, ValueRef};
use uuid::Uuid;

use common::errors::{AppError, AppResult};
use common::models::{
    CellValue, ColumnDescriptor, ConnectionParams, EngineKind, QueryResult, TableInfo,
};

use super::mysql::{float_cell, raw_cell};
use super::{ConnectionHandle, EngineDriver, PoolLimits};

const LIST_TABLES: &str = "SELECT tablename::text AS name, \
        COALESCE(obj_description((quote_ident(schemaname) || '.' || quote_ident(tablename))::regclass, 'pg_class'), '') AS comment \
    FROM pg_catalog.pg_tables \
    WHERE schemaname = 'public' \
    ORDER BY tablename";

const LIST_COLUMNS: &str = "SELECT a.attname::text AS name, \
        format_type(a.atttypid, a.atttypmod) AS data_type, \
        (CASE WHEN a.atttypmod > 0 THEN a.atttypmod - 4 ELSE a.attlen END)::bigint AS length, \
        NOT a.attnotnull AS nullable, \
        COALESCE(pk.contype = 'p', false) AS is_primary_key, \
        a.attidentity != '' AS is_auto_increment, \
        pg_get_expr(ad.adbin, ad.adrelid) AS default_value, \
        COALESCE(col_description(a.attrelid, a.attnum), '') AS comment \
    FROM pg_attribute a \
    LEFT JOIN pg_attrdef ad ON a.attrelid = ad.adrelid AND a.attnum = ad.adnum \
    LEFT JOIN pg_constraint pk ON pk.conrelid = a.attrelid AND pk.conkey[1] = a.attnum AND pk.contype = 'p' \
    WHERE a.attrelid = (quote_ident('public') || '.' || quote_ident($1))::regclass \
        AND a.attnum > 0 \
        AND NOT a.attisdropped \
    ORDER BY a.attnum";

/// Opens PostgreSQL pools with `sslmode=disable`.
pub struct PostgresDriver;

impl PostgresDriver {
    fn connect_options(params: &ConnectionParams) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&params.host)
            .port(params.port)
            .username(&params.username)
            .password(&params.password)
            .database(&params.database)
            .ssl_mode(PgSslMode::Disable)
    }
}

#[async_trait]
impl EngineDriver for PostgresDriver {
    fn kind(&self) -> EngineKind {
        EngineKind::PostgreSQL
    }

    fn dsn(&self, params: &ConnectionParams) -> String {
        format!(
            "host={} port={} user={} password=*** dbname={} sslmode=disable",
            params.host, params.port, params.username, params.database
        )
    }

    async fn open(
        &self,
        params: &ConnectionParams,
        limits: &PoolLimits,
    ) -> AppResult<Arc<dyn ConnectionHandle>> {
        let pool = PgPoolOptions::new()
            .max_connections(limits.max_connections)
            .acquire_timeout(limits.connect_timeout)
            .idle_timeout(Some(limits.idle_timeout))
            .connect_with(Self::connect_options(params))
            .await
            .map_err(|e| AppError::DatabaseConnection(e.to_string()))?;

        tracing::debug!(dsn = %self.dsn(params), "PostgreSQL pool opened");
        Ok(Arc::new(PostgresHandle { pool }))
    }

    fn list_tables_query(&self) -> &'static str {
        LIST_TABLES
    }

    fn list_columns_query(&self) -> &'static str {
        LIST_COLUMNS
    }
}

pub struct PostgresHandle {
    pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct ColumnRow {
    name: String,
    data_type: String,
    length: i64,
    nullable: bool,
    is_primary_key: bool,
    is_auto_increment: bool,
    default_value: Option<String>,
    comment: String,
}

impl From<ColumnRow> for ColumnDescriptor {
    fn from(row: ColumnRow) -> Self {
        Self {
            name: row.name,
            data_type: row.data_type,
            length: row.length,
            nullable: row.nullable,
            is_primary_key: row.is_primary_key,
            is_auto_increment: row.is_auto_increment,
            default_value: row.default_value.unwrap_or_default(),
            comment: row.comment,
        }
    }
}

#[async_trait]
impl ConnectionHandle for PostgresHandle {
    fn engine(&self) -> EngineKind {
        EngineKind::PostgreSQL
    }

    async fn fetch(&self, sql: &str) -> AppResult<QueryResult> {
        let rows = sqlx::query(sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::QueryExecution(e.to_string()))?;

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
        let rows: Vec<(String, String)> = sqlx::query_as(PostgresDriver.list_tables_query())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::QueryExecution(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|(name, comment)| TableInfo { name, comment })
            .collect())
    }

    async fn list_columns(&self, table: &str) -> AppResult<Vec<ColumnDescriptor>> {
        let rows: Vec<ColumnRow> = sqlx::query_as(PostgresDriver.list_columns_query())
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

/// Converts one PostgreSQL column value into a [`CellValue`].
fn extract_value(row: &PgRow, idx: usize) -> CellValue {
    if let Ok(v) = row.try_get::<Option<i64>, _>(idx) {
        return v.into();
    }
    if let Ok(v) = row.try_get::<Option<i32>, _>(idx) {
        return v.map(i64::from).into();
    }
    if let Ok(v) = row.try_get::<Option<i16>, _>(idx) {
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
    if let Ok(v) = row.try_get::<Option<Uuid>, _>(idx) {
        return v.map(|u| u.to_string()).into();
    }
    if let Ok(v) = row.try_get::<Option<String>, _>(idx) {
        return v.into();
    }
    if let Ok(v) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(idx) {
        return v.map(|dt| dt.to_rfc3339()).into();
    }
    if let Ok(v) = row.try_get::<Option<chrono::NaiveDateTime>, _>(idx) {
        return v
            .map(|dt| dt.format("%Y-%m-%d %H:%M:%S%.f").to_string())
            .into();
    }
    if let Ok(v) = row.try_get::<Option<chrono::NaiveDate>, _>(idx) {
        return v.map(|d| d.format("%Y-%m-%d").to_string()).into();
    }
    if let Ok(v) = row.try_get::<Option<chrono::NaiveTime>, _>(idx) {
        return v.map(|t| t.format("%H:%M:%S%.f").to_string()).into();
    }
    if let Ok(v) = row.try_get::<Option<serde_json::Value>, _>(idx) {
        return v.map(|j| j.to_string()).into();
    }
    if let Ok(v) = row.try_get::<Option<Vec<u8>>, _>(idx) {
        return v.map(|b| CellValue::from_bytes(&b)).into();
    }

    // enums, arrays, inet, interval, money and the like
    match row.try_get_raw(idx) {
        Ok(raw) if raw.is_null() => CellValue::Null,
        Ok(raw) => {
            tracing::debug!(
                column = idx,
                r#type = row.column(idx).type_info().name(),
                "no typed decoder for PostgreSQL value, rendering raw value"
            );
            raw_cell(raw.as_bytes().ok())
        }
        Err(e) => {
            tracing::debug!(column = idx, error = %e, "undecodable PostgreSQL value, returning null");
            CellValue::Null
        }
    }
}
