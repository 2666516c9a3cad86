//! MySQL-backed registered database store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{MySql, MySqlPool, QueryBuilder};

use common::errors::{AppError, AppResult};
use common::models::{ListDatabasesQuery, RegisteredDatabase, SaveDatabaseRequest};

use super::{page_offset, store_err, DatabaseStore};

const COLUMNS: &str = "`id`, `name`, `db_type`, `host`, `port`, `username`, `password`, \
    `database_name`, `created_at`, `updated_at`";

/// Row from the `databases` table.
#[derive(sqlx::FromRow)]
struct DatabaseRow {
    id: u64,
    name: String,
    db_type: String,
    host: String,
    port: u16,
    username: String,
    password: String,
    database_name: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<DatabaseRow> for RegisteredDatabase {
    fn from(row: DatabaseRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            db_type: row.db_type,
            host: row.host,
            port: row.port,
            username: row.username,
            password: row.password,
            database: row.database_name,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Registered databases persisted in the metadata MySQL database.
pub struct MySqlDatabaseStore {
    pool: MySqlPool,
}

impl MySqlDatabaseStore {
    /// Creates the store, creating the `databases` table if it is missing.
    pub async fn new(pool: MySqlPool) -> AppResult<Self> {
        let store = Self { pool };
        store.ensure_table().await?;
        Ok(store)
    }

    async fn ensure_table(&self) -> AppResult<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS `databases` (
                `id`            BIGINT UNSIGNED   NOT NULL AUTO_INCREMENT,
                `name`          VARCHAR(50)       NOT NULL,
                `db_type`       VARCHAR(20)       NOT NULL,
                `host`          VARCHAR(255)      NOT NULL,
                `port`          SMALLINT UNSIGNED NOT NULL,
                `username`      VARCHAR(50)       NOT NULL,
                `password`      VARCHAR(255)      NOT NULL DEFAULT '',
                `database_name` VARCHAR(50)       NOT NULL,
                `created_at`    DATETIME          NOT NULL,
                `updated_at`    DATETIME          NOT NULL,
                PRIMARY KEY (`id`),
                KEY `idx_db_type` (`db_type`),
                KEY `idx_name` (`name`)
            ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci",
        )
        .execute(&self.pool)
        .await
        .map_err(store_err("failed to create databases table"))?;

        tracing::info!("Metadata table `databases` ensured");
        Ok(())
    }
}

fn push_filters(qb: &mut QueryBuilder<'_, MySql>, query: &ListDatabasesQuery) {
    qb.push(" WHERE 1 = 1");
    if let Some(name) = query.name.as_deref().filter(|n| !n.is_empty()) {
        qb.push(" AND `name` LIKE ").push_bind(format!("%{}%", name));
    }
    if let Some(db_type) = query.db_type.as_deref().filter(|t| !t.is_empty()) {
        qb.push(" AND `db_type` = ").push_bind(db_type.to_string());
    }
}

#[async_trait]
impl DatabaseStore for MySqlDatabaseStore {
    async fn list(&self, query: &ListDatabasesQuery) -> AppResult<(Vec<RegisteredDatabase>, u64)> {
        let mut count = QueryBuilder::<MySql>::new("SELECT COUNT(*) FROM `databases`");
        push_filters(&mut count, query);
        let total: i64 = count
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await
            .map_err(store_err("failed to count databases"))?;

        let mut select = QueryBuilder::<MySql>::new(format!("SELECT {} FROM `databases`", COLUMNS));
        push_filters(&mut select, query);
        select
            .push(" ORDER BY `id` DESC LIMIT ")
            .push_bind(u64::from(query.page_size))
            .push(" OFFSET ")
            .push_bind(page_offset(query.page, query.page_size));

        let rows = select
            .build_query_as::<DatabaseRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(store_err("failed to list databases"))?;

        Ok((
            rows.into_iter().map(RegisteredDatabase::from).collect(),
            total.max(0) as u64,
        ))
    }

    async fn get(&self, id: u64) -> AppResult<Option<RegisteredDatabase>> {
        let row = sqlx::query_as::<_, DatabaseRow>(&format!(
            "SELECT {} FROM `databases` WHERE `id` = ?",
            COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err("failed to load database"))?;

        Ok(row.map(RegisteredDatabase::from))
    }

    async fn create(&self, req: &SaveDatabaseRequest) -> AppResult<RegisteredDatabase> {
        let now = Utc::now();
        let conn = &req.connection;
        let result = sqlx::query(
            "INSERT INTO `databases` (`name`, `db_type`, `host`, `port`, `username`, `password`, `database_name`, `created_at`, `updated_at`)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&req.name)
        .bind(conn.engine.as_str())
        .bind(&conn.host)
        .bind(conn.port)
        .bind(&conn.username)
        .bind(&conn.password)
        .bind(&conn.database)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(store_err("failed to save database"))?;

        Ok(RegisteredDatabase {
            id: result.last_insert_id(),
            name: req.name.clone(),
            db_type: conn.engine.to_string(),
            host: conn.host.clone(),
            port: conn.port,
            username: conn.username.clone(),
            password: conn.password.clone(),
            database: conn.database.clone(),
            created_at: now,
            updated_at: now,
        })
    }

    async fn update(&self, id: u64, req: &SaveDatabaseRequest) -> AppResult<RegisteredDatabase> {
        let conn = &req.connection;
        sqlx::query(
            "UPDATE `databases` SET `name` = ?, `db_type` = ?, `host` = ?, `port` = ?, `username` = ?, `password` = ?, `database_name` = ?, `updated_at` = ?
             WHERE `id` = ?",
        )
        .bind(&req.name)
        .bind(conn.engine.as_str())
        .bind(&conn.host)
        .bind(conn.port)
        .bind(&conn.username)
        .bind(&conn.password)
        .bind(&conn.database)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(store_err("failed to update database"))?;

        // MySQL reports zero affected rows for an unchanged row, so re-read.
        self.get(id).await?.ok_or(AppError::DatabaseNotFound(id))
    }

    async fn delete(&self, id: u64) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM `databases` WHERE `id` = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(store_err("failed to delete database"))?;

        if result.rows_affected() == 0 {
            return Err(AppError::DatabaseNotFound(id));
        }
        Ok(())
    }
}
