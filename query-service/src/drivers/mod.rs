//! Engine drivers.
//!
//! An [`EngineDriver`] knows how to open a pooled [`ConnectionHandle`] for one
//! engine kind. The registry picks the driver once, when a handle is built;
//! everything after that goes through the handle.

pub mod mysql;
pub mod postgres;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use common::config::AppConfig;
use common::errors::{AppError, AppResult};
use common::models::{ColumnDescriptor, ConnectionParams, EngineKind, QueryResult, TableInfo};

pub use mysql::MySqlDriver;
pub use postgres::PostgresDriver;

/// Pool sizing applied to every opened handle.
#[derive(Debug, Clone, Copy)]
pub struct PoolLimits {
    pub max_connections: u32,
    pub connect_timeout: Duration,
    pub idle_timeout: Duration,
}

impl PoolLimits {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            max_connections: config.max_connections,
            connect_timeout: config.connect_timeout(),
            idle_timeout: config.idle_timeout(),
        }
    }

    /// A single short-lived connection, used by connection tests.
    pub fn single(&self) -> Self {
        Self {
            max_connections: 1,
            ..*self
        }
    }
}

impl Default for PoolLimits {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// Opens connections for one engine kind.
#[async_trait]
pub trait EngineDriver: Send + Sync {
    fn kind(&self) -> EngineKind;

    /// Connection string for logs, with the password masked.
    fn dsn(&self, params: &ConnectionParams) -> String;

    /// Opens a bounded pool against the target database.
    async fn open(
        &self,
        params: &ConnectionParams,
        limits: &PoolLimits,
    ) -> AppResult<Arc<dyn ConnectionHandle>>;

    /// Catalog query listing the tables of the connected schema.
    fn list_tables_query(&self) -> &'static str;

    /// Catalog query describing the columns of one table.
    fn list_columns_query(&self) -> &'static str;
}

/// An open, pooled connection to one registered database.
#[async_trait]
pub trait ConnectionHandle: Send + Sync {
    fn engine(&self) -> EngineKind;

    /// Runs a statement and converts its rows into portable values.
    async fn fetch(&self, sql: &str) -> AppResult<QueryResult>;

    /// Tables of the schema the handle is connected to.
    async fn list_tables(&self) -> AppResult<Vec<TableInfo>>;

    async fn list_columns(&self, table: &str) -> AppResult<Vec<ColumnDescriptor>>;

    async fn ping(&self) -> AppResult<()>;

    /// Closes the pool. Idempotent.
    async fn close(&self);
}

/// The set of drivers the registry may choose from.
#[derive(Clone, Default)]
pub struct DriverSet {
    drivers: HashMap<EngineKind, Arc<dyn EngineDriver>>,
}

impl DriverSet {
    /// MySQL and PostgreSQL.
    pub fn standard() -> Self {
        Self::default()
            .with(Arc::new(MySqlDriver))
            .with(Arc::new(PostgresDriver))
    }

    pub fn with(mut self, driver: Arc<dyn EngineDriver>) -> Self {
        self.drivers.insert(driver.kind(), driver);
        self
    }

    pub fn get(&self, kind: EngineKind) -> AppResult<Arc<dyn EngineDriver>> {
        self.drivers
            .get(&kind)
            .cloned()
            .ok_or_else(|| AppError::UnsupportedEngine(kind.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_set_covers_both_engines() {
        let set = DriverSet::standard();
        assert_eq!(set.get(EngineKind::MySQL).unwrap().kind(), EngineKind::MySQL);
        assert_eq!(
            set.get(EngineKind::PostgreSQL).unwrap().kind(),
            EngineKind::PostgreSQL
        );
    }

    #[test]
    fn test_missing_driver_is_unsupported() {
        let set = DriverSet::default().with(Arc::new(MySqlDriver));
        assert!(matches!(
            set.get(EngineKind::PostgreSQL),
            Err(AppError::UnsupportedEngine(_))
        ));
    }

    #[test]
    fn test_single_limits() {
        let limits = PoolLimits::default().single();
        assert_eq!(limits.max_connections, 1);
        assert_eq!(limits.connect_timeout, Duration::from_secs(10));
    }
}
