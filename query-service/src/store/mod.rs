//! Metadata persistence.
//!
//! Registered databases and the audit trail both live in the service's own
//! MySQL metadata database. The traits are the seams the registry, executor
//! and handlers depend on.

pub mod audits;
pub mod databases;

use async_trait::async_trait;

use common::errors::{AppError, AppResult};
use common::models::{
    AuditRecord, ListAuditsQuery, ListDatabasesQuery, RegisteredDatabase, SaveDatabaseRequest,
};

pub use audits::MySqlAuditStore;
pub use databases::MySqlDatabaseStore;

/// Registered database CRUD.
#[async_trait]
pub trait DatabaseStore: Send + Sync {
    /// One page of registered databases plus the total match count.
    async fn list(&self, query: &ListDatabasesQuery) -> AppResult<(Vec<RegisteredDatabase>, u64)>;

    async fn get(&self, id: u64) -> AppResult<Option<RegisteredDatabase>>;

    async fn create(&self, req: &SaveDatabaseRequest) -> AppResult<RegisteredDatabase>;

    /// Fails with `DatabaseNotFound` when `id` is unknown.
    async fn update(&self, id: u64, req: &SaveDatabaseRequest) -> AppResult<RegisteredDatabase>;

    /// Fails with `DatabaseNotFound` when `id` is unknown.
    async fn delete(&self, id: u64) -> AppResult<()>;
}

/// Append-only audit trail.
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Stores one record and returns its id.
    async fn append(&self, record: &AuditRecord) -> AppResult<u64>;

    /// One page of records, newest first, plus the total match count.
    async fn list(&self, query: &ListAuditsQuery) -> AppResult<(Vec<AuditRecord>, u64)>;
}

pub(crate) fn store_err(context: &str) -> impl FnOnce(sqlx::Error) -> AppError + '_ {
    move |e| AppError::MetadataStore(format!("{}: {}", context, e))
}

/// Row offset of a 1-based page.
pub(crate) fn page_offset(page: u32, page_size: u32) -> u64 {
    u64::from(page.saturating_sub(1)) * u64::from(page_size)
}
