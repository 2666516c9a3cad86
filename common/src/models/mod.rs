//! Shared data models.

pub mod audit;
pub mod database;
pub mod query;
pub mod risk;

// Re-export commonly used types
pub use audit::{Actor, AuditRecord, AuditStatus, ListAuditsQuery};
pub use database::{
    ConnectionParams, DatabaseItem, EngineKind, ListDatabasesQuery, RegisteredDatabase,
    SaveDatabaseRequest,
};
pub use query::{
    AnalyzeRequest, CellValue, ColumnDescriptor, QueryRequest, QueryResult, TableInfo,
    TableListQuery, TableSchemaQuery,
};
pub use risk::{RiskLevel, RiskVerdict};
