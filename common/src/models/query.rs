//! SQL query models.
//!
//! Contains models for ad-hoc query execution and schema browsing.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

/// Request body for executing a SQL query.
#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct QueryRequest {
    /// ID of the registered database to run against.
    #[validate(range(min = 1, message = "database_id is required"))]
    pub database_id: u64,

    /// SQL statement to execute.
    #[validate(length(min = 1, max = 1000000, message = "SQL statement is empty or too long"))]
    pub sql: String,
}

/// Request body for analyzing a SQL statement without running it.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct AnalyzeRequest {
    /// SQL statement to analyze.
    #[validate(length(min = 1, max = 1000000, message = "SQL statement is empty or too long"))]
    pub sql: String,
}

/// A portable scalar converted from a driver-native value.
///
/// Serializes to the bare JSON value (`null`, `true`, `42`, `1.5`, `"text"`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl CellValue {
    /// Byte sequences decode as text.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        CellValue::Text(String::from_utf8_lossy(bytes).into_owned())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }
}

impl<T: Into<CellValue>> From<Option<T>> for CellValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(CellValue::Null)
    }
}

impl From<bool> for CellValue {
    fn from(v: bool) -> Self {
        CellValue::Bool(v)
    }
}

impl From<i64> for CellValue {
    fn from(v: i64) -> Self {
        CellValue::Integer(v)
    }
}

impl From<f64> for CellValue {
    fn from(v: f64) -> Self {
        CellValue::Float(v)
    }
}

impl From<String> for CellValue {
    fn from(v: String) -> Self {
        CellValue::Text(v)
    }
}

impl From<&str> for CellValue {
    fn from(v: &str) -> Self {
        CellValue::Text(v.to_string())
    }
}

/// Result of a SQL query execution.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct QueryResult {
    /// Column names in result order.
    pub columns: Vec<String>,

    /// Row data, one portable value per column.
    #[schema(value_type = Vec<Vec<Object>>)]
    pub rows: Vec<Vec<CellValue>>,

    /// Number of rows returned.
    pub row_count: usize,

    /// Query execution time in milliseconds.
    pub execution_time_ms: u64,
}

impl QueryResult {
    /// Builds a result from columns and rows; the row count is derived.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<CellValue>>) -> Self {
        Self {
            row_count: rows.len(),
            columns,
            rows,
            execution_time_ms: 0,
        }
    }
}

/// Table entry of a schema listing.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct TableInfo {
    /// Table name.
    pub name: String,
    /// Table comment (empty when unset).
    pub comment: String,
}

/// Column descriptor of a table schema.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ColumnDescriptor {
    /// Column name.
    pub name: String,
    /// Column data type.
    #[serde(rename = "type")]
    pub data_type: String,
    /// Character length or numeric precision (0 when not applicable).
    pub length: i64,
    /// Whether the column accepts NULL.
    pub nullable: bool,
    /// Whether the column is (part of) the primary key.
    pub is_primary_key: bool,
    /// Whether the column is auto generated.
    pub is_auto_increment: bool,
    /// Default value expression (empty when unset).
    pub default_value: String,
    /// Column comment (empty when unset).
    pub comment: String,
}

/// Query parameters for listing tables.
#[derive(Debug, Deserialize, Validate, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TableListQuery {
    /// Registered database ID.
    #[validate(range(min = 1, message = "database_id is required"))]
    pub database_id: u64,
}

/// Query parameters for describing one table.
#[derive(Debug, Deserialize, Validate, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TableSchemaQuery {
    /// Registered database ID.
    #[validate(range(min = 1, message = "database_id is required"))]
    pub database_id: u64,
    /// Table name.
    #[validate(length(min = 1, max = 128, message = "table_name must be 1-128 characters"))]
    pub table_name: String,
}
