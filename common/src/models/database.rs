//! Registered database models.
//!
//! A registered database is an external MySQL or PostgreSQL server the
//! operator has saved credentials for.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::errors::AppError;

/// External database technology.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// MySQL database.
    MySQL,
    /// PostgreSQL database.
    PostgreSQL,
}

impl EngineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineKind::MySQL => "mysql",
            EngineKind::PostgreSQL => "postgresql",
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EngineKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mysql" => Ok(EngineKind::MySQL),
            "postgresql" => Ok(EngineKind::PostgreSQL),
            _ => Err(AppError::UnsupportedEngine(s.to_string())),
        }
    }
}

/// Everything needed to open a connection to an external database.
#[derive(Clone, Deserialize, Validate, ToSchema)]
pub struct ConnectionParams {
    /// Database type.
    #[serde(rename = "type")]
    pub engine: EngineKind,
    /// Host address.
    #[validate(length(min = 1, max = 255, message = "host must be 1-255 characters"))]
    pub host: String,
    /// Port number.
    #[validate(range(min = 1, message = "port must be between 1 and 65535"))]
    pub port: u16,
    /// Login user.
    #[validate(length(min = 1, max = 50, message = "username must be 1-50 characters"))]
    pub username: String,
    /// Login password.
    #[validate(length(max = 255, message = "password must be at most 255 characters"))]
    pub password: String,
    /// Database (schema) name.
    #[validate(length(min = 1, max = 50, message = "database must be 1-50 characters"))]
    pub database: String,
}

impl fmt::Debug for ConnectionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionParams")
            .field("engine", &self.engine)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"***")
            .field("database", &self.database)
            .finish()
    }
}

/// A saved database connection (stored internally, includes the password).
#[derive(Debug, Clone)]
pub struct RegisteredDatabase {
    pub id: u64,
    pub name: String,
    /// Raw engine kind as stored; parsed when a connection is built.
    pub db_type: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub database: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RegisteredDatabase {
    /// Resolves the connection parameters, failing on an unknown engine kind.
    pub fn params(&self) -> Result<ConnectionParams, AppError> {
        Ok(ConnectionParams {
            engine: self.db_type.parse()?,
            host: self.host.clone(),
            port: self.port,
            username: self.username.clone(),
            password: self.password.clone(),
            database: self.database.clone(),
        })
    }
}

/// Request body for registering or updating a database.
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct SaveDatabaseRequest {
    /// Connection display name.
    #[validate(length(min = 1, max = 50, message = "name must be 1-50 characters"))]
    pub name: String,
    /// Connection parameters.
    #[serde(flatten)]
    #[validate(nested)]
    pub connection: ConnectionParams,
}

/// Database item for API responses (never carries the password).
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DatabaseItem {
    /// Unique database identifier.
    pub id: u64,
    /// Display name.
    pub name: String,
    /// Database type (mysql, postgresql).
    #[serde(rename = "type")]
    pub db_type: String,
    /// Host address.
    pub host: String,
    /// Port number.
    pub port: u16,
    /// Login user.
    pub username: String,
    /// Database (schema) name.
    pub database: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<RegisteredDatabase> for DatabaseItem {
    fn from(db: RegisteredDatabase) -> Self {
        Self {
            id: db.id,
            name: db.name,
            db_type: db.db_type,
            host: db.host,
            port: db.port,
            username: db.username,
            database: db.database,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}

/// Query parameters for listing registered databases.
#[derive(Debug, Deserialize, Validate, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct ListDatabasesQuery {
    /// Page number (1-based).
    #[serde(default = "default_page")]
    #[validate(range(min = 1))]
    pub page: u32,
    /// Items per page.
    #[serde(default = "default_page_size")]
    #[validate(range(min = 1, max = 100))]
    pub page_size: u32,
    /// Name filter (substring match).
    pub name: Option<String>,
    /// Type filter.
    #[serde(rename = "type")]
    pub db_type: Option<String>,
}

pub(crate) fn default_page() -> u32 {
    1
}

pub(crate) fn default_page_size() -> u32 {
    20
}
