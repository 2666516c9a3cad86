//! SQL audit trail models.
//!
//! One `AuditRecord` is written per query execution attempt, after the outcome
//! is known. Records are never updated or deleted.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use super::database::{default_page, default_page_size};

/// Authenticated caller of the gateway, stamped on every audit record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub user_id: u64,
    pub username: String,
    pub client_ip: String,
}

/// Execution outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum AuditStatus {
    Success,
    Failed,
}

impl AuditStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditStatus::Success => "success",
            AuditStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(AuditStatus::Success),
            "failed" => Ok(AuditStatus::Failed),
            other => Err(format!("unknown audit status: {}", other)),
        }
    }
}

/// One query execution attempt.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AuditRecord {
    /// Store-assigned identifier (absent before insertion).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub database_id: u64,
    pub user_id: u64,
    pub username: String,
    /// SQL text after sanitization.
    pub sql: String,
    /// Execution time in milliseconds (0 when nothing was executed).
    pub duration_ms: u64,
    pub status: AuditStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Rows returned by the statement.
    pub affected_rows: u64,
    pub client_ip: String,
    pub created_at: DateTime<Utc>,
}

impl AuditRecord {
    /// Starts a record for an attempt; the outcome is filled in by
    /// [`AuditRecord::succeeded`] or [`AuditRecord::failed`].
    pub fn attempt(database_id: u64, actor: &Actor, sql: &str) -> Self {
        Self {
            id: None,
            database_id,
            user_id: actor.user_id,
            username: actor.username.clone(),
            sql: sql.to_string(),
            duration_ms: 0,
            status: AuditStatus::Failed,
            error: None,
            affected_rows: 0,
            client_ip: actor.client_ip.clone(),
            created_at: Utc::now(),
        }
    }

    pub fn succeeded(mut self, affected_rows: u64, duration_ms: u64) -> Self {
        self.status = AuditStatus::Success;
        self.affected_rows = affected_rows;
        self.duration_ms = duration_ms;
        self.error = None;
        self
    }

    pub fn failed(mut self, error: impl fmt::Display, duration_ms: u64) -> Self {
        self.status = AuditStatus::Failed;
        self.error = Some(error.to_string());
        self.duration_ms = duration_ms;
        self
    }
}

/// Query parameters for reading the audit trail.
#[derive(Debug, Deserialize, Validate, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct ListAuditsQuery {
    /// Page number (1-based).
    #[serde(default = "default_page")]
    #[validate(range(min = 1))]
    pub page: u32,
    /// Items per page.
    #[serde(default = "default_page_size")]
    #[validate(range(min = 1, max = 100))]
    pub page_size: u32,
    /// Only records of this registered database.
    #[serde(alias = "database_id")]
    pub database_id: Option<u64>,
    /// Only records with this outcome.
    pub status: Option<AuditStatus>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn actor() -> Actor {
        Actor {
            user_id: 7,
            username: "alice".into(),
            client_ip: "10.1.2.3".into(),
        }
    }

    #[test]
    fn test_attempt_stamps_actor() {
        let record = AuditRecord::attempt(5, &actor(), "SELECT 1");
        assert_eq!(record.user_id, 7);
        assert_eq!(record.username, "alice");
        assert_eq!(record.client_ip, "10.1.2.3");
        assert_eq!(record.sql, "SELECT 1");
    }

    #[test]
    fn test_outcomes() {
        let ok = AuditRecord::attempt(5, &actor(), "SELECT 1").succeeded(3, 12);
        assert_eq!(ok.status, AuditStatus::Success);
        assert_eq!(ok.affected_rows, 3);
        assert!(ok.error.is_none());

        let failed = AuditRecord::attempt(5, &actor(), "SELECT x").failed("unknown column", 4);
        assert_eq!(failed.status, AuditStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some("unknown column"));
        assert_eq!(failed.duration_ms, 4);
    }

    #[test]
    fn test_status_round_trip_through_str() {
        assert_eq!("failed".parse::<AuditStatus>().unwrap(), AuditStatus::Failed);
        assert!("pending".parse::<AuditStatus>().is_err());
    }
}
