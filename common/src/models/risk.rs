//! SQL risk verdict models.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Risk level assigned by the analyzer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

/// Outcome of analyzing one SQL statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct RiskVerdict {
    /// Risk level.
    pub risk: RiskLevel,
    /// What the analyzer found.
    pub description: String,
    /// What the operator should do about it (empty when nothing).
    pub suggestion: String,
}

impl RiskVerdict {
    pub fn new(risk: RiskLevel, description: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self {
            risk,
            description: description.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Whether the statement must not be executed.
    pub fn is_blocked(&self) -> bool {
        self.risk == RiskLevel::High
    }
}
