//! SQL helpers shared by the services.

pub mod risk_analyzer;
pub mod sql_sanitizer;

// Re-export commonly used types
pub use risk_analyzer::RiskAnalyzer;
pub use sql_sanitizer::SqlSanitizer;
