//! Shared building blocks for the SQL gateway services.
//!
//! - `config`: environment driven service configuration
//! - `errors`: the application error taxonomy and its HTTP mapping
//! - `middleware`: request id tracing and actor identity extraction
//! - `models`: request/response and domain models
//! - `response`: the unified `ApiResponse` envelope
//! - `utils`: SQL sanitizer and risk analyzer

pub mod config;
pub mod errors;
pub mod middleware;
pub mod models;
pub mod response;
pub mod utils;
