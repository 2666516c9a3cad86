//! Application state for query service.

use std::sync::Arc;

use common::config::AppConfig;

use crate::drivers::{DriverSet, PoolLimits};
use crate::executor::QueryExecutor;
use crate::registry::ConnectionRegistry;
use crate::store::{AuditStore, DatabaseStore};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub databases: Arc<dyn DatabaseStore>,
    pub audits: Arc<dyn AuditStore>,
    pub registry: Arc<ConnectionRegistry>,
    pub executor: Arc<QueryExecutor>,
}

impl AppState {
    /// Creates a new application state with an empty connection cache.
    pub fn new(
        config: AppConfig,
        databases: Arc<dyn DatabaseStore>,
        audits: Arc<dyn AuditStore>,
        drivers: DriverSet,
    ) -> Self {
        let registry = Arc::new(ConnectionRegistry::new(
            databases.clone(),
            drivers,
            PoolLimits::from_config(&config),
        ));
        let executor = Arc::new(QueryExecutor::new(registry.clone(), audits.clone()));

        Self {
            config,
            databases,
            audits,
            registry,
            executor,
        }
    }
}
