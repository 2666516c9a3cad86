//! Connection registry.
//!
//! Caches one live, pooled handle per registered database id. Handles are
//! created lazily on first use and shared by every later query against the
//! same id until the registered database is updated or deleted.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

use common::errors::{AppError, AppResult};
use common::models::ConnectionParams;

use crate::drivers::{ConnectionHandle, DriverSet, PoolLimits};
use crate::store::DatabaseStore;

/// Lookup-or-create cache of live connection handles.
pub struct ConnectionRegistry {
    databases: Arc<dyn DatabaseStore>,
    drivers: DriverSet,
    limits: PoolLimits,
    slots: RwLock<Slots>,
}

/// Cached handles plus a per-id generation bumped on every invalidation.
#[derive(Default)]
struct Slots {
    handles: HashMap<u64, Arc<dyn ConnectionHandle>>,
    generations: HashMap<u64, u64>,
}

impl Slots {
    fn generation(&self, database_id: u64) -> u64 {
        self.generations.get(&database_id).copied().unwrap_or(0)
    }
}

impl ConnectionRegistry {
    pub fn new(databases: Arc<dyn DatabaseStore>, drivers: DriverSet, limits: PoolLimits) -> Self {
        Self {
            databases,
            drivers,
            limits,
            slots: RwLock::new(Slots::default()),
        }
    }

    /// Returns the cached handle for `database_id`, opening one on a miss.
    ///
    /// The pool is opened outside the lock. When two callers race on the same
    /// id, the first insert wins and the other caller closes its duplicate and
    /// returns the winner. A handle opened from a record that was invalidated
    /// while the open was in flight is closed and the lookup starts over.
    pub async fn get(&self, database_id: u64) -> AppResult<Arc<dyn ConnectionHandle>> {
        loop {
            let generation = {
                let slots = self.slots.read().await;
                if let Some(handle) = slots.handles.get(&database_id) {
                    return Ok(handle.clone());
                }
                slots.generation(database_id)
            };

            let record = self
                .databases
                .get(database_id)
                .await?
                .ok_or(AppError::DatabaseNotFound(database_id))?;
            let params = record.params()?;
            let driver = self.drivers.get(params.engine)?;

            let opened = driver.open(&params, &self.limits).await.map_err(|e| {
                tracing::warn!(
                    database_id,
                    dsn = %driver.dsn(&params),
                    error = %e,
                    "Failed to open connection pool"
                );
                e
            })?;

            let mut slots = self.slots.write().await;
            if slots.generation(database_id) != generation {
                drop(slots);
                opened.close().await;
                tracing::debug!(database_id, "Record changed during open, stale pool closed");
                continue;
            }
            if let Some(existing) = slots.handles.get(&database_id) {
                let existing = existing.clone();
                drop(slots);
                opened.close().await;
                tracing::debug!(database_id, "Concurrent open lost the race, duplicate closed");
                return Ok(existing);
            }

            slots.handles.insert(database_id, opened.clone());
            tracing::info!(
                database_id,
                name = %record.name,
                engine = %opened.engine(),
                "Connection pool cached"
            );
            return Ok(opened);
        }
    }

    /// Drops and closes the cached handle of `database_id`, if any.
    ///
    /// Opens already in flight for the id are discarded once they finish.
    pub async fn invalidate(&self, database_id: u64) {
        let removed = {
            let mut slots = self.slots.write().await;
            *slots.generations.entry(database_id).or_insert(0) += 1;
            slots.handles.remove(&database_id)
        };
        if let Some(handle) = removed {
            handle.close().await;
            tracing::info!(database_id, "Cached connection pool closed");
        }
    }

    /// Opens a single ephemeral connection, pings it and closes it.
    ///
    /// Never reads or writes the cache.
    pub async fn test(&self, params: &ConnectionParams) -> AppResult<Duration> {
        let driver = self.drivers.get(params.engine)?;
        let start = Instant::now();

        let handle = driver.open(params, &self.limits.single()).await?;
        let result = handle.ping().await;
        handle.close().await;
        result?;

        let latency = start.elapsed();
        tracing::debug!(dsn = %driver.dsn(params), latency_ms = latency.as_millis() as u64, "Connection test succeeded");
        Ok(latency)
    }

    /// Number of cached handles.
    pub async fn connection_count(&self) -> usize {
        self.slots.read().await.handles.len()
    }

    /// Closes every cached handle.
    pub async fn close_all(&self) {
        let handles: Vec<_> = self.slots.write().await.handles.drain().collect();
        for (_, handle) in handles {
            handle.close().await;
        }
    }
}
