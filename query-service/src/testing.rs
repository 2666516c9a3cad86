//! In-memory stores and a counting fake driver for unit tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Notify;

use common::errors::{AppError, AppResult};
use common::models::{
    AuditRecord, CellValue, ColumnDescriptor, ConnectionParams, EngineKind, ListAuditsQuery,
    ListDatabasesQuery, QueryResult, RegisteredDatabase, SaveDatabaseRequest, TableInfo,
};

use crate::drivers::{ConnectionHandle, EngineDriver, PoolLimits};
use crate::store::{page_offset, AuditStore, DatabaseStore};

pub fn sample_database(id: u64, db_type: &str) -> RegisteredDatabase {
    RegisteredDatabase {
        id,
        name: format!("db-{}", id),
        db_type: db_type.to_string(),
        host: "127.0.0.1".into(),
        port: 3306,
        username: "root".into(),
        password: "secret".into(),
        database: "shop".into(),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

fn page<T: Clone>(items: &[T], page: u32, page_size: u32) -> Vec<T> {
    items
        .iter()
        .skip(page_offset(page, page_size) as usize)
        .take(page_size as usize)
        .cloned()
        .collect()
}

#[derive(Default)]
pub struct MemoryDatabaseStore {
    items: Mutex<Vec<RegisteredDatabase>>,
    get_calls: AtomicUsize,
}

impl MemoryDatabaseStore {
    pub fn with(items: Vec<RegisteredDatabase>) -> Self {
        Self {
            items: Mutex::new(items),
            get_calls: AtomicUsize::new(0),
        }
    }

    /// Number of `get` lookups served.
    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    fn build(id: u64, req: &SaveDatabaseRequest) -> RegisteredDatabase {
        let conn = &req.connection;
        RegisteredDatabase {
            id,
            name: req.name.clone(),
            db_type: conn.engine.to_string(),
            host: conn.host.clone(),
            port: conn.port,
            username: conn.username.clone(),
            password: conn.password.clone(),
            database: conn.database.clone(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }
}

#[async_trait]
impl DatabaseStore for MemoryDatabaseStore {
    async fn list(&self, query: &ListDatabasesQuery) -> AppResult<(Vec<RegisteredDatabase>, u64)> {
        let items = self.items.lock().unwrap();
        let matched: Vec<_> = items
            .iter()
            .rev()
            .filter(|db| query.name.as_deref().map_or(true, |n| db.name.contains(n)))
            .filter(|db| query.db_type.as_deref().map_or(true, |t| db.db_type == t))
            .cloned()
            .collect();
        let total = matched.len() as u64;
        Ok((page(&matched, query.page, query.page_size), total))
    }

    async fn get(&self, id: u64) -> AppResult<Option<RegisteredDatabase>> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        Ok(self.items.lock().unwrap().iter().find(|db| db.id == id).cloned())
    }

    async fn create(&self, req: &SaveDatabaseRequest) -> AppResult<RegisteredDatabase> {
        let mut items = self.items.lock().unwrap();
        let id = items.iter().map(|db| db.id).max().unwrap_or(0) + 1;
        let db = Self::build(id, req);
        items.push(db.clone());
        Ok(db)
    }

    async fn update(&self, id: u64, req: &SaveDatabaseRequest) -> AppResult<RegisteredDatabase> {
        let mut items = self.items.lock().unwrap();
        let slot = items
            .iter_mut()
            .find(|db| db.id == id)
            .ok_or(AppError::DatabaseNotFound(id))?;
        let created_at = slot.created_at;
        *slot = Self::build(id, req);
        slot.created_at = created_at;
        Ok(slot.clone())
    }

    async fn delete(&self, id: u64) -> AppResult<()> {
        let mut items = self.items.lock().unwrap();
        let before = items.len();
        items.retain(|db| db.id != id);
        if items.len() == before {
            return Err(AppError::DatabaseNotFound(id));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryAuditStore {
    records: Mutex<Vec<AuditRecord>>,
    broken: bool,
}

impl MemoryAuditStore {
    /// A store whose writes always fail.
    pub fn broken() -> Self {
        Self {
            broken: true,
            ..Self::default()
        }
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl AuditStore for MemoryAuditStore {
    async fn append(&self, record: &AuditRecord) -> AppResult<u64> {
        if self.broken {
            return Err(AppError::MetadataStore("audit table unavailable".into()));
        }
        let mut records = self.records.lock().unwrap();
        let id = records.len() as u64 + 1;
        let mut record = record.clone();
        record.id = Some(id);
        records.push(record);
        Ok(id)
    }

    async fn list(&self, query: &ListAuditsQuery) -> AppResult<(Vec<AuditRecord>, u64)> {
        let records = self.records.lock().unwrap();
        let matched: Vec<_> = records
            .iter()
            .rev()
            .filter(|r| query.database_id.map_or(true, |id| r.database_id == id))
            .filter(|r| query.status.map_or(true, |s| r.status == s))
            .cloned()
            .collect();
        let total = matched.len() as u64;
        Ok((page(&matched, query.page, query.page_size), total))
    }
}

#[derive(Clone)]
enum FetchOutcome {
    Rows(QueryResult),
    Error(String),
}

/// Pauses the first `open` of a [`FakeDriver`] until released.
#[derive(Default)]
pub struct OpenGate {
    /// Signalled once the paused open has started.
    pub entered: Notify,
    pub release: Notify,
}

/// Driver whose handles never touch the network.
///
/// Counts opened and closed handles and records the last SQL it ran.
pub struct FakeDriver {
    kind: EngineKind,
    reachable: bool,
    outcome: FetchOutcome,
    gate: Option<Arc<OpenGate>>,
    gate_used: AtomicBool,
    opens: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
    hosts: Mutex<Vec<String>>,
    last_sql: Arc<Mutex<Option<String>>>,
}

impl FakeDriver {
    pub fn new(kind: EngineKind) -> Self {
        Self {
            kind,
            reachable: true,
            outcome: FetchOutcome::Rows(QueryResult::new(
                vec!["1".into()],
                vec![vec![CellValue::Integer(1)]],
            )),
            gate: None,
            gate_used: AtomicBool::new(false),
            opens: Arc::new(AtomicUsize::new(0)),
            closes: Arc::new(AtomicUsize::new(0)),
            hosts: Mutex::new(Vec::new()),
            last_sql: Arc::new(Mutex::new(None)),
        }
    }

    /// Every open fails with a connection error.
    pub fn unreachable(mut self) -> Self {
        self.reachable = false;
        self
    }

    pub fn returning(mut self, result: QueryResult) -> Self {
        self.outcome = FetchOutcome::Rows(result);
        self
    }

    pub fn failing(mut self, message: &str) -> Self {
        self.outcome = FetchOutcome::Error(message.to_string());
        self
    }

    /// The first open waits on `gate` after signalling `entered`.
    pub fn paused(mut self, gate: Arc<OpenGate>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Hosts of every successful open, in order.
    pub fn opened_hosts(&self) -> Vec<String> {
        self.hosts.lock().unwrap().clone()
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn last_sql(&self) -> Option<String> {
        self.last_sql.lock().unwrap().clone()
    }
}

#[async_trait]
impl EngineDriver for FakeDriver {
    fn kind(&self) -> EngineKind {
        self.kind
    }

    fn dsn(&self, params: &ConnectionParams) -> String {
        format!("fake://{}:***@{}:{}", params.username, params.host, params.port)
    }

    async fn open(
        &self,
        params: &ConnectionParams,
        _limits: &PoolLimits,
    ) -> AppResult<Arc<dyn ConnectionHandle>> {
        tokio::task::yield_now().await;
        if let Some(gate) = &self.gate {
            if !self.gate_used.swap(true, Ordering::SeqCst) {
                gate.entered.notify_one();
                gate.release.notified().await;
            }
        }
        if !self.reachable {
            return Err(AppError::DatabaseConnection(format!(
                "connection refused: {}:{}",
                params.host, params.port
            )));
        }
        self.opens.fetch_add(1, Ordering::SeqCst);
        self.hosts.lock().unwrap().push(params.host.clone());
        Ok(Arc::new(FakeHandle {
            kind: self.kind,
            outcome: self.outcome.clone(),
            closed: AtomicBool::new(false),
            closes: self.closes.clone(),
            last_sql: self.last_sql.clone(),
        }))
    }

    fn list_tables_query(&self) -> &'static str {
        "SHOW TABLES"
    }

    fn list_columns_query(&self) -> &'static str {
        "SHOW COLUMNS"
    }
}

pub struct FakeHandle {
    kind: EngineKind,
    outcome: FetchOutcome,
    closed: AtomicBool,
    closes: Arc<AtomicUsize>,
    last_sql: Arc<Mutex<Option<String>>>,
}

#[async_trait]
impl ConnectionHandle for FakeHandle {
    fn engine(&self) -> EngineKind {
        self.kind
    }

    async fn fetch(&self, sql: &str) -> AppResult<QueryResult> {
        *self.last_sql.lock().unwrap() = Some(sql.to_string());
        match &self.outcome {
            FetchOutcome::Rows(result) => Ok(result.clone()),
            FetchOutcome::Error(message) => Err(AppError::QueryExecution(message.clone())),
        }
    }

    async fn list_tables(&self) -> AppResult<Vec<TableInfo>> {
        Ok(vec![TableInfo {
            name: "users".into(),
            comment: "accounts".into(),
        }])
    }

    async fn list_columns(&self, table: &str) -> AppResult<Vec<ColumnDescriptor>> {
        if table != "users" {
            return Err(AppError::QueryExecution(format!(
                "relation \"{}\" does not exist",
                table
            )));
        }
        Ok(vec![ColumnDescriptor {
            name: "id".into(),
            data_type: "bigint".into(),
            length: 20,
            nullable: false,
            is_primary_key: true,
            is_auto_increment: true,
            default_value: String::new(),
            comment: "primary key".into(),
        }])
    }

    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }
}
