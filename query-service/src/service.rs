//! 已注册数据库管理服务模块

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use common::errors::{AppError, AppResult};
use common::models::{
    ConnectionParams, DatabaseItem, ListDatabasesQuery, SaveDatabaseRequest,
};
use common::response::PaginatedData;

use crate::registry::ConnectionRegistry;
use crate::store::DatabaseStore;

/// 数据库服务 Trait
#[async_trait]
pub trait DatabaseServiceTrait: Send + Sync {
    /// 分页列出已注册数据库
    async fn list(&self, query: &ListDatabasesQuery) -> AppResult<PaginatedData<DatabaseItem>>;

    /// 注册新数据库
    async fn create(&self, req: SaveDatabaseRequest) -> AppResult<DatabaseItem>;

    /// 根据 ID 获取数据库
    async fn get(&self, id: u64) -> AppResult<DatabaseItem>;

    /// 更新数据库，缓存的连接随之失效
    async fn update(&self, id: u64, req: SaveDatabaseRequest) -> AppResult<DatabaseItem>;

    /// 删除数据库，缓存的连接随之关闭
    async fn delete(&self, id: u64) -> AppResult<()>;

    /// 测试已注册数据库的连接
    async fn test_by_id(&self, id: u64) -> AppResult<Duration>;

    /// 测试临时连接参数
    async fn test(&self, params: &ConnectionParams) -> AppResult<Duration>;
}

/// 已注册数据库管理服务
pub struct DatabaseService {
    databases: Arc<dyn DatabaseStore>,
    registry: Arc<ConnectionRegistry>,
}

impl DatabaseService {
    /// 创建新的数据库服务实例
    pub fn new(databases: Arc<dyn DatabaseStore>, registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            databases,
            registry,
        }
    }
}

#[async_trait]
impl DatabaseServiceTrait for DatabaseService {
    async fn list(&self, query: &ListDatabasesQuery) -> AppResult<PaginatedData<DatabaseItem>> {
        let (items, total) = self.databases.list(query).await?;
        Ok(PaginatedData::new(
            items.into_iter().map(DatabaseItem::from).collect(),
            query.page,
            query.page_size,
            total,
        ))
    }

    async fn create(&self, req: SaveDatabaseRequest) -> AppResult<DatabaseItem> {
        let db = self.databases.create(&req).await?;
        tracing::info!(id = db.id, name = %db.name, r#type = %db.db_type, "数据库已注册");
        Ok(DatabaseItem::from(db))
    }

    async fn get(&self, id: u64) -> AppResult<DatabaseItem> {
        self.databases
            .get(id)
            .await?
            .map(DatabaseItem::from)
            .ok_or(AppError::DatabaseNotFound(id))
    }

    async fn update(&self, id: u64, req: SaveDatabaseRequest) -> AppResult<DatabaseItem> {
        let db = self.databases.update(id, &req).await?;
        self.registry.invalidate(id).await;
        tracing::info!(id = id, name = %db.name, "数据库已更新");
        Ok(DatabaseItem::from(db))
    }

    async fn delete(&self, id: u64) -> AppResult<()> {
        self.databases.delete(id).await?;
        self.registry.invalidate(id).await;
        tracing::info!(id = id, "数据库已删除");
        Ok(())
    }

    async fn test_by_id(&self, id: u64) -> AppResult<Duration> {
        let db = self
            .databases
            .get(id)
            .await?
            .ok_or(AppError::DatabaseNotFound(id))?;
        self.registry.test(&db.params()?).await
    }

    async fn test(&self, params: &ConnectionParams) -> AppResult<Duration> {
        self.registry.test(params).await
    }
}
