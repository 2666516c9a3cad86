//! SQL 查询网关服务
//!
//! 提供即席 SQL 执行功能，包括：
//! - 已注册数据库的管理与连接测试
//! - SQL 清洗与风险分级，高风险语句直接拦截
//! - 按数据库缓存连接池并执行查询
//! - 每次执行写入审计记录

mod drivers;
mod executor;
mod handlers;
mod registry;
mod routes;
mod service;
mod state;
mod store;

#[cfg(test)]
mod testing;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::{middleware, routing::get, Json, Router};
use common::config::{AppConfig, LogFormat};
use common::middleware::request_id::request_id_middleware;
use sqlx::mysql::MySqlPoolOptions;
use state::AppState;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;

use crate::drivers::DriverSet;
use crate::store::{MySqlAuditStore, MySqlDatabaseStore};

const SERVICE_NAME: &str = "query-service";

#[derive(OpenApi)]
#[openapi(
    info(
        title = "SQL 查询网关 API",
        version = "0.1.0",
        description = "即席 SQL 执行、风险拦截与审计"
    ),
    paths(
        handlers::list_databases,
        handlers::create_database,
        handlers::get_database,
        handlers::update_database,
        handlers::delete_database,
        handlers::test_database,
        handlers::test_connection,
        handlers::execute_query,
        handlers::list_tables,
        handlers::table_schema,
        handlers::analyze_sql,
        handlers::list_audits,
        handlers::health_check,
    ),
    components(schemas(
        common::models::SaveDatabaseRequest,
        common::models::ConnectionParams,
        common::models::DatabaseItem,
        common::models::EngineKind,
        common::models::QueryRequest,
        common::models::QueryResult,
        common::models::AnalyzeRequest,
        common::models::RiskVerdict,
        common::models::RiskLevel,
        common::models::TableInfo,
        common::models::ColumnDescriptor,
        common::models::AuditRecord,
        common::models::AuditStatus,
        handlers::ConnectionTestResult,
        handlers::HealthResponse,
    )),
    tags(
        (name = "databases", description = "已注册数据库管理端点"),
        (name = "query", description = "查询执行与表结构端点"),
        (name = "audits", description = "SQL 审计端点"),
        (name = "health", description = "健康检查端点")
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 加载 .env（可选）
    dotenvy::dotenv().ok();

    // 加载配置
    let config = AppConfig::load_with_service(SERVICE_NAME);

    // 初始化日志追踪
    init_tracing(config.log_format);

    // 连接元数据库并确保表结构存在
    let meta_pool = MySqlPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.connect_timeout())
        .connect(&config.database_url)
        .await
        .context("连接元数据库失败")?;

    let databases = Arc::new(MySqlDatabaseStore::new(meta_pool.clone()).await?);
    let audits = Arc::new(MySqlAuditStore::new(meta_pool.clone()).await?);

    // 创建应用状态
    let state = AppState::new(config.clone(), databases, audits, DriverSet::standard());
    let registry = state.registry.clone();

    // 创建路由
    let app = create_router(state);

    // 启动服务
    let addr = format!("{}:{}", config.host, config.port);
    info!(service = SERVICE_NAME, address = %addr, "启动服务");

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("绑定地址失败: {}", addr))?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("服务运行失败")?;

    // 关闭缓存的连接池
    registry.close_all().await;
    meta_pool.close().await;
    info!(service = SERVICE_NAME, "服务已停止");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "监听退出信号失败");
    }
}

fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(routes::router())
        .route("/api-docs/openapi.json", get(openapi_json))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
