//! Handler模块

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;
use validator::Validate;

use common::errors::AppError;
use common::models::{
    Actor, AnalyzeRequest, AuditRecord, ColumnDescriptor, ConnectionParams, DatabaseItem,
    ListAuditsQuery, ListDatabasesQuery, QueryRequest, QueryResult, RiskVerdict,
    SaveDatabaseRequest, TableInfo, TableListQuery, TableSchemaQuery,
};
use common::response::{ApiResponse, PaginatedData};
use common::utils::{RiskAnalyzer, SqlSanitizer};

use crate::service::{DatabaseService, DatabaseServiceTrait};
use crate::state::AppState;

const SERVICE_NAME: &str = "query-service";

fn database_service(state: &AppState) -> DatabaseService {
    DatabaseService::new(state.databases.clone(), state.registry.clone())
}

/// 分页列出已注册数据库
#[utoipa::path(
    get,
    path = "/api/v1/databases",
    tag = "databases",
    params(ListDatabasesQuery),
    responses(
        (status = 200, description = "数据库列表", body = ApiResponse<PaginatedData<DatabaseItem>>)
    )
)]
pub async fn list_databases(
    State(state): State<AppState>,
    Query(query): Query<ListDatabasesQuery>,
) -> Result<Json<ApiResponse<PaginatedData<DatabaseItem>>>, AppError> {
    query.validate()?;
    let data = database_service(&state).list(&query).await?;
    Ok(Json(ApiResponse::ok_with_service(data, SERVICE_NAME)))
}

/// 注册新数据库
#[utoipa::path(
    post,
    path = "/api/v1/databases",
    tag = "databases",
    request_body = SaveDatabaseRequest,
    responses(
        (status = 200, description = "数据库已注册", body = ApiResponse<DatabaseItem>),
        (status = 400, description = "参数校验错误")
    )
)]
pub async fn create_database(
    State(state): State<AppState>,
    Json(req): Json<SaveDatabaseRequest>,
) -> Result<Json<ApiResponse<DatabaseItem>>, AppError> {
    req.validate()?;
    let data = database_service(&state).create(req).await?;
    Ok(Json(ApiResponse::ok_with_service(data, SERVICE_NAME)))
}

/// 根据 ID 获取数据库
#[utoipa::path(
    get,
    path = "/api/v1/databases/{id}",
    tag = "databases",
    params(
        ("id" = u64, Path, description = "数据库 ID")
    ),
    responses(
        (status = 200, description = "数据库详情", body = ApiResponse<DatabaseItem>),
        (status = 404, description = "数据库未找到")
    )
)]
pub async fn get_database(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<ApiResponse<DatabaseItem>>, AppError> {
    let data = database_service(&state).get(id).await?;
    Ok(Json(ApiResponse::ok_with_service(data, SERVICE_NAME)))
}

/// 更新已注册数据库
#[utoipa::path(
    put,
    path = "/api/v1/databases/{id}",
    tag = "databases",
    params(
        ("id" = u64, Path, description = "数据库 ID")
    ),
    request_body = SaveDatabaseRequest,
    responses(
        (status = 200, description = "数据库已更新", body = ApiResponse<DatabaseItem>),
        (status = 404, description = "数据库未找到")
    )
)]
pub async fn update_database(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(req): Json<SaveDatabaseRequest>,
) -> Result<Json<ApiResponse<DatabaseItem>>, AppError> {
    req.validate()?;
    let data = database_service(&state).update(id, req).await?;
    Ok(Json(ApiResponse::ok_with_service(data, SERVICE_NAME)))
}

/// 删除已注册数据库
#[utoipa::path(
    delete,
    path = "/api/v1/databases/{id}",
    tag = "databases",
    params(
        ("id" = u64, Path, description = "数据库 ID")
    ),
    responses(
        (status = 200, description = "数据库已删除", body = ApiResponse<bool>),
        (status = 404, description = "数据库未找到")
    )
)]
pub async fn delete_database(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<ApiResponse<bool>>, AppError> {
    database_service(&state).delete(id).await?;
    Ok(Json(ApiResponse::ok_with_service(true, SERVICE_NAME)))
}

/// 测试已注册数据库的连接
#[utoipa::path(
    post,
    path = "/api/v1/databases/{id}/test",
    tag = "databases",
    params(
        ("id" = u64, Path, description = "数据库 ID")
    ),
    responses(
        (status = 200, description = "连接测试结果", body = ApiResponse<ConnectionTestResult>),
        (status = 404, description = "数据库未找到"),
        (status = 500, description = "元数据库错误")
    )
)]
pub async fn test_database(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<ApiResponse<ConnectionTestResult>>, AppError> {
    let outcome = database_service(&state).test_by_id(id).await;
    Ok(Json(ApiResponse::ok_with_service(
        ConnectionTestResult::try_from(outcome)?,
        SERVICE_NAME,
    )))
}

/// 测试临时连接参数（不会缓存连接）
#[utoipa::path(
    post,
    path = "/api/v1/databases/test",
    tag = "databases",
    request_body = ConnectionParams,
    responses(
        (status = 200, description = "连接测试结果", body = ApiResponse<ConnectionTestResult>),
        (status = 400, description = "参数校验错误")
    )
)]
pub async fn test_connection(
    State(state): State<AppState>,
    Json(params): Json<ConnectionParams>,
) -> Result<Json<ApiResponse<ConnectionTestResult>>, AppError> {
    params.validate()?;
    let outcome = database_service(&state).test(&params).await;
    Ok(Json(ApiResponse::ok_with_service(
        ConnectionTestResult::try_from(outcome)?,
        SERVICE_NAME,
    )))
}

/// 执行 SQL 查询
#[utoipa::path(
    post,
    path = "/api/v1/databases/query",
    tag = "query",
    request_body = QueryRequest,
    responses(
        (status = 200, description = "查询执行成功", body = ApiResponse<QueryResult>),
        (status = 400, description = "SQL 无效或校验错误"),
        (status = 403, description = "高风险 SQL 被拒绝"),
        (status = 404, description = "数据库未找到"),
        (status = 422, description = "SQL 执行失败"),
        (status = 502, description = "数据库连接失败")
    )
)]
pub async fn execute_query(
    State(state): State<AppState>,
    actor: Actor,
    Json(req): Json<QueryRequest>,
) -> Result<Json<ApiResponse<QueryResult>>, AppError> {
    req.validate()?;
    let result = state
        .executor
        .execute(req.database_id, &req.sql, &actor)
        .await?;
    let duration = result.execution_time_ms;
    Ok(Json(
        ApiResponse::ok_with_service(result, SERVICE_NAME).with_duration(duration),
    ))
}

/// 获取数据库表列表
#[utoipa::path(
    get,
    path = "/api/v1/databases/tables",
    tag = "query",
    params(TableListQuery),
    responses(
        (status = 200, description = "表列表", body = ApiResponse<Vec<TableInfo>>),
        (status = 404, description = "数据库未找到")
    )
)]
pub async fn list_tables(
    State(state): State<AppState>,
    Query(query): Query<TableListQuery>,
) -> Result<Json<ApiResponse<Vec<TableInfo>>>, AppError> {
    query.validate()?;
    let data = state.executor.list_tables(query.database_id).await?;
    Ok(Json(ApiResponse::ok_with_service(data, SERVICE_NAME)))
}

/// 获取表结构
#[utoipa::path(
    get,
    path = "/api/v1/databases/schema",
    tag = "query",
    params(TableSchemaQuery),
    responses(
        (status = 200, description = "列定义", body = ApiResponse<Vec<ColumnDescriptor>>),
        (status = 404, description = "数据库未找到")
    )
)]
pub async fn table_schema(
    State(state): State<AppState>,
    Query(query): Query<TableSchemaQuery>,
) -> Result<Json<ApiResponse<Vec<ColumnDescriptor>>>, AppError> {
    query.validate()?;
    let data = state
        .executor
        .list_table_schema(query.database_id, &query.table_name)
        .await?;
    Ok(Json(ApiResponse::ok_with_service(data, SERVICE_NAME)))
}

/// 分析 SQL 风险（不执行）
#[utoipa::path(
    post,
    path = "/api/v1/sql/analyze",
    tag = "query",
    request_body = AnalyzeRequest,
    responses(
        (status = 200, description = "风险分析结果", body = ApiResponse<RiskVerdict>)
    )
)]
pub async fn analyze_sql(
    Json(req): Json<AnalyzeRequest>,
) -> Result<Json<ApiResponse<RiskVerdict>>, AppError> {
    req.validate()?;
    let sql = SqlSanitizer::sanitize(&req.sql);
    Ok(Json(ApiResponse::ok_with_service(
        RiskAnalyzer::analyze(&sql),
        SERVICE_NAME,
    )))
}

/// 分页查询 SQL 审计记录
#[utoipa::path(
    get,
    path = "/api/v1/audits",
    tag = "audits",
    params(ListAuditsQuery),
    responses(
        (status = 200, description = "审计记录", body = ApiResponse<PaginatedData<AuditRecord>>)
    )
)]
pub async fn list_audits(
    State(state): State<AppState>,
    Query(query): Query<ListAuditsQuery>,
) -> Result<Json<ApiResponse<PaginatedData<AuditRecord>>>, AppError> {
    query.validate()?;
    let (items, total) = state.audits.list(&query).await?;
    let data = PaginatedData::new(items, query.page, query.page_size, total);
    Ok(Json(ApiResponse::ok_with_service(data, SERVICE_NAME)))
}

/// 健康检查端点
#[utoipa::path(
    get,
    path = "/api/health",
    tag = "health",
    responses(
        (status = 200, description = "服务运行正常", body = HealthResponse)
    )
)]
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: state.config.service_name.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
        connections: state.registry.connection_count().await,
    })
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ConnectionTestResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// 仅连接类错误记为测试失败，其余错误原样返回
impl TryFrom<Result<std::time::Duration, AppError>> for ConnectionTestResult {
    type Error = AppError;

    fn try_from(outcome: Result<std::time::Duration, AppError>) -> Result<Self, AppError> {
        match outcome {
            Ok(latency) => Ok(Self {
                success: true,
                latency_ms: Some(latency.as_millis() as u64),
                error: None,
            }),
            Err(
                e @ (AppError::DatabaseConnection(_)
                | AppError::QueryExecution(_)
                | AppError::UnsupportedEngine(_)),
            ) => Ok(Self {
                success: false,
                latency_ms: None,
                error: Some(e.to_string()),
            }),
            Err(e) => Err(e),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    /// Number of cached live connection pools.
    pub connections: usize,
}
