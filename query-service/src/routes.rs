//! 路由模块

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use common::middleware::auth_middleware;

use crate::handlers;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/health", get(handlers::health_check))
        .nest("/api/v1", v1_router())
}

/// 需要调用方身份的业务接口
fn v1_router() -> Router<AppState> {
    Router::new()
        .route(
            "/databases",
            get(handlers::list_databases).post(handlers::create_database),
        )
        .route("/databases/test", post(handlers::test_connection))
        .route("/databases/query", post(handlers::execute_query))
        .route("/databases/tables", get(handlers::list_tables))
        .route("/databases/schema", get(handlers::table_schema))
        .route(
            "/databases/{id}",
            get(handlers::get_database)
                .put(handlers::update_database)
                .delete(handlers::delete_database),
        )
        .route("/databases/{id}/test", post(handlers::test_database))
        .route("/sql/analyze", post(handlers::analyze_sql))
        .route("/audits", get(handlers::list_audits))
        .route_layer(middleware::from_fn(auth_middleware))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use common::config::AppConfig;
    use common::models::{CellValue, EngineKind, QueryResult};

    use super::*;
    use crate::drivers::DriverSet;
    use crate::testing::{sample_database, FakeDriver, MemoryAuditStore, MemoryDatabaseStore};

    struct TestApp {
        router: Router,
        audits: Arc<MemoryAuditStore>,
        driver: Arc<FakeDriver>,
    }

    fn app(driver: FakeDriver) -> TestApp {
        let store = Arc::new(MemoryDatabaseStore::with(vec![sample_database(1, "mysql")]));
        let audits = Arc::new(MemoryAuditStore::default());
        let driver = Arc::new(driver);
        let state = AppState::new(
            AppConfig::default(),
            store,
            audits.clone(),
            DriverSet::default().with(driver.clone()),
        );
        TestApp {
            router: router().with_state(state),
            audits,
            driver,
        }
    }

    fn authed(method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("x-user-id", "42")
            .header("x-username", "ops")
            .header("x-forwarded-for", "203.0.113.7");
        match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_reports_cached_connections() {
        let app = app(FakeDriver::new(EngineKind::MySQL));
        let response = app
            .router
            .oneshot(Request::builder().uri("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["connections"], 0);
    }

    #[tokio::test]
    async fn test_query_requires_identity() {
        let app = app(FakeDriver::new(EngineKind::MySQL));
        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/databases/query")
            .header("content-type", "application/json")
            .body(Body::from(json!({"database_id": 1, "sql": "SELECT 1"}).to_string()))
            .unwrap();
        let response = app.router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(app.audits.records().is_empty());
    }

    #[tokio::test]
    async fn test_query_returns_rows() {
        let result = QueryResult::new(
            vec!["id".into(), "payload".into()],
            vec![vec![CellValue::Integer(1), CellValue::from_bytes(b"raw")]],
        );
        let app = app(FakeDriver::new(EngineKind::MySQL).returning(result));
        let response = app
            .router
            .oneshot(authed(
                "POST",
                "/api/v1/databases/query",
                Some(json!({"database_id": 1, "sql": "SELECT id, payload FROM t WHERE id = 1"})),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["columns"], json!(["id", "payload"]));
        assert_eq!(body["data"]["rows"], json!([[1, "raw"]]));
        assert_eq!(app.audits.records()[0].client_ip, "203.0.113.7");
    }

    #[tokio::test]
    async fn test_high_risk_query_is_forbidden() {
        let app = app(FakeDriver::new(EngineKind::MySQL));
        let response = app
            .router
            .oneshot(authed(
                "POST",
                "/api/v1/databases/query",
                Some(json!({"database_id": 1, "sql": "drop table users"})),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body = json_body(response).await;
        assert_eq!(body["error"]["code"], "RISK_REJECTED");
        assert_eq!(body["error"]["details"]["risk"], "high");
        assert_eq!(app.driver.opens(), 0);
        assert_eq!(app.audits.records().len(), 1);
    }

    #[tokio::test]
    async fn test_oversized_sql_is_rejected_before_execution() {
        let app = app(FakeDriver::new(EngineKind::MySQL));
        let sql = format!("SELECT '{}' FROM t WHERE id = 1", "a".repeat(1_000_000));
        let response = app
            .router
            .oneshot(authed(
                "POST",
                "/api/v1/databases/query",
                Some(json!({"database_id": 1, "sql": sql})),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(app.driver.opens(), 0);
        assert!(app.audits.records().is_empty());
    }

    #[tokio::test]
    async fn test_analyze_does_not_execute() {
        let app = app(FakeDriver::new(EngineKind::MySQL));
        let response = app
            .router
            .oneshot(authed(
                "POST",
                "/api/v1/sql/analyze",
                Some(json!({"sql": "SELECT * FROM t"})),
            ))
            .await
            .unwrap();

        let body = json_body(response).await;
        assert_eq!(body["data"]["risk"], "medium");
        assert_eq!(body["data"]["description"], "full table scan risk");
        assert!(app.audits.records().is_empty());
    }

    #[tokio::test]
    async fn test_database_crud_hides_password() {
        let app = app(FakeDriver::new(EngineKind::MySQL));
        let response = app
            .router
            .clone()
            .oneshot(authed(
                "POST",
                "/api/v1/databases",
                Some(json!({
                    "name": "analytics",
                    "type": "postgresql",
                    "host": "10.0.0.9",
                    "port": 5432,
                    "username": "reader",
                    "password": "top-secret",
                    "database": "warehouse"
                })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["data"]["type"], "postgresql");
        assert!(body["data"].get("password").is_none());
        let id = body["data"]["id"].as_u64().unwrap();

        let response = app
            .router
            .clone()
            .oneshot(authed("GET", &format!("/api/v1/databases/{}", id), None))
            .await
            .unwrap();
        assert_eq!(json_body(response).await["data"]["name"], "analytics");

        let response = app
            .router
            .oneshot(authed("GET", "/api/v1/databases?page=1&pageSize=10&type=postgresql", None))
            .await
            .unwrap();
        let body = json_body(response).await;
        assert_eq!(body["data"]["pagination"]["total"], 1);
    }

    #[tokio::test]
    async fn test_invalid_registration_is_rejected() {
        let app = app(FakeDriver::new(EngineKind::MySQL));
        let response = app
            .router
            .oneshot(authed(
                "POST",
                "/api/v1/databases",
                Some(json!({
                    "name": "",
                    "type": "mysql",
                    "host": "h",
                    "port": 3306,
                    "username": "u",
                    "password": "",
                    "database": "d"
                })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unreachable_connection_test_reports_failure() {
        let app = app(FakeDriver::new(EngineKind::MySQL).unreachable());
        let response = app
            .router
            .oneshot(authed(
                "POST",
                "/api/v1/databases/test",
                Some(json!({
                    "type": "mysql",
                    "host": "192.0.2.1",
                    "port": 3306,
                    "username": "u",
                    "password": "p",
                    "database": "d"
                })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["data"]["success"], false);
        assert!(body["data"]["error"].as_str().unwrap().contains("connection refused"));
    }

    #[tokio::test]
    async fn test_tables_and_audits() {
        let app = app(FakeDriver::new(EngineKind::MySQL));
        let response = app
            .router
            .clone()
            .oneshot(authed("GET", "/api/v1/databases/tables?database_id=1", None))
            .await
            .unwrap();
        let body = json_body(response).await;
        assert_eq!(body["data"][0]["name"], "users");

        let response = app
            .router
            .clone()
            .oneshot(authed(
                "POST",
                "/api/v1/databases/query",
                Some(json!({"database_id": 1, "sql": "SELECT 1"})),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .router
            .oneshot(authed("GET", "/api/v1/audits?database_id=1&status=success", None))
            .await
            .unwrap();
        let body = json_body(response).await;
        assert_eq!(body["data"]["pagination"]["total"], 1);
        assert_eq!(body["data"]["items"][0]["username"], "ops");
    }
}
