//! Web服务器

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post, put},
    Router,
};
use medrec_core::Result;
use std::net::SocketAddr;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

use crate::auth::auth_middleware;
use crate::handlers::{api_root, health};
use crate::patients::{create_patient, delete_patient, get_patient, update_patient, verify_uid};
use crate::policy::access_middleware;
use crate::prescriptions::{
    create_prescription, delete_prescription, list_prescriptions, update_prescription,
};
use crate::reports::{delete_report, download_report, list_reports, update_report, upload_report};
use crate::state::AppState;

/// multipart 边界与文本字段的额外余量
const MULTIPART_OVERHEAD: u64 = 64 * 1024;

pub struct WebServer {
    addr: SocketAddr,
    app: Router,
}

impl WebServer {
    pub fn new(addr: SocketAddr, state: AppState) -> Self {
        Self {
            addr,
            app: create_app(state),
        }
    }

    pub async fn run(self) -> Result<()> {
        info!("Starting web server on {}", self.addr);

        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("Web server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

/// 构建完整路由
pub fn create_app(state: AppState) -> Router {
    let body_limit = usize::try_from(state.upload_policy.max_file_size + MULTIPART_OVERHEAD)
        .unwrap_or(usize::MAX);

    let patient_routes = Router::new()
        .route("/api/patients", post(create_patient))
        // 同一位置的路径参数：GET/PUT 视为UID，DELETE 视为内部ID
        .route(
            "/api/patients/:uid",
            get(get_patient).put(update_patient).delete(delete_patient),
        );
    let patient_routes = if state.protect_patient_routes {
        protect(patient_routes, &state)
    } else {
        patient_routes
    };

    Router::new()
        // 根路径
        .route("/", get(api_root))
        // 健康检查
        .route("/health", get(health))
        // 公开：UID验证并签发令牌
        .route("/api/patients/verify-uid", post(verify_uid))
        .merge(patient_routes)
        .merge(protect(report_routes(), &state))
        .merge(protect(prescription_routes(), &state))
        .layer(DefaultBodyLimit::max(body_limit))
        // 全局中间件
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods(Any)
                        .allow_headers(Any),
                ),
        )
        .with_state(state)
}

/// 认证在前，角色检查在后
fn protect(router: Router<AppState>, state: &AppState) -> Router<AppState> {
    router
        .route_layer(middleware::from_fn_with_state(
            state.access_policy.clone(),
            access_middleware,
        ))
        .route_layer(middleware::from_fn_with_state(
            state.tokens.clone(),
            auth_middleware,
        ))
}

/// 报告路由
fn report_routes() -> Router<AppState> {
    Router::new()
        .route("/api/reports/by-uid", post(upload_report))
        .route("/api/reports/by-uid/:uid", get(list_reports))
        .route(
            "/api/reports/by-uid/:uid/:id",
            put(update_report).delete(delete_report),
        )
        .route("/api/reports/by-uid/:uid/:id/file", get(download_report))
}

/// 处方路由
fn prescription_routes() -> Router<AppState> {
    Router::new()
        .route("/api/prescriptions/by-uid", post(create_prescription))
        .route("/api/prescriptions/by-uid/:uid", get(list_prescriptions))
        .route(
            "/api/prescriptions/by-uid/:uid/:id",
            put(update_prescription).delete(delete_prescription),
        )
}
