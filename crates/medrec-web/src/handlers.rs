//! 服务级处理器

use axum::response::{IntoResponse, Json};
use serde_json::json;

/// API根路径处理器
pub async fn api_root() -> impl IntoResponse {
    Json(json!({
        "service": "MedRec Web API",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
        "endpoints": {
            "health": "/health",
            "patients": "/api/patients",
            "reports": "/api/reports/by-uid",
            "prescriptions": "/api/prescriptions/by-uid"
        }
    }))
}

/// 健康检查处理器
pub async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION")
    }))
}
