//! HTTP错误响应
//!
//! 所有失败都以 `{"message": ...}` 返回；内部错误只记录日志，对外统一为 "Server error"。

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use medrec_core::MedrecError;
use serde_json::json;
use tracing::error;

/// 处理器错误
#[derive(Debug)]
pub struct ApiError(pub MedrecError);

pub type ApiResult<T> = std::result::Result<T, ApiError>;

impl From<MedrecError> for ApiError {
    fn from(err: MedrecError) -> Self {
        Self(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            MedrecError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            MedrecError::InvalidCredential(_) | MedrecError::Permission(_) => StatusCode::FORBIDDEN,
            MedrecError::NotFound(_) => StatusCode::NOT_FOUND,
            MedrecError::Validation(_) => StatusCode::BAD_REQUEST,
            MedrecError::Conflict(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if self.0.is_internal() {
            error!("Request failed: {}", self.0);
            return (status, Json(json!({ "message": "Server error" }))).into_response();
        }

        let message = match self.0 {
            MedrecError::Unauthenticated(msg)
            | MedrecError::InvalidCredential(msg)
            | MedrecError::Permission(msg)
            | MedrecError::NotFound(msg)
            | MedrecError::Validation(msg)
            | MedrecError::Conflict(msg) => msg,
            other => other.to_string(),
        };

        (status, Json(json!({ "message": message }))).into_response()
    }
}
