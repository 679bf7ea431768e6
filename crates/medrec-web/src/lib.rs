//! # MedRec Web
//!
//! 病历系统的HTTP接口：患者档案、UID验证与令牌签发、报告上传、处方管理。

pub mod auth;
pub mod error;
pub mod handlers;
pub mod patients;
pub mod policy;
pub mod prescriptions;
pub mod reports;
pub mod server;
pub mod state;

pub use auth::{auth_middleware, Identity, IssuedToken, TokenService};
pub use error::{ApiError, ApiResult};
pub use policy::{access_middleware, AccessPolicy};
pub use reports::ReportService;
pub use server::{create_app, WebServer};
pub use state::AppState;
