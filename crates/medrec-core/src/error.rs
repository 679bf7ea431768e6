//! 错误定义模块

use thiserror::Error;

/// 病历系统统一错误类型
#[derive(Error, Debug)]
pub enum MedrecError {
    #[error("配置错误: {0}")]
    Config(String),

    #[error("数据库错误: {0}")]
    Database(String),

    #[error("存储错误: {0}")]
    Storage(String),

    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("验证错误: {0}")]
    Validation(String),

    /// 缺少凭证或凭证格式不正确
    #[error("未认证: {0}")]
    Unauthenticated(String),

    /// 签名错误、令牌损坏或已过期
    #[error("无效凭证: {0}")]
    InvalidCredential(String),

    #[error("权限错误: {0}")]
    Permission(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("资源冲突: {0}")]
    Conflict(String),

    #[error("系统内部错误: {0}")]
    Internal(String),
}

impl MedrecError {
    /// 是否属于服务端内部故障（需要记录详细日志、对外隐藏细节）
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            MedrecError::Config(_)
                | MedrecError::Database(_)
                | MedrecError::Storage(_)
                | MedrecError::Io(_)
                | MedrecError::Serialization(_)
                | MedrecError::Internal(_)
        )
    }
}

/// 病历系统统一结果类型
pub type Result<T> = std::result::Result<T, MedrecError>;
