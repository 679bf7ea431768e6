//! 基于角色的访问策略
//!
//! 策略在路由组上显式挂载，位于认证中间件之后。

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use medrec_core::{MedrecError, Result};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::warn;

use crate::auth::Identity;
use crate::error::ApiError;

/// 管理员角色
pub const ADMIN_ROLE: &str = "admin";

/// 访问策略：允许的角色集合，为空时任何已认证身份均可访问
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AccessPolicy {
    allowed_roles: BTreeSet<String>,
}

impl AccessPolicy {
    /// 任何持有有效令牌的身份
    pub fn any_authenticated() -> Self {
        Self::default()
    }

    pub fn roles<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed_roles: roles
                .into_iter()
                .map(Into::into)
                .filter(|role: &String| !role.trim().is_empty())
                .collect(),
        }
    }

    pub fn admin_only() -> Self {
        Self::roles([ADMIN_ROLE])
    }

    pub fn permits(&self, identity: &Identity) -> bool {
        self.allowed_roles.is_empty() || self.allowed_roles.contains(&identity.role)
    }

    pub fn check(&self, identity: Option<&Identity>) -> Result<()> {
        let identity = identity.ok_or_else(|| {
            MedrecError::Unauthenticated("Access token is missing or invalid".to_string())
        })?;

        if self.permits(identity) {
            Ok(())
        } else {
            Err(MedrecError::Permission("Insufficient role".to_string()))
        }
    }
}

/// 角色检查中间件
pub async fn access_middleware(
    State(policy): State<Arc<AccessPolicy>>,
    request: Request,
    next: Next,
) -> std::result::Result<Response, ApiError> {
    policy
        .check(request.extensions().get::<Identity>())
        .inspect_err(|e| warn!("Access denied to {}: {}", request.uri().path(), e))?;
    Ok(next.run(request).await)
}
