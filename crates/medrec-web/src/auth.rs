//! 令牌签发与认证中间件
//!
//! 令牌为 HS256 签名的紧凑 JWT，载荷声明 `{id, role}` 以及签发/过期时间。
//! 服务端不保存任何会话状态，密钥与有效期在构造时注入。

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use medrec_core::{MedrecError, Result};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::ApiError;

type HmacSha256 = Hmac<Sha256>;

const BEARER_PREFIX: &str = "Bearer ";
const TOKEN_ALGORITHM: &str = "HS256";

/// 令牌中声明的身份，认证通过后放入请求扩展
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    pub role: String,
}

/// JWT Claims
#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    id: String,   // 患者内部ID
    role: String, // 角色
    iat: i64,     // 签发时间
    exp: i64,     // 过期时间
}

#[derive(Debug, Serialize, Deserialize)]
struct TokenHeader {
    alg: String,
    typ: String,
}

/// 签发结果
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// 令牌服务
#[derive(Clone)]
pub struct TokenService {
    secret: Vec<u8>,
    token_ttl: Duration,
}

impl TokenService {
    pub fn new(secret: impl Into<Vec<u8>>, token_ttl: Duration) -> Self {
        Self {
            secret: secret.into(),
            token_ttl,
        }
    }

    /// 签发令牌
    pub fn issue(&self, identity: &Identity) -> Result<IssuedToken> {
        self.issue_at(identity, Utc::now())
    }

    /// 以指定签发时间签发令牌
    pub fn issue_at(&self, identity: &Identity, issued_at: DateTime<Utc>) -> Result<IssuedToken> {
        let expires_at = issued_at + self.token_ttl;
        let header = TokenHeader {
            alg: TOKEN_ALGORITHM.to_string(),
            typ: "JWT".to_string(),
        };
        let claims = Claims {
            id: identity.id.clone(),
            role: identity.role.clone(),
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
        };

        let message = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header)?),
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims)?)
        );
        let signature = URL_SAFE_NO_PAD.encode(self.mac(message.as_bytes())?.finalize().into_bytes());

        Ok(IssuedToken {
            token: format!("{}.{}", message, signature),
            expires_at,
        })
    }

    /// 验证令牌签名与有效期
    pub fn verify(&self, token: &str) -> Result<Identity> {
        self.verify_at(token, Utc::now())
    }

    fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<Identity> {
        let parts: Vec<&str> = token.split('.').collect();
        let [header_b64, claims_b64, signature_b64] = parts.as_slice() else {
            return Err(invalid("Invalid token format"));
        };

        let header: TokenHeader = decode_segment(header_b64)?;
        if header.alg != TOKEN_ALGORITHM {
            return Err(invalid("Unsupported token algorithm"));
        }

        let signature = URL_SAFE_NO_PAD
            .decode(signature_b64)
            .map_err(|_| invalid("Invalid token encoding"))?;
        self.mac(format!("{}.{}", header_b64, claims_b64).as_bytes())?
            .verify_slice(&signature)
            .map_err(|_| invalid("Invalid token signature"))?;

        let claims: Claims = decode_segment(claims_b64)?;
        if claims.exp <= now.timestamp() {
            return Err(invalid("Token has expired"));
        }

        Ok(Identity {
            id: claims.id,
            role: claims.role,
        })
    }

    fn mac(&self, message: &[u8]) -> Result<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| MedrecError::Internal(format!("Failed to create HMAC: {}", e)))?;
        mac.update(message);
        Ok(mac)
    }
}

fn invalid(reason: &str) -> MedrecError {
    MedrecError::InvalidCredential(reason.to_string())
}

fn decode_segment<T: for<'de> Deserialize<'de>>(segment: &str) -> Result<T> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|_| invalid("Invalid token encoding"))?;
    serde_json::from_slice(&bytes).map_err(|_| invalid("Invalid token claims"))
}

/// 从 `Authorization` 头中取出 `Bearer ` 之后的令牌
pub fn bearer_token(headers: &HeaderMap) -> Result<&str> {
    let missing = || MedrecError::Unauthenticated("Access token is missing or invalid".to_string());

    let value = headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(missing)?;

    match value.strip_prefix(BEARER_PREFIX).map(str::trim) {
        Some(token) if !token.is_empty() => Ok(token),
        _ => Err(missing()),
    }
}

/// 认证中间件
pub async fn auth_middleware(
    State(tokens): State<Arc<TokenService>>,
    mut request: Request,
    next: Next,
) -> std::result::Result<Response, ApiError> {
    let identity = {
        let token = bearer_token(request.headers()).inspect_err(|_| {
            warn!("Rejected {} {}: missing bearer token", request.method(), request.uri().path());
        })?;
        tokens.verify(token).inspect_err(|e| {
            warn!("Rejected {} {}: {}", request.method(), request.uri().path(), e);
        })?
    };

    debug!("Authenticated identity {} ({})", identity.id, identity.role);
    request.extensions_mut().insert(identity);
    Ok(next.run(request).await)
}
