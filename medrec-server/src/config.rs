//! 服务器配置
//!
//! 加载顺序：内置默认值 → 配置文件 → `MEDREC__SECTION__KEY` 环境变量 → 命令行参数

use config::{Config, Environment, File};
use medrec_core::{MedrecError, Result};
use medrec_storage::validation::DEFAULT_MAX_FILE_SIZE;
use serde::Deserialize;
use tracing::{error, info};

/// 服务完整配置
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub auth: AuthConfig,
}

/// 监听配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 4000,
        }
    }
}

/// 文档存储后端
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    #[default]
    Memory,
    Postgres,
}

/// 数据库配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub backend: DatabaseBackend,
    /// PostgreSQL连接串，`postgres` 后端必填
    pub url: Option<String>,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: DatabaseBackend::Memory,
            url: None,
            max_connections: 10,
        }
    }
}

/// 上传文件配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub upload_dir: String,
    /// 单个文件的最大字节数
    pub max_file_size: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_dir: "uploads".to_string(),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

/// 令牌与访问控制配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HMAC签名密钥
    pub secret: String,
    pub token_ttl_secs: i64,
    /// 允许访问受保护路由的角色，为空表示任何已认证身份
    pub required_roles: Vec<String>,
    pub protect_patient_routes: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            token_ttl_secs: 3600,
            required_roles: Vec::new(),
            protect_patient_routes: false,
        }
    }
}

/// 单条校验规则
struct ValidationRule {
    field_path: &'static str,
    validator: fn(&AppConfig) -> bool,
    error_message: &'static str,
}

fn validation_rules() -> Vec<ValidationRule> {
    vec![
        ValidationRule {
            field_path: "auth.secret",
            validator: |config| !config.auth.secret.trim().is_empty(),
            error_message: "Auth secret must be set",
        },
        ValidationRule {
            field_path: "auth.token_ttl_secs",
            validator: |config| config.auth.token_ttl_secs > 0,
            error_message: "Token TTL must be positive",
        },
        ValidationRule {
            field_path: "server.port",
            validator: |config| config.server.port != 0,
            error_message: "Server port cannot be 0",
        },
        ValidationRule {
            field_path: "storage.max_file_size",
            validator: |config| config.storage.max_file_size > 0,
            error_message: "Max file size cannot be 0",
        },
        ValidationRule {
            field_path: "database.url",
            validator: |config| {
                config.database.backend != DatabaseBackend::Postgres
                    || config
                        .database
                        .url
                        .as_deref()
                        .is_some_and(|url| !url.trim().is_empty())
            },
            error_message: "Database URL is required for the postgres backend",
        },
        ValidationRule {
            field_path: "database.max_connections",
            validator: |config| config.database.max_connections > 0,
            error_message: "Database max connections cannot be 0",
        },
    ]
}

impl AppConfig {
    /// 从可选配置文件与环境变量加载
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path));
        }

        let settings = builder
            .add_source(
                Environment::with_prefix("MEDREC")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("auth.required_roles"),
            )
            .build()
            .map_err(|e| MedrecError::Config(e.to_string()))?;

        let config: AppConfig = settings
            .try_deserialize()
            .map_err(|e| MedrecError::Config(format!("Failed to deserialize configuration: {}", e)))?;

        match config_path {
            Some(path) => info!("Configuration loaded from: {}", path),
            None => info!("Configuration loaded from defaults and environment"),
        }
        Ok(config)
    }

    /// 逐条校验配置
    pub fn validate(&self) -> Result<()> {
        for rule in validation_rules() {
            if !(rule.validator)(self) {
                error!("Configuration validation failed for {}", rule.field_path);
                return Err(MedrecError::Config(format!(
                    "{}: {}",
                    rule.field_path, rule.error_message
                )));
            }
        }

        info!("Configuration validation passed");
        Ok(())
    }
}
