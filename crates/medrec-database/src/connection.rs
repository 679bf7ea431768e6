//! 数据库连接管理

use medrec_core::{MedrecError, Result};
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;

/// 数据库连接池
#[derive(Clone)]
pub struct DatabasePool {
    pool: PgPool,
}

impl DatabasePool {
    /// 连接PostgreSQL
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(|e| MedrecError::Database(e.to_string()))?;

        info!("Connected to PostgreSQL (max_connections={})", max_connections);
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}
