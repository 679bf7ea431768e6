//! MedRec服务器主程序

mod config;

use anyhow::Context;
use clap::Parser;
use medrec_database::{DatabasePool, DocumentStore, MemoryStore, PostgresStore};
use medrec_storage::{ContentStore, UploadPolicy};
use medrec_web::{AccessPolicy, AppState, TokenService, WebServer};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::{AppConfig, DatabaseBackend};

/// MedRec服务器命令行参数
#[derive(Parser, Debug)]
#[command(name = "medrec-server")]
#[command(about = "病历管理系统 (MedRec) 服务器")]
struct Args {
    /// 配置文件路径
    #[arg(short, long)]
    config: Option<String>,

    /// 监听地址
    #[arg(long)]
    host: Option<String>,

    /// 监听端口
    #[arg(short, long)]
    port: Option<u16>,

    /// 上传文件目录
    #[arg(short, long)]
    upload_dir: Option<String>,

    /// 日志级别，`RUST_LOG` 优先
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn apply_overrides(&self, config: &mut AppConfig) {
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(upload_dir) = &self.upload_dir {
            config.storage.upload_dir = upload_dir.clone();
        }
    }
}

async fn build_store(config: &AppConfig) -> anyhow::Result<Arc<dyn DocumentStore>> {
    match config.database.backend {
        DatabaseBackend::Memory => {
            warn!("Using in-memory document store, records are lost on restart");
            Ok(Arc::new(MemoryStore::new()))
        }
        DatabaseBackend::Postgres => {
            let url = config
                .database
                .url
                .as_deref()
                .context("database.url is required for the postgres backend")?;
            let pool = DatabasePool::connect(url, config.database.max_connections).await?;
            let store = PostgresStore::new(pool);
            store.create_tables().await?;
            Ok(Arc::new(store))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // 初始化日志
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting MedRec server...");

    let mut config = AppConfig::load(args.config.as_deref())?;
    args.apply_overrides(&mut config);
    config.validate()?;

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| {
            format!(
                "Invalid listen address {}:{}",
                config.server.host, config.server.port
            )
        })?;

    info!("MedRec server configuration:");
    info!("  Listen address: {}", addr);
    info!("  Database backend: {:?}", config.database.backend);
    info!("  Upload directory: {}", config.storage.upload_dir);
    info!("  Max file size: {} bytes", config.storage.max_file_size);

    let store = build_store(&config).await?;

    let content = ContentStore::new(&config.storage.upload_dir);
    content.init().await?;

    let tokens = TokenService::new(
        config.auth.secret.as_bytes(),
        chrono::Duration::seconds(config.auth.token_ttl_secs),
    );
    let access_policy = AccessPolicy::roles(config.auth.required_roles.iter().cloned());
    if config.auth.protect_patient_routes {
        info!("Patient routes require a bearer token");
    } else {
        warn!("Patient routes are served without authentication");
    }

    let state = AppState::new(
        store,
        content,
        tokens,
        UploadPolicy::new(config.storage.max_file_size),
    )
    .with_access_policy(access_policy)
    .with_protected_patient_routes(config.auth.protect_patient_routes);

    WebServer::new(addr, state).run().await?;

    Ok(())
}
