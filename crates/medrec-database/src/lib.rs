//! # MedRec数据库模块
//!
//! 以文档存储的方式保存患者、报告与处方记录：按条件查找、插入、更新和删除。
//! 提供内存实现（开发与测试）和基于 sqlx 的 PostgreSQL 实现。

pub mod connection;
pub mod memory;
pub mod models;
pub mod queries;
pub mod store;

// 重新导出主要类型
pub use connection::DatabasePool;
pub use memory::MemoryStore;
pub use queries::PostgresStore;
pub use store::DocumentStore;
