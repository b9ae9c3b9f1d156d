pub mod schema;
pub mod sqlite_instance_repository;
pub mod sqlite_job_repository;
pub mod sqlite_machine_repository;
pub mod sqlite_task_repository;
pub mod transaction;

pub use transaction::SqliteTransaction;

use anyhow::{Context, Result};
use async_trait::async_trait;
use orchestra_core::config::models::DatabaseConfig;
use orchestra_core::SchedulerResult;
use orchestra_domain::repositories::{Transaction, TransactionManager};
use sqlx::SqlitePool;
use tracing::info;

/// SQLite 存储，实现全部仓储接口
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// 连接数据库并建表
    ///
    /// 内存数据库只存在于单个连接中，此时连接池固定为一个连接且连接不过期。
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let in_memory = config.url.contains(":memory:");
        let max_connections = if in_memory { 1 } else { config.max_connections };

        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(max_connections)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect(&config.url)
            .await
            .with_context(|| format!("连接数据库失败: {}", config.url))?;

        let store = Self { pool };
        store.migrate().await?;
        info!(url = %config.url, max_connections, "数据库已就绪");
        Ok(store)
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::raw_sql(schema::SCHEMA)
            .execute(&self.pool)
            .await
            .context("创建表结构失败")?;
        Ok(())
    }

    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl TransactionManager for SqliteStore {
    async fn begin(&self) -> SchedulerResult<Box<dyn Transaction>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(SqliteTransaction::new(tx)))
    }
}
