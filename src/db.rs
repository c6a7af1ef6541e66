//! 数据库连接池、迁移与 schema 健康检查
//!
//! 所有失败都归入 [`GraphError::StorageUnavailable`]，与仓储层保持同一种错误。

use crate::{
    config::DatabaseConfig,
    error::{GraphError, GraphResult},
};
use secrecy::ExposeSecret;
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;

/// 加载权限图所需的表
pub const REQUIRED_TABLES: &[&str] = &[
    "permissions",
    "graph_groups",
    "group_ranks",
    "group_members",
    "rank_permissions",
    "merged_groups",
    "group_links",
    "group_invitations",
    "group_action_log",
];

/// 创建数据库连接池
pub async fn create_pool(config: &DatabaseConfig) -> GraphResult<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
        .max_lifetime(Duration::from_secs(config.max_lifetime_secs))
        .test_before_acquire(true)
        .connect(config.url.expose_secret())
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to connect to group store");
            GraphError::StorageUnavailable(e)
        })?;

    tracing::info!(
        max_connections = config.max_connections,
        min_connections = config.min_connections,
        "Group store pool ready"
    );
    Ok(pool)
}

/// 执行 `migrations/` 下的 schema 迁移
pub async fn run_migrations(pool: &PgPool) -> GraphResult<()> {
    sqlx::migrate!("./migrations").run(pool).await.map_err(|e| {
        tracing::error!(error = %e, "Group store migration failed");
        GraphError::StorageUnavailable(sqlx::Error::Migrate(Box::new(e)))
    })?;

    tracing::info!("Group store schema is up to date");
    Ok(())
}

/// 健康状态
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    /// 无法执行查询
    Unreachable(String),
    /// 可以连接，但缺少加载所需的表（通常是未执行迁移）
    MissingTables(Vec<&'static str>),
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }
}

/// 检查连接可用且 [`REQUIRED_TABLES`] 全部存在
pub async fn health_check(pool: &PgPool) -> HealthStatus {
    let mut missing = Vec::new();
    for table in REQUIRED_TABLES {
        let exists = sqlx::query_scalar::<_, bool>("SELECT to_regclass($1) IS NOT NULL")
            .bind(*table)
            .fetch_one(pool)
            .await;
        match exists {
            Ok(true) => {}
            Ok(false) => missing.push(*table),
            Err(e) => {
                tracing::warn!(error = %e, "Group store health check failed");
                return HealthStatus::Unreachable(e.to_string());
            }
        }
    }

    if missing.is_empty() {
        tracing::debug!("Group store health check: OK");
        HealthStatus::Healthy
    } else {
        tracing::warn!(?missing, "Group store schema is incomplete");
        HealthStatus::MissingTables(missing)
    }
}

/// 记录连接池指标
pub fn record_pool_metrics(pool: &PgPool) {
    metrics::gauge!("rankgraph.db.pool.size").set(pool.size() as f64);
    metrics::gauge!("rankgraph.db.pool.idle").set(pool.num_idle() as f64);
}
