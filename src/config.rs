//! 配置系统
//! 从环境变量加载所有配置，使用 Secret 包装敏感信息

use crate::{
    error::{GraphError, GraphResult},
    graph::GraphLimits,
};
use config::{Config, Environment};
use serde::Deserialize;
use secrecy::Secret;

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// 数据库连接 URL（使用 Secret 包装，防止日志泄露）
    pub url: Secret<String>,
    /// 最大连接数
    pub max_connections: u32,
    /// 最小连接数
    pub min_connections: u32,
    /// 获取连接超时时间（秒）
    pub acquire_timeout_secs: u64,
    /// 空闲连接超时时间（秒）
    pub idle_timeout_secs: u64,
    /// 连接最大生命周期（秒）
    pub max_lifetime_secs: u64,
    /// 启动时是否执行迁移
    pub run_migrations: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// 日志级别: trace, debug, info, warn, error
    pub level: String,
    /// 日志格式: json, pretty
    pub format: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub graph: GraphLimits,
}

impl AppConfig {
    /// 从环境变量加载配置，任何失败都以 [`GraphError::Config`] 返回
    pub fn from_env() -> GraphResult<Self> {
        let limits = GraphLimits::default();
        let mut settings = Config::builder();

        // 添加默认配置
        settings = settings
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("database.acquire_timeout_secs", 30)?
            .set_default("database.idle_timeout_secs", 600)?
            .set_default("database.max_lifetime_secs", 1800)?
            .set_default("database.run_migrations", true)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "json")?
            .set_default("graph.max_group_name_length", limits.max_group_name_length as u64)?
            .set_default("graph.max_rank_name_length", limits.max_rank_name_length as u64)?;

        // 从环境变量加载配置（前缀为 RANKGRAPH_）
        settings = settings.add_source(
            Environment::with_prefix("RANKGRAPH")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = settings.build()?.try_deserialize()?;

        // 验证配置
        config.validate()?;

        Ok(config)
    }

    /// 验证配置合法性
    fn validate(&self) -> GraphResult<()> {
        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(GraphError::Config(format!(
                    "Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
                    self.logging.level
                )))
            }
        }

        match self.logging.format.to_lowercase().as_str() {
            "json" | "pretty" => {}
            _ => {
                return Err(GraphError::Config(format!(
                    "Invalid log format: {}. Must be one of: json, pretty",
                    self.logging.format
                )))
            }
        }

        if self.database.max_connections < self.database.min_connections {
            return Err(GraphError::Config(
                "max_connections must be >= min_connections".to_string(),
            ));
        }

        // 名称限制需要与数据库列宽一致
        if self.graph.max_group_name_length == 0 || self.graph.max_group_name_length > 255 {
            return Err(GraphError::Config(
                "max_group_name_length must be between 1 and 255".to_string(),
            ));
        }
        if self.graph.max_rank_name_length == 0 || self.graph.max_rank_name_length > 40 {
            return Err(GraphError::Config(
                "max_rank_name_length must be between 1 and 40".to_string(),
            ));
        }

        Ok(())
    }
}
