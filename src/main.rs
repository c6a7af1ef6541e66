//! rankgraph 主入口
//! 从数据库加载权限图并报告一致性

use rankgraph::{
    config::AppConfig,
    db,
    graph::LoadReport,
    repository::GroupRepository,
    services::GroupService,
    telemetry,
};
use std::{collections::BTreeMap, sync::Arc};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ===== CLI 参数处理 =====
    let args: Vec<String> = std::env::args().collect();
    let mut strict = false;

    if args.len() > 1 {
        match args[1].as_str() {
            "--version" => {
                println!("rankgraph {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--help" => {
                print_help();
                return Ok(());
            }
            "--check" => strict = true,
            _ => {
                eprintln!("未知参数: {}", args[1]);
                print_help();
                std::process::exit(1);
            }
        }
    }

    // 加载 .env 文件（开发环境）
    if let Ok(path) = std::env::var("RANKGRAPH_ENV") {
        dotenv::from_filename(format!(".env.{}", path)).ok();
    } else {
        dotenv::from_filename(".env.local").ok();
        dotenv::dotenv().ok();
    }

    // 1. 加载配置
    let config = AppConfig::from_env().map_err(|e| {
        eprintln!("Configuration error: {}", e);
        anyhow::anyhow!("Failed to load configuration: {}", e)
    })?;

    // 2. 初始化日志
    telemetry::init_telemetry(&config.logging);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "rankgraph starting...");

    // 3. 数据库连接池 + 迁移
    let db_pool = db::create_pool(&config.database).await?;
    if config.database.run_migrations {
        db::run_migrations(&db_pool).await?;
    }
    let health = db::health_check(&db_pool).await;
    if !health.is_healthy() {
        anyhow::bail!("Database unhealthy: {:?}", health);
    }
    db::record_pool_metrics(&db_pool);

    // 4. 加载权限图
    let store = Arc::new(GroupRepository::new(db_pool.clone()));
    let (service, report) = GroupService::load(store, config.graph).await?;
    log_report(&report);

    {
        let registry = service.read().await;
        tracing::info!(
            groups = registry.group_count(),
            ids = registry.resolvable_id_count(),
            links = registry.link_count(),
            "Group graph ready"
        );
    }

    db_pool.close().await;

    if strict && !report.is_clean() {
        eprintln!("{} inconsistent rows dropped", report.warnings.len());
        std::process::exit(2);
    }
    Ok(())
}

/// 按警告种类汇总
fn log_report(report: &LoadReport) {
    let mut by_kind: BTreeMap<&'static str, usize> = BTreeMap::new();
    for warning in &report.warnings {
        *by_kind.entry(warning.kind()).or_default() += 1;
    }
    for (kind, count) in by_kind {
        tracing::warn!(kind, count, "Dropped rows during load");
    }
    tracing::info!(
        rows = report.rows,
        permissions = report.permissions,
        groups = report.groups,
        dropped = report.warnings.len(),
        "Load report"
    );
}

/// 打印帮助信息
fn print_help() {
    println!("rankgraph {}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("用法: rankgraph [选项]");
    println!();
    println!("选项:");
    println!("  --version     打印版本信息并退出");
    println!("  --help        打印此帮助信息并退出");
    println!("  --check       加载时若有被丢弃的行则以状态码 2 退出");
    println!();
    println!("环境变量:");
    println!("  所有配置通过 RANKGRAPH_ 前缀的环境变量完成");
    println!("  可用选项请参考 .env.example");
}
