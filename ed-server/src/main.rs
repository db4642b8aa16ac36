//! 急诊流转服务主程序

mod scenario;

use anyhow::{Context, Result};
use clap::Parser;
use ed_admin::config::ConfigManager;
use ed_admin::logging::init_logging;
use ed_admin::EdSystem;
use ed_workflow::{CaseStore, InMemoryCaseStore};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// 急诊流转服务命令行参数
#[derive(Parser, Debug)]
#[command(name = "ed-server")]
#[command(about = "急诊科患者流转服务 (ED Patient Flow)")]
struct Args {
    /// 配置文件路径
    #[arg(short, long, default_value = "ed-flow.toml")]
    config: String,

    /// 日志级别，覆盖配置文件
    #[arg(short, long)]
    log_level: Option<String>,

    /// 回放场景文件并输出 JSON 结果
    #[arg(short, long)]
    scenario: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let manager = ConfigManager::new(&args.config)?;
    let config = manager.get_config().await;

    let mut logging = config.logging.clone();
    if let Some(level) = &args.log_level {
        logging.level = level.clone();
    }
    init_logging(&logging)?;

    if let Some(path) = &args.scenario {
        let scenario = scenario::Scenario::load(path).await?;
        info!("Replaying scenario {} ({} steps)", path.display(), scenario.steps.len());

        let report =
            scenario::run(&scenario, config.flow_settings(), config.flow.stats_bucket_minutes).await?;
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialize report")?
        );
        return Ok(());
    }

    info!("Starting {}", config.server.name);
    info!("  facilities: {}", config.facilities.len());
    info!("  LWBS timeout: {} min", config.flow.lwbs_timeout_minutes);

    let store: Arc<dyn CaseStore> = Arc::new(InMemoryCaseStore::new());
    let system = EdSystem::with_manager(manager, Some(store)).await?;
    system.start().await?;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    let report = system.generate_status_report().await?;
    info!(
        "Shutting down; {} facilities, uptime {}s",
        report.facilities.len(),
        report.uptime_seconds
    );
    system.stop().await;
    Ok(())
}
