//! # 急诊流转管理模块
//!
//! 提供配置管理、日志初始化、流转指标以及后台任务编排

pub mod config;
pub mod logging;
pub mod monitoring;

use anyhow::{Context, Result};
use ed_workflow::{
    AuditSink, CaseStore, EmergencyFlowEngine, FlowStats, LwbsSweeper, QueueSnapshot, StatsWindow,
    TracingAuditSink,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// 系统管理器
///
/// 按配置组装引擎并管理后台任务
pub struct EdSystem {
    config_manager: Arc<config::ConfigManager>,
    engine: Arc<EmergencyFlowEngine>,
    monitor: Arc<monitoring::FlowMonitor>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl EdSystem {
    /// 从配置文件创建
    pub async fn new(config_path: &str) -> Result<Self> {
        let config_manager = config::ConfigManager::new(config_path)?;
        Self::with_manager(config_manager, None).await
    }

    /// 使用已有配置管理器与可选存储创建
    pub async fn with_manager(
        config_manager: config::ConfigManager,
        store: Option<Arc<dyn CaseStore>>,
    ) -> Result<Self> {
        let config = config_manager.get_config().await;

        let audit: Arc<dyn AuditSink> = Arc::new(TracingAuditSink);
        let mut engine = EmergencyFlowEngine::new(config.flow_settings()).with_audit(audit);
        if let Some(store) = store.clone() {
            engine = engine.with_store(store);
        }

        for facility in &config.facilities {
            engine
                .register_facility(&facility.id, facility.roster())
                .await
                .with_context(|| format!("Failed to register facility {}", facility.id))?;
            if store.is_some() {
                engine
                    .hydrate(&facility.id)
                    .await
                    .with_context(|| format!("Failed to hydrate facility {}", facility.id))?;
            }
        }

        Ok(Self {
            config_manager: Arc::new(config_manager),
            engine: Arc::new(engine),
            monitor: Arc::new(monitoring::FlowMonitor::new()?),
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// 启动后台任务
    pub async fn start(&self) -> Result<()> {
        tracing::info!("Starting ED flow services");
        let config = self.config_manager.get_config().await;
        let mut tasks = self.tasks.lock().await;

        tasks.push(LwbsSweeper::spawn(
            self.engine.clone(),
            Duration::from_secs(config.flow.sweep_interval_seconds),
        ));

        if config.monitoring.enabled {
            tasks.push(self.monitor.clone().spawn_consumer(self.engine.subscribe()));
            tasks.push(self.start_waiting_refresh(Duration::from_secs(
                config.monitoring.refresh_interval_seconds,
            )));
        }

        tracing::info!("ED flow services started ({} tasks)", tasks.len());
        Ok(())
    }

    /// 停止后台任务
    pub async fn stop(&self) {
        let mut tasks = self.tasks.lock().await;
        for task in tasks.drain(..) {
            task.abort();
        }
        tracing::info!("ED flow services stopped");
    }

    fn start_waiting_refresh(&self, every: Duration) -> JoinHandle<()> {
        let engine = self.engine.clone();
        let monitor = self.monitor.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                for (facility_id, waiting) in engine.waiting_counts().await {
                    monitor.set_waiting(&facility_id, waiting);
                }
            }
        })
    }

    pub fn config_manager(&self) -> &Arc<config::ConfigManager> {
        &self.config_manager
    }

    pub fn engine(&self) -> &Arc<EmergencyFlowEngine> {
        &self.engine
    }

    pub fn monitor(&self) -> &Arc<monitoring::FlowMonitor> {
        &self.monitor
    }

    /// 生成系统状态报告
    pub async fn generate_status_report(&self) -> Result<SystemStatusReport> {
        let config = self.config_manager.get_config().await;
        let now = self.engine.now();
        let window = StatsWindow::last_hours(now, 24, config.flow.stats_bucket_minutes)?;

        let mut facilities = Vec::new();
        for facility_id in self.engine.facility_ids().await {
            let queue = self.engine.queue_snapshot(&facility_id).await?;
            let stats = self.engine.flow_stats(&facility_id, &window).await?;
            facilities.push(FacilityReport { queue, stats });
        }

        Ok(SystemStatusReport {
            timestamp: now,
            uptime_seconds: self.monitor.uptime().as_secs(),
            facilities,
        })
    }
}

/// 院区报告
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct FacilityReport {
    pub queue: QueueSnapshot,
    pub stats: FlowStats,
}

/// 系统状态报告
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct SystemStatusReport {
    /// 报告生成时间
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub uptime_seconds: u64,
    pub facilities: Vec<FacilityReport>,
}
