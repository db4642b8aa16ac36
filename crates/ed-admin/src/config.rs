//! 配置管理
//!
//! 从 TOML 文件与 `ED__` 前缀的环境变量加载配置，支持验证、更新与重新加载。

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use ed_core::{BayId, DoctorId};
use ed_workflow::{FlowSettings, ResourceRoster};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info};

/// 配置管理器
#[derive(Debug)]
pub struct ConfigManager {
    /// 配置数据
    config: Arc<RwLock<EdConfig>>,
    /// 配置文件路径
    config_path: String,
    /// 配置验证器
    validator: ConfigValidator,
}

/// 急诊流转系统完整配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EdConfig {
    pub server: ServerConfig,
    pub flow: FlowConfig,
    pub facilities: Vec<FacilityConfig>,
    pub logging: LoggingConfig,
    pub monitoring: MonitoringConfig,
}

/// 服务配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// 服务名称
    pub name: String,
}

/// 流转配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowConfig {
    /// 未就诊离开超时（分钟）
    pub lwbs_timeout_minutes: i64,
    /// LWBS 扫描间隔（秒）
    pub sweep_interval_seconds: u64,
    /// 事件广播容量
    pub event_buffer: usize,
    /// 统计分段长度（分钟）
    pub stats_bucket_minutes: i64,
}

/// 院区配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FacilityConfig {
    pub id: String,
    pub name: String,
    /// 医生名册，为空时接受任意医生
    pub doctors: Vec<String>,
    /// 床位名册，为空时接受任意床位
    pub bays: Vec<String>,
}

/// 日志配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 日志级别或过滤指令
    pub level: String,
    /// 输出格式：full、compact 或 pretty
    pub format: String,
}

/// 监控配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    pub enabled: bool,
    /// 候诊人数指标刷新间隔（秒）
    pub refresh_interval_seconds: u64,
}

impl EdConfig {
    /// 转换为引擎参数
    pub fn flow_settings(&self) -> FlowSettings {
        FlowSettings {
            lwbs_timeout: chrono::Duration::minutes(self.flow.lwbs_timeout_minutes),
            event_buffer: self.flow.event_buffer,
        }
    }
}

impl FacilityConfig {
    /// 院区资源名册
    pub fn roster(&self) -> ResourceRoster {
        ResourceRoster::new(
            self.doctors.iter().map(DoctorId::new),
            self.bays.iter().map(BayId::new),
        )
    }
}

/// 配置验证器
pub struct ConfigValidator {
    validation_rules: Vec<ValidationRule>,
}

struct ValidationRule {
    field_path: &'static str,
    validator: fn(&EdConfig) -> Result<()>,
}

impl ConfigManager {
    /// 从文件加载配置，文件不存在时使用默认值
    pub fn new(config_path: &str) -> Result<Self> {
        let config = Self::load_config(config_path)?;
        Self::from_config(config, config_path)
    }

    /// 使用已有配置创建管理器
    pub fn from_config(config: EdConfig, config_path: &str) -> Result<Self> {
        let validator = ConfigValidator::new();
        validator.validate(&config)?;

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            config_path: config_path.to_string(),
            validator,
        })
    }

    fn load_config(config_path: &str) -> Result<EdConfig> {
        let settings = Config::builder()
            .add_source(File::with_name(config_path).required(false))
            .add_source(Environment::with_prefix("ED").separator("__"))
            .build()
            .context("Failed to build configuration")?;

        let config: EdConfig = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        info!("Configuration loaded from: {}", config_path);
        Ok(config)
    }

    /// 获取配置
    pub async fn get_config(&self) -> EdConfig {
        self.config.read().await.clone()
    }

    pub fn config_path(&self) -> &str {
        &self.config_path
    }

    /// 更新配置并写回文件
    pub async fn update_config(&self, new_config: EdConfig) -> Result<()> {
        self.validator.validate(&new_config)?;

        {
            let mut config = self.config.write().await;
            *config = new_config;
        }

        self.save_config().await?;
        info!("Configuration updated");
        Ok(())
    }

    /// 保存配置到文件
    pub async fn save_config(&self) -> Result<()> {
        let config = self.config.read().await;
        let config_str =
            toml::to_string_pretty(&*config).context("Failed to serialize configuration")?;

        tokio::fs::write(&self.config_path, config_str)
            .await
            .context("Failed to write configuration file")?;

        info!("Configuration saved to: {}", self.config_path);
        Ok(())
    }

    /// 重新加载配置，验证失败时保留旧配置
    pub async fn reload_config(&self) -> Result<()> {
        let new_config = Self::load_config(&self.config_path)?;
        self.validator.validate(&new_config)?;
        *self.config.write().await = new_config;
        info!("Configuration reloaded");
        Ok(())
    }

    /// 验证当前配置
    pub async fn validate_config(&self) -> Result<()> {
        let config = self.config.read().await;
        self.validator.validate(&config)
    }
}

impl ConfigValidator {
    /// 创建新的配置验证器
    pub fn new() -> Self {
        let validation_rules = vec![
            ValidationRule {
                field_path: "flow.lwbs_timeout_minutes",
                validator: |config| {
                    anyhow::ensure!(config.flow.lwbs_timeout_minutes > 0, "LWBS timeout must be positive");
                    Ok(())
                },
            },
            ValidationRule {
                field_path: "flow.sweep_interval_seconds",
                validator: |config| {
                    anyhow::ensure!(config.flow.sweep_interval_seconds > 0, "sweep interval cannot be 0");
                    Ok(())
                },
            },
            ValidationRule {
                field_path: "flow.stats_bucket_minutes",
                validator: |config| {
                    anyhow::ensure!(config.flow.stats_bucket_minutes > 0, "stats bucket must be positive");
                    Ok(())
                },
            },
            ValidationRule {
                field_path: "monitoring.refresh_interval_seconds",
                validator: |config| {
                    anyhow::ensure!(
                        !config.monitoring.enabled || config.monitoring.refresh_interval_seconds > 0,
                        "refresh interval cannot be 0"
                    );
                    Ok(())
                },
            },
            ValidationRule {
                field_path: "facilities",
                validator: |config| {
                    let mut seen = HashSet::new();
                    for facility in &config.facilities {
                        anyhow::ensure!(!facility.id.trim().is_empty(), "facility id cannot be empty");
                        anyhow::ensure!(seen.insert(facility.id.as_str()), "duplicate facility '{}'", facility.id);
                        anyhow::ensure!(
                            unique(&facility.doctors),
                            "duplicate doctor in facility '{}'",
                            facility.id
                        );
                        anyhow::ensure!(unique(&facility.bays), "duplicate bay in facility '{}'", facility.id);
                    }
                    Ok(())
                },
            },
        ];

        Self { validation_rules }
    }

    /// 验证配置
    pub fn validate(&self, config: &EdConfig) -> Result<()> {
        for rule in &self.validation_rules {
            if let Err(e) = (rule.validator)(config) {
                error!("Configuration validation failed for {}: {}", rule.field_path, e);
                return Err(e.context(format!("invalid {}", rule.field_path)));
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for ConfigValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.validation_rules.iter().map(|rule| rule.field_path))
            .finish()
    }
}

impl Default for ConfigValidator {
    fn default() -> Self {
        Self::new()
    }
}

fn unique(ids: &[String]) -> bool {
    let mut seen = HashSet::new();
    ids.iter().all(|id| seen.insert(id.as_str()))
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: "ED-Flow".to_string(),
        }
    }
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            lwbs_timeout_minutes: 240,
            sweep_interval_seconds: 60,
            event_buffer: 256,
            stats_bucket_minutes: 60,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "full".to_string(),
        }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            refresh_interval_seconds: 15,
        }
    }
}
