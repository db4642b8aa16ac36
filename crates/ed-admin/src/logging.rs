//! 日志初始化

use crate::config::LoggingConfig;
use anyhow::{anyhow, Context, Result};
use tracing_subscriber::EnvFilter;

/// 日志输出格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Full,
    Compact,
    Pretty,
}

impl LogFormat {
    pub fn parse(format: &str) -> Result<Self> {
        match format.trim().to_ascii_lowercase().as_str() {
            "full" | "" => Ok(LogFormat::Full),
            "compact" => Ok(LogFormat::Compact),
            "pretty" => Ok(LogFormat::Pretty),
            other => Err(anyhow!("unknown log format '{}'", other)),
        }
    }
}

/// 构建日志过滤器，`RUST_LOG` 优先于配置
pub fn build_filter(level: &str) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(level).with_context(|| format!("invalid log level '{}'", level)),
    }
}

/// 安装全局日志订阅器
///
/// 重复初始化时保留已有订阅器并返回 `Ok(false)`。
pub fn init_logging(config: &LoggingConfig) -> Result<bool> {
    let filter = build_filter(&config.level)?;
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let installed = match LogFormat::parse(&config.format)? {
        LogFormat::Full => builder.try_init().is_ok(),
        LogFormat::Compact => builder.compact().try_init().is_ok(),
        LogFormat::Pretty => builder.pretty().try_init().is_ok(),
    };

    if installed {
        tracing::info!("Logging initialised at '{}' ({})", config.level, config.format);
    }
    Ok(installed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_formats() {
        assert_eq!(LogFormat::parse("Compact").unwrap(), LogFormat::Compact);
        assert_eq!(LogFormat::parse("").unwrap(), LogFormat::Full);
        assert!(LogFormat::parse("xml").is_err());
    }

    #[test]
    fn test_init_twice_is_tolerated() {
        let config = LoggingConfig {
            level: "debug,ed_audit=info".to_string(),
            format: "compact".to_string(),
        };
        assert!(init_logging(&config).is_ok());
        assert!(!init_logging(&config).unwrap());
    }
}
