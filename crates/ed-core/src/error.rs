//! 错误定义模块

use thiserror::Error;
use uuid::Uuid;

/// 急诊流转统一错误类型
#[derive(Error, Debug)]
pub enum EdError {
    #[error("无效状态转换: 状态 {from} 不接受事件 {event}")]
    InvalidTransition { from: String, event: String },

    #[error("并发冲突: 病例 {case_id} 期望版本 {expected}, 当前版本 {actual}")]
    ConcurrencyConflict {
        case_id: Uuid,
        expected: u64,
        actual: u64,
    },

    #[error("资源不可用: {resource} 已被病例 {held_by} 占用")]
    ResourceUnavailable { resource: String, held_by: Uuid },

    #[error("验证错误: {0}")]
    Validation(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("配置错误: {0}")]
    Config(String),

    #[error("存储错误: {0}")]
    Storage(String),

    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("系统内部错误: {0}")]
    Internal(String),
}

impl EdError {
    /// 调用方重新读取后重试是否可能成功
    pub fn is_retriable(&self) -> bool {
        matches!(self, EdError::ConcurrencyConflict { .. })
    }
}

/// 急诊流转统一结果类型
pub type Result<T> = std::result::Result<T, EdError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_conflicts_are_retriable() {
        let conflict = EdError::ConcurrencyConflict {
            case_id: Uuid::new_v4(),
            expected: 1,
            actual: 2,
        };
        assert!(conflict.is_retriable());
        assert!(!EdError::Validation("bad".into()).is_retriable());
        assert!(!EdError::InvalidTransition {
            from: "Disposed".into(),
            event: "Triage".into(),
        }
        .is_retriable());
    }
}
