//! 转换审计

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ed_core::{CaseStatus, Result};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use uuid::Uuid;

use crate::state_machine::CaseEvent;

/// 一条已提交转换的审计记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub case_id: Uuid,
    pub case_number: String,
    pub facility_id: String,
    /// 登记时为空
    pub from: Option<CaseStatus>,
    pub to: CaseStatus,
    pub event: CaseEvent,
    pub version: u64,
    pub at: DateTime<Utc>,
}

/// 审计接收端
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, record: &TransitionRecord) -> Result<()>;
}

/// 写入 `ed_audit` 日志目标的审计接收端
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, record: &TransitionRecord) -> Result<()> {
        let from = record
            .from
            .map(|status| status.to_string())
            .unwrap_or_else(|| "-".to_string());
        tracing::info!(
            target: "ed_audit",
            case_id = %record.case_id,
            facility = %record.facility_id,
            version = record.version,
            "{} {:?}: {} -> {}",
            record.case_number,
            record.event,
            from,
            record.to
        );
        Ok(())
    }
}

/// 保存在内存中的审计接收端
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    records: Mutex<Vec<TransitionRecord>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<TransitionRecord> {
        self.records.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// 指定病例的记录，按版本排序
    pub fn records_for(&self, case_id: Uuid) -> Vec<TransitionRecord> {
        let mut records: Vec<TransitionRecord> = self
            .records()
            .into_iter()
            .filter(|r| r.case_id == case_id)
            .collect();
        records.sort_by_key(|r| r.version);
        records
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn record(&self, record: &TransitionRecord) -> Result<()> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_sink_orders_by_version() {
        let sink = MemoryAuditSink::new();
        let case_id = Uuid::new_v4();
        for (version, from, to, event) in [
            (2, Some(CaseStatus::AwaitingTriage), CaseStatus::Triaged, CaseEvent::Triage),
            (1, None, CaseStatus::AwaitingTriage, CaseEvent::Intake),
        ] {
            sink.record(&TransitionRecord {
                case_id,
                case_number: "EM20261018-0001".to_string(),
                facility_id: "north".to_string(),
                from,
                to,
                event,
                version,
                at: Utc::now(),
            })
            .await
            .unwrap();
        }

        let records = sink.records_for(case_id);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].event, CaseEvent::Intake);
        assert!(sink.records_for(Uuid::new_v4()).is_empty());
    }
}
