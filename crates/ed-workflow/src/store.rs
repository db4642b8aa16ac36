//! 病例持久化接口
//!
//! 院区内存状态是权威数据，存储只是其镜像，用于重启后重建。

use crate::case::EmergencyCase;
use async_trait::async_trait;
use ed_core::Result;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// 病例存储
#[async_trait]
pub trait CaseStore: Send + Sync {
    /// 保存病例快照
    async fn save(&self, case: &EmergencyCase) -> Result<()>;

    /// 按 ID 读取病例
    async fn get(&self, case_id: Uuid) -> Result<Option<EmergencyCase>>;

    /// 列出院区的全部病例
    async fn list_facility(&self, facility_id: &str) -> Result<Vec<EmergencyCase>>;
}

/// 内存存储
#[derive(Debug, Default)]
pub struct InMemoryCaseStore {
    cases: RwLock<HashMap<Uuid, EmergencyCase>>,
}

impl InMemoryCaseStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.cases.read().await.len()
    }
}

#[async_trait]
impl CaseStore for InMemoryCaseStore {
    async fn save(&self, case: &EmergencyCase) -> Result<()> {
        let mut cases = self.cases.write().await;
        match cases.get(&case.id()) {
            // 写入可能乱序到达，旧版本不覆盖新版本
            Some(existing) if existing.version() >= case.version() => {
                tracing::debug!(
                    "Ignoring stale write for case {} (v{} <= v{})",
                    case.case_number(),
                    case.version(),
                    existing.version()
                );
            }
            _ => {
                cases.insert(case.id(), case.clone());
            }
        }
        Ok(())
    }

    async fn get(&self, case_id: Uuid) -> Result<Option<EmergencyCase>> {
        Ok(self.cases.read().await.get(&case_id).cloned())
    }

    async fn list_facility(&self, facility_id: &str) -> Result<Vec<EmergencyCase>> {
        let cases = self.cases.read().await;
        let mut listed: Vec<EmergencyCase> = cases
            .values()
            .filter(|case| case.facility_id() == facility_id)
            .cloned()
            .collect();
        listed.sort_by(|a, b| a.case_number().cmp(b.case_number()));
        Ok(listed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_machine::{CaseCommand, CaseStateMachine, IntakeDetails};
    use chrono::Utc;
    use ed_core::{ArrivalMode, ComplaintCategory, VitalsSnapshot};

    fn intake(facility: &str, seq: u32) -> EmergencyCase {
        CaseStateMachine::new()
            .intake(IntakeDetails {
                case_number: format!("EM20261018-{:04}", seq),
                facility_id: facility.to_string(),
                patient_ref: Uuid::new_v4(),
                chief_complaint: ComplaintCategory::ModeratePain,
                arrival_mode: ArrivalMode::WalkIn,
                arrival_time: Utc::now(),
            })
            .unwrap()
    }

    #[tokio::test]
    async fn test_stale_version_is_ignored() {
        let store = InMemoryCaseStore::new();
        let sm = CaseStateMachine::new();
        let original = intake("north", 1);
        let mut triaged = original.clone();
        let vitals = VitalsSnapshot {
            heart_rate: Some(90),
            ..VitalsSnapshot::new(Utc::now())
        };
        sm.apply(&mut triaged, 1, CaseCommand::Triage { vitals }, Utc::now()).unwrap();

        store.save(&triaged).await.unwrap();
        store.save(&original).await.unwrap();

        let stored = store.get(original.id()).await.unwrap().unwrap();
        assert_eq!(stored.version(), 2);
    }

    #[tokio::test]
    async fn test_list_by_facility() {
        let store = InMemoryCaseStore::new();
        store.save(&intake("north", 2)).await.unwrap();
        store.save(&intake("north", 1)).await.unwrap();
        store.save(&intake("south", 1)).await.unwrap();

        let north = store.list_facility("north").await.unwrap();
        assert_eq!(north.len(), 2);
        assert_eq!(north[0].case_number(), "EM20261018-0001");
        assert_eq!(store.len().await, 3);
    }
}
