//! 候诊队列排序
//!
//! 维护单个院区内待分诊与已分诊病例的全序排列：
//! 分诊级别升序（未分诊排在所有已分诊级别之后），同级按到达时间，
//! 到达时间相同再按病例号字典序。

use chrono::{DateTime, Utc};
use ed_core::{EdError, Result, TriageLevel};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

/// 未分诊病例的排序档位
const UNTRIAGED_RANK: u8 = 6;

/// 排序键
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QueueKey {
    rank: u8,
    arrival_time: DateTime<Utc>,
    case_number: String,
}

impl QueueKey {
    pub fn new(level: Option<TriageLevel>, arrival_time: DateTime<Utc>, case_number: &str) -> Self {
        Self {
            rank: level.map(|l| l.value()).unwrap_or(UNTRIAGED_RANK),
            arrival_time,
            case_number: case_number.to_string(),
        }
    }

    pub fn triage_level(&self) -> Option<TriageLevel> {
        TriageLevel::new(self.rank).ok()
    }

    fn with_level(&self, level: Option<TriageLevel>) -> Self {
        Self::new(level, self.arrival_time, &self.case_number)
    }
}

/// 队列中的一项
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuePosition {
    pub position: usize,
    pub case_id: Uuid,
    pub case_number: String,
    pub triage_level: Option<TriageLevel>,
    pub arrival_time: DateTime<Utc>,
}

/// 候诊队列
#[derive(Debug, Default, Clone)]
pub struct QueueOrderer {
    ordered: BTreeMap<QueueKey, Uuid>,
    index: HashMap<Uuid, QueueKey>,
}

impl QueueOrderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// 插入病例，已存在时报错
    pub fn insert(
        &mut self,
        case_id: Uuid,
        case_number: &str,
        level: Option<TriageLevel>,
        arrival_time: DateTime<Utc>,
    ) -> Result<()> {
        if self.index.contains_key(&case_id) {
            return Err(EdError::Internal(format!("case {} is already queued", case_id)));
        }
        let key = QueueKey::new(level, arrival_time, case_number);
        if let Some(existing) = self.ordered.get(&key) {
            return Err(EdError::Internal(format!(
                "queue key collision between {} and {}",
                existing, case_id
            )));
        }
        self.ordered.insert(key.clone(), case_id);
        self.index.insert(case_id, key);
        Ok(())
    }

    /// 重新定位病例（分诊或重新分诊后）
    pub fn reposition(&mut self, case_id: Uuid, new_level: TriageLevel) -> Result<()> {
        let old_key = self
            .index
            .get(&case_id)
            .cloned()
            .ok_or_else(|| EdError::NotFound(format!("case {} is not queued", case_id)))?;
        let new_key = old_key.with_level(Some(new_level));
        if new_key == old_key {
            return Ok(());
        }

        self.ordered.remove(&old_key);
        self.ordered.insert(new_key.clone(), case_id);
        self.index.insert(case_id, new_key);

        tracing::debug!("Repositioned case {} to level {}", case_id, new_level.value());
        Ok(())
    }

    /// 移除病例，返回其是否在队列中
    pub fn remove(&mut self, case_id: Uuid) -> bool {
        match self.index.remove(&case_id) {
            Some(key) => {
                self.ordered.remove(&key);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, case_id: Uuid) -> bool {
        self.index.contains_key(&case_id)
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    /// 病例在队列中的位置（从 1 开始）
    pub fn position_of(&self, case_id: Uuid) -> Option<usize> {
        let key = self.index.get(&case_id)?;
        Some(self.ordered.range(..key.clone()).count() + 1)
    }

    /// 按序导出队列
    pub fn snapshot(&self) -> Vec<QueuePosition> {
        self.ordered
            .iter()
            .enumerate()
            .map(|(i, (key, case_id))| QueuePosition {
                position: i + 1,
                case_id: *case_id,
                case_number: key.case_number.clone(),
                triage_level: key.triage_level(),
                arrival_time: key.arrival_time,
            })
            .collect()
    }

    /// 队首病例
    pub fn peek(&self) -> Option<Uuid> {
        self.ordered.values().next().copied()
    }
}
