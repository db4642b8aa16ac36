//! 流转事件
//!
//! 引擎在每次提交转换后广播事件，看板与监控订阅使用。

use crate::case::Assignment;
use chrono::{DateTime, Utc};
use ed_core::{BayId, DispositionOutcome, DoctorId, TriageLevel};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FlowEvent {
    CaseRegistered {
        facility_id: String,
        case_id: Uuid,
        case_number: String,
        at: DateTime<Utc>,
    },
    CaseTriaged {
        facility_id: String,
        case_id: Uuid,
        level: TriageLevel,
        retriage: bool,
        at: DateTime<Utc>,
    },
    TreatmentStarted {
        facility_id: String,
        case_id: Uuid,
        doctor_id: DoctorId,
        bay_id: BayId,
        at: DateTime<Utc>,
    },
    CaseReassigned {
        facility_id: String,
        case_id: Uuid,
        previous: Assignment,
        current: Assignment,
        at: DateTime<Utc>,
    },
    CaseDisposed {
        facility_id: String,
        case_id: Uuid,
        outcome: DispositionOutcome,
        at: DateTime<Utc>,
    },
}

impl FlowEvent {
    pub fn facility_id(&self) -> &str {
        match self {
            FlowEvent::CaseRegistered { facility_id, .. }
            | FlowEvent::CaseTriaged { facility_id, .. }
            | FlowEvent::TreatmentStarted { facility_id, .. }
            | FlowEvent::CaseReassigned { facility_id, .. }
            | FlowEvent::CaseDisposed { facility_id, .. } => facility_id,
        }
    }

    pub fn case_id(&self) -> Uuid {
        match self {
            FlowEvent::CaseRegistered { case_id, .. }
            | FlowEvent::CaseTriaged { case_id, .. }
            | FlowEvent::TreatmentStarted { case_id, .. }
            | FlowEvent::CaseReassigned { case_id, .. }
            | FlowEvent::CaseDisposed { case_id, .. } => *case_id,
        }
    }
}
