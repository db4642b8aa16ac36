//! 急诊病例实体
//!
//! 病例只能通过 [`crate::state_machine::CaseStateMachine`] 修改，外部只读。

use chrono::{DateTime, Utc};
use ed_core::{
    ArrivalMode, BayId, CaseStatus, ComplaintCategory, DispositionOutcome, DoctorId, TriageLevel,
    VitalsSnapshot,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 医生与床位绑定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub doctor_id: DoctorId,
    pub bay_id: BayId,
    pub assigned_at: DateTime<Utc>,
}

/// 单次分诊记录，重新分诊时追加而非覆盖
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriageRecord {
    pub vitals: VitalsSnapshot,
    pub level: TriageLevel,
    pub rationale: Vec<String>,
    pub triaged_at: DateTime<Utc>,
}

/// 急诊病例
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmergencyCase {
    id: Uuid,
    case_number: String,
    facility_id: String,
    patient_ref: Uuid,
    chief_complaint: ComplaintCategory,
    arrival_mode: ArrivalMode,
    arrival_time: DateTime<Utc>,
    triage_history: Vec<TriageRecord>,
    triage_level: Option<TriageLevel>,
    status: CaseStatus,
    assignment: Option<Assignment>,
    disposition: Option<DispositionOutcome>,
    treatment_started_at: Option<DateTime<Utc>>,
    disposed_at: Option<DateTime<Utc>>,
    version: u64,
}

impl EmergencyCase {
    pub(crate) fn new(
        case_number: String,
        facility_id: String,
        patient_ref: Uuid,
        chief_complaint: ComplaintCategory,
        arrival_mode: ArrivalMode,
        arrival_time: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            case_number,
            facility_id,
            patient_ref,
            chief_complaint,
            arrival_mode,
            arrival_time,
            triage_history: Vec::new(),
            triage_level: None,
            status: CaseStatus::AwaitingTriage,
            assignment: None,
            disposition: None,
            treatment_started_at: None,
            disposed_at: None,
            version: 1,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn case_number(&self) -> &str {
        &self.case_number
    }

    pub fn facility_id(&self) -> &str {
        &self.facility_id
    }

    pub fn patient_ref(&self) -> Uuid {
        self.patient_ref
    }

    pub fn chief_complaint(&self) -> ComplaintCategory {
        self.chief_complaint
    }

    pub fn arrival_mode(&self) -> ArrivalMode {
        self.arrival_mode
    }

    pub fn arrival_time(&self) -> DateTime<Utc> {
        self.arrival_time
    }

    /// 当前生命体征（最近一次分诊）
    pub fn vitals(&self) -> Option<&VitalsSnapshot> {
        self.triage_history.last().map(|record| &record.vitals)
    }

    pub fn triage_history(&self) -> &[TriageRecord] {
        &self.triage_history
    }

    pub fn triage_level(&self) -> Option<TriageLevel> {
        self.triage_level
    }

    /// 首次分诊时间
    pub fn first_triaged_at(&self) -> Option<DateTime<Utc>> {
        self.triage_history.first().map(|record| record.triaged_at)
    }

    pub fn status(&self) -> CaseStatus {
        self.status
    }

    pub fn assignment(&self) -> Option<&Assignment> {
        self.assignment.as_ref()
    }

    pub fn disposition(&self) -> Option<DispositionOutcome> {
        self.disposition
    }

    pub fn treatment_started_at(&self) -> Option<DateTime<Utc>> {
        self.treatment_started_at
    }

    pub fn disposed_at(&self) -> Option<DateTime<Utc>> {
        self.disposed_at
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// 从到达至 `now` 的等待分钟数
    pub fn minutes_since_arrival(&self, now: DateTime<Utc>) -> i64 {
        (now - self.arrival_time).num_minutes().max(0)
    }

    /// 候诊时间是否已超过当前级别的目标等待时间
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        match (self.status.is_waiting(), self.triage_level) {
            (true, Some(level)) => self.minutes_since_arrival(now) > level.max_wait_minutes(),
            _ => false,
        }
    }

    pub(crate) fn record_triage(&mut self, record: TriageRecord) {
        self.triage_level = Some(record.level);
        self.triage_history.push(record);
        self.status = CaseStatus::Triaged;
    }

    pub(crate) fn begin_treatment(&mut self, assignment: Assignment) {
        self.treatment_started_at = Some(assignment.assigned_at);
        self.assignment = Some(assignment);
        self.status = CaseStatus::InTreatment;
    }

    pub(crate) fn replace_assignment(&mut self, assignment: Assignment) {
        self.assignment = Some(assignment);
    }

    pub(crate) fn close(&mut self, outcome: DispositionOutcome, at: DateTime<Utc>) {
        self.assignment = None;
        self.disposition = Some(outcome);
        self.disposed_at = Some(at);
        self.status = CaseStatus::Disposed;
    }

    pub(crate) fn bump_version(&mut self) {
        self.version += 1;
    }

    /// 检查实体不变量
    pub fn check_invariants(&self) -> bool {
        let level_ok = match self.status {
            CaseStatus::AwaitingTriage => self.triage_level.is_none(),
            CaseStatus::Disposed => true,
            _ => self.triage_level.is_some(),
        };
        let assignment_ok = self.assignment.is_some() == (self.status == CaseStatus::InTreatment);
        let disposition_ok = self.disposition.is_some() == self.status.is_terminal();
        level_ok && assignment_ok && disposition_ok
    }
}

/// 看板使用的病例摘要
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseSummary {
    pub case_id: Uuid,
    pub case_number: String,
    pub patient_ref: Uuid,
    pub chief_complaint: ComplaintCategory,
    pub status: CaseStatus,
    pub triage_level: Option<TriageLevel>,
    pub arrival_time: DateTime<Utc>,
    pub wait_minutes: i64,
    pub overdue: bool,
    pub assignment: Option<Assignment>,
    pub version: u64,
}

impl CaseSummary {
    pub fn from_case(case: &EmergencyCase, now: DateTime<Utc>) -> Self {
        Self {
            case_id: case.id(),
            case_number: case.case_number().to_string(),
            patient_ref: case.patient_ref(),
            chief_complaint: case.chief_complaint(),
            status: case.status(),
            triage_level: case.triage_level(),
            arrival_time: case.arrival_time(),
            wait_minutes: case.minutes_since_arrival(now),
            overdue: case.is_overdue(now),
            assignment: case.assignment().cloned(),
            version: case.version(),
        }
    }
}
