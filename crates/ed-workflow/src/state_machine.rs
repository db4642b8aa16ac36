//! 病例状态机
//!
//! 管理急诊病例从登记到处置的完整生命周期状态转换。
//! 所有转换都要求调用方持有的版本号与当前版本一致。

use crate::case::{Assignment, EmergencyCase, TriageRecord};
use crate::triage::{TriageAssessment, TriagePriorityCalculator};
use chrono::{DateTime, Duration, Utc};
use ed_core::utils::is_valid_case_number;
use ed_core::{
    ArrivalMode, CaseStatus, ComplaintCategory, DispositionOutcome, EdError, Result,
    VitalsSnapshot,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// 病例状态转换事件
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum CaseEvent {
    Intake,
    Triage,
    Retriage,
    StartTreatment,
    Reassign,
    Dispose,
    MarkLeftWithoutBeingSeen,
}

/// 携带数据的转换命令
#[derive(Debug, Clone)]
pub enum CaseCommand {
    Triage { vitals: VitalsSnapshot },
    Retriage { vitals: VitalsSnapshot },
    StartTreatment { assignment: Assignment },
    Reassign { assignment: Assignment },
    Dispose { outcome: DispositionOutcome },
    MarkLeftWithoutBeingSeen { timeout: Duration },
}

impl CaseCommand {
    pub fn event(&self) -> CaseEvent {
        match self {
            CaseCommand::Triage { .. } => CaseEvent::Triage,
            CaseCommand::Retriage { .. } => CaseEvent::Retriage,
            CaseCommand::StartTreatment { .. } => CaseEvent::StartTreatment,
            CaseCommand::Reassign { .. } => CaseEvent::Reassign,
            CaseCommand::Dispose { .. } => CaseEvent::Dispose,
            CaseCommand::MarkLeftWithoutBeingSeen { .. } => CaseEvent::MarkLeftWithoutBeingSeen,
        }
    }
}

/// 登记信息
#[derive(Debug, Clone)]
pub struct IntakeDetails {
    pub case_number: String,
    pub facility_id: String,
    pub patient_ref: Uuid,
    pub chief_complaint: ComplaintCategory,
    pub arrival_mode: ArrivalMode,
    pub arrival_time: DateTime<Utc>,
}

/// 一次已提交的转换
#[derive(Debug, Clone)]
pub struct TransitionOutcome {
    pub from: CaseStatus,
    pub to: CaseStatus,
    pub event: CaseEvent,
    pub version: u64,
    pub triage: Option<TriageAssessment>,
    pub released: Option<Assignment>,
}

/// 病例状态机
#[derive(Debug)]
pub struct CaseStateMachine {
    transitions: HashMap<(CaseStatus, CaseEvent), CaseStatus>,
}

impl CaseStateMachine {
    /// 创建新的状态机实例
    pub fn new() -> Self {
        let mut transitions = HashMap::new();

        transitions.insert((CaseStatus::AwaitingTriage, CaseEvent::Triage), CaseStatus::Triaged);
        transitions.insert((CaseStatus::Triaged, CaseEvent::Retriage), CaseStatus::Triaged);
        transitions.insert((CaseStatus::Triaged, CaseEvent::StartTreatment), CaseStatus::InTreatment);
        transitions.insert((CaseStatus::InTreatment, CaseEvent::Reassign), CaseStatus::InTreatment);
        transitions.insert((CaseStatus::InTreatment, CaseEvent::Dispose), CaseStatus::Disposed);
        transitions.insert(
            (CaseStatus::AwaitingTriage, CaseEvent::MarkLeftWithoutBeingSeen),
            CaseStatus::Disposed,
        );
        transitions.insert(
            (CaseStatus::Triaged, CaseEvent::MarkLeftWithoutBeingSeen),
            CaseStatus::Disposed,
        );

        Self { transitions }
    }

    /// 检查状态转换是否有效
    pub fn can_transition(&self, from: CaseStatus, event: CaseEvent) -> bool {
        self.transitions.contains_key(&(from, event))
    }

    /// 查询转换目标状态
    pub fn transition(&self, from: CaseStatus, event: CaseEvent) -> Result<CaseStatus> {
        match self.transitions.get(&(from, event)) {
            Some(to) => Ok(*to),
            None => Err(EdError::InvalidTransition {
                from: from.to_string(),
                event: format!("{:?}", event),
            }),
        }
    }

    /// 获取所有可能的状态
    pub fn get_all_states() -> Vec<CaseStatus> {
        vec![
            CaseStatus::AwaitingTriage,
            CaseStatus::Triaged,
            CaseStatus::InTreatment,
            CaseStatus::Disposed,
        ]
    }

    /// 获取状态的所有可能事件
    pub fn get_possible_events(&self, current_state: CaseStatus) -> Vec<CaseEvent> {
        self.transitions
            .keys()
            .filter(|(state, _)| *state == current_state)
            .map(|(_, event)| *event)
            .collect()
    }

    /// 登记新病例，进入待分诊状态
    pub fn intake(&self, details: IntakeDetails) -> Result<EmergencyCase> {
        if !is_valid_case_number(&details.case_number) {
            return Err(EdError::Validation(format!(
                "invalid case number '{}'",
                details.case_number
            )));
        }
        if details.facility_id.trim().is_empty() {
            return Err(EdError::Validation("facility id is required".to_string()));
        }

        Ok(EmergencyCase::new(
            details.case_number,
            details.facility_id,
            details.patient_ref,
            details.chief_complaint,
            details.arrival_mode,
            details.arrival_time,
        ))
    }

    /// 检查版本号与转换合法性，不修改病例
    pub fn check(&self, case: &EmergencyCase, expected_version: u64, event: CaseEvent) -> Result<CaseStatus> {
        if case.version() != expected_version {
            return Err(EdError::ConcurrencyConflict {
                case_id: case.id(),
                expected: expected_version,
                actual: case.version(),
            });
        }
        self.transition(case.status(), event)
    }

    /// 执行状态转换
    ///
    /// 所有守卫在修改前检查，失败时病例保持原样。
    pub fn apply(
        &self,
        case: &mut EmergencyCase,
        expected_version: u64,
        command: CaseCommand,
        at: DateTime<Utc>,
    ) -> Result<TransitionOutcome> {
        let from = case.status();
        let event = command.event();
        let to = self.check(case, expected_version, event)?;
        let mut triage = None;
        let mut released = None;

        match command {
            CaseCommand::Triage { vitals } | CaseCommand::Retriage { vitals } => {
                vitals.validate()?;
                let assessment = TriagePriorityCalculator::compute(case.chief_complaint(), &vitals);
                case.record_triage(TriageRecord {
                    vitals,
                    level: assessment.level,
                    rationale: assessment.rationale.clone(),
                    triaged_at: at,
                });
                triage = Some(assessment);
            }
            CaseCommand::StartTreatment { assignment } => {
                case.begin_treatment(assignment);
            }
            CaseCommand::Reassign { assignment } => {
                if let Some(current) = case.assignment() {
                    if current.doctor_id == assignment.doctor_id && current.bay_id == assignment.bay_id {
                        return Err(EdError::Validation(
                            "reassignment must change the doctor or the bay".to_string(),
                        ));
                    }
                    released = Some(current.clone());
                }
                case.replace_assignment(assignment);
            }
            CaseCommand::Dispose { outcome } => {
                if outcome == DispositionOutcome::LeftWithoutBeingSeen {
                    return Err(EdError::Validation(
                        "left-without-being-seen is recorded by the timeout check only".to_string(),
                    ));
                }
                released = case.assignment().cloned();
                case.close(outcome, at);
            }
            CaseCommand::MarkLeftWithoutBeingSeen { timeout } => {
                let waited = at - case.arrival_time();
                if waited <= timeout || case.assignment().is_some() {
                    return Err(EdError::Validation(format!(
                        "case {} waited {} min, timeout is {} min",
                        case.case_number(),
                        waited.num_minutes(),
                        timeout.num_minutes()
                    )));
                }
                case.close(DispositionOutcome::LeftWithoutBeingSeen, at);
            }
        }

        case.bump_version();

        Ok(TransitionOutcome {
            from,
            to,
            event,
            version: case.version(),
            triage,
            released,
        })
    }
}

impl Default for CaseStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed_core::{BayId, Consciousness, DoctorId, TriageLevel};

    fn new_case(sm: &CaseStateMachine, arrival: DateTime<Utc>) -> EmergencyCase {
        sm.intake(IntakeDetails {
            case_number: "EM20261018-0001".to_string(),
            facility_id: "north".to_string(),
            patient_ref: Uuid::new_v4(),
            chief_complaint: ComplaintCategory::Fracture,
            arrival_mode: ArrivalMode::WalkIn,
            arrival_time: arrival,
        })
        .unwrap()
    }

    fn vitals(at: DateTime<Utc>) -> VitalsSnapshot {
        VitalsSnapshot {
            heart_rate: Some(90),
            consciousness: Some(Consciousness::Alert),
            ..VitalsSnapshot::new(at)
        }
    }

    fn assignment(doctor: &str, bay: &str, at: DateTime<Utc>) -> Assignment {
        Assignment {
            doctor_id: DoctorId::new(doctor),
            bay_id: BayId::new(bay),
            assigned_at: at,
        }
    }

    #[test]
    fn test_valid_transitions() {
        let sm = CaseStateMachine::new();

        assert!(sm.can_transition(CaseStatus::AwaitingTriage, CaseEvent::Triage));
        assert!(sm.can_transition(CaseStatus::Triaged, CaseEvent::Retriage));
        assert!(sm.can_transition(CaseStatus::Triaged, CaseEvent::StartTreatment));
        assert!(sm.can_transition(CaseStatus::InTreatment, CaseEvent::Dispose));
    }

    #[test]
    fn test_invalid_transitions() {
        let sm = CaseStateMachine::new();

        assert!(!sm.can_transition(CaseStatus::AwaitingTriage, CaseEvent::StartTreatment));
        assert!(!sm.can_transition(CaseStatus::InTreatment, CaseEvent::MarkLeftWithoutBeingSeen));
        for event in sm.get_possible_events(CaseStatus::Triaged) {
            assert!(sm.transition(CaseStatus::Triaged, event).is_ok());
        }
        assert!(sm.get_possible_events(CaseStatus::Disposed).is_empty());
    }

    #[test]
    fn test_full_lifecycle() {
        let sm = CaseStateMachine::new();
        let t0 = Utc::now();
        let mut case = new_case(&sm, t0);
        assert_eq!(case.status(), CaseStatus::AwaitingTriage);
        assert_eq!(case.version(), 1);
        assert!(case.check_invariants());

        let outcome = sm
            .apply(&mut case, 1, CaseCommand::Triage { vitals: vitals(t0) }, t0)
            .unwrap();
        assert_eq!(outcome.to, CaseStatus::Triaged);
        assert_eq!(case.triage_level(), Some(TriageLevel::URGENT));
        assert!(case.check_invariants());

        sm.apply(
            &mut case,
            2,
            CaseCommand::StartTreatment { assignment: assignment("d1", "b1", t0) },
            t0,
        )
        .unwrap();
        assert_eq!(case.status(), CaseStatus::InTreatment);
        assert!(case.check_invariants());

        let outcome = sm
            .apply(&mut case, 3, CaseCommand::Dispose { outcome: DispositionOutcome::Admitted }, t0)
            .unwrap();
        assert_eq!(outcome.released.unwrap().doctor_id, DoctorId::new("d1"));
        assert_eq!(case.status(), CaseStatus::Disposed);
        assert_eq!(case.version(), 4);
        assert!(case.assignment().is_none());
        assert!(case.check_invariants());

        // 终态不可再变
        let err = sm
            .apply(&mut case, 4, CaseCommand::Retriage { vitals: vitals(t0) }, t0)
            .unwrap_err();
        assert!(matches!(err, EdError::InvalidTransition { .. }));
    }

    #[test]
    fn test_stale_version_is_rejected() {
        let sm = CaseStateMachine::new();
        let t0 = Utc::now();
        let mut case = new_case(&sm, t0);
        let before = case.clone();

        let err = sm
            .apply(&mut case, 7, CaseCommand::Triage { vitals: vitals(t0) }, t0)
            .unwrap_err();
        assert!(matches!(err, EdError::ConcurrencyConflict { expected: 7, actual: 1, .. }));
        assert_eq!(case, before);
    }

    #[test]
    fn test_retriage_keeps_history() {
        let sm = CaseStateMachine::new();
        let t0 = Utc::now();
        let mut case = new_case(&sm, t0);
        sm.apply(&mut case, 1, CaseCommand::Triage { vitals: vitals(t0) }, t0).unwrap();

        let mut worse = vitals(t0);
        worse.oxygen_saturation = Some(89);
        sm.apply(&mut case, 2, CaseCommand::Retriage { vitals: worse }, t0).unwrap();

        assert_eq!(case.triage_history().len(), 2);
        assert_eq!(case.triage_level(), Some(TriageLevel::RESUSCITATION));
        assert_eq!(case.vitals().unwrap().oxygen_saturation, Some(89));
        assert_eq!(case.triage_history()[0].level, TriageLevel::URGENT);
    }

    #[test]
    fn test_failed_guard_leaves_case_untouched() {
        let sm = CaseStateMachine::new();
        let t0 = Utc::now();
        let mut case = new_case(&sm, t0);
        let before = case.clone();

        let empty = VitalsSnapshot::new(t0);
        assert!(sm.apply(&mut case, 1, CaseCommand::Triage { vitals: empty }, t0).is_err());
        assert_eq!(case, before);
    }

    #[test]
    fn test_left_without_being_seen_guard() {
        let sm = CaseStateMachine::new();
        let t0 = Utc::now();
        let mut case = new_case(&sm, t0);

        let early = sm.apply(
            &mut case,
            1,
            CaseCommand::MarkLeftWithoutBeingSeen { timeout: Duration::minutes(30) },
            t0 + Duration::minutes(10),
        );
        assert!(matches!(early, Err(EdError::Validation(_))));

        sm.apply(
            &mut case,
            1,
            CaseCommand::MarkLeftWithoutBeingSeen { timeout: Duration::minutes(30) },
            t0 + Duration::minutes(31),
        )
        .unwrap();
        assert_eq!(case.disposition(), Some(DispositionOutcome::LeftWithoutBeingSeen));
    }

    #[test]
    fn test_manual_dispose_rejects_lwbs_outcome() {
        let sm = CaseStateMachine::new();
        let t0 = Utc::now();
        let mut case = new_case(&sm, t0);
        sm.apply(&mut case, 1, CaseCommand::Triage { vitals: vitals(t0) }, t0).unwrap();
        sm.apply(
            &mut case,
            2,
            CaseCommand::StartTreatment { assignment: assignment("d1", "b1", t0) },
            t0,
        )
        .unwrap();

        let err = sm
            .apply(
                &mut case,
                3,
                CaseCommand::Dispose { outcome: DispositionOutcome::LeftWithoutBeingSeen },
                t0,
            )
            .unwrap_err();
        assert!(matches!(err, EdError::Validation(_)));
        assert_eq!(case.status(), CaseStatus::InTreatment);
    }

    #[test]
    fn test_intake_requires_case_number() {
        let sm = CaseStateMachine::new();
        let result = sm.intake(IntakeDetails {
            case_number: String::new(),
            facility_id: "north".to_string(),
            patient_ref: Uuid::new_v4(),
            chief_complaint: ComplaintCategory::Other,
            arrival_mode: ArrivalMode::Ambulance,
            arrival_time: Utc::now(),
        });
        assert!(matches!(result, Err(EdError::Validation(_))));
    }
}
