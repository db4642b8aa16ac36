//! 医生与床位分配
//!
//! 保证活跃分配中 病例→资源 与 资源→病例 两个方向始终一一对应，
//! 任何医生或床位都不会被重复占用。资源被占用时立即返回错误，不排队等待。

use crate::case::Assignment;
use chrono::{DateTime, Utc};
use ed_core::{BayId, DoctorId, EdError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use uuid::Uuid;

/// 院区资源名册（人员目录与床位登记的本地视图）
///
/// 名册为空时接受任意标识。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceRoster {
    pub doctors: BTreeSet<DoctorId>,
    pub bays: BTreeSet<BayId>,
}

impl ResourceRoster {
    pub fn new<D, B>(doctors: D, bays: B) -> Self
    where
        D: IntoIterator<Item = DoctorId>,
        B: IntoIterator<Item = BayId>,
    {
        Self {
            doctors: doctors.into_iter().collect(),
            bays: bays.into_iter().collect(),
        }
    }

    pub fn knows_doctor(&self, doctor_id: &DoctorId) -> bool {
        self.doctors.is_empty() || self.doctors.contains(doctor_id)
    }

    pub fn knows_bay(&self, bay_id: &BayId) -> bool {
        self.bays.is_empty() || self.bays.contains(bay_id)
    }
}

/// 分配协调器
#[derive(Debug, Default, Clone)]
pub struct AssignmentCoordinator {
    roster: ResourceRoster,
    by_case: HashMap<Uuid, Assignment>,
    doctors: HashMap<DoctorId, Uuid>,
    bays: HashMap<BayId, Uuid>,
}

impl AssignmentCoordinator {
    pub fn new(roster: ResourceRoster) -> Self {
        Self {
            roster,
            ..Default::default()
        }
    }

    pub fn roster(&self) -> &ResourceRoster {
        &self.roster
    }

    /// 更换名册，仍被占用的医生或床位不能移出名册
    pub fn set_roster(&mut self, roster: ResourceRoster) -> Result<()> {
        if let Some((doctor_id, holder)) = self
            .doctors
            .iter()
            .find(|(doctor_id, _)| !roster.knows_doctor(doctor_id))
        {
            return Err(EdError::ResourceUnavailable {
                resource: doctor_id.to_string(),
                held_by: *holder,
            });
        }
        if let Some((bay_id, holder)) = self.bays.iter().find(|(bay_id, _)| !roster.knows_bay(bay_id)) {
            return Err(EdError::ResourceUnavailable {
                resource: bay_id.to_string(),
                held_by: *holder,
            });
        }
        self.roster = roster;
        Ok(())
    }

    /// 检查资源是否可分配给指定病例（不修改状态）
    pub fn check_available(&self, case_id: Uuid, doctor_id: &DoctorId, bay_id: &BayId) -> Result<()> {
        if !self.roster.knows_doctor(doctor_id) {
            return Err(EdError::Validation(format!("unknown {}", doctor_id)));
        }
        if !self.roster.knows_bay(bay_id) {
            return Err(EdError::Validation(format!("unknown {}", bay_id)));
        }
        if let Some(holder) = self.doctors.get(doctor_id).filter(|holder| **holder != case_id) {
            return Err(EdError::ResourceUnavailable {
                resource: doctor_id.to_string(),
                held_by: *holder,
            });
        }
        if let Some(holder) = self.bays.get(bay_id).filter(|holder| **holder != case_id) {
            return Err(EdError::ResourceUnavailable {
                resource: bay_id.to_string(),
                held_by: *holder,
            });
        }
        Ok(())
    }

    /// 为病例绑定医生和床位
    pub fn assign(
        &mut self,
        case_id: Uuid,
        doctor_id: DoctorId,
        bay_id: BayId,
        at: DateTime<Utc>,
    ) -> Result<Assignment> {
        if self.by_case.contains_key(&case_id) {
            return Err(EdError::Validation(format!(
                "case {} already holds an assignment",
                case_id
            )));
        }
        self.check_available(case_id, &doctor_id, &bay_id)?;

        let assignment = Assignment {
            doctor_id: doctor_id.clone(),
            bay_id: bay_id.clone(),
            assigned_at: at,
        };
        self.doctors.insert(doctor_id, case_id);
        self.bays.insert(bay_id, case_id);
        self.by_case.insert(case_id, assignment.clone());

        tracing::info!(
            "Assigned {} and {} to case {}",
            assignment.doctor_id,
            assignment.bay_id,
            case_id
        );
        Ok(assignment)
    }

    /// 释放病例持有的资源
    pub fn release(&mut self, case_id: Uuid) -> Option<Assignment> {
        let assignment = self.by_case.remove(&case_id)?;
        self.doctors.remove(&assignment.doctor_id);
        self.bays.remove(&assignment.bay_id);
        tracing::info!("Released resources held by case {}", case_id);
        Some(assignment)
    }

    /// 交接：释放旧资源并绑定新资源，对调用方是一个原子操作
    ///
    /// 新资源可以与旧资源部分相同（例如只换医生不换床位）。
    pub fn reassign(
        &mut self,
        case_id: Uuid,
        doctor_id: DoctorId,
        bay_id: BayId,
        at: DateTime<Utc>,
    ) -> Result<(Assignment, Assignment)> {
        if !self.by_case.contains_key(&case_id) {
            return Err(EdError::NotFound(format!("case {} holds no assignment", case_id)));
        }
        self.check_available(case_id, &doctor_id, &bay_id)?;

        let previous = self
            .release(case_id)
            .ok_or_else(|| EdError::Internal(format!("assignment of {} vanished", case_id)))?;
        let current = self.assign(case_id, doctor_id, bay_id, at)?;
        Ok((previous, current))
    }

    /// 恢复已存在的分配（从存储重建时使用）
    pub fn restore(&mut self, case_id: Uuid, assignment: Assignment) -> Result<()> {
        if let Some(holder) = self.doctors.get(&assignment.doctor_id) {
            return Err(EdError::ResourceUnavailable {
                resource: assignment.doctor_id.to_string(),
                held_by: *holder,
            });
        }
        if let Some(holder) = self.bays.get(&assignment.bay_id) {
            return Err(EdError::ResourceUnavailable {
                resource: assignment.bay_id.to_string(),
                held_by: *holder,
            });
        }
        self.doctors.insert(assignment.doctor_id.clone(), case_id);
        self.bays.insert(assignment.bay_id.clone(), case_id);
        self.by_case.insert(case_id, assignment);
        Ok(())
    }

    pub fn assignment_of(&self, case_id: Uuid) -> Option<&Assignment> {
        self.by_case.get(&case_id)
    }

    pub fn case_for_doctor(&self, doctor_id: &DoctorId) -> Option<Uuid> {
        self.doctors.get(doctor_id).copied()
    }

    pub fn case_for_bay(&self, bay_id: &BayId) -> Option<Uuid> {
        self.bays.get(bay_id).copied()
    }

    pub fn active_count(&self) -> usize {
        self.by_case.len()
    }

    /// 名册中当前空闲的医生
    pub fn free_doctors(&self) -> Vec<DoctorId> {
        self.roster
            .doctors
            .iter()
            .filter(|d| !self.doctors.contains_key(*d))
            .cloned()
            .collect()
    }

    /// 名册中当前空闲的床位
    pub fn free_bays(&self) -> Vec<BayId> {
        self.roster
            .bays
            .iter()
            .filter(|b| !self.bays.contains_key(*b))
            .cloned()
            .collect()
    }

    /// 双向映射是否一致
    pub fn is_consistent(&self) -> bool {
        self.doctors.len() == self.by_case.len()
            && self.bays.len() == self.by_case.len()
            && self.by_case.iter().all(|(case_id, a)| {
                self.doctors.get(&a.doctor_id) == Some(case_id)
                    && self.bays.get(&a.bay_id) == Some(case_id)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doctor(id: &str) -> DoctorId {
        DoctorId::new(id)
    }

    fn bay(id: &str) -> BayId {
        BayId::new(id)
    }

    #[test]
    fn test_doctor_cannot_be_double_booked() {
        let mut coordinator = AssignmentCoordinator::default();
        let x = Uuid::new_v4();
        let y = Uuid::new_v4();
        let now = Utc::now();

        coordinator.assign(x, doctor("D1"), bay("B1"), now).unwrap();
        let err = coordinator.assign(y, doctor("D1"), bay("B2"), now).unwrap_err();
        assert!(matches!(err, EdError::ResourceUnavailable { held_by, .. } if held_by == x));

        let err = coordinator.assign(y, doctor("D2"), bay("B1"), now).unwrap_err();
        assert!(matches!(err, EdError::ResourceUnavailable { .. }));
        assert_eq!(coordinator.active_count(), 1);
        assert!(coordinator.is_consistent());
    }

    #[test]
    fn test_release_frees_both_resources() {
        let mut coordinator = AssignmentCoordinator::default();
        let x = Uuid::new_v4();
        let y = Uuid::new_v4();
        let now = Utc::now();

        coordinator.assign(x, doctor("D1"), bay("B1"), now).unwrap();
        assert!(coordinator.release(x).is_some());
        assert!(coordinator.release(x).is_none());

        coordinator.assign(y, doctor("D1"), bay("B1"), now).unwrap();
        assert_eq!(coordinator.case_for_doctor(&doctor("D1")), Some(y));
        assert!(coordinator.is_consistent());
    }

    #[test]
    fn test_reassign_is_atomic() {
        let mut coordinator = AssignmentCoordinator::default();
        let x = Uuid::new_v4();
        let y = Uuid::new_v4();
        let now = Utc::now();

        coordinator.assign(x, doctor("D1"), bay("B1"), now).unwrap();
        coordinator.assign(y, doctor("D2"), bay("B2"), now).unwrap();

        // 目标医生被占用时旧分配保持不变
        assert!(coordinator.reassign(x, doctor("D2"), bay("B1"), now).is_err());
        assert_eq!(coordinator.assignment_of(x).unwrap().doctor_id, doctor("D1"));

        // 只换医生，保留床位
        let (previous, current) = coordinator.reassign(x, doctor("D3"), bay("B1"), now).unwrap();
        assert_eq!(previous.doctor_id, doctor("D1"));
        assert_eq!(current.doctor_id, doctor("D3"));
        assert_eq!(coordinator.case_for_doctor(&doctor("D1")), None);
        assert_eq!(coordinator.case_for_bay(&bay("B1")), Some(x));
        assert!(coordinator.is_consistent());
    }

    #[test]
    fn test_roster_rejects_unknown_resources() {
        let roster = ResourceRoster::new(vec![doctor("D1"), doctor("D2")], vec![bay("Resus 1")]);
        let mut coordinator = AssignmentCoordinator::new(roster);
        let now = Utc::now();

        let err = coordinator
            .assign(Uuid::new_v4(), doctor("D9"), bay("Resus 1"), now)
            .unwrap_err();
        assert!(matches!(err, EdError::Validation(_)));

        coordinator.assign(Uuid::new_v4(), doctor("D1"), bay("Resus 1"), now).unwrap();
        assert_eq!(coordinator.free_doctors(), vec![doctor("D2")]);
        assert!(coordinator.free_bays().is_empty());
    }

    #[test]
    fn test_roster_update_keeps_bound_resources() {
        let roster = ResourceRoster::new(vec![doctor("D1"), doctor("D2")], vec![bay("B1"), bay("B2")]);
        let mut coordinator = AssignmentCoordinator::new(roster);
        let x = Uuid::new_v4();
        coordinator.assign(x, doctor("D1"), bay("B1"), Utc::now()).unwrap();

        let without_d1 = ResourceRoster::new(vec![doctor("D2")], vec![bay("B1"), bay("B2")]);
        let err = coordinator.set_roster(without_d1).unwrap_err();
        assert!(matches!(err, EdError::ResourceUnavailable { held_by, .. } if held_by == x));

        let without_b1 = ResourceRoster::new(vec![doctor("D1")], vec![bay("B2")]);
        assert!(coordinator.set_roster(without_b1).is_err());
        assert_eq!(coordinator.roster().doctors.len(), 2);

        // 释放后可以移出
        coordinator.release(x);
        let smaller = ResourceRoster::new(vec![doctor("D2")], vec![bay("B2")]);
        coordinator.set_roster(smaller).unwrap();
        assert_eq!(coordinator.free_doctors(), vec![doctor("D2")]);
    }
}
