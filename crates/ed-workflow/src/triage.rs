//! 分诊优先级计算
//!
//! 纯函数：主诉分类 + 生命体征 → 分诊级别 + 依据列表。
//!
//! 计算步骤：
//! 1. 由主诉查表得到基础级别，未收录的主诉使用 3 级
//! 2. 依次评估生命体征升级规则，每条规则给出一个最低级别
//! 3. 评估意识水平（AVPU）升级规则
//! 4. 取所有适用级别中最紧急者
//!
//! 缺失的生命体征字段不参与评估。

use ed_core::{ComplaintCategory, Consciousness, TriageLevel, VitalsSnapshot};
use serde::{Deserialize, Serialize};

/// 主诉基础级别表
const BASE_LEVELS: &[(ComplaintCategory, TriageLevel)] = &[
    (ComplaintCategory::ChestPain, TriageLevel::RESUSCITATION),
    (ComplaintCategory::DifficultyBreathing, TriageLevel::RESUSCITATION),
    (ComplaintCategory::StrokeSymptoms, TriageLevel::RESUSCITATION),
    (ComplaintCategory::SevereBleeding, TriageLevel::RESUSCITATION),
    (ComplaintCategory::SevereAbdominalPain, TriageLevel::EMERGENT),
    (ComplaintCategory::HighFever, TriageLevel::EMERGENT),
    (ComplaintCategory::Fracture, TriageLevel::URGENT),
    (ComplaintCategory::ModeratePain, TriageLevel::URGENT),
    (ComplaintCategory::Laceration, TriageLevel::LESS_URGENT),
    (ComplaintCategory::MinorBurns, TriageLevel::LESS_URGENT),
    (ComplaintCategory::Sprain, TriageLevel::NON_URGENT),
    (ComplaintCategory::ColdFlu, TriageLevel::NON_URGENT),
    (ComplaintCategory::Other, TriageLevel::LESS_URGENT),
];

/// 主诉未收录时的默认级别
pub const FALLBACK_LEVEL: TriageLevel = TriageLevel::URGENT;

/// 升级规则：命中时返回描述，未命中或字段缺失时返回 `None`
struct EscalationRule {
    min_level: TriageLevel,
    check: fn(&VitalsSnapshot) -> Option<String>,
}

/// 按顺序评估的升级规则
const ESCALATION_RULES: &[EscalationRule] = &[
    EscalationRule {
        min_level: TriageLevel::RESUSCITATION,
        check: |v| below("oxygen saturation", v.oxygen_saturation.map(f64::from), 92.0),
    },
    EscalationRule {
        min_level: TriageLevel::RESUSCITATION,
        check: |v| above("heart rate", v.heart_rate.map(f64::from), 130.0),
    },
    EscalationRule {
        min_level: TriageLevel::RESUSCITATION,
        check: |v| below("heart rate", v.heart_rate.map(f64::from), 40.0),
    },
    EscalationRule {
        min_level: TriageLevel::RESUSCITATION,
        check: |v| below("systolic blood pressure", v.systolic_bp.map(f64::from), 90.0),
    },
    EscalationRule {
        min_level: TriageLevel::RESUSCITATION,
        check: |v| above("respiratory rate", v.respiratory_rate.map(f64::from), 30.0),
    },
    EscalationRule {
        min_level: TriageLevel::EMERGENT,
        check: |v| below("oxygen saturation", v.oxygen_saturation.map(f64::from), 95.0),
    },
    EscalationRule {
        min_level: TriageLevel::EMERGENT,
        check: |v| above("heart rate", v.heart_rate.map(f64::from), 110.0),
    },
    EscalationRule {
        min_level: TriageLevel::EMERGENT,
        check: |v| above("temperature", v.temperature, 39.0),
    },
    EscalationRule {
        min_level: TriageLevel::EMERGENT,
        check: |v| above("systolic blood pressure", v.systolic_bp.map(f64::from), 180.0),
    },
    EscalationRule {
        min_level: TriageLevel::RESUSCITATION,
        check: |v| match v.consciousness {
            Some(c @ (Consciousness::Unresponsive | Consciousness::PainResponsive)) => {
                Some(format!("consciousness {}", c.code()))
            }
            _ => None,
        },
    },
    EscalationRule {
        min_level: TriageLevel::EMERGENT,
        check: |v| match v.consciousness {
            Some(c @ Consciousness::VoiceResponsive) => Some(format!("consciousness {}", c.code())),
            _ => None,
        },
    },
];

fn below(name: &str, value: Option<f64>, threshold: f64) -> Option<String> {
    value
        .filter(|v| *v < threshold)
        .map(|v| format!("{} {} < {}", name, v, threshold))
}

fn above(name: &str, value: Option<f64>, threshold: f64) -> Option<String> {
    value
        .filter(|v| *v > threshold)
        .map(|v| format!("{} {} > {}", name, v, threshold))
}

/// 分诊结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriageAssessment {
    pub level: TriageLevel,
    pub rationale: Vec<String>,
}

/// 分诊优先级计算器
pub struct TriagePriorityCalculator;

impl TriagePriorityCalculator {
    /// 主诉的基础级别，未收录返回 `None`
    pub fn base_level(complaint: ComplaintCategory) -> Option<TriageLevel> {
        BASE_LEVELS
            .iter()
            .find(|(c, _)| *c == complaint)
            .map(|(_, level)| *level)
    }

    /// 计算分诊级别
    pub fn compute(complaint: ComplaintCategory, vitals: &VitalsSnapshot) -> TriageAssessment {
        let mut rationale = Vec::new();

        let mut level = match Self::base_level(complaint) {
            Some(base) => {
                rationale.push(format!("complaint {} sets base level {}", complaint, base.value()));
                base
            }
            None => {
                rationale.push(format!(
                    "complaint {} has no base level, using {}",
                    complaint,
                    FALLBACK_LEVEL.value()
                ));
                FALLBACK_LEVEL
            }
        };

        for rule in ESCALATION_RULES {
            // 已是 1 级时不再应用 2 级规则
            if rule.min_level != TriageLevel::RESUSCITATION && level == TriageLevel::RESUSCITATION {
                continue;
            }
            if let Some(finding) = (rule.check)(vitals) {
                rationale.push(format!("{} => level {}", finding, rule.min_level.value()));
                level = level.most_urgent(rule.min_level);
            }
        }

        TriageAssessment { level, rationale }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn normal_vitals() -> VitalsSnapshot {
        VitalsSnapshot {
            temperature: Some(36.8),
            heart_rate: Some(78),
            systolic_bp: Some(122),
            diastolic_bp: Some(80),
            respiratory_rate: Some(16),
            oxygen_saturation: Some(98),
            pain_score: Some(2),
            consciousness: Some(Consciousness::Alert),
            captured_at: Utc::now(),
        }
    }

    #[test]
    fn test_complaint_dominates_with_normal_vitals() {
        let result = TriagePriorityCalculator::compute(ComplaintCategory::ChestPain, &normal_vitals());
        assert_eq!(result.level, TriageLevel::RESUSCITATION);
        assert_eq!(result.rationale.len(), 1);
    }

    #[test]
    fn test_hypoxia_escalates_mild_complaint() {
        let mut vitals = normal_vitals();
        vitals.oxygen_saturation = Some(88);
        let result = TriagePriorityCalculator::compute(ComplaintCategory::ColdFlu, &vitals);
        assert_eq!(result.level, TriageLevel::RESUSCITATION);
        assert!(result.rationale.iter().any(|r| r.contains("oxygen saturation 88 < 92")));
    }

    #[test]
    fn test_second_tier_rules() {
        let mut vitals = normal_vitals();
        vitals.temperature = Some(39.6);
        let result = TriagePriorityCalculator::compute(ComplaintCategory::Sprain, &vitals);
        assert_eq!(result.level, TriageLevel::EMERGENT);

        vitals.temperature = Some(36.5);
        vitals.consciousness = Some(Consciousness::VoiceResponsive);
        let result = TriagePriorityCalculator::compute(ComplaintCategory::Laceration, &vitals);
        assert_eq!(result.level, TriageLevel::EMERGENT);

        vitals.consciousness = Some(Consciousness::PainResponsive);
        let result = TriagePriorityCalculator::compute(ComplaintCategory::Laceration, &vitals);
        assert_eq!(result.level, TriageLevel::RESUSCITATION);
    }

    #[test]
    fn test_second_tier_skipped_once_immediate() {
        let mut vitals = normal_vitals();
        vitals.heart_rate = Some(135);
        let result = TriagePriorityCalculator::compute(ComplaintCategory::Fracture, &vitals);
        assert_eq!(result.level, TriageLevel::RESUSCITATION);
        // 心率 135 同时超过 110，但 2 级规则不再记录
        assert!(!result.rationale.iter().any(|r| r.contains("> 110")));
    }

    #[test]
    fn test_missing_fields_are_not_evaluated() {
        let vitals = VitalsSnapshot {
            pain_score: Some(5),
            ..VitalsSnapshot::new(Utc::now())
        };
        let result = TriagePriorityCalculator::compute(ComplaintCategory::Laceration, &vitals);
        assert_eq!(result.level, TriageLevel::LESS_URGENT);
        assert_eq!(result.rationale.len(), 1);
    }

    #[test]
    fn test_unmatched_complaint_falls_back() {
        let vitals = VitalsSnapshot {
            heart_rate: Some(80),
            ..VitalsSnapshot::new(Utc::now())
        };

        let other = TriagePriorityCalculator::compute(ComplaintCategory::Other, &vitals);
        assert_eq!(other.level, TriageLevel::LESS_URGENT);
        assert!(other.rationale[0].contains("sets base level 4"));

        let unknown = ComplaintCategory::from_code("hiccups");
        let result = TriagePriorityCalculator::compute(unknown, &vitals);
        assert_eq!(result.level, FALLBACK_LEVEL);
        assert!(result.rationale[0].contains("no base level"));
    }

    #[test]
    fn test_compute_is_deterministic() {
        let mut vitals = normal_vitals();
        vitals.systolic_bp = Some(185);
        let first = TriagePriorityCalculator::compute(ComplaintCategory::ModeratePain, &vitals);
        for _ in 0..10 {
            assert_eq!(
                TriagePriorityCalculator::compute(ComplaintCategory::ModeratePain, &vitals),
                first
            );
        }
    }

    #[test]
    fn test_worsening_saturation_never_lowers_urgency() {
        for complaint in ComplaintCategory::ALL {
            let mut previous = TriageLevel::NON_URGENT;
            for spo2 in (70..=100u8).rev() {
                let mut vitals = normal_vitals();
                vitals.oxygen_saturation = Some(spo2);
                let level = TriagePriorityCalculator::compute(complaint, &vitals).level;
                if spo2 < 100 {
                    assert!(level <= previous, "{} at spo2 {}", complaint, spo2);
                }
                previous = level;
            }
        }
    }

    #[test]
    fn test_never_less_urgent_than_base() {
        for complaint in ComplaintCategory::ALL {
            let level = TriagePriorityCalculator::compute(complaint, &normal_vitals()).level;
            let base = TriagePriorityCalculator::base_level(complaint).unwrap_or(FALLBACK_LEVEL);
            assert!(level <= base);
        }
    }
}
