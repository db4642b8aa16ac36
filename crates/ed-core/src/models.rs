//! 核心数据模型定义

use crate::error::{EdError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 医生标识（来自人员目录）
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DoctorId(pub String);

/// 诊疗床位标识（来自床位登记）
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BayId(pub String);

impl DoctorId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl BayId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DoctorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "doctor:{}", self.0)
    }
}

impl fmt::Display for BayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bay:{}", self.0)
    }
}

/// 主诉分类
///
/// 序列化为短横线编码，如 `chest-pain`。无法识别的编码归入
/// [`ComplaintCategory::Unrecognised`]，与显式选择的 `other` 区分。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ComplaintCategory {
    ChestPain,           // 胸痛
    DifficultyBreathing, // 呼吸困难
    StrokeSymptoms,      // 卒中症状
    SevereBleeding,      // 大出血
    SevereAbdominalPain, // 剧烈腹痛
    HighFever,           // 高热
    Fracture,            // 疑似骨折
    ModeratePain,        // 中度疼痛
    Laceration,          // 撕裂伤
    MinorBurns,          // 轻度烧伤
    Sprain,              // 扭伤
    ColdFlu,             // 感冒/流感
    Other,               // 其他
    Unrecognised,        // 无法识别的编码
}

impl ComplaintCategory {
    pub const ALL: [ComplaintCategory; 14] = [
        ComplaintCategory::ChestPain,
        ComplaintCategory::DifficultyBreathing,
        ComplaintCategory::StrokeSymptoms,
        ComplaintCategory::SevereBleeding,
        ComplaintCategory::SevereAbdominalPain,
        ComplaintCategory::HighFever,
        ComplaintCategory::Fracture,
        ComplaintCategory::ModeratePain,
        ComplaintCategory::Laceration,
        ComplaintCategory::MinorBurns,
        ComplaintCategory::Sprain,
        ComplaintCategory::ColdFlu,
        ComplaintCategory::Other,
        ComplaintCategory::Unrecognised,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            Self::ChestPain => "chest-pain",
            Self::DifficultyBreathing => "difficulty-breathing",
            Self::StrokeSymptoms => "stroke-symptoms",
            Self::SevereBleeding => "severe-bleeding",
            Self::SevereAbdominalPain => "severe-abdominal-pain",
            Self::HighFever => "high-fever",
            Self::Fracture => "fracture",
            Self::ModeratePain => "moderate-pain",
            Self::Laceration => "laceration",
            Self::MinorBurns => "minor-burns",
            Self::Sprain => "sprain",
            Self::ColdFlu => "cold-flu",
            Self::Other => "other",
            Self::Unrecognised => "unrecognised",
        }
    }

    /// 按编码查找主诉，未知编码返回 `Unrecognised`
    pub fn from_code(code: &str) -> Self {
        let normalized = code.trim().to_ascii_lowercase().replace('_', "-");
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.code() == normalized)
            .unwrap_or(Self::Unrecognised)
    }
}

impl From<String> for ComplaintCategory {
    fn from(code: String) -> Self {
        Self::from_code(&code)
    }
}

impl From<ComplaintCategory> for String {
    fn from(category: ComplaintCategory) -> Self {
        category.code().to_string()
    }
}

impl fmt::Display for ComplaintCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// 意识水平（AVPU 量表）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Consciousness {
    Alert,
    VoiceResponsive,
    PainResponsive,
    Unresponsive,
}

impl Consciousness {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Alert => "alert",
            Self::VoiceResponsive => "voice-responsive",
            Self::PainResponsive => "pain-responsive",
            Self::Unresponsive => "unresponsive",
        }
    }

    /// 近似 GCS 评分
    pub fn gcs_estimate(&self) -> u8 {
        match self {
            Self::Alert => 15,
            Self::VoiceResponsive => 13,
            Self::PainResponsive => 8,
            Self::Unresponsive => 3,
        }
    }
}

/// 分诊级别，1 为最危重，5 为最不紧急
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct TriageLevel(u8);

impl TriageLevel {
    pub const RESUSCITATION: TriageLevel = TriageLevel(1);
    pub const EMERGENT: TriageLevel = TriageLevel(2);
    pub const URGENT: TriageLevel = TriageLevel(3);
    pub const LESS_URGENT: TriageLevel = TriageLevel(4);
    pub const NON_URGENT: TriageLevel = TriageLevel(5);

    pub const ALL: [TriageLevel; 5] = [
        Self::RESUSCITATION,
        Self::EMERGENT,
        Self::URGENT,
        Self::LESS_URGENT,
        Self::NON_URGENT,
    ];

    pub fn new(level: u8) -> Result<Self> {
        if (1..=5).contains(&level) {
            Ok(Self(level))
        } else {
            Err(EdError::Validation(format!(
                "triage level must be between 1 and 5, got {}",
                level
            )))
        }
    }

    pub fn value(&self) -> u8 {
        self.0
    }

    pub fn label(&self) -> &'static str {
        match self.0 {
            1 => "Immediate",
            2 => "Very Urgent",
            3 => "Urgent",
            4 => "Standard",
            _ => "Non-Urgent",
        }
    }

    pub fn color(&self) -> &'static str {
        match self.0 {
            1 => "red",
            2 => "orange",
            3 => "yellow",
            4 => "green",
            _ => "blue",
        }
    }

    /// 该级别的目标最长等待时间（分钟）
    pub fn max_wait_minutes(&self) -> i64 {
        match self.0 {
            1 => 0,
            2 => 10,
            3 => 60,
            4 => 120,
            _ => 240,
        }
    }

    /// 1、2 级视为危重
    pub fn is_critical(&self) -> bool {
        self.0 <= 2
    }

    /// 两者中更紧急的级别
    pub fn most_urgent(self, other: TriageLevel) -> TriageLevel {
        if other.0 < self.0 {
            other
        } else {
            self
        }
    }
}

impl TryFrom<u8> for TriageLevel {
    type Error = EdError;

    fn try_from(value: u8) -> Result<Self> {
        Self::new(value)
    }
}

impl From<TriageLevel> for u8 {
    fn from(level: TriageLevel) -> Self {
        level.0
    }
}

impl fmt::Display for TriageLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{} ({})", self.0, self.label())
    }
}

/// 生命体征快照，创建后不可变
///
/// 缺失的字段在分诊计算中视为“未评估”。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VitalsSnapshot {
    pub temperature: Option<f64>,       // 摄氏度
    pub heart_rate: Option<u16>,        // 次/分
    pub systolic_bp: Option<u16>,       // mmHg
    pub diastolic_bp: Option<u16>,      // mmHg
    pub respiratory_rate: Option<u16>,  // 次/分
    pub oxygen_saturation: Option<u8>,  // %
    pub pain_score: Option<u8>,         // 0-10
    pub consciousness: Option<Consciousness>,
    pub captured_at: DateTime<Utc>,
}

impl VitalsSnapshot {
    /// 创建一个未记录任何测量值的快照
    pub fn new(captured_at: DateTime<Utc>) -> Self {
        Self {
            temperature: None,
            heart_rate: None,
            systolic_bp: None,
            diastolic_bp: None,
            respiratory_rate: None,
            oxygen_saturation: None,
            pain_score: None,
            consciousness: None,
            captured_at,
        }
    }

    /// 是否至少记录了一项测量值
    pub fn has_measurements(&self) -> bool {
        self.temperature.is_some()
            || self.heart_rate.is_some()
            || self.systolic_bp.is_some()
            || self.diastolic_bp.is_some()
            || self.respiratory_rate.is_some()
            || self.oxygen_saturation.is_some()
            || self.pain_score.is_some()
            || self.consciousness.is_some()
    }

    /// 校验测量值是否在生理可能范围内
    pub fn validate(&self) -> Result<()> {
        if !self.has_measurements() {
            return Err(EdError::Validation(
                "vitals snapshot contains no measurements".to_string(),
            ));
        }
        if let Some(t) = self.temperature {
            if !t.is_finite() || !(25.0..=45.0).contains(&t) {
                return Err(EdError::Validation(format!("temperature {} out of range", t)));
            }
        }
        check_range("heart rate", self.heart_rate, 0, 300)?;
        check_range("systolic blood pressure", self.systolic_bp, 0, 300)?;
        check_range("diastolic blood pressure", self.diastolic_bp, 0, 250)?;
        check_range("respiratory rate", self.respiratory_rate, 0, 80)?;
        check_range("oxygen saturation", self.oxygen_saturation.map(u16::from), 0, 100)?;
        check_range("pain score", self.pain_score.map(u16::from), 0, 10)?;
        if let (Some(sys), Some(dia)) = (self.systolic_bp, self.diastolic_bp) {
            if dia > sys {
                return Err(EdError::Validation(format!(
                    "diastolic pressure {} exceeds systolic pressure {}",
                    dia, sys
                )));
            }
        }
        Ok(())
    }
}

fn check_range(name: &str, value: Option<u16>, min: u16, max: u16) -> Result<()> {
    match value {
        Some(v) if v < min || v > max => Err(EdError::Validation(format!(
            "{} {} out of range {}..={}",
            name, v, min, max
        ))),
        _ => Ok(()),
    }
}

/// 病例状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CaseStatus {
    AwaitingTriage, // 待分诊
    Triaged,        // 已分诊
    InTreatment,    // 治疗中
    Disposed,       // 已处置（终态）
}

impl CaseStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, CaseStatus::Disposed)
    }

    /// 是否处于候诊队列中
    pub fn is_waiting(&self) -> bool {
        matches!(self, CaseStatus::AwaitingTriage | CaseStatus::Triaged)
    }
}

impl fmt::Display for CaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CaseStatus::AwaitingTriage => "AWAITING_TRIAGE",
            CaseStatus::Triaged => "TRIAGED",
            CaseStatus::InTreatment => "IN_TREATMENT",
            CaseStatus::Disposed => "DISPOSED",
        };
        f.write_str(s)
    }
}

/// 处置结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DispositionOutcome {
    Admitted,              // 收入院
    Discharged,            // 离院
    Transferred,           // 转院
    LeftWithoutBeingSeen,  // 未就诊离开
}

impl DispositionOutcome {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Admitted => "admitted",
            Self::Discharged => "discharged",
            Self::Transferred => "transferred",
            Self::LeftWithoutBeingSeen => "left-without-being-seen",
        }
    }
}

/// 到达方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArrivalMode {
    #[default]
    WalkIn,
    Ambulance,
    Referral,
    Other,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_complaint_codes() {
        assert_eq!(ComplaintCategory::from_code("chest-pain"), ComplaintCategory::ChestPain);
        assert_eq!(ComplaintCategory::from_code("COLD_FLU"), ComplaintCategory::ColdFlu);
        assert_eq!(ComplaintCategory::from_code("other"), ComplaintCategory::Other);
        assert_eq!(ComplaintCategory::from_code("hiccups"), ComplaintCategory::Unrecognised);

        let json = serde_json::to_string(&ComplaintCategory::SevereBleeding).unwrap();
        assert_eq!(json, "\"severe-bleeding\"");
        let parsed: ComplaintCategory = serde_json::from_str("\"unknown-thing\"").unwrap();
        assert_eq!(parsed, ComplaintCategory::Unrecognised);
    }

    #[test]
    fn test_triage_level_bounds() {
        assert!(TriageLevel::new(0).is_err());
        assert!(TriageLevel::new(6).is_err());
        assert_eq!(TriageLevel::new(2).unwrap(), TriageLevel::EMERGENT);
        assert!(TriageLevel::RESUSCITATION < TriageLevel::NON_URGENT);
        assert_eq!(
            TriageLevel::URGENT.most_urgent(TriageLevel::EMERGENT),
            TriageLevel::EMERGENT
        );
        assert!(serde_json::from_str::<TriageLevel>("9").is_err());
    }

    #[test]
    fn test_vitals_validation() {
        let now = Utc::now();
        assert!(VitalsSnapshot::new(now).validate().is_err());

        let mut vitals = VitalsSnapshot::new(now);
        vitals.heart_rate = Some(80);
        vitals.pain_score = Some(3);
        assert!(vitals.validate().is_ok());

        vitals.pain_score = Some(11);
        assert!(vitals.validate().is_err());

        let mut bp = VitalsSnapshot::new(now);
        bp.systolic_bp = Some(80);
        bp.diastolic_bp = Some(120);
        assert!(bp.validate().is_err());
    }

    #[test]
    fn test_consciousness_gcs() {
        assert_eq!(Consciousness::Alert.gcs_estimate(), 15);
        assert_eq!(Consciousness::Unresponsive.gcs_estimate(), 3);
        let parsed: Consciousness = serde_json::from_str("\"pain-responsive\"").unwrap();
        assert_eq!(parsed, Consciousness::PainResponsive);
    }
}
