//! 场景回放
//!
//! 按时间戳依次执行登记、分诊、接诊、交接、处置与 LWBS 扫描，
//! 使用手动时钟保证结果可复现。

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Duration, Utc};
use ed_core::{ArrivalMode, BayId, ComplaintCategory, DispositionOutcome, DoctorId, VitalsSnapshot};
use ed_workflow::{
    Clock, EmergencyFlowEngine, FlowSettings, FlowStats, IntakeRequest, ManualClock, QueueSnapshot,
    ResourceRoster, StatsWindow, TracingAuditSink,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

/// 场景文件
#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    pub facility: String,
    pub start: DateTime<Utc>,
    #[serde(default)]
    pub doctors: Vec<String>,
    #[serde(default)]
    pub bays: Vec<String>,
    /// 覆盖配置中的 LWBS 超时
    #[serde(default)]
    pub lwbs_timeout_minutes: Option<i64>,
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Step {
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub action: Action,
}

/// 场景动作，病人以别名引用
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    Intake {
        patient: String,
        complaint: ComplaintCategory,
        #[serde(default)]
        arrival_mode: ArrivalMode,
    },
    Triage {
        patient: String,
        vitals: serde_json::Value,
    },
    StartTreatment {
        patient: String,
        doctor: String,
        bay: String,
    },
    Reassign {
        patient: String,
        doctor: String,
        bay: String,
    },
    Dispose {
        patient: String,
        outcome: DispositionOutcome,
    },
    Sweep,
}

impl Action {
    fn name(&self) -> &'static str {
        match self {
            Action::Intake { .. } => "intake",
            Action::Triage { .. } => "triage",
            Action::StartTreatment { .. } => "start_treatment",
            Action::Reassign { .. } => "reassign",
            Action::Dispose { .. } => "dispose",
            Action::Sweep => "sweep",
        }
    }
}

/// 单步执行结果
#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub index: usize,
    pub at: DateTime<Utc>,
    pub action: &'static str,
    pub outcome: String,
    pub ok: bool,
}

/// 回放结果
#[derive(Debug, Serialize)]
pub struct ScenarioReport {
    pub steps: Vec<StepReport>,
    pub snapshot: QueueSnapshot,
    pub stats: FlowStats,
}

impl Scenario {
    pub async fn load(path: &Path) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read scenario {}", path.display()))?;
        serde_json::from_str(&raw).context("Failed to parse scenario")
    }
}

struct Replay {
    engine: EmergencyFlowEngine,
    clock: Arc<ManualClock>,
    patients: HashMap<String, Uuid>,
}

impl Replay {
    fn case_id(&self, patient: &str) -> Result<Uuid> {
        self.patients
            .get(patient)
            .copied()
            .ok_or_else(|| anyhow!("unknown patient '{}'", patient))
    }

    async fn version(&self, patient: &str) -> Result<(Uuid, u64)> {
        let case_id = self.case_id(patient)?;
        let case = self.engine.get_case(case_id).await?;
        Ok((case_id, case.version()))
    }

    async fn execute(&mut self, facility: &str, step: &Step) -> Result<String> {
        match &step.action {
            Action::Intake {
                patient,
                complaint,
                arrival_mode,
            } => {
                if self.patients.contains_key(patient) {
                    return Err(anyhow!("patient '{}' already registered", patient));
                }
                let receipt = self
                    .engine
                    .intake(IntakeRequest {
                        facility_id: facility.to_string(),
                        patient_ref: Uuid::new_v4(),
                        chief_complaint: *complaint,
                        arrival_mode: *arrival_mode,
                        arrival_time: Some(step.at),
                    })
                    .await?;
                self.patients.insert(patient.clone(), receipt.case_id);
                Ok(receipt.case_number)
            }
            Action::Triage { patient, vitals } => {
                let (case_id, version) = self.version(patient).await?;
                let mut vitals = vitals.clone();
                if let serde_json::Value::Object(map) = &mut vitals {
                    map.entry("captured_at")
                        .or_insert_with(|| serde_json::json!(step.at));
                }
                let vitals: VitalsSnapshot =
                    serde_json::from_value(vitals).context("invalid vitals")?;
                let result = self.engine.triage(case_id, version, vitals).await?;
                Ok(format!("{}: {}", result.level, result.rationale.join("; ")))
            }
            Action::StartTreatment {
                patient,
                doctor,
                bay,
            } => {
                let (case_id, version) = self.version(patient).await?;
                self.engine
                    .start_treatment(case_id, version, DoctorId::new(doctor), BayId::new(bay))
                    .await?;
                Ok(format!("{} in {}", doctor, bay))
            }
            Action::Reassign {
                patient,
                doctor,
                bay,
            } => {
                let (case_id, version) = self.version(patient).await?;
                self.engine
                    .reassign(case_id, version, DoctorId::new(doctor), BayId::new(bay))
                    .await?;
                Ok(format!("handed over to {} in {}", doctor, bay))
            }
            Action::Dispose { patient, outcome } => {
                let (case_id, version) = self.version(patient).await?;
                self.engine.dispose(case_id, version, *outcome).await?;
                Ok(outcome.code().to_string())
            }
            Action::Sweep => {
                let disposed = self.engine.sweep_left_without_being_seen().await;
                Ok(format!("{} left without being seen", disposed.len()))
            }
        }
    }
}

/// 回放场景并返回最终队列与统计
pub async fn run(scenario: &Scenario, settings: FlowSettings, bucket_minutes: i64) -> Result<ScenarioReport> {
    let mut settings = settings;
    if let Some(minutes) = scenario.lwbs_timeout_minutes {
        settings.lwbs_timeout = Duration::minutes(minutes);
    }

    let clock = Arc::new(ManualClock::new(scenario.start));
    let engine = EmergencyFlowEngine::new(settings)
        .with_clock(clock.clone())
        .with_audit(Arc::new(TracingAuditSink));
    let roster = ResourceRoster::new(
        scenario.doctors.iter().map(DoctorId::new),
        scenario.bays.iter().map(BayId::new),
    );
    engine.register_facility(&scenario.facility, roster).await?;

    let mut replay = Replay {
        engine,
        clock,
        patients: HashMap::new(),
    };
    let mut steps = Vec::with_capacity(scenario.steps.len());

    for (index, step) in scenario.steps.iter().enumerate() {
        replay.clock.set(step.at);
        let (outcome, ok) = match replay.execute(&scenario.facility, step).await {
            Ok(outcome) => (outcome, true),
            Err(e) => {
                tracing::warn!("Scenario step {} ({}) failed: {:#}", index, step.action.name(), e);
                (format!("{:#}", e), false)
            }
        };
        steps.push(StepReport {
            index,
            at: step.at,
            action: step.action.name(),
            outcome,
            ok,
        });
    }

    let now = replay.clock.now().max(scenario.start);
    let window = StatsWindow::new(scenario.start, now + Duration::minutes(1), bucket_minutes)?;
    let snapshot = replay.engine.queue_snapshot(&scenario.facility).await?;
    let stats = replay.engine.flow_stats(&scenario.facility, &window).await?;

    Ok(ScenarioReport {
        steps,
        snapshot,
        stats,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed_core::TriageLevel;

    const SCENARIO: &str = r#"{
        "facility": "north",
        "start": "2026-10-18T08:00:00Z",
        "doctors": ["D1", "D2"],
        "bays": ["B1", "B2"],
        "lwbs_timeout_minutes": 60,
        "steps": [
            {"at": "2026-10-18T08:00:00Z", "action": "intake", "patient": "ana", "complaint": "fracture"},
            {"at": "2026-10-18T08:05:00Z", "action": "intake", "patient": "ben", "complaint": "cold-flu", "arrival_mode": "ambulance"},
            {"at": "2026-10-18T08:06:00Z", "action": "intake", "patient": "cai", "complaint": "sprain"},
            {"at": "2026-10-18T08:10:00Z", "action": "triage", "patient": "ana", "vitals": {"heart_rate": 88}},
            {"at": "2026-10-18T08:12:00Z", "action": "triage", "patient": "ben", "vitals": {"oxygen_saturation": 88}},
            {"at": "2026-10-18T08:15:00Z", "action": "start_treatment", "patient": "ben", "doctor": "D1", "bay": "B1"},
            {"at": "2026-10-18T08:16:00Z", "action": "start_treatment", "patient": "ana", "doctor": "D1", "bay": "B2"},
            {"at": "2026-10-18T09:30:00Z", "action": "sweep"},
            {"at": "2026-10-18T09:40:00Z", "action": "dispose", "patient": "ben", "outcome": "admitted"}
        ]
    }"#;

    #[tokio::test]
    async fn test_replay_scenario() {
        let scenario: Scenario = serde_json::from_str(SCENARIO).unwrap();
        let report = run(&scenario, FlowSettings::default(), 60).await.unwrap();

        assert_eq!(report.steps.len(), 9);
        assert!(report.steps[0].ok);
        assert_eq!(report.steps[0].outcome, "EM20261018-0001");
        assert!(report.steps[4].outcome.starts_with("L1"));
        // D1 已被占用
        assert!(!report.steps[6].ok);
        // ana 与 cai 均已超时
        assert_eq!(report.steps[7].outcome, "2 left without being seen");
        assert!(report.steps[8].ok);

        assert!(report.snapshot.waiting.is_empty());
        assert_eq!(report.stats.arrivals, 3);
        assert_eq!(report.stats.dispositions.len(), 2);
        assert_eq!(report.stats.waiting_by_level.get(&TriageLevel::URGENT), None);
    }

    #[tokio::test]
    async fn test_sample_scenario_file() {
        let scenario: Scenario =
            serde_json::from_str(include_str!("../../demos/scenario.json")).unwrap();
        let report = run(&scenario, FlowSettings::default(), 30).await.unwrap();

        let failed: Vec<usize> = report.steps.iter().filter(|s| !s.ok).map(|s| s.index).collect();
        // dr-chen 仍在抢救室
        assert_eq!(failed, vec![9]);
        assert_eq!(report.steps[13].outcome, "2 left without being seen");
        assert_eq!(report.snapshot.in_treatment.len(), 1);
        assert_eq!(report.stats.arrivals, 4);
    }

    #[tokio::test]
    async fn test_unknown_patient_is_reported() {
        let scenario: Scenario = serde_json::from_str(
            r#"{"facility": "north", "start": "2026-10-18T08:00:00Z",
                "steps": [{"at": "2026-10-18T08:01:00Z", "action": "dispose", "patient": "nobody", "outcome": "discharged"}]}"#,
        )
        .unwrap();
        let report = run(&scenario, FlowSettings::default(), 30).await.unwrap();
        assert!(!report.steps[0].ok);
        assert!(report.steps[0].outcome.contains("nobody"));
    }
}
