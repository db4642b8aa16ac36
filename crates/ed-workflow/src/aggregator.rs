//! 流转统计
//!
//! 只读地从病例历史推导统计数据，不修改任何状态。
//! 仍在候诊的病例只计入“当前等待”，不计入已完成区间的平均值。

use crate::case::EmergencyCase;
use chrono::{DateTime, Duration, Utc};
use ed_core::{CaseStatus, ComplaintCategory, DispositionOutcome, EdError, Result, TriageLevel};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 统计时间窗口，按到达时间筛选病例
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StatsWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub bucket_minutes: i64,
}

impl StatsWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>, bucket_minutes: i64) -> Result<Self> {
        if end <= start {
            return Err(EdError::Validation("stats window end must be after start".to_string()));
        }
        if bucket_minutes <= 0 {
            return Err(EdError::Validation("bucket size must be positive".to_string()));
        }
        Ok(Self {
            start,
            end,
            bucket_minutes,
        })
    }

    /// 截至 `now` 的最近若干小时
    pub fn last_hours(now: DateTime<Utc>, hours: i64, bucket_minutes: i64) -> Result<Self> {
        Self::new(now - Duration::hours(hours), now, bucket_minutes)
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && at < self.end
    }

    fn bucket_start(&self, at: DateTime<Utc>) -> DateTime<Utc> {
        let offset = (at - self.start).num_minutes() / self.bucket_minutes;
        self.start + Duration::minutes(offset * self.bucket_minutes)
    }
}

/// 等待时间分布（分钟）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WaitStats {
    pub samples: usize,
    pub mean_minutes: Option<f64>,
    pub p50_minutes: Option<f64>,
    pub p90_minutes: Option<f64>,
    pub max_minutes: Option<f64>,
}

impl WaitStats {
    pub fn from_samples(mut samples: Vec<f64>) -> Self {
        if samples.is_empty() {
            return Self::default();
        }
        samples.sort_by(|a, b| a.total_cmp(b));
        let n = samples.len();
        let mean = samples.iter().sum::<f64>() / n as f64;

        Self {
            samples: n,
            mean_minutes: Some(mean),
            p50_minutes: Some(nearest_rank(&samples, 0.5)),
            p90_minutes: Some(nearest_rank(&samples, 0.9)),
            max_minutes: samples.last().copied(),
        }
    }
}

/// 最近秩法百分位
fn nearest_rank(sorted: &[f64], p: f64) -> f64 {
    let rank = (p * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

/// 区间分解
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntervalBreakdown {
    pub arrivals: usize,
    pub door_to_triage: WaitStats,
    pub triage_to_treatment: WaitStats,
}

/// 按时间段的分解
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketBreakdown {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub breakdown: IntervalBreakdown,
}

/// 流转统计结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowStats {
    pub facility_id: String,
    pub window: StatsWindow,
    pub generated_at: DateTime<Utc>,
    pub waiting_by_level: BTreeMap<TriageLevel, usize>,
    pub untriaged_waiting: usize,
    pub in_treatment: usize,
    pub critical_in_treatment: usize,
    pub overdue_waiting: usize,
    pub current_wait: WaitStats,
    pub arrivals: usize,
    pub by_status: BTreeMap<String, usize>,
    pub dispositions: BTreeMap<DispositionOutcome, usize>,
    pub door_to_triage: WaitStats,
    pub triage_to_treatment: WaitStats,
    pub by_complaint: BTreeMap<ComplaintCategory, IntervalBreakdown>,
    pub by_bucket: Vec<BucketBreakdown>,
}

#[derive(Default)]
struct IntervalSamples {
    arrivals: usize,
    door_to_triage: Vec<f64>,
    triage_to_treatment: Vec<f64>,
}

impl IntervalSamples {
    fn add(&mut self, case: &EmergencyCase) {
        self.arrivals += 1;
        if let Some(minutes) = door_to_triage(case) {
            self.door_to_triage.push(minutes);
        }
        if let Some(minutes) = triage_to_treatment(case) {
            self.triage_to_treatment.push(minutes);
        }
    }

    fn finish(self) -> IntervalBreakdown {
        IntervalBreakdown {
            arrivals: self.arrivals,
            door_to_triage: WaitStats::from_samples(self.door_to_triage),
            triage_to_treatment: WaitStats::from_samples(self.triage_to_treatment),
        }
    }
}

fn minutes_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_seconds().max(0) as f64 / 60.0
}

fn door_to_triage(case: &EmergencyCase) -> Option<f64> {
    case.first_triaged_at()
        .map(|triaged| minutes_between(case.arrival_time(), triaged))
}

fn triage_to_treatment(case: &EmergencyCase) -> Option<f64> {
    match (case.first_triaged_at(), case.treatment_started_at()) {
        (Some(triaged), Some(started)) => Some(minutes_between(triaged, started)),
        _ => None,
    }
}

/// 流转统计器
pub struct FlowAggregator;

impl FlowAggregator {
    /// 计算院区统计
    ///
    /// 当前状态类指标（候诊、治疗中）覆盖全部活跃病例；
    /// 区间类指标只统计到达时间落在窗口内的病例。
    pub fn compute<'a, I>(
        facility_id: &str,
        cases: I,
        window: &StatsWindow,
        now: DateTime<Utc>,
    ) -> FlowStats
    where
        I: IntoIterator<Item = &'a EmergencyCase>,
    {
        let mut waiting_by_level: BTreeMap<TriageLevel, usize> = BTreeMap::new();
        let mut untriaged_waiting = 0;
        let mut in_treatment = 0;
        let mut critical_in_treatment = 0;
        let mut overdue_waiting = 0;
        let mut current_wait = Vec::new();
        let mut by_status: BTreeMap<String, usize> = BTreeMap::new();
        let mut dispositions: BTreeMap<DispositionOutcome, usize> = BTreeMap::new();
        let mut overall = IntervalSamples::default();
        let mut by_complaint: BTreeMap<ComplaintCategory, IntervalSamples> = BTreeMap::new();
        let mut by_bucket: BTreeMap<DateTime<Utc>, IntervalSamples> = BTreeMap::new();

        for case in cases {
            match case.status() {
                CaseStatus::AwaitingTriage | CaseStatus::Triaged => {
                    match case.triage_level() {
                        Some(level) => *waiting_by_level.entry(level).or_insert(0) += 1,
                        None => untriaged_waiting += 1,
                    }
                    if case.is_overdue(now) {
                        overdue_waiting += 1;
                    }
                    current_wait.push(minutes_between(case.arrival_time(), now));
                }
                CaseStatus::InTreatment => {
                    in_treatment += 1;
                    if case.triage_level().map(|l| l.is_critical()).unwrap_or(false) {
                        critical_in_treatment += 1;
                    }
                }
                CaseStatus::Disposed => {}
            }

            if !window.contains(case.arrival_time()) {
                continue;
            }

            *by_status.entry(case.status().to_string()).or_insert(0) += 1;
            if let Some(outcome) = case.disposition() {
                *dispositions.entry(outcome).or_insert(0) += 1;
            }
            overall.add(case);
            by_complaint.entry(case.chief_complaint()).or_default().add(case);
            by_bucket
                .entry(window.bucket_start(case.arrival_time()))
                .or_default()
                .add(case);
        }

        let bucket_len = Duration::minutes(window.bucket_minutes);
        let arrivals = overall.arrivals;
        let overall = overall.finish();

        FlowStats {
            facility_id: facility_id.to_string(),
            window: *window,
            generated_at: now,
            waiting_by_level,
            untriaged_waiting,
            in_treatment,
            critical_in_treatment,
            overdue_waiting,
            current_wait: WaitStats::from_samples(current_wait),
            arrivals,
            by_status,
            dispositions,
            door_to_triage: overall.door_to_triage,
            triage_to_treatment: overall.triage_to_treatment,
            by_complaint: by_complaint
                .into_iter()
                .map(|(complaint, samples)| (complaint, samples.finish()))
                .collect(),
            by_bucket: by_bucket
                .into_iter()
                .map(|(start, samples)| BucketBreakdown {
                    start,
                    end: (start + bucket_len).min(window.end),
                    breakdown: samples.finish(),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::case::Assignment;
    use crate::state_machine::{CaseCommand, CaseStateMachine, IntakeDetails};
    use chrono::TimeZone;
    use ed_core::{ArrivalMode, BayId, DoctorId, VitalsSnapshot};
    use uuid::Uuid;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 18, hour, minute, 0).unwrap()
    }

    fn intake(sm: &CaseStateMachine, seq: u32, complaint: ComplaintCategory, arrival: DateTime<Utc>) -> EmergencyCase {
        sm.intake(IntakeDetails {
            case_number: format!("EM20261018-{:04}", seq),
            facility_id: "north".to_string(),
            patient_ref: Uuid::new_v4(),
            chief_complaint: complaint,
            arrival_mode: ArrivalMode::WalkIn,
            arrival_time: arrival,
        })
        .unwrap()
    }

    fn triage(sm: &CaseStateMachine, case: &mut EmergencyCase, when: DateTime<Utc>) {
        let vitals = VitalsSnapshot {
            heart_rate: Some(80),
            ..VitalsSnapshot::new(when)
        };
        let version = case.version();
        sm.apply(case, version, CaseCommand::Triage { vitals }, when).unwrap();
    }

    fn treat(sm: &CaseStateMachine, case: &mut EmergencyCase, doctor: &str, when: DateTime<Utc>) {
        let assignment = Assignment {
            doctor_id: DoctorId::new(doctor),
            bay_id: BayId::new(format!("bay-{}", doctor)),
            assigned_at: when,
        };
        let version = case.version();
        sm.apply(case, version, CaseCommand::StartTreatment { assignment }, when).unwrap();
    }

    #[test]
    fn test_wait_stats_percentiles() {
        let stats = WaitStats::from_samples(vec![10.0, 2.0, 4.0, 8.0, 6.0]);
        assert_eq!(stats.samples, 5);
        assert_eq!(stats.mean_minutes, Some(6.0));
        assert_eq!(stats.p50_minutes, Some(6.0));
        assert_eq!(stats.p90_minutes, Some(10.0));
        assert_eq!(stats.max_minutes, Some(10.0));
        assert_eq!(WaitStats::from_samples(Vec::new()), WaitStats::default());
    }

    #[test]
    fn test_partial_data_only_counts_current_wait() {
        let sm = CaseStateMachine::new();
        let mut treated = intake(&sm, 1, ComplaintCategory::Fracture, at(9, 0));
        triage(&sm, &mut treated, at(9, 10));
        treat(&sm, &mut treated, "d1", at(9, 40));

        let mut triaged_waiting = intake(&sm, 2, ComplaintCategory::Fracture, at(9, 30));
        triage(&sm, &mut triaged_waiting, at(9, 50));

        let untriaged = intake(&sm, 3, ComplaintCategory::Sprain, at(9, 45));

        let cases = vec![treated, triaged_waiting, untriaged];
        let window = StatsWindow::new(at(8, 0), at(11, 0), 60).unwrap();
        let stats = FlowAggregator::compute("north", &cases, &window, at(10, 0));

        assert_eq!(stats.arrivals, 3);
        assert_eq!(stats.in_treatment, 1);
        assert_eq!(stats.untriaged_waiting, 1);
        assert_eq!(stats.waiting_by_level.get(&TriageLevel::URGENT), Some(&1));
        assert_eq!(stats.door_to_triage.samples, 2);
        assert_eq!(stats.door_to_triage.mean_minutes, Some(15.0));
        assert_eq!(stats.triage_to_treatment.samples, 1);
        assert_eq!(stats.triage_to_treatment.mean_minutes, Some(30.0));
        assert_eq!(stats.current_wait.samples, 2);
        assert_eq!(stats.current_wait.max_minutes, Some(30.0));

        let fracture = &stats.by_complaint[&ComplaintCategory::Fracture];
        assert_eq!(fracture.arrivals, 2);
        assert_eq!(stats.by_bucket.len(), 1);
        assert_eq!(stats.by_bucket[0].start, at(9, 0));
    }

    #[test]
    fn test_window_excludes_older_arrivals() {
        let sm = CaseStateMachine::new();
        let mut old = intake(&sm, 1, ComplaintCategory::ChestPain, at(6, 0));
        triage(&sm, &mut old, at(6, 5));
        treat(&sm, &mut old, "d1", at(6, 6));
        let fresh = intake(&sm, 2, ComplaintCategory::Laceration, at(10, 15));

        let cases = vec![old, fresh];
        let window = StatsWindow::new(at(10, 0), at(12, 0), 30).unwrap();
        let stats = FlowAggregator::compute("north", &cases, &window, at(10, 30));

        assert_eq!(stats.arrivals, 1);
        // 当前状态指标仍包含窗口外的治疗中病例
        assert_eq!(stats.in_treatment, 1);
        assert_eq!(stats.critical_in_treatment, 1);
        assert_eq!(stats.door_to_triage.samples, 0);
        assert_eq!(stats.by_bucket[0].start, at(10, 0));
        assert_eq!(stats.by_bucket[0].end, at(10, 30));
    }

    #[test]
    fn test_invalid_window() {
        assert!(StatsWindow::new(at(10, 0), at(9, 0), 60).is_err());
        assert!(StatsWindow::new(at(9, 0), at(10, 0), 0).is_err());
    }
}
