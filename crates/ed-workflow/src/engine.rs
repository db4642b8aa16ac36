//! 急诊流转引擎
//!
//! 协调状态机、候诊队列、分配协调器和统计器，对外提供统一的流转接口。
//! 每个院区的队列与分配状态由一把写锁串行化，跨院区互不阻塞；
//! 事件在锁内广播以保持提交顺序，存储与审计在锁外执行。

use crate::aggregator::{FlowAggregator, FlowStats, StatsWindow};
use crate::assignment::{AssignmentCoordinator, ResourceRoster};
use crate::audit::{AuditSink, TransitionRecord};
use crate::case::{Assignment, CaseSummary, EmergencyCase};
use crate::clock::{Clock, SystemClock};
use crate::events::FlowEvent;
use crate::queue::{QueueKey, QueueOrderer};
use crate::state_machine::{CaseCommand, CaseEvent, CaseStateMachine, IntakeDetails, TransitionOutcome};
use crate::store::CaseStore;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use ed_core::utils::{format_case_number, parse_case_number, MAX_DAILY_SEQUENCE};
use ed_core::{
    ArrivalMode, BayId, CaseStatus, ComplaintCategory, DispositionOutcome, DoctorId, EdError,
    Result, TriageLevel, VitalsSnapshot,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

/// 引擎参数
#[derive(Debug, Clone)]
pub struct FlowSettings {
    /// 未就诊离开（LWBS）超时
    pub lwbs_timeout: Duration,
    /// 事件广播缓冲区容量
    pub event_buffer: usize,
}

impl Default for FlowSettings {
    fn default() -> Self {
        Self {
            lwbs_timeout: Duration::minutes(240),
            event_buffer: 256,
        }
    }
}

/// 登记请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntakeRequest {
    pub facility_id: String,
    pub patient_ref: Uuid,
    pub chief_complaint: ComplaintCategory,
    #[serde(default)]
    pub arrival_mode: ArrivalMode,
    /// 为空时取当前时间
    #[serde(default)]
    pub arrival_time: Option<DateTime<Utc>>,
}

/// 登记回执
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntakeReceipt {
    pub case_id: Uuid,
    pub case_number: String,
    pub version: u64,
}

/// 分诊结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriageResult {
    pub level: TriageLevel,
    pub rationale: Vec<String>,
    pub version: u64,
}

/// 队列中的病例
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEntry {
    pub position: usize,
    #[serde(flatten)]
    pub case: CaseSummary,
}

/// 院区队列快照
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueSnapshot {
    pub facility_id: String,
    pub generated_at: DateTime<Utc>,
    /// 全部候诊病例的权威顺序
    pub waiting: Vec<QueueEntry>,
    pub untriaged: Vec<QueueEntry>,
    pub triaged: Vec<QueueEntry>,
    pub in_treatment: Vec<CaseSummary>,
    pub critical_waiting: usize,
    pub overdue_waiting: usize,
    pub free_doctors: Vec<DoctorId>,
    pub free_bays: Vec<BayId>,
}

/// 病例列表默认每页条数
pub const DEFAULT_PAGE_LIMIT: usize = 50;

/// 病例列表查询条件，`from` 与 `to` 均为闭区间
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CaseQuery {
    #[serde(default)]
    pub status: Option<CaseStatus>,
    #[serde(default)]
    pub level: Option<TriageLevel>,
    /// 到达时间下限
    #[serde(default)]
    pub from: Option<DateTime<Utc>>,
    /// 到达时间上限
    #[serde(default)]
    pub to: Option<DateTime<Utc>>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: usize,
}

impl CaseQuery {
    fn matches(&self, case: &EmergencyCase) -> bool {
        self.status.map_or(true, |status| case.status() == status)
            && self.level.map_or(true, |level| case.triage_level() == Some(level))
            && self.from.map_or(true, |from| case.arrival_time() >= from)
            && self.to.map_or(true, |to| case.arrival_time() <= to)
    }
}

/// 病例列表分页结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CasePage {
    /// 过滤后、分页前的总数
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
    pub items: Vec<CaseSummary>,
}

/// 单个院区的权威状态
#[derive(Debug)]
struct FacilityDesk {
    facility_id: String,
    active: HashMap<Uuid, EmergencyCase>,
    archive: HashMap<Uuid, EmergencyCase>,
    queue: QueueOrderer,
    assignments: AssignmentCoordinator,
    day_sequences: HashMap<NaiveDate, u32>,
}

impl FacilityDesk {
    fn new(facility_id: &str, roster: ResourceRoster) -> Self {
        Self {
            facility_id: facility_id.to_string(),
            active: HashMap::new(),
            archive: HashMap::new(),
            queue: QueueOrderer::new(),
            assignments: AssignmentCoordinator::new(roster),
            day_sequences: HashMap::new(),
        }
    }

    fn next_sequence(&self, arrival: DateTime<Utc>) -> Result<(NaiveDate, u32)> {
        let day = arrival.date_naive();
        let next = self.day_sequences.get(&day).copied().unwrap_or(0) + 1;
        if next > MAX_DAILY_SEQUENCE {
            return Err(EdError::Validation(format!(
                "facility {} has no case numbers left for {}",
                self.facility_id, day
            )));
        }
        Ok((day, next))
    }

    fn note_sequence(&mut self, day: NaiveDate, sequence: u32) {
        let entry = self.day_sequences.entry(day).or_insert(0);
        *entry = (*entry).max(sequence);
    }

    /// 归档已处置病例
    fn archive(&mut self, case_id: Uuid) {
        self.queue.remove(case_id);
        if let Some(case) = self.active.remove(&case_id) {
            self.archive.insert(case_id, case);
        }
    }

    /// 从存储快照恢复一个病例
    fn restore(&mut self, case: EmergencyCase) -> Result<bool> {
        let case_id = case.id();
        if self.active.contains_key(&case_id) || self.archive.contains_key(&case_id) {
            return Ok(false);
        }
        if let Some((day, sequence)) = parse_case_number(case.case_number()) {
            self.note_sequence(day, sequence);
        }

        match case.status() {
            CaseStatus::Disposed => {
                self.archive.insert(case_id, case);
            }
            CaseStatus::InTreatment => {
                let assignment = case.assignment().cloned().ok_or_else(|| {
                    EdError::Storage(format!("case {} in treatment without assignment", case.case_number()))
                })?;
                self.assignments.restore(case_id, assignment)?;
                self.active.insert(case_id, case);
            }
            CaseStatus::AwaitingTriage | CaseStatus::Triaged => {
                self.queue.insert(
                    case_id,
                    case.case_number(),
                    case.triage_level(),
                    case.arrival_time(),
                )?;
                self.active.insert(case_id, case);
            }
        }
        Ok(true)
    }
}

fn locate<'a>(
    active: &'a mut HashMap<Uuid, EmergencyCase>,
    archive: &'a mut HashMap<Uuid, EmergencyCase>,
    case_id: Uuid,
) -> Result<&'a mut EmergencyCase> {
    if let Some(case) = active.get_mut(&case_id) {
        return Ok(case);
    }
    archive
        .get_mut(&case_id)
        .ok_or_else(|| EdError::NotFound(format!("case {}", case_id)))
}

/// 已提交的转换，锁释放后再写入存储与审计
struct Committed {
    snapshot: EmergencyCase,
    record: TransitionRecord,
}

impl Committed {
    fn new(case: &EmergencyCase, outcome: &TransitionOutcome, at: DateTime<Utc>) -> Self {
        Self {
            snapshot: case.clone(),
            record: TransitionRecord {
                case_id: case.id(),
                case_number: case.case_number().to_string(),
                facility_id: case.facility_id().to_string(),
                from: Some(outcome.from),
                to: outcome.to,
                event: outcome.event,
                version: outcome.version,
                at,
            },
        }
    }
}

/// 急诊流转引擎
pub struct EmergencyFlowEngine {
    state_machine: CaseStateMachine,
    settings: FlowSettings,
    clock: Arc<dyn Clock>,
    facilities: RwLock<HashMap<String, Arc<RwLock<FacilityDesk>>>>,
    case_index: RwLock<HashMap<Uuid, String>>,
    store: Option<Arc<dyn CaseStore>>,
    audit: Option<Arc<dyn AuditSink>>,
    events: broadcast::Sender<FlowEvent>,
}

impl EmergencyFlowEngine {
    /// 创建新的流转引擎
    pub fn new(settings: FlowSettings) -> Self {
        let (events, _) = broadcast::channel(settings.event_buffer.max(1));
        Self {
            state_machine: CaseStateMachine::new(),
            settings,
            clock: Arc::new(SystemClock),
            facilities: RwLock::new(HashMap::new()),
            case_index: RwLock::new(HashMap::new()),
            store: None,
            audit: None,
            events,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_store(mut self, store: Arc<dyn CaseStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn settings(&self) -> &FlowSettings {
        &self.settings
    }

    pub fn state_machine(&self) -> &CaseStateMachine {
        &self.state_machine
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// 订阅流转事件
    pub fn subscribe(&self) -> broadcast::Receiver<FlowEvent> {
        self.events.subscribe()
    }

    /// 注册院区，已存在时更新资源名册
    pub async fn register_facility(&self, facility_id: &str, roster: ResourceRoster) -> Result<()> {
        if facility_id.trim().is_empty() {
            return Err(EdError::Validation("facility id is required".to_string()));
        }

        let mut facilities = self.facilities.write().await;
        if let Some(desk) = facilities.get(facility_id) {
            desk.write().await.assignments.set_roster(roster)?;
            tracing::info!("Updated roster of facility {}", facility_id);
        } else {
            tracing::info!(
                "Registered facility {} with {} doctors and {} bays",
                facility_id,
                roster.doctors.len(),
                roster.bays.len()
            );
            facilities.insert(
                facility_id.to_string(),
                Arc::new(RwLock::new(FacilityDesk::new(facility_id, roster))),
            );
        }
        Ok(())
    }

    /// 已注册的院区
    pub async fn facility_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.facilities.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    async fn desk(&self, facility_id: &str) -> Result<Arc<RwLock<FacilityDesk>>> {
        self.facilities
            .read()
            .await
            .get(facility_id)
            .cloned()
            .ok_or_else(|| EdError::NotFound(format!("facility {}", facility_id)))
    }

    async fn desk_for_case(&self, case_id: Uuid) -> Result<Arc<RwLock<FacilityDesk>>> {
        let facility_id = self
            .case_index
            .read()
            .await
            .get(&case_id)
            .cloned()
            .ok_or_else(|| EdError::NotFound(format!("case {}", case_id)))?;
        self.desk(&facility_id).await
    }

    /// 登记新病例
    pub async fn intake(&self, request: IntakeRequest) -> Result<IntakeReceipt> {
        let desk = self.desk(&request.facility_id).await?;
        let arrival = request.arrival_time.unwrap_or_else(|| self.clock.now());

        let case = {
            let mut desk = desk.write().await;
            let (day, sequence) = desk.next_sequence(arrival)?;
            let case = self.state_machine.intake(IntakeDetails {
                case_number: format_case_number(day, sequence),
                facility_id: request.facility_id.clone(),
                patient_ref: request.patient_ref,
                chief_complaint: request.chief_complaint,
                arrival_mode: request.arrival_mode,
                arrival_time: arrival,
            })?;
            desk.queue
                .insert(case.id(), case.case_number(), None, case.arrival_time())?;
            desk.note_sequence(day, sequence);
            desk.active.insert(case.id(), case.clone());
            self.case_index
                .write()
                .await
                .insert(case.id(), request.facility_id.clone());
            self.emit(FlowEvent::CaseRegistered {
                facility_id: case.facility_id().to_string(),
                case_id: case.id(),
                case_number: case.case_number().to_string(),
                at: arrival,
            });
            case
        };

        tracing::info!(
            "Registered case {} at facility {} ({})",
            case.case_number(),
            case.facility_id(),
            case.chief_complaint()
        );

        let receipt = IntakeReceipt {
            case_id: case.id(),
            case_number: case.case_number().to_string(),
            version: case.version(),
        };
        let committed = Committed {
            record: TransitionRecord {
                case_id: case.id(),
                case_number: case.case_number().to_string(),
                facility_id: case.facility_id().to_string(),
                from: None,
                to: case.status(),
                event: CaseEvent::Intake,
                version: case.version(),
                at: arrival,
            },
            snapshot: case,
        };
        self.publish(committed).await;
        Ok(receipt)
    }

    /// 记录生命体征并分诊；已分诊病例按重新分诊处理
    pub async fn triage(&self, case_id: Uuid, expected_version: u64, vitals: VitalsSnapshot) -> Result<TriageResult> {
        let desk = self.desk_for_case(case_id).await?;
        let now = self.clock.now();

        let (result, committed) = {
            let mut guard = desk.write().await;
            let desk = &mut *guard;
            let case = locate(&mut desk.active, &mut desk.archive, case_id)?;
            let retriage = case.status() == CaseStatus::Triaged;
            let command = if retriage {
                CaseCommand::Retriage { vitals }
            } else {
                CaseCommand::Triage { vitals }
            };

            let outcome = self.state_machine.apply(case, expected_version, command, now)?;
            let assessment = outcome
                .triage
                .clone()
                .ok_or_else(|| EdError::Internal("triage produced no assessment".to_string()))?;
            let event = FlowEvent::CaseTriaged {
                facility_id: desk.facility_id.clone(),
                case_id,
                level: assessment.level,
                retriage,
                at: now,
            };
            let committed = Committed::new(case, &outcome, now);
            desk.queue.reposition(case_id, assessment.level)?;
            self.emit(event);

            tracing::info!(
                "Case {} triaged to {} (v{})",
                committed.record.case_number,
                assessment.level,
                outcome.version
            );
            (
                TriageResult {
                    level: assessment.level,
                    rationale: assessment.rationale,
                    version: outcome.version,
                },
                committed,
            )
        };

        self.publish(committed).await;
        Ok(result)
    }

    /// 开始治疗：绑定医生与床位，移出候诊队列
    pub async fn start_treatment(
        &self,
        case_id: Uuid,
        expected_version: u64,
        doctor_id: DoctorId,
        bay_id: BayId,
    ) -> Result<u64> {
        let desk = self.desk_for_case(case_id).await?;
        let now = self.clock.now();

        let committed = {
            let mut guard = desk.write().await;
            let desk = &mut *guard;
            let case = locate(&mut desk.active, &mut desk.archive, case_id)?;
            self.state_machine
                .check(case, expected_version, CaseEvent::StartTreatment)?;
            desk.assignments.check_available(case_id, &doctor_id, &bay_id)?;

            let assignment = Assignment {
                doctor_id: doctor_id.clone(),
                bay_id: bay_id.clone(),
                assigned_at: now,
            };
            let outcome = self.state_machine.apply(
                case,
                expected_version,
                CaseCommand::StartTreatment { assignment },
                now,
            )?;
            let event = FlowEvent::TreatmentStarted {
                facility_id: desk.facility_id.clone(),
                case_id,
                doctor_id: doctor_id.clone(),
                bay_id: bay_id.clone(),
                at: now,
            };
            let committed = Committed::new(case, &outcome, now);
            desk.assignments.assign(case_id, doctor_id, bay_id, now)?;
            desk.queue.remove(case_id);
            self.emit(event);
            committed
        };

        tracing::info!("Treatment started for case {}", committed.record.case_number);
        let version = committed.record.version;
        self.publish(committed).await;
        Ok(version)
    }

    /// 交接：更换治疗中病例的医生或床位
    pub async fn reassign(
        &self,
        case_id: Uuid,
        expected_version: u64,
        doctor_id: DoctorId,
        bay_id: BayId,
    ) -> Result<u64> {
        let desk = self.desk_for_case(case_id).await?;
        let now = self.clock.now();

        let committed = {
            let mut guard = desk.write().await;
            let desk = &mut *guard;
            let case = locate(&mut desk.active, &mut desk.archive, case_id)?;
            self.state_machine
                .check(case, expected_version, CaseEvent::Reassign)?;
            desk.assignments.check_available(case_id, &doctor_id, &bay_id)?;

            let assignment = Assignment {
                doctor_id: doctor_id.clone(),
                bay_id: bay_id.clone(),
                assigned_at: now,
            };
            let outcome = self.state_machine.apply(
                case,
                expected_version,
                CaseCommand::Reassign { assignment },
                now,
            )?;
            let (previous, current) = desk.assignments.reassign(case_id, doctor_id, bay_id, now)?;
            let event = FlowEvent::CaseReassigned {
                facility_id: desk.facility_id.clone(),
                case_id,
                previous,
                current,
                at: now,
            };
            let committed = Committed::new(case, &outcome, now);
            self.emit(event);
            committed
        };

        tracing::info!("Case {} reassigned", committed.record.case_number);
        let version = committed.record.version;
        self.publish(committed).await;
        Ok(version)
    }

    /// 处置病例：释放资源并归档
    pub async fn dispose(&self, case_id: Uuid, expected_version: u64, outcome: DispositionOutcome) -> Result<u64> {
        let desk = self.desk_for_case(case_id).await?;
        let now = self.clock.now();

        let committed = {
            let mut guard = desk.write().await;
            let desk = &mut *guard;
            let case = locate(&mut desk.active, &mut desk.archive, case_id)?;
            let transition = self.state_machine.apply(
                case,
                expected_version,
                CaseCommand::Dispose { outcome },
                now,
            )?;
            let event = FlowEvent::CaseDisposed {
                facility_id: desk.facility_id.clone(),
                case_id,
                outcome,
                at: now,
            };
            let committed = Committed::new(case, &transition, now);
            desk.assignments.release(case_id);
            desk.archive(case_id);
            self.emit(event);
            committed
        };

        tracing::info!(
            "Case {} disposed as {}",
            committed.record.case_number,
            outcome.code()
        );
        let version = committed.record.version;
        self.publish(committed).await;
        Ok(version)
    }

    /// 将超时未就诊的病例标记为未就诊离开
    pub async fn mark_left_without_being_seen(&self, case_id: Uuid, expected_version: u64) -> Result<u64> {
        let desk = self.desk_for_case(case_id).await?;
        let now = self.clock.now();

        let committed = {
            let mut guard = desk.write().await;
            let desk = &mut *guard;
            let case = locate(&mut desk.active, &mut desk.archive, case_id)?;
            let transition = self.state_machine.apply(
                case,
                expected_version,
                CaseCommand::MarkLeftWithoutBeingSeen {
                    timeout: self.settings.lwbs_timeout,
                },
                now,
            )?;
            let event = FlowEvent::CaseDisposed {
                facility_id: desk.facility_id.clone(),
                case_id,
                outcome: DispositionOutcome::LeftWithoutBeingSeen,
                at: now,
            };
            let committed = Committed::new(case, &transition, now);
            desk.archive(case_id);
            self.emit(event);
            committed
        };

        tracing::warn!(
            "Case {} left without being seen after {} minutes",
            committed.record.case_number,
            committed.snapshot.minutes_since_arrival(now)
        );
        let version = committed.record.version;
        self.publish(committed).await;
        Ok(version)
    }

    /// 扫描所有院区，处置超时未就诊的病例
    ///
    /// 使用扫描时观察到的版本号提交，期间被并发分诊或接诊的病例跳过。
    pub async fn sweep_left_without_being_seen(&self) -> Vec<Uuid> {
        let now = self.clock.now();
        let desks: Vec<Arc<RwLock<FacilityDesk>>> =
            self.facilities.read().await.values().cloned().collect();

        let mut candidates = Vec::new();
        for desk in desks {
            let desk = desk.read().await;
            candidates.extend(
                desk.active
                    .values()
                    .filter(|case| case.status().is_waiting())
                    .filter(|case| now - case.arrival_time() > self.settings.lwbs_timeout)
                    .map(|case| (case.id(), case.version())),
            );
        }

        let mut disposed = Vec::new();
        for (case_id, version) in candidates {
            match self.mark_left_without_being_seen(case_id, version).await {
                Ok(_) => disposed.push(case_id),
                Err(e) => tracing::debug!("Skipped LWBS for case {}: {}", case_id, e),
            }
        }
        disposed
    }

    /// 查询病例（含已归档）
    pub async fn get_case(&self, case_id: Uuid) -> Result<EmergencyCase> {
        let desk = self.desk_for_case(case_id).await?;
        let desk = desk.read().await;
        desk.active
            .get(&case_id)
            .or_else(|| desk.archive.get(&case_id))
            .cloned()
            .ok_or_else(|| EdError::NotFound(format!("case {}", case_id)))
    }

    /// 按条件列出院区病例（含已归档），按分诊级别、到达时间排序
    pub async fn list_cases(&self, facility_id: &str, query: &CaseQuery) -> Result<CasePage> {
        let limit = query.limit.unwrap_or(DEFAULT_PAGE_LIMIT);
        if limit == 0 {
            return Err(EdError::Validation("limit must be positive".to_string()));
        }
        if let (Some(from), Some(to)) = (query.from, query.to) {
            if from > to {
                return Err(EdError::Validation(format!(
                    "invalid range: {} is after {}",
                    from, to
                )));
            }
        }

        let desk = self.desk(facility_id).await?;
        let now = self.clock.now();
        let desk = desk.read().await;

        let mut matched: Vec<&EmergencyCase> = desk
            .active
            .values()
            .chain(desk.archive.values())
            .filter(|case| query.matches(case))
            .collect();
        // 未分诊病例排在最后
        matched.sort_by_cached_key(|case| {
            QueueKey::new(case.triage_level(), case.arrival_time(), case.case_number())
        });

        let total = matched.len();
        let items = matched
            .into_iter()
            .skip(query.offset)
            .take(limit)
            .map(|case| CaseSummary::from_case(case, now))
            .collect();
        Ok(CasePage {
            total,
            limit,
            offset: query.offset,
            items,
        })
    }

    /// 院区队列快照
    pub async fn queue_snapshot(&self, facility_id: &str) -> Result<QueueSnapshot> {
        let desk = self.desk(facility_id).await?;
        let now = self.clock.now();
        let desk = desk.read().await;

        let mut waiting = Vec::with_capacity(desk.queue.len());
        for position in desk.queue.snapshot() {
            let case = desk.active.get(&position.case_id).ok_or_else(|| {
                EdError::Internal(format!("queued case {} has no record", position.case_number))
            })?;
            waiting.push(QueueEntry {
                position: position.position,
                case: CaseSummary::from_case(case, now),
            });
        }

        let (triaged, untriaged): (Vec<QueueEntry>, Vec<QueueEntry>) = waiting
            .iter()
            .cloned()
            .partition(|entry| entry.case.triage_level.is_some());

        let mut in_treatment: Vec<CaseSummary> = desk
            .active
            .values()
            .filter(|case| case.status() == CaseStatus::InTreatment)
            .map(|case| CaseSummary::from_case(case, now))
            .collect();
        in_treatment.sort_by(|a, b| (a.triage_level, a.arrival_time).cmp(&(b.triage_level, b.arrival_time)));

        let critical_waiting = triaged
            .iter()
            .filter(|entry| entry.case.triage_level.map(|l| l.is_critical()).unwrap_or(false))
            .count();
        let overdue_waiting = waiting.iter().filter(|entry| entry.case.overdue).count();

        Ok(QueueSnapshot {
            facility_id: desk.facility_id.clone(),
            generated_at: now,
            waiting,
            untriaged,
            triaged,
            in_treatment,
            critical_waiting,
            overdue_waiting,
            free_doctors: desk.assignments.free_doctors(),
            free_bays: desk.assignments.free_bays(),
        })
    }

    /// 院区流转统计
    pub async fn flow_stats(&self, facility_id: &str, window: &StatsWindow) -> Result<FlowStats> {
        let desk = self.desk(facility_id).await?;
        let now = self.clock.now();
        let desk = desk.read().await;
        Ok(FlowAggregator::compute(
            &desk.facility_id,
            desk.active.values().chain(desk.archive.values()),
            window,
            now,
        ))
    }

    /// 各院区候诊人数
    pub async fn waiting_counts(&self) -> Vec<(String, usize)> {
        let desks: Vec<Arc<RwLock<FacilityDesk>>> =
            self.facilities.read().await.values().cloned().collect();
        let mut counts = Vec::with_capacity(desks.len());
        for desk in desks {
            let desk = desk.read().await;
            counts.push((desk.facility_id.clone(), desk.queue.len()));
        }
        counts.sort();
        counts
    }

    /// 从存储重建院区状态，返回恢复的病例数
    pub async fn hydrate(&self, facility_id: &str) -> Result<usize> {
        let store = self
            .store
            .as_ref()
            .ok_or_else(|| EdError::Config("no case store configured".to_string()))?;
        let desk = self.desk(facility_id).await?;
        let cases = store.list_facility(facility_id).await?;

        let mut desk = desk.write().await;
        let mut index = self.case_index.write().await;
        let mut restored = 0;
        for case in cases {
            let case_id = case.id();
            if desk.restore(case)? {
                index.insert(case_id, facility_id.to_string());
                restored += 1;
            }
        }

        tracing::info!("Hydrated {} cases for facility {}", restored, facility_id);
        Ok(restored)
    }

    async fn publish(&self, committed: Committed) {
        if let Some(store) = &self.store {
            if let Err(e) = store.save(&committed.snapshot).await {
                tracing::error!(
                    "Failed to persist case {}: {}",
                    committed.snapshot.case_number(),
                    e
                );
            }
        }

        if let Some(audit) = &self.audit {
            if let Err(e) = audit.record(&committed.record).await {
                tracing::error!(
                    "Failed to audit transition of case {}: {}",
                    committed.record.case_number,
                    e
                );
            }
        }
    }

    /// 在院区锁内广播，保证同一院区的事件顺序与提交顺序一致
    fn emit(&self, event: FlowEvent) {
        // 无订阅者时发送失败，忽略即可
        let _ = self.events.send(event);
    }
}
