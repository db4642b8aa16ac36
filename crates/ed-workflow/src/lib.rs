//! # 急诊流转模块
//!
//! 提供急诊科病例流转的核心功能，包括：
//! - 分诊优先级计算：由主诉与生命体征得出 1-5 级分诊级别
//! - 病例状态机：管理病例从登记到处置的生命周期
//! - 候诊队列：按级别、到达时间维护权威顺序
//! - 资源分配：保证医生与床位不被重复占用
//! - 流转统计：等待时间分布与看板汇总

pub mod aggregator;
pub mod assignment;
pub mod audit;
pub mod case;
pub mod clock;
pub mod engine;
pub mod events;
pub mod queue;
pub mod state_machine;
pub mod store;
pub mod sweeper;
pub mod triage;

// 重新导出主要类型
pub use aggregator::{FlowAggregator, FlowStats, StatsWindow, WaitStats};
pub use assignment::{AssignmentCoordinator, ResourceRoster};
pub use audit::{AuditSink, MemoryAuditSink, TracingAuditSink, TransitionRecord};
pub use case::{Assignment, CaseSummary, EmergencyCase, TriageRecord};
pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{
    CaseQuery, CasePage, EmergencyFlowEngine, FlowSettings, IntakeReceipt, IntakeRequest,
    QueueEntry, QueueSnapshot, TriageResult,
};
pub use events::FlowEvent;
pub use queue::{QueueOrderer, QueuePosition};
pub use state_machine::{CaseCommand, CaseEvent, CaseStateMachine};
pub use store::{CaseStore, InMemoryCaseStore};
pub use sweeper::LwbsSweeper;
pub use triage::{TriageAssessment, TriagePriorityCalculator};
