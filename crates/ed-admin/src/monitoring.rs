//! 流转监控
//!
//! 订阅引擎事件并维护 Prometheus 指标。

use anyhow::Result;
use ed_workflow::FlowEvent;
use prometheus::{IntCounter, IntCounterVec, IntGaugeVec, Opts, Registry};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// 流转指标收集器
pub struct FlowMonitor {
    /// Prometheus指标注册表
    registry: Registry,
    cases_registered_total: IntCounter,
    triage_total: IntCounterVec,
    treatments_started_total: IntCounter,
    reassignments_total: IntCounter,
    dispositions_total: IntCounterVec,
    waiting_cases: IntGaugeVec,
    start_time: Instant,
}

impl FlowMonitor {
    /// 创建新的监控器
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let cases_registered_total = IntCounter::with_opts(Opts::new(
            "ed_cases_registered_total",
            "Total number of registered emergency cases",
        ))?;

        let triage_total = IntCounterVec::new(
            Opts::new("ed_triage_total", "Total number of triage assessments"),
            &["level"],
        )?;

        let treatments_started_total = IntCounter::with_opts(Opts::new(
            "ed_treatments_started_total",
            "Total number of treatments started",
        ))?;

        let reassignments_total = IntCounter::with_opts(Opts::new(
            "ed_reassignments_total",
            "Total number of doctor or bay handovers",
        ))?;

        let dispositions_total = IntCounterVec::new(
            Opts::new("ed_dispositions_total", "Total number of dispositions"),
            &["outcome"],
        )?;

        let waiting_cases = IntGaugeVec::new(
            Opts::new("ed_waiting_cases", "Cases currently waiting per facility"),
            &["facility"],
        )?;

        registry.register(Box::new(cases_registered_total.clone()))?;
        registry.register(Box::new(triage_total.clone()))?;
        registry.register(Box::new(treatments_started_total.clone()))?;
        registry.register(Box::new(reassignments_total.clone()))?;
        registry.register(Box::new(dispositions_total.clone()))?;
        registry.register(Box::new(waiting_cases.clone()))?;

        Ok(Self {
            registry,
            cases_registered_total,
            triage_total,
            treatments_started_total,
            reassignments_total,
            dispositions_total,
            waiting_cases,
            start_time: Instant::now(),
        })
    }

    /// 记录一次流转事件
    pub fn record_event(&self, event: &FlowEvent) {
        debug!("Flow event for case {}", event.case_id());
        match event {
            FlowEvent::CaseRegistered { .. } => self.cases_registered_total.inc(),
            FlowEvent::CaseTriaged { level, .. } => {
                let label = level.value().to_string();
                self.triage_total.with_label_values(&[label.as_str()]).inc();
            }
            FlowEvent::TreatmentStarted { .. } => self.treatments_started_total.inc(),
            FlowEvent::CaseReassigned { .. } => self.reassignments_total.inc(),
            FlowEvent::CaseDisposed { outcome, .. } => self
                .dispositions_total
                .with_label_values(&[outcome.code()])
                .inc(),
        }
    }

    /// 更新院区候诊人数
    pub fn set_waiting(&self, facility_id: &str, count: usize) {
        self.waiting_cases
            .with_label_values(&[facility_id])
            .set(count as i64);
    }

    pub fn cases_registered(&self) -> u64 {
        self.cases_registered_total.get()
    }

    pub fn dispositions(&self, outcome: &str) -> u64 {
        self.dispositions_total.with_label_values(&[outcome]).get()
    }

    /// 获取Prometheus指标
    pub fn render(&self) -> Result<String> {
        use prometheus::Encoder;

        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;

        Ok(String::from_utf8(buffer)?)
    }

    /// 运行时间
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// 启动事件消费任务
    pub fn spawn_consumer(self: Arc<Self>, mut events: broadcast::Receiver<FlowEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => self.record_event(&event),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Flow monitor lagged, {} events not counted", skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }
}
