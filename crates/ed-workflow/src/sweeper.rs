//! 未就诊离开（LWBS）定时扫描

use crate::engine::EmergencyFlowEngine;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

pub struct LwbsSweeper;

impl LwbsSweeper {
    /// 启动后台扫描任务
    pub fn spawn(engine: Arc<EmergencyFlowEngine>, every: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                let disposed = engine.sweep_left_without_being_seen().await;
                if !disposed.is_empty() {
                    tracing::warn!("LWBS sweep disposed {} cases", disposed.len());
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assignment::ResourceRoster;
    use crate::clock::ManualClock;
    use crate::engine::{FlowSettings, IntakeRequest};
    use chrono::{TimeZone, Utc};
    use ed_core::{ArrivalMode, CaseStatus, ComplaintCategory};
    use uuid::Uuid;

    #[tokio::test]
    async fn test_background_sweep_disposes_expired_case() {
        let start = Utc.with_ymd_and_hms(2026, 10, 18, 2, 0, 0).unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let engine = EmergencyFlowEngine::new(FlowSettings {
            lwbs_timeout: chrono::Duration::minutes(30),
            event_buffer: 16,
        })
        .with_clock(clock.clone());
        engine.register_facility("north", ResourceRoster::default()).await.unwrap();
        let engine = Arc::new(engine);

        let receipt = engine
            .intake(IntakeRequest {
                facility_id: "north".to_string(),
                patient_ref: Uuid::new_v4(),
                chief_complaint: ComplaintCategory::Sprain,
                arrival_mode: ArrivalMode::WalkIn,
                arrival_time: None,
            })
            .await
            .unwrap();
        clock.advance(chrono::Duration::minutes(45));

        let handle = LwbsSweeper::spawn(engine.clone(), Duration::from_millis(10));
        let mut status = CaseStatus::AwaitingTriage;
        for _ in 0..100 {
            status = engine.get_case(receipt.case_id).await.unwrap().status();
            if status == CaseStatus::Disposed {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        handle.abort();
        assert_eq!(status, CaseStatus::Disposed);
    }
}
