//! 急诊流转演示程序
//!
//! 模拟一个早班：登记、分诊、重新分诊、接诊、交接、处置与 LWBS 扫描

use anyhow::Context;
use chrono::{Duration, TimeZone, Utc};
use ed_flow::model::{BayId, ComplaintCategory, Consciousness, DispositionOutcome, DoctorId, VitalsSnapshot};
use ed_flow::workflow::{
    Clock, EmergencyFlowEngine, FlowSettings, IntakeRequest, ManualClock, MemoryAuditSink,
    QueueSnapshot, ResourceRoster, StatsWindow,
};
use std::sync::Arc;
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt().with_env_filter("info").init();

    println!("🏥 急诊流转演示");
    println!("================================");

    let start = Utc
        .with_ymd_and_hms(2026, 10, 18, 7, 30, 0)
        .single()
        .context("invalid shift start")?;
    let clock = Arc::new(ManualClock::new(start));
    let audit = Arc::new(MemoryAuditSink::new());
    let engine = EmergencyFlowEngine::new(FlowSettings {
        lwbs_timeout: Duration::minutes(90),
        event_buffer: 64,
    })
    .with_clock(clock.clone())
    .with_audit(audit.clone());

    engine
        .register_facility(
            "north",
            ResourceRoster::new(
                vec![DoctorId::new("dr-chen"), DoctorId::new("dr-okafor")],
                vec![BayId::new("resus-1"), BayId::new("bay-2"), BayId::new("bay-3")],
            ),
        )
        .await?;

    let mut events = engine.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if let Ok(line) = serde_json::to_string(&event) {
                println!("  📣 {}", line);
            }
        }
    });

    println!("\n🚑 登记");
    let mut cases = Vec::new();
    for (offset, complaint) in [
        (0, ComplaintCategory::Sprain),
        (5, ComplaintCategory::ChestPain),
        (8, ComplaintCategory::ColdFlu),
        (12, ComplaintCategory::Fracture),
    ] {
        let receipt = engine
            .intake(IntakeRequest {
                facility_id: "north".to_string(),
                patient_ref: Uuid::new_v4(),
                chief_complaint: complaint,
                arrival_mode: Default::default(),
                arrival_time: Some(start + Duration::minutes(offset)),
            })
            .await?;
        println!("  {} {}", receipt.case_number, complaint);
        cases.push(receipt);
    }

    println!("\n🩺 分诊");
    clock.set(start + Duration::minutes(15));
    for receipt in &cases {
        let vitals = VitalsSnapshot {
            heart_rate: Some(84),
            oxygen_saturation: Some(97),
            consciousness: Some(Consciousness::Alert),
            ..VitalsSnapshot::new(clock.now())
        };
        let result = engine.triage(receipt.case_id, receipt.version, vitals).await?;
        println!("  {} → {}", receipt.case_number, result.level);
    }

    // 感冒患者血氧下降，重新分诊
    clock.advance(Duration::minutes(5));
    let flu = &cases[2];
    let current = engine.get_case(flu.case_id).await?;
    let vitals = VitalsSnapshot {
        oxygen_saturation: Some(89),
        ..VitalsSnapshot::new(clock.now())
    };
    let retriaged = engine.triage(flu.case_id, current.version(), vitals).await?;
    println!("  {} 重新分诊 → {} ({})", flu.case_number, retriaged.level, retriaged.rationale.join("; "));

    print_queue(&engine.queue_snapshot("north").await?);

    println!("\n🛏️ 接诊");
    let chest = engine.get_case(cases[1].case_id).await?;
    let chest_version = engine
        .start_treatment(chest.id(), chest.version(), DoctorId::new("dr-chen"), BayId::new("resus-1"))
        .await?;
    let flu_case = engine.get_case(flu.case_id).await?;
    match engine
        .start_treatment(flu_case.id(), flu_case.version(), DoctorId::new("dr-chen"), BayId::new("bay-2"))
        .await
    {
        Ok(_) => println!("  unexpected double booking"),
        Err(e) => println!("  dr-chen 忙碌: {}", e),
    }
    engine
        .start_treatment(flu_case.id(), flu_case.version(), DoctorId::new("dr-okafor"), BayId::new("bay-2"))
        .await?;

    println!("\n🔁 交接与处置");
    clock.advance(Duration::minutes(40));
    let chest_version = engine
        .reassign(chest.id(), chest_version, DoctorId::new("dr-chen"), BayId::new("bay-3"))
        .await?;
    engine
        .dispose(chest.id(), chest_version, DispositionOutcome::Admitted)
        .await?;

    println!("\n⏰ LWBS 扫描");
    clock.advance(Duration::minutes(60));
    let left = engine.sweep_left_without_being_seen().await;
    println!("  {} 位患者未就诊离开", left.len());

    print_queue(&engine.queue_snapshot("north").await?);

    let window = StatsWindow::new(start, clock.now(), 30)?;
    let stats = engine.flow_stats("north", &window).await?;
    println!("\n📊 统计");
    println!("{}", serde_json::to_string_pretty(&stats)?);

    println!("\n📝 审计记录: {} 条", audit.records().len());
    println!("\n✅ 演示完成！");
    Ok(())
}

fn print_queue(snapshot: &QueueSnapshot) {
    println!("\n📋 候诊队列 ({})", snapshot.facility_id);
    for entry in &snapshot.waiting {
        let level = entry
            .case
            .triage_level
            .map(|l| l.to_string())
            .unwrap_or_else(|| "未分诊".to_string());
        println!(
            "  #{} {} {} 等待 {} 分钟{}",
            entry.position,
            entry.case.case_number,
            level,
            entry.case.wait_minutes,
            if entry.case.overdue { " ⚠️" } else { "" }
        );
    }
    for case in &snapshot.in_treatment {
        if let Some(assignment) = &case.assignment {
            println!(
                "  🩺 {} {} @ {}",
                case.case_number, assignment.doctor_id, assignment.bay_id
            );
        }
    }
}
