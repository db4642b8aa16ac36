//! # 急诊科患者流转
//!
//! 汇总导出各子模块：
//! - [`model`]：值类型、错误类型与病例号工具
//! - [`workflow`]：分诊、状态机、候诊队列、资源分配与统计
//! - [`admin`]：配置、日志、指标与后台任务

pub use ed_admin as admin;
pub use ed_core as model;
pub use ed_workflow as workflow;

pub use ed_core::{EdError, Result};
pub use ed_workflow::{EmergencyFlowEngine, FlowSettings};
