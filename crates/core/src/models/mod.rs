//! # 数据模型
//!
//! 定义任务编排系统的核心数据结构：任务、作业、执行实例与机器节点。
//!
//! ## 核心模型
//!
//! ### Task - 任务定义
//! 带调度周期与上游依赖的工作单元，由外部维护，调度核心只读。
//!
//! ### Job - 作业
//! 任务在某一天（小时级任务为某个小时）的一次具体调度，每天最多一个，小时级任务最多 24 个。
//!
//! ### Instance - 执行实例
//! 作业的一次执行尝试，随作业一起软删除。
//!
//! ### Machine - 机器节点
//! 由 MachineTracker 自注册并维护负载信息。
//!
//! ## 状态流转
//!
//! ```text
//! INIT → READY → RUNNING → SUCCESS
//!   ↓               ↓
//! SKIPPED    FAILED / KILLED
//! ```
//!
//! SUCCESS 与 SKIPPED 都满足下游依赖。
//!
//! 时间字段统一使用本地墙上时间 `NaiveDateTime`，作业的“当天”“当前小时”以节点日历为准。
//! 所有删除都是软删除（`is_remove`）。

pub mod instance;
pub mod job;
pub mod machine;
pub mod task;

pub use instance::*;
pub use job::*;
pub use machine::*;
pub use task::*;
