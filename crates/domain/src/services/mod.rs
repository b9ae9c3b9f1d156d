//! # 领域服务
//!
//! 服务本身不保存状态，所有数据通过构造时注入的仓储访问。

pub mod job_service;
pub mod machine_service;

pub use job_service::{JobService, JobUpdate};
pub use machine_service::{MachineService, MachineUpdate};
