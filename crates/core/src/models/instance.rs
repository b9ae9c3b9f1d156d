use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::JobStatus;

/// 作业的一次执行实例，随所属作业一起删除
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Instance {
    pub id: i64,
    pub job_id: i64,
    pub status: JobStatus,
    pub log: String,
    pub is_remove: bool,
    pub create_time: NaiveDateTime,
    pub update_time: NaiveDateTime,
}

impl Instance {
    pub fn new(job_id: i64, now: NaiveDateTime) -> Self {
        Self {
            id: 0, // 将由存储层生成
            job_id,
            status: JobStatus::Running,
            log: String::new(),
            is_remove: false,
            create_time: now,
            update_time: now,
        }
    }
}
