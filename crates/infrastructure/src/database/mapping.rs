//! 数据库行与领域模型之间的转换

use orchestra_core::{
    Instance, Job, Machine, ScheduleDependencyInfo, ScheduleFormat, SchedulerError,
    SchedulerResult, Task,
};
use serde::de::DeserializeOwned;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

pub const TASK_COLUMNS: &str = "id, name, is_valid, period, format, retries, parents, dependency, is_remove, create_time, update_time";
pub const JOB_COLUMNS: &str = "id, task_id, machine_id, status, hour, minute, run_count, is_remove, create_time, update_time";
pub const MACHINE_COLUMNS: &str = "id, ip, mac, hostname, cpu_load, mem_load, disk_usage, is_remove, create_time, update_time";
pub const INSTANCE_COLUMNS: &str = "id, job_id, status, log, is_remove, create_time, update_time";

/// Helper functions for mapping SQLite rows
pub struct MappingHelpers;

impl MappingHelpers {
    /// SQLite 没有数组与结构类型，这些字段以 JSON 文本保存
    pub fn parse_json<T: DeserializeOwned>(row: &SqliteRow, field_name: &str) -> SchedulerResult<T> {
        let json_str: String = row.try_get(field_name)?;
        serde_json::from_str(&json_str).map_err(|e| {
            SchedulerError::Serialization(format!("解析字段 {field_name} 失败: {e}"))
        })
    }

    pub fn to_json<T: serde::Serialize>(value: &T) -> SchedulerResult<String> {
        Ok(serde_json::to_string(value)?)
    }

    pub fn row_to_task(row: &SqliteRow) -> SchedulerResult<Task> {
        let format: ScheduleFormat = Self::parse_json(row, "format")?;
        let parents: Vec<i64> = Self::parse_json(row, "parents")?;
        let dependency: ScheduleDependencyInfo = Self::parse_json(row, "dependency")?;
        Ok(Task {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            is_valid: row.try_get("is_valid")?,
            period: row.try_get("period")?,
            format,
            retries: row.try_get("retries")?,
            parents,
            dependency,
            is_remove: row.try_get("is_remove")?,
            create_time: row.try_get("create_time")?,
            update_time: row.try_get("update_time")?,
        })
    }

    pub fn row_to_job(row: &SqliteRow) -> SchedulerResult<Job> {
        Ok(Job {
            id: row.try_get("id")?,
            task_id: row.try_get("task_id")?,
            machine_id: row.try_get("machine_id")?,
            status: row.try_get("status")?,
            hour: row.try_get("hour")?,
            minute: row.try_get("minute")?,
            run_count: row.try_get("run_count")?,
            is_remove: row.try_get("is_remove")?,
            create_time: row.try_get("create_time")?,
            update_time: row.try_get("update_time")?,
        })
    }

    pub fn row_to_machine(row: &SqliteRow) -> SchedulerResult<Machine> {
        Ok(Machine {
            id: row.try_get("id")?,
            ip: row.try_get("ip")?,
            mac: row.try_get("mac")?,
            hostname: row.try_get("hostname")?,
            cpu_load: row.try_get("cpu_load")?,
            mem_load: row.try_get("mem_load")?,
            disk_usage: row.try_get("disk_usage")?,
            is_remove: row.try_get("is_remove")?,
            create_time: row.try_get("create_time")?,
            update_time: row.try_get("update_time")?,
        })
    }

    pub fn row_to_instance(row: &SqliteRow) -> SchedulerResult<Instance> {
        Ok(Instance {
            id: row.try_get("id")?,
            job_id: row.try_get("job_id")?,
            status: row.try_get("status")?,
            log: row.try_get("log")?,
            is_remove: row.try_get("is_remove")?,
            create_time: row.try_get("create_time")?,
            update_time: row.try_get("update_time")?,
        })
    }

    /// 唯一索引冲突转换为 `Duplicate`，其余错误按数据库错误处理
    pub fn map_unique_violation(err: sqlx::Error, field: &str, value: String) -> SchedulerError {
        let unique = err
            .as_database_error()
            .map(|db| db.is_unique_violation())
            .unwrap_or(false);
        if unique {
            SchedulerError::duplicate(field, value)
        } else {
            SchedulerError::from(err)
        }
    }
}
