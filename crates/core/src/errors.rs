use std::fmt;

use thiserror::Error;

use crate::models::SchedulePeriod;

/// 错误分类，调用方通过 [`SchedulerError::kind`] 显式判断错误类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    OperationNotAllowed,
    DirtyData,
    Duplicate,
    Database,
    Serialization,
    Configuration,
    Io,
    Cancelled,
    Internal,
}

/// 错误涉及的实体类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Entity {
    Task,
    Job,
    Machine,
    Instance,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Entity::Task => "task",
            Entity::Job => "job",
            Entity::Machine => "machine",
            Entity::Instance => "instance",
        };
        f.write_str(name)
    }
}

/// 调度器错误类型定义
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("{entity} {id} 不存在或已被删除{}", detail_suffix(.detail))]
    NotFound {
        entity: Entity,
        id: i64,
        detail: Option<String>,
    },

    #[error("操作不允许: {entity}{} {reason}", id_suffix(.id))]
    OperationNotAllowed {
        entity: Entity,
        id: Option<i64>,
        reason: String,
    },

    #[error("脏数据: task {task_id} ({period}) 存在冲突的作业 [{}]", join_ids(.job_ids))]
    DirtyData {
        task_id: i64,
        period: SchedulePeriod,
        job_ids: Vec<i64>,
    },

    #[error("{field} {value} 已存在")]
    Duplicate { field: String, value: String },

    #[error("数据库错误: {0}")]
    Database(String),

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("操作已取消")]
    Cancelled,

    #[error("内部错误: {0}")]
    Internal(String),
}

fn detail_suffix(detail: &Option<String>) -> String {
    detail
        .as_ref()
        .map(|d| format!(" ({d})"))
        .unwrap_or_default()
}

fn id_suffix(id: &Option<i64>) -> String {
    id.map(|id| format!(" {id}")).unwrap_or_default()
}

fn join_ids(ids: &[i64]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl SchedulerError {
    pub fn not_found(entity: Entity, id: i64) -> Self {
        Self::NotFound {
            entity,
            id,
            detail: None,
        }
    }

    pub fn not_found_with<S: Into<String>>(entity: Entity, id: i64, detail: S) -> Self {
        Self::NotFound {
            entity,
            id,
            detail: Some(detail.into()),
        }
    }

    pub fn not_allowed<S: Into<String>>(entity: Entity, id: Option<i64>, reason: S) -> Self {
        Self::OperationNotAllowed {
            entity,
            id,
            reason: reason.into(),
        }
    }

    pub fn dirty_data(task_id: i64, period: SchedulePeriod, job_ids: Vec<i64>) -> Self {
        Self::DirtyData {
            task_id,
            period,
            job_ids,
        }
    }

    pub fn duplicate<F: Into<String>, V: Into<String>>(field: F, value: V) -> Self {
        Self::Duplicate {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn database_error<S: Into<String>>(msg: S) -> Self {
        Self::Database(msg.into())
    }

    pub fn config_error<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            SchedulerError::NotFound { .. } => ErrorKind::NotFound,
            SchedulerError::OperationNotAllowed { .. } => ErrorKind::OperationNotAllowed,
            SchedulerError::DirtyData { .. } => ErrorKind::DirtyData,
            SchedulerError::Duplicate { .. } => ErrorKind::Duplicate,
            SchedulerError::Database(_) => ErrorKind::Database,
            SchedulerError::Serialization(_) => ErrorKind::Serialization,
            SchedulerError::Configuration(_) => ErrorKind::Configuration,
            SchedulerError::Io(_) => ErrorKind::Io,
            SchedulerError::Cancelled => ErrorKind::Cancelled,
            SchedulerError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// 只有基础设施层面的瞬时错误值得重试，业务错误需要调用方修正请求
    pub fn is_retryable(&self) -> bool {
        matches!(self, SchedulerError::Database(_) | SchedulerError::Io(_))
    }
}

impl From<sqlx::Error> for SchedulerError {
    fn from(err: sqlx::Error) -> Self {
        SchedulerError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for SchedulerError {
    fn from(err: serde_json::Error) -> Self {
        SchedulerError::Serialization(err.to_string())
    }
}

impl From<anyhow::Error> for SchedulerError {
    fn from(err: anyhow::Error) -> Self {
        SchedulerError::Internal(err.to_string())
    }
}

/// 统一的Result类型
pub type SchedulerResult<T> = std::result::Result<T, SchedulerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dirty_data_message_names_conflicting_jobs() {
        let err = SchedulerError::dirty_data(7, SchedulePeriod::Hour, vec![1, 2, 3]);
        assert_eq!(err.kind(), ErrorKind::DirtyData);
        let message = err.to_string();
        assert!(message.contains("task 7"));
        assert!(message.contains("HOUR"));
        assert!(message.contains("1, 2, 3"));
    }

    #[test]
    fn test_not_found_message() {
        let err = SchedulerError::not_found(Entity::Machine, 42);
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.to_string(), "machine 42 不存在或已被删除");

        let err = SchedulerError::not_found_with(Entity::Job, 3, "task 9");
        assert_eq!(err.to_string(), "job 3 不存在或已被删除 (task 9)");
    }

    #[test]
    fn test_retryable() {
        assert!(SchedulerError::database_error("locked").is_retryable());
        assert!(!SchedulerError::Cancelled.is_retryable());
        assert!(!SchedulerError::duplicate("ip", "10.0.0.1").is_retryable());
    }
}
