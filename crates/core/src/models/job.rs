use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// 作业：任务在某一天（小时级任务为某一天的某个小时）的一次具体调度
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Job {
    pub id: i64,
    pub task_id: i64,
    pub machine_id: Option<i64>,
    pub status: JobStatus,
    pub hour: i32,
    pub minute: i32,
    pub run_count: i32,
    pub is_remove: bool,
    pub create_time: NaiveDateTime,
    pub update_time: NaiveDateTime,
}

impl Job {
    /// 创建初始状态的作业
    pub fn new(task_id: i64, hour: i32, minute: i32, now: NaiveDateTime) -> Self {
        Self {
            id: 0, // 将由存储层生成
            task_id,
            machine_id: None,
            status: JobStatus::Init,
            hour,
            minute,
            run_count: 0,
            is_remove: false,
            create_time: now,
            update_time: now,
        }
    }
}

/// 作业状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum JobStatus {
    #[serde(rename = "INIT")]
    Init,
    #[serde(rename = "READY")]
    Ready,
    #[serde(rename = "RUNNING")]
    Running,
    #[serde(rename = "SUCCESS")]
    Success,
    #[serde(rename = "FAILED")]
    Failed,
    #[serde(rename = "KILLED")]
    Killed,
    #[serde(rename = "SKIPPED")]
    Skipped,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Init => "INIT",
            JobStatus::Ready => "READY",
            JobStatus::Running => "RUNNING",
            JobStatus::Success => "SUCCESS",
            JobStatus::Failed => "FAILED",
            JobStatus::Killed => "KILLED",
            JobStatus::Skipped => "SKIPPED",
        }
    }

    /// 满足下游依赖的状态
    pub const SETTLED: [JobStatus; 2] = [JobStatus::Success, JobStatus::Skipped];

    pub fn is_settled(&self) -> bool {
        Self::SETTLED.contains(self)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INIT" => Ok(JobStatus::Init),
            "READY" => Ok(JobStatus::Ready),
            "RUNNING" => Ok(JobStatus::Running),
            "SUCCESS" => Ok(JobStatus::Success),
            "FAILED" => Ok(JobStatus::Failed),
            "KILLED" => Ok(JobStatus::Killed),
            "SKIPPED" => Ok(JobStatus::Skipped),
            _ => Err(format!("Invalid job status: {s}")),
        }
    }
}

impl sqlx::Type<sqlx::Sqlite> for JobStatus {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <str as sqlx::Type<sqlx::Sqlite>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for JobStatus {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        Ok(s.parse::<JobStatus>()?)
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for JobStatus {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        <&str as sqlx::Encode<sqlx::Sqlite>>::encode(self.as_str(), buf)
    }
}

/// 作业分页查询条件，结果按创建时间倒序返回
///
/// `after`/`before` 以日期为粒度比较创建时间，两端均为闭区间。
/// `statuses` 为空表示不过滤状态，`page` 为空表示不分页。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobFilter {
    pub id: Option<i64>,
    pub task_id: Option<i64>,
    pub machine_id: Option<i64>,
    pub statuses: Vec<JobStatus>,
    pub hour: Option<i32>,
    pub after: Option<chrono::NaiveDate>,
    pub before: Option<chrono::NaiveDate>,
    pub page: Option<Page>,
}

impl JobFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }

    pub fn task_id(mut self, task_id: i64) -> Self {
        self.task_id = Some(task_id);
        self
    }

    pub fn machine_id(mut self, machine_id: i64) -> Self {
        self.machine_id = Some(machine_id);
        self
    }

    pub fn status(mut self, status: JobStatus) -> Self {
        self.statuses.push(status);
        self
    }

    pub fn hour(mut self, hour: i32) -> Self {
        self.hour = Some(hour);
        self
    }

    pub fn between(
        mut self,
        after: Option<chrono::NaiveDate>,
        before: Option<chrono::NaiveDate>,
    ) -> Self {
        self.after = after;
        self.before = before;
        self
    }

    pub fn page(mut self, page_id: u32, page_size: u32) -> Self {
        self.page = Some(Page::new(page_id, page_size));
        self
    }

    /// 检查作业是否满足除分页外的所有条件
    pub fn matches(&self, job: &Job) -> bool {
        let date = job.create_time.date();
        !job.is_remove
            && self.id.map_or(true, |id| job.id == id)
            && self.task_id.map_or(true, |id| job.task_id == id)
            && self.machine_id.map_or(true, |id| job.machine_id == Some(id))
            && (self.statuses.is_empty() || self.statuses.contains(&job.status))
            && self.hour.map_or(true, |hour| job.hour == hour)
            && self.after.map_or(true, |after| date >= after)
            && self.before.map_or(true, |before| date <= before)
    }
}

/// 分页参数，`page_id` 从 1 开始
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page_id: u32,
    pub page_size: u32,
}

impl Page {
    pub fn new(page_id: u32, page_size: u32) -> Self {
        Self {
            page_id: page_id.max(1),
            page_size,
        }
    }

    pub fn offset(&self) -> u64 {
        (self.page_id as u64 - 1) * self.page_size as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_filter_matches_date_window_inclusively() {
        let job = Job::new(1, 5, 0, at(2024, 5, 16, 23));
        let day = NaiveDate::from_ymd_opt(2024, 5, 16);
        assert!(JobFilter::new().between(day, day).matches(&job));
        assert!(JobFilter::new().between(None, day).matches(&job));
        assert!(!JobFilter::new()
            .between(NaiveDate::from_ymd_opt(2024, 5, 17), None)
            .matches(&job));
    }

    #[test]
    fn test_settled_statuses() {
        assert!(JobStatus::Success.is_settled());
        assert!(JobStatus::Skipped.is_settled());
        for status in [
            JobStatus::Init,
            JobStatus::Ready,
            JobStatus::Running,
            JobStatus::Failed,
            JobStatus::Killed,
        ] {
            assert!(!status.is_settled(), "{status} should not satisfy dependents");
        }
    }

    #[test]
    fn test_filter_skips_removed_and_other_statuses() {
        let mut job = Job::new(1, 5, 0, at(2024, 5, 16, 1));
        job.status = JobStatus::Skipped;
        let filter = JobFilter::new()
            .task_id(1)
            .status(JobStatus::Success)
            .status(JobStatus::Skipped);
        assert!(filter.matches(&job));
        assert!(!filter.clone().hour(6).matches(&job));

        job.is_remove = true;
        assert!(!filter.matches(&job));
    }

    #[test]
    fn test_page_offset() {
        assert_eq!(Page::new(1, 25).offset(), 0);
        assert_eq!(Page::new(3, 10).offset(), 20);
        assert_eq!(Page::new(0, 10).offset(), 0);
    }
}
