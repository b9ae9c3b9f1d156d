use std::sync::Arc;

use chrono::NaiveDate;
use orchestra_core::datetime::{monday, month_start_day, new_year_day, yesterday};
use orchestra_core::{
    Clock, Entity, Job, JobFilter, JobStatus, SchedulePeriod, SchedulerError, SchedulerResult,
    Task,
};
use tracing::{debug, info, warn};

use crate::repositories::{JobRepository, MachineRepository, TaskRepository, TransactionManager};

/// 查找当天已生成作业时使用的分页大小，小时级任务一天最多 24 个作业
const TODAY_JOBS_PAGE_SIZE: u32 = 25;

/// 作业的可更新字段，为空的字段保持不变
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub machine_id: Option<i64>,
    pub run_count: Option<i32>,
}

impl JobUpdate {
    pub fn status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn machine_id(mut self, machine_id: i64) -> Self {
        self.machine_id = Some(machine_id);
        self
    }

    pub fn run_count(mut self, run_count: i32) -> Self {
        self.run_count = Some(run_count);
        self
    }

    fn is_empty(&self) -> bool {
        self.status.is_none() && self.machine_id.is_none() && self.run_count.is_none()
    }
}

/// 上游任务在某个窗口内需要满足的成功作业数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct DependencyWindow {
    after: Option<NaiveDate>,
    before: NaiveDate,
    hour: Option<i32>,
    expected: i64,
}

impl DependencyWindow {
    fn for_parent(parent: SchedulePeriod, child: SchedulePeriod, job: &Job) -> Self {
        let date = job.create_time.date();
        let single = |after: Option<NaiveDate>| Self {
            after,
            before: date,
            hour: None,
            expected: 1,
        };
        match parent {
            SchedulePeriod::Once => single(None),
            SchedulePeriod::Hour if child == SchedulePeriod::Hour => Self {
                after: Some(date),
                before: date,
                hour: Some(job.hour),
                expected: 1,
            },
            SchedulePeriod::Hour => {
                let day = yesterday(date);
                Self {
                    after: Some(day),
                    before: day,
                    hour: None,
                    expected: 24,
                }
            }
            SchedulePeriod::Day => single(Some(date)),
            SchedulePeriod::Week => single(Some(monday(date))),
            SchedulePeriod::Month => single(Some(month_start_day(date))),
            SchedulePeriod::Year => single(Some(new_year_day(date))),
        }
    }
}

/// 作业调度服务
///
/// 负责按任务的调度周期生成作业、判定上游依赖是否满足以及作业的更新与清理。
pub struct JobService {
    tasks: Arc<dyn TaskRepository>,
    jobs: Arc<dyn JobRepository>,
    machines: Arc<dyn MachineRepository>,
    tx_manager: Arc<dyn TransactionManager>,
    clock: Arc<dyn Clock>,
}

impl JobService {
    pub fn new(
        tasks: Arc<dyn TaskRepository>,
        jobs: Arc<dyn JobRepository>,
        machines: Arc<dyn MachineRepository>,
        tx_manager: Arc<dyn TransactionManager>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            tasks,
            jobs,
            machines,
            tx_manager,
            clock,
        }
    }

    /// 通过 id 查找作业，不存在或已删除时返回 None
    pub async fn find_by_id(&self, id: i64) -> SchedulerResult<Option<Job>> {
        self.jobs.find_by_id(id).await
    }

    pub async fn listing(&self, filter: &JobFilter) -> SchedulerResult<(Vec<Job>, i64)> {
        self.jobs.listing(filter).await
    }

    /// 为任务生成当天的作业
    ///
    /// 非小时级任务每天一个作业，小时级任务每天 24 个作业。已经生成过则直接返回已有作业，
    /// 已有作业数量不符合预期时返回 `DirtyData`。当天不需要调度时返回空列表。
    pub async fn create(&self, task: &Task) -> SchedulerResult<Vec<Job>> {
        if !task.is_valid {
            return Err(SchedulerError::not_allowed(
                Entity::Task,
                Some(task.id),
                "任务已失效，不能生成作业",
            ));
        }
        if !task.format.is_valid(task.period) {
            return Err(SchedulerError::not_allowed(
                Entity::Task,
                Some(task.id),
                format!("调度格式与周期 {} 不匹配", task.period),
            ));
        }

        let now = self.clock.now();
        let today = now.date();
        if !task.format.should_schedule(task.period, today) {
            debug!(task_id = task.id, period = %task.period, "任务今天不需要调度");
            return Ok(Vec::new());
        }

        let tx = self.tx_manager.begin().await?;
        let today_jobs = JobFilter::new()
            .task_id(task.id)
            .between(Some(today), Some(today));
        let (mut existing, total) = tx
            .jobs()
            .listing(&today_jobs.clone().page(1, TODAY_JOBS_PAGE_SIZE))
            .await?;

        let expected: i64 = match task.period {
            SchedulePeriod::Hour => 24,
            _ => 1,
        };

        if total == expected {
            existing.sort_by_key(|job| (job.hour, job.id));
            return Ok(existing);
        }
        if total > 0 {
            if total > existing.len() as i64 {
                // 错误中列出全部冲突作业
                existing = tx.jobs().listing(&today_jobs).await?.0;
            }
            let job_ids = existing.iter().map(|job| job.id).collect();
            warn!(
                task_id = task.id,
                period = %task.period,
                count = total,
                "当天作业数量异常"
            );
            return Err(SchedulerError::dirty_data(task.id, task.period, job_ids));
        }

        let minute = task.format.minute as i32;
        let hours: Vec<i32> = match task.period {
            SchedulePeriod::Hour => (0..24).collect(),
            _ => vec![task.format.hour.unwrap_or(0) as i32],
        };

        let mut created = Vec::with_capacity(hours.len());
        for hour in hours {
            let job = tx
                .jobs()
                .insert(&Job::new(task.id, hour, minute, now))
                .await?;
            created.push(job);
        }
        tx.commit().await?;

        info!(task_id = task.id, count = created.len(), "生成作业");
        Ok(created)
    }

    /// 更新作业
    ///
    /// 作业不存在或已删除、或指定的机器不存在时返回 `NotFound`。
    /// 没有指定任何字段时不会写入存储。
    pub async fn update(&self, id: i64, update: JobUpdate) -> SchedulerResult<Job> {
        let mut job = self
            .jobs
            .find_by_id(id)
            .await?
            .ok_or_else(|| SchedulerError::not_found(Entity::Job, id))?;

        if update.is_empty() {
            return Ok(job);
        }

        if let Some(machine_id) = update.machine_id {
            self.machines
                .find_by_id(machine_id)
                .await?
                .ok_or_else(|| SchedulerError::not_found(Entity::Machine, machine_id))?;
            job.machine_id = Some(machine_id);
        }
        if let Some(status) = update.status {
            job.status = status;
        }
        if let Some(run_count) = update.run_count {
            job.run_count = run_count;
        }

        job.update_time = self.clock.now();
        self.jobs.update(&job).await?;
        Ok(job)
    }

    /// 检查作业的上游依赖是否已满足
    ///
    /// RUNNING 的作业永远不就绪，READY 的作业永远就绪。
    /// 不存在或已删除的上游任务不参与判定。
    pub async fn is_ready(&self, job: &Job) -> SchedulerResult<bool> {
        match job.status {
            JobStatus::Running => return Ok(false),
            JobStatus::Ready => return Ok(true),
            _ => {}
        }

        let task = self.tasks.find_by_id(job.task_id).await?.ok_or_else(|| {
            SchedulerError::not_found_with(Entity::Task, job.task_id, format!("job {}", job.id))
        })?;

        for &parent_id in &task.parents {
            let Some(parent) = self.tasks.find_by_id(parent_id).await? else {
                debug!(job_id = job.id, parent_id, "上游任务不存在，忽略");
                continue;
            };

            let window = DependencyWindow::for_parent(parent.period, task.period, job);
            let mut filter = JobStatus::SETTLED
                .into_iter()
                .fold(JobFilter::new().task_id(parent.id), JobFilter::status)
                .between(window.after, Some(window.before));
            if let Some(hour) = window.hour {
                filter = filter.hour(hour);
            }

            let (_, count) = self.jobs.listing(&filter).await?;
            if count != window.expected {
                debug!(
                    job_id = job.id,
                    parent_id,
                    count,
                    expected = window.expected,
                    "上游依赖未满足"
                );
                return Ok(false);
            }
        }

        Ok(true)
    }

    /// 检查作业是否可以重试
    ///
    /// 只有 FAILED 的作业可以重试，第一次执行不算重试。
    pub async fn can_retry(&self, id: i64) -> SchedulerResult<bool> {
        let job = self
            .jobs
            .find_by_id(id)
            .await?
            .ok_or_else(|| SchedulerError::not_found(Entity::Job, id))?;
        if job.status != JobStatus::Failed {
            return Ok(false);
        }
        let Some(task) = self.tasks.find_by_id(job.task_id).await? else {
            return Ok(false);
        };
        Ok(job.run_count - 1 < task.retries)
    }

    /// 删除 id 为 `id` 或归属任务为 `task_id` 的作业，级联删除这些作业的实例
    ///
    /// 两个条件都没有指定时返回 `OperationNotAllowed`，返回删除的作业数量。
    pub async fn remove(&self, id: Option<i64>, task_id: Option<i64>) -> SchedulerResult<usize> {
        if id.is_none() && task_id.is_none() {
            return Err(SchedulerError::not_allowed(
                Entity::Job,
                None,
                "删除作业必须指定作业 id 或任务 id",
            ));
        }

        let mut filter = JobFilter::new();
        filter.id = id;
        filter.task_id = task_id;

        let tx = self.tx_manager.begin().await?;
        let (jobs, _) = tx.jobs().listing(&filter).await?;
        let now = self.clock.now();
        for mut job in jobs.iter().cloned() {
            job.is_remove = true;
            job.update_time = now;
            tx.jobs().update(&job).await?;
            tx.instances().remove_by_job_id(job.id, now).await?;
        }
        tx.commit().await?;

        info!(?id, ?task_id, count = jobs.len(), "删除作业");
        Ok(jobs.len())
    }
}
