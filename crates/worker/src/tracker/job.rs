use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use orchestra_core::SchedulerResult;
use orchestra_domain::repositories::TaskRepository;
use orchestra_domain::JobService;
use tracing::{error, info};

use super::{batch_execute, Tracker};

/// 作业生成追踪器
///
/// 启动时以及每天零点为所有有效任务生成当天的作业，单个任务失败只记录日志。
pub struct JobTracker {
    tasks: Arc<dyn TaskRepository>,
    jobs: Arc<JobService>,
    batch_size: u32,
}

impl JobTracker {
    pub fn new(tasks: Arc<dyn TaskRepository>, jobs: Arc<JobService>, batch_size: u32) -> Self {
        Self {
            tasks,
            jobs,
            batch_size: batch_size.max(1),
        }
    }

    /// 为所有有效任务生成当天作业，返回生成或已存在的作业数量
    pub async fn generate_today_jobs(&self) -> SchedulerResult<usize> {
        let job_count = AtomicUsize::new(0);
        let failed = AtomicUsize::new(0);

        batch_execute(self.batch_size, |page, page_size| {
            let job_count = &job_count;
            let failed = &failed;
            async move {
                let (batch, total) = self.tasks.listing(page, page_size, true).await?;
                for task in &batch {
                    match self.jobs.create(task).await {
                        Ok(created) => {
                            job_count.fetch_add(created.len(), Ordering::Relaxed);
                        }
                        Err(e) => {
                            failed.fetch_add(1, Ordering::Relaxed);
                            error!(task_id = task.id, error = %e, "生成作业失败");
                        }
                    }
                }
                Ok((batch.len(), total))
            }
        })
        .await?;

        let job_count = job_count.into_inner();
        info!(
            jobs = job_count,
            failed_tasks = failed.into_inner(),
            "当天作业生成完成"
        );
        Ok(job_count)
    }
}

#[async_trait]
impl Tracker for JobTracker {
    fn name(&self) -> &str {
        "job-tracker"
    }

    async fn on_started(&self) -> SchedulerResult<()> {
        self.generate_today_jobs().await.map(|_| ())
    }

    async fn on_date_change(&self) -> SchedulerResult<()> {
        self.generate_today_jobs().await.map(|_| ())
    }
}
