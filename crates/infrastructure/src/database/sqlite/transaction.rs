use async_trait::async_trait;
use chrono::NaiveDateTime;
use orchestra_core::{Instance, Job, JobFilter, SchedulerError, SchedulerResult};
use orchestra_domain::repositories::{InstanceRepository, JobRepository, Transaction};
use sqlx::Sqlite;
use tokio::sync::{Mutex, MutexGuard};

use super::{sqlite_instance_repository as instances, sqlite_job_repository as jobs};

type Inner = sqlx::Transaction<'static, Sqlite>;

/// SQLite 事务，未提交即被丢弃时由 sqlx 回滚
pub struct SqliteTransaction {
    tx: Mutex<Option<Inner>>,
}

impl SqliteTransaction {
    pub fn new(tx: Inner) -> Self {
        Self {
            tx: Mutex::new(Some(tx)),
        }
    }

    async fn lock(&self) -> MutexGuard<'_, Option<Inner>> {
        self.tx.lock().await
    }
}

fn finished() -> SchedulerError {
    SchedulerError::Internal("事务已结束".to_string())
}

#[async_trait]
impl Transaction for SqliteTransaction {
    fn jobs(&self) -> &dyn JobRepository {
        self
    }

    fn instances(&self) -> &dyn InstanceRepository {
        self
    }

    async fn commit(self: Box<Self>) -> SchedulerResult<()> {
        let tx = self.tx.into_inner().ok_or_else(finished)?;
        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl JobRepository for SqliteTransaction {
    async fn find_by_id(&self, id: i64) -> SchedulerResult<Option<Job>> {
        let mut guard = self.lock().await;
        let tx = guard.as_mut().ok_or_else(finished)?;
        jobs::find_by_id(tx, id).await
    }

    async fn listing(&self, filter: &JobFilter) -> SchedulerResult<(Vec<Job>, i64)> {
        let mut guard = self.lock().await;
        let tx = guard.as_mut().ok_or_else(finished)?;
        jobs::listing(tx, filter).await
    }

    async fn insert(&self, job: &Job) -> SchedulerResult<Job> {
        let mut guard = self.lock().await;
        let tx = guard.as_mut().ok_or_else(finished)?;
        jobs::insert(tx, job).await
    }

    async fn update(&self, job: &Job) -> SchedulerResult<()> {
        let mut guard = self.lock().await;
        let tx = guard.as_mut().ok_or_else(finished)?;
        jobs::update(tx, job).await
    }
}

#[async_trait]
impl InstanceRepository for SqliteTransaction {
    async fn insert(&self, instance: &Instance) -> SchedulerResult<Instance> {
        let mut guard = self.lock().await;
        let tx = guard.as_mut().ok_or_else(finished)?;
        instances::insert(tx, instance).await
    }

    async fn listing_by_job_id(&self, job_id: i64) -> SchedulerResult<Vec<Instance>> {
        let mut guard = self.lock().await;
        let tx = guard.as_mut().ok_or_else(finished)?;
        instances::listing_by_job_id(tx, job_id).await
    }

    async fn remove_by_job_id(&self, job_id: i64, now: NaiveDateTime) -> SchedulerResult<u64> {
        let mut guard = self.lock().await;
        let tx = guard.as_mut().ok_or_else(finished)?;
        instances::remove_by_job_id(tx, job_id, now).await
    }
}
