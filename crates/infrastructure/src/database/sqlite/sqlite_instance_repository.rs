use async_trait::async_trait;
use chrono::NaiveDateTime;
use orchestra_core::{Instance, SchedulerResult};
use orchestra_domain::repositories::InstanceRepository;
use sqlx::SqliteConnection;

use super::SqliteStore;
use crate::database::mapping::{MappingHelpers, INSTANCE_COLUMNS};

pub(crate) async fn insert(
    conn: &mut SqliteConnection,
    instance: &Instance,
) -> SchedulerResult<Instance> {
    let result = sqlx::query(
        r#"
        INSERT INTO instances (job_id, status, log, is_remove, create_time, update_time)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(instance.job_id)
    .bind(instance.status)
    .bind(&instance.log)
    .bind(instance.is_remove)
    .bind(instance.create_time)
    .bind(instance.update_time)
    .execute(&mut *conn)
    .await?;

    let mut created = instance.clone();
    created.id = result.last_insert_rowid();
    Ok(created)
}

pub(crate) async fn listing_by_job_id(
    conn: &mut SqliteConnection,
    job_id: i64,
) -> SchedulerResult<Vec<Instance>> {
    let rows = sqlx::query(&format!(
        "SELECT {INSTANCE_COLUMNS} FROM instances WHERE job_id = ? AND is_remove = 0 ORDER BY id ASC"
    ))
    .bind(job_id)
    .fetch_all(&mut *conn)
    .await?;

    rows.iter().map(MappingHelpers::row_to_instance).collect()
}

pub(crate) async fn remove_by_job_id(
    conn: &mut SqliteConnection,
    job_id: i64,
    now: NaiveDateTime,
) -> SchedulerResult<u64> {
    let result = sqlx::query(
        "UPDATE instances SET is_remove = 1, update_time = ? WHERE job_id = ? AND is_remove = 0",
    )
    .bind(now)
    .bind(job_id)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected())
}

#[async_trait]
impl InstanceRepository for SqliteStore {
    async fn insert(&self, instance: &Instance) -> SchedulerResult<Instance> {
        let mut conn = self.pool().acquire().await?;
        insert(&mut conn, instance).await
    }

    async fn listing_by_job_id(&self, job_id: i64) -> SchedulerResult<Vec<Instance>> {
        let mut conn = self.pool().acquire().await?;
        listing_by_job_id(&mut conn, job_id).await
    }

    async fn remove_by_job_id(&self, job_id: i64, now: NaiveDateTime) -> SchedulerResult<u64> {
        let mut conn = self.pool().acquire().await?;
        remove_by_job_id(&mut conn, job_id, now).await
    }
}
