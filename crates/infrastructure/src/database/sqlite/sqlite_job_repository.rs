use async_trait::async_trait;
use orchestra_core::{Job, JobFilter, SchedulerError, SchedulerResult};
use orchestra_domain::repositories::JobRepository;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};
use tracing::debug;

use super::SqliteStore;
use crate::database::mapping::{MappingHelpers, JOB_COLUMNS};

/// 追加过滤条件，调用前语句必须以 `WHERE is_remove = 0` 结尾
fn push_conditions(builder: &mut QueryBuilder<'_, Sqlite>, filter: &JobFilter) {
    if let Some(id) = filter.id {
        builder.push(" AND id = ").push_bind(id);
    }
    if let Some(task_id) = filter.task_id {
        builder.push(" AND task_id = ").push_bind(task_id);
    }
    if let Some(machine_id) = filter.machine_id {
        builder.push(" AND machine_id = ").push_bind(machine_id);
    }
    if !filter.statuses.is_empty() {
        builder.push(" AND status IN (");
        let mut separated = builder.separated(", ");
        for status in &filter.statuses {
            separated.push_bind(status.as_str());
        }
        separated.push_unseparated(")");
    }
    if let Some(hour) = filter.hour {
        builder.push(" AND hour = ").push_bind(hour);
    }
    if let Some(after) = filter.after {
        builder.push(" AND date(create_time) >= ").push_bind(after);
    }
    if let Some(before) = filter.before {
        builder.push(" AND date(create_time) <= ").push_bind(before);
    }
}

pub(crate) async fn find_by_id(conn: &mut SqliteConnection, id: i64) -> SchedulerResult<Option<Job>> {
    let row = sqlx::query(&format!(
        "SELECT {JOB_COLUMNS} FROM jobs WHERE id = ? AND is_remove = 0"
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    row.as_ref().map(MappingHelpers::row_to_job).transpose()
}

pub(crate) async fn listing(
    conn: &mut SqliteConnection,
    filter: &JobFilter,
) -> SchedulerResult<(Vec<Job>, i64)> {
    let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM jobs WHERE is_remove = 0");
    push_conditions(&mut count, filter);
    let total: i64 = count
        .build_query_scalar()
        .fetch_one(&mut *conn)
        .await?;

    let mut select =
        QueryBuilder::<Sqlite>::new(format!("SELECT {JOB_COLUMNS} FROM jobs WHERE is_remove = 0"));
    push_conditions(&mut select, filter);
    select.push(" ORDER BY create_time DESC, id DESC");
    if let Some(page) = filter.page {
        select
            .push(" LIMIT ")
            .push_bind(page.page_size as i64)
            .push(" OFFSET ")
            .push_bind(page.offset() as i64);
    }

    let rows = select.build().fetch_all(&mut *conn).await?;
    let jobs = rows
        .iter()
        .map(MappingHelpers::row_to_job)
        .collect::<SchedulerResult<Vec<_>>>()?;
    Ok((jobs, total))
}

pub(crate) async fn insert(conn: &mut SqliteConnection, job: &Job) -> SchedulerResult<Job> {
    let result = sqlx::query(
        r#"
        INSERT INTO jobs (task_id, machine_id, status, hour, minute, run_count, is_remove, create_time, update_time)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(job.task_id)
    .bind(job.machine_id)
    .bind(job.status)
    .bind(job.hour)
    .bind(job.minute)
    .bind(job.run_count)
    .bind(job.is_remove)
    .bind(job.create_time)
    .bind(job.update_time)
    .execute(&mut *conn)
    .await
    .map_err(|e| {
        MappingHelpers::map_unique_violation(
            e,
            "job",
            format!(
                "task {} {} hour {}",
                job.task_id,
                job.create_time.date(),
                job.hour
            ),
        )
    })?;

    let mut created = job.clone();
    created.id = result.last_insert_rowid();
    debug!("创建作业成功: task {} hour {} -> {}", job.task_id, job.hour, created.id);
    Ok(created)
}

pub(crate) async fn update(conn: &mut SqliteConnection, job: &Job) -> SchedulerResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE jobs
        SET machine_id = ?, status = ?, hour = ?, minute = ?, run_count = ?, is_remove = ?, update_time = ?
        WHERE id = ?
        "#,
    )
    .bind(job.machine_id)
    .bind(job.status)
    .bind(job.hour)
    .bind(job.minute)
    .bind(job.run_count)
    .bind(job.is_remove)
    .bind(job.update_time)
    .bind(job.id)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(SchedulerError::not_found(orchestra_core::Entity::Job, job.id));
    }
    Ok(())
}

#[async_trait]
impl JobRepository for SqliteStore {
    async fn find_by_id(&self, id: i64) -> SchedulerResult<Option<Job>> {
        let mut conn = self.pool().acquire().await?;
        find_by_id(&mut conn, id).await
    }

    async fn listing(&self, filter: &JobFilter) -> SchedulerResult<(Vec<Job>, i64)> {
        let mut conn = self.pool().acquire().await?;
        listing(&mut conn, filter).await
    }

    async fn insert(&self, job: &Job) -> SchedulerResult<Job> {
        let mut conn = self.pool().acquire().await?;
        insert(&mut conn, job).await
    }

    async fn update(&self, job: &Job) -> SchedulerResult<()> {
        let mut conn = self.pool().acquire().await?;
        update(&mut conn, job).await
    }
}
