use async_trait::async_trait;
use orchestra_core::{SchedulerResult, Task};
use orchestra_domain::repositories::TaskRepository;
use sqlx::{Row, SqliteConnection};
use tracing::debug;

use super::SqliteStore;
use crate::database::mapping::{MappingHelpers, TASK_COLUMNS};

pub(crate) async fn find_by_id(conn: &mut SqliteConnection, id: i64) -> SchedulerResult<Option<Task>> {
    let row = sqlx::query(&format!(
        "SELECT {TASK_COLUMNS} FROM tasks WHERE id = ? AND is_remove = 0"
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    row.as_ref().map(MappingHelpers::row_to_task).transpose()
}

pub(crate) async fn listing(
    conn: &mut SqliteConnection,
    page: u32,
    page_size: u32,
    valid_only: bool,
) -> SchedulerResult<(Vec<Task>, i64)> {
    let condition = if valid_only {
        "is_remove = 0 AND is_valid = 1"
    } else {
        "is_remove = 0"
    };

    let total: i64 = sqlx::query(&format!("SELECT COUNT(*) AS count FROM tasks WHERE {condition}"))
        .fetch_one(&mut *conn)
        .await?
        .try_get("count")?;

    let offset = (page.max(1) as i64 - 1) * page_size as i64;
    let rows = sqlx::query(&format!(
        "SELECT {TASK_COLUMNS} FROM tasks WHERE {condition} ORDER BY id ASC LIMIT ? OFFSET ?"
    ))
    .bind(page_size as i64)
    .bind(offset)
    .fetch_all(&mut *conn)
    .await?;

    let tasks = rows
        .iter()
        .map(MappingHelpers::row_to_task)
        .collect::<SchedulerResult<Vec<_>>>()?;
    Ok((tasks, total))
}

pub(crate) async fn insert(conn: &mut SqliteConnection, task: &Task) -> SchedulerResult<Task> {
    let result = sqlx::query(
        r#"
        INSERT INTO tasks (name, is_valid, period, format, retries, parents, dependency, is_remove, create_time, update_time)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&task.name)
    .bind(task.is_valid)
    .bind(task.period)
    .bind(MappingHelpers::to_json(&task.format)?)
    .bind(task.retries)
    .bind(MappingHelpers::to_json(&task.parents)?)
    .bind(MappingHelpers::to_json(&task.dependency)?)
    .bind(task.is_remove)
    .bind(task.create_time)
    .bind(task.update_time)
    .execute(&mut *conn)
    .await?;

    let mut created = task.clone();
    created.id = result.last_insert_rowid();
    debug!("创建任务成功: {} ({})", created.name, created.id);
    Ok(created)
}

#[async_trait]
impl TaskRepository for SqliteStore {
    async fn find_by_id(&self, id: i64) -> SchedulerResult<Option<Task>> {
        let mut conn = self.pool().acquire().await?;
        find_by_id(&mut conn, id).await
    }

    async fn listing(
        &self,
        page: u32,
        page_size: u32,
        valid_only: bool,
    ) -> SchedulerResult<(Vec<Task>, i64)> {
        let mut conn = self.pool().acquire().await?;
        listing(&mut conn, page, page_size, valid_only).await
    }

    async fn insert(&self, task: &Task) -> SchedulerResult<Task> {
        let mut conn = self.pool().acquire().await?;
        insert(&mut conn, task).await
    }
}
