use async_trait::async_trait;
use orchestra_core::{Entity, Machine, SchedulerError, SchedulerResult};
use orchestra_domain::repositories::MachineRepository;
use sqlx::{QueryBuilder, Row, Sqlite};
use tracing::debug;

use super::SqliteStore;
use crate::database::mapping::{MappingHelpers, MACHINE_COLUMNS};

impl SqliteStore {
    async fn find_machine_by(&self, column: &str, value: &str) -> SchedulerResult<Option<Machine>> {
        let row = sqlx::query(&format!(
            "SELECT {MACHINE_COLUMNS} FROM machines WHERE {column} = ? AND is_remove = 0 ORDER BY id ASC LIMIT 1"
        ))
        .bind(value)
        .fetch_optional(self.pool())
        .await?;

        row.as_ref().map(MappingHelpers::row_to_machine).transpose()
    }
}

#[async_trait]
impl MachineRepository for SqliteStore {
    async fn find_by_id(&self, id: i64) -> SchedulerResult<Option<Machine>> {
        let row = sqlx::query(&format!(
            "SELECT {MACHINE_COLUMNS} FROM machines WHERE id = ? AND is_remove = 0"
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await?;

        row.as_ref().map(MappingHelpers::row_to_machine).transpose()
    }

    async fn find_by_ip(&self, ip: &str) -> SchedulerResult<Option<Machine>> {
        self.find_machine_by("ip", ip).await
    }

    async fn find_by_hostname(&self, hostname: &str) -> SchedulerResult<Option<Machine>> {
        self.find_machine_by("hostname", hostname).await
    }

    async fn listing(
        &self,
        page: u32,
        page_size: u32,
        pattern: Option<&str>,
    ) -> SchedulerResult<(Vec<Machine>, i64)> {
        let like = pattern.map(|p| format!("%{p}%"));

        let mut count =
            QueryBuilder::<Sqlite>::new("SELECT COUNT(*) AS count FROM machines WHERE is_remove = 0");
        if let Some(like) = &like {
            count.push(" AND hostname LIKE ").push_bind(like.clone());
        }
        let total: i64 = count
            .build()
            .fetch_one(self.pool())
            .await?
            .try_get("count")?;

        let mut select = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {MACHINE_COLUMNS} FROM machines WHERE is_remove = 0"
        ));
        if let Some(like) = like {
            select.push(" AND hostname LIKE ").push_bind(like);
        }
        let offset = (page.max(1) as i64 - 1) * page_size as i64;
        select
            .push(" ORDER BY id ASC LIMIT ")
            .push_bind(page_size as i64)
            .push(" OFFSET ")
            .push_bind(offset);

        let rows = select.build().fetch_all(self.pool()).await?;
        let machines = rows
            .iter()
            .map(MappingHelpers::row_to_machine)
            .collect::<SchedulerResult<Vec<_>>>()?;
        Ok((machines, total))
    }

    async fn insert(&self, machine: &Machine) -> SchedulerResult<Machine> {
        let result = sqlx::query(
            r#"
            INSERT INTO machines (ip, mac, hostname, cpu_load, mem_load, disk_usage, is_remove, create_time, update_time)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&machine.ip)
        .bind(&machine.mac)
        .bind(&machine.hostname)
        .bind(machine.cpu_load)
        .bind(machine.mem_load)
        .bind(machine.disk_usage)
        .bind(machine.is_remove)
        .bind(machine.create_time)
        .bind(machine.update_time)
        .execute(self.pool())
        .await
        .map_err(|e| MappingHelpers::map_unique_violation(e, "ip", machine.ip.clone()))?;

        let mut created = machine.clone();
        created.id = result.last_insert_rowid();
        debug!("注册机器成功: {} ({})", created.ip, created.id);
        Ok(created)
    }

    async fn update(&self, machine: &Machine) -> SchedulerResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE machines
            SET ip = ?, mac = ?, hostname = ?, cpu_load = ?, mem_load = ?, disk_usage = ?, is_remove = ?, update_time = ?
            WHERE id = ?
            "#,
        )
        .bind(&machine.ip)
        .bind(&machine.mac)
        .bind(&machine.hostname)
        .bind(machine.cpu_load)
        .bind(machine.mem_load)
        .bind(machine.disk_usage)
        .bind(machine.is_remove)
        .bind(machine.update_time)
        .bind(machine.id)
        .execute(self.pool())
        .await
        .map_err(|e| MappingHelpers::map_unique_violation(e, "ip", machine.ip.clone()))?;

        if result.rows_affected() == 0 {
            return Err(SchedulerError::not_found(Entity::Machine, machine.id));
        }
        Ok(())
    }
}
