use std::sync::Arc;

use orchestra_core::{Clock, Entity, Machine, SchedulerError, SchedulerResult};
use tracing::info;

use crate::repositories::MachineRepository;

/// 机器的可更新字段，为空的字段保持不变
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MachineUpdate {
    pub ip: Option<String>,
    pub hostname: Option<String>,
    pub mac: Option<String>,
    pub cpu_load: Option<i32>,
    pub mem_load: Option<i32>,
    pub disk_usage: Option<i32>,
}

impl MachineUpdate {
    fn is_empty(&self) -> bool {
        self.ip.is_none()
            && self.hostname.is_none()
            && self.mac.is_none()
            && self.cpu_load.is_none()
            && self.mem_load.is_none()
            && self.disk_usage.is_none()
    }
}

/// 机器管理服务
pub struct MachineService {
    machines: Arc<dyn MachineRepository>,
    clock: Arc<dyn Clock>,
}

impl MachineService {
    pub fn new(machines: Arc<dyn MachineRepository>, clock: Arc<dyn Clock>) -> Self {
        Self { machines, clock }
    }

    pub async fn find_by_id(&self, id: i64) -> SchedulerResult<Option<Machine>> {
        self.machines.find_by_id(id).await
    }

    pub async fn find_by_ip(&self, ip: &str) -> SchedulerResult<Option<Machine>> {
        self.machines.find_by_ip(ip).await
    }

    pub async fn find_by_hostname(&self, hostname: &str) -> SchedulerResult<Option<Machine>> {
        self.machines.find_by_hostname(hostname).await
    }

    /// 分页查询机器，提供 `pattern` 时对 hostname 做模糊查询
    pub async fn listing(
        &self,
        page: u32,
        page_size: u32,
        pattern: Option<&str>,
    ) -> SchedulerResult<(Vec<Machine>, i64)> {
        self.machines.listing(page, page_size, pattern).await
    }

    /// 预注册一台机器，hostname、mac 与负载由 MachineTracker 上报
    pub async fn create(&self, ip: &str) -> SchedulerResult<Machine> {
        if self.machines.find_by_ip(ip).await?.is_some() {
            return Err(SchedulerError::duplicate("ip", ip));
        }
        let machine = self
            .machines
            .insert(&Machine::new(ip, self.clock.now()))
            .await?;
        info!(machine_id = machine.id, ip, "注册机器");
        Ok(machine)
    }

    /// 更新机器信息
    ///
    /// 机器不存在或已删除时返回 `NotFound`，要更新的 ip 已被其他机器占用时返回 `Duplicate`。
    pub async fn update(&self, id: i64, update: MachineUpdate) -> SchedulerResult<Machine> {
        let mut machine = self.require(id).await?;
        if update.is_empty() {
            return Ok(machine);
        }

        if let Some(ip) = update.ip {
            if let Some(other) = self.machines.find_by_ip(&ip).await? {
                if other.id != id {
                    return Err(SchedulerError::duplicate("ip", ip));
                }
            }
            machine.ip = ip;
        }
        if let Some(hostname) = update.hostname {
            machine.hostname = hostname;
        }
        if let Some(mac) = update.mac {
            machine.mac = mac;
        }
        if let Some(cpu_load) = update.cpu_load {
            machine.cpu_load = cpu_load;
        }
        if let Some(mem_load) = update.mem_load {
            machine.mem_load = mem_load;
        }
        if let Some(disk_usage) = update.disk_usage {
            machine.disk_usage = disk_usage;
        }

        machine.update_time = self.clock.now();
        self.machines.update(&machine).await?;
        Ok(machine)
    }

    /// 软删除机器，不存在或已删除时返回 `NotFound`
    pub async fn remove(&self, id: i64) -> SchedulerResult<()> {
        let mut machine = self.require(id).await?;
        machine.is_remove = true;
        machine.update_time = self.clock.now();
        self.machines.update(&machine).await?;
        info!(machine_id = id, ip = %machine.ip, "删除机器");
        Ok(())
    }

    async fn require(&self, id: i64) -> SchedulerResult<Machine> {
        self.machines
            .find_by_id(id)
            .await?
            .ok_or_else(|| SchedulerError::not_found(Entity::Machine, id))
    }
}
