use std::sync::Arc;

use async_trait::async_trait;
use orchestra_core::{Clock, Machine, SchedulerResult};
use orchestra_domain::repositories::MachineRepository;
use tracing::{debug, info};

use super::Tracker;
use crate::system_probe::SystemProbe;

type HeartbeatCallback = Box<dyn Fn(&Machine) + Send + Sync>;

/// 机器心跳追踪器
///
/// 启动及每次心跳时上报本机的身份与负载。按 ip 查找机器，找到则更新，
/// 否则自动注册一台新机器。
pub struct MachineTracker {
    machines: Arc<dyn MachineRepository>,
    probe: Arc<dyn SystemProbe>,
    clock: Arc<dyn Clock>,
    after_heartbeat: Option<HeartbeatCallback>,
}

impl MachineTracker {
    pub fn new(
        machines: Arc<dyn MachineRepository>,
        probe: Arc<dyn SystemProbe>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            machines,
            probe,
            clock,
            after_heartbeat: None,
        }
    }

    /// 每次心跳完成后用最新的机器信息回调
    pub fn with_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Machine) + Send + Sync + 'static,
    {
        self.after_heartbeat = Some(Box::new(callback));
        self
    }

    async fn report(&self) -> SchedulerResult<()> {
        let info = self.probe.system_info()?;
        let load = self.probe.system_load()?;
        let now = self.clock.now();

        let machine = match self.machines.find_by_ip(&info.ip).await? {
            Some(mut machine) => {
                machine.apply_heartbeat(&info, &load, now);
                self.machines.update(&machine).await?;
                machine
            }
            None => {
                let mut machine = Machine::new(info.ip.clone(), now);
                machine.apply_heartbeat(&info, &load, now);
                let machine = self.machines.insert(&machine).await?;
                info!(
                    machine_id = machine.id,
                    ip = %machine.ip,
                    hostname = %machine.hostname,
                    "机器自动注册"
                );
                machine
            }
        };

        debug!(
            machine_id = machine.id,
            cpu = machine.cpu_load,
            mem = machine.mem_load,
            disk = machine.disk_usage,
            "机器心跳"
        );
        if let Some(callback) = &self.after_heartbeat {
            callback(&machine);
        }
        Ok(())
    }
}

#[async_trait]
impl Tracker for MachineTracker {
    fn name(&self) -> &str {
        "machine-tracker"
    }

    async fn on_started(&self) -> SchedulerResult<()> {
        self.report().await
    }

    async fn on_heartbeat(&self) -> SchedulerResult<()> {
        self.report().await
    }
}
