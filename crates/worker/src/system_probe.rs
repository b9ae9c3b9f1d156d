use std::net::{IpAddr, Ipv4Addr, UdpSocket};
use std::sync::Mutex;

use orchestra_core::{SchedulerError, SchedulerResult, SystemInfo, SystemLoad};
use sysinfo::{CpuExt, DiskExt, System, SystemExt};
use tracing::warn;

/// 读取本机身份与负载
pub trait SystemProbe: Send + Sync {
    fn system_info(&self) -> SchedulerResult<SystemInfo>;
    fn system_load(&self) -> SchedulerResult<SystemLoad>;
}

/// 读取真实系统信息
///
/// CPU 使用率按两次采样之间的差值计算，第一次采样为 0。
pub struct LocalSystemProbe {
    system: Mutex<System>,
}

impl LocalSystemProbe {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new_all()),
        }
    }

    /// 通过 UDP 路由选择获取对外 IP，不会真正发送数据
    fn local_ip() -> IpAddr {
        let probe = || -> std::io::Result<IpAddr> {
            let socket = UdpSocket::bind("0.0.0.0:0")?;
            socket.connect("8.8.8.8:80")?;
            Ok(socket.local_addr()?.ip())
        };
        probe().unwrap_or_else(|e| {
            warn!(error = %e, "获取本机IP失败，使用回环地址");
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        })
    }

    /// 取第一块非回环网卡的 MAC 地址，读不到时为空
    fn local_mac() -> String {
        let Ok(entries) = std::fs::read_dir("/sys/class/net") else {
            return String::new();
        };
        let mut names: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .filter(|name| name != "lo")
            .collect();
        names.sort();

        names
            .iter()
            .filter_map(|name| std::fs::read_to_string(format!("/sys/class/net/{name}/address")).ok())
            .map(|address| address.trim().to_string())
            .find(|address| !address.is_empty() && address != "00:00:00:00:00:00")
            .unwrap_or_default()
    }
}

impl Default for LocalSystemProbe {
    fn default() -> Self {
        Self::new()
    }
}

fn percent(used: u64, total: u64) -> i32 {
    if total == 0 {
        0
    } else {
        (used.saturating_mul(100) / total) as i32
    }
}

impl SystemProbe for LocalSystemProbe {
    fn system_info(&self) -> SchedulerResult<SystemInfo> {
        let hostname = hostname::get()?.to_string_lossy().into_owned();
        Ok(SystemInfo {
            ip: Self::local_ip().to_string(),
            mac: Self::local_mac(),
            hostname,
        })
    }

    fn system_load(&self) -> SchedulerResult<SystemLoad> {
        let mut sys = self
            .system
            .lock()
            .map_err(|_| SchedulerError::Internal("系统信息锁已损坏".to_string()))?;
        sys.refresh_cpu();
        sys.refresh_memory();
        sys.refresh_disks();

        let cpu_load = sys.global_cpu_info().cpu_usage().round() as i32;
        let mem_load = percent(sys.used_memory(), sys.total_memory());
        let (used, total) = sys.disks().iter().fold((0u64, 0u64), |(used, total), disk| {
            (
                used + disk.total_space().saturating_sub(disk.available_space()),
                total + disk.total_space(),
            )
        });

        Ok(SystemLoad {
            cpu_load: cpu_load.clamp(0, 100),
            mem_load,
            disk_usage: percent(used, total),
        })
    }
}

/// 返回固定值的探针，可随时修改观测值
#[derive(Debug)]
pub struct FixedSystemProbe {
    state: Mutex<(SystemInfo, SystemLoad)>,
}

impl FixedSystemProbe {
    pub fn new(info: SystemInfo, load: SystemLoad) -> Self {
        Self {
            state: Mutex::new((info, load)),
        }
    }

    pub fn set(&self, info: SystemInfo, load: SystemLoad) {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *state = (info, load);
    }

    fn snapshot(&self) -> (SystemInfo, SystemLoad) {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl SystemProbe for FixedSystemProbe {
    fn system_info(&self) -> SchedulerResult<SystemInfo> {
        Ok(self.snapshot().0)
    }

    fn system_load(&self) -> SchedulerResult<SystemLoad> {
        Ok(self.snapshot().1)
    }
}
