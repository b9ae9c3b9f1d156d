use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// 机器节点信息
///
/// `ip` 在未删除的机器中唯一；hostname、mac 以及负载字段由 MachineTracker 心跳维护，
/// 负载均为百分比。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Machine {
    pub id: i64,
    pub ip: String,
    pub mac: String,
    pub hostname: String,
    pub cpu_load: i32,
    pub mem_load: i32,
    pub disk_usage: i32,
    pub is_remove: bool,
    pub create_time: NaiveDateTime,
    pub update_time: NaiveDateTime,
}

impl Machine {
    /// 预注册一台机器，其余字段等待心跳上报
    pub fn new<S: Into<String>>(ip: S, now: NaiveDateTime) -> Self {
        Self {
            id: 0, // 将由存储层生成
            ip: ip.into(),
            mac: String::new(),
            hostname: String::new(),
            cpu_load: 0,
            mem_load: 0,
            disk_usage: 0,
            is_remove: false,
            create_time: now,
            update_time: now,
        }
    }

    /// 应用一次心跳观测值，id 与 ip 保持不变
    pub fn apply_heartbeat(&mut self, info: &SystemInfo, load: &SystemLoad, now: NaiveDateTime) {
        self.hostname = info.hostname.clone();
        self.mac = info.mac.clone();
        self.cpu_load = load.cpu_load;
        self.mem_load = load.mem_load;
        self.disk_usage = load.disk_usage;
        self.update_time = now;
    }
}

/// 本机身份信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemInfo {
    pub ip: String,
    pub mac: String,
    pub hostname: String,
}

/// 本机负载，百分比
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SystemLoad {
    pub cpu_load: i32,
    pub mem_load: i32,
    pub disk_usage: i32,
}
