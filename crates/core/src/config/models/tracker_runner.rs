use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    pub heartbeat_interval_ms: u64,
    pub batch_size: usize,
    pub machine_tracker_enabled: bool,
    pub job_tracker_enabled: bool,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: 500,
            batch_size: 100,
            machine_tracker_enabled: true,
            job_tracker_enabled: true,
        }
    }
}

impl TrackerConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.heartbeat_interval_ms == 0 {
            return Err(anyhow::anyhow!("心跳间隔必须大于0"));
        }

        if self.batch_size == 0 {
            return Err(anyhow::anyhow!("分批大小必须大于0"));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// 执行脚本的解释器
    pub shell: String,
    /// 在 WSL 中执行时把 Windows 路径转换为 /mnt/<盘符>/ 形式
    pub translate_windows_paths: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            shell: "bash".to_string(),
            translate_windows_paths: false,
        }
    }
}

impl RunnerConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.shell.trim().is_empty() {
            return Err(anyhow::anyhow!("解释器不能为空"));
        }

        Ok(())
    }
}
