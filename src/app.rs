use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use orchestra_core::{AppConfig, Clock, SystemClock};
use orchestra_domain::JobService;
use orchestra_infrastructure::SqliteStore;
use orchestra_worker::{JobTracker, LocalSystemProbe, MachineTracker, TrackerDriver};
use tracing::info;

/// 主应用程序
///
/// 持有存储与后台追踪器，追踪器按配置开关决定是否启动。
pub struct Application {
    store: SqliteStore,
    machine_tracker: Option<TrackerDriver<MachineTracker>>,
    job_tracker: Option<TrackerDriver<JobTracker>>,
}

impl Application {
    pub async fn new(config: AppConfig) -> Result<Self> {
        let store = SqliteStore::connect(&config.database).await?;
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let interval = Duration::from_millis(config.tracker.heartbeat_interval_ms);

        let machine_tracker = config.tracker.machine_tracker_enabled.then(|| {
            let tracker = MachineTracker::new(
                Arc::new(store.clone()),
                Arc::new(LocalSystemProbe::new()),
                Arc::clone(&clock),
            );
            TrackerDriver::with_interval(tracker, Arc::clone(&clock), interval)
        });

        let job_tracker = config.tracker.job_tracker_enabled.then(|| {
            let jobs = Arc::new(JobService::new(
                Arc::new(store.clone()),
                Arc::new(store.clone()),
                Arc::new(store.clone()),
                Arc::new(store.clone()),
                Arc::clone(&clock),
            ));
            let tracker = JobTracker::new(
                Arc::new(store.clone()),
                jobs,
                u32::try_from(config.tracker.batch_size).unwrap_or(u32::MAX),
            );
            TrackerDriver::with_interval(tracker, Arc::clone(&clock), interval)
        });

        Ok(Self {
            store,
            machine_tracker,
            job_tracker,
        })
    }

    pub async fn start(&self) -> Result<()> {
        self.store.health_check().await?;
        if let Some(driver) = &self.machine_tracker {
            driver.start().await;
        }
        if let Some(driver) = &self.job_tracker {
            driver.start().await;
        }
        info!(
            machine_tracker = self.machine_tracker.is_some(),
            job_tracker = self.job_tracker.is_some(),
            "应用已启动"
        );
        Ok(())
    }

    /// 停止所有追踪器并关闭连接池
    pub async fn shutdown(&self) {
        if let Some(driver) = &self.machine_tracker {
            driver.cancel_and_await().await;
        }
        if let Some(driver) = &self.job_tracker {
            driver.cancel_and_await().await;
        }
        self.store.close().await;
        info!("应用已关闭");
    }
}
