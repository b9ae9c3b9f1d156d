//! # 生命周期追踪器
//!
//! 后台常驻的监控组件（机器心跳、作业生成等）都实现 [`Tracker`]，
//! 由统一的 [`TrackerDriver`] 驱动时钟轮询：
//!
//! ```text
//! on_started → loop {
//!     日期变化 → on_date_change
//!     小时变化 → on_hour_change
//!     on_heartbeat
//!     sleep(interval)
//! } → on_destroyed
//! ```
//!
//! 钩子返回的错误只记录日志，不会中断轮询；返回 `SchedulerError::Cancelled` 时轮询结束。

pub mod job;
pub mod machine;

pub use job::JobTracker;
pub use machine::MachineTracker;

use std::future::Future;
use std::ops::ControlFlow;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Timelike;
use futures::FutureExt;
use orchestra_core::{Clock, SchedulerError, SchedulerResult};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(500);

/// 追踪器的生命周期钩子，未实现的钩子什么都不做
#[async_trait]
pub trait Tracker: Send + Sync + 'static {
    /// 用于日志的名称
    fn name(&self) -> &str;

    async fn on_started(&self) -> SchedulerResult<()> {
        Ok(())
    }

    async fn on_heartbeat(&self) -> SchedulerResult<()> {
        Ok(())
    }

    async fn on_hour_change(&self) -> SchedulerResult<()> {
        Ok(())
    }

    async fn on_date_change(&self) -> SchedulerResult<()> {
        Ok(())
    }

    async fn on_destroyed(&self) -> SchedulerResult<()> {
        Ok(())
    }
}

/// 驱动一个追踪器的后台轮询任务
///
/// 每个 driver 只能启动一次。
pub struct TrackerDriver<T: Tracker> {
    tracker: Arc<T>,
    clock: Arc<dyn Clock>,
    interval: Duration,
    started: AtomicBool,
    cancel_tx: watch::Sender<bool>,
    done_tx: Arc<watch::Sender<bool>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl<T: Tracker> TrackerDriver<T> {
    pub fn new(tracker: T, clock: Arc<dyn Clock>) -> Self {
        Self::with_interval(tracker, clock, DEFAULT_HEARTBEAT_INTERVAL)
    }

    pub fn with_interval(tracker: T, clock: Arc<dyn Clock>, interval: Duration) -> Self {
        let (cancel_tx, _) = watch::channel(false);
        let (done_tx, _) = watch::channel(false);
        Self {
            tracker: Arc::new(tracker),
            clock,
            interval,
            started: AtomicBool::new(false),
            cancel_tx,
            done_tx: Arc::new(done_tx),
            handle: Mutex::new(None),
        }
    }

    pub fn tracker(&self) -> &Arc<T> {
        &self.tracker
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// 启动后台轮询，重复启动只记录错误
    pub async fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            error!(tracker = self.tracker.name(), "追踪器已经启动过，忽略重复启动");
            return;
        }

        let tracker = Arc::clone(&self.tracker);
        let clock = Arc::clone(&self.clock);
        let interval = self.interval;
        let mut cancel_rx = self.cancel_tx.subscribe();
        let done_tx = Arc::clone(&self.done_tx);

        let handle = tokio::spawn(async move {
            info!(tracker = tracker.name(), "追踪器启动");
            let outcome = AssertUnwindSafe(run_loop(
                tracker.as_ref(),
                clock.as_ref(),
                interval,
                &mut cancel_rx,
            ))
            .catch_unwind()
            .await;

            // 钩子 panic 时也要执行清理
            let _ = check(tracker.name(), "on_destroyed", tracker.on_destroyed().await);
            info!(tracker = tracker.name(), "追踪器已停止");
            done_tx.send_replace(true);

            if let Err(panic) = outcome {
                std::panic::resume_unwind(panic);
            }
        });

        *self.handle.lock().await = Some(handle);
    }

    /// 通知后台任务在本轮结束后退出
    pub fn cancel(&self) {
        self.cancel_tx.send_replace(true);
    }

    /// 等待后台任务退出且 `on_destroyed` 执行完毕
    ///
    /// 钩子中的 panic 会在这里重新抛出。
    pub async fn join(&self) {
        if !self.is_started() {
            error!(tracker = self.tracker.name(), "追踪器尚未启动，无需等待");
            return;
        }

        let handle = self.handle.lock().await.take();
        match handle {
            Some(handle) => {
                if let Err(err) = handle.await {
                    if err.is_panic() {
                        std::panic::resume_unwind(err.into_panic());
                    }
                    error!(tracker = self.tracker.name(), error = %err, "追踪器任务异常结束");
                }
            }
            None => {
                let mut done_rx = self.done_tx.subscribe();
                let _ = done_rx.wait_for(|done| *done).await;
            }
        }
    }

    pub async fn cancel_and_await(&self) {
        self.cancel();
        self.join().await;
    }
}

fn check(name: &str, hook: &'static str, result: SchedulerResult<()>) -> ControlFlow<()> {
    match result {
        Ok(()) => ControlFlow::Continue(()),
        Err(SchedulerError::Cancelled) => {
            info!(tracker = name, hook, "钩子请求停止追踪器");
            ControlFlow::Break(())
        }
        Err(e) => {
            error!(tracker = name, hook, error = %e, "追踪器钩子执行失败");
            ControlFlow::Continue(())
        }
    }
}

async fn run_loop<T: Tracker>(
    tracker: &T,
    clock: &dyn Clock,
    interval: Duration,
    cancel_rx: &mut watch::Receiver<bool>,
) {
    let name = tracker.name();
    if check(name, "on_started", tracker.on_started().await).is_break() {
        return;
    }

    let mut snapshot = clock.now();
    while !*cancel_rx.borrow() {
        let now = clock.now();

        if now.date() > snapshot.date() {
            debug!(tracker = name, from = %snapshot.date(), to = %now.date(), "日期变化");
            if check(name, "on_date_change", tracker.on_date_change().await).is_break() {
                return;
            }
        }
        if now.hour() != snapshot.hour() {
            debug!(tracker = name, from = snapshot.hour(), to = now.hour(), "小时变化");
            if check(name, "on_hour_change", tracker.on_hour_change().await).is_break() {
                return;
            }
        }
        if check(name, "on_heartbeat", tracker.on_heartbeat().await).is_break() {
            return;
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            changed = cancel_rx.changed() => {
                if changed.is_err() {
                    // driver 已被丢弃
                    return;
                }
            }
        }
        snapshot = now;
    }
}

/// 分批处理
///
/// `body(page, page_size)` 处理第 page 页（从 1 开始）并返回 (本页处理数量, 总数)，
/// 直到累计处理数量达到总数。某一页没有处理任何数据时提前结束。
pub async fn batch_execute<F, Fut>(page_size: u32, mut body: F) -> SchedulerResult<()>
where
    F: FnMut(u32, u32) -> Fut,
    Fut: Future<Output = SchedulerResult<(usize, i64)>>,
{
    let mut page = 1u32;
    loop {
        let (processed, total) = body(page, page_size).await?;
        let handled = (page as i64 - 1) * page_size as i64 + processed as i64;
        if handled >= total {
            return Ok(());
        }
        if processed == 0 {
            warn!(page, page_size, total, "分批处理没有进展，提前结束");
            return Ok(());
        }
        page += 1;
    }
}
