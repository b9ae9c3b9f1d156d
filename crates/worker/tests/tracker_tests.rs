use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime};
use orchestra_core::{
    JobFilter, MockClock, ScheduleFormat, SchedulePeriod, SystemInfo, SystemLoad, Task,
};
use orchestra_domain::repositories::*;
use orchestra_domain::JobService;
use orchestra_infrastructure::MemoryStore;
use orchestra_worker::{FixedSystemProbe, JobTracker, MachineTracker, TrackerDriver};

fn at(d: u32, h: u32, m: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 5, d)
        .unwrap()
        .and_hms_opt(h, m, 0)
        .unwrap()
}

fn info(ip: &str, hostname: &str) -> SystemInfo {
    SystemInfo {
        ip: ip.to_string(),
        mac: "02:42:ac:11:00:02".to_string(),
        hostname: hostname.to_string(),
    }
}

fn load(cpu: i32, mem: i32, disk: i32) -> SystemLoad {
    SystemLoad {
        cpu_load: cpu,
        mem_load: mem,
        disk_usage: disk,
    }
}

/// 轮询直到条件成立，最多约 2 秒
async fn eventually<F, Fut>(mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..200 {
        if condition().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

#[tokio::test]
async fn test_machine_tracker_registers_then_updates() -> anyhow::Result<()> {
    let store = MemoryStore::new();
    let clock = Arc::new(MockClock::new(at(16, 9, 0)));
    let probe = Arc::new(FixedSystemProbe::new(
        info("10.0.0.8", "node-1"),
        load(10, 20, 30),
    ));
    let heartbeats = Arc::new(AtomicUsize::new(0));

    let counter = heartbeats.clone();
    let tracker = MachineTracker::new(Arc::new(store.clone()), probe.clone(), clock.clone())
        .with_callback(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
    let driver = TrackerDriver::with_interval(tracker, clock.clone(), Duration::from_millis(10));
    driver.start().await;

    let store_ref = &store;
    let registered = eventually(|| async move {
        store_ref.find_by_ip("10.0.0.8").await.ok().flatten().is_some()
    })
    .await;
    assert!(registered);

    let machine = store.find_by_ip("10.0.0.8").await?.unwrap();
    assert_eq!(machine.hostname, "node-1");
    assert_eq!(machine.cpu_load, 10);

    probe.set(info("10.0.0.8", "node-1-renamed"), load(70, 80, 90));
    let converged = eventually(|| async move {
        match store_ref.find_by_ip("10.0.0.8").await {
            Ok(Some(machine)) => machine.hostname == "node-1-renamed" && machine.cpu_load == 70,
            _ => false,
        }
    })
    .await;
    assert!(converged);

    driver.cancel_and_await().await;

    let (machines, total) = MachineRepository::listing(&store, 1, 10, None).await?;
    assert_eq!(total, 1);
    assert_eq!(machines[0].id, machine.id);
    assert_eq!(machines[0].mem_load, 80);
    assert_eq!(machines[0].disk_usage, 90);
    assert!(heartbeats.load(Ordering::SeqCst) >= 2);
    Ok(())
}

fn job_service(store: &MemoryStore, clock: Arc<MockClock>) -> Arc<JobService> {
    Arc::new(JobService::new(
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        clock,
    ))
}

#[tokio::test]
async fn test_generate_today_jobs_across_batches() -> anyhow::Result<()> {
    let store = MemoryStore::new();
    let clock = Arc::new(MockClock::new(at(16, 0, 1)));
    for i in 0..5 {
        let task = Task::new(
            format!("daily-{i}"),
            SchedulePeriod::Day,
            ScheduleFormat::daily(3, 0),
        );
        TaskRepository::insert(&store, &task).await?;
    }
    let hourly = Task::new("hourly", SchedulePeriod::Hour, ScheduleFormat::hourly(5));
    TaskRepository::insert(&store, &hourly).await?;
    let disabled = Task::new("disabled", SchedulePeriod::Day, ScheduleFormat::daily(3, 0)).invalid();
    TaskRepository::insert(&store, &disabled).await?;

    let tracker = JobTracker::new(Arc::new(store.clone()), job_service(&store, clock), 2);

    assert_eq!(tracker.generate_today_jobs().await?, 5 + 24);
    // 重复生成不会产生新作业
    assert_eq!(tracker.generate_today_jobs().await?, 5 + 24);

    let (_, total) = JobRepository::listing(&store, &JobFilter::new()).await?;
    assert_eq!(total, 29);
    Ok(())
}

#[tokio::test]
async fn test_job_tracker_generates_on_date_change() -> anyhow::Result<()> {
    let store = MemoryStore::new();
    let clock = Arc::new(MockClock::new(at(16, 23, 59)));
    let task = Task::new("report", SchedulePeriod::Day, ScheduleFormat::daily(2, 30));
    let task = TaskRepository::insert(&store, &task).await?;

    let tracker = JobTracker::new(
        Arc::new(store.clone()),
        job_service(&store, clock.clone()),
        10,
    );
    let driver = TrackerDriver::with_interval(tracker, clock.clone(), Duration::from_millis(10));
    driver.start().await;

    let filter = JobFilter::new().task_id(task.id);
    let (store_ref, filter_ref) = (&store, &filter);
    let generated = eventually(|| async move {
        matches!(JobRepository::listing(store_ref, filter_ref).await, Ok((_, 1)))
    })
    .await;
    assert!(generated);

    clock.set(at(17, 0, 0));
    let next_day = eventually(|| async move {
        matches!(JobRepository::listing(store_ref, filter_ref).await, Ok((_, 2)))
    })
    .await;
    assert!(next_day);

    driver.cancel_and_await().await;

    let day = NaiveDate::from_ymd_opt(2024, 5, 17);
    let (jobs, total) =
        JobRepository::listing(&store, &JobFilter::new().task_id(task.id).between(day, day))
            .await?;
    assert_eq!(total, 1);
    assert_eq!((jobs[0].hour, jobs[0].minute), (2, 30));
    Ok(())
}
