//! 内存存储
//!
//! 所有仓储共享同一份状态，用于测试与嵌入式场景。
//! 事务在整个生命周期内持有状态锁，修改写在暂存副本上，提交时整体替换。

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard as StdMutexGuard};

use async_trait::async_trait;
use chrono::NaiveDateTime;
use orchestra_core::{
    Entity, Instance, Job, JobFilter, Machine, SchedulerError, SchedulerResult, Task,
};
use orchestra_domain::repositories::{
    InstanceRepository, JobRepository, MachineRepository, TaskRepository, Transaction,
    TransactionManager,
};
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    tasks: BTreeMap<i64, Task>,
    jobs: BTreeMap<i64, Job>,
    machines: BTreeMap<i64, Machine>,
    instances: BTreeMap<i64, Instance>,
}

fn next_id<T>(map: &BTreeMap<i64, T>) -> i64 {
    map.keys().next_back().map_or(1, |id| id + 1)
}

fn paginate<T>(items: Vec<T>, page: u32, page_size: u32) -> Vec<T> {
    let offset = (page.max(1) as usize - 1) * page_size as usize;
    items
        .into_iter()
        .skip(offset)
        .take(page_size as usize)
        .collect()
}

impl MemoryState {
    fn find_task(&self, id: i64) -> Option<Task> {
        self.tasks.get(&id).filter(|task| !task.is_remove).cloned()
    }

    fn list_tasks(&self, page: u32, page_size: u32, valid_only: bool) -> (Vec<Task>, i64) {
        let tasks: Vec<Task> = self
            .tasks
            .values()
            .filter(|task| !task.is_remove && (!valid_only || task.is_valid))
            .cloned()
            .collect();
        let total = tasks.len() as i64;
        (paginate(tasks, page, page_size), total)
    }

    fn insert_task(&mut self, task: &Task) -> Task {
        let mut task = task.clone();
        task.id = next_id(&self.tasks);
        self.tasks.insert(task.id, task.clone());
        task
    }

    fn find_job(&self, id: i64) -> Option<Job> {
        self.jobs.get(&id).filter(|job| !job.is_remove).cloned()
    }

    fn list_jobs(&self, filter: &JobFilter) -> (Vec<Job>, i64) {
        let mut jobs: Vec<Job> = self
            .jobs
            .values()
            .filter(|job| filter.matches(job))
            .cloned()
            .collect();
        jobs.sort_by(|a, b| {
            b.create_time
                .cmp(&a.create_time)
                .then_with(|| b.id.cmp(&a.id))
        });
        let total = jobs.len() as i64;
        let jobs = match filter.page {
            Some(page) => paginate(jobs, page.page_id, page.page_size),
            None => jobs,
        };
        (jobs, total)
    }

    fn insert_job(&mut self, job: &Job) -> Job {
        let mut job = job.clone();
        job.id = next_id(&self.jobs);
        self.jobs.insert(job.id, job.clone());
        job
    }

    fn update_job(&mut self, job: &Job) -> SchedulerResult<()> {
        match self.jobs.get_mut(&job.id) {
            Some(stored) => {
                *stored = job.clone();
                Ok(())
            }
            None => Err(SchedulerError::not_found(Entity::Job, job.id)),
        }
    }

    fn find_machine_by<P: Fn(&Machine) -> bool>(&self, predicate: P) -> Option<Machine> {
        self.machines
            .values()
            .find(|machine| !machine.is_remove && predicate(machine))
            .cloned()
    }

    fn list_machines(
        &self,
        page: u32,
        page_size: u32,
        pattern: Option<&str>,
    ) -> (Vec<Machine>, i64) {
        let machines: Vec<Machine> = self
            .machines
            .values()
            .filter(|machine| {
                !machine.is_remove && pattern.map_or(true, |p| machine.hostname.contains(p))
            })
            .cloned()
            .collect();
        let total = machines.len() as i64;
        (paginate(machines, page, page_size), total)
    }

    fn ip_taken(&self, ip: &str, except: i64) -> bool {
        self.find_machine_by(|machine| machine.ip == ip && machine.id != except)
            .is_some()
    }

    fn insert_machine(&mut self, machine: &Machine) -> SchedulerResult<Machine> {
        if self.ip_taken(&machine.ip, 0) {
            return Err(SchedulerError::duplicate("ip", machine.ip.clone()));
        }
        let mut machine = machine.clone();
        machine.id = next_id(&self.machines);
        self.machines.insert(machine.id, machine.clone());
        Ok(machine)
    }

    fn update_machine(&mut self, machine: &Machine) -> SchedulerResult<()> {
        if !machine.is_remove && self.ip_taken(&machine.ip, machine.id) {
            return Err(SchedulerError::duplicate("ip", machine.ip.clone()));
        }
        match self.machines.get_mut(&machine.id) {
            Some(stored) => {
                *stored = machine.clone();
                Ok(())
            }
            None => Err(SchedulerError::not_found(Entity::Machine, machine.id)),
        }
    }

    fn insert_instance(&mut self, instance: &Instance) -> Instance {
        let mut instance = instance.clone();
        instance.id = next_id(&self.instances);
        self.instances.insert(instance.id, instance.clone());
        instance
    }

    fn list_instances(&self, job_id: i64) -> Vec<Instance> {
        self.instances
            .values()
            .filter(|instance| instance.job_id == job_id && !instance.is_remove)
            .cloned()
            .collect()
    }

    fn remove_instances(&mut self, job_id: i64, now: NaiveDateTime) -> u64 {
        let mut removed = 0;
        for instance in self.instances.values_mut() {
            if instance.job_id == job_id && !instance.is_remove {
                instance.is_remove = true;
                instance.update_time = now;
                removed += 1;
            }
        }
        removed
    }
}

/// 内存存储，克隆后共享同一份数据
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskRepository for MemoryStore {
    async fn find_by_id(&self, id: i64) -> SchedulerResult<Option<Task>> {
        Ok(self.state.lock().await.find_task(id))
    }

    async fn listing(
        &self,
        page: u32,
        page_size: u32,
        valid_only: bool,
    ) -> SchedulerResult<(Vec<Task>, i64)> {
        Ok(self.state.lock().await.list_tasks(page, page_size, valid_only))
    }

    async fn insert(&self, task: &Task) -> SchedulerResult<Task> {
        Ok(self.state.lock().await.insert_task(task))
    }
}

#[async_trait]
impl JobRepository for MemoryStore {
    async fn find_by_id(&self, id: i64) -> SchedulerResult<Option<Job>> {
        Ok(self.state.lock().await.find_job(id))
    }

    async fn listing(&self, filter: &JobFilter) -> SchedulerResult<(Vec<Job>, i64)> {
        Ok(self.state.lock().await.list_jobs(filter))
    }

    async fn insert(&self, job: &Job) -> SchedulerResult<Job> {
        Ok(self.state.lock().await.insert_job(job))
    }

    async fn update(&self, job: &Job) -> SchedulerResult<()> {
        self.state.lock().await.update_job(job)
    }
}

#[async_trait]
impl MachineRepository for MemoryStore {
    async fn find_by_id(&self, id: i64) -> SchedulerResult<Option<Machine>> {
        Ok(self
            .state
            .lock()
            .await
            .find_machine_by(|machine| machine.id == id))
    }

    async fn find_by_ip(&self, ip: &str) -> SchedulerResult<Option<Machine>> {
        Ok(self
            .state
            .lock()
            .await
            .find_machine_by(|machine| machine.ip == ip))
    }

    async fn find_by_hostname(&self, hostname: &str) -> SchedulerResult<Option<Machine>> {
        Ok(self
            .state
            .lock()
            .await
            .find_machine_by(|machine| machine.hostname == hostname))
    }

    async fn listing(
        &self,
        page: u32,
        page_size: u32,
        pattern: Option<&str>,
    ) -> SchedulerResult<(Vec<Machine>, i64)> {
        Ok(self.state.lock().await.list_machines(page, page_size, pattern))
    }

    async fn insert(&self, machine: &Machine) -> SchedulerResult<Machine> {
        self.state.lock().await.insert_machine(machine)
    }

    async fn update(&self, machine: &Machine) -> SchedulerResult<()> {
        self.state.lock().await.update_machine(machine)
    }
}

#[async_trait]
impl InstanceRepository for MemoryStore {
    async fn insert(&self, instance: &Instance) -> SchedulerResult<Instance> {
        Ok(self.state.lock().await.insert_instance(instance))
    }

    async fn listing_by_job_id(&self, job_id: i64) -> SchedulerResult<Vec<Instance>> {
        Ok(self.state.lock().await.list_instances(job_id))
    }

    async fn remove_by_job_id(&self, job_id: i64, now: NaiveDateTime) -> SchedulerResult<u64> {
        Ok(self.state.lock().await.remove_instances(job_id, now))
    }
}

#[async_trait]
impl TransactionManager for MemoryStore {
    async fn begin(&self) -> SchedulerResult<Box<dyn Transaction>> {
        let guard = self.state.clone().lock_owned().await;
        let staged = guard.clone();
        Ok(Box::new(MemoryTransaction {
            guard,
            staged: StdMutex::new(staged),
        }))
    }
}

/// 内存事务，提交前其他读写者在状态锁上等待
pub struct MemoryTransaction {
    guard: OwnedMutexGuard<MemoryState>,
    staged: StdMutex<MemoryState>,
}

impl MemoryTransaction {
    fn staged(&self) -> StdMutexGuard<'_, MemoryState> {
        self.staged
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl Transaction for MemoryTransaction {
    fn jobs(&self) -> &dyn JobRepository {
        self
    }

    fn instances(&self) -> &dyn InstanceRepository {
        self
    }

    async fn commit(self: Box<Self>) -> SchedulerResult<()> {
        let MemoryTransaction { mut guard, staged } = *self;
        *guard = staged
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(())
    }
}

#[async_trait]
impl JobRepository for MemoryTransaction {
    async fn find_by_id(&self, id: i64) -> SchedulerResult<Option<Job>> {
        Ok(self.staged().find_job(id))
    }

    async fn listing(&self, filter: &JobFilter) -> SchedulerResult<(Vec<Job>, i64)> {
        Ok(self.staged().list_jobs(filter))
    }

    async fn insert(&self, job: &Job) -> SchedulerResult<Job> {
        Ok(self.staged().insert_job(job))
    }

    async fn update(&self, job: &Job) -> SchedulerResult<()> {
        self.staged().update_job(job)
    }
}

#[async_trait]
impl InstanceRepository for MemoryTransaction {
    async fn insert(&self, instance: &Instance) -> SchedulerResult<Instance> {
        Ok(self.staged().insert_instance(instance))
    }

    async fn listing_by_job_id(&self, job_id: i64) -> SchedulerResult<Vec<Instance>> {
        Ok(self.staged().list_instances(job_id))
    }

    async fn remove_by_job_id(&self, job_id: i64, now: NaiveDateTime) -> SchedulerResult<u64> {
        Ok(self.staged().remove_instances(job_id, now))
    }
}
