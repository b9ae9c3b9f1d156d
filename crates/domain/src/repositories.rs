//! 领域仓储抽象
//!
//! 定义数据访问的抽象接口，遵循依赖倒置原则。
//! 除非特别说明，查询只返回未被软删除的记录。

use async_trait::async_trait;
use chrono::NaiveDateTime;
use orchestra_core::{Instance, Job, JobFilter, Machine, SchedulerResult, Task};

/// 任务仓储抽象，调度核心只读，`insert` 用于初始化与测试数据
#[async_trait]
pub trait TaskRepository: Send + Sync {
    async fn find_by_id(&self, id: i64) -> SchedulerResult<Option<Task>>;
    /// 按 id 升序分页查询，返回 (当前页, 总数)
    async fn listing(
        &self,
        page: u32,
        page_size: u32,
        valid_only: bool,
    ) -> SchedulerResult<(Vec<Task>, i64)>;
    async fn insert(&self, task: &Task) -> SchedulerResult<Task>;
}

/// 作业仓储抽象
#[async_trait]
pub trait JobRepository: Send + Sync {
    async fn find_by_id(&self, id: i64) -> SchedulerResult<Option<Job>>;
    /// 按创建时间倒序查询，返回 (当前页, 符合条件的总数)
    async fn listing(&self, filter: &JobFilter) -> SchedulerResult<(Vec<Job>, i64)>;
    async fn insert(&self, job: &Job) -> SchedulerResult<Job>;
    /// 按 id 覆盖作业的可变字段
    async fn update(&self, job: &Job) -> SchedulerResult<()>;
}

/// 机器仓储抽象，`ip` 在未删除的机器中唯一
#[async_trait]
pub trait MachineRepository: Send + Sync {
    async fn find_by_id(&self, id: i64) -> SchedulerResult<Option<Machine>>;
    async fn find_by_ip(&self, ip: &str) -> SchedulerResult<Option<Machine>>;
    async fn find_by_hostname(&self, hostname: &str) -> SchedulerResult<Option<Machine>>;
    /// 按 id 升序分页查询，`pattern` 对 hostname 做模糊匹配
    async fn listing(
        &self,
        page: u32,
        page_size: u32,
        pattern: Option<&str>,
    ) -> SchedulerResult<(Vec<Machine>, i64)>;
    /// ip 已被未删除的机器占用时返回 `Duplicate`
    async fn insert(&self, machine: &Machine) -> SchedulerResult<Machine>;
    /// 按 id 覆盖机器的可变字段，ip 冲突时返回 `Duplicate`
    async fn update(&self, machine: &Machine) -> SchedulerResult<()>;
}

/// 执行实例仓储抽象
#[async_trait]
pub trait InstanceRepository: Send + Sync {
    async fn insert(&self, instance: &Instance) -> SchedulerResult<Instance>;
    async fn listing_by_job_id(&self, job_id: i64) -> SchedulerResult<Vec<Instance>>;
    /// 软删除作业下的所有实例，返回删除的数量
    async fn remove_by_job_id(&self, job_id: i64, now: NaiveDateTime) -> SchedulerResult<u64>;
}

/// 事务内可见的仓储
///
/// 事务内的读写彼此可见，提交前对外不可见。未提交即被丢弃时回滚。
#[async_trait]
pub trait Transaction: Send + Sync {
    fn jobs(&self) -> &dyn JobRepository;
    fn instances(&self) -> &dyn InstanceRepository;
    async fn commit(self: Box<Self>) -> SchedulerResult<()>;
}

/// 事务管理器
#[async_trait]
pub trait TransactionManager: Send + Sync {
    async fn begin(&self) -> SchedulerResult<Box<dyn Transaction>>;
}
