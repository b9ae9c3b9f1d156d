pub mod clock;
pub mod config;
pub mod datetime;
pub mod errors;
pub mod logging;
pub mod models;

pub use clock::{Clock, MockClock, SystemClock};
pub use config::AppConfig;
pub use errors::*;
pub use logging::init_logging;
pub use models::{
    Instance, Job, JobFilter, JobStatus, Machine, Page, ScheduleDependencyInfo, ScheduleFormat,
    SchedulePeriod, SystemInfo, SystemLoad, Task,
};
