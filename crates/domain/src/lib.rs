pub mod repositories;
pub mod services;

pub use orchestra_core::{SchedulerError, SchedulerResult};
pub use repositories::*;
pub use services::*;
