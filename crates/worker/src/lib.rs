pub mod runner;
pub mod system_probe;
pub mod tracker;

pub use runner::{RunnerStatus, ShellRunner};
pub use system_probe::{FixedSystemProbe, LocalSystemProbe, SystemProbe};
pub use tracker::{batch_execute, JobTracker, MachineTracker, Tracker, TrackerDriver};
