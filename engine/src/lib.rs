pub mod executor;
pub mod format;
pub mod locks;
pub mod planner;
pub mod report;
pub mod sanitize;
pub mod script;
pub mod snapshot;

pub use executor::{ExecutorConfig, OperationExecutor};
pub use format::VolumeFormatter;
pub use locks::DeviceLocks;
pub use planner::{OperationPlanner, PlanIntent};
pub use sanitize::{SanitizeConfig, SanitizeEngine};
pub use snapshot::{RollbackSnapshot, SnapshotStore};
