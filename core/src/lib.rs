pub mod device;
pub mod error;
pub mod events;
pub mod plan;
pub mod power;
pub mod process;
pub mod safety;
pub mod sanitize;
pub mod test_utils;

pub use device::{DeviceCatalog, DiskLayout, LayoutProbe, PartitionRecord, PhysicalDevice, Volume};
pub use error::ForgeError;
pub use events::{EventSink, NullSink, ProgressFn, StageEvent, TracingSink};
pub use plan::{DryRunResult, PartitionOp, Plan, PrecheckResult, TableFormat};
pub use power::{PowerProbe, PowerState, SessionProbe};
pub use process::{CommandRunner, RunOutput, ScriptRunner};
pub use safety::{PrivilegeOutcome, SafetyGuard};
pub use sanitize::{ReportPaths, SanitizeMode, SanitizeReport, SectorSampler, VerifyOutcome};
