use crate::error::ForgeError;
use serde::{Deserialize, Serialize};

/// Result of the privilege check that fronts every destructive operation.
///
/// `Relaunched` means a new elevated process was spawned with the original
/// arguments; the current operation attempt must be abandoned, not retried
/// in-process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrivilegeOutcome {
    Granted,
    Relaunched,
    Denied,
}

impl std::fmt::Display for PrivilegeOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PrivilegeOutcome::Granted => f.write_str("granted"),
            PrivilegeOutcome::Relaunched => f.write_str("relaunched elevated"),
            PrivilegeOutcome::Denied => f.write_str("denied"),
        }
    }
}

/// Gate in front of every destructive operation: system-volume and
/// system-disk checks plus the privilege check. Consulted before any
/// external process is spawned.
#[async_trait::async_trait]
pub trait SafetyGuard: Send + Sync {
    /// True iff `letter` is the root of the OS installation volume.
    fn is_system_volume(&self, letter: char) -> bool;

    /// True iff the disk at `index` hosts the running system or its boot
    /// partition.
    async fn is_system_disk(&self, index: u32) -> Result<bool, ForgeError>;

    /// Checks administrative rights; may attempt a one-shot elevated
    /// relaunch of the whole process. Invoked at most once per operation
    /// attempt.
    async fn ensure_privilege(&self, operation: &str) -> Result<PrivilegeOutcome, ForgeError>;
}
