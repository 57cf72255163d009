use crate::safety::PrivilegeOutcome;
use thiserror::Error;

/// Error taxonomy for the whole workspace.
///
/// Validation and privilege problems are caught before any external process
/// spawns; external-process failures carry the tool's own output verbatim;
/// cancellation is its own variant and is never reported as a failure.
#[derive(Debug, Error)]
pub enum ForgeError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("privilege check did not grant access: {0}")]
    Privilege(PrivilegeOutcome),

    #[error("{tool} exited with an error: {detail}")]
    External { tool: String, detail: String },

    #[error("operation canceled")]
    Canceled,

    #[error("disk {0} not found")]
    DeviceNotFound(u32),

    #[error("another destructive operation is already running on disk {0}")]
    DeviceBusy(u32),

    #[error("external tool not found: {0}")]
    ToolMissing(String),

    #[error("not supported: {0}")]
    Unsupported(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl ForgeError {
    /// True for the cancellation outcome, which callers must keep apart from
    /// real failures when logging and reporting.
    pub fn is_canceled(&self) -> bool {
        matches!(self, ForgeError::Canceled)
    }

    pub fn external(tool: impl Into<String>, detail: impl Into<String>) -> Self {
        ForgeError::External {
            tool: tool.into(),
            detail: detail.into(),
        }
    }
}
