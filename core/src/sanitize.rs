use crate::error::ForgeError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// The three standardized erase strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SanitizeMode {
    /// NIST SP 800-88 clear equivalent: full overwrite via the disk utility.
    Nist,
    /// NVMe-native sanitize command.
    Nvme,
    /// ATA security erase.
    Ata,
}

impl SanitizeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SanitizeMode::Nist => "nist-clear",
            SanitizeMode::Nvme => "nvme-sanitize",
            SanitizeMode::Ata => "ata-secure-erase",
        }
    }
}

impl std::fmt::Display for SanitizeMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of the verification stage: advisory evidence that verification
/// ran, not a proof every sector was wiped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyOutcome {
    pub ok: bool,
    pub hash: String,
    pub details: String,
}

/// Append-only audit record, one per sanitize operation. Never mutated
/// after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SanitizeReport {
    pub timestamp: DateTime<Utc>,
    pub machine: String,
    pub user: String,
    pub mode: SanitizeMode,
    pub verification_hash: String,
    pub verify_ok: bool,
    pub details: String,
}

/// Where the durable report artifacts landed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportPaths {
    pub pdf: PathBuf,
    pub csv: PathBuf,
}

/// Best-effort raw read of a handful of sectors from a disk, feeding the
/// verification details. Hosts that cannot open the device raw return an
/// error and verification proceeds without a sample.
#[async_trait::async_trait]
pub trait SectorSampler: Send + Sync {
    async fn sample(&self, disk: u32) -> Result<Vec<u8>, ForgeError>;
}
