use crate::error::ForgeError;
use serde::{Deserialize, Serialize};

/// A physical disk slot as reported by the host at enumeration time.
///
/// Values are snapshots with no identity beyond the enumeration pass that
/// produced them; consumers must re-resolve after any topology change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhysicalDevice {
    /// Stable numeric slot (`\\.\PHYSICALDRIVE3` -> 3, `/dev/sdc` -> 2).
    pub index: u32,
    pub model: String,
    pub size_bytes: u64,
    pub is_removable: bool,
}

/// A mounted, lettered filesystem instance. Ephemeral, like [`PhysicalDevice`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Volume {
    /// Drive letter where the host assigns one.
    pub letter: Option<char>,
    pub filesystem: String,
    pub capacity_bytes: u64,
    pub free_bytes: u64,
    pub is_removable: bool,
}

/// One partition in a queried disk layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionRecord {
    pub number: u32,
    pub offset_bytes: u64,
    pub size_bytes: u64,
    /// Host-reported partition kind ("Basic", "IFS", GPT type name, ...).
    pub kind: Option<String>,
    pub letter: Option<char>,
}

/// Point-in-time partition layout of one disk, as far as the host reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskLayout {
    pub disk: u32,
    pub table: Option<crate::plan::TableFormat>,
    pub partitions: Vec<PartitionRecord>,
}

/// Snapshot queries against the host's device tables. Implementations are
/// pure functions of host state and keep no state of their own.
#[async_trait::async_trait]
pub trait DeviceCatalog: Send + Sync {
    /// Lists ready fixed and removable volumes. Never fails: enumeration
    /// problems are logged and yield an empty list.
    async fn list_volumes(&self) -> Vec<Volume>;

    /// Lists physical drives. With `removable_first` set, removable devices
    /// sort strictly before fixed ones; within each group ascending by index.
    /// Consumers rely on that order for default selection, so it is a
    /// contract, not a convenience.
    async fn list_physical_drives(
        &self,
        removable_first: bool,
    ) -> Result<Vec<PhysicalDevice>, ForgeError>;
}

/// Reads the current partition layout of a disk, for rollback snapshots.
#[async_trait::async_trait]
pub trait LayoutProbe: Send + Sync {
    async fn partition_layout(&self, disk: u32) -> Result<DiskLayout, ForgeError>;
}

/// Sorts drives for presentation: removable first (when requested), then
/// ascending by index. Kept as a free function so the order can be tested
/// without a live host.
pub fn sort_drives(drives: &mut [PhysicalDevice], removable_first: bool) {
    if removable_first {
        drives.sort_by(|a, b| {
            b.is_removable
                .cmp(&a.is_removable)
                .then(a.index.cmp(&b.index))
        });
    } else {
        drives.sort_by_key(|d| d.index);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drive(index: u32, removable: bool) -> PhysicalDevice {
        PhysicalDevice {
            index,
            model: format!("Drive {index}"),
            size_bytes: 64 * 1_073_741_824,
            is_removable: removable,
        }
    }

    #[test]
    fn removable_drives_sort_first() {
        let mut drives = vec![drive(0, false), drive(3, true), drive(1, true), drive(2, false)];
        sort_drives(&mut drives, true);
        let order: Vec<(u32, bool)> = drives.iter().map(|d| (d.index, d.is_removable)).collect();
        assert_eq!(order, vec![(1, true), (3, true), (0, false), (2, false)]);
    }

    #[test]
    fn plain_sort_is_by_index() {
        let mut drives = vec![drive(2, true), drive(0, false), drive(1, true)];
        sort_drives(&mut drives, false);
        let order: Vec<u32> = drives.iter().map(|d| d.index).collect();
        assert_eq!(order, vec![0, 1, 2]);
    }
}
