use crate::parse;
use diskforge_core::{
    DeviceCatalog, DiskLayout, ForgeError, LayoutProbe, PartitionRecord, PhysicalDevice, Volume,
};
use std::fs;
use std::path::Path;
use tokio::process::Command;

const SECTOR: u64 = 512;

async fn lsblk(columns: &str) -> Result<String, ForgeError> {
    let output = Command::new("lsblk")
        .args(["-b", "-P", "-o", columns])
        .output()
        .await?;
    if !output.status.success() {
        return Err(ForgeError::external(
            "lsblk",
            String::from_utf8_lossy(&output.stderr).into_owned(),
        ));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn sysfs_removable(name: &str) -> bool {
    fs::read_to_string(format!("/sys/block/{name}/removable"))
        .map(|content| content.trim() == "1")
        .unwrap_or(false)
}

/// Finds the lsblk name for a disk index by scanning /sys/block.
fn disk_name_for_index(disk: u32) -> Option<String> {
    let entries = fs::read_dir("/sys/block").ok()?;
    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().into_owned();
        if parse::linux_disk_index(&name) == Some(disk) {
            return Some(name);
        }
    }
    None
}

/// Snapshot queries against the Linux block layer: `lsblk` plus sysfs.
/// Keeps no state of its own.
pub struct LinuxCatalog;

#[async_trait::async_trait]
impl DeviceCatalog for LinuxCatalog {
    async fn list_volumes(&self) -> Vec<Volume> {
        let text = match lsblk("NAME,PKNAME,TYPE,FSTYPE,MOUNTPOINT,FSSIZE,FSAVAIL").await {
            Ok(text) => text,
            Err(e) => {
                log::warn!("volume enumeration failed: {}", e);
                return Vec::new();
            }
        };
        text.lines()
            .map(parse::lsblk_pairs)
            .filter(|p| {
                p.get("TYPE").map(String::as_str) == Some("part")
                    && p.get("MOUNTPOINT").is_some_and(|m| !m.is_empty())
            })
            .map(|p| {
                let parent = p.get("PKNAME").cloned().unwrap_or_default();
                Volume {
                    // Linux has no drive letters; volumes stay unlettered.
                    letter: None,
                    filesystem: p.get("FSTYPE").cloned().unwrap_or_default(),
                    capacity_bytes: p.get("FSSIZE").and_then(|s| s.parse().ok()).unwrap_or(0),
                    free_bytes: p.get("FSAVAIL").and_then(|s| s.parse().ok()).unwrap_or(0),
                    is_removable: sysfs_removable(&parent),
                }
            })
            .collect()
    }

    async fn list_physical_drives(
        &self,
        removable_first: bool,
    ) -> Result<Vec<PhysicalDevice>, ForgeError> {
        let text = lsblk("NAME,SIZE,MODEL,RM,TYPE").await?;
        let mut drives: Vec<PhysicalDevice> = text
            .lines()
            .map(parse::lsblk_pairs)
            .filter(|p| p.get("TYPE").map(String::as_str) == Some("disk"))
            .filter_map(|p| {
                let name = p.get("NAME")?;
                let index = parse::linux_disk_index(name)?;
                Some(PhysicalDevice {
                    index,
                    model: p
                        .get("MODEL")
                        .filter(|m| !m.is_empty())
                        .cloned()
                        .unwrap_or_else(|| name.clone()),
                    size_bytes: p.get("SIZE").and_then(|s| s.parse().ok()).unwrap_or(0),
                    is_removable: p.get("RM").map(String::as_str) == Some("1")
                        || sysfs_removable(name),
                })
            })
            .collect();
        diskforge_core::device::sort_drives(&mut drives, removable_first);
        Ok(drives)
    }
}

#[async_trait::async_trait]
impl LayoutProbe for LinuxCatalog {
    async fn partition_layout(&self, disk: u32) -> Result<DiskLayout, ForgeError> {
        let name = disk_name_for_index(disk).ok_or(ForgeError::DeviceNotFound(disk))?;
        let base = format!("/sys/block/{name}");
        let mut partitions = Vec::new();
        for entry in fs::read_dir(&base)?.flatten() {
            let part_name = entry.file_name().to_string_lossy().into_owned();
            if !part_name.starts_with(name.as_str()) {
                continue;
            }
            let part_dir = Path::new(&base).join(&part_name);
            let read_u64 = |file: &str| -> u64 {
                fs::read_to_string(part_dir.join(file))
                    .ok()
                    .and_then(|s| s.trim().parse().ok())
                    .unwrap_or(0)
            };
            let number: u32 = part_name
                .trim_start_matches(name.as_str())
                .trim_start_matches('p')
                .parse()
                .unwrap_or(0);
            if number == 0 {
                continue;
            }
            partitions.push(PartitionRecord {
                number,
                offset_bytes: read_u64("start") * SECTOR,
                size_bytes: read_u64("size") * SECTOR,
                kind: None,
                letter: None,
            });
        }
        partitions.sort_by_key(|p| p.number);
        Ok(DiskLayout {
            disk,
            // The block layer does not report the table format here; the
            // snapshot falls back to its guaranteed minimum.
            table: None,
            partitions,
        })
    }
}

/// Whether the disk at `index` backs the root filesystem.
pub fn is_root_disk(disk: u32) -> Result<bool, ForgeError> {
    let Some(name) = disk_name_for_index(disk) else {
        return Err(ForgeError::DeviceNotFound(disk));
    };
    let mounts = fs::read_to_string("/proc/mounts")?;
    for line in mounts.lines() {
        let mut parts = line.split_whitespace();
        let (Some(device), Some(mount)) = (parts.next(), parts.next()) else {
            continue;
        };
        if mount == "/" && device.trim_start_matches("/dev/").starts_with(name.as_str()) {
            return Ok(true);
        }
    }
    Ok(false)
}
