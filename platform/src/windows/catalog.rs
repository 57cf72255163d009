use crate::parse;
use diskforge_core::{
    DeviceCatalog, DiskLayout, ForgeError, LayoutProbe, PartitionRecord, PhysicalDevice,
    TableFormat, Volume,
};
use serde::Deserialize;
use std::os::windows::process::CommandExt;
use tokio::process::Command;

const CREATE_NO_WINDOW: u32 = 0x08000000;

#[derive(Debug, Deserialize)]
struct WmiDiskDrive {
    #[serde(rename = "DeviceID")]
    device_id: String,
    #[serde(rename = "Model")]
    model: Option<String>,
    #[serde(rename = "Size")]
    size: Option<u64>,
    #[serde(rename = "MediaType")]
    media_type: Option<String>,
    #[serde(rename = "InterfaceType")]
    interface_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PsVolume {
    #[serde(rename = "DriveLetter")]
    drive_letter: Option<String>,
    #[serde(rename = "FileSystem")]
    file_system: Option<String>,
    #[serde(rename = "Size")]
    size: Option<u64>,
    #[serde(rename = "SizeRemaining")]
    size_remaining: Option<u64>,
    #[serde(rename = "DriveType")]
    drive_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PsPartition {
    #[serde(rename = "PartitionNumber")]
    partition_number: u32,
    #[serde(rename = "Offset")]
    offset: Option<u64>,
    #[serde(rename = "Size")]
    size: Option<u64>,
    #[serde(rename = "Type")]
    partition_type: Option<String>,
    #[serde(rename = "DriveLetter")]
    drive_letter: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PsDiskFlags {
    #[serde(rename = "PartitionStyle")]
    partition_style: Option<String>,
    #[serde(rename = "IsSystem")]
    is_system: Option<bool>,
    #[serde(rename = "IsBoot")]
    is_boot: Option<bool>,
}

/// Runs one PowerShell query and returns its JSON output as a value list.
async fn powershell_json(query: &str) -> Result<Vec<serde_json::Value>, ForgeError> {
    let output = Command::new("powershell")
        .args(["-NoProfile", "-Command", query])
        .creation_flags(CREATE_NO_WINDOW)
        .output()
        .await?;
    if !output.status.success() {
        return Err(ForgeError::external(
            "powershell",
            String::from_utf8_lossy(&output.stderr).into_owned(),
        ));
    }
    let text = String::from_utf8_lossy(&output.stdout);
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    let value: serde_json::Value = serde_json::from_str(trimmed)?;
    Ok(parse::json_objects(value))
}

/// Snapshot queries against the Windows device tables, via PowerShell and
/// WMI. Keeps no state of its own.
pub struct WindowsCatalog;

#[async_trait::async_trait]
impl DeviceCatalog for WindowsCatalog {
    async fn list_volumes(&self) -> Vec<Volume> {
        let query = "Get-Volume | Where-Object DriveLetter | \
                     Select-Object DriveLetter,FileSystem,Size,SizeRemaining,DriveType | \
                     ConvertTo-Json";
        let values = match powershell_json(query).await {
            Ok(values) => values,
            Err(e) => {
                log::warn!("volume enumeration failed: {}", e);
                return Vec::new();
            }
        };
        values
            .into_iter()
            .filter_map(|v| serde_json::from_value::<PsVolume>(v).ok())
            .filter_map(|v| {
                let letter = v.drive_letter.as_deref().and_then(parse::drive_letter)?;
                Some(Volume {
                    letter: Some(letter),
                    filesystem: v.file_system.unwrap_or_default(),
                    capacity_bytes: v.size.unwrap_or(0),
                    free_bytes: v.size_remaining.unwrap_or(0),
                    is_removable: v
                        .drive_type
                        .as_deref()
                        .is_some_and(|t| t.eq_ignore_ascii_case("Removable")),
                })
            })
            .collect()
    }

    async fn list_physical_drives(
        &self,
        removable_first: bool,
    ) -> Result<Vec<PhysicalDevice>, ForgeError> {
        let query = "Get-WmiObject Win32_DiskDrive | \
                     Select-Object DeviceID,Model,Size,MediaType,InterfaceType | \
                     ConvertTo-Json";
        let values = powershell_json(query).await?;
        let mut drives: Vec<PhysicalDevice> = values
            .into_iter()
            .filter_map(|v| serde_json::from_value::<WmiDiskDrive>(v).ok())
            .filter_map(|d| {
                let index = parse::physicaldrive_index(&d.device_id)?;
                Some(PhysicalDevice {
                    index,
                    model: d.model.unwrap_or_else(|| "Unknown".to_string()),
                    size_bytes: d.size.unwrap_or(0),
                    is_removable: parse::removable_hint(
                        None,
                        d.media_type.as_deref(),
                        d.interface_type.as_deref(),
                    ),
                })
            })
            .collect();
        diskforge_core::device::sort_drives(&mut drives, removable_first);
        Ok(drives)
    }
}

#[async_trait::async_trait]
impl LayoutProbe for WindowsCatalog {
    async fn partition_layout(&self, disk: u32) -> Result<DiskLayout, ForgeError> {
        let flag_query = format!(
            "Get-Disk -Number {disk} | Select-Object PartitionStyle,IsSystem,IsBoot | ConvertTo-Json"
        );
        let flags = powershell_json(&flag_query)
            .await?
            .into_iter()
            .next()
            .ok_or(ForgeError::DeviceNotFound(disk))?;
        let flags: PsDiskFlags = serde_json::from_value(flags)?;
        let table = match flags.partition_style.as_deref() {
            Some("GPT") => Some(TableFormat::Gpt),
            Some("MBR") => Some(TableFormat::Mbr),
            _ => None,
        };

        let part_query = format!(
            "Get-Partition -DiskNumber {disk} | \
             Select-Object PartitionNumber,Offset,Size,Type,DriveLetter | ConvertTo-Json"
        );
        let partitions = powershell_json(&part_query)
            .await?
            .into_iter()
            .filter_map(|v| serde_json::from_value::<PsPartition>(v).ok())
            .map(|p| PartitionRecord {
                number: p.partition_number,
                offset_bytes: p.offset.unwrap_or(0),
                size_bytes: p.size.unwrap_or(0),
                kind: p.partition_type,
                letter: p.drive_letter.as_deref().and_then(parse::drive_letter),
            })
            .collect();
        Ok(DiskLayout {
            disk,
            table,
            partitions,
        })
    }
}

/// Whether the disk hosts the running system or its boot partition.
pub async fn system_flags(disk: u32) -> Result<bool, ForgeError> {
    let query = format!(
        "Get-Disk -Number {disk} | Select-Object PartitionStyle,IsSystem,IsBoot | ConvertTo-Json"
    );
    let value = powershell_json(&query)
        .await?
        .into_iter()
        .next()
        .ok_or(ForgeError::DeviceNotFound(disk))?;
    let flags: PsDiskFlags = serde_json::from_value(value)?;
    Ok(flags.is_system.unwrap_or(false) || flags.is_boot.unwrap_or(false))
}
