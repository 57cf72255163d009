//! Pure parsing and classification helpers shared by the per-OS catalogs.
//! Kept free of any host I/O so the enumeration contracts stay testable
//! with fixture data.

use std::collections::HashMap;

/// Extracts the numeric slot from a Windows device id like
/// `\\.\PHYSICALDRIVE3`.
pub fn physicaldrive_index(device_id: &str) -> Option<u32> {
    let upper = device_id.to_uppercase();
    let tail = upper.split("PHYSICALDRIVE").nth(1)?;
    tail.trim().parse().ok()
}

/// Normalizes `"E"`, `"E:"`, or `"E:\"` to the bare letter.
pub fn drive_letter(raw: &str) -> Option<char> {
    let first = raw.trim().chars().next()?;
    first.is_ascii_alphabetic().then(|| first.to_ascii_uppercase())
}

/// Classifies a drive as removable from bus/media/interface hints, the way
/// the Windows device table exposes them.
pub fn removable_hint(
    bus_type: Option<&str>,
    media_type: Option<&str>,
    interface_type: Option<&str>,
) -> bool {
    if let Some(bus) = bus_type {
        match bus.to_uppercase().as_str() {
            "USB" | "SD" | "MMC" => return true,
            _ => {}
        }
    }
    if let Some(interface) = interface_type {
        if interface.to_uppercase() == "USB" {
            return true;
        }
    }
    if let Some(media) = media_type {
        let media = media.to_lowercase();
        if media.contains("removable") || media.contains("external") {
            return true;
        }
    }
    false
}

/// PowerShell's `ConvertTo-Json` emits a bare object for a single result
/// and an array otherwise; normalize to a list either way.
pub fn json_objects(value: serde_json::Value) -> Vec<serde_json::Value> {
    match value {
        serde_json::Value::Array(items) => items,
        serde_json::Value::Null => Vec::new(),
        other => vec![other],
    }
}

/// Maps a Linux block device name to a stable slot index: `sda` -> 0,
/// `sdc` -> 2, `nvme1n1` -> 1, `mmcblk0` -> 0.
pub fn linux_disk_index(name: &str) -> Option<u32> {
    if let Some(tail) = name.strip_prefix("sd") {
        let mut index: u32 = 0;
        for c in tail.chars() {
            if !c.is_ascii_lowercase() {
                return None;
            }
            index = index * 26 + (c as u32 - 'a' as u32) + 1;
        }
        return index.checked_sub(1);
    }
    if let Some(tail) = name.strip_prefix("nvme") {
        return tail.split('n').next()?.parse().ok();
    }
    if let Some(tail) = name.strip_prefix("mmcblk") {
        return tail
            .chars()
            .take_while(|c| c.is_ascii_digit())
            .collect::<String>()
            .parse()
            .ok();
    }
    None
}

/// Parses one `lsblk -P` line (`KEY="value" KEY="value" ...`) into a map.
pub fn lsblk_pairs(line: &str) -> HashMap<String, String> {
    let mut pairs = HashMap::new();
    let mut rest = line.trim();
    while let Some(eq) = rest.find("=\"") {
        let key = rest[..eq].trim().to_string();
        let after = &rest[eq + 2..];
        let Some(end) = after.find('"') else { break };
        pairs.insert(key, after[..end].to_string());
        rest = &after[end + 1..];
    }
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn physicaldrive_ids_parse() {
        assert_eq!(physicaldrive_index(r"\\.\PHYSICALDRIVE0"), Some(0));
        assert_eq!(physicaldrive_index(r"\\.\PHYSICALDRIVE12"), Some(12));
        assert_eq!(physicaldrive_index(r"\\.\CdRom0"), None);
    }

    #[test]
    fn drive_letters_normalize() {
        assert_eq!(drive_letter("e:"), Some('E'));
        assert_eq!(drive_letter("E:\\"), Some('E'));
        assert_eq!(drive_letter(""), None);
        assert_eq!(drive_letter("1:"), None);
    }

    #[test]
    fn usb_bus_is_removable() {
        assert!(removable_hint(Some("USB"), None, None));
        assert!(removable_hint(None, None, Some("usb")));
        assert!(removable_hint(None, Some("Removable Media"), None));
        assert!(!removable_hint(Some("NVMe"), Some("Fixed hard disk media"), Some("SCSI")));
    }

    #[test]
    fn single_json_object_becomes_a_list() {
        let single: serde_json::Value = serde_json::json!({"Number": 0});
        assert_eq!(json_objects(single).len(), 1);
        let many: serde_json::Value = serde_json::json!([{"Number": 0}, {"Number": 1}]);
        assert_eq!(json_objects(many).len(), 2);
        assert!(json_objects(serde_json::Value::Null).is_empty());
    }

    #[test]
    fn linux_names_map_to_indices() {
        assert_eq!(linux_disk_index("sda"), Some(0));
        assert_eq!(linux_disk_index("sdc"), Some(2));
        assert_eq!(linux_disk_index("nvme0n1"), Some(0));
        assert_eq!(linux_disk_index("mmcblk1"), Some(1));
        assert_eq!(linux_disk_index("loop0"), None);
    }

    #[test]
    fn lsblk_lines_parse_to_pairs() {
        let line = r#"NAME="sdb" SIZE="15931539456" MODEL="Cruzer Blade" RM="1" TYPE="disk""#;
        let pairs = lsblk_pairs(line);
        assert_eq!(pairs.get("NAME").map(String::as_str), Some("sdb"));
        assert_eq!(pairs.get("RM").map(String::as_str), Some("1"));
        assert_eq!(pairs.get("MODEL").map(String::as_str), Some("Cruzer Blade"));
    }
}
