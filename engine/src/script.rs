//! Renders plans, sanitize requests, and rollback snapshots into the
//! line-oriented grammar of the external disk utility. Everything here is
//! a pure function of its input: the executed script is byte-for-byte the
//! previewed one.

use crate::snapshot::RollbackSnapshot;
use diskforge_core::{DryRunResult, PartitionOp, Plan, TableFormat};

const MIB: u64 = 1_048_576;
const KIB: u64 = 1_024;

fn size_mb(bytes: u64) -> u64 {
    (bytes / MIB).max(1)
}

fn offset_kb(bytes: u64) -> u64 {
    bytes / KIB
}

fn push_op(script: &mut String, notes: &mut Vec<String>, op: &PartitionOp) {
    match op {
        PartitionOp::Resize {
            partition,
            new_size_bytes,
            ..
        } => {
            script.push_str(&format!("select partition {partition}\n"));
            if *new_size_bytes == 0 {
                // Zero size means "grow to the maximum available extent".
                script.push_str("extend\n");
            } else {
                script.push_str(&format!("extend size={}\n", size_mb(*new_size_bytes)));
            }
        }
        PartitionOp::Move {
            partition,
            new_offset_bytes,
            ..
        } => {
            script.push_str(&format!("select partition {partition}\n"));
            script.push_str(&format!("move offset={}\n", offset_kb(*new_offset_bytes)));
        }
        PartitionOp::Merge { disk, first, second } => {
            script.push_str(&format!(
                "rem merge partitions {first} and {second} on disk {disk}\n"
            ));
            notes.push(format!(
                "Merge of partitions {first}+{second} on disk {disk} is preview-only; no executable command was rendered"
            ));
        }
        PartitionOp::Split {
            disk,
            partition,
            split_at_bytes,
        } => {
            script.push_str(&format!(
                "rem split partition {partition} on disk {disk} at {split_at_bytes} bytes\n"
            ));
            notes.push(format!(
                "Split of partition {partition} on disk {disk} is preview-only; no executable command was rendered"
            ));
        }
        PartitionOp::ConvertTable { to, .. } => match to {
            Some(format) => {
                script.push_str("clean\n");
                script.push_str(&format!("convert {}\n", format.as_script_token()));
            }
            None => {
                script.push_str("rem convert skipped, no target table format\n");
                notes.push(
                    "ConvertTable without a target format was skipped; set gpt or mbr".to_string(),
                );
            }
        },
        PartitionOp::Align4K { disk, partition } => {
            script.push_str(&format!(
                "rem align partition {partition} on disk {disk} to 4K boundaries\n"
            ));
            notes.push(format!(
                "Align4K of partition {partition} on disk {disk} is preview-only; no executable command was rendered"
            ));
        }
        PartitionOp::CreatePrimary {
            fs,
            label,
            quick,
            assign,
            ..
        } => {
            script.push_str("create partition primary\n");
            let mut line = format!("format fs={fs}");
            if let Some(label) = label {
                line.push_str(&format!(" label=\"{label}\""));
            }
            if *quick {
                line.push_str(" quick");
            }
            script.push_str(&line);
            script.push('\n');
            match assign {
                Some(letter) => script.push_str(&format!("assign letter={letter}\n")),
                None => script.push_str("assign\n"),
            }
        }
    }
}

/// Renders a plan grouped by device index: select the device, query its
/// detail, then the op lines, with one trailing `exit`.
pub fn render_plan(plan: &Plan) -> DryRunResult {
    let mut script = String::new();
    let mut notes = Vec::new();
    for disk in plan.device_indices() {
        script.push_str(&format!("select disk {disk}\n"));
        script.push_str("detail disk\n");
        for op in plan.ops().iter().filter(|op| op.disk() == disk) {
            push_op(&mut script, &mut notes, op);
        }
    }
    if !script.is_empty() {
        script.push_str("exit\n");
    }
    DryRunResult { script, notes }
}

/// True when a rendered script carries at least one destructive command,
/// as opposed to selection, detail queries, and preview remarks.
pub fn has_executable_commands(script: &str) -> bool {
    script.lines().any(|line| {
        let line = line.trim();
        !line.is_empty()
            && !line.starts_with("select ")
            && !line.starts_with("detail ")
            && !line.starts_with("rem ")
            && line != "exit"
    })
}

/// Safe-state script for a rollback snapshot: clean, restore the table
/// format, then best-effort re-creation of the recorded partitions. The
/// guaranteed minimum when no metadata was captured is clean + convert.
pub fn render_safe_state(snapshot: &RollbackSnapshot) -> String {
    let mut script = format!("select disk {}\n", snapshot.disk);
    script.push_str("clean\n");
    let table = snapshot.table.unwrap_or(TableFormat::Gpt);
    script.push_str(&format!("convert {}\n", table.as_script_token()));
    for part in &snapshot.partitions {
        if part.size_bytes == 0 {
            continue;
        }
        let mut line = format!("create partition primary size={}", size_mb(part.size_bytes));
        if part.offset_bytes > 0 {
            line.push_str(&format!(" offset={}", offset_kb(part.offset_bytes)));
        }
        script.push_str(&line);
        script.push('\n');
        if let Some(letter) = part.letter {
            script.push_str(&format!("assign letter={letter}\n"));
        }
    }
    script.push_str("exit\n");
    script
}

/// Full-overwrite erase script for the NIST-clear strategy.
pub fn render_sanitize_clean(disk: u32) -> String {
    format!("select disk {disk}\nclean all\nexit\n")
}

/// Raw device path for the one-shot sanitize utilities.
pub fn raw_device_path(disk: u32) -> String {
    if cfg!(windows) {
        format!(r"\\.\PHYSICALDRIVE{disk}")
    } else {
        // Best-effort mapping for the common sdX slots.
        let letter = (b'a' + (disk % 26) as u8) as char;
        format!("/dev/sd{letter}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use diskforge_core::PartitionRecord;

    #[test]
    fn convert_renders_clean_then_convert() {
        let plan = Plan::new(vec![PartitionOp::ConvertTable {
            disk: 0,
            to: Some(TableFormat::Gpt),
        }]);
        let result = render_plan(&plan);
        let select = result.script.find("select disk 0").expect("select line");
        let convert = result.script.find("convert gpt").expect("convert line");
        assert!(select < convert);
        assert!(result.notes.is_empty());
        assert!(has_executable_commands(&result.script));
    }

    #[test]
    fn preview_only_ops_carry_notes_and_no_commands() {
        let plan = Plan::new(vec![
            PartitionOp::Merge { disk: 1, first: 1, second: 2 },
            PartitionOp::Align4K { disk: 1, partition: 1 },
        ]);
        let result = render_plan(&plan);
        assert_eq!(result.notes.len(), 2);
        assert!(result.notes[0].contains("preview-only"));
        assert!(!has_executable_commands(&result.script));
    }

    #[test]
    fn zero_size_resize_renders_bare_extend() {
        let plan = Plan::new(vec![PartitionOp::Resize {
            disk: 2,
            partition: 1,
            new_size_bytes: 0,
        }]);
        let result = render_plan(&plan);
        assert!(result.script.contains("extend\n"));
        assert!(!result.script.contains("extend size="));
    }

    #[test]
    fn create_primary_renders_the_full_grammar() {
        let plan = Plan::new(vec![PartitionOp::CreatePrimary {
            disk: 1,
            fs: "ntfs".to_string(),
            label: Some("BACKUP".to_string()),
            quick: true,
            assign: Some('E'),
        }]);
        let result = render_plan(&plan);
        assert!(result.script.contains("create partition primary\n"));
        assert!(result.script.contains("format fs=ntfs label=\"BACKUP\" quick\n"));
        assert!(result.script.contains("assign letter=E\n"));
    }

    #[test]
    fn rendering_is_deterministic() {
        let plan = Plan::new(vec![
            PartitionOp::ConvertTable { disk: 0, to: Some(TableFormat::Mbr) },
            PartitionOp::Resize { disk: 1, partition: 2, new_size_bytes: 8 * MIB },
        ]);
        assert_eq!(render_plan(&plan), render_plan(&plan));
    }

    #[test]
    fn safe_state_always_cleans_and_converts() {
        let snapshot = RollbackSnapshot {
            disk: 3,
            taken_at: Utc::now(),
            table: Some(TableFormat::Mbr),
            partitions: vec![],
        };
        let script = render_safe_state(&snapshot);
        assert!(script.contains("select disk 3"));
        assert!(script.contains("clean\n"));
        assert!(script.contains("convert mbr\n"));
    }

    #[test]
    fn safe_state_recreates_recorded_partitions() {
        let snapshot = RollbackSnapshot {
            disk: 1,
            taken_at: Utc::now(),
            table: Some(TableFormat::Gpt),
            partitions: vec![PartitionRecord {
                number: 1,
                offset_bytes: MIB,
                size_bytes: 512 * MIB,
                kind: Some("Basic".to_string()),
                letter: Some('F'),
            }],
        };
        let script = render_safe_state(&snapshot);
        assert!(script.contains("create partition primary size=512 offset=1024\n"));
        assert!(script.contains("assign letter=F\n"));
    }
}
