use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Partition table format understood by the external disk utility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TableFormat {
    Gpt,
    Mbr,
}

impl TableFormat {
    /// The token the script grammar expects (`convert gpt` / `convert mbr`).
    pub fn as_script_token(&self) -> &'static str {
        match self {
            TableFormat::Gpt => "gpt",
            TableFormat::Mbr => "mbr",
        }
    }
}

impl std::fmt::Display for TableFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_script_token())
    }
}

/// One primitive partition operation. Immutable once constructed; built by
/// the planner, consumed by the executor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PartitionOp {
    Resize {
        disk: u32,
        partition: u32,
        /// Zero means "grow to the maximum available extent".
        new_size_bytes: u64,
    },
    Move {
        disk: u32,
        partition: u32,
        new_offset_bytes: u64,
    },
    Merge {
        disk: u32,
        first: u32,
        second: u32,
    },
    Split {
        disk: u32,
        partition: u32,
        split_at_bytes: u64,
    },
    ConvertTable {
        disk: u32,
        to: Option<TableFormat>,
    },
    Align4K {
        disk: u32,
        partition: u32,
    },
    CreatePrimary {
        disk: u32,
        fs: String,
        label: Option<String>,
        quick: bool,
        assign: Option<char>,
    },
}

impl PartitionOp {
    pub fn disk(&self) -> u32 {
        match self {
            PartitionOp::Resize { disk, .. }
            | PartitionOp::Move { disk, .. }
            | PartitionOp::Merge { disk, .. }
            | PartitionOp::Split { disk, .. }
            | PartitionOp::ConvertTable { disk, .. }
            | PartitionOp::Align4K { disk, .. }
            | PartitionOp::CreatePrimary { disk, .. } => *disk,
        }
    }
}

/// An ordered, immutable batch of partition operations.
///
/// A plan is never executed without a prior successful precheck on the same
/// plan value; [`PrecheckResult::covers`] carries that binding as a stable
/// fingerprint of the op sequence, so two structurally equal plans are
/// interchangeable and a mutated one is not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    ops: Vec<PartitionOp>,
}

impl Plan {
    pub fn new(ops: Vec<PartitionOp>) -> Self {
        Plan { ops }
    }

    pub fn ops(&self) -> &[PartitionOp] {
        &self.ops
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Device indices touched by this plan, ascending and deduplicated.
    pub fn device_indices(&self) -> Vec<u32> {
        let mut indices: Vec<u32> = self.ops.iter().map(|op| op.disk()).collect();
        indices.sort_unstable();
        indices.dedup();
        indices
    }

    /// Stable hash of the op sequence. Structural identity only; not
    /// persisted and not a cryptographic digest.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.ops.hash(&mut hasher);
        hasher.finish()
    }
}

/// Outcome of validating a plan (or a sanitize request).
///
/// `ok == false` is a hard stop; warnings are advisory and do not block
/// execution on their own.
#[derive(Debug, Clone)]
pub struct PrecheckResult {
    pub ok: bool,
    pub message: String,
    pub warnings: Vec<String>,
    fingerprint: u64,
}

impl PrecheckResult {
    pub fn pass(plan: &Plan, warnings: Vec<String>) -> Self {
        PrecheckResult {
            ok: true,
            message: "plan validated".to_string(),
            warnings,
            fingerprint: plan.fingerprint(),
        }
    }

    pub fn fail(plan: &Plan, message: impl Into<String>) -> Self {
        PrecheckResult {
            ok: false,
            message: message.into(),
            warnings: Vec::new(),
            fingerprint: plan.fingerprint(),
        }
    }

    /// A result not bound to any plan, for the sanitize pipeline where
    /// stages are independently callable. Never covers a plan.
    pub fn standalone(ok: bool, message: impl Into<String>, warnings: Vec<String>) -> Self {
        PrecheckResult {
            ok,
            message: message.into(),
            warnings,
            fingerprint: 0,
        }
    }

    /// True iff this result was produced for a plan structurally equal to
    /// `plan` and validation passed.
    pub fn covers(&self, plan: &Plan) -> bool {
        self.ok && self.fingerprint != 0 && self.fingerprint == plan.fingerprint()
    }
}

/// Pure preview of what execution would run. No I/O has happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DryRunResult {
    pub script: String,
    pub notes: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn convert_plan(disk: u32) -> Plan {
        Plan::new(vec![PartitionOp::ConvertTable {
            disk,
            to: Some(TableFormat::Gpt),
        }])
    }

    #[test]
    fn equal_plans_share_a_fingerprint() {
        assert_eq!(convert_plan(0).fingerprint(), convert_plan(0).fingerprint());
        assert_ne!(convert_plan(0).fingerprint(), convert_plan(1).fingerprint());
    }

    #[test]
    fn precheck_covers_the_same_plan_value_only() {
        let plan = convert_plan(0);
        let result = PrecheckResult::pass(&plan, vec![]);
        assert!(result.covers(&plan));
        assert!(result.covers(&convert_plan(0)));
        assert!(!result.covers(&convert_plan(1)));
    }

    #[test]
    fn failed_precheck_never_covers() {
        let plan = convert_plan(0);
        let result = PrecheckResult::fail(&plan, "nope");
        assert!(!result.covers(&plan));
    }

    #[test]
    fn standalone_precheck_never_covers_a_plan() {
        let result = PrecheckResult::standalone(true, "sanitize precheck", vec![]);
        assert!(!result.covers(&convert_plan(0)));
    }

    #[test]
    fn device_indices_are_sorted_and_deduped() {
        let plan = Plan::new(vec![
            PartitionOp::Align4K { disk: 2, partition: 1 },
            PartitionOp::ConvertTable { disk: 0, to: None },
            PartitionOp::Align4K { disk: 2, partition: 2 },
        ]);
        assert_eq!(plan.device_indices(), vec![0, 2]);
    }
}
