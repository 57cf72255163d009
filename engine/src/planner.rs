use diskforge_core::{PartitionOp, Plan, TableFormat};

/// High-level caller intent, turned into an ordered plan of primitives.
#[derive(Debug, Clone)]
pub enum PlanIntent {
    Resize {
        disk: u32,
        partition: u32,
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
    Align {
        disk: u32,
        partition: u32,
    },
    /// Reinitialize a disk end to end: new table, one primary partition,
    /// formatted and assigned.
    Erase {
        disk: u32,
        table: TableFormat,
        fs: String,
        label: Option<String>,
        quick: bool,
        assign: Option<char>,
    },
}

pub struct OperationPlanner;

impl OperationPlanner {
    pub fn plan(intent: PlanIntent) -> Plan {
        let ops = match intent {
            PlanIntent::Resize {
                disk,
                partition,
                new_size_bytes,
            } => vec![PartitionOp::Resize {
                disk,
                partition,
                new_size_bytes,
            }],
            PlanIntent::Move {
                disk,
                partition,
                new_offset_bytes,
            } => vec![PartitionOp::Move {
                disk,
                partition,
                new_offset_bytes,
            }],
            PlanIntent::Merge { disk, first, second } => {
                vec![PartitionOp::Merge { disk, first, second }]
            }
            PlanIntent::Split {
                disk,
                partition,
                split_at_bytes,
            } => vec![PartitionOp::Split {
                disk,
                partition,
                split_at_bytes,
            }],
            PlanIntent::ConvertTable { disk, to } => {
                vec![PartitionOp::ConvertTable { disk, to }]
            }
            PlanIntent::Align { disk, partition } => {
                vec![PartitionOp::Align4K { disk, partition }]
            }
            PlanIntent::Erase {
                disk,
                table,
                fs,
                label,
                quick,
                assign,
            } => vec![
                PartitionOp::ConvertTable {
                    disk,
                    to: Some(table),
                },
                PartitionOp::CreatePrimary {
                    disk,
                    fs,
                    label,
                    quick,
                    assign,
                },
            ],
        };
        Plan::new(ops)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn erase_expands_to_convert_then_create() {
        let plan = OperationPlanner::plan(PlanIntent::Erase {
            disk: 1,
            table: TableFormat::Gpt,
            fs: "exfat".to_string(),
            label: None,
            quick: true,
            assign: None,
        });
        assert_eq!(plan.ops().len(), 2);
        assert!(matches!(plan.ops()[0], PartitionOp::ConvertTable { disk: 1, to: Some(TableFormat::Gpt) }));
        assert!(matches!(plan.ops()[1], PartitionOp::CreatePrimary { disk: 1, .. }));
    }

    #[test]
    fn single_op_intents_map_one_to_one() {
        let plan = OperationPlanner::plan(PlanIntent::Resize {
            disk: 0,
            partition: 1,
            new_size_bytes: 1024,
        });
        assert_eq!(plan.ops().len(), 1);
    }
}
