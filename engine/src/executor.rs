use crate::locks::DeviceLocks;
use crate::script;
use crate::snapshot::{RollbackSnapshot, SnapshotStore};
use chrono::Utc;
use diskforge_core::{
    DryRunResult, EventSink, ForgeError, LayoutProbe, PartitionOp, Plan, PrecheckResult,
    PrivilegeOutcome, SafetyGuard, ScriptRunner, StageEvent,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub struct ExecutorConfig {
    pub snapshot_dir: PathBuf,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        ExecutorConfig {
            snapshot_dir: SnapshotStore::default_dir(),
        }
    }
}

/// Runs plans through the mandatory lifecycle: precheck, dry run, execute,
/// with optional rollback snapshots. Execute is unreachable without a
/// passing [`PrecheckResult`] covering the exact plan value.
pub struct OperationExecutor {
    guard: Arc<dyn SafetyGuard>,
    runner: Arc<dyn ScriptRunner>,
    layout: Option<Arc<dyn LayoutProbe>>,
    store: SnapshotStore,
    locks: Arc<DeviceLocks>,
    sink: Arc<dyn EventSink>,
}

impl OperationExecutor {
    pub fn new(
        guard: Arc<dyn SafetyGuard>,
        runner: Arc<dyn ScriptRunner>,
        layout: Option<Arc<dyn LayoutProbe>>,
        locks: Arc<DeviceLocks>,
        sink: Arc<dyn EventSink>,
        config: ExecutorConfig,
    ) -> Self {
        OperationExecutor {
            guard,
            runner,
            layout,
            store: SnapshotStore::new(config.snapshot_dir),
            locks,
            sink,
        }
    }

    /// Validates a plan. An empty plan is a hard stop; a zero-size resize
    /// or move and a convert without target format are advisory warnings.
    pub fn precheck(&self, plan: &Plan) -> PrecheckResult {
        if plan.is_empty() {
            return PrecheckResult::fail(plan, "plan contains no operations");
        }
        let mut warnings = Vec::new();
        for (i, op) in plan.ops().iter().enumerate() {
            match op {
                PartitionOp::Resize { new_size_bytes: 0, partition, .. } => {
                    warnings.push(format!(
                        "op {i}: resize of partition {partition} has size zero and will extend to the maximum available extent"
                    ));
                }
                PartitionOp::Move { new_offset_bytes: 0, partition, .. } => {
                    warnings.push(format!(
                        "op {i}: move of partition {partition} targets offset zero"
                    ));
                }
                PartitionOp::ConvertTable { to: None, .. } => {
                    warnings.push(format!(
                        "op {i}: convert has no target table format and will be skipped"
                    ));
                }
                _ => {}
            }
        }
        PrecheckResult::pass(plan, warnings)
    }

    /// Pure preview. Two structurally equal plans render identically.
    pub fn dry_run(&self, plan: &Plan) -> DryRunResult {
        script::render_plan(plan)
    }

    /// Executes a validated plan. The snapshot, when requested, is durably
    /// written before the destructive call is issued.
    pub async fn execute(
        &self,
        plan: &Plan,
        check: &PrecheckResult,
        snapshot_rollback: bool,
        cancel: &CancellationToken,
    ) -> Result<bool, ForgeError> {
        if !check.covers(plan) {
            return Err(ForgeError::Validation(
                "execute requires a passing precheck for this exact plan".to_string(),
            ));
        }
        let disks = plan.device_indices();
        let _lock = self.locks.try_acquire(&disks)?;

        for disk in &disks {
            if self.guard.is_system_disk(*disk).await? {
                return Err(ForgeError::Validation(format!(
                    "disk {disk} hosts the running system and cannot be modified"
                )));
            }
        }
        match self.guard.ensure_privilege("apply-plan").await? {
            PrivilegeOutcome::Granted => {}
            outcome => return Err(ForgeError::Privilege(outcome)),
        }

        let dry = self.dry_run(plan);
        if !script::has_executable_commands(&dry.script) {
            self.sink.emit(StageEvent::new(
                "plan-empty",
                serde_json::json!({ "disks": disks }),
            ));
            return Ok(false);
        }

        let op_id = uuid::Uuid::new_v4().to_string();
        if snapshot_rollback {
            for disk in &disks {
                let snapshot = self.capture_snapshot(*disk).await;
                let path = self.store.write(&snapshot)?;
                self.sink.emit(StageEvent::new(
                    "snapshot-written",
                    serde_json::json!({ "op": op_id, "disk": disk, "path": path }),
                ));
            }
        }

        self.sink.emit(StageEvent::new(
            "execute-started",
            serde_json::json!({ "op": op_id, "disks": disks }),
        ));
        match self.runner.run_script(&dry.script, cancel).await {
            Ok(_) => {
                tracing::info!(op = %op_id, ?disks, "plan executed");
                self.sink.emit(StageEvent::new(
                    "execute-completed",
                    serde_json::json!({ "op": op_id }),
                ));
                Ok(true)
            }
            Err(ForgeError::Canceled) => {
                self.sink.emit(StageEvent::new(
                    "canceled",
                    serde_json::json!({ "op": op_id, "stage": "execute" }),
                ));
                Err(ForgeError::Canceled)
            }
            Err(e) => {
                self.sink.emit(StageEvent::new(
                    "execute-failed",
                    serde_json::json!({ "op": op_id, "detail": e.to_string() }),
                ));
                Err(e)
            }
        }
    }

    /// Restores the most recent snapshot of a disk. Without one this is a
    /// no-op returning `Ok(false)`.
    ///
    /// Device indices are not stable across topology changes, so a snapshot
    /// taken for a non-system disk can name today's system disk; the guard
    /// is consulted against the current topology, not the snapshot's.
    pub async fn rollback(
        &self,
        disk: u32,
        cancel: &CancellationToken,
    ) -> Result<bool, ForgeError> {
        let Some(snapshot) = self.store.latest(disk)? else {
            return Ok(false);
        };
        let _lock = self.locks.try_acquire(&[disk])?;
        if self.guard.is_system_disk(disk).await? {
            return Err(ForgeError::Validation(format!(
                "disk {disk} hosts the running system and cannot be modified"
            )));
        }
        match self.guard.ensure_privilege("rollback").await? {
            PrivilegeOutcome::Granted => {}
            outcome => return Err(ForgeError::Privilege(outcome)),
        }
        let rendered = script::render_safe_state(&snapshot);
        self.runner.run_script(&rendered, cancel).await?;
        self.sink.emit(StageEvent::new(
            "rollback-completed",
            serde_json::json!({ "disk": disk, "taken_at": snapshot.taken_at }),
        ));
        Ok(true)
    }

    async fn capture_snapshot(&self, disk: u32) -> RollbackSnapshot {
        let layout = match &self.layout {
            Some(probe) => probe.partition_layout(disk).await.ok(),
            None => None,
        };
        match layout {
            Some(layout) => RollbackSnapshot {
                disk,
                taken_at: Utc::now(),
                table: layout.table,
                partitions: layout.partitions,
            },
            // No probe or probe failure: fall back to the minimum the
            // safe-state script can always restore.
            None => RollbackSnapshot {
                disk,
                taken_at: Utc::now(),
                table: None,
                partitions: Vec::new(),
            },
        }
    }
}
