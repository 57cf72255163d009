use crate::locks::DeviceLocks;
use crate::report;
use crate::script;
use chrono::Utc;
use diskforge_core::{
    CommandRunner, EventSink, ForgeError, PrecheckResult, ProgressFn, ReportPaths, SanitizeMode,
    SanitizeReport, ScriptRunner, SectorSampler, StageEvent, VerifyOutcome,
};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn machine_name() -> String {
    std::env::var("COMPUTERNAME")
        .or_else(|_| std::env::var("HOSTNAME"))
        .unwrap_or_else(|_| "unknown-host".to_string())
}

fn user_name() -> String {
    std::env::var("USERNAME")
        .or_else(|_| std::env::var("USER"))
        .unwrap_or_else(|_| "unknown-user".to_string())
}

#[derive(Debug, Clone)]
pub struct SanitizeConfig {
    /// Cadence of the synthetic progress ramp while the external tool runs.
    pub progress_tick: Duration,
}

impl Default for SanitizeConfig {
    fn default() -> Self {
        SanitizeConfig {
            progress_tick: Duration::from_secs(2),
        }
    }
}

/// Destructive-erase pipeline: precheck, execute, verify, report. Unlike
/// the partition pipeline the stages are independently callable, so
/// degraded and test scenarios can run verify or report alone.
pub struct SanitizeEngine {
    script_runner: Arc<dyn ScriptRunner>,
    command_runner: Arc<dyn CommandRunner>,
    sampler: Option<Arc<dyn SectorSampler>>,
    locks: Arc<DeviceLocks>,
    sink: Arc<dyn EventSink>,
    config: SanitizeConfig,
}

impl SanitizeEngine {
    pub fn new(
        script_runner: Arc<dyn ScriptRunner>,
        command_runner: Arc<dyn CommandRunner>,
        sampler: Option<Arc<dyn SectorSampler>>,
        locks: Arc<DeviceLocks>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self::with_config(
            script_runner,
            command_runner,
            sampler,
            locks,
            sink,
            SanitizeConfig::default(),
        )
    }

    pub fn with_config(
        script_runner: Arc<dyn ScriptRunner>,
        command_runner: Arc<dyn CommandRunner>,
        sampler: Option<Arc<dyn SectorSampler>>,
        locks: Arc<DeviceLocks>,
        sink: Arc<dyn EventSink>,
        config: SanitizeConfig,
    ) -> Self {
        SanitizeEngine {
            script_runner,
            command_runner,
            sampler,
            locks,
            sink,
            config,
        }
    }

    /// Validates the request. The system-disk guard is deliberately not
    /// applied here; callers consult their [`diskforge_core::SafetyGuard`]
    /// before `execute`.
    pub fn precheck(&self, disk: i64, mode: SanitizeMode) -> PrecheckResult {
        if disk < 0 {
            return PrecheckResult::standalone(
                false,
                format!("disk index {disk} is negative"),
                Vec::new(),
            );
        }
        let warnings = match mode {
            SanitizeMode::Nvme => vec!["nvme-sanitize requires an NVMe device".to_string()],
            SanitizeMode::Ata => {
                vec!["ata-secure-erase requires an ATA device with security support".to_string()]
            }
            SanitizeMode::Nist => Vec::new(),
        };
        PrecheckResult::standalone(true, "sanitize precheck passed", warnings)
    }

    /// Dispatches to the erase strategy for `mode`. Progress is synthetic
    /// and monotonically non-decreasing in [0, 100]. Cancellation leaves
    /// the device in an undefined state, logged as such; a canceled
    /// attempt is not restartable and produces no report.
    pub async fn execute(
        &self,
        disk: u32,
        mode: SanitizeMode,
        progress: Option<ProgressFn>,
        cancel: &CancellationToken,
    ) -> Result<bool, ForgeError> {
        let _lock = self.locks.try_acquire(&[disk])?;
        let report_pct = |pct: u8| {
            if let Some(f) = &progress {
                f(pct);
            }
        };
        report_pct(0);
        self.sink.emit(StageEvent::new(
            "sanitize-started",
            serde_json::json!({ "disk": disk, "mode": mode.as_str() }),
        ));

        let device = script::raw_device_path(disk);
        let strategy = async {
            match mode {
                SanitizeMode::Nist => self
                    .script_runner
                    .run_script(&script::render_sanitize_clean(disk), cancel)
                    .await
                    .map(|_| ()),
                SanitizeMode::Nvme => {
                    let args = vec![
                        "sanitize".to_string(),
                        device.clone(),
                        "-a".to_string(),
                        "start-block-erase".to_string(),
                    ];
                    self.command_runner
                        .run_command("nvme", &args, cancel)
                        .await
                        .map(|_| ())
                }
                SanitizeMode::Ata => {
                    let args = vec![
                        "--user-master".to_string(),
                        "u".to_string(),
                        "--security-erase".to_string(),
                        "NULL".to_string(),
                        device.clone(),
                    ];
                    self.command_runner
                        .run_command("hdparm", &args, cancel)
                        .await
                        .map(|_| ())
                }
            }
        };
        tokio::pin!(strategy);

        // The external tools report nothing usable while running, so the
        // percentage is a heuristic ramp that never reaches 100 early.
        let mut pct = 5u8;
        report_pct(pct);
        let mut ticker = tokio::time::interval(self.config.progress_tick);
        ticker.tick().await;
        let outcome = loop {
            tokio::select! {
                result = &mut strategy => break result,
                _ = ticker.tick() => {
                    if pct < 90 {
                        pct += 5;
                        report_pct(pct);
                    }
                }
            }
        };

        match outcome {
            Ok(()) => {
                report_pct(100);
                self.sink.emit(StageEvent::new(
                    "sanitize-completed",
                    serde_json::json!({ "disk": disk, "mode": mode.as_str() }),
                ));
                Ok(true)
            }
            Err(ForgeError::Canceled) => {
                tracing::warn!(disk, mode = mode.as_str(), "sanitize canceled, device state undefined");
                self.sink.emit(StageEvent::new(
                    "canceled",
                    serde_json::json!({
                        "stage": "sanitize-execute",
                        "disk": disk,
                        "device_state": "undefined",
                    }),
                ));
                Err(ForgeError::Canceled)
            }
            Err(e) => {
                self.sink.emit(StageEvent::new(
                    "sanitize-failed",
                    serde_json::json!({ "disk": disk, "detail": e.to_string() }),
                ));
                Err(e)
            }
        }
    }

    /// Produces the verification fingerprint: deterministic for a fixed
    /// (machine, disk, mode) triple, with a best-effort sector sample in
    /// the details. Advisory evidence, not a wipe guarantee.
    pub async fn verify(&self, disk: u32, mode: SanitizeMode) -> VerifyOutcome {
        let machine = machine_name();
        let mut hasher = Sha256::new();
        hasher.update(format!("{machine}:{disk}:{mode}"));
        let hash = hex::encode(hasher.finalize());

        let (ok, details) = match &self.sampler {
            Some(sampler) => match sampler.sample(disk).await {
                Ok(bytes) => {
                    let nonzero = bytes.iter().filter(|b| **b != 0).count();
                    (
                        nonzero == 0,
                        format!("sampled {} bytes, {} nonzero", bytes.len(), nonzero),
                    )
                }
                Err(e) => (true, format!("sector sample unavailable: {e}")),
            },
            None => (true, "no sector sampler configured".to_string()),
        };
        VerifyOutcome { ok, hash, details }
    }

    /// Assembles the append-only audit record for a finished attempt.
    pub fn build_report(&self, mode: SanitizeMode, verify: &VerifyOutcome) -> SanitizeReport {
        SanitizeReport {
            timestamp: Utc::now(),
            machine: machine_name(),
            user: user_name(),
            mode,
            verification_hash: verify.hash.clone(),
            verify_ok: verify.ok,
            details: verify.details.clone(),
        }
    }

    /// Persists the durable PDF and CSV record. A failure here never
    /// unwinds the erase result already returned to the caller.
    pub fn report(
        &self,
        record: &SanitizeReport,
        out_dir: &Path,
    ) -> Result<ReportPaths, ForgeError> {
        let paths = report::write_report(record, out_dir)?;
        self.sink.emit(StageEvent::new(
            "report-written",
            serde_json::json!({ "pdf": paths.pdf, "csv": paths.csv }),
        ));
        Ok(paths)
    }
}
