use anyhow::{anyhow, bail, Context};
use clap::{Parser, Subcommand};
use diskforge_core::{
    DeviceCatalog, ForgeError, PartitionOp, Plan, PrivilegeOutcome, ProgressFn, SafetyGuard,
    SanitizeMode, TableFormat, TracingSink,
};
use diskforge_engine::{
    DeviceLocks, ExecutorConfig, OperationExecutor, OperationPlanner, PlanIntent, SanitizeEngine,
    VolumeFormatter,
};
use diskforge_monitor::{CatalogDiffSource, DeviceMonitor, MonitorConfig};
use diskforge_platform::{
    DiskpartRunner, HostPowerProbe, HostSafetyGuard, HostSessionProbe, PlatformCatalog,
    ShellCommandRunner,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "diskforge")]
#[command(about = "Storage device management: discovery, partitioning, sanitize", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List physical drives and mounted volumes
    List {
        /// Keep the OS enumeration order instead of listing removable first
        #[arg(long)]
        unsorted: bool,
    },
    /// Precheck and preview a plan from a JSON ops file
    Plan {
        /// Path to a JSON array of partition operations
        ops_file: PathBuf,
    },
    /// Precheck, preview, confirm, and execute a plan
    Apply {
        ops_file: PathBuf,
        /// Write a rollback snapshot before executing
        #[arg(long)]
        snapshot: bool,
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
    /// Reinitialize a disk: new table, one formatted primary partition
    Init {
        #[arg(long)]
        disk: u32,
        /// Partition table: gpt or mbr
        #[arg(long, default_value = "gpt")]
        table: String,
        #[arg(long, default_value = "exfat")]
        fs: String,
        #[arg(long)]
        label: Option<String>,
        /// Full format instead of quick
        #[arg(long)]
        full: bool,
        /// Drive letter to assign to the new partition
        #[arg(long)]
        letter: Option<char>,
        /// Write a rollback snapshot before executing
        #[arg(long)]
        snapshot: bool,
        #[arg(long)]
        yes: bool,
    },
    /// Restore the most recent rollback snapshot of a disk
    Rollback {
        #[arg(long)]
        disk: u32,
    },
    /// Destructive erase of a whole disk
    Erase {
        #[arg(long)]
        disk: u32,
        /// Erase strategy: nist, nvme, or ata
        #[arg(long, default_value = "nist")]
        mode: String,
        /// Directory for the PDF/CSV report
        #[arg(long)]
        report_dir: Option<PathBuf>,
        #[arg(long)]
        yes: bool,
    },
    /// Format a mounted volume by drive letter
    Format {
        #[arg(long)]
        letter: char,
        #[arg(long)]
        fs: String,
        #[arg(long)]
        label: Option<String>,
        /// Full format instead of quick
        #[arg(long)]
        full: bool,
        #[arg(long)]
        yes: bool,
    },
    /// Run the device monitor until Ctrl+C
    Watch,
}

fn parse_table(raw: &str) -> anyhow::Result<TableFormat> {
    match raw.to_lowercase().as_str() {
        "gpt" => Ok(TableFormat::Gpt),
        "mbr" => Ok(TableFormat::Mbr),
        other => bail!("unknown partition table '{other}', expected gpt or mbr"),
    }
}

fn parse_mode(raw: &str) -> anyhow::Result<SanitizeMode> {
    match raw.to_lowercase().as_str() {
        "nist" => Ok(SanitizeMode::Nist),
        "nvme" => Ok(SanitizeMode::Nvme),
        "ata" => Ok(SanitizeMode::Ata),
        other => bail!("unknown sanitize mode '{other}', expected nist, nvme, or ata"),
    }
}

fn load_plan(path: &PathBuf) -> anyhow::Result<Plan> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading ops file {}", path.display()))?;
    let ops: Vec<PartitionOp> = serde_json::from_str(&text)
        .with_context(|| format!("parsing ops file {}", path.display()))?;
    Ok(Plan::new(ops))
}

fn confirm_or_abort(skip: bool, target: &str) -> anyhow::Result<bool> {
    if skip {
        return Ok(true);
    }
    println!("\nWARNING: this will modify {target} and cannot be undone.");
    println!("Type 'yes' to continue: ");
    use std::io::BufRead;
    let stdin = std::io::stdin();
    let mut line = String::new();
    stdin.lock().read_line(&mut line)?;
    if line.trim() != "yes" {
        println!("Aborted.");
        return Ok(false);
    }
    Ok(true)
}

fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            trigger.cancel();
        }
    });
    cancel
}

fn print_precheck(check: &diskforge_core::PrecheckResult) {
    println!("Precheck: {}", if check.ok { "ok" } else { "FAILED" });
    if !check.ok {
        println!("  {}", check.message);
    }
    for warning in &check.warnings {
        println!("  warning: {warning}");
    }
}

fn progress_printer() -> ProgressFn {
    Arc::new(|pct| {
        print!("\rProgress: {pct:>3}%");
        use std::io::Write;
        let _ = std::io::stdout().flush();
        if pct == 100 {
            println!();
        }
    })
}

/// Guard outcome handling shared by every destructive command: a relaunch
/// means this process abandons the operation.
async fn require_privilege(guard: &HostSafetyGuard, operation: &str) -> anyhow::Result<bool> {
    match guard.ensure_privilege(operation).await? {
        PrivilegeOutcome::Granted => Ok(true),
        PrivilegeOutcome::Relaunched => {
            println!("Relaunched with elevation; this instance is done.");
            Ok(false)
        }
        PrivilegeOutcome::Denied => Err(anyhow!("administrative privileges denied")),
    }
}

fn build_executor(snapshot: Option<PathBuf>) -> anyhow::Result<OperationExecutor> {
    let config = match snapshot {
        Some(dir) => ExecutorConfig { snapshot_dir: dir },
        None => ExecutorConfig::default(),
    };
    Ok(OperationExecutor::new(
        Arc::new(HostSafetyGuard::new()),
        Arc::new(DiskpartRunner::locate()?),
        Some(Arc::new(PlatformCatalog) as Arc<dyn diskforge_core::LayoutProbe>),
        DeviceLocks::new(),
        Arc::new(TracingSink),
        config,
    ))
}

/// Shared apply flow: precheck, preview, confirm, execute.
async fn preview_confirm_execute(
    executor: &OperationExecutor,
    plan: &Plan,
    snapshot: bool,
    yes: bool,
) -> anyhow::Result<()> {
    let check = executor.precheck(plan);
    print_precheck(&check);
    if !check.ok {
        bail!("precheck failed: {}", check.message);
    }
    let dry = executor.dry_run(plan);
    println!("\nThe following script will be executed:\n{}", dry.script);
    for note in &dry.notes {
        println!("note: {note}");
    }
    if !confirm_or_abort(yes, &format!("disk(s) {:?}", plan.device_indices()))? {
        return Ok(());
    }
    let cancel = cancel_on_ctrl_c();
    match executor.execute(plan, &check, snapshot, &cancel).await {
        Ok(true) => println!("Plan executed."),
        Ok(false) => println!("Nothing to execute: the plan renders no destructive commands."),
        Err(ForgeError::Canceled) => println!("Canceled."),
        Err(ForgeError::Privilege(PrivilegeOutcome::Relaunched)) => {
            println!("Relaunched with elevation; this instance is done.");
        }
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::List { unsorted } => {
            let catalog = PlatformCatalog;
            match catalog.list_physical_drives(!unsorted).await {
                Ok(drives) if drives.is_empty() => println!("No physical drives found."),
                Ok(drives) => {
                    println!("Physical drives:\n");
                    for drive in drives {
                        println!(
                            "  disk {:>2}  {:<32} {:>8.2} GB  {}",
                            drive.index,
                            drive.model,
                            drive.size_bytes as f64 / 1_073_741_824.0,
                            if drive.is_removable { "removable" } else { "fixed" },
                        );
                    }
                }
                Err(e) => eprintln!("Error enumerating drives: {e}"),
            }
            println!("\nVolumes:\n");
            for volume in catalog.list_volumes().await {
                println!(
                    "  {}  {:<8} {:>8.2} GB total, {:>8.2} GB free  {}",
                    volume.letter.map(|l| format!("{l}:")).unwrap_or_else(|| "--".to_string()),
                    volume.filesystem,
                    volume.capacity_bytes as f64 / 1_073_741_824.0,
                    volume.free_bytes as f64 / 1_073_741_824.0,
                    if volume.is_removable { "removable" } else { "fixed" },
                );
            }
        }

        Commands::Plan { ops_file } => {
            let plan = load_plan(&ops_file)?;
            let executor = build_executor(None)?;
            let check = executor.precheck(&plan);
            print_precheck(&check);
            if check.ok {
                let dry = executor.dry_run(&plan);
                println!("\nRendered script:\n{}", dry.script);
                for note in &dry.notes {
                    println!("note: {note}");
                }
            }
        }

        Commands::Apply { ops_file, snapshot, yes } => {
            let plan = load_plan(&ops_file)?;
            let executor = build_executor(None)?;
            preview_confirm_execute(&executor, &plan, snapshot, yes).await?;
        }

        Commands::Init { disk, table, fs, label, full, letter, snapshot, yes } => {
            let plan = OperationPlanner::plan(PlanIntent::Erase {
                disk,
                table: parse_table(&table)?,
                fs,
                label,
                quick: !full,
                assign: letter,
            });
            let executor = build_executor(None)?;
            preview_confirm_execute(&executor, &plan, snapshot, yes).await?;
        }

        Commands::Rollback { disk } => {
            let executor = build_executor(None)?;
            let cancel = cancel_on_ctrl_c();
            if executor.rollback(disk, &cancel).await? {
                println!("Disk {disk} restored from its latest snapshot.");
            } else {
                println!("No snapshot found for disk {disk}.");
            }
        }

        Commands::Erase { disk, mode, report_dir, yes } => {
            let mode = parse_mode(&mode)?;
            let guard = HostSafetyGuard::new();
            // The sanitize engine itself does not enforce the system-disk
            // guard; that is this caller's job, before execute.
            if guard.is_system_disk(disk).await? {
                bail!("disk {disk} hosts the running system; refusing to erase");
            }
            let engine = SanitizeEngine::new(
                Arc::new(DiskpartRunner::locate()?),
                Arc::new(ShellCommandRunner),
                None,
                DeviceLocks::new(),
                Arc::new(TracingSink),
            );
            let check = engine.precheck(disk as i64, mode);
            print_precheck(&check);
            if !check.ok {
                bail!("sanitize precheck failed: {}", check.message);
            }
            if !confirm_or_abort(yes, &format!("ALL DATA on disk {disk}"))? {
                return Ok(());
            }
            if !require_privilege(&guard, "sanitize").await? {
                return Ok(());
            }
            let cancel = cancel_on_ctrl_c();
            match engine.execute(disk, mode, Some(progress_printer()), &cancel).await {
                Ok(_) => {}
                Err(ForgeError::Canceled) => {
                    println!("Canceled; device state is undefined.");
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            }
            let verify = engine.verify(disk, mode).await;
            println!(
                "Verification: {} ({})",
                if verify.ok { "pass" } else { "FLAGGED" },
                verify.details
            );
            let out_dir = report_dir.unwrap_or_else(|| PathBuf::from("."));
            match engine.report(&engine.build_report(mode, &verify), &out_dir) {
                Ok(paths) => println!(
                    "Report written: {} / {}",
                    paths.pdf.display(),
                    paths.csv.display()
                ),
                // The erase already succeeded; a report failure is logged,
                // not escalated.
                Err(e) => tracing::warn!("report write failed: {e}"),
            }
        }

        Commands::Format { letter, fs, label, full, yes } => {
            let guard = HostSafetyGuard::new();
            if guard.is_system_volume(letter) {
                bail!("{letter}: is the system volume; refusing to format");
            }
            if !confirm_or_abort(yes, &format!("volume {letter}:"))? {
                return Ok(());
            }
            if !require_privilege(&guard, "format").await? {
                return Ok(());
            }
            let formatter =
                VolumeFormatter::new(Arc::new(ShellCommandRunner), Arc::new(TracingSink));
            let cancel = cancel_on_ctrl_c();
            match formatter
                .format_volume(letter, &fs, label.as_deref(), !full, Some(progress_printer()), &cancel)
                .await
            {
                Ok(_) => println!("Volume {letter}: formatted."),
                Err(ForgeError::Canceled) => println!("Canceled."),
                Err(e) => return Err(e.into()),
            }
        }

        Commands::Watch => {
            let catalog: Arc<dyn DeviceCatalog> = Arc::new(PlatformCatalog);
            let monitor = DeviceMonitor::new(
                catalog.clone(),
                Arc::new(CatalogDiffSource::new(catalog, Duration::from_secs(2))),
                Arc::new(HostPowerProbe),
                Arc::new(HostSessionProbe),
                Arc::new(TracingSink),
                MonitorConfig::default(),
            );
            monitor.start().await?;
            println!("Monitoring removable volumes; Ctrl+C to stop.");
            tokio::signal::ctrl_c().await?;
            monitor.stop().await;
            println!("Stopped.");
        }
    }

    Ok(())
}
