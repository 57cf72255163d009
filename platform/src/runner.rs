use diskforge_core::{CommandRunner, ForgeError, RunOutput, ScriptRunner};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

static SCRIPT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Spawns a child with captured output, killing it on cancellation.
async fn run_child(
    mut command: Command,
    tool: &str,
    cancel: &CancellationToken,
) -> Result<RunOutput, ForgeError> {
    command.stdout(Stdio::piped()).stderr(Stdio::piped());
    let mut child = command
        .spawn()
        .map_err(|e| ForgeError::external(tool, format!("failed to spawn: {e}")))?;

    let mut stdout_pipe = child.stdout.take();
    let mut stderr_pipe = child.stderr.take();
    let stdout_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(pipe) = stdout_pipe.as_mut() {
            let _ = pipe.read_to_end(&mut buf).await;
        }
        buf
    });
    let stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(pipe) = stderr_pipe.as_mut() {
            let _ = pipe.read_to_end(&mut buf).await;
        }
        buf
    });

    tokio::select! {
        _ = cancel.cancelled() => {
            let _ = child.start_kill();
            let _ = child.wait().await;
            stdout_task.abort();
            stderr_task.abort();
            log::info!("{} canceled, child killed", tool);
            Err(ForgeError::Canceled)
        }
        status = child.wait() => {
            let status = status?;
            let stdout = String::from_utf8_lossy(&stdout_task.await.unwrap_or_default()).into_owned();
            let stderr = String::from_utf8_lossy(&stderr_task.await.unwrap_or_default()).into_owned();
            Ok(RunOutput {
                exit_code: status.code().unwrap_or(-1),
                stdout,
                stderr,
            })
        }
    }
}

/// Runs disk scripts through the external disk-management utility:
/// the script goes to a temp file, the tool gets the file, both output
/// streams are captured and surfaced verbatim on failure.
pub struct DiskpartRunner {
    tool: PathBuf,
}

impl DiskpartRunner {
    /// Locates the utility on PATH before anything is spawned.
    ///
    /// Only the Windows utility accepts the emitted script grammar. The
    /// non-Windows lookup keeps tool checks and previews working on any
    /// host; executing against it surfaces the tool's own parse error as
    /// [`ForgeError::External`] without reaching a disk.
    pub fn locate() -> Result<Self, ForgeError> {
        let name = if cfg!(windows) { "diskpart" } else { "sfdisk" };
        let tool =
            which::which(name).map_err(|_| ForgeError::ToolMissing(name.to_string()))?;
        Ok(DiskpartRunner { tool })
    }

    /// Points the runner at an explicit tool, bypassing the PATH lookup.
    /// The caller owns making sure that tool speaks the script grammar.
    pub fn with_tool(tool: impl Into<PathBuf>) -> Self {
        DiskpartRunner { tool: tool.into() }
    }

    fn temp_script_path() -> PathBuf {
        let seq = SCRIPT_SEQ.fetch_add(1, Ordering::Relaxed);
        std::env::temp_dir().join(format!("diskforge-{}-{}.txt", std::process::id(), seq))
    }
}

#[async_trait::async_trait]
impl ScriptRunner for DiskpartRunner {
    async fn run_script(
        &self,
        script: &str,
        cancel: &CancellationToken,
    ) -> Result<RunOutput, ForgeError> {
        let path = Self::temp_script_path();
        tokio::fs::write(&path, script).await?;
        log::debug!("running {} script:\n{}", self.tool_name(), script);

        let mut command = Command::new(&self.tool);
        command.arg("/s").arg(&path);
        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            command.creation_flags(0x08000000);
        }
        let result = run_child(command, self.tool_name(), cancel).await;
        let _ = tokio::fs::remove_file(&path).await;

        let output = result?;
        if !output.success() {
            return Err(ForgeError::external(self.tool_name(), output.combined()));
        }
        Ok(output)
    }

    fn tool_name(&self) -> &str {
        self.tool
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("diskpart")
    }
}

/// Runs one parameterized external command and waits for it to exit.
/// Fronts the format-by-letter contract and the one-shot sanitize tools.
#[derive(Default)]
pub struct ShellCommandRunner;

impl ShellCommandRunner {
    /// Verifies the program exists before the caller commits to it.
    pub fn check_tool(program: &str) -> Result<PathBuf, ForgeError> {
        which::which(program).map_err(|_| ForgeError::ToolMissing(program.to_string()))
    }
}

#[async_trait::async_trait]
impl CommandRunner for ShellCommandRunner {
    async fn run_command(
        &self,
        program: &str,
        args: &[String],
        cancel: &CancellationToken,
    ) -> Result<RunOutput, ForgeError> {
        if Path::new(program).components().count() == 1 {
            Self::check_tool(program)?;
        }
        log::debug!("running {} {:?}", program, args);
        let mut command = Command::new(program);
        command.args(args);
        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            command.creation_flags(0x08000000);
        }
        let output = run_child(command, program, cancel).await?;
        if !output.success() {
            return Err(ForgeError::external(program, output.combined()));
        }
        Ok(output)
    }
}
