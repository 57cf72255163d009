use crate::error::ForgeError;
use tokio_util::sync::CancellationToken;

/// Captured output of one external tool invocation.
#[derive(Debug, Clone, Default)]
pub struct RunOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl RunOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Both streams, verbatim, for surfacing as error detail.
    pub fn combined(&self) -> String {
        let mut text = self.stdout.trim_end().to_string();
        if !self.stderr.trim().is_empty() {
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(self.stderr.trim_end());
        }
        text
    }
}

/// Runs a line-oriented script through the external disk-management utility
/// (temp file plus `diskpart /s <file>` on the host implementation).
/// Cancellation kills the child and yields [`ForgeError::Canceled`].
#[async_trait::async_trait]
pub trait ScriptRunner: Send + Sync {
    async fn run_script(
        &self,
        script: &str,
        cancel: &CancellationToken,
    ) -> Result<RunOutput, ForgeError>;

    /// Name of the backing tool, for error detail and events.
    fn tool_name(&self) -> &str;
}

/// Runs a single parameterized external command and waits for exit. Used
/// for the format-by-letter contract and the one-shot sanitize utilities.
#[async_trait::async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run_command(
        &self,
        program: &str,
        args: &[String],
        cancel: &CancellationToken,
    ) -> Result<RunOutput, ForgeError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combined_output_keeps_both_streams() {
        let out = RunOutput {
            exit_code: 1,
            stdout: "DiskPart has encountered an error.\n".to_string(),
            stderr: "Access is denied.\n".to_string(),
        };
        let combined = out.combined();
        assert!(combined.contains("DiskPart has encountered an error."));
        assert!(combined.contains("Access is denied."));
    }
}
