use diskforge_core::{CommandRunner, EventSink, ForgeError, ProgressFn, StageEvent};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Formats a mounted volume by drive letter through a single parameterized
/// command of the external shell utility. Progress while waiting for the
/// child is synthetic; the tool reports none of its own.
pub struct VolumeFormatter {
    runner: Arc<dyn CommandRunner>,
    sink: Arc<dyn EventSink>,
}

impl VolumeFormatter {
    pub fn new(runner: Arc<dyn CommandRunner>, sink: Arc<dyn EventSink>) -> Self {
        VolumeFormatter { runner, sink }
    }

    fn format_command(
        letter: char,
        fs: &str,
        label: Option<&str>,
        quick: bool,
    ) -> (String, Vec<String>) {
        let mut command = format!("Format-Volume -DriveLetter {letter} -FileSystem {fs}");
        if let Some(label) = label {
            command.push_str(&format!(" -NewFileSystemLabel '{label}'"));
        }
        if !quick {
            command.push_str(" -Full");
        }
        command.push_str(" -Confirm:$false");
        (
            "powershell".to_string(),
            vec!["-NoProfile".to_string(), "-Command".to_string(), command],
        )
    }

    pub async fn format_volume(
        &self,
        letter: char,
        fs: &str,
        label: Option<&str>,
        quick: bool,
        progress: Option<ProgressFn>,
        cancel: &CancellationToken,
    ) -> Result<bool, ForgeError> {
        let report_pct = |pct: u8| {
            if let Some(f) = &progress {
                f(pct);
            }
        };
        self.sink.emit(StageEvent::new(
            "format-started",
            serde_json::json!({ "letter": letter, "fs": fs, "quick": quick }),
        ));
        report_pct(0);

        let (program, args) = Self::format_command(letter, fs, label, quick);
        let run = self.runner.run_command(&program, &args, cancel);
        tokio::pin!(run);

        let mut pct = 5u8;
        report_pct(pct);
        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        ticker.tick().await;
        let outcome = loop {
            tokio::select! {
                result = &mut run => break result,
                _ = ticker.tick() => {
                    if pct < 95 {
                        pct += 5;
                        report_pct(pct);
                    }
                }
            }
        };

        match outcome {
            Ok(_) => {
                report_pct(100);
                self.sink.emit(StageEvent::new(
                    "format-completed",
                    serde_json::json!({ "letter": letter }),
                ));
                Ok(true)
            }
            Err(ForgeError::Canceled) => {
                self.sink.emit(StageEvent::new(
                    "canceled",
                    serde_json::json!({ "stage": "format", "letter": letter }),
                ));
                Err(ForgeError::Canceled)
            }
            Err(e) => {
                self.sink.emit(StageEvent::new(
                    "format-failed",
                    serde_json::json!({ "letter": letter, "detail": e.to_string() }),
                ));
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use diskforge_core::test_utils::{MockCommandRunner, RecordingSink};

    #[tokio::test]
    async fn format_builds_a_single_parameterized_command() {
        let runner = Arc::new(MockCommandRunner::default());
        let formatter = VolumeFormatter::new(runner.clone(), Arc::new(RecordingSink::default()));
        let done = formatter
            .format_volume('E', "exFAT", Some("USB"), true, None, &CancellationToken::new())
            .await
            .unwrap();
        assert!(done);

        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        let (program, args) = &calls[0];
        assert_eq!(program, "powershell");
        let command = args.last().unwrap();
        assert!(command.contains("Format-Volume -DriveLetter E -FileSystem exFAT"));
        assert!(command.contains("-NewFileSystemLabel 'USB'"));
        assert!(!command.contains("-Full"));
    }

    #[tokio::test]
    async fn canceled_format_is_not_reported_as_failure() {
        let runner = Arc::new(MockCommandRunner::hanging());
        let sink = Arc::new(RecordingSink::default());
        let formatter = VolumeFormatter::new(runner, sink.clone());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = formatter
            .format_volume('E', "ntfs", None, true, None, &cancel)
            .await
            .expect_err("canceled");
        assert!(err.is_canceled());
        assert!(sink.kinds().contains(&"canceled"));
        assert!(!sink.kinds().contains(&"format-failed"));
    }
}
