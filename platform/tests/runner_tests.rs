//! Integration tests for the external-process runners, using stock shell
//! utilities so no disk is ever touched.

#![cfg(unix)]

use diskforge_core::{CommandRunner, ForgeError, ScriptRunner};
use diskforge_platform::{DiskpartRunner, ShellCommandRunner};
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn successful_command_reports_exit_zero() {
    let runner = ShellCommandRunner;
    let out = runner
        .run_command("true", &[], &CancellationToken::new())
        .await
        .expect("true should succeed");
    assert!(out.success());
}

#[tokio::test]
async fn failing_command_surfaces_external_error() {
    let runner = ShellCommandRunner;
    let err = runner
        .run_command("false", &[], &CancellationToken::new())
        .await
        .expect_err("false should fail");
    assert!(matches!(err, ForgeError::External { .. }));
}

#[tokio::test]
async fn missing_tool_is_reported_before_spawn() {
    let runner = ShellCommandRunner;
    let err = runner
        .run_command("diskforge-no-such-tool", &[], &CancellationToken::new())
        .await
        .expect_err("unknown tool should be rejected");
    assert!(matches!(err, ForgeError::ToolMissing(_)));
}

#[tokio::test]
async fn script_runner_hands_its_temp_script_to_the_tool() {
    // "true" ignores the /s argument and exits zero, which is all the
    // runner contract needs here.
    let runner = DiskpartRunner::with_tool("true");
    let out = runner
        .run_script("select disk 0\nexit\n", &CancellationToken::new())
        .await
        .expect("script run should succeed");
    assert!(out.success());
    assert_eq!(runner.tool_name(), "true");
}

#[tokio::test]
async fn cancellation_kills_the_child_and_is_not_a_failure() {
    let runner = ShellCommandRunner;
    let cancel = CancellationToken::new();
    let handle = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            runner
                .run_command("sleep", &["30".to_string()], &cancel)
                .await
        })
    };
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    cancel.cancel();
    let result = handle.await.expect("task should join");
    let err = result.expect_err("canceled run should not succeed");
    assert!(err.is_canceled());
}
