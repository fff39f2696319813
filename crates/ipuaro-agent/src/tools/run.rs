//! Run tools: shell commands and test runs through the safety layer.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;

use crate::safety::{CommandClass, classify_command};
use crate::tools::{ParamType, Tool, ToolCategory, ToolCtx, ToolError, ToolParam};

pub fn tools() -> Vec<Arc<dyn Tool>> {
    vec![Arc::new(RunCommand), Arc::new(RunTests)]
}

const MAX_CAPTURED_BYTES: usize = 16 * 1024;

fn capped(raw: Vec<u8>) -> String {
    let mut text = String::from_utf8_lossy(&raw).into_owned();
    if text.len() > MAX_CAPTURED_BYTES {
        text.truncate(MAX_CAPTURED_BYTES);
        text.push_str("\n…(output truncated)");
    }
    text
}

/// Classify, gate, spawn and await a shell command.
///
/// Deny-listed commands are refused before any process exists. Cancellation
/// sends SIGTERM, waits a short grace period, then SIGKILLs; `kill_on_drop`
/// backstops the case where the whole future is dropped.
async fn exec_shell(ctx: &ToolCtx, command: &str) -> Result<Value, ToolError> {
    match classify_command(command) {
        CommandClass::Blocked => {
            return Err(ToolError::CommandBlocked(command.to_string()));
        }
        CommandClass::Safe => {}
        CommandClass::NeedsConfirmation => {
            if !ctx.request_confirmation(&format!("run: {command}")).await {
                return Err(ToolError::Cancelled);
            }
        }
    }

    let mut child = Command::new("sh")
        .args(["-lc", command])
        .current_dir(&ctx.root)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| ToolError::Internal(format!("spawn failed: {e}")))?;

    let pid = child.id();
    let cancel = ctx.cancel.clone();

    tokio::select! {
        output = child.wait_with_output() => {
            let output = output
                .map_err(|e| ToolError::Internal(format!("command failed: {e}")))?;
            Ok(json!({
                "command": command,
                "exit_code": output.status.code().unwrap_or(-1),
                "stdout": capped(output.stdout),
                "stderr": capped(output.stderr),
            }))
        }
        _ = cancel.cancelled() => {
            terminate(pid).await;
            Err(ToolError::Cancelled)
        }
    }
}

/// SIGTERM, then SIGKILL after a grace period. Best effort on platforms
/// without signals; dropping the child (kill_on_drop) is the final word.
#[cfg(unix)]
async fn terminate(pid: Option<u32>) {
    let Some(pid) = pid else { return };
    unsafe {
        libc::kill(pid as i32, libc::SIGTERM);
    }
    tokio::time::sleep(Duration::from_secs(2)).await;
    unsafe {
        libc::kill(pid as i32, libc::SIGKILL);
    }
}

#[cfg(not(unix))]
async fn terminate(_pid: Option<u32>) {}

pub struct RunCommand;

#[async_trait]
impl Tool for RunCommand {
    fn name(&self) -> &'static str {
        "run_command"
    }

    fn description(&self) -> &'static str {
        "Run a shell command in the project root. Safe commands skip confirmation; dangerous ones are refused."
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Run
    }

    fn requires_confirmation(&self) -> bool {
        true
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(30)
    }

    fn parameters(&self) -> &'static [ToolParam] {
        const PARAMS: &[ToolParam] =
            &[ToolParam::required("command", ParamType::String, "Shell command line")];
        PARAMS
    }

    async fn execute(&self, params: &Value, ctx: &ToolCtx) -> Result<Value, ToolError> {
        let command = params["command"].as_str().unwrap_or_default();
        exec_shell(ctx, command).await
    }
}

/// Characters that would let a test pattern escape its argument position;
/// the pattern is interpolated into a shell line verbatim.
const SHELL_METACHARACTERS: &[char] = &[
    '|', '&', ';', '$', '`', '<', '>', '(', ')', '\'', '"', '\\', '\n',
];

pub(crate) fn validate_pattern(pattern: &str) -> Result<(), ToolError> {
    if pattern.contains(SHELL_METACHARACTERS) {
        return Err(ToolError::Validation(format!(
            "pattern '{pattern}' contains shell metacharacters"
        )));
    }
    Ok(())
}

pub(crate) fn test_command(pattern: Option<&str>) -> String {
    match pattern {
        Some(p) if !p.trim().is_empty() => format!("npm test -- {}", p.trim()),
        _ => "npm test".to_string(),
    }
}

pub struct RunTests;

#[async_trait]
impl Tool for RunTests {
    fn name(&self) -> &'static str {
        "run_tests"
    }

    fn description(&self) -> &'static str {
        "Run the project's test suite, optionally restricted to a pattern."
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Run
    }

    fn requires_confirmation(&self) -> bool {
        true
    }

    fn timeout(&self) -> Duration {
        // Test suites get four times the budget of a plain command.
        Duration::from_secs(120)
    }

    fn parameters(&self) -> &'static [ToolParam] {
        const PARAMS: &[ToolParam] =
            &[ToolParam::optional("pattern", ParamType::String, "Test name or path filter")];
        PARAMS
    }

    async fn execute(&self, params: &Value, ctx: &ToolCtx) -> Result<Value, ToolError> {
        let pattern = params["pattern"].as_str();
        if let Some(p) = pattern {
            validate_pattern(p)?;
        }
        exec_shell(ctx, &test_command(pattern)).await
    }
}
