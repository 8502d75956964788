//! Local shell command actions.
//!
//! The outcome follows the shell's exit status. Output is read concurrently
//! and collected until both pipes close, or for a short grace period after
//! the shell exits, so a background child holding the pipes open does not
//! delay the result.

use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{ChildStderr, ChildStdout, Command};
use tracing::{debug, info};

use super::{ExecutionResult, LocalAction};
use crate::matcher::CaptureMap;
use crate::template;

/// How long output is still collected once the shell has exited.
const OUTPUT_GRACE: Duration = Duration::from_millis(250);

enum Completion {
    Exited(ExitStatus),
    WaitFailed(std::io::Error),
    TimedOut,
}

/// Render and run a local action, killing it if it outlives `timeout`.
pub async fn run(action: &LocalAction, captures: &CaptureMap, timeout: Duration) -> ExecutionResult {
    let command = match template::render(&action.run_template, captures) {
        Ok(command) => command,
        Err(e) => return ExecutionResult::template_failure(&e),
    };

    info!("running action");
    debug!(command = %command, "command rendered");

    let child = shell(&command)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn();
    let mut child = match child {
        Ok(child) => child,
        Err(e) => return ExecutionResult::runtime_failure("", format!("failed to start shell: {e}")),
    };

    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let completion = {
        let drain = drain_output(child.stdout.take(), child.stderr.take(), &mut stdout, &mut stderr);
        tokio::pin!(drain);
        let mut drained = false;

        let waited = tokio::time::timeout(timeout, async {
            tokio::select! {
                status = child.wait() => status,
                () = &mut drain => {
                    drained = true;
                    child.wait().await
                }
            }
        })
        .await;

        match waited {
            Ok(Ok(status)) => {
                if !drained && tokio::time::timeout(OUTPUT_GRACE, &mut drain).await.is_err() {
                    debug!("output pipes still open after exit, keeping output read so far");
                }
                Completion::Exited(status)
            }
            Ok(Err(e)) => Completion::WaitFailed(e),
            Err(_) => {
                if let Err(e) = child.start_kill() {
                    debug!(error = %e, "failed to kill timed out command");
                }
                Completion::TimedOut
            }
        }
    };

    let combined = combined_output(&stdout, &stderr);
    match completion {
        Completion::Exited(status) if status.success() => ExecutionResult::completed(&combined),
        Completion::Exited(status) => ExecutionResult::runtime_failure(&combined, status.to_string()),
        Completion::WaitFailed(e) => {
            ExecutionResult::runtime_failure(&combined, format!("failed to wait for command: {e}"))
        }
        Completion::TimedOut => {
            ExecutionResult::runtime_failure(&combined, format!("command timed out after {timeout:?}"))
        }
    }
}

async fn drain_output(
    stdout: Option<ChildStdout>,
    stderr: Option<ChildStderr>,
    stdout_buf: &mut Vec<u8>,
    stderr_buf: &mut Vec<u8>,
) {
    tokio::join!(read_stream(stdout, stdout_buf), read_stream(stderr, stderr_buf));
}

/// Append everything readable from `stream` to `buf`. Data read before a
/// cancellation stays in `buf`.
async fn read_stream<R: AsyncRead + Unpin>(stream: Option<R>, buf: &mut Vec<u8>) {
    let Some(mut stream) = stream else {
        return;
    };
    let mut chunk = [0_u8; 8192];
    loop {
        match stream.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => buf.extend_from_slice(chunk.get(..n).unwrap_or_default()),
            Err(e) => {
                debug!(error = %e, "failed to read command output");
                break;
            }
        }
    }
}

#[cfg(unix)]
fn shell(command: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    cmd
}

#[cfg(windows)]
fn shell(command: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(command);
    cmd
}

/// Stdout followed by stderr, separated by a newline when both are non-empty.
fn combined_output(stdout: &[u8], stderr: &[u8]) -> String {
    let stdout = String::from_utf8_lossy(stdout);
    let stderr = String::from_utf8_lossy(stderr);
    if stdout.is_empty() {
        return stderr.into_owned();
    }
    if stderr.is_empty() {
        return stdout.into_owned();
    }
    format!("{stdout}\n{stderr}")
}
