//! Engine and player subprocesses.
//!
//! Commands are built argument by argument with `tokio::process::Command`;
//! text is passed as a single argument or on stdin, never through a shell.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use skald_plugin::PluginError;

/// Upper bound for one synthesis or playback run.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Stderr kept in error messages.
const MAX_STDERR_CHARS: usize = 400;

/// First of `candidates` found on `PATH`.
pub fn find_binary(candidates: &[&str]) -> Option<PathBuf> {
    candidates.iter().find_map(|name| which::which(name).ok())
}

/// Run `program` to completion and return its output.
///
/// A non-zero exit is [`PluginError::ExecutionFailed`] carrying stderr.
pub async fn run(
    program: &Path,
    args: &[OsString],
    stdin: Option<&str>,
) -> Result<Output, PluginError> {
    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    debug!(program = %program.display(), args = args.len(), "spawning");
    let mut child = cmd.spawn().map_err(|e| {
        PluginError::ExecutionFailed(format!("failed to spawn {}: {e}", program.display()))
    })?;

    if let (Some(text), Some(mut pipe)) = (stdin, child.stdin.take()) {
        pipe.write_all(text.as_bytes()).await?;
        // Close stdin so the engine sees end of input.
        drop(pipe);
    }

    let output = tokio::time::timeout(DEFAULT_TIMEOUT, child.wait_with_output())
        .await
        .map_err(|_| {
            PluginError::ExecutionFailed(format!(
                "{} timed out after {}s",
                program.display(),
                DEFAULT_TIMEOUT.as_secs()
            ))
        })??;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stderr: String = stderr.trim().chars().take(MAX_STDERR_CHARS).collect();
        warn!(program = %program.display(), status = %output.status, "subprocess failed");
        return Err(PluginError::ExecutionFailed(format!(
            "{} exited with {}: {stderr}",
            program.display(),
            output.status
        )));
    }
    Ok(output)
}
