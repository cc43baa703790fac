//! Subprocess gateway: the only place in this crate that execs an external
//! program. Supports both "capture the full output" and "stream stdout
//! line-by-line while the process runs" flavors, the latter spawned as a
//! background task so a long-running build never blocks on a full pipe
//! buffer.

use std::process::Stdio;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use crate::error::ToolError;

/// Output captured from a completed subprocess.
pub struct Captured {
    pub status_success: bool,
    pub stdout: Vec<u8>,
}

/// Spawn `program` with `args`, wait for completion, and return the exit
/// status plus the full captured stdout. Does not stream logs.
pub async fn run_captured(program: &str, args: &[&str]) -> Result<Captured> {
    let output = Command::new(program)
        .args(args)
        .env_clear()
        .envs(std::env::vars())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .context(format!("Failed to spawn '{program}'"))?;

    Ok(Captured {
        status_success: output.status.success(),
        stdout: output.stdout,
    })
}

/// Spawn `program` with `args`, forwarding stdout line-by-line through
/// `tracing` as the process runs, and fail if the exit status is non-zero.
pub async fn run_streamed(program: &str, args: &[&str]) -> Result<()> {
    let mut child = Command::new(program)
        .args(args)
        .env_clear()
        .envs(std::env::vars())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .context(format!("Failed to spawn '{program}'"))?;

    let stdout = child.stdout.take().expect("stdout was piped");
    let stderr = child.stderr.take().expect("stderr was piped");

    let program_name = program.to_string();
    let stdout_task = tokio::spawn(stream_lines(stdout, program_name.clone()));
    let stderr_task = tokio::spawn(stream_lines(stderr, program_name.clone()));

    let status = child
        .wait()
        .await
        .context(format!("Failed to wait on '{program}'"))?;
    let _ = stdout_task.await;
    let _ = stderr_task.await;

    if !status.success() {
        return Err(ToolError {
            program: program.to_string(),
            detail: format!("exited with {status}"),
        }
        .into());
    }

    Ok(())
}

async fn stream_lines(reader: impl tokio::io::AsyncRead + Unpin, program: String) {
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => tracing::info!(program = %program, "{line}"),
            Ok(None) => break,
            Err(err) => {
                tracing::warn!(program = %program, error = %err, "Failed to read subprocess output");
                break;
            }
        }
    }
}

/// Run `program` with `args` expecting a zero exit; fail otherwise
/// (the "fire and capture" flavor used by the network and container
/// managers for short-lived commands).
pub async fn run_expect_success(program: &str, args: &[&str]) -> Result<Captured> {
    let captured = run_captured(program, args).await?;
    if !captured.status_success {
        return Err(ToolError {
            program: program.to_string(),
            detail: "non-zero exit".to_string(),
        }
        .into());
    }
    Ok(captured)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn captures_stdout() {
        let captured = run_captured("echo", &["hello"]).await.unwrap();
        assert!(captured.status_success);
        assert_eq!(String::from_utf8_lossy(&captured.stdout).trim(), "hello");
    }

    #[tokio::test]
    async fn reports_non_zero_exit() {
        let result = run_expect_success("false", &[]).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn streams_without_error_on_success() {
        run_streamed("true", &[]).await.unwrap();
    }
}
