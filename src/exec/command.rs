// src/exec/command.rs

//! Shell command units.
//!
//! A command runs under the platform shell, receives its payload as JSON on
//! stdin, and reports its stdout as the unit's value.

use std::process::Stdio;

use anyhow::{bail, Context};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::errors::TaskError;
use crate::future::Outcome;

/// Run `cmd` for `task` with `payload` on stdin.
///
/// Stdout is parsed as JSON; if that fails the trimmed text is used as a JSON
/// string. A non-zero exit or a spawn error is a [`TaskError::Failed`].
pub async fn run_command(task: &str, cmd: &str, payload: &Value) -> Outcome {
    match run_command_inner(task, cmd, payload).await {
        Ok(value) => Ok(value),
        Err(err) => {
            warn!(task = %task, error = %format!("{err:#}"), "command failed");
            Err(TaskError::failed(format!("{err:#}")))
        }
    }
}

fn shell(cmd: &str) -> Command {
    if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(cmd);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(cmd);
        c
    }
}

async fn run_command_inner(task: &str, cmd: &str, payload: &Value) -> anyhow::Result<Value> {
    info!(task = %task, cmd = %cmd, "starting command");

    let mut command = shell(cmd);
    command
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command
        .spawn()
        .with_context(|| format!("spawning process for task '{task}'"))?;

    // Feed stdin alongside the stdout read; a filter blocks on a full stdout
    // pipe before it finishes reading its input.
    let stdin_task = match child.stdin.take() {
        Some(mut stdin) => {
            let body = serde_json::to_vec(payload).context("encoding payload as JSON")?;
            let task = task.to_string();
            Some(tokio::spawn(async move {
                // A command that ignores stdin may exit before reading it.
                if let Err(err) = stdin.write_all(&body).await {
                    debug!(task = %task, error = %err, "could not write payload to stdin");
                }
            }))
        }
        None => None,
    };

    // Always consume stderr so buffers don't fill; log at debug.
    let stderr_task = child.stderr.take().map(|stderr| {
        let task = task.to_string();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(task = %task, "stderr: {}", line);
            }
        })
    });

    let mut stdout = String::new();
    if let Some(mut out) = child.stdout.take() {
        out.read_to_string(&mut stdout)
            .await
            .with_context(|| format!("reading stdout of task '{task}'"))?;
    }

    let status = child
        .wait()
        .await
        .with_context(|| format!("waiting for process of task '{task}'"))?;

    if let Some(handle) = stdin_task {
        let _ = handle.await;
    }
    if let Some(handle) = stderr_task {
        let _ = handle.await;
    }

    let code = status.code().unwrap_or(-1);
    info!(task = %task, exit_code = code, success = status.success(), "command exited");

    if !status.success() {
        bail!("command `{cmd}` exited with status {code}");
    }
    Ok(parse_stdout(&stdout))
}

/// JSON if stdout parses as JSON, otherwise the trimmed text.
pub fn parse_stdout(stdout: &str) -> Value {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Value::Null;
    }
    serde_json::from_str(trimmed).unwrap_or_else(|_| Value::String(trimmed.to_string()))
}
