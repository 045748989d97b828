// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Worker process driver.
//!
//! Spawns one worker process per invocation, streams its stdout events
//! into an [`InvocationResult`], and owns termination: on cancellation
//! the worker gets SIGTERM, a grace period, then SIGKILL.
//!
//! Task text, model, and tool names are passed as discrete argv tokens
//! so no caller-supplied text ever reaches a shell.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::WorkerCommand;
use crate::error::DriverError;
use crate::profile::WorkerProfile;
use crate::session::SessionLease;
use crate::types::RunState;

use super::events::{fold_event, parse_line};
use super::types::{InvocationResult, ProgressEvent, ProgressFn};

/// A session attached to one invocation.
pub struct SessionBinding {
    pub lease: SessionLease,
    /// Whether the worker resumes prior history or starts fresh.
    pub resumed: bool,
}

/// Launches worker processes and folds their event streams.
pub struct WorkerDriver {
    command: WorkerCommand,
}

impl WorkerDriver {
    pub fn new(command: WorkerCommand) -> Self {
        Self { command }
    }

    /// Run one worker invocation to completion or cancellation.
    ///
    /// Returns `Err(DriverError::Aborted)` when `cancel` fires; any
    /// attached session is poisoned in that case, since a terminated
    /// worker may have left a half-written transcript.
    pub async fn run(
        &self,
        profile: Arc<WorkerProfile>,
        task: &str,
        cwd: &Path,
        mut session: Option<SessionBinding>,
        cancel: CancellationToken,
        progress: Option<ProgressFn>,
    ) -> Result<InvocationResult, DriverError> {
        let mut result = InvocationResult::pending(&profile, task);
        if let Some(binding) = &session {
            result.session_id = Some(binding.lease.id().to_string());
        }

        let mut instructions = InstructionsFile::write(&profile)?;
        let args = build_args(&profile, task, instructions.as_ref(), session.as_ref());
        // Session-bound instructions become a scratch file of the
        // session, so resumptions and eviction share its lifetime.
        if let (Some(file), Some(binding)) = (instructions.as_mut(), session.as_ref()) {
            binding.lease.add_scratch(file.transfer());
        }

        let mut command = Command::new(&self.command.program);
        command
            .args(&self.command.args)
            .args(&args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(agent = %profile.name, program = %self.command.program, "spawning worker");
        let mut child = command
            .spawn()
            .map_err(|err| DriverError::Spawn(format!("{}: {err}", self.command.program)))?;

        let stdout = child.stdout.take().ok_or_else(|| {
            DriverError::Spawn("worker stdout was not captured".to_string())
        })?;
        let stderr = child.stderr.take();
        let stderr_task = tokio::spawn(async move {
            let mut buffer = String::new();
            if let Some(mut stderr) = stderr {
                let _ = stderr.read_to_string(&mut buffer).await;
            }
            buffer
        });

        let mut lines = BufReader::new(stdout).lines();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    self.terminate(&mut child, &profile.name).await;
                    if let Some(binding) = &mut session {
                        binding.lease.poison();
                    }
                    stderr_task.abort();
                    return Err(DriverError::Aborted);
                }
                line = lines.next_line() => {
                    match line? {
                        Some(line) => {
                            if let Some(event) = parse_line(&line) {
                                fold_event(&mut result, event);
                                if let Some(progress) = &progress {
                                    progress(ProgressEvent::from_result(&result));
                                }
                            }
                        }
                        None => break,
                    }
                }
            }
        }

        // Stream closed; wait for exit, still honoring cancellation.
        let status = tokio::select! {
            _ = cancel.cancelled() => {
                self.terminate(&mut child, &profile.name).await;
                if let Some(binding) = &mut session {
                    binding.lease.poison();
                }
                stderr_task.abort();
                return Err(DriverError::Aborted);
            }
            status = child.wait() => status?,
        };

        result.completed = true;
        result.exit_code = status.code();
        if status.success() {
            result.state = RunState::Ok;
        } else {
            result.state = RunState::Error;
            let stderr = stderr_task.await.unwrap_or_default();
            let stderr = stderr.trim();
            result.error = Some(match (status.code(), stderr.is_empty()) {
                (Some(code), false) => format!("worker exited with code {code}: {stderr}"),
                (Some(code), true) => format!("worker exited with code {code}"),
                (None, false) => format!("worker killed by signal: {stderr}"),
                (None, true) => "worker killed by signal".to_string(),
            });
        }

        // Releases the lease, marking the session idle again.
        drop(session);
        Ok(result)
    }

    /// SIGTERM, grace period, SIGKILL.
    async fn terminate(&self, child: &mut Child, agent: &str) {
        #[cfg(unix)]
        if let Some(pid) = child.id() {
            debug!(agent, pid, "sending SIGTERM to worker");
            unsafe {
                libc::kill(pid as libc::pid_t, libc::SIGTERM);
            }
            let grace = Duration::from_millis(self.command.grace_ms);
            if tokio::time::timeout(grace, child.wait()).await.is_ok() {
                return;
            }
            warn!(agent, pid, "worker ignored SIGTERM, killing");
        }
        if let Err(err) = child.kill().await {
            warn!(agent, %err, "failed to kill worker");
        }
    }
}

/// Build the protocol arguments for one invocation.
fn build_args(
    profile: &WorkerProfile,
    task: &str,
    instructions: Option<&InstructionsFile>,
    session: Option<&SessionBinding>,
) -> Vec<String> {
    let mut args = vec![
        "--output-format".to_string(),
        "stream-json".to_string(),
        "--task".to_string(),
        task.to_string(),
    ];
    if let Some(model) = &profile.model {
        args.push("--model".to_string());
        args.push(model.clone());
    }
    if !profile.tools.is_empty() {
        args.push("--allowed-tools".to_string());
        args.push(profile.tools.join(","));
    }
    if let Some(effort) = profile.effort {
        args.push("--effort".to_string());
        args.push(effort.as_str().to_string());
    }
    if let Some(instructions) = instructions {
        args.push("--instructions-file".to_string());
        args.push(instructions.path.display().to_string());
    }
    if let Some(binding) = session {
        if binding.resumed {
            args.push("--resume".to_string());
        } else {
            args.push("--session-id".to_string());
        }
        args.push(binding.lease.id().to_string());
        args.push("--transcript".to_string());
        args.push(binding.lease.transcript().display().to_string());
    }
    args
}

/// Profile instructions written to a temp file for the worker,
/// removed when the invocation finishes unless transferred to a
/// session.
struct InstructionsFile {
    path: PathBuf,
    transferred: bool,
}

impl InstructionsFile {
    fn write(profile: &WorkerProfile) -> Result<Option<Self>, DriverError> {
        if profile.instructions.is_empty() {
            return Ok(None);
        }
        let path = std::env::temp_dir().join(format!(
            "foreman-instructions-{}-{}.md",
            profile.name,
            uuid::Uuid::new_v4()
        ));
        std::fs::write(&path, &profile.instructions)?;
        Ok(Some(Self {
            path,
            transferred: false,
        }))
    }

    /// Hand the file over to another owner; `Drop` no longer removes it.
    fn transfer(&mut self) -> PathBuf {
        self.transferred = true;
        self.path.clone()
    }
}

impl Drop for InstructionsFile {
    fn drop(&mut self) {
        if !self.transferred {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}
