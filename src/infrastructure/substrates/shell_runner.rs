//! A `CommandRunner` that executes commands through `sh -c`, streaming
//! output line-by-line and honoring cancellation.

use std::process::Stdio;

use async_trait::async_trait;
use chrono::Utc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::domain::models::Entity;
use crate::domain::ports::{CommandResult, CommandRunner, RunnerError};

const OUTPUT_CHANNEL_CAPACITY: usize = 256;

/// Runs commands via the host shell. `auto_approve` decides whether `run`
/// executes immediately or reports that a proposal is needed.
pub struct ShellCommandRunner {
    auto_approve: bool,
}

impl ShellCommandRunner {
    pub fn new(auto_approve: bool) -> Self {
        Self { auto_approve }
    }
}

#[async_trait]
impl CommandRunner for ShellCommandRunner {
    async fn run(
        &self,
        ctx: CancellationToken,
        command: &str,
    ) -> Result<(bool, mpsc::Receiver<String>, oneshot::Receiver<CommandResult>), RunnerError> {
        if self.auto_approve {
            let (lines, result) = self.force_run(ctx, command).await;
            Ok((false, lines, result))
        } else {
            let (_tx, lines) = mpsc::channel(1);
            let (_result_tx, result) = oneshot::channel();
            Ok((true, lines, result))
        }
    }

    async fn force_run(
        &self,
        ctx: CancellationToken,
        command: &str,
    ) -> (mpsc::Receiver<String>, oneshot::Receiver<CommandResult>) {
        let (lines_tx, lines_rx) = mpsc::channel(OUTPUT_CHANNEL_CAPACITY);
        let (result_tx, result_rx) = oneshot::channel();
        let command = command.to_string();

        tokio::spawn(async move {
            let started_at = Utc::now();
            let mut child = match Command::new("sh")
                .arg("-c")
                .arg(&command)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .spawn()
            {
                Ok(child) => child,
                Err(err) => {
                    warn!(%command, error = %err, "failed to spawn command");
                    let finished_at = Utc::now();
                    let _ = result_tx.send(CommandResult {
                        exit_code: -1,
                        truncated: String::new(),
                        entities: Vec::new(),
                        err: Some(err.to_string()),
                        started_at,
                        finished_at,
                    });
                    return;
                }
            };

            let stdout = child.stdout.take().expect("piped stdout");
            let stderr = child.stderr.take().expect("piped stderr");
            let mut stdout_lines = BufReader::new(stdout).lines();
            let mut stderr_lines = BufReader::new(stderr).lines();

            let mut collected = String::new();
            let exit_code;
            let mut err = None;

            loop {
                tokio::select! {
                    biased;
                    _ = ctx.cancelled() => {
                        info!(%command, "cancelling running command");
                        let _ = child.start_kill();
                        let _ = child.wait().await;
                        exit_code = -1;
                        err = Some("cancelled".to_string());
                        break;
                    }
                    line = stdout_lines.next_line() => {
                        match line {
                            Ok(Some(line)) => {
                                collected.push_str(&line);
                                collected.push('\n');
                                let _ = lines_tx.try_send(line);
                            }
                            Ok(None) => {}
                            Err(e) => warn!(%command, error = %e, "error reading stdout"),
                        }
                    }
                    line = stderr_lines.next_line() => {
                        match line {
                            Ok(Some(line)) => {
                                collected.push_str(&line);
                                collected.push('\n');
                                let _ = lines_tx.try_send(line);
                            }
                            Ok(None) => {}
                            Err(e) => warn!(%command, error = %e, "error reading stderr"),
                        }
                    }
                    status = child.wait() => {
                        exit_code = status.ok().and_then(|s| s.code()).unwrap_or(-1);
                        break;
                    }
                }
            }

            let finished_at = Utc::now();
            let _ = result_tx.send(CommandResult {
                exit_code,
                truncated: collected,
                entities: extract_entities(),
                err,
                started_at,
                finished_at,
            });
        });

        (lines_rx, result_rx)
    }

    fn auto_approve(&self) -> bool {
        self.auto_approve
    }
}

/// Generic entity extraction from raw tool output is domain-specific and
/// not implemented at this layer; callers rely on the parsers in
/// `infrastructure::parsers` instead.
fn extract_entities() -> Vec<Entity> {
    Vec::new()
}
