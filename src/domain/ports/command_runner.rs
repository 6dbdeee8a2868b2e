//! Port interface for the streaming shell command executor.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::domain::models::Entity;

/// The terminal result of one command's execution.
#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: i32,
    pub truncated: String,
    pub entities: Vec<Entity>,
    pub err: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl CommandResult {
    pub fn duration_ms(&self) -> u64 {
        (self.finished_at - self.started_at)
            .num_milliseconds()
            .max(0) as u64
    }
}

#[derive(Debug, Clone, Error)]
pub enum RunnerError {
    #[error("failed to dispatch command: {0}")]
    DispatchFailed(String),
}

/// A streaming command runner with cancellation and an approval gate.
///
/// `run` may report that a command needs human approval before it is
/// allowed to execute; `force_run` bypasses that gate (used once approval
/// has been granted, or when the runner is in auto-approve mode).
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Returns `(needs_approval, lines, result)`. When `needs_approval` is
    /// `true`, `lines`/`result` belong to a command that has NOT been
    /// started; the caller must escalate to a `Proposal` instead of
    /// reading them.
    async fn run(
        &self,
        ctx: CancellationToken,
        command: &str,
    ) -> Result<(bool, mpsc::Receiver<String>, oneshot::Receiver<CommandResult>), RunnerError>;

    /// Execute unconditionally, bypassing the approval gate.
    async fn force_run(
        &self,
        ctx: CancellationToken,
        command: &str,
    ) -> (mpsc::Receiver<String>, oneshot::Receiver<CommandResult>);

    /// Whether proposals should be executed immediately instead of
    /// blocking on the approval channel.
    fn auto_approve(&self) -> bool;
}
