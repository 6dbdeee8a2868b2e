//! Shared sub-task registry. One `TaskManager` serves every `Loop` in a
//! `Team`, assigning monotonic task ids and fanning out `SmartSubAgent`
//! runs as detached tokio tasks.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{instrument, warn};

use crate::domain::models::{Entity, Event, ReconTree, SubTask, SubTaskMetadata, SubTaskStatus};
use crate::domain::ports::{Brain, CommandRunner};

/// Capacity of the non-blocking completion channel `SpawnTask` offers
/// finished ids to.
const COMPLETION_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Error)]
pub enum TaskManagerError {
    #[error("task {0} not found")]
    NotFound(String),

    #[error("sub-brain is not configured")]
    SubBrainNotConfigured,
}

/// A request to spawn a sub-task, carrying everything `SmartSubAgent`
/// needs to run independently of the parent `Loop`. `command` doubles as
/// the first-turn user message (the initial prompt); `runner`/`events`/
/// `recon_tree` are the issuing Loop's own collaborators, since the
/// `TaskManager` itself is host-agnostic.
pub struct SpawnRequest {
    pub goal: String,
    pub command: String,
    pub max_turns: u32,
    pub metadata: SubTaskMetadata,
    pub target_id: u64,
    pub host: String,
    pub runner: Arc<dyn CommandRunner>,
    pub events: mpsc::Sender<Event>,
    pub recon_tree: Option<Arc<ReconTree>>,
}

/// Shared registry of in-flight and completed sub-tasks, keyed by a
/// monotonically increasing `task-N` id.
pub struct TaskManager {
    next_id: AtomicU64,
    tasks: RwLock<HashMap<String, Arc<SubTask>>>,
    completed_tx: mpsc::Sender<String>,
    completed_rx: RwLock<mpsc::Receiver<String>>,
    sub_brain: Option<Arc<dyn Brain>>,
}

impl TaskManager {
    pub fn new(sub_brain: Option<Arc<dyn Brain>>) -> Self {
        let (completed_tx, completed_rx) = mpsc::channel(COMPLETION_CHANNEL_CAPACITY);
        Self {
            next_id: AtomicU64::new(1),
            tasks: RwLock::new(HashMap::new()),
            completed_tx,
            completed_rx: RwLock::new(completed_rx),
            sub_brain,
        }
    }

    fn allocate_id(&self) -> String {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        format!("task-{n}")
    }

    /// Assigns an id, stores the `SubTask`, and (if a sub-brain is
    /// configured) launches it as a detached task. Returns the id even on
    /// immediate failure so the caller can still inspect/report it.
    #[instrument(skip(self, ctx, request), fields(goal = %request.goal))]
    pub async fn spawn_task(
        &self,
        ctx: &CancellationToken,
        request: SpawnRequest,
    ) -> Result<String, TaskManagerError> {
        let id = self.allocate_id();
        let child_ctx = ctx.child_token();
        let task = Arc::new(SubTask::new(
            id.clone(),
            request.goal.clone(),
            request.command.clone(),
            request.max_turns,
            request.metadata,
            child_ctx.clone(),
        ));
        self.tasks.write().await.insert(id.clone(), task.clone());

        let Some(brain) = self.sub_brain.clone() else {
            task.set_status(SubTaskStatus::Failed);
            task.set_error(TaskManagerError::SubBrainNotConfigured.to_string());
            task.complete();
            return Err(TaskManagerError::SubBrainNotConfigured);
        };

        let completed_tx = self.completed_tx.clone();
        let task_for_run = task.clone();
        let id_for_run = id.clone();
        let runner = request.runner;
        let events = request.events;
        let recon_tree = request.recon_tree;
        let target_id = request.target_id;
        let host = request.host;
        tokio::spawn(async move {
            crate::application::smart_sub_agent::run(
                brain,
                runner,
                events,
                recon_tree,
                target_id,
                host,
                child_ctx,
                task_for_run,
            )
            .await;
            if completed_tx.try_send(id_for_run.clone()).is_err() {
                warn!(task_id = %id_for_run, "completion channel full, relying on Done() signal");
            }
        });

        Ok(id)
    }

    pub async fn get_task(&self, id: &str) -> Option<Arc<SubTask>> {
        self.tasks.read().await.get(id).cloned()
    }

    /// Blocks until any task signals completion through the channel, or
    /// `ctx` is cancelled (empty string on cancel).
    pub async fn wait_any(&self, ctx: &CancellationToken) -> String {
        let mut rx = self.completed_rx.write().await;
        tokio::select! {
            biased;
            _ = ctx.cancelled() => String::new(),
            id = rx.recv() => id.unwrap_or_default(),
        }
    }

    /// Blocks on a specific task's completion signal, or returns `false`
    /// on ctx cancellation.
    pub async fn wait_task(&self, ctx: &CancellationToken, id: &str) -> bool {
        let Some(task) = self.get_task(id).await else {
            return false;
        };
        tokio::select! {
            biased;
            _ = ctx.cancelled() => false,
            _ = task.done() => true,
        }
    }

    /// Non-blocking drain of every id currently queued on the completion
    /// channel, resolved to their `SubTask`s.
    pub async fn drain_completed(&self) -> Vec<Arc<SubTask>> {
        let mut rx = self.completed_rx.write().await;
        let tasks = self.tasks.read().await;
        let mut out = Vec::new();
        while let Ok(id) = rx.try_recv() {
            if let Some(task) = tasks.get(&id) {
                out.push(task.clone());
            }
        }
        out
    }

    pub async fn kill_task(&self, id: &str) -> Result<(), TaskManagerError> {
        let task = self
            .get_task(id)
            .await
            .ok_or_else(|| TaskManagerError::NotFound(id.to_string()))?;
        task.cancel();
        Ok(())
    }

    pub async fn active_tasks(&self) -> Vec<Arc<SubTask>> {
        self.tasks
            .read()
            .await
            .values()
            .filter(|t| !t.is_terminal())
            .cloned()
            .collect()
    }

    pub async fn all_tasks(&self) -> Vec<Arc<SubTask>> {
        self.tasks.read().await.values().cloned().collect()
    }
}

/// Formats a finished task's result block for splicing into `lastToolOutput`:
/// summary, findings, and truncated output (<= 2000 chars).
pub fn format_task_result(task: &SubTask) -> String {
    let mut out = format!("[{}] {}\n", task.id, task.summary());
    let findings = task.findings();
    if !findings.is_empty() {
        out.push_str("Findings:\n");
        for f in &findings {
            out.push_str(&format!("- {f}\n"));
        }
    }
    let full = task.full_output();
    let truncated: String = full.chars().take(2000).collect();
    out.push_str(&truncated);
    out
}

/// Entities a finished sub-task discovered, ready to merge into `Target`.
pub fn task_entities(task: &SubTask) -> Vec<Entity> {
    task.entities()
}
