//! `SubTask`: a handle for a spawned autonomous background worker.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use super::target::Entity;

/// Lifecycle state of a `SubTask`. Monotonic: once a terminal state is
/// reached it never regresses, and `Running` never regresses to `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubTaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl SubTaskStatus {
    fn rank(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Running => 1,
            Self::Completed | Self::Failed | Self::Cancelled => 2,
        }
    }

    fn is_terminal(self) -> bool {
        self.rank() == 2
    }
}

/// Static metadata a `ReconRunner`-spawned sub-task carries about the port
/// it is working.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubTaskMetadata {
    pub port: Option<u16>,
    pub service: Option<String>,
    pub phase: Option<String>,
}

struct OutputBuffer {
    lines: Vec<String>,
    cursor: usize,
}

/// A handle for a spawned autonomous worker.
///
/// Co-owned by the `TaskManager` (by id) and by the `SmartSubAgent`
/// coroutine that drives it. Output, findings and entities are append-only;
/// status is monotonic; the completion signal fires exactly once.
pub struct SubTask {
    pub id: String,
    pub goal: String,
    pub command: String,
    pub max_turns: u32,
    pub metadata: SubTaskMetadata,

    status: Mutex<SubTaskStatus>,
    turn_count: AtomicU32,
    output: Mutex<OutputBuffer>,
    findings: Mutex<Vec<String>>,
    entities: Mutex<Vec<Entity>>,
    exit_code: Mutex<Option<i32>>,
    error: Mutex<Option<String>>,

    completion: Notify,
    completed: AtomicBool,
    cancel_token: CancellationToken,
}

impl SubTask {
    /// `max_turns == 0` is normalized to the default budget of 10.
    pub fn new(
        id: impl Into<String>,
        goal: impl Into<String>,
        command: impl Into<String>,
        max_turns: u32,
        metadata: SubTaskMetadata,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            id: id.into(),
            goal: goal.into(),
            command: command.into(),
            max_turns: if max_turns == 0 { 10 } else { max_turns },
            metadata,
            status: Mutex::new(SubTaskStatus::Pending),
            turn_count: AtomicU32::new(0),
            output: Mutex::new(OutputBuffer {
                lines: Vec::new(),
                cursor: 0,
            }),
            findings: Mutex::new(Vec::new()),
            entities: Mutex::new(Vec::new()),
            exit_code: Mutex::new(None),
            error: Mutex::new(None),
            completion: Notify::new(),
            completed: AtomicBool::new(false),
            cancel_token,
        }
    }

    pub fn status(&self) -> SubTaskStatus {
        *self.status.lock().unwrap()
    }

    /// Transition to `next`. A transition that would regress rank (e.g.
    /// terminal -> running, or running -> pending) is ignored.
    pub fn set_status(&self, next: SubTaskStatus) {
        let mut current = self.status.lock().unwrap();
        if next.rank() >= current.rank() {
            *current = next;
        }
    }

    pub fn turn_count(&self) -> u32 {
        self.turn_count.load(Ordering::SeqCst)
    }

    pub fn record_turn(&self) {
        self.turn_count.fetch_add(1, Ordering::SeqCst);
    }

    pub fn budget_exhausted(&self) -> bool {
        self.turn_count() >= self.max_turns
    }

    /// Append one line to the output buffer. Unbounded, append-only.
    pub fn append_output(&self, line: impl Into<String>) {
        self.output.lock().unwrap().lines.push(line.into());
    }

    /// Lines from the read cursor to the current end, without advancing
    /// the cursor.
    pub fn read_new_output(&self) -> Vec<String> {
        let buf = self.output.lock().unwrap();
        buf.lines[buf.cursor..].to_vec()
    }

    /// Advance the read cursor to the current end of the buffer.
    pub fn advance_read_cursor(&self) {
        let mut buf = self.output.lock().unwrap();
        buf.cursor = buf.lines.len();
    }

    pub fn full_output(&self) -> String {
        self.output.lock().unwrap().lines.join("\n")
    }

    pub fn summary(&self) -> String {
        let findings = self.findings.lock().unwrap();
        let status = self.status();
        if findings.is_empty() {
            format!("[{}] {} ({:?})", self.id, self.goal, status)
        } else {
            format!(
                "[{}] {} ({:?}) - {} finding(s)",
                self.id,
                self.goal,
                status,
                findings.len()
            )
        }
    }

    pub fn add_finding(&self, finding: impl Into<String>) {
        self.findings.lock().unwrap().push(finding.into());
    }

    pub fn findings(&self) -> Vec<String> {
        self.findings.lock().unwrap().clone()
    }

    pub fn add_entities(&self, new_entities: impl IntoIterator<Item = Entity>) {
        self.entities.lock().unwrap().extend(new_entities);
    }

    pub fn entities(&self) -> Vec<Entity> {
        self.entities.lock().unwrap().clone()
    }

    pub fn set_exit_code(&self, code: i32) {
        *self.exit_code.lock().unwrap() = Some(code);
    }

    pub fn exit_code(&self) -> Option<i32> {
        *self.exit_code.lock().unwrap()
    }

    pub fn set_error(&self, message: impl Into<String>) {
        *self.error.lock().unwrap() = Some(message.into());
    }

    pub fn error(&self) -> Option<String> {
        self.error.lock().unwrap().clone()
    }

    /// Fire the completion signal. Idempotent: only the first call wakes
    /// waiters.
    pub fn complete(&self) {
        if !self.completed.swap(true, Ordering::SeqCst) {
            self.completion.notify_waiters();
        }
    }

    pub fn is_complete(&self) -> bool {
        self.completed.load(Ordering::SeqCst)
    }

    /// Wait for the completion signal. Returns immediately if it has
    /// already fired, even if this call happens after `complete()`.
    pub async fn done(&self) {
        let notified = self.completion.notified();
        if self.completed.load(Ordering::SeqCst) {
            return;
        }
        notified.await;
    }

    /// Trigger this sub-task's cancellation handle. Safe to call more than
    /// once or after the task has already finished.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    pub fn is_terminal(&self) -> bool {
        self.status().is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_task() -> SubTask {
        SubTask::new(
            "task-1",
            "enumerate endpoints",
            "initial prompt",
            0,
            SubTaskMetadata::default(),
            CancellationToken::new(),
        )
    }

    #[test]
    fn zero_max_turns_defaults_to_ten() {
        assert_eq!(new_task().max_turns, 10);
    }

    #[test]
    fn status_is_monotonic() {
        let t = new_task();
        t.set_status(SubTaskStatus::Running);
        t.set_status(SubTaskStatus::Completed);
        t.set_status(SubTaskStatus::Pending); // ignored: would regress
        assert_eq!(t.status(), SubTaskStatus::Completed);
        t.set_status(SubTaskStatus::Failed); // ignored: already terminal
        assert_eq!(t.status(), SubTaskStatus::Completed);
    }

    #[test]
    fn read_cursor_only_advances_explicitly() {
        let t = new_task();
        t.append_output("line one");
        t.append_output("line two");
        assert_eq!(t.read_new_output(), vec!["line one", "line two"]);
        // idempotent until explicitly advanced
        assert_eq!(t.read_new_output(), vec!["line one", "line two"]);
        t.advance_read_cursor();
        assert!(t.read_new_output().is_empty());
        t.append_output("line three");
        assert_eq!(t.read_new_output(), vec!["line three"]);
    }

    #[tokio::test]
    async fn completion_signal_fires_exactly_once() {
        let t = std::sync::Arc::new(new_task());
        let t2 = t.clone();
        let waiter = tokio::spawn(async move {
            t2.done().await;
        });
        t.complete();
        t.complete(); // idempotent
        waiter.await.unwrap();
        assert!(t.is_complete());
    }

    #[tokio::test]
    async fn done_returns_immediately_if_already_complete() {
        let t = new_task();
        t.complete();
        tokio::time::timeout(std::time::Duration::from_millis(50), t.done())
            .await
            .expect("done() should not block once already complete");
    }
}
