//! A single-function autonomous worker: drives one `SubTask` through its
//! Brain-directed turn loop to a terminal state.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::application::evaluation::normalize_ffuf_command;
use crate::domain::models::{Action, Entity, Event, EventKind, ReconTree, SubTask, SubTaskStatus};
use crate::domain::ports::{Brain, CommandRunner};
use crate::infrastructure::parsers;

fn target_snapshot(host: &str, goal: &str) -> serde_json::Value {
    serde_json::json!({ "host": host, "goal": goal })
}

fn emit(events: &mpsc::Sender<Event>, target_id: u64, kind: EventKind) {
    let _ = events.try_send(Event::new(target_id, kind));
}

/// Runs `task` to completion. On every return path the task's completion
/// signal fires and a `subtask_complete` event is emitted — callers never
/// need a separate cleanup step.
#[instrument(skip(brain, runner, events, recon_tree, task), fields(task_id = %task.id))]
pub async fn run(
    brain: Arc<dyn Brain>,
    runner: Arc<dyn CommandRunner>,
    events: mpsc::Sender<Event>,
    recon_tree: Option<Arc<ReconTree>>,
    target_id: u64,
    host: String,
    ctx: CancellationToken,
    task: Arc<SubTask>,
) {
    emit(
        &events,
        target_id,
        EventKind::SubtaskStart {
            task_id: task.id.clone(),
            goal: task.goal.clone(),
        },
    );

    let mut last_command = String::new();
    let mut last_exit_code = 0i32;
    let mut last_tool_output = String::new();

    loop {
        if ctx.is_cancelled() {
            task.set_status(SubTaskStatus::Cancelled);
            break;
        }

        task.record_turn();
        let turn = task.turn_count();

        let user_message = if turn == 1 { task.command.clone() } else { String::new() };
        let input = crate::domain::models::BrainInput {
            target_snapshot: target_snapshot(&host, &task.goal),
            tool_output: last_tool_output.clone(),
            last_command: last_command.clone(),
            last_exit_code,
            command_history: String::new(),
            user_message,
            turn_count: u64::from(turn),
            memory: String::new(),
            recon_queue: String::new(),
        };

        let action = match brain.decide(input).await {
            Ok(action) => action,
            Err(e) => {
                task.set_status(SubTaskStatus::Failed);
                task.set_error(e.to_string());
                break;
            }
        };

        if let Some(thought) = action.thought() {
            if !thought.is_empty() {
                task.append_output(format!("thought: {thought}"));
            }
        }

        match action {
            Action::Run { command, .. } => {
                let command = normalize_ffuf_command(&command);
                last_command = command.clone();
                let (mut lines, result_rx) = runner.force_run(ctx.child_token(), &command).await;
                while let Some(line) = lines.recv().await {
                    task.append_output(line.clone());
                    emit(
                        &events,
                        target_id,
                        EventKind::SubtaskLog {
                            task_id: task.id.clone(),
                            line,
                        },
                    );
                }
                match result_rx.await {
                    Ok(result) => {
                        last_exit_code = result.exit_code;
                        last_tool_output = result.truncated.clone();
                        task.set_exit_code(result.exit_code);
                        task.add_entities(result.entities.clone().into_iter());
                        apply_tool_output(recon_tree.as_deref(), &command, &result.truncated);
                    }
                    Err(_) => {
                        last_exit_code = -1;
                        last_tool_output = "Error: command runner dropped result".to_string();
                    }
                }
            }
            Action::Memory { memory, .. } => {
                task.add_finding(format!(
                    "[{}] {}: {}",
                    memory.kind, memory.title, memory.description
                ));
            }
            Action::Complete { .. } => {
                task.set_status(SubTaskStatus::Completed);
                break;
            }
            Action::Think { .. } => {}
            other => {
                warn!(action = ?other, "unsupported action");
            }
        }

        if task.budget_exhausted() {
            task.set_status(SubTaskStatus::Completed);
            break;
        }
    }

    task.complete();
    emit(
        &events,
        target_id,
        EventKind::SubtaskComplete {
            task_id: task.id.clone(),
            status: format!("{:?}", task.status()),
        },
    );
    info!(status = ?task.status(), "sub-task finished");
}

fn apply_tool_output(recon_tree: Option<&ReconTree>, command: &str, output: &str) {
    if let Some(tree) = recon_tree {
        parsers::dispatch(tree, command, output);
    }
}

/// Merges entities a finished sub-task's `run` actions discovered. Exposed
/// so the `Loop`'s `wait` dispatch can reuse it without reaching into
/// `SubTask` internals directly.
pub fn collect_entities(task: &SubTask) -> Vec<Entity> {
    task.entities()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{BrainInput, MemoryPayload, MemorySeverity, SubTaskMetadata};
    use crate::domain::ports::{BrainError, CommandResult, RunnerError};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::sync::oneshot;

    struct ScriptedBrain {
        actions: Mutex<Vec<Action>>,
        calls: AtomicUsize,
    }

    impl ScriptedBrain {
        fn new(actions: Vec<Action>) -> Self {
            Self {
                actions: Mutex::new(actions),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Brain for ScriptedBrain {
        async fn decide(&self, _input: BrainInput) -> Result<Action, BrainError> {
            let i = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.actions.lock().unwrap().get(i).cloned().unwrap_or(Action::Complete {
                thought: None,
            }))
        }
    }

    struct EchoRunner;

    #[async_trait]
    impl CommandRunner for EchoRunner {
        async fn run(
            &self,
            _ctx: CancellationToken,
            _command: &str,
        ) -> Result<(bool, mpsc::Receiver<String>, oneshot::Receiver<CommandResult>), RunnerError>
        {
            unreachable!("SmartSubAgent always force-runs")
        }

        async fn force_run(
            &self,
            _ctx: CancellationToken,
            command: &str,
        ) -> (mpsc::Receiver<String>, oneshot::Receiver<CommandResult>) {
            let (tx, rx) = mpsc::channel(4);
            let _ = tx.send(format!("ran: {command}")).await;
            let (result_tx, result_rx) = oneshot::channel();
            let now = Utc::now();
            let _ = result_tx.send(CommandResult {
                exit_code: 0,
                truncated: "ok".to_string(),
                entities: vec![],
                err: None,
                started_at: now,
                finished_at: now,
            });
            (rx, result_rx)
        }

        fn auto_approve(&self) -> bool {
            true
        }
    }

    fn new_task(max_turns: u32) -> Arc<SubTask> {
        Arc::new(SubTask::new(
            "task-1",
            "enumerate",
            "go",
            max_turns,
            SubTaskMetadata::default(),
            CancellationToken::new(),
        ))
    }

    #[tokio::test]
    async fn completes_and_fires_done() {
        let brain = Arc::new(ScriptedBrain::new(vec![Action::Complete { thought: None }]));
        let (events, _rx) = mpsc::channel(16);
        let task = new_task(5);
        run(
            brain,
            Arc::new(EchoRunner),
            events,
            None,
            1,
            "10.0.0.1".to_string(),
            CancellationToken::new(),
            task.clone(),
        )
        .await;
        assert!(task.is_complete());
        assert_eq!(task.status(), SubTaskStatus::Completed);
    }

    #[tokio::test]
    async fn exhausted_budget_completes() {
        let brain = Arc::new(ScriptedBrain::new(vec![]));
        let (events, _rx) = mpsc::channel(16);
        let task = new_task(2);
        run(
            brain,
            Arc::new(EchoRunner),
            events,
            None,
            1,
            "10.0.0.1".to_string(),
            CancellationToken::new(),
            task.clone(),
        )
        .await;
        assert_eq!(task.status(), SubTaskStatus::Completed);
        assert!(task.turn_count() <= 2);
    }

    #[tokio::test]
    async fn cancelled_context_marks_cancelled() {
        let brain = Arc::new(ScriptedBrain::new(vec![]));
        let (events, _rx) = mpsc::channel(16);
        let task = new_task(5);
        let ctx = CancellationToken::new();
        ctx.cancel();
        run(brain, Arc::new(EchoRunner), events, None, 1, "10.0.0.1".to_string(), ctx, task.clone())
            .await;
        assert_eq!(task.status(), SubTaskStatus::Cancelled);
    }

    #[tokio::test]
    async fn memory_action_appends_finding() {
        let brain = Arc::new(ScriptedBrain::new(vec![
            Action::Memory {
                thought: None,
                memory: MemoryPayload {
                    kind: "note".to_string(),
                    title: "SQLi".to_string(),
                    description: "found in /api".to_string(),
                    severity: MemorySeverity::High,
                },
            },
            Action::Complete { thought: None },
        ]));
        let (events, _rx) = mpsc::channel(16);
        let task = new_task(5);
        run(
            brain,
            Arc::new(EchoRunner),
            events,
            None,
            1,
            "10.0.0.1".to_string(),
            CancellationToken::new(),
            task.clone(),
        )
        .await;
        assert_eq!(task.findings().len(), 1);
        assert!(task.findings()[0].contains("SQLi"));
    }

    #[tokio::test]
    async fn run_action_streams_output_and_records_exit_code() {
        let brain = Arc::new(ScriptedBrain::new(vec![
            Action::Run {
                thought: None,
                command: "whoami".to_string(),
            },
            Action::Complete { thought: None },
        ]));
        let (events, _rx) = mpsc::channel(16);
        let task = new_task(5);
        run(
            brain,
            Arc::new(EchoRunner),
            events,
            None,
            1,
            "10.0.0.1".to_string(),
            CancellationToken::new(),
            task.clone(),
        )
        .await;
        assert_eq!(task.exit_code(), Some(0));
        assert!(task.full_output().contains("ran: whoami"));
    }
}
