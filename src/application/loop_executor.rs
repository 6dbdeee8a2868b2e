//! `Loop`: the per-target orchestrator. Drives one `Target` through a
//! think→act cycle against its Brain, executing commands, dispatching
//! sub-tasks, and feeding tool output back into the target's `ReconTree`.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::time::{sleep, Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{instrument, warn};

use crate::domain::models::{
    Action, CommandEntry, CommandHistory, Entity, Event, EventKind, PentecterConfig, Proposal,
    ReconTree, Target, TargetStatus,
};
use crate::domain::ports::{Brain, CommandRunner, KnowledgeBase, McpClient, MemoryStore, SkillRegistry};
use crate::infrastructure::parsers::{self, nmap};

use super::evaluation::{self, is_failure};
use super::recon_runner::ReconRunner;
use super::task_manager::{self, SpawnRequest, TaskManager};

#[derive(Debug, Error)]
pub enum LoopError {
    #[error("brain exhausted its retry budget: {0}")]
    BrainExhausted(String),
}

/// Everything a `Loop` needs beyond its `Target`. Grouped into one struct
/// so `Team::add_target` has a single call to make.
pub struct LoopCollaborators {
    pub runner: Arc<dyn CommandRunner>,
    pub events: mpsc::Sender<Event>,
    pub recon_tree: Option<Arc<ReconTree>>,
    pub task_manager: Arc<TaskManager>,
    pub memory: Option<Arc<dyn MemoryStore>>,
    pub knowledge: Option<Arc<dyn KnowledgeBase>>,
    pub skills: Option<Arc<dyn SkillRegistry>>,
    pub mcp: Option<Arc<dyn McpClient>>,
    pub config: PentecterConfig,
    pub approve_rx: mpsc::Receiver<bool>,
    pub user_msg_rx: mpsc::Receiver<String>,
}

struct LoopState {
    last_command: String,
    last_exit_code: i32,
    last_tool_output: String,
    history: CommandHistory,
    pending_user_message: Option<String>,
}

/// The per-target control loop. One instance per `Target`, shared nothing
/// with other `Loop`s except the `TaskManager` and the Brain it was built
/// with (which can be hot-swapped independently per instance).
pub struct Loop {
    pub target: Arc<Target>,
    brain: AsyncMutex<Arc<dyn Brain>>,
    runner: Arc<dyn CommandRunner>,
    events: mpsc::Sender<Event>,
    recon_tree: Option<Arc<ReconTree>>,
    task_manager: Arc<TaskManager>,
    memory: Option<Arc<dyn MemoryStore>>,
    knowledge: Option<Arc<dyn KnowledgeBase>>,
    skills: Option<Arc<dyn SkillRegistry>>,
    mcp: Option<Arc<dyn McpClient>>,
    config: PentecterConfig,
    approve_rx: AsyncMutex<mpsc::Receiver<bool>>,
    user_msg_rx: AsyncMutex<mpsc::Receiver<String>>,
    recon_runner: ReconRunner,
    turn: AtomicU64,
    consecutive_failures: AtomicU32,
    state: AsyncMutex<LoopState>,
}

fn emit(events: &mpsc::Sender<Event>, target_id: u64, kind: EventKind) {
    let _ = events.try_send(Event::new(target_id, kind));
}

fn target_snapshot(target: &Target) -> serde_json::Value {
    let mut by_kind: std::collections::BTreeMap<String, Vec<String>> = std::collections::BTreeMap::new();
    for entity in target.snapshot_entities() {
        by_kind.entry(entity.kind).or_default().push(entity.value);
    }
    serde_json::json!({
        "host": target.host,
        "status": target.get_status().as_str(),
        "entities": by_kind,
    })
}

fn summarize_output(exit_code: i32, output: &str) -> String {
    let mut lines = output.lines();
    match lines.next() {
        Some(first) if output.lines().count() <= 1 => format!("exit {exit_code} {first}"),
        Some(_) => format!("exit {exit_code} ({} lines)", output.lines().count()),
        None => format!("exit {exit_code}"),
    }
}

impl Loop {
    pub fn new(target: Arc<Target>, brain: Arc<dyn Brain>, collaborators: LoopCollaborators) -> Self {
        Self {
            target,
            brain: AsyncMutex::new(brain),
            runner: collaborators.runner,
            events: collaborators.events,
            recon_tree: collaborators.recon_tree,
            task_manager: collaborators.task_manager,
            memory: collaborators.memory,
            knowledge: collaborators.knowledge,
            skills: collaborators.skills,
            mcp: collaborators.mcp,
            config: collaborators.config,
            approve_rx: AsyncMutex::new(collaborators.approve_rx),
            user_msg_rx: AsyncMutex::new(collaborators.user_msg_rx),
            recon_runner: ReconRunner::new(),
            turn: AtomicU64::new(0),
            consecutive_failures: AtomicU32::new(0),
            state: AsyncMutex::new(LoopState {
                last_command: String::new(),
                last_exit_code: 0,
                last_tool_output: String::new(),
                history: CommandHistory::new(),
                pending_user_message: None,
            }),
        }
    }

    /// Hot-swaps the Brain without racing an in-flight `decide` call.
    pub async fn set_brain(&self, brain: Arc<dyn Brain>) {
        *self.brain.lock().await = brain;
    }

    fn target_id(&self) -> u64 {
        self.target.id
    }

    fn emit(&self, kind: EventKind) {
        emit(&self.events, self.target_id(), kind);
    }

    /// Runs the target to completion: pre-loop reconnaissance, then the
    /// main think→act cycle, until `ctx` is cancelled or the Brain fails
    /// out its retry budget.
    #[instrument(skip(self, ctx), fields(host = %self.target.host))]
    pub async fn run(&self, ctx: CancellationToken) {
        self.emit(EventKind::Log { message: "started".to_string() });
        self.target.set_status(TargetStatus::Scanning);
        self.startup(&ctx).await;

        loop {
            if ctx.is_cancelled() {
                self.emit(EventKind::Log { message: "stopped".to_string() });
                return;
            }
            if !self.pick_up_user_message(&ctx).await {
                return;
            }
            if self.consecutive_failures.load(Ordering::SeqCst) >= self.config.stall_threshold {
                if !self.handle_stall(&ctx).await {
                    return;
                }
                continue;
            }

            let turn = self.turn.fetch_add(1, Ordering::SeqCst) + 1;
            self.emit(EventKind::TurnStart { turn });

            self.drain_sub_tasks().await;

            let action = match self.think(&ctx, turn).await {
                Ok(action) => action,
                Err(e) => {
                    self.emit(EventKind::Error { message: e.to_string() });
                    self.target.set_status(TargetStatus::Failed);
                    return;
                }
            };

            self.pick_up_user_message_nonblocking().await;

            if let Some(thought) = action.thought() {
                if !thought.is_empty() {
                    self.emit(EventKind::Log { message: thought.to_string() });
                }
            }

            if !self.dispatch(&ctx, action).await {
                return;
            }
        }
    }

    async fn startup(&self, ctx: &CancellationToken) {
        let Some(tree) = self.recon_tree.clone() else { return };
        if self.config.initial_scan_commands.is_empty() {
            return;
        }
        let mut http_ports: Vec<(u16, String)> = Vec::new();
        for template in &self.config.initial_scan_commands {
            if ctx.is_cancelled() {
                return;
            }
            let command = template.replace("{target}", &self.target.host);
            let (mut lines, result_rx) = self.runner.force_run(ctx.child_token(), &command).await;
            while lines.recv().await.is_some() {}
            let Ok(result) = result_rx.await else { continue };
            self.persist_raw(&command, &result.truncated).await;

            let ports = if nmap::is_xml_output(&result.truncated) {
                nmap::parse_xml(&result.truncated).unwrap_or_default()
            } else {
                nmap::parse_text(&result.truncated)
            };
            for port in ports {
                tree.add_port(port.port, port.service.clone(), port.banner.clone());
                if port.service.to_lowercase().contains("http") {
                    http_ports.push((port.port, port.service));
                }
            }
        }

        if http_ports.is_empty() {
            return;
        }
        let recon_runner = self.recon_runner;
        let task_manager = self.task_manager.clone();
        let runner = self.runner.clone();
        let events = self.events.clone();
        let target_id = self.target_id();
        let host = self.target.host.clone();
        let max_turns = self.config.web_recon_max_turns;
        let child_ctx = ctx.child_token();
        tokio::spawn(async move {
            for (port, service) in http_ports {
                recon_runner
                    .spawn_port(
                        &child_ctx,
                        &task_manager,
                        runner.clone(),
                        events.clone(),
                        tree.clone(),
                        target_id,
                        &host,
                        port,
                        &service,
                        max_turns,
                    )
                    .await;
            }
        });
    }

    /// Picks up a deferred-from-last-turn message, or a freshly arrived one
    /// (non-blocking), expanding it through the skill registry if
    /// configured. Returns `false` if `ctx` was cancelled while picking up.
    async fn pick_up_user_message(&self, ctx: &CancellationToken) -> bool {
        if ctx.is_cancelled() {
            return false;
        }
        let mut state = self.state.lock().await;
        let mut message = state.pending_user_message.take();
        if message.is_none() {
            let mut rx = self.user_msg_rx.lock().await;
            if let Ok(m) = rx.try_recv() {
                message = Some(m);
            }
        }
        if let Some(m) = message {
            let expanded = if let Some(skills) = &self.skills {
                skills.expand(&m).await
            } else {
                m
            };
            state.pending_user_message = Some(expanded);
        }
        true
    }

    async fn pick_up_user_message_nonblocking(&self) {
        let mut rx = self.user_msg_rx.lock().await;
        if let Ok(m) = rx.try_recv() {
            let mut state = self.state.lock().await;
            state.pending_user_message = Some(m);
        }
    }

    /// Blocks on the user-message channel while the target is stalled.
    /// Returns `false` if `ctx` was cancelled while waiting.
    async fn handle_stall(&self, ctx: &CancellationToken) -> bool {
        self.emit(EventKind::Stalled);
        self.target.set_status(TargetStatus::Paused);
        let mut rx = self.user_msg_rx.lock().await;
        tokio::select! {
            biased;
            _ = ctx.cancelled() => false,
            msg = rx.recv() => {
                if let Some(m) = msg {
                    self.state.lock().await.pending_user_message = Some(m);
                }
                self.consecutive_failures.store(0, Ordering::SeqCst);
                self.target.set_status(TargetStatus::Scanning);
                true
            }
        }
    }

    async fn drain_sub_tasks(&self) {
        let finished = self.task_manager.drain_completed().await;
        if finished.is_empty() {
            return;
        }
        let mut state = self.state.lock().await;
        for task in &finished {
            let block = task_manager::format_task_result(task);
            state.last_tool_output = format!("{block}\n{}", state.last_tool_output);
            self.target.add_entities(task_manager::task_entities(task));
        }
    }

    async fn think(&self, ctx: &CancellationToken, turn: u64) -> Result<Action, LoopError> {
        self.emit(EventKind::ThinkStart);
        let started = Instant::now();

        let input = {
            let state = self.state.lock().await;
            crate::domain::models::BrainInput {
                target_snapshot: target_snapshot(&self.target),
                tool_output: state.last_tool_output.clone(),
                last_command: state.last_command.clone(),
                last_exit_code: state.last_exit_code,
                command_history: state.history.format_last_n(5),
                user_message: state.pending_user_message.clone().unwrap_or_default(),
                turn_count: turn,
                memory: self.memory_summary().await,
                recon_queue: self
                    .recon_tree
                    .as_ref()
                    .map(|t| t.render_queue())
                    .unwrap_or_default(),
            }
        };
        self.state.lock().await.pending_user_message = None;

        let attempts = self.config.think_retry_attempts.max(1);
        let mut last_err = String::new();
        for attempt in 0..attempts {
            if ctx.is_cancelled() {
                return Err(LoopError::BrainExhausted("cancelled".to_string()));
            }
            let brain = self.brain.lock().await.clone();
            match brain.decide(input.clone()).await {
                Ok(action) => {
                    self.emit(EventKind::ThinkDone { elapsed_ms: started.elapsed().as_millis() as u64 });
                    return Ok(action);
                }
                Err(e) => {
                    last_err = e.to_string();
                    if attempt + 1 < attempts {
                        sleep(Duration::from_millis(self.config.think_retry_base_ms * (attempt as u64 + 1))).await;
                    }
                }
            }
        }
        Err(LoopError::BrainExhausted(last_err))
    }

    async fn memory_summary(&self) -> String {
        match &self.memory {
            Some(store) => store.summary(&self.target.host).await,
            None => String::new(),
        }
    }

    async fn persist_raw(&self, command: &str, output: &str) {
        let Some(store) = &self.memory else { return };
        let tool = evaluation::extract_binary(command);
        if let Err(e) = store.persist_raw(&self.target.host, &tool, command, output).await {
            warn!(error = %e, "failed to persist raw output");
        }
    }

    /// Dispatches one Brain action. Returns `false` if the `Loop` must
    /// return immediately (ctx cancellation during a suspension point).
    async fn dispatch(&self, ctx: &CancellationToken, action: Action) -> bool {
        match action {
            Action::Run { command, .. } => self.handle_run(ctx, command).await,
            Action::Propose { command, .. } => self.handle_propose(ctx, command).await,
            Action::Memory { memory, .. } => {
                self.emit(EventKind::Log {
                    message: format!("[{}] {}: {}", memory.kind, memory.title, memory.description),
                });
                true
            }
            Action::CallMcp { mcp_server, mcp_tool, mcp_args, .. } => {
                self.handle_call_mcp(mcp_server, mcp_tool, mcp_args).await;
                true
            }
            Action::SpawnTask {
                task_goal, task_port, task_service, task_phase, task_max_turns, ..
            } => {
                self.handle_spawn_task(task_goal, task_port, task_service, task_phase, task_max_turns)
                    .await;
                true
            }
            Action::Wait { task_id, .. } => {
                self.handle_wait(ctx, task_id).await;
                true
            }
            Action::KillTask { task_id, .. } => {
                self.handle_kill_task(task_id).await;
                true
            }
            Action::AddTarget { target, .. } => {
                self.emit(EventKind::AddTarget { host: target });
                true
            }
            Action::SearchKnowledge { knowledge_query, .. } => {
                self.handle_search_knowledge(knowledge_query).await;
                true
            }
            Action::ReadKnowledge { knowledge_path, .. } => {
                self.handle_read_knowledge(knowledge_path).await;
                true
            }
            Action::Think { .. } => true,
            Action::Complete { .. } => self.handle_complete(ctx).await,
        }
    }

    async fn handle_run(&self, ctx: &CancellationToken, command: String) -> bool {
        let command = evaluation::normalize_ffuf_command(&command);
        self.state.lock().await.last_command = command.clone();
        self.emit(EventKind::CmdStart { command: command.clone() });
        self.target.set_status(TargetStatus::Running);

        let child_ctx = ctx.child_token();
        let submission = match self.runner.run(child_ctx.clone(), &command).await {
            Ok(s) => s,
            Err(e) => {
                self.emit(EventKind::Error { message: e.to_string() });
                return true;
            }
        };
        let (needs_approval, lines, result_rx) = submission;

        let executed = if needs_approval {
            match self.escalate_to_approval(ctx, &command, &command, &child_ctx).await {
                Some(pair) => pair,
                None => return false,
            }
        } else {
            self.stream_and_collect(command.clone(), lines, result_rx).await
        };

        let Some((exit_code, output, entities, duration_ms)) = executed else {
            return true;
        };
        self.target.add_entities(entities);
        self.emit(EventKind::CmdDone {
            exit_code,
            duration_ms,
            summary: summarize_output(exit_code, &output),
        });
        self.evaluate(&command, exit_code, &output).await;
        true
    }

    async fn handle_propose(&self, ctx: &CancellationToken, command: String) -> bool {
        let child_ctx = ctx.child_token();
        let executed = match self.escalate_to_approval(ctx, &command, &command, &child_ctx).await {
            Some(pair) => pair,
            None => return false,
        };
        let Some((exit_code, output, entities, duration_ms)) = executed else {
            return true;
        };
        self.state.lock().await.last_command = command.clone();
        self.target.add_entities(entities);
        self.emit(EventKind::CmdDone {
            exit_code,
            duration_ms,
            summary: summarize_output(exit_code, &output),
        });
        self.evaluate(&command, exit_code, &output).await;
        true
    }

    /// Proposes `command`, then waits for approval (or auto-approves),
    /// returning the executed command's result. `Some(None)` means the
    /// proposal was rejected or ctx was cancelled while blocking; the
    /// caller distinguishes the two via `ctx.is_cancelled()`.
    async fn escalate_to_approval(
        &self,
        ctx: &CancellationToken,
        description: &str,
        command: &str,
        child_ctx: &CancellationToken,
    ) -> Option<Option<(i32, String, Vec<Entity>, u64)>> {
        self.target.set_proposal(Proposal::new(description, command));
        self.emit(EventKind::Proposal { description: description.to_string(), command: command.to_string() });

        let approved = if self.runner.auto_approve() {
            self.emit(EventKind::Log { message: "Auto-approved".to_string() });
            true
        } else {
            let mut rx = self.approve_rx.lock().await;
            tokio::select! {
                biased;
                _ = ctx.cancelled() => {
                    self.target.clear_proposal();
                    return None;
                }
                decision = rx.recv() => decision.unwrap_or(false),
            }
        };

        self.target.clear_proposal();
        if !approved {
            self.state.lock().await.last_tool_output = "Proposal rejected by operator.".to_string();
            return Some(None);
        }
        self.target.set_status(TargetStatus::Running);
        let (lines, result_rx) = self.runner.force_run(child_ctx.clone(), command).await;
        Some(self.stream_and_collect(command.to_string(), lines, result_rx).await)
    }

    async fn stream_and_collect(
        &self,
        _command: String,
        mut lines: mpsc::Receiver<String>,
        result_rx: tokio::sync::oneshot::Receiver<crate::domain::ports::CommandResult>,
    ) -> Option<(i32, String, Vec<Entity>, u64)> {
        while let Some(line) = lines.recv().await {
            self.emit(EventKind::CmdOutput { line });
        }
        match result_rx.await {
            Ok(result) => {
                let duration_ms = result.duration_ms();
                Some((result.exit_code, result.truncated, result.entities, duration_ms))
            }
            Err(_) => Some((-1, "Error: command runner dropped result".to_string(), Vec::new(), 0)),
        }
    }

    async fn evaluate(&self, command: &str, exit_code: i32, output: &str) {
        {
            let mut state = self.state.lock().await;
            state.last_exit_code = exit_code;
            state.last_tool_output = output.to_string();
            state.history.push(CommandEntry::new(command, exit_code, output));
        }

        let repeated = {
            let state = self.state.lock().await;
            evaluation::detects_repetition(&state.history)
        };
        let failed = is_failure(exit_code, output) || repeated;
        if failed {
            self.consecutive_failures.fetch_add(1, Ordering::SeqCst);
        } else {
            self.consecutive_failures.store(0, Ordering::SeqCst);
        }

        self.persist_raw(command, output).await;

        if let Some(tree) = &self.recon_tree {
            if let Some(port) = parsers::dispatch(tree, command, output) {
                tree.complete_all_port_tasks(port);
            }
        }
    }

    async fn handle_call_mcp(
        &self,
        server: String,
        tool: String,
        args: std::collections::HashMap<String, serde_json::Value>,
    ) {
        let Some(mcp) = &self.mcp else {
            self.state.lock().await.last_tool_output = "Error: MCP is not configured".to_string();
            return;
        };
        let command = format!("mcp:{server}.{tool}");
        self.emit(EventKind::CmdStart { command: command.clone() });
        let started = Instant::now();
        let args_value = serde_json::Value::Object(args.into_iter().collect());
        match mcp.call_tool(&server, &tool, args_value).await {
            Ok(output) => {
                self.emit(EventKind::CmdOutput { line: output.clone() });
                self.emit(EventKind::CmdDone {
                    exit_code: 0,
                    duration_ms: started.elapsed().as_millis() as u64,
                    summary: summarize_output(0, &output),
                });
                self.state.lock().await.last_tool_output = output;
            }
            Err(e) => {
                self.emit(EventKind::CmdDone {
                    exit_code: -1,
                    duration_ms: started.elapsed().as_millis() as u64,
                    summary: e.to_string(),
                });
                self.state.lock().await.last_tool_output = format!("Error: {e}");
            }
        }
    }

    async fn handle_spawn_task(
        &self,
        task_goal: String,
        task_port: Option<u16>,
        task_service: Option<String>,
        task_phase: Option<String>,
        task_max_turns: Option<u32>,
    ) {
        let request = SpawnRequest {
            goal: task_goal.clone(),
            command: task_goal.clone(),
            max_turns: task_max_turns.unwrap_or(self.config.max_sub_agent_turns),
            metadata: crate::domain::models::SubTaskMetadata {
                port: task_port,
                service: task_service,
                phase: task_phase,
            },
            target_id: self.target_id(),
            host: self.target.host.clone(),
            runner: self.runner.clone(),
            events: self.events.clone(),
            recon_tree: self.recon_tree.clone(),
        };
        let ctx = CancellationToken::new();
        match self.task_manager.spawn_task(&ctx, request).await {
            Ok(id) => {
                self.emit(EventKind::SubtaskStart { task_id: id.clone(), goal: task_goal });
                self.state.lock().await.last_tool_output = format!("spawned {id}");
            }
            Err(e) => {
                self.state.lock().await.last_tool_output = format!("Error: {e}");
            }
        }
    }

    async fn handle_wait(&self, ctx: &CancellationToken, task_id: Option<String>) {
        let resolved_id = match task_id {
            Some(id) => {
                if self.task_manager.wait_task(ctx, &id).await {
                    Some(id)
                } else {
                    None
                }
            }
            None => {
                let id = self.task_manager.wait_any(ctx).await;
                if id.is_empty() { None } else { Some(id) }
            }
        };
        let Some(id) = resolved_id else { return };
        let Some(task) = self.task_manager.get_task(&id).await else { return };
        self.state.lock().await.last_tool_output = task_manager::format_task_result(&task);
        self.target.add_entities(task_manager::task_entities(&task));
    }

    async fn handle_kill_task(&self, task_id: String) {
        let note = match self.task_manager.kill_task(&task_id).await {
            Ok(()) => format!("{task_id} cancelled"),
            Err(e) => format!("Error: {e}"),
        };
        self.state.lock().await.last_tool_output = note;
    }

    async fn handle_search_knowledge(&self, query: String) {
        let Some(kb) = &self.knowledge else {
            self.state.lock().await.last_tool_output = "Error: knowledge base is not configured".to_string();
            return;
        };
        let output = match kb.search(&query).await {
            Ok(result) => result,
            Err(e) => format!("Error: {e}"),
        };
        self.state.lock().await.last_tool_output = output;
    }

    async fn handle_read_knowledge(&self, path: String) {
        let Some(kb) = &self.knowledge else {
            self.state.lock().await.last_tool_output = "Error: knowledge base is not configured".to_string();
            return;
        };
        let output = match kb.read(&path).await {
            Ok(result) => result,
            Err(e) => format!("Error: {e}"),
        };
        self.state.lock().await.last_tool_output = output;
    }

    async fn handle_complete(&self, ctx: &CancellationToken) -> bool {
        self.target.set_status(TargetStatus::Pwned);
        self.emit(EventKind::Complete);
        let mut rx = self.user_msg_rx.lock().await;
        tokio::select! {
            biased;
            _ = ctx.cancelled() => false,
            msg = rx.recv() => {
                if let Some(m) = msg {
                    drop(rx);
                    self.state.lock().await.pending_user_message = Some(m);
                    self.target.set_status(TargetStatus::Scanning);
                    true
                } else {
                    false
                }
            }
        }
    }
}
