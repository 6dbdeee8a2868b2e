//! `Team`: the multi-target supervisor. Owns target registration and the
//! shared `TaskManager`, and fans `Start` out to every registered `Loop`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::domain::models::{PentecterConfig, Target};
use crate::domain::ports::{Brain, CommandRunner, KnowledgeBase, McpClient, MemoryStore, SkillRegistry};

use super::loop_executor::{Loop, LoopCollaborators};
use super::task_manager::TaskManager;

const APPROVAL_CHANNEL_CAPACITY: usize = 1;
const USER_MESSAGE_CHANNEL_CAPACITY: usize = 8;

/// Collaborators shared by every `Loop` a `Team` creates, plus the event
/// sink and command runner constructor each target needs its own instance
/// of. `runner_factory` lets each target get an independently-scoped
/// `CommandRunner` (its own shell session) while sharing everything else.
pub struct TeamCollaborators {
    pub runner_factory: Box<dyn Fn(u64, &str) -> Arc<dyn CommandRunner> + Send + Sync>,
    pub events: mpsc::Sender<crate::domain::models::Event>,
    pub memory: Option<Arc<dyn MemoryStore>>,
    pub knowledge: Option<Arc<dyn KnowledgeBase>>,
    pub skills: Option<Arc<dyn SkillRegistry>>,
    pub mcp: Option<Arc<dyn McpClient>>,
    pub config: PentecterConfig,
}

struct Entry {
    target: Arc<Target>,
    lp: Arc<Loop>,
}

struct TeamState {
    entries: Vec<Entry>,
    started: bool,
    ctx: Option<CancellationToken>,
}

/// Supervises every `Target`/`Loop` pair in a session. A single mutex
/// guards the registered-target list and the started flag, mirroring the
/// spec's single-critical-section concurrency model.
pub struct Team {
    next_id: AtomicU64,
    brain: Mutex<Arc<dyn Brain>>,
    collaborators: TeamCollaborators,
    task_manager: Arc<TaskManager>,
    state: Mutex<TeamState>,
}

impl Team {
    pub fn new(brain: Arc<dyn Brain>, sub_brain: Option<Arc<dyn Brain>>, collaborators: TeamCollaborators) -> Self {
        Self {
            next_id: AtomicU64::new(1),
            brain: Mutex::new(brain),
            collaborators,
            task_manager: Arc::new(TaskManager::new(sub_brain)),
            state: Mutex::new(TeamState { entries: Vec::new(), started: false, ctx: None }),
        }
    }

    pub fn task_manager(&self) -> Arc<TaskManager> {
        self.task_manager.clone()
    }

    /// Replaces the Brain used for `Loop`s created after this call.
    /// In-flight `Loop`s keep their own Brain until individually hot-swapped
    /// via `Loop::set_brain`.
    pub fn set_brain(&self, brain: Arc<dyn Brain>) {
        *self.brain.lock().unwrap() = brain;
    }

    pub fn loops(&self) -> Vec<Arc<Target>> {
        self.state.lock().unwrap().entries.iter().map(|e| e.target.clone()).collect()
    }

    /// Registers `host` and, if `Start` has already run, launches its
    /// `Loop` immediately. A duplicate host returns the existing target
    /// with `None` channels so the caller can detect it was not newly
    /// created.
    pub fn add_target(
        &self,
        host: &str,
    ) -> (Arc<Target>, Option<mpsc::Sender<bool>>, Option<mpsc::Sender<String>>) {
        let mut state = self.state.lock().unwrap();
        if let Some(existing) = state.entries.iter().find(|e| e.target.host == host) {
            return (existing.target.clone(), None, None);
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let target = Arc::new(Target::new(id, host));

        let (approve_tx, approve_rx) = mpsc::channel(APPROVAL_CHANNEL_CAPACITY);
        let (user_tx, user_msg_rx) = mpsc::channel(USER_MESSAGE_CHANNEL_CAPACITY);
        let runner = (self.collaborators.runner_factory)(id, host);
        let recon_tree = Some(Arc::new(crate::domain::models::ReconTree::with_max_parallel(
            host,
            self.collaborators.config.max_parallel_recon,
        )));

        let loop_collaborators = LoopCollaborators {
            runner,
            events: self.collaborators.events.clone(),
            recon_tree,
            task_manager: self.task_manager.clone(),
            memory: self.collaborators.memory.clone(),
            knowledge: self.collaborators.knowledge.clone(),
            skills: self.collaborators.skills.clone(),
            mcp: self.collaborators.mcp.clone(),
            config: self.collaborators.config.clone(),
            approve_rx,
            user_msg_rx,
        };
        let brain = self.brain.lock().unwrap().clone();
        let lp = Arc::new(Loop::new(target.clone(), brain, loop_collaborators));

        state.entries.push(Entry { target: target.clone(), lp: lp.clone() });

        if state.started {
            let ctx = state.ctx.clone().unwrap_or_default();
            spawn_loop(lp, ctx);
        }

        (target, Some(approve_tx), Some(user_tx))
    }

    /// Stores `ctx` and launches every already-registered `Loop`.
    pub fn start(&self, ctx: CancellationToken) {
        let mut state = self.state.lock().unwrap();
        state.started = true;
        state.ctx = Some(ctx.clone());
        for entry in &state.entries {
            spawn_loop(entry.lp.clone(), ctx.clone());
        }
    }
}

fn spawn_loop(lp: Arc<Loop>, ctx: CancellationToken) {
    tokio::spawn(async move {
        info!(host = %lp.target.host, "loop starting");
        lp.run(ctx).await;
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{Action, BrainInput};
    use crate::domain::ports::{BrainError, CommandResult, RunnerError};
    use async_trait::async_trait;
    use chrono::Utc;
    use tokio::sync::oneshot;

    struct NoopBrain;
    #[async_trait]
    impl Brain for NoopBrain {
        async fn decide(&self, _input: BrainInput) -> Result<Action, BrainError> {
            Ok(Action::Complete { thought: None })
        }
    }

    struct NoopRunner;
    #[async_trait]
    impl CommandRunner for NoopRunner {
        async fn run(
            &self,
            _ctx: CancellationToken,
            _command: &str,
        ) -> Result<(bool, mpsc::Receiver<String>, oneshot::Receiver<CommandResult>), RunnerError> {
            let (_tx, rx) = mpsc::channel(1);
            let (_result_tx, result_rx) = oneshot::channel();
            Ok((false, rx, result_rx))
        }
        async fn force_run(
            &self,
            _ctx: CancellationToken,
            _command: &str,
        ) -> (mpsc::Receiver<String>, oneshot::Receiver<CommandResult>) {
            let (tx, rx) = mpsc::channel(1);
            let (result_tx, result_rx) = oneshot::channel();
            let now = Utc::now();
            let _ = tx.try_send("ok".to_string());
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

    fn test_team() -> Team {
        let (events, _rx) = mpsc::channel(64);
        Team::new(
            Arc::new(NoopBrain),
            None,
            TeamCollaborators {
                runner_factory: Box::new(|_, _| Arc::new(NoopRunner)),
                events,
                memory: None,
                knowledge: None,
                skills: None,
                mcp: None,
                config: PentecterConfig::default(),
            },
        )
    }

    #[test]
    fn add_target_assigns_monotonic_ids() {
        let team = test_team();
        let (t1, ch1, _) = team.add_target("10.0.0.1");
        let (t2, ch2, _) = team.add_target("10.0.0.2");
        assert_eq!(t1.id, 1);
        assert_eq!(t2.id, 2);
        assert!(ch1.is_some());
        assert!(ch2.is_some());
    }

    #[test]
    fn duplicate_host_returns_existing_with_nil_channels() {
        let team = test_team();
        let (first, _, _) = team.add_target("10.0.0.1");
        let (second, approve, user_msg) = team.add_target("10.0.0.1");
        assert_eq!(first.id, second.id);
        assert!(approve.is_none());
        assert!(user_msg.is_none());
    }

    #[tokio::test]
    async fn start_launches_registered_loops() {
        let team = test_team();
        let (_t, _approve, _user) = team.add_target("10.0.0.1");
        let ctx = CancellationToken::new();
        team.start(ctx.clone());
        tokio::time::sleep(std::time::Duration::from_millis(30)).await;
        ctx.cancel();
        tokio::time::sleep(std::time::Duration::from_millis(30)).await;
        assert_eq!(team.loops().len(), 1);
    }
}
