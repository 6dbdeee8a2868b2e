//! Web-recon scheduler: spawns one `SmartSubAgent` per HTTP port discovered
//! on a target, subject to the owning `ReconTree`'s parallelism bound.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::domain::models::{Event, ReconTree, SubTaskMetadata};
use crate::domain::ports::CommandRunner;

use super::task_manager::{SpawnRequest, TaskManager};

/// Stateless web-recon dispatcher. Holds no per-target data of its own —
/// everything it needs travels with each `spawn_port` call, the same
/// collaborator-threading convention `TaskManager::spawn_task` uses.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReconRunner;

impl ReconRunner {
    pub fn new() -> Self {
        Self
    }

    /// Attempts to start web-recon on one port. Returns `true` if a
    /// sub-task was spawned, `false` if admission was deferred (the
    /// ReconTree's `max_parallel` bound is saturated) or recon is
    /// unconfigured — callers re-invoke on the next evaluation cycle.
    #[instrument(skip(self, task_manager, events, recon_tree, runner), fields(%host, port))]
    #[allow(clippy::too_many_arguments)]
    pub async fn spawn_port(
        &self,
        ctx: &CancellationToken,
        task_manager: &TaskManager,
        runner: Arc<dyn CommandRunner>,
        events: mpsc::Sender<Event>,
        recon_tree: Arc<ReconTree>,
        target_id: u64,
        host: &str,
        port: u16,
        service: &str,
        max_turns: u32,
    ) -> bool {
        if ctx.is_cancelled() {
            info!("ctx cancelled, skipping recon spawn");
            return false;
        }
        if !recon_tree.start_port_recon(host, port) {
            info!("max_parallel reached, deferring port recon");
            return false;
        }

        let prompt = build_web_recon_prompt(host, port, service);
        let request = SpawnRequest {
            goal: format!("web recon on {host}:{port}"),
            command: prompt,
            max_turns,
            metadata: SubTaskMetadata {
                port: Some(port),
                service: Some(service.to_string()),
                phase: Some("web_recon".to_string()),
            },
            target_id,
            host: host.to_string(),
            runner,
            events,
            recon_tree: Some(recon_tree),
        };

        match task_manager.spawn_task(ctx, request).await {
            Ok(id) => {
                info!(task_id = %id, "spawned web-recon sub-task");
                true
            }
            Err(e) => {
                warn!(error = %e, "failed to spawn web-recon sub-task");
                false
            }
        }
    }
}

const FUZZ_CATEGORIES: [(&str, &str); 6] = [
    ("numeric", "increment/decrement numeric path and parameter values to probe for IDOR or off-by-one access control gaps"),
    ("sqli", "inject SQL metacharacters and boolean/time-based payloads to probe for SQL injection"),
    ("path", "inject path-traversal sequences (../, encoded variants) to probe for local file access"),
    ("ssti", "inject template-expression payloads ({{7*7}} and engine-specific equivalents) to probe for server-side template injection"),
    ("cmdi", "inject shell metacharacters and command-chaining payloads to probe for OS command injection"),
    ("xss_probe", "inject HTML/JS breakout payloads to probe for reflected or stored cross-site scripting"),
];

/// Builds the port-specific prompt handed to a web-recon sub-agent as its
/// initial command. Every fuzz category's name and description, plus the
/// literal substrings `VALUE FUZZING` and `MANDATORY`, must appear verbatim.
fn build_web_recon_prompt(host: &str, port: u16, service: &str) -> String {
    let url = format!("http://{host}:{port}");
    let mut out = String::new();

    out.push_str(&format!(
        "WEB RECON TASK: {host}:{port} ({service})\n\n"
    ));

    out.push_str("1. TECHNOLOGY DETECTION\n");
    out.push_str(&format!(
        "First pass: run `curl -isk {url}/` and note server banner, framework headers, and cookies.\n\n"
    ));

    out.push_str("2. ENDPOINT ENUMERATION\n");
    out.push_str(
        "Fuzz for endpoints with a wordlist and the extensions relevant to the detected stack. \
         `-of json` is MANDATORY so results can be parsed. Do not enable recursion.\n\n",
    );

    out.push_str("3. ENDPOINT PROFILING\n");
    out.push_str(
        "Profile every discovered endpoint with curl, skipping static extensions \
         (js, css, jpg, png, ico, svg, woff, font).\n\n",
    );

    out.push_str("4. PARAMETER FUZZING\n");
    out.push_str("Fuzz query-string and body parameter names on profiled endpoints.\n\n");

    out.push_str("5. VALUE FUZZING (MANDATORY)\n");
    out.push_str(
        "Once parameters are discovered, VALUE FUZZING across all six MANDATORY categories is \
         required before this task may complete:\n",
    );
    for (name, description) in FUZZ_CATEGORIES {
        out.push_str(&format!("- {name}: {description}\n"));
    }
    out.push('\n');

    out.push_str("6. BASELINE COMPARISON\n");
    out.push_str(&format!(
        "Capture a baseline with `curl -w \"%{{http_code}} %{{size_download}} %{{time_total}}\" {url}/` \
         and compare each fuzzed request against it: a status-code change is high severity, a \
         content-length change of 10% or more is medium severity, and a response time 5x the \
         baseline is medium severity.\n\n"
    ));

    out.push_str("7. VIRTUAL-HOST DISCOVERY\n");
    out.push_str(&format!(
        "Fuzz the Host header against {host} to discover additional virtual hosts sharing this port.\n"
    ));

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_contains_required_literals() {
        let prompt = build_web_recon_prompt("10.0.0.1", 80, "http");
        assert!(prompt.contains("VALUE FUZZING"));
        assert!(prompt.contains("MANDATORY"));
        for (name, description) in FUZZ_CATEGORIES {
            assert!(prompt.contains(name), "missing category name {name}");
            assert!(prompt.contains(description), "missing category description for {name}");
        }
    }

    #[tokio::test]
    async fn spawn_port_returns_false_when_cancelled() {
        use crate::domain::ports::{Brain, BrainError, CommandResult, RunnerError};
        use async_trait::async_trait;
        use tokio::sync::oneshot;

        struct NoopRunner;
        #[async_trait]
        impl CommandRunner for NoopRunner {
            async fn run(
                &self,
                _ctx: CancellationToken,
                _command: &str,
            ) -> Result<(bool, mpsc::Receiver<String>, oneshot::Receiver<CommandResult>), RunnerError>
            {
                unreachable!()
            }
            async fn force_run(
                &self,
                _ctx: CancellationToken,
                _command: &str,
            ) -> (mpsc::Receiver<String>, oneshot::Receiver<CommandResult>) {
                unreachable!()
            }
            fn auto_approve(&self) -> bool {
                true
            }
        }
        struct NoopBrain;
        #[async_trait]
        impl Brain for NoopBrain {
            async fn decide(
                &self,
                _input: crate::domain::models::BrainInput,
            ) -> Result<crate::domain::models::Action, BrainError> {
                Ok(crate::domain::models::Action::Complete { thought: None })
            }
        }

        let tree = Arc::new(ReconTree::new("10.0.0.1"));
        tree.add_port(80, "http", "nginx");
        let manager = TaskManager::new(Some(Arc::new(NoopBrain)));
        let ctx = CancellationToken::new();
        ctx.cancel();
        let (events, _rx) = mpsc::channel(16);
        let spawned = ReconRunner::new()
            .spawn_port(&ctx, &manager, Arc::new(NoopRunner), events, tree, 1, "10.0.0.1", 80, "http", 50)
            .await;
        assert!(!spawned);
    }

    #[tokio::test]
    async fn spawn_port_defers_when_saturated() {
        use crate::domain::ports::{Brain, BrainError, CommandResult, RunnerError};
        use async_trait::async_trait;
        use tokio::sync::oneshot;

        struct NoopRunner;
        #[async_trait]
        impl CommandRunner for NoopRunner {
            async fn run(
                &self,
                _ctx: CancellationToken,
                _command: &str,
            ) -> Result<(bool, mpsc::Receiver<String>, oneshot::Receiver<CommandResult>), RunnerError>
            {
                unreachable!()
            }
            async fn force_run(
                &self,
                _ctx: CancellationToken,
                _command: &str,
            ) -> (mpsc::Receiver<String>, oneshot::Receiver<CommandResult>) {
                let (_tx, rx) = mpsc::channel(1);
                let (_result_tx, result_rx) = oneshot::channel();
                (rx, result_rx)
            }
            fn auto_approve(&self) -> bool {
                true
            }
        }
        struct NoopBrain;
        #[async_trait]
        impl Brain for NoopBrain {
            async fn decide(
                &self,
                _input: crate::domain::models::BrainInput,
            ) -> Result<crate::domain::models::Action, BrainError> {
                Ok(crate::domain::models::Action::Complete { thought: None })
            }
        }

        let tree = Arc::new(ReconTree::with_max_parallel("10.0.0.1", 1));
        tree.add_port(80, "http", "nginx");
        tree.add_port(8080, "http", "nginx");
        assert!(tree.start_port_recon("10.0.0.1", 80)); // saturate

        let manager = TaskManager::new(Some(Arc::new(NoopBrain)));
        let ctx = CancellationToken::new();
        let (events, _rx) = mpsc::channel(16);
        let spawned = ReconRunner::new()
            .spawn_port(&ctx, &manager, Arc::new(NoopRunner), events, tree, 1, "10.0.0.1", 8080, "http", 50)
            .await;
        assert!(!spawned);
    }
}
