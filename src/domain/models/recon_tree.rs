//! `ReconTree`: the shared, mutation-safe structured model of reconnaissance
//! state for one target — ports, endpoints, vhosts, per-task progress, and
//! findings.
//!
//! All mutation and traversal is serialized by a single readers-writer
//! lock. Nothing here blocks on I/O; mutators only ever hold the lock long
//! enough to update in-memory state.

use std::sync::RwLock;

use serde::{Deserialize, Serialize};

/// One of the four reconnaissance activities tracked per node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    EndpointEnum,
    ParamFuzz,
    Profiling,
    VhostDiscov,
}

impl TaskKind {
    /// Priority order used by `NextBatch`: endpoint-enum > param-fuzz >
    /// profiling > vhost-discov.
    pub const PRIORITY: [TaskKind; 4] = [
        TaskKind::EndpointEnum,
        TaskKind::ParamFuzz,
        TaskKind::Profiling,
        TaskKind::VhostDiscov,
    ];
}

/// Progress of one `TaskKind` on one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    None,
    Pending,
    InProgress,
    Complete,
}

/// The four task-status fields carried by every node.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TaskStatuses {
    pub endpoint_enum: TaskStatus,
    pub param_fuzz: TaskStatus,
    pub profiling: TaskStatus,
    pub vhost_discov: TaskStatus,
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::None
    }
}

impl TaskStatuses {
    pub fn get(&self, kind: TaskKind) -> TaskStatus {
        match kind {
            TaskKind::EndpointEnum => self.endpoint_enum,
            TaskKind::ParamFuzz => self.param_fuzz,
            TaskKind::Profiling => self.profiling,
            TaskKind::VhostDiscov => self.vhost_discov,
        }
    }

    pub fn set(&mut self, kind: TaskKind, status: TaskStatus) {
        match kind {
            TaskKind::EndpointEnum => self.endpoint_enum = status,
            TaskKind::ParamFuzz => self.param_fuzz = status,
            TaskKind::Profiling => self.profiling = status,
            TaskKind::VhostDiscov => self.vhost_discov = status,
        }
    }

    fn all(&self) -> [TaskStatus; 4] {
        [
            self.endpoint_enum,
            self.param_fuzz,
            self.profiling,
            self.vhost_discov,
        ]
    }
}

/// The fuzz-value category a finding was produced under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingCategory {
    Sqli,
    XssProbe,
    Cmdi,
    Path,
    Ssti,
    Numeric,
}

/// Severity of a `Finding`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    High,
    Medium,
    Low,
    Info,
}

/// A recorded anomaly from value-fuzzing baseline comparison.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub parameter: String,
    pub category: FindingCategory,
    pub evidence: String,
    pub severity: Severity,
}

/// Captured `curl -w` metrics for a node's first (unfuzzed) request,
/// compared against later requests to the same path to surface anomalies.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurlBaseline {
    pub http_code: u32,
    pub size_download: u64,
    pub time_total: f64,
}

/// One node in the recon tree: a port, a vhost, or a discovered endpoint
/// underneath either.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconNode {
    pub host: String,
    pub port: u16,
    pub service: String,
    pub banner: String,
    /// `""`/`"/"` at a port or vhost root; the discovered path for a child
    /// endpoint.
    pub path: String,
    pub tasks: TaskStatuses,
    pub findings: Vec<Finding>,
    pub baseline: Option<CurlBaseline>,
    pub children: Vec<ReconNode>,
}

impl ReconNode {
    fn new_root(host: impl Into<String>, port: u16, service: impl Into<String>, banner: impl Into<String>) -> Self {
        let service = service.into();
        let http = is_http_service(&service);
        Self {
            host: host.into(),
            port,
            service,
            banner: banner.into(),
            path: String::new(),
            tasks: TaskStatuses {
                endpoint_enum: if http { TaskStatus::Pending } else { TaskStatus::None },
                param_fuzz: TaskStatus::None,
                profiling: TaskStatus::None,
                vhost_discov: if http { TaskStatus::Pending } else { TaskStatus::None },
            },
            findings: Vec::new(),
            baseline: None,
            children: Vec::new(),
        }
    }

    fn new_child(host: impl Into<String>, port: u16, path: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            service: "http".to_string(),
            banner: String::new(),
            path: path.into(),
            tasks: TaskStatuses {
                endpoint_enum: TaskStatus::Pending,
                param_fuzz: TaskStatus::Pending,
                profiling: TaskStatus::Pending,
                vhost_discov: TaskStatus::None,
            },
            findings: Vec::new(),
            baseline: None,
            children: Vec::new(),
        }
    }

    fn new_vhost(vhost_name: impl Into<String>, port: u16) -> Self {
        Self {
            host: vhost_name.into(),
            port,
            service: "http".to_string(),
            banner: String::new(),
            path: String::new(),
            tasks: TaskStatuses {
                endpoint_enum: TaskStatus::Pending,
                param_fuzz: TaskStatus::None,
                profiling: TaskStatus::None,
                vhost_discov: TaskStatus::Pending,
            },
            findings: Vec::new(),
            baseline: None,
            children: Vec::new(),
        }
    }

    fn matches(&self, host: &str, port: u16, path: &str) -> bool {
        self.host == host && self.port == port && paths_equivalent(&self.path, path)
    }

    fn find_mut(&mut self, host: &str, port: u16, path: &str) -> Option<&mut ReconNode> {
        if self.matches(host, port, path) {
            return Some(self);
        }
        for child in &mut self.children {
            if let Some(found) = child.find_mut(host, port, path) {
                return Some(found);
            }
        }
        None
    }

    fn collect_pending(&self, kind: TaskKind, out: &mut Vec<PendingTask>) {
        if self.tasks.get(kind) == TaskStatus::Pending {
            out.push(PendingTask {
                host: self.host.clone(),
                port: self.port,
                path: self.path.clone(),
                kind,
            });
        }
        for child in &self.children {
            child.collect_pending(kind, out);
        }
    }

    fn for_each_mut(&mut self, f: &mut impl FnMut(&mut ReconNode)) {
        f(self);
        for child in &mut self.children {
            child.for_each_mut(f);
        }
    }

    fn count_into(&self, pending: &mut usize, in_progress: &mut usize, complete: &mut usize, findings: &mut usize) {
        for status in self.tasks.all() {
            match status {
                TaskStatus::Pending => *pending += 1,
                TaskStatus::InProgress => *in_progress += 1,
                TaskStatus::Complete => *complete += 1,
                TaskStatus::None => {}
            }
        }
        *findings += self.findings.len();
        for child in &self.children {
            child.count_into(pending, in_progress, complete, findings);
        }
    }

    fn render_into(&self, out: &mut String, depth: usize) {
        let indent = "  ".repeat(depth);
        out.push_str(&format!(
            "{indent}- {}:{}{} [{}]{}\n",
            self.host,
            self.port,
            if self.path.is_empty() { String::new() } else { self.path.clone() },
            self.service,
            if self.banner.is_empty() { String::new() } else { format!(" ({})", self.banner) },
        ));
        for child in &self.children {
            child.render_into(out, depth + 1);
        }
    }
}

fn is_http_service(service: &str) -> bool {
    service.to_lowercase().contains("http")
}

fn paths_equivalent(a: &str, b: &str) -> bool {
    fn norm(p: &str) -> &str {
        if p.is_empty() || p == "/" { "" } else { p }
    }
    norm(a) == norm(b)
}

fn render_active_lines(node: &ReconNode, out: &mut String) {
    for kind in TaskKind::PRIORITY {
        if node.tasks.get(kind) == TaskStatus::InProgress {
            out.push_str(&format!(
                "[active] {kind:?} {}:{}{}\n",
                node.host, node.port, node.path
            ));
        }
    }
    for child in &node.children {
        render_active_lines(child, out);
    }
}

/// A pending reconnaissance task surfaced by `NextBatch`, precise enough to
/// pass to `StartTask`/`FinishTask`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingTask {
    pub host: String,
    pub port: u16,
    pub path: String,
    pub kind: TaskKind,
}

struct TreeState {
    active: usize,
    locked: bool,
    ports: Vec<ReconNode>,
    vhosts: Vec<ReconNode>,
}

impl TreeState {
    fn find_mut(&mut self, host: &str, port: u16, path: &str) -> Option<&mut ReconNode> {
        if let Some(node) = self
            .ports
            .iter_mut()
            .find_map(|root| root.find_mut(host, port, path))
        {
            return Some(node);
        }
        self.vhosts
            .iter_mut()
            .find_map(|root| root.find_mut(host, port, path))
    }

    fn for_each_mut(&mut self, f: &mut impl FnMut(&mut ReconNode)) {
        for root in self.ports.iter_mut() {
            root.for_each_mut(f);
        }
        for root in self.vhosts.iter_mut() {
            root.for_each_mut(f);
        }
    }
}

/// The rooted multi-tree of reconnaissance state for one target.
pub struct ReconTree {
    pub host: String,
    pub max_parallel: usize,
    state: RwLock<TreeState>,
}

impl ReconTree {
    pub fn new(host: impl Into<String>) -> Self {
        Self::with_max_parallel(host, 2)
    }

    pub fn with_max_parallel(host: impl Into<String>, max_parallel: usize) -> Self {
        Self {
            host: host.into(),
            max_parallel,
            state: RwLock::new(TreeState {
                active: 0,
                locked: true,
                ports: Vec::new(),
                vhosts: Vec::new(),
            }),
        }
    }

    /// Idempotent by port number: a second call updates `service` and
    /// keeps the longer banner instead of creating a duplicate node.
    pub fn add_port(&self, port: u16, service: impl Into<String>, banner: impl Into<String>) {
        let service = service.into();
        let banner = banner.into();
        let mut state = self.state.write().unwrap();
        let host = self.host.clone();
        if let Some(existing) = state.ports.iter_mut().find(|p| p.port == port) {
            existing.service = service;
            if banner.len() > existing.banner.len() {
                existing.banner = banner;
            }
        } else {
            state.ports.push(ReconNode::new_root(host, port, service, banner));
        }
    }

    /// Locates the parent by `(host, port, parent_path)` and appends a
    /// child endpoint. A miss (unknown parent) is a silent no-op by
    /// design — see DESIGN.md's open-question note.
    pub fn add_endpoint(&self, host: &str, port: u16, parent_path: &str, new_path: &str) {
        let mut state = self.state.write().unwrap();
        let new_path_owned = new_path.to_string();
        let host_owned = host.to_string();
        if let Some(parent) = state.find_mut(host, port, parent_path) {
            parent
                .children
                .push(ReconNode::new_child(host_owned, port, new_path_owned));
        }
    }

    pub fn add_vhost(&self, parent_host: &str, port: u16, vhost_name: &str) {
        let _ = parent_host; // vhosts are addressed by their own name henceforth
        let mut state = self.state.write().unwrap();
        state.vhosts.push(ReconNode::new_vhost(vhost_name, port));
    }

    pub fn complete_task(&self, host: &str, port: u16, path: &str, kind: TaskKind) {
        let mut state = self.state.write().unwrap();
        if let Some(node) = state.find_mut(host, port, path) {
            node.tasks.set(kind, TaskStatus::Complete);
        }
    }

    pub fn add_finding(&self, host: &str, port: u16, path: &str, finding: Finding) {
        let mut state = self.state.write().unwrap();
        if let Some(node) = state.find_mut(host, port, path) {
            node.findings.push(finding);
        }
    }

    /// The findings recorded against one node, or empty if the node is
    /// unknown or has none.
    pub fn snapshot_findings(&self, host: &str, port: u16, path: &str) -> Vec<Finding> {
        let mut state = self.state.write().unwrap();
        match state.find_mut(host, port, path) {
            Some(node) => node.findings.clone(),
            None => Vec::new(),
        }
    }

    /// Records `metrics` as the node's baseline the first time it's seen,
    /// returning `None` in that case. A node that already has a baseline
    /// keeps it and returns the stored value for the caller to diff
    /// against; an unknown node also returns `None`.
    pub fn capture_or_get_baseline(
        &self,
        host: &str,
        port: u16,
        path: &str,
        metrics: CurlBaseline,
    ) -> Option<CurlBaseline> {
        let mut state = self.state.write().unwrap();
        match state.find_mut(host, port, path) {
            Some(node) => {
                if let Some(existing) = node.baseline {
                    return Some(existing);
                }
                node.baseline = Some(metrics);
                None
            }
            None => None,
        }
    }

    /// Up to `max_parallel - active` pending tasks, in priority order
    /// (endpoint-enum > param-fuzz > profiling > vhost-discov), each tier
    /// walked depth-first over ports then vhosts in insertion order.
    pub fn next_batch(&self) -> Vec<PendingTask> {
        let state = self.state.read().unwrap();
        let capacity = self.max_parallel.saturating_sub(state.active);
        let mut out = Vec::new();
        if capacity == 0 {
            return out;
        }
        'tiers: for kind in TaskKind::PRIORITY {
            for root in state.ports.iter().chain(state.vhosts.iter()) {
                root.collect_pending(kind, &mut out);
                if out.len() >= capacity {
                    break 'tiers;
                }
            }
        }
        out.truncate(capacity);
        out
    }

    /// Marks the task in-progress and admits it against `active`, bounded
    /// by `max_parallel`. Returns `false` (no-op) if the bound is already
    /// saturated.
    pub fn start_task(&self, task: &PendingTask) -> bool {
        let mut state = self.state.write().unwrap();
        if state.active >= self.max_parallel {
            return false;
        }
        let found = state.find_mut(&task.host, task.port, &task.path);
        match found {
            Some(node) if node.tasks.get(task.kind) == TaskStatus::Pending => {
                node.tasks.set(task.kind, TaskStatus::InProgress);
                state.active += 1;
                true
            }
            _ => false,
        }
    }

    pub fn finish_task(&self, task: &PendingTask) {
        let mut state = self.state.write().unwrap();
        state.active = state.active.saturating_sub(1);
        if let Some(node) = state.find_mut(&task.host, task.port, &task.path) {
            node.tasks.set(task.kind, TaskStatus::Complete);
        }
    }

    /// Atomic admission for a whole port's web-recon sub-agent: if
    /// `active >= max_parallel`, returns `false` without mutating
    /// anything; otherwise flips every pending task on the matching port
    /// node to in-progress and increments `active` once.
    pub fn start_port_recon(&self, host: &str, port: u16) -> bool {
        let mut state = self.state.write().unwrap();
        if state.active >= self.max_parallel {
            return false;
        }
        let Some(node) = state.ports.iter_mut().find(|p| p.host == host && p.port == port) else {
            return false;
        };
        for kind in TaskKind::PRIORITY {
            if node.tasks.get(kind) == TaskStatus::Pending {
                node.tasks.set(kind, TaskStatus::InProgress);
            }
        }
        state.active += 1;
        true
    }

    /// Flips every in-progress task on nodes matching `port` (port nodes,
    /// vhost nodes, and their children) to complete, and decrements
    /// `active` by one — once per sub-agent, not once per task.
    pub fn complete_all_port_tasks(&self, port: u16) {
        let mut state = self.state.write().unwrap();
        state.active = state.active.saturating_sub(1);
        let mut flip = |node: &mut ReconNode| {
            if node.port != port {
                return;
            }
            for kind in TaskKind::PRIORITY {
                if node.tasks.get(kind) == TaskStatus::InProgress {
                    node.tasks.set(kind, TaskStatus::Complete);
                }
            }
        };
        state.for_each_mut(&mut flip);
    }

    fn counts(&self) -> (usize, usize, usize, usize) {
        let state = self.state.read().unwrap();
        let (mut pending, mut in_progress, mut complete, mut findings) = (0, 0, 0, 0);
        for root in state.ports.iter().chain(state.vhosts.iter()) {
            root.count_into(&mut pending, &mut in_progress, &mut complete, &mut findings);
        }
        (pending, in_progress, complete, findings)
    }

    pub fn count_pending(&self) -> usize {
        self.counts().0
    }

    pub fn count_in_progress(&self) -> usize {
        self.counts().1
    }

    pub fn count_complete(&self) -> usize {
        self.counts().2
    }

    pub fn count_total(&self) -> usize {
        let (pending, in_progress, complete, _) = self.counts();
        pending + in_progress + complete
    }

    pub fn count_findings(&self) -> usize {
        self.counts().3
    }

    pub fn active(&self) -> usize {
        self.state.read().unwrap().active
    }

    /// `true` while locked; auto-clears (and persists the clear) once
    /// `total > 0 && pending == 0`.
    pub fn is_locked(&self) -> bool {
        let currently_locked = self.state.read().unwrap().locked;
        if !currently_locked {
            return false;
        }
        let (pending, _, complete, _) = self.counts();
        let total = pending + complete + self.count_in_progress();
        if total > 0 && pending == 0 {
            self.state.write().unwrap().locked = false;
            false
        } else {
            true
        }
    }

    pub fn unlock(&self) {
        self.state.write().unwrap().locked = false;
    }

    pub fn render_tree(&self) -> String {
        let state = self.state.read().unwrap();
        let mut out = format!("{} (max_parallel={})\n", self.host, self.max_parallel);
        for root in &state.ports {
            root.render_into(&mut out, 1);
        }
        for root in &state.vhosts {
            root.render_into(&mut out, 1);
        }
        out
    }

    /// Prompt-injectable summary of outstanding reconnaissance work.
    /// Empty when the tree is unlocked or there is nothing pending.
    pub fn render_queue(&self) -> String {
        if !self.is_locked() {
            return String::new();
        }
        let pending = self.count_pending();
        if pending == 0 {
            return String::new();
        }
        let active = self.active();
        let mut out = format!(
            "RECON QUEUE ({pending} pending, {active} active, max_parallel={}):\n",
            self.max_parallel
        );
        out.push_str(
            "MANDATORY: work the queue in priority order — endpoint enumeration, then parameter fuzzing, then profiling, then vhost discovery.\n",
        );

        let state = self.state.read().unwrap();

        // Reuse the same priority/DFS ordering NextBatch uses, but render
        // up to 10 regardless of max_parallel.
        let mut batch = Vec::new();
        'tiers: for kind in TaskKind::PRIORITY {
            for root in state.ports.iter().chain(state.vhosts.iter()) {
                root.collect_pending(kind, &mut batch);
                if batch.len() >= 10 {
                    break 'tiers;
                }
            }
        }
        batch.truncate(10);
        for (i, task) in batch.iter().enumerate() {
            let label = if i == 0 { "[next]" } else { "[queued]" };
            out.push_str(&format!(
                "{label} {:?} {}:{}{}\n",
                task.kind, task.host, task.port, task.path
            ));
        }

        for root in state.ports.iter().chain(state.vhosts.iter()) {
            render_active_lines(root, &mut out);
        }
        out
    }

    /// Prompt-injectable summary of what's been discovered so far. Empty
    /// when there is nothing to report.
    pub fn render_intel(&self) -> String {
        let state = self.state.read().unwrap();
        if state.ports.is_empty() && state.vhosts.is_empty() {
            return String::new();
        }
        let mut out = String::from("RECON INTEL:\n");
        for port in &state.ports {
            out.push_str(&format!(
                "- port {} [{}]{}\n",
                port.port,
                port.service,
                if port.banner.is_empty() { String::new() } else { format!(" ({})", port.banner) }
            ));
        }
        for vhost in &state.vhosts {
            out.push_str(&format!("- vhost {} (port {})\n", vhost.host, vhost.port));
        }
        let findings = self.count_findings();
        if findings > 0 {
            out.push_str(&format!("- {findings} finding(s) recorded\n"));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_port_is_idempotent_and_keeps_longer_banner() {
        let tree = ReconTree::new("10.0.0.1");
        tree.add_port(80, "http", "Apache");
        tree.add_port(80, "http", "Apache 2.4.49");
        assert_eq!(tree.count_total(), 2); // endpoint-enum + vhost-discov pending
        let rendered = tree.render_tree();
        assert!(rendered.contains("Apache 2.4.49"));
        assert!(!rendered.contains("Apache)"));
    }

    #[test]
    fn non_http_port_gets_no_pending_tasks() {
        let tree = ReconTree::new("10.0.0.1");
        tree.add_port(22, "ssh", "OpenSSH 8.9");
        assert_eq!(tree.count_total(), 0);
    }

    #[test]
    fn add_endpoint_miss_is_silent_noop() {
        let tree = ReconTree::new("10.0.0.1");
        tree.add_endpoint("10.0.0.1", 80, "/", "/admin");
        assert_eq!(tree.count_total(), 0);
    }

    #[test]
    fn next_batch_respects_max_parallel() {
        let tree = ReconTree::with_max_parallel("10.0.0.1", 2);
        tree.add_port(80, "http", "nginx");
        tree.add_endpoint("10.0.0.1", 80, "/", "/api");
        tree.add_endpoint("10.0.0.1", 80, "/", "/login");
        tree.add_endpoint("10.0.0.1", 80, "/", "/admin");

        let batch = tree.next_batch();
        assert_eq!(batch.len(), 2);
        for task in &batch {
            assert!(tree.start_task(task));
        }
        assert_eq!(tree.next_batch().len(), 0);
    }

    #[test]
    fn start_port_recon_admission_is_atomic() {
        let tree = ReconTree::with_max_parallel("10.0.0.1", 1);
        tree.add_port(80, "http", "nginx");
        tree.add_port(8080, "http", "nginx");
        assert!(tree.start_port_recon("10.0.0.1", 80));
        assert!(!tree.start_port_recon("10.0.0.1", 8080));
        tree.complete_all_port_tasks(80);
        assert!(tree.start_port_recon("10.0.0.1", 8080));
    }

    #[test]
    fn is_locked_autoclears_once_pending_drains() {
        let tree = ReconTree::new("10.0.0.1");
        assert!(tree.is_locked());
        tree.add_port(80, "http", "nginx");
        assert!(tree.is_locked());
        for task in tree.next_batch() {
            tree.start_task(&task);
            tree.finish_task(&task);
        }
        assert!(!tree.is_locked());
    }

    #[test]
    fn active_never_goes_negative() {
        let tree = ReconTree::new("10.0.0.1");
        tree.complete_all_port_tasks(80); // no-op port, would underflow naively
        assert_eq!(tree.active(), 0);
    }
}
