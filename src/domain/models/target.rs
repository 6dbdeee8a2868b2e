//! Target domain model: per-host session state.

use std::net::IpAddr;
use std::str::FromStr;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use super::proposal::Proposal;

/// Lifecycle state of a `Target`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetStatus {
    Idle,
    Scanning,
    Running,
    Paused,
    Pwned,
    Failed,
}

impl TargetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Scanning => "scanning",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Pwned => "pwned",
            Self::Failed => "failed",
        }
    }
}

/// Cosmetic classification of a target's host string. Never changes which
/// codepath runs; used only to decorate rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostKind {
    Ipv4,
    Ipv6,
    Dns,
}

impl HostKind {
    fn classify(host: &str) -> Self {
        match IpAddr::from_str(host) {
            Ok(IpAddr::V4(_)) => Self::Ipv4,
            Ok(IpAddr::V6(_)) => Self::Ipv6,
            Err(_) => Self::Dns,
        }
    }
}

/// A discovered artifact for a target: a typed name/value pair.
///
/// Deduplicated by `(kind, value)`; the list preserves the order in which
/// distinct entities were first observed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub kind: String,
    pub value: String,
}

impl Entity {
    pub fn new(kind: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            value: value.into(),
        }
    }
}

struct TargetState {
    status: TargetStatus,
    proposal: Option<Proposal>,
    entities: Vec<Entity>,
}

/// One host under assessment.
///
/// All mutable state lives behind a single `RwLock` so status, proposal and
/// entity reads/writes are atomic with respect to each other. `Target` is
/// meant to be shared via `Arc<Target>` between its owning `Loop`, the
/// `Team`, and any `SmartSubAgent`s spawned against the same host.
pub struct Target {
    pub id: u64,
    pub host: String,
    pub host_kind: HostKind,
    state: RwLock<TargetState>,
}

impl Target {
    pub fn new(id: u64, host: impl Into<String>) -> Self {
        let host = host.into();
        let host_kind = HostKind::classify(&host);
        Self {
            id,
            host,
            host_kind,
            state: RwLock::new(TargetState {
                status: TargetStatus::Idle,
                proposal: None,
                entities: Vec::new(),
            }),
        }
    }

    pub fn get_status(&self) -> TargetStatus {
        self.state.read().unwrap().status
    }

    pub fn set_status(&self, status: TargetStatus) {
        self.state.write().unwrap().status = status;
    }

    pub fn get_proposal(&self) -> Option<Proposal> {
        self.state.read().unwrap().proposal.clone()
    }

    /// Setting a non-`None` proposal forces the target into `Paused`.
    pub fn set_proposal(&self, proposal: Proposal) {
        let mut state = self.state.write().unwrap();
        state.proposal = Some(proposal);
        state.status = TargetStatus::Paused;
    }

    pub fn clear_proposal(&self) {
        self.state.write().unwrap().proposal = None;
    }

    /// Merge `entities` into the target's discovered-entity list,
    /// deduplicating by `(kind, value)` and preserving the order of first
    /// occurrence. The list is otherwise append-only.
    pub fn add_entities(&self, entities: impl IntoIterator<Item = Entity>) {
        let mut state = self.state.write().unwrap();
        for entity in entities {
            let exists = state
                .entities
                .iter()
                .any(|e| e.kind == entity.kind && e.value == entity.value);
            if !exists {
                state.entities.push(entity);
            }
        }
    }

    /// A stable copy of the current entity list.
    pub fn snapshot_entities(&self) -> Vec<Entity> {
        self.state.read().unwrap().entities.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proposal_forces_paused() {
        let t = Target::new(1, "10.0.0.1");
        t.set_status(TargetStatus::Scanning);
        t.set_proposal(Proposal::new("nc listener", "nc -lvnp 4444"));
        assert_eq!(t.get_status(), TargetStatus::Paused);
        assert!(t.get_proposal().is_some());
        t.clear_proposal();
        assert!(t.get_proposal().is_none());
    }

    #[test]
    fn entities_dedup_and_preserve_order() {
        let t = Target::new(1, "example.com");
        t.add_entities([
            Entity::new("subdomain", "api.example.com"),
            Entity::new("port", "80"),
        ]);
        t.add_entities([
            Entity::new("subdomain", "api.example.com"), // duplicate
            Entity::new("port", "443"),
        ]);
        let snap = t.snapshot_entities();
        assert_eq!(snap.len(), 3);
        assert_eq!(snap[0].value, "api.example.com");
        assert_eq!(snap[1].value, "80");
        assert_eq!(snap[2].value, "443");
    }

    #[test]
    fn host_kind_classification() {
        assert_eq!(Target::new(1, "192.168.0.1").host_kind, HostKind::Ipv4);
        assert_eq!(Target::new(1, "::1").host_kind, HostKind::Ipv6);
        assert_eq!(Target::new(1, "example.com").host_kind, HostKind::Dns);
    }
}
