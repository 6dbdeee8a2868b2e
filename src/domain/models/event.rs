//! UI event stream emitted by `Loop`s and `SmartSubAgent`s.
//!
//! Emission is non-blocking (drop-if-full): the UI is a cache of the event
//! stream, not a ledger. Semantic state (`Target`, `SubTask`, `ReconTree`)
//! is authoritative and always consistent independent of whether an event
//! describing a transition was actually delivered.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One message in the UI event stream, tagged with the target it concerns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub target_id: u64,
    pub timestamp: DateTime<Utc>,
    pub kind: EventKind,
}

impl Event {
    pub fn new(target_id: u64, kind: EventKind) -> Self {
        Self {
            target_id,
            timestamp: Utc::now(),
            kind,
        }
    }
}

/// The enumerated event types a `Loop` or `SmartSubAgent` can emit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum EventKind {
    Log { message: String },
    TurnStart { turn: u64 },
    ThinkStart,
    ThinkDone { elapsed_ms: u64 },
    CmdStart { command: String },
    CmdOutput { line: String },
    CmdDone { exit_code: i32, duration_ms: u64, summary: String },
    Proposal { description: String, command: String },
    SubtaskStart { task_id: String, goal: String },
    SubtaskLog { task_id: String, line: String },
    SubtaskComplete { task_id: String, status: String },
    AddTarget { host: String },
    Stalled,
    Complete,
    Error { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_with_target_id() {
        let e = Event::new(7, EventKind::ThinkStart);
        assert_eq!(e.target_id, 7);
        matches!(e.kind, EventKind::ThinkStart);
    }
}
