//! The action schema consumed from the Brain, and the input it is given.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Severity for a Brain-recorded memory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemorySeverity {
    High,
    Medium,
    Low,
    Info,
}

/// Payload of a `memory` action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryPayload {
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub description: String,
    pub severity: MemorySeverity,
}

/// A tagged-union action returned by the Brain for one turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    Run {
        thought: Option<String>,
        command: String,
    },
    Propose {
        thought: Option<String>,
        command: String,
    },
    Memory {
        thought: Option<String>,
        memory: MemoryPayload,
    },
    CallMcp {
        thought: Option<String>,
        mcp_server: String,
        mcp_tool: String,
        #[serde(default)]
        mcp_args: HashMap<String, serde_json::Value>,
    },
    SpawnTask {
        thought: Option<String>,
        task_kind: String,
        task_goal: String,
        #[serde(default)]
        task_port: Option<u16>,
        #[serde(default)]
        task_service: Option<String>,
        #[serde(default)]
        task_phase: Option<String>,
        #[serde(default)]
        task_max_turns: Option<u32>,
    },
    Wait {
        thought: Option<String>,
        #[serde(default)]
        task_id: Option<String>,
    },
    KillTask {
        thought: Option<String>,
        task_id: String,
    },
    AddTarget {
        thought: Option<String>,
        target: String,
    },
    SearchKnowledge {
        thought: Option<String>,
        knowledge_query: String,
    },
    ReadKnowledge {
        thought: Option<String>,
        knowledge_path: String,
    },
    Think {
        thought: Option<String>,
    },
    Complete {
        thought: Option<String>,
    },
}

impl Action {
    pub fn thought(&self) -> Option<&str> {
        match self {
            Self::Run { thought, .. }
            | Self::Propose { thought, .. }
            | Self::Memory { thought, .. }
            | Self::CallMcp { thought, .. }
            | Self::SpawnTask { thought, .. }
            | Self::Wait { thought, .. }
            | Self::KillTask { thought, .. }
            | Self::AddTarget { thought, .. }
            | Self::SearchKnowledge { thought, .. }
            | Self::ReadKnowledge { thought, .. }
            | Self::Think { thought }
            | Self::Complete { thought } => thought.as_deref(),
        }
    }
}

/// Everything a Brain is given to decide the next `Action`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrainInput {
    pub target_snapshot: serde_json::Value,
    pub tool_output: String,
    pub last_command: String,
    pub last_exit_code: i32,
    pub command_history: String,
    pub user_message: String,
    pub turn_count: u64,
    pub memory: String,
    pub recon_queue: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_tagged_run_action() {
        let json = serde_json::json!({
            "action": "run",
            "thought": "let's scan",
            "command": "nmap -sV 10.0.0.1"
        });
        let action: Action = serde_json::from_value(json).unwrap();
        match action {
            Action::Run { command, .. } => assert_eq!(command, "nmap -sV 10.0.0.1"),
            other => panic!("unexpected action: {other:?}"),
        }
    }

    #[test]
    fn complete_action_round_trips() {
        let action = Action::Complete { thought: None };
        let json = serde_json::to_value(&action).unwrap();
        assert_eq!(json["action"], "complete");
    }
}
