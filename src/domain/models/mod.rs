//! Domain models for the Pentecter orchestration engine.

pub mod action;
pub mod command_entry;
pub mod config;
pub mod event;
pub mod proposal;
pub mod recon_tree;
pub mod sub_task;
pub mod target;

pub use action::{Action, BrainInput, MemoryPayload, MemorySeverity};
pub use command_entry::{CommandEntry, CommandHistory, HISTORY_CAPACITY};
pub use config::{LogConfig, LogFormat, PentecterConfig};
pub use event::{Event, EventKind};
pub use proposal::Proposal;
pub use recon_tree::{
    CurlBaseline, Finding, FindingCategory, PendingTask, ReconNode, ReconTree, Severity, TaskKind,
    TaskStatus, TaskStatuses,
};
pub use sub_task::{SubTask, SubTaskMetadata, SubTaskStatus};
pub use target::{Entity, HostKind, Target, TargetStatus};
