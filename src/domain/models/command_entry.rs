//! Ring-bounded command history used to build Brain context and to detect
//! repetition.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The number of most-recent commands retained per `Loop`.
pub const HISTORY_CAPACITY: usize = 10;

/// One executed command, truncated for prompt injection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandEntry {
    pub command: String,
    pub exit_code: i32,
    pub summary: String,
    pub timestamp: DateTime<Utc>,
}

impl CommandEntry {
    pub fn new(command: impl Into<String>, exit_code: i32, output: &str) -> Self {
        Self {
            command: command.into(),
            exit_code,
            summary: truncate_summary(output),
            timestamp: Utc::now(),
        }
    }
}

fn truncate_summary(output: &str) -> String {
    if output.len() <= 200 {
        output.to_string()
    } else {
        output.chars().take(200).collect()
    }
}

/// A fixed-capacity command history, oldest entries evicted first.
#[derive(Debug, Default)]
pub struct CommandHistory {
    entries: VecDeque<CommandEntry>,
}

impl CommandHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: CommandEntry) {
        if self.entries.len() >= HISTORY_CAPACITY {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The most recent `n` entries, oldest first.
    pub fn last_n(&self, n: usize) -> Vec<&CommandEntry> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip).collect()
    }

    /// Render the last `n` entries as `N. \`cmd\` → exit K[: summary]`, one
    /// per line, 1-indexed from the oldest of the selected window.
    pub fn format_last_n(&self, n: usize) -> String {
        self.last_n(n)
            .iter()
            .enumerate()
            .map(|(i, e)| {
                if e.summary.is_empty() {
                    format!("{}. `{}` \u{2192} exit {}", i + 1, e.command, e.exit_code)
                } else {
                    format!(
                        "{}. `{}` \u{2192} exit {}: {}",
                        i + 1,
                        e.command,
                        e.exit_code,
                        e.summary
                    )
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}
