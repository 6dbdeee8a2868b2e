//! Command-result evaluation: failure-pattern matching, binary extraction
//! for repetition detection, and tool-family recognition for dispatching
//! raw output to the right parser.

use crate::domain::models::CommandHistory;

/// Case-insensitive substrings that, if found anywhere in a command's
/// output, mark the result a failure regardless of exit code. Checked in
/// addition to "begins with `Error:`" and "output is empty".
const FAILURE_PATTERNS: &[&str] = &[
    "0 hosts up",
    "host seems down",
    "host is down",
    "no route to host",
    "connection refused",
    "connection timed out",
    "network is unreachable",
    "name or service not known",
    "couldn't connect to host",
    "syntaxerror",
    "command not found",
    "no such file or directory",
    "permission denied",
    "traceback (most recent call last)",
    "modulenotfounderror",
    "importerror",
    "panic:",
    "nameerror",
    "segmentation fault",
];

/// Evaluate a command's exit code and truncated output against the two
/// failure signals combined with logical OR.
pub fn is_failure(exit_code: i32, output: &str) -> bool {
    if exit_code != 0 {
        return true;
    }
    if output.is_empty() {
        return true;
    }
    if output.starts_with("Error:") {
        return true;
    }
    let lower = output.to_lowercase();
    FAILURE_PATTERNS.iter().any(|pattern| lower.contains(pattern))
}

/// Strip a leading `sudo` and any directory components, leaving the bare
/// binary name a command invokes.
pub fn extract_binary(command: &str) -> String {
    let mut tokens = command.split_whitespace();
    let Some(first) = tokens.next() else {
        return String::new();
    };
    let first_base = basename(first);
    if first_base == "sudo" {
        tokens.next().map(basename).unwrap_or_default()
    } else {
        first_base
    }
}

fn basename(token: &str) -> String {
    token.rsplit('/').next().unwrap_or(token).to_string()
}

/// `true` iff, among the last `<= 5` history entries, some binary name
/// appears 3 or more times.
pub fn detects_repetition(history: &CommandHistory) -> bool {
    let window = history.last_n(5);
    let binaries: Vec<String> = window
        .iter()
        .map(|entry| extract_binary(&entry.command))
        .collect();
    binaries
        .iter()
        .any(|b| !b.is_empty() && binaries.iter().filter(|other| *other == b).count() >= 3)
}

/// The tool family a raw command belongs to, used to pick a parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolFamily {
    Nmap,
    Ffuf,
    Curl,
}

/// Case-insensitive substring match on the command, per the tool-output
/// recognition table.
pub fn tool_family(command: &str) -> Option<ToolFamily> {
    let lower = command.to_lowercase();
    if lower.contains("nmap") {
        Some(ToolFamily::Nmap)
    } else if lower.contains("ffuf") {
        Some(ToolFamily::Ffuf)
    } else if lower.contains("curl") {
        Some(ToolFamily::Curl)
    } else {
        None
    }
}

/// Any ffuf command is rewritten to include `-s` (silent) immediately
/// after the binary name, unless it's already present.
pub fn normalize_ffuf_command(command: &str) -> String {
    if tool_family(command) != Some(ToolFamily::Ffuf) {
        return command.to_string();
    }
    let has_silent = command.split_whitespace().any(|tok| tok == "-s");
    if has_silent {
        return command.to_string();
    }
    let mut parts = command.splitn(2, char::is_whitespace);
    let binary = parts.next().unwrap_or_default();
    let rest = parts.next().unwrap_or_default();
    if rest.is_empty() {
        format!("{binary} -s")
    } else {
        format!("{binary} -s {rest}")
    }
}
