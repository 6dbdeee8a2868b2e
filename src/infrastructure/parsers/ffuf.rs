//! Parses `ffuf -of json` output and classifies the fuzzing mode from the
//! command line that produced it.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use crate::domain::error::ParseError;

/// Which recon phase a ffuf invocation belongs to, decided from the command
/// line rather than the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfufMode {
    VhostDiscovery,
    ParamFuzz,
    EndpointEnum,
}

/// One fuzzed result, resolved to a concrete path/vhost string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FfufEntry {
    pub resolved: String,
}

/// A parsed run: its mode, the parent path the `-u` flag names (with `FUZZ`
/// stripped), and every non-filtered result.
#[derive(Debug, Clone)]
pub struct FfufOutcome {
    pub mode: FfufMode,
    pub parent_path: String,
    pub entries: Vec<FfufEntry>,
}

static U_FLAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"-u\s+(\S+)").unwrap());

#[derive(Deserialize)]
struct FfufFile {
    results: Vec<FfufResultRow>,
}

#[derive(Deserialize)]
struct FfufResultRow {
    #[serde(default)]
    url: String,
    #[serde(default)]
    input: std::collections::HashMap<String, String>,
}

/// Classifies the fuzzing mode from the command line: `-H Host:` implies
/// vhost discovery; a literal `FUZZ` inside a query string implies
/// parameter fuzzing; anything else is endpoint enumeration.
pub fn detect_mode(command: &str) -> FfufMode {
    if command.contains("-H Host:") || command.contains("-H \"Host:") {
        FfufMode::VhostDiscovery
    } else if command.contains("?FUZZ=") || command.contains("FUZZ=value") {
        FfufMode::ParamFuzz
    } else {
        FfufMode::EndpointEnum
    }
}

/// The `-u` flag's URL with the literal `FUZZ` token stripped, used as the
/// parent path results without their own `url` field are joined onto.
pub fn parent_path(command: &str) -> String {
    let Some(url) = U_FLAG.captures(command).and_then(|c| c.get(1)) else {
        return String::new();
    };
    url.as_str().replace("FUZZ", "")
}

fn join(parent: &str, fuzz_value: &str) -> String {
    if parent.ends_with('/') {
        format!("{parent}{fuzz_value}")
    } else {
        format!("{parent}/{fuzz_value}")
    }
}

/// Parses `ffuf -of json` output. For endpoint/param fuzzing, each result's
/// own `url` field is preferred, falling back to the `FUZZ` input value
/// joined onto `parent_path`. Vhost discovery fuzzes the `Host:` header, so
/// `url` never changes between results — there the raw `FUZZ` value (the
/// candidate vhost name) is always used.
pub fn parse(json: &str, command: &str) -> Result<FfufOutcome, ParseError> {
    let file: FfufFile =
        serde_json::from_str(json).map_err(|e| ParseError::FfufJson(e.to_string()))?;
    let parent = parent_path(command);
    let mode = detect_mode(command);

    let entries = file
        .results
        .into_iter()
        .map(|row| {
            let fuzz_value = row.input.get("FUZZ").cloned().unwrap_or_default();
            let resolved = if mode == FfufMode::VhostDiscovery {
                fuzz_value
            } else if !row.url.is_empty() {
                row.url
            } else {
                join(&parent, &fuzz_value)
            };
            FfufEntry { resolved }
        })
        .collect();

    Ok(FfufOutcome {
        mode,
        parent_path: parent,
        entries,
    })
}
