//! Ties the tool-output recognition rules (spec §6) together: picks a
//! parser from the command string and applies the result to a `ReconTree`.

use tracing::warn;

use crate::application::evaluation::{tool_family, ToolFamily};
use crate::domain::models::{CurlBaseline, Finding, FindingCategory, ReconTree, Severity, TaskKind};

use super::{curl, ffuf, nmap};

/// Strips scheme/host/port from a full URL, leaving just the path (or `/`
/// if none is present).
fn path_only(url: &str) -> String {
    match curl::parse_target(url) {
        Some(target) if !target.path.is_empty() => target.path,
        _ => "/".to_string(),
    }
}

/// Applies `output` from `command` to `tree` per the tool-output
/// recognition rules. Returns the port a *web-recon* tool (ffuf/curl)
/// targeted, so the caller can follow up with `complete_all_port_tasks`;
/// `None` for nmap (which discovers ports, not a single port's work) or an
/// unrecognized command. Parse failures are logged and otherwise ignored —
/// the tree is simply not updated.
pub fn dispatch(tree: &ReconTree, command: &str, output: &str) -> Option<u16> {
    match tool_family(command) {
        Some(ToolFamily::Nmap) => {
            apply_nmap(tree, output);
            None
        }
        Some(ToolFamily::Ffuf) => apply_ffuf(tree, command, output),
        Some(ToolFamily::Curl) => apply_curl(tree, command, output),
        None => None,
    }
}

fn apply_nmap(tree: &ReconTree, output: &str) {
    let ports = if nmap::is_xml_output(output) {
        match nmap::parse_xml(output) {
            Ok(ports) => ports,
            Err(e) => {
                warn!(error = %e, "nmap xml parse failed");
                return;
            }
        }
    } else {
        nmap::parse_text(output)
    };
    for port in ports {
        tree.add_port(port.port, port.service, port.banner);
    }
}

fn apply_ffuf(tree: &ReconTree, command: &str, output: &str) -> Option<u16> {
    let outcome = match ffuf::parse(output, command) {
        Ok(outcome) => outcome,
        Err(e) => {
            warn!(error = %e, "ffuf json parse failed");
            return None;
        }
    };
    let url_target = curl::parse_target(command)?;
    let port = url_target.port;
    let parent_path = path_only(&outcome.parent_path);

    match outcome.mode {
        ffuf::FfufMode::EndpointEnum => {
            if outcome.entries.is_empty() {
                tree.complete_task(&tree.host, port, &parent_path, TaskKind::EndpointEnum);
            } else {
                for entry in &outcome.entries {
                    let new_path = path_only(&entry.resolved);
                    tree.add_endpoint(&tree.host, port, &parent_path, &new_path);
                }
            }
        }
        ffuf::FfufMode::ParamFuzz => {
            if outcome.entries.is_empty() {
                tree.complete_task(&tree.host, port, &parent_path, TaskKind::ParamFuzz);
            }
        }
        ffuf::FfufMode::VhostDiscovery => {
            if outcome.entries.is_empty() {
                tree.complete_task(&tree.host, port, "/", TaskKind::VhostDiscov);
            } else {
                for entry in &outcome.entries {
                    tree.add_vhost(&tree.host, port, &entry.resolved);
                }
            }
        }
    }
    Some(port)
}

fn apply_curl(tree: &ReconTree, command: &str, output: &str) -> Option<u16> {
    let target = curl::parse_target(command)?;
    let raw_path = if target.path.is_empty() { "/".to_string() } else { target.path };
    let path = strip_query(&raw_path);
    tree.complete_task(&tree.host, target.port, &path, TaskKind::Profiling);

    if let Some(metrics) = curl::parse_metrics(output) {
        let current = CurlBaseline {
            http_code: metrics.http_code,
            size_download: metrics.size_download,
            time_total: metrics.time_total,
        };
        if let Some(baseline) = tree.capture_or_get_baseline(&tree.host, target.port, &path, current) {
            if let Some(finding) = diff_against_baseline(command, &baseline, &current) {
                tree.add_finding(&tree.host, target.port, &path, finding);
            }
        }
    }
    Some(target.port)
}

/// Compares a request's metrics against the path's stored baseline per
/// spec §6's thresholds: a status-code change is high severity; a
/// content-length swing of 10% or more, or a response time 5x the
/// baseline, is medium. Returns `None` when nothing crosses a threshold.
fn diff_against_baseline(command: &str, baseline: &CurlBaseline, current: &CurlBaseline) -> Option<Finding> {
    let (severity, evidence) = if current.http_code != baseline.http_code {
        (Severity::High, format!("status changed {} -> {}", baseline.http_code, current.http_code))
    } else if size_delta_ratio(baseline.size_download, current.size_download) >= 0.10 {
        (
            Severity::Medium,
            format!("content-length changed {} -> {} bytes", baseline.size_download, current.size_download),
        )
    } else if baseline.time_total > 0.0 && current.time_total >= baseline.time_total * 5.0 {
        (
            Severity::Medium,
            format!(
                "response time {:.3}s is {:.1}x the {:.3}s baseline",
                current.time_total,
                current.time_total / baseline.time_total,
                baseline.time_total
            ),
        )
    } else {
        return None;
    };

    let (parameter, category) = classify_payload(command);
    Some(Finding { parameter, category, evidence, severity })
}

/// Drops a query string (and everything after it) from a curl path, so a
/// fuzzed parameter value doesn't address a different tree node than the
/// endpoint's baseline request did.
fn strip_query(path: &str) -> String {
    path.split('?').next().unwrap_or_default().to_string()
}

fn size_delta_ratio(baseline: u64, current: u64) -> f64 {
    if baseline == 0 {
        return if current == 0 { 0.0 } else { 1.0 };
    }
    (current as f64 - baseline as f64).abs() / baseline as f64
}

/// Infers the fuzzed query parameter and payload category from the
/// command line, defaulting to `numeric` when no payload marker known to
/// the other five categories is present.
fn classify_payload(command: &str) -> (String, FindingCategory) {
    let parameter = curl::parse_param(command).unwrap_or_else(|| "unknown".to_string());
    let lower = command.to_lowercase();
    let category = if lower.contains('\'') || lower.contains("union") || lower.contains("1=1") {
        FindingCategory::Sqli
    } else if lower.contains("../") || lower.contains("%2e%2e") {
        FindingCategory::Path
    } else if lower.contains("<script") || lower.contains("alert(") {
        FindingCategory::XssProbe
    } else if lower.contains("{{") || lower.contains("${") {
        FindingCategory::Ssti
    } else if lower.contains(';') || lower.contains('|') || lower.contains('`') {
        FindingCategory::Cmdi
    } else {
        FindingCategory::Numeric
    };
    (parameter, category)
}
