//! Extracts the URL a curl invocation targeted and parses the `-w`
//! profiling metrics line it printed.

use once_cell::sync::Lazy;
use regex::Regex;

/// Host, port, and path extracted from a curl command's URL argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurlTarget {
    pub host: String,
    pub port: u16,
    pub path: String,
}

/// The baseline-comparison metrics curl's `-w "%{http_code} %{size_download}
/// %{time_total}"` prints.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CurlMetrics {
    pub http_code: u32,
    pub size_download: u64,
    pub time_total: f64,
}

static URL_ARG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(https?)://([^/\s:]+)(?::(\d+))?(/\S*)?").unwrap()
});

static METRICS_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+)\s+(\d+)\s+([\d.]+)$").unwrap());

static QUERY_PARAM: Lazy<Regex> = Lazy::new(|| Regex::new(r"[?&]([a-zA-Z0-9_]+)=").unwrap());

/// Extracts a `CurlTarget` from the first URL argument in `command`. Port
/// defaults to 443 for `https`, 80 for `http`, when unspecified.
pub fn parse_target(command: &str) -> Option<CurlTarget> {
    let caps = URL_ARG.captures(command)?;
    let scheme = caps.get(1)?.as_str();
    let host = caps.get(2)?.as_str().to_string();
    let port = caps
        .get(3)
        .and_then(|m| m.as_str().parse::<u16>().ok())
        .unwrap_or(if scheme == "https" { 443 } else { 80 });
    let path = caps.get(4).map(|m| m.as_str().to_string()).unwrap_or_default();
    Some(CurlTarget { host, port, path })
}

/// The first query-string parameter name in `command`'s URL, if any —
/// the parameter a value-fuzzing request targeted.
pub fn parse_param(command: &str) -> Option<String> {
    QUERY_PARAM.captures(command).map(|c| c[1].to_string())
}

/// Parses the last non-empty line of curl output as `%d %d %f`
/// (http_code, size_download, time_total). Anything else is `None`.
pub fn parse_metrics(output: &str) -> Option<CurlMetrics> {
    let last = output.lines().rev().find(|l| !l.trim().is_empty())?;
    let caps = METRICS_LINE.captures(last.trim())?;
    Some(CurlMetrics {
        http_code: caps.get(1)?.as_str().parse().ok()?,
        size_download: caps.get(2)?.as_str().parse().ok()?,
        time_total: caps.get(3)?.as_str().parse().ok()?,
    })
}
