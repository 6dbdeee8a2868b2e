//! Shared domain error types for the Pentecter orchestration engine.
//!
//! Subsystem-specific errors (`TaskManagerError`, `LoopError`, `ConfigError`)
//! live alongside the code that raises them; this module holds only the one
//! error type shared across layers — parser output is consumed by both
//! `application` (via `infrastructure::parsers::dispatch`) and
//! `infrastructure` directly.

use thiserror::Error;

/// Errors from parsing a tool's raw output into a `ReconTree` update.
///
/// These are never fatal: a parse failure just means the tree isn't
/// updated, and the caller logs a warning instead of propagating it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("malformed nmap xml: {0}")]
    NmapXml(String),

    #[error("malformed ffuf json: {0}")]
    FfufJson(String),

    #[error("no parsable curl metrics line")]
    CurlMetrics,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_display() {
        let err = ParseError::NmapXml("unexpected eof".to_string());
        assert_eq!(err.to_string(), "malformed nmap xml: unexpected eof");
    }
}
