//! Port interface for the Brain: an opaque LLM-backed decision function.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::models::{Action, BrainInput};

/// Errors a `Brain` implementation can surface for one turn.
#[derive(Debug, Clone, Error)]
pub enum BrainError {
    #[error("brain request failed: {0}")]
    RequestFailed(String),
}

/// A Brain maps one turn's `BrainInput` to the next `Action`.
///
/// This crate never defines the reasoning strategy behind `decide` — only
/// the interface the orchestration core calls against. Concrete
/// implementations (a real LLM client, a scripted mock) live outside the
/// core.
#[async_trait]
pub trait Brain: Send + Sync {
    async fn decide(&self, input: BrainInput) -> Result<Action, BrainError>;
}
