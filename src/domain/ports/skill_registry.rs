//! Port interface for skill-template expansion.

use async_trait::async_trait;

/// Expands a user message against a registered skill template. The
/// expansion engine itself (template syntax, storage) is an external
/// collaborator; the `Loop` only ever calls `expand`.
#[async_trait]
pub trait SkillRegistry: Send + Sync {
    /// Returns `message` expanded against a matching skill template, or
    /// `message` unchanged if nothing matches.
    async fn expand(&self, message: &str) -> String;
}
