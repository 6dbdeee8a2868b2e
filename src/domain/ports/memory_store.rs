//! Port interface for the session memory/raw-output persister.

use async_trait::async_trait;

/// Persists raw tool output and renders a short memory summary for Brain
/// prompts. A real implementation owns the on-disk layout (see
/// `infrastructure::memory`); this trait is the only surface the core
/// depends on.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    async fn persist_raw(
        &self,
        host: &str,
        tool: &str,
        command: &str,
        output: &str,
    ) -> anyhow::Result<()>;

    /// A short, prompt-injectable summary of what's been recorded for
    /// `host` so far. Empty when there is nothing to say.
    async fn summary(&self, host: &str) -> String;
}
