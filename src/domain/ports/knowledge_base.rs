//! Port interface for the knowledge-base reader.

use async_trait::async_trait;

/// Read-only access to a knowledge base of prior techniques/notes. File
/// format and storage are an external collaborator's concern; the core
/// only needs these two operations.
#[async_trait]
pub trait KnowledgeBase: Send + Sync {
    async fn search(&self, query: &str) -> anyhow::Result<String>;
    async fn read(&self, path: &str) -> anyhow::Result<String>;
}
