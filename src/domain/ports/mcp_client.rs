//! Port interface for MCP (Model Context Protocol) tool calls.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum McpError {
    #[error("MCP server not found: {0}")]
    ServerNotFound(String),

    #[error("MCP tool call failed: {0}")]
    ToolCallFailed(String),
}

/// The narrow surface the `Loop`'s `call_mcp` action needs. Transport,
/// server lifecycle, and tool discovery are external collaborators.
#[async_trait]
pub trait McpClient: Send + Sync {
    async fn call_tool(&self, server: &str, tool: &str, args: Value) -> Result<String, McpError>;
}
