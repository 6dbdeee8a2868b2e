//! On-disk implementation of the `MemoryStore` port: raw tool output
//! persisted as one file per command, grouped by host.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::Utc;

use crate::domain::ports::MemoryStore;

/// Persists raw command output under
/// `<root>/<sanitized-host>/raw/<YYYYMMDD-HHMMSS>_<tool>.txt`.
pub struct FileMemoryStore {
    root: PathBuf,
}

impl FileMemoryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn raw_dir(&self, host: &str) -> PathBuf {
        self.root.join(sanitize_host(host)).join("raw")
    }
}

/// Replaces `/`, `\`, and `..` with `_`; an empty host becomes `unknown`.
fn sanitize_host(host: &str) -> String {
    if host.is_empty() {
        return "unknown".to_string();
    }
    host.replace("..", "_").replace('/', "_").replace('\\', "_")
}

#[async_trait]
impl MemoryStore for FileMemoryStore {
    async fn persist_raw(&self, host: &str, tool: &str, command: &str, output: &str) -> anyhow::Result<()> {
        let dir = self.raw_dir(host);
        tokio::fs::create_dir_all(&dir).await?;

        let now = Utc::now();
        let filename = format!("{}_{}.txt", now.format("%Y%m%d-%H%M%S"), sanitize_host(tool));
        let contents = format!("# Command: {command}\n# Timestamp: {}\n# ---\n{output}", now.to_rfc3339());
        tokio::fs::write(dir.join(filename), contents).await?;
        Ok(())
    }

    async fn summary(&self, host: &str) -> String {
        let dir = self.raw_dir(host);
        let Ok(mut entries) = tokio::fs::read_dir(&dir).await else {
            return String::new();
        };
        let mut count = 0usize;
        while let Ok(Some(_)) = entries.next_entry().await {
            count += 1;
        }
        if count == 0 {
            String::new()
        } else {
            format!("{count} raw tool output(s) recorded for {host}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizes_traversal_and_separators() {
        assert_eq!(sanitize_host("evil/../host"), "evil___host");
        assert_eq!(sanitize_host(""), "unknown");
        assert_eq!(sanitize_host("10.0.0.1"), "10.0.0.1");
    }

    #[tokio::test]
    async fn persist_then_summarize_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileMemoryStore::new(dir.path());
        assert_eq!(store.summary("10.0.0.1").await, String::new());

        store.persist_raw("10.0.0.1", "nmap", "nmap -sV 10.0.0.1", "80/tcp open http").await.unwrap();
        let summary = store.summary("10.0.0.1").await;
        assert!(summary.contains('1'));

        let raw_dir = dir.path().join("10.0.0.1").join("raw");
        let mut entries = tokio::fs::read_dir(&raw_dir).await.unwrap();
        let entry = entries.next_entry().await.unwrap().unwrap();
        let contents = tokio::fs::read_to_string(entry.path()).await.unwrap();
        assert!(contents.starts_with("# Command: nmap -sV 10.0.0.1\n# Timestamp: "));
        assert!(contents.contains("# ---\n80/tcp open http"));
    }
}
