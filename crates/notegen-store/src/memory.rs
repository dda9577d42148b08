//! In-memory document store and stats sink.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use notegen_core::{DocumentFile, DocumentStore, Error, ProcessingStats, Result, StatsSink};

/// Documents held in an ordered map keyed by path.
#[derive(Debug, Clone, Default)]
pub struct MemoryDocumentStore {
    documents: Arc<RwLock<BTreeMap<String, String>>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store pre-populated with `(path, content)` pairs.
    pub fn with_documents<I, P, C>(documents: I) -> Self
    where
        I: IntoIterator<Item = (P, C)>,
        P: Into<String>,
        C: Into<String>,
    {
        let map = documents
            .into_iter()
            .map(|(p, c)| (p.into(), c.into()))
            .collect();
        Self {
            documents: Arc::new(RwLock::new(map)),
        }
    }

    /// Insert or replace a document.
    pub async fn insert(&self, path: impl Into<String>, content: impl Into<String>) {
        self.documents
            .write()
            .await
            .insert(path.into(), content.into());
    }

    /// Current content of a document, if present.
    pub async fn get(&self, path: &str) -> Option<String> {
        self.documents.read().await.get(path).cloned()
    }

    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn read(&self, path: &str) -> Result<String> {
        self.get(path)
            .await
            .ok_or_else(|| Error::NotFound(path.to_string()))
    }

    async fn write(&self, path: &str, content: &str) -> Result<()> {
        self.insert(path, content).await;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<DocumentFile>> {
        Ok(self
            .documents
            .read()
            .await
            .keys()
            .map(|path| DocumentFile::new(path.clone()))
            .collect())
    }
}

/// Run history kept in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryStatsSink {
    entries: Arc<RwLock<Vec<ProcessingStats>>>,
}

impl MemoryStatsSink {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StatsSink for MemoryStatsSink {
    async fn append(&self, stats: ProcessingStats) -> Result<()> {
        self.entries.write().await.push(stats);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<ProcessingStats>> {
        Ok(self.entries.read().await.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_write_roundtrip() {
        let store = MemoryDocumentStore::new();
        store.write("a.md", "hello").await.unwrap();
        assert_eq!(store.read("a.md").await.unwrap(), "hello");
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_read_missing_is_not_found() {
        let store = MemoryDocumentStore::new();
        assert!(matches!(
            store.read("missing.md").await,
            Err(Error::NotFound(path)) if path == "missing.md"
        ));
    }

    #[tokio::test]
    async fn test_list_is_sorted_with_basenames() {
        let store = MemoryDocumentStore::with_documents([
            ("z/last.md", ""),
            ("first.md", ""),
            ("m/middle.md", ""),
        ]);
        let files = store.list().await.unwrap();
        let paths: Vec<_> = files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["first.md", "m/middle.md", "z/last.md"]);
        assert_eq!(files[1].basename, "middle");
    }

    #[tokio::test]
    async fn test_clones_share_documents() {
        let store = MemoryDocumentStore::new();
        let clone = store.clone();
        clone.insert("a.md", "x").await;
        assert_eq!(store.get("a.md").await.as_deref(), Some("x"));
        assert!(!store.is_empty().await);
    }
}
