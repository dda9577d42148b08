//! Filesystem-backed document store over a vault directory.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, trace};

use notegen_core::defaults::DOCUMENT_EXTENSION;
use notegen_core::{DocumentFile, DocumentStore, Error, Result};

/// Markdown documents under a root directory.
///
/// Paths handed in and out are relative to the root and use `/` separators.
/// Hidden entries (names starting with `.`) are not listed.
#[derive(Debug, Clone)]
pub struct FsDocumentStore {
    root: PathBuf,
}

impl FsDocumentStore {
    /// Create a store rooted at `root`. The directory is not checked until use.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The vault root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a store-relative path, rejecting anything that escapes the root.
    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let relative = Path::new(path);
        if path.is_empty() || relative.is_absolute() {
            return Err(Error::InvalidInput(format!(
                "document path must be relative: {path:?}"
            )));
        }
        for component in relative.components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                _ => {
                    return Err(Error::InvalidInput(format!(
                        "document path escapes the vault: {path:?}"
                    )))
                }
            }
        }
        Ok(self.root.join(relative))
    }

    fn relative_path(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let parts: Vec<&str> = relative
            .components()
            .map(|c| c.as_os_str().to_str())
            .collect::<Option<_>>()?;
        Some(parts.join("/"))
    }
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_str().map(|n| n.starts_with('.')).unwrap_or(false)
}

#[async_trait]
impl DocumentStore for FsDocumentStore {
    async fn read(&self, path: &str) -> Result<String> {
        let full = self.resolve(path)?;
        match tokio::fs::read_to_string(&full).await {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::NotFound(path.to_string()))
            }
            Err(e) => Err(Error::Io(e)),
        }
    }

    async fn write(&self, path: &str, content: &str) -> Result<()> {
        let full = self.resolve(path)?;
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&full, content).await?;
        trace!(file_path = path, bytes = content.len(), "Document written");
        Ok(())
    }

    async fn list(&self) -> Result<Vec<DocumentFile>> {
        let mut files = Vec::new();
        let mut pending = vec![self.root.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let name = entry.file_name();
                if is_hidden(&name) {
                    continue;
                }
                let file_type = entry.file_type().await?;
                let path = entry.path();
                if file_type.is_dir() {
                    pending.push(path);
                } else if file_type.is_file()
                    && path.extension().and_then(|e| e.to_str()) == Some(DOCUMENT_EXTENSION)
                {
                    if let Some(relative) = self.relative_path(&path) {
                        files.push(DocumentFile::new(relative));
                    }
                }
            }
        }

        files.sort_by(|a, b| a.path.cmp(&b.path));
        debug!(root = %self.root.display(), file_count = files.len(), "Listed documents");
        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_rejects_parent_dir() {
        let store = FsDocumentStore::new("/vault");
        assert!(matches!(
            store.resolve("../etc/passwd"),
            Err(Error::InvalidInput(_))
        ));
        assert!(store.resolve("notes/../../x.md").is_err());
    }

    #[test]
    fn test_resolve_rejects_absolute_and_empty() {
        let store = FsDocumentStore::new("/vault");
        assert!(store.resolve("/etc/passwd").is_err());
        assert!(store.resolve("").is_err());
    }

    #[test]
    fn test_resolve_joins_relative() {
        let store = FsDocumentStore::new("/vault");
        assert_eq!(
            store.resolve("notes/a.md").unwrap(),
            PathBuf::from("/vault/notes/a.md")
        );
    }

    #[test]
    fn test_relative_path_uses_forward_slashes() {
        let store = FsDocumentStore::new("/vault");
        let path = Path::new("/vault").join("a").join("b.md");
        assert_eq!(store.relative_path(&path).as_deref(), Some("a/b.md"));
    }
}
