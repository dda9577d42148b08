//! Run history persisted as a JSON array with debounced saves.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use notegen_core::{defaults, Error, ProcessingStats, Result, StatsSink};

use crate::debounce::Debouncer;

struct HistoryInner {
    path: PathBuf,
    max_entries: usize,
    entries: RwLock<Vec<ProcessingStats>>,
}

impl HistoryInner {
    /// Write the current history to disk via a temp file and rename.
    async fn save(&self) -> Result<()> {
        let json = {
            let entries = self.entries.read().await;
            serde_json::to_vec_pretty(&*entries)?
        };
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!(path = %self.path.display(), bytes = json.len(), "Stats history saved");
        Ok(())
    }
}

/// Append-only log of past runs stored at a JSON file.
///
/// Keeps the newest `max_entries` runs. Appends are persisted
/// [`defaults::STATS_SAVE_DEBOUNCE_MS`] after the last append; failures are
/// logged and never surfaced to the appender.
pub struct JsonStatsHistory {
    inner: Arc<HistoryInner>,
    saver: Debouncer,
}

impl JsonStatsHistory {
    /// Load history from `path` (missing file = empty history).
    ///
    /// Must be called inside a Tokio runtime.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self> {
        Self::load_with(
            path,
            defaults::STATS_HISTORY_LIMIT,
            Duration::from_millis(defaults::STATS_SAVE_DEBOUNCE_MS),
        )
        .await
    }

    /// Load with an explicit retention limit and debounce window.
    pub async fn load_with(
        path: impl Into<PathBuf>,
        max_entries: usize,
        debounce: Duration,
    ) -> Result<Self> {
        let path = path.into();
        let entries = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice::<Vec<ProcessingStats>>(&bytes).map_err(|e| {
                Error::Serialization(format!("{}: {e}", path.display()))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No stats history found, starting empty");
                Vec::new()
            }
            Err(e) => return Err(Error::Io(e)),
        };
        info!(path = %path.display(), runs = entries.len(), "Stats history loaded");

        let inner = Arc::new(HistoryInner {
            path,
            max_entries: max_entries.max(1),
            entries: RwLock::new(entries),
        });

        let save_target = inner.clone();
        let saver = Debouncer::new(debounce, move || {
            let target = save_target.clone();
            async move {
                if let Err(e) = target.save().await {
                    warn!(error = %e, path = %target.path.display(), "Failed to save stats history");
                }
            }
        });

        Ok(Self { inner, saver })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Persist now instead of waiting for the debounce window.
    pub async fn flush(&self) {
        self.saver.flush().await;
    }
}

#[async_trait]
impl StatsSink for JsonStatsHistory {
    async fn append(&self, stats: ProcessingStats) -> Result<()> {
        {
            let mut entries = self.inner.entries.write().await;
            entries.push(stats);
            let overflow = entries.len().saturating_sub(self.inner.max_entries);
            if overflow > 0 {
                entries.drain(..overflow);
            }
        }
        self.saver.schedule();
        Ok(())
    }

    async fn list(&self) -> Result<Vec<ProcessingStats>> {
        Ok(self.inner.entries.read().await.clone())
    }
}
