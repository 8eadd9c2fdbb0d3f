//! Persistence of the market document.
//!
//! The engine loads the whole document at the start of a queued unit and
//! saves it as the unit's last step, so a store only needs whole-document
//! `load` and `save`.

use std::{
    path::{Path, PathBuf},
    sync::atomic::{AtomicU64, Ordering},
};

use async_trait::async_trait;
use boarmarket_matchcore::MarketDocument;
use boarmarket_types::{MarketError, Result};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Whole-document persistence.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Read the current document. A store that has never been saved yields
    /// an empty document.
    async fn load(&self) -> Result<MarketDocument>;

    /// Replace the stored document.
    async fn save(&self, doc: &MarketDocument) -> Result<()>;
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// Keeps the document in process memory.
#[derive(Default)]
pub struct MemoryStore {
    doc: RwLock<MarketDocument>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_document(doc: MarketDocument) -> Self {
        Self {
            doc: RwLock::new(doc),
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn load(&self) -> Result<MarketDocument> {
        Ok(self.doc.read().await.clone())
    }

    async fn save(&self, doc: &MarketDocument) -> Result<()> {
        *self.doc.write().await = doc.clone();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// JsonFileStore
// ---------------------------------------------------------------------------

/// Stores the document as one pretty-printed JSON file.
///
/// Saves write a sibling temp file and rename it over the target, so readers
/// never observe a half-written document. Loading never writes: a missing
/// file reads as an empty document until the first save, or until
/// [`JsonFileStore::open`] creates it.
pub struct JsonFileStore {
    path: PathBuf,
    saves: AtomicU64,
}

impl JsonFileStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            saves: AtomicU64::new(0),
        }
    }

    /// Open the store, writing an empty document if the file is missing.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let store = Self::new(path);
        if !tokio::fs::try_exists(&store.path).await? {
            info!(path = %store.path.display(), "Creating market document");
            store.save(&MarketDocument::new()).await?;
        }
        Ok(store)
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(std::ffi::OsStr::to_os_string)
            .unwrap_or_default();
        let seq = self.saves.fetch_add(1, Ordering::Relaxed);
        name.push(format!(".{}.{seq}.tmp", std::process::id()));
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl DocumentStore for JsonFileStore {
    async fn load(&self) -> Result<MarketDocument> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(json) => Ok(serde_json::from_str(&json)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No market document yet");
                Ok(MarketDocument::new())
            }
            Err(e) => Err(MarketError::Storage(format!(
                "cannot read {}: {e}",
                self.path.display()
            ))),
        }
    }

    async fn save(&self, doc: &MarketDocument) -> Result<()> {
        let json = serde_json::to_string_pretty(doc)?;
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await?;
        }
        let tmp = self.temp_path();
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!(path = %self.path.display(), "Market document saved");
        Ok(())
    }
}
