//! Persistent semantic index over card documents.
//!
//! `SemanticIndex` owns the on-disk location and the current in-memory
//! handle. Readers clone the `Arc<IndexHandle>` and never block on a rebuild;
//! builds are single-writer and swap the handle only once the replacement is
//! fully persisted.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use cardrag_core::{CardDocument, Embedder, IndexError, ScoredMatch};

pub mod manifest;
pub mod schema;
pub mod search;
pub mod table;

pub use manifest::IndexManifest;
pub use table::IndexEntry;

/// A loaded, immutable index.
#[derive(Debug)]
pub struct IndexHandle {
    entries: Vec<IndexEntry>,
    manifest: IndexManifest,
}

impl IndexHandle {
    pub fn len(&self) -> usize { self.entries.len() }
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }
    pub fn manifest(&self) -> &IndexManifest { &self.manifest }
    pub fn entries(&self) -> &[IndexEntry] { &self.entries }

    /// Card names in corpus order.
    pub fn card_names(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.document.metadata.card_name.clone()).collect()
    }

    pub fn search_vec(&self, query: &[f32], k: usize) -> Vec<ScoredMatch> {
        search::rank(&self.entries, query, k)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum RebuildResult {
    Succeeded { document_count: usize },
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RebuildOutcome {
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub result: RebuildResult,
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexStatus {
    pub ready: bool,
    pub rebuilding: bool,
    pub document_count: usize,
    pub embedder_id: String,
    pub built_at: Option<DateTime<Utc>>,
    pub last_rebuild: Option<RebuildOutcome>,
}

pub struct SemanticIndex {
    dir: PathBuf,
    table: String,
    embedder: Arc<dyn Embedder>,
    current: RwLock<Option<Arc<IndexHandle>>>,
    writer: Mutex<()>,
    last_rebuild: RwLock<Option<RebuildOutcome>>,
}

impl SemanticIndex {
    pub fn new(dir: impl Into<PathBuf>, table: &str, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            dir: dir.into(),
            table: table.to_string(),
            embedder,
            current: RwLock::new(None),
            writer: Mutex::new(()),
            last_rebuild: RwLock::new(None),
        }
    }

    pub fn dir(&self) -> &Path { &self.dir }

    pub fn embedder(&self) -> &Arc<dyn Embedder> { &self.embedder }

    /// The currently served handle, if any.
    pub fn handle(&self) -> Option<Arc<IndexHandle>> {
        self.current.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn is_ready(&self) -> bool { self.handle().is_some() }

    fn swap(&self, handle: Option<Arc<IndexHandle>>) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = handle;
    }

    /// Embed `corpus`, persist it and serve it.
    pub async fn build(&self, corpus: Vec<CardDocument>) -> Result<Arc<IndexHandle>, IndexError> {
        let _guard = self.writer.try_lock().map_err(|_| IndexError::RebuildInProgress)?;
        let handle = Arc::new(self.build_locked(corpus).await?);
        self.swap(Some(handle.clone()));
        Ok(handle)
    }

    /// Replace the served index with one built from `corpus`.
    ///
    /// The previous handle keeps answering searches until the new one is in
    /// place; on failure it stays in place. The outcome is kept for `status`.
    pub async fn rebuild(&self, corpus: Vec<CardDocument>) -> Result<Arc<IndexHandle>, IndexError> {
        let _guard = self.writer.try_lock().map_err(|_| IndexError::RebuildInProgress)?;
        info!(documents = corpus.len(), "rebuilding index");
        let result = match self.build_locked(corpus).await {
            Ok(handle) => {
                let handle = Arc::new(handle);
                self.swap(Some(handle.clone()));
                Ok(handle)
            }
            Err(e) => {
                warn!(error = %e, "index rebuild failed; previous index still served");
                Err(e)
            }
        };
        let outcome = RebuildOutcome {
            at: Utc::now(),
            result: match &result {
                Ok(h) => RebuildResult::Succeeded { document_count: h.len() },
                Err(e) => RebuildResult::Failed { reason: e.to_string() },
            },
        };
        *self.last_rebuild.write().unwrap_or_else(PoisonError::into_inner) = Some(outcome);
        result
    }

    /// Open the persisted index at the configured location.
    pub async fn load(&self) -> Result<Arc<IndexHandle>, IndexError> {
        let _guard = self.writer.try_lock().map_err(|_| IndexError::RebuildInProgress)?;
        let manifest = IndexManifest::read(&self.dir)?;
        if manifest.embedder_id != self.embedder.id() {
            return Err(IndexError::EmbedderMismatch { expected: self.embedder.id().to_string(), found: manifest.embedder_id });
        }
        let entries = table::read_entries(&self.dir, &self.table, manifest.document_count).await?;
        if entries.len() != manifest.document_count {
            return Err(IndexError::Storage(format!("manifest lists {} documents but table has {}", manifest.document_count, entries.len())));
        }
        if let Some(bad) = entries.iter().find(|e| e.vector.len() != manifest.dim) {
            return Err(IndexError::Storage(format!("vector of '{}' has width {}, expected {}", bad.document.card_name(), bad.vector.len(), manifest.dim)));
        }
        info!(dir = %self.dir.display(), documents = entries.len(), embedder = %manifest.embedder_id, "index loaded");
        let handle = Arc::new(IndexHandle { entries, manifest });
        self.swap(Some(handle.clone()));
        Ok(handle)
    }

    /// The `k` documents nearest to `query`.
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<ScoredMatch>, IndexError> {
        let handle = self.handle().ok_or(IndexError::NotInitialized)?;
        if k == 0 { return Ok(Vec::new()); }
        let embedder = self.embedder.clone();
        let text = query.to_string();
        let vector = tokio::task::spawn_blocking(move || embedder.embed(&text))
            .await
            .map_err(|e| IndexError::Embedding(e.to_string()))?
            .map_err(|e| IndexError::Embedding(e.to_string()))?;
        let hits = handle.search_vec(&vector, k);
        debug!(query, k, hits = hits.len(), "search");
        Ok(hits)
    }

    /// Delete the persisted index and stop serving it. Idempotent.
    pub async fn drop_index(&self) -> Result<(), IndexError> {
        let _guard = self.writer.try_lock().map_err(|_| IndexError::RebuildInProgress)?;
        self.swap(None);
        for dir in [self.dir.clone(), sibling(&self.dir, "staging"), sibling(&self.dir, "old")] {
            if dir.exists() {
                std::fs::remove_dir_all(&dir).map_err(IndexError::storage)?;
            }
        }
        info!(dir = %self.dir.display(), "index dropped");
        Ok(())
    }

    pub fn status(&self) -> IndexStatus {
        let handle = self.handle();
        IndexStatus {
            ready: handle.is_some(),
            rebuilding: self.writer.try_lock().is_err(),
            document_count: handle.as_ref().map_or(0, |h| h.len()),
            embedder_id: self.embedder.id().to_string(),
            built_at: handle.as_ref().map(|h| h.manifest.built_at),
            last_rebuild: self.last_rebuild.read().unwrap_or_else(PoisonError::into_inner).clone(),
        }
    }

    async fn build_locked(&self, corpus: Vec<CardDocument>) -> Result<IndexHandle, IndexError> {
        if corpus.is_empty() {
            return Err(IndexError::Build("corpus is empty".to_string()));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = corpus.iter().find(|d| !seen.insert(d.card_name())) {
            return Err(IndexError::Build(format!("duplicate card name '{}'", dup.card_name())));
        }

        let embedder = self.embedder.clone();
        let texts: Vec<String> = corpus.iter().map(|d| d.content.clone()).collect();
        let vectors = tokio::task::spawn_blocking(move || embedder.embed_batch(&texts))
            .await
            .map_err(IndexError::build)?
            .map_err(|e| IndexError::Build(format!("embedding failed: {}", e)))?;
        let dim = self.embedder.dim();
        if vectors.len() != corpus.len() {
            return Err(IndexError::Build(format!("embedder returned {} vectors for {} documents", vectors.len(), corpus.len())));
        }
        if let Some(pos) = vectors.iter().position(|v| v.len() != dim) {
            return Err(IndexError::Build(format!("embedding of '{}' has width {}, expected {}", corpus[pos].card_name(), vectors[pos].len(), dim)));
        }

        let manifest = IndexManifest::new(self.embedder.id(), dim, &corpus);
        let entries: Vec<IndexEntry> = corpus
            .into_iter()
            .zip(vectors)
            .enumerate()
            .map(|(ordinal, (document, vector))| IndexEntry { ordinal, document, vector })
            .collect();

        let staging = sibling(&self.dir, "staging");
        if let Err(e) = self.persist(&staging, &entries, &manifest).await {
            let _ = std::fs::remove_dir_all(&staging);
            return Err(e);
        }
        self.promote(&staging)?;
        info!(dir = %self.dir.display(), documents = entries.len(), embedder = %manifest.embedder_id, "index built");
        Ok(IndexHandle { entries, manifest })
    }

    async fn persist(&self, staging: &Path, entries: &[IndexEntry], manifest: &IndexManifest) -> Result<(), IndexError> {
        if staging.exists() {
            std::fs::remove_dir_all(staging).map_err(IndexError::storage)?;
        }
        std::fs::create_dir_all(staging).map_err(IndexError::storage)?;
        table::write_entries(staging, &self.table, entries, manifest.dim).await?;
        manifest.write(staging)
    }

    /// Move a fully written staging directory into the configured location.
    fn promote(&self, staging: &Path) -> Result<(), IndexError> {
        let old = sibling(&self.dir, "old");
        if old.exists() {
            std::fs::remove_dir_all(&old).map_err(IndexError::storage)?;
        }
        if self.dir.exists() {
            std::fs::rename(&self.dir, &old).map_err(IndexError::storage)?;
        }
        if let Err(e) = std::fs::rename(staging, &self.dir) {
            if old.exists() {
                let _ = std::fs::rename(&old, &self.dir);
            }
            return Err(IndexError::storage(e));
        }
        if old.exists() {
            std::fs::remove_dir_all(&old).map_err(IndexError::storage)?;
        }
        Ok(())
    }
}

/// `<dir>.<suffix>` next to `dir`.
fn sibling(dir: &Path, suffix: &str) -> PathBuf {
    let mut name = dir.file_name().map(|n| n.to_os_string()).unwrap_or_else(|| "index".into());
    name.push(".");
    name.push(suffix);
    dir.with_file_name(name)
}
