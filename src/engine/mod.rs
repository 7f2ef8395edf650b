//! Knowledge base engine
//!
//! Owns the current [`KnowledgeSnapshot`] and moves between two states:
//! Uninitialized (nothing usable persisted or ingested) and Ready. Ingestion
//! rebuilds the whole knowledge base off to the side, persists it and only
//! then swaps it in, so searches never observe a partial rebuild and a failed
//! ingestion leaves the previous knowledge base in place.

mod snapshot;

pub use snapshot::KnowledgeSnapshot;

use crate::chunking::{Chunk, TextChunker};
use crate::config::Config;
use crate::embedding::EmbeddingProvider;
use crate::error::{KbError, Result};
use crate::index::IndexKind;
use crate::storage::KnowledgePaths;
use crate::store::{ChunkRecord, Manifest};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Engine lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KbState {
    Uninitialized,
    Ready { chunks: usize },
}

/// Result of an ingestion run
#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    /// No eligible document produced a chunk; nothing changed
    EmptyCorpus,
    Ingested(IngestStats),
}

/// Summary of a successful ingestion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestStats {
    pub documents: usize,
    pub chunks: usize,
    pub dimension: usize,
    pub duration_ms: u64,
    pub generation: Uuid,
}

/// One retrieved chunk with traceability fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub text: String,
    pub source: Option<String>,
    pub ordinal: usize,
    /// Index position
    pub position: usize,
    /// Squared Euclidean distance to the query
    pub distance: f32,
}

/// Retrieval engine over a directory of text documents
pub struct KnowledgeBase {
    config: Config,
    paths: KnowledgePaths,
    chunker: TextChunker,
    index_kind: IndexKind,
    provider: Arc<dyn EmbeddingProvider>,
    current: RwLock<Option<Arc<KnowledgeSnapshot>>>,
    ingest_lock: Mutex<()>,
}

impl KnowledgeBase {
    /// Create the engine and load any persisted knowledge base
    ///
    /// Only configuration problems fail here. A missing, corrupt or
    /// inconsistent persisted pair is logged and leaves the engine
    /// Uninitialized.
    pub fn open(config: Config, provider: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        let chunker = TextChunker::new(config.chunking.chunk_size, config.chunking.overlap)?;
        let index_kind = config.index.index_kind()?;
        let paths = KnowledgePaths::from_config(&config.storage)?;

        let kb = Self {
            config,
            paths,
            chunker,
            index_kind,
            provider,
            current: RwLock::new(None),
            ingest_lock: Mutex::new(()),
        };

        let loaded = kb.load_persisted();
        kb.swap(loaded);

        Ok(kb)
    }

    pub fn state(&self) -> KbState {
        match self.snapshot() {
            Some(snapshot) => KbState::Ready {
                chunks: snapshot.len(),
            },
            None => KbState::Uninitialized,
        }
    }

    /// Number of chunks currently served
    pub fn len(&self) -> usize {
        self.snapshot().map_or(0, |s| s.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn paths(&self) -> &KnowledgePaths {
        &self.paths
    }

    pub fn embedding_model(&self) -> &str {
        self.provider.model_name()
    }

    /// Manifest of the knowledge base being served, if any
    pub fn manifest(&self) -> Option<Manifest> {
        self.snapshot().and_then(|s| s.manifest().cloned())
    }

    /// Rebuild the knowledge base from the `.txt` files in `directory`
    ///
    /// The scan is non-recursive and visits files in name order. Files that
    /// are not valid UTF-8 are skipped.
    pub fn ingest(&self, directory: &Path) -> Result<IngestOutcome> {
        let _guard = self
            .ingest_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let start = Instant::now();

        let files = list_documents(directory)?;
        info!(
            "Found {} text document(s) in {}",
            files.len(),
            directory.display()
        );

        let mut documents = 0;
        let mut chunks: Vec<Chunk> = Vec::new();
        for path in &files {
            let bytes = std::fs::read(path)
                .map_err(|e| KbError::io(e, format!("Failed to read {}", path.display())))?;
            let text = match String::from_utf8(bytes) {
                Ok(text) => text,
                Err(_) => {
                    warn!("Skipping {}: not valid UTF-8", path.display());
                    continue;
                }
            };

            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned());
            documents += 1;
            chunks.extend(self.chunker.chunk_document(name.as_deref(), &text));
        }

        if chunks.is_empty() {
            info!("Nothing to ingest in {}", directory.display());
            return Ok(IngestOutcome::EmptyCorpus);
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        info!(
            "Embedding {} chunks with {}",
            texts.len(),
            self.provider.model_name()
        );
        let vectors = self.provider.embed_many(&texts)?;

        let records: Vec<ChunkRecord> = chunks.into_iter().map(ChunkRecord::from).collect();
        let mut snapshot = KnowledgeSnapshot::from_parts(
            self.index_kind,
            self.provider.dimension(),
            self.provider.model_name(),
            records,
            vectors,
        )?;
        let generation = snapshot.persist(&self.paths)?.generation;
        info!(
            "Persisted knowledge base to {} and {}",
            self.paths.index.display(),
            self.paths.metadata.display()
        );

        let stats = IngestStats {
            documents,
            chunks: snapshot.len(),
            dimension: snapshot.dimension(),
            duration_ms: start.elapsed().as_millis() as u64,
            generation,
        };
        self.swap(Some(Arc::new(snapshot)));

        info!(
            "Ingested {} documents into {} chunks in {}ms",
            stats.documents, stats.chunks, stats.duration_ms
        );
        Ok(IngestOutcome::Ingested(stats))
    }

    /// Context string for `query`: the `top_k` nearest chunk texts, closest
    /// first, joined by blank lines
    ///
    /// Never fails. An Uninitialized engine or any search error yields an empty
    /// string.
    pub fn search(&self, query: &str, top_k: usize) -> String {
        match self.retrieve(query, top_k) {
            Ok(chunks) => chunks
                .into_iter()
                .map(|c| c.text)
                .collect::<Vec<_>>()
                .join("\n\n"),
            Err(e) => {
                warn!("Search failed, returning empty context: {}", e);
                String::new()
            }
        }
    }

    /// Nearest chunks to `query` with their positions and distances
    pub fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<RetrievedChunk>> {
        if top_k == 0 {
            return Err(KbError::Config("top_k must be greater than 0".to_string()));
        }
        let Some(snapshot) = self.snapshot() else {
            debug!("Knowledge base not initialized");
            return Ok(Vec::new());
        };

        let query_vector = self.provider.embed(query)?;
        let hits = snapshot.search(&query_vector, top_k)?;
        debug!("Retrieved {} chunks for query", hits.len());

        Ok(hits
            .into_iter()
            .map(|(neighbor, record)| RetrievedChunk {
                text: record.text.clone(),
                source: record.source.clone(),
                ordinal: record.ordinal,
                position: neighbor.position,
                distance: neighbor.distance,
            })
            .collect())
    }

    /// Re-read the persisted knowledge base
    pub fn reload(&self) -> KbState {
        let _guard = self
            .ingest_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let loaded = self.load_persisted();
        self.swap(loaded);
        self.state()
    }

    fn snapshot(&self) -> Option<Arc<KnowledgeSnapshot>> {
        self.current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn swap(&self, snapshot: Option<Arc<KnowledgeSnapshot>>) {
        *self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = snapshot;
    }

    fn load_persisted(&self) -> Option<Arc<KnowledgeSnapshot>> {
        match KnowledgeSnapshot::load(&self.paths, self.index_kind, self.provider.as_ref()) {
            Ok(Some(snapshot)) => {
                info!(
                    "Loaded knowledge base: {} chunks from {}",
                    snapshot.len(),
                    self.paths.index.display()
                );
                Some(Arc::new(snapshot))
            }
            Ok(None) => {
                info!(
                    "No knowledge base at {}; ingest documents first",
                    self.paths.index.display()
                );
                None
            }
            Err(e) => {
                warn!("Ignoring persisted knowledge base: {}", e);
                None
            }
        }
    }
}

/// Regular `.txt` files directly inside `directory`, sorted by file name
fn list_documents(directory: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(directory).map_err(|e| {
        KbError::io(
            e,
            format!("Failed to read directory {}", directory.display()),
        )
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| {
            KbError::io(
                e,
                format!("Failed to read directory {}", directory.display()),
            )
        })?;
        let path = entry.path();
        let is_text = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("txt"));
        if is_text && path.is_file() {
            files.push(path);
        }
    }

    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}
