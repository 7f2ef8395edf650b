//! In-memory (index, store) pair and its persisted form

use crate::embedding::EmbeddingProvider;
use crate::error::{KbError, Result};
use crate::index::{IndexKind, Neighbor, VectorIndex};
use crate::storage::KnowledgePaths;
use crate::store::{ChunkRecord, Manifest, MetadataStore, METADATA_SCHEMA_VERSION};
use chrono::Utc;
use uuid::Uuid;

/// Vector index and metadata store that always agree on length and order
///
/// Vectors and records only enter together, through [`push`](Self::push) or
/// [`from_parts`](Self::from_parts), so position `i` in the index always
/// describes record `i` in the store.
pub struct KnowledgeSnapshot {
    index: VectorIndex,
    store: MetadataStore,
    embedding_model: String,
    manifest: Option<Manifest>,
}

impl KnowledgeSnapshot {
    /// Empty snapshot for vectors of `dimension` produced by `embedding_model`
    pub fn new(kind: IndexKind, dimension: usize, embedding_model: &str) -> Result<Self> {
        Ok(Self {
            index: VectorIndex::new(kind, dimension)?,
            store: MetadataStore::new(),
            embedding_model: embedding_model.to_string(),
            manifest: None,
        })
    }

    /// Add one chunk and its vector at the next position
    pub fn push(&mut self, record: ChunkRecord, vector: Vec<f32>) -> Result<()> {
        self.index.add(std::slice::from_ref(&vector))?;
        self.store.append(std::iter::once(record));
        Ok(())
    }

    /// Build a snapshot from parallel records and vectors
    ///
    /// Counts and dimensions are checked before anything is added.
    pub fn from_parts(
        kind: IndexKind,
        dimension: usize,
        embedding_model: &str,
        records: Vec<ChunkRecord>,
        vectors: Vec<Vec<f32>>,
    ) -> Result<Self> {
        if records.len() != vectors.len() {
            return Err(KbError::CountMismatch {
                records: records.len(),
                vectors: vectors.len(),
            });
        }

        let mut snapshot = Self::new(kind, dimension, embedding_model)?;
        snapshot.index.add(&vectors)?;
        snapshot.store.append(records);
        Ok(snapshot)
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.index.dimension()
    }

    pub fn kind(&self) -> IndexKind {
        self.index.kind()
    }

    pub fn embedding_model(&self) -> &str {
        &self.embedding_model
    }

    /// Manifest of the persisted pair this snapshot was saved as or loaded from
    pub fn manifest(&self) -> Option<&Manifest> {
        self.manifest.as_ref()
    }

    pub fn records(&self) -> impl Iterator<Item = &ChunkRecord> {
        self.store.iter()
    }

    /// Nearest chunks to an already embedded query
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(Neighbor, &ChunkRecord)>> {
        self.index
            .search(query, k)?
            .into_iter()
            .map(|neighbor| Ok((neighbor, self.store.get(neighbor.position)?)))
            .collect()
    }

    /// Persist as a new generation, replacing whatever pair is on disk
    pub fn persist(&mut self, paths: &KnowledgePaths) -> Result<&Manifest> {
        self.persist_with(paths, |index, metadata| paths.write_pair(index, metadata))
    }

    pub(crate) fn persist_with(
        &mut self,
        paths: &KnowledgePaths,
        write_pair: impl FnOnce(&[u8], &[u8]) -> Result<()>,
    ) -> Result<&Manifest> {
        let index_bytes = self.index.to_bytes()?;
        let manifest = Manifest {
            schema_version: METADATA_SCHEMA_VERSION,
            generation: Uuid::new_v4(),
            created_at: Utc::now(),
            embedding_model: self.embedding_model.clone(),
            dimension: self.index.dimension(),
            count: self.store.len(),
            index_checksum: blake3::hash(&index_bytes).to_hex().to_string(),
        };
        let metadata_bytes = self.store.to_json(&manifest)?;

        write_pair(&index_bytes, &metadata_bytes)?;
        Ok(self.manifest.insert(manifest))
    }

    /// Load the persisted pair, checking it against the active provider
    ///
    /// `Ok(None)` means nothing was ever persisted. Every inconsistency
    /// (half-written pair, checksum or count disagreement, a different model or
    /// dimension) is a persistence error.
    pub fn load(
        paths: &KnowledgePaths,
        kind: IndexKind,
        provider: &dyn EmbeddingProvider,
    ) -> Result<Option<Self>> {
        let Some(pair) = paths.read_pair()? else {
            return Ok(None);
        };

        let (manifest, store) = MetadataStore::from_json(&pair.metadata, &paths.metadata)?;

        let checksum = blake3::hash(&pair.index).to_hex().to_string();
        if checksum != manifest.index_checksum {
            return Err(KbError::persistence(
                &paths.index,
                format!(
                    "Index checksum {} does not match manifest generation {}",
                    checksum, manifest.generation
                ),
            ));
        }

        let mut index = VectorIndex::from_bytes(&pair.index, &paths.index)?;
        if index.len() != manifest.count || index.dimension() != manifest.dimension {
            return Err(KbError::persistence(
                &paths.index,
                format!(
                    "Index holds {} x {} vectors, manifest expects {} x {}",
                    index.len(),
                    index.dimension(),
                    manifest.count,
                    manifest.dimension
                ),
            ));
        }

        if manifest.embedding_model != provider.model_name()
            || manifest.dimension != provider.dimension()
        {
            return Err(KbError::persistence(
                &paths.metadata,
                format!(
                    "Knowledge base was built with {} ({}-d), active embedder is {} ({}-d)",
                    manifest.embedding_model,
                    manifest.dimension,
                    provider.model_name(),
                    provider.dimension()
                ),
            ));
        }

        if index.kind() != kind {
            tracing::info!("Rebuilding index as {:?} (persisted as {:?})", kind, index.kind());
            index = rebuild(&index, kind)?;
        }

        Ok(Some(Self {
            index,
            store,
            embedding_model: manifest.embedding_model.clone(),
            manifest: Some(manifest),
        }))
    }
}

fn rebuild(index: &VectorIndex, kind: IndexKind) -> Result<VectorIndex> {
    let vectors: Vec<Vec<f32>> = (0..index.len())
        .filter_map(|position| index.vector(position))
        .collect();
    let mut rebuilt = VectorIndex::new(kind, index.dimension())?;
    rebuilt.add(&vectors)?;
    Ok(rebuilt)
}
