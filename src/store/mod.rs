//! Metadata store: chunk texts aligned with vector index positions
//!
//! Record `i` describes the vector at index position `i`. The store is
//! populated during ingestion, persisted as a JSON side-car next to the index
//! and read-only at query time.

use crate::chunking::Chunk;
use crate::error::{KbError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

/// Current metadata file schema
pub const METADATA_SCHEMA_VERSION: u32 = 1;

/// Chunk text plus traceability fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub ordinal: usize,
}

impl From<Chunk> for ChunkRecord {
    fn from(chunk: Chunk) -> Self {
        Self {
            text: chunk.text,
            source: chunk.source,
            ordinal: chunk.ordinal,
        }
    }
}

/// Describes the generation a metadata file belongs to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub schema_version: u32,
    /// Unique id of the ingestion that produced this pair
    pub generation: Uuid,
    pub created_at: DateTime<Utc>,
    /// Embedding model that produced the vectors
    pub embedding_model: String,
    pub dimension: usize,
    /// Number of chunks (and vectors)
    pub count: usize,
    /// BLAKE3 hex digest of the index file bytes
    pub index_checksum: String,
}

#[derive(Serialize)]
struct MetadataFileRef<'a> {
    manifest: &'a Manifest,
    chunks: &'a [ChunkRecord],
}

#[derive(Deserialize)]
struct MetadataFile {
    manifest: Manifest,
    chunks: Vec<ChunkRecord>,
}

/// Ordered chunk records
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataStore {
    records: Vec<ChunkRecord>,
}

impl MetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append records in order
    pub fn append(&mut self, records: impl IntoIterator<Item = ChunkRecord>) {
        self.records.extend(records);
    }

    /// Record at `position`
    pub fn get(&self, position: usize) -> Result<&ChunkRecord> {
        self.records.get(position).ok_or(KbError::OutOfRange {
            position,
            len: self.records.len(),
        })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChunkRecord> {
        self.records.iter()
    }

    /// Serialize the store together with its manifest
    pub fn to_json(&self, manifest: &Manifest) -> Result<Vec<u8>> {
        let file = MetadataFileRef {
            manifest,
            chunks: &self.records,
        };
        serde_json::to_vec_pretty(&file).map_err(|e| KbError::Json {
            source: e,
            context: "Failed to serialize metadata".to_string(),
        })
    }

    /// Parse a metadata file; `origin` only labels errors
    ///
    /// Fails when the manifest's count disagrees with the stored records or the
    /// schema version is unknown.
    pub fn from_json(bytes: &[u8], origin: &Path) -> Result<(Manifest, Self)> {
        let file: MetadataFile = serde_json::from_slice(bytes)
            .map_err(|e| KbError::persistence(origin, format!("Unreadable metadata: {}", e)))?;

        if file.manifest.schema_version != METADATA_SCHEMA_VERSION {
            return Err(KbError::persistence(
                origin,
                format!(
                    "Unsupported metadata schema version {}",
                    file.manifest.schema_version
                ),
            ));
        }
        if file.manifest.count != file.chunks.len() {
            return Err(KbError::persistence(
                origin,
                format!(
                    "Manifest promises {} chunks, file holds {}",
                    file.manifest.count,
                    file.chunks.len()
                ),
            ));
        }

        Ok((
            file.manifest,
            Self {
                records: file.chunks,
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn record(text: &str, ordinal: usize) -> ChunkRecord {
        ChunkRecord {
            text: text.to_string(),
            source: Some("policies.txt".to_string()),
            ordinal,
        }
    }

    fn manifest(count: usize) -> Manifest {
        Manifest {
            schema_version: METADATA_SCHEMA_VERSION,
            generation: Uuid::new_v4(),
            created_at: Utc::now(),
            embedding_model: "hashing-8".to_string(),
            dimension: 8,
            count,
            index_checksum: "abc".to_string(),
        }
    }

    #[test]
    fn test_append_and_get() {
        let mut store = MetadataStore::new();
        store.append(vec![record("attendance", 0), record("grading", 1)]);

        assert_eq!(store.len(), 2);
        assert_eq!(store.get(1).unwrap().text, "grading");
        assert!(matches!(
            store.get(2),
            Err(KbError::OutOfRange {
                position: 2,
                len: 2
            })
        ));
    }

    #[test]
    fn test_json_round_trip() {
        let mut store = MetadataStore::new();
        store.append(vec![record("fees", 0), record("transport", 1)]);
        let manifest = manifest(2);

        let bytes = store.to_json(&manifest).unwrap();
        let (loaded_manifest, loaded) =
            MetadataStore::from_json(&bytes, &PathBuf::from("meta.json")).unwrap();

        assert_eq!(loaded_manifest, manifest);
        assert_eq!(loaded, store);
    }

    #[test]
    fn test_count_mismatch_rejected() {
        let mut store = MetadataStore::new();
        store.append(vec![record("fees", 0)]);

        let bytes = store.to_json(&manifest(3)).unwrap();
        assert!(matches!(
            MetadataStore::from_json(&bytes, &PathBuf::from("meta.json")),
            Err(KbError::Persistence { .. })
        ));
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(MetadataStore::from_json(b"not json", &PathBuf::from("meta.json")).is_err());
    }
}
