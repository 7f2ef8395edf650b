//! Vector index for nearest-neighbour search
//!
//! Stores embedding vectors in insertion order; position `i` is the i-th vector
//! ever added. Search is by squared Euclidean distance, closest first.
//!
//! Two strategies:
//! - `Exact`: brute force, O(n·d) per query, always returns the true neighbours
//! - `Hnsw`: approximate graph search. Candidates are re-scored exactly, so
//!   ordering and distances are still exact, but the graph may miss true
//!   neighbours (recall below 1.0) in exchange for sub-linear query time. The
//!   graph is rebuilt from the stored vectors on load, which can change which
//!   neighbours are found.

mod flat;
mod format;
mod hnsw;

use crate::error::{KbError, Result};
use crate::storage;
use flat::FlatVectors;
use hnsw::HnswGraph;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Search strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    /// Brute-force exact search
    Exact,
    /// Approximate HNSW search
    Hnsw {
        /// Connections per layer
        m: usize,
        /// Construction beam width
        ef_construction: usize,
        /// Search beam width
        ef_search: usize,
    },
}

/// One search hit
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Neighbor {
    /// Index position (insertion order)
    pub position: usize,
    /// Squared Euclidean distance to the query
    pub distance: f32,
}

/// Ordered vector collection with nearest-neighbour search
pub struct VectorIndex {
    kind: IndexKind,
    dimension: usize,
    vectors: FlatVectors,
    graph: Option<HnswGraph>,
}

impl VectorIndex {
    /// Create an empty index with an established dimension
    pub fn new(kind: IndexKind, dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(KbError::Config(
                "Vector dimension must be greater than 0".to_string(),
            ));
        }

        Ok(Self {
            kind,
            dimension,
            vectors: FlatVectors::new(dimension),
            graph: build_graph(kind),
        })
    }

    pub fn kind(&self) -> IndexKind {
        self.kind
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of indexed vectors
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append vectors, assigning each the next sequential position
    ///
    /// The whole batch is checked first: on a dimension mismatch nothing is
    /// added and the index keeps serving its previous contents.
    pub fn add(&mut self, vectors: &[Vec<f32>]) -> Result<()> {
        if let Some(bad) = vectors.iter().find(|v| v.len() != self.dimension) {
            return Err(KbError::DimensionMismatch {
                expected: self.dimension,
                actual: bad.len(),
            });
        }

        for vector in vectors {
            let position = self.vectors.len();
            self.vectors.push(vector)?;
            if let Some(graph) = &self.graph {
                graph.insert(position, vector);
            }
        }

        Ok(())
    }

    /// The `k` nearest vectors to `query`, ascending by distance
    ///
    /// Returns every vector when the index holds fewer than `k`.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        if k == 0 {
            return Err(KbError::Config("k must be greater than 0".to_string()));
        }
        if query.len() != self.dimension {
            return Err(KbError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }
        if self.is_empty() {
            return Ok(Vec::new());
        }

        match &self.graph {
            None => Ok(self.vectors.search(query, k)),
            Some(graph) => {
                let mut neighbors: Vec<Neighbor> = graph
                    .candidates(query, k)
                    .into_iter()
                    .filter(|position| *position < self.len())
                    .map(|position| Neighbor {
                        position,
                        distance: self.vectors.squared_l2(position, query),
                    })
                    .collect();
                flat::sort_neighbors(&mut neighbors);
                neighbors.dedup_by_key(|n| n.position);
                neighbors.truncate(k);
                Ok(neighbors)
            }
        }
    }

    /// Copy of the vector stored at `position`
    pub fn vector(&self, position: usize) -> Option<Vec<f32>> {
        (position < self.len()).then(|| self.vectors.row(position).to_vec())
    }

    /// Serialize the full vector set
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        format::encode(self.kind, self.dimension, self.len(), self.vectors.values())
            .map_err(|message| KbError::Other(anyhow::anyhow!(message)))
    }

    /// Rebuild an index from [`to_bytes`](Self::to_bytes) output
    ///
    /// `origin` only labels errors.
    pub fn from_bytes(bytes: &[u8], origin: &Path) -> Result<Self> {
        let decoded =
            format::decode(bytes).map_err(|message| KbError::persistence(origin, message))?;

        let vectors = FlatVectors::from_raw(decoded.dimension, decoded.values)
            .ok_or_else(|| KbError::persistence(origin, "Vector payload has the wrong shape"))?;

        let graph = build_graph(decoded.kind);
        if let Some(graph) = &graph {
            for position in 0..vectors.len() {
                graph.insert(position, &vectors.row(position).to_vec());
            }
        }

        Ok(Self {
            kind: decoded.kind,
            dimension: decoded.dimension,
            vectors,
            graph,
        })
    }

    /// Write the index to `path` atomically
    pub fn save(&self, path: &Path) -> Result<()> {
        let bytes = self.to_bytes()?;
        storage::write_atomic(path, &bytes)
    }

    /// Load an index written by [`save`](Self::save)
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|e| KbError::persistence(path, e.to_string()))?;
        Self::from_bytes(&bytes, path)
    }
}

fn build_graph(kind: IndexKind) -> Option<HnswGraph> {
    match kind {
        IndexKind::Exact => None,
        IndexKind::Hnsw {
            m,
            ef_construction,
            ef_search,
        } => Some(HnswGraph::new(m, ef_construction, ef_search)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn unit(dimension: usize, hot: usize) -> Vec<f32> {
        let mut v = vec![0.0; dimension];
        v[hot] = 1.0;
        v
    }

    #[test]
    fn test_index_creation() {
        let index = VectorIndex::new(IndexKind::Exact, 384).unwrap();
        assert_eq!(index.dimension(), 384);
        assert_eq!(index.len(), 0);
        assert!(index.is_empty());
        assert!(VectorIndex::new(IndexKind::Exact, 0).is_err());
    }

    #[test]
    fn test_add_and_search() {
        let mut index = VectorIndex::new(IndexKind::Exact, 384).unwrap();

        let vec1 = unit(384, 0);
        let vec2 = unit(384, 1);
        let mut vec3 = vec![0.0; 384];
        vec3[0] = 0.9;
        vec3[1] = 0.1;

        index.add(&[vec1.clone(), vec2, vec3]).unwrap();
        assert_eq!(index.len(), 3);

        let results = index.search(&vec1, 2).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].position, 0);
        assert_eq!(results[0].distance, 0.0);
        assert_eq!(results[1].position, 2);
        assert!(results[0].distance <= results[1].distance);
    }

    #[test]
    fn test_k_larger_than_index() {
        let mut index = VectorIndex::new(IndexKind::Exact, 4).unwrap();
        index.add(&[unit(4, 0), unit(4, 1)]).unwrap();

        assert_eq!(index.search(&unit(4, 2), 50).unwrap().len(), 2);
    }

    #[test]
    fn test_zero_k_rejected() {
        let mut index = VectorIndex::new(IndexKind::Exact, 4).unwrap();
        index.add(&[unit(4, 0)]).unwrap();

        assert!(matches!(
            index.search(&unit(4, 0), 0),
            Err(KbError::Config(_))
        ));
    }

    #[test]
    fn test_dimension_mismatch_keeps_existing_vectors() {
        let mut index = VectorIndex::new(IndexKind::Exact, 384).unwrap();
        index.add(&[unit(384, 0), unit(384, 1)]).unwrap();

        let result = index.add(&[vec![1.0; 128]]);
        assert!(matches!(
            result,
            Err(KbError::DimensionMismatch {
                expected: 384,
                actual: 128
            })
        ));

        // A mixed batch is rejected as a whole
        assert!(index.add(&[unit(384, 2), vec![1.0; 128]]).is_err());

        assert_eq!(index.len(), 2);
        let results = index.search(&unit(384, 1), 5).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].position, 1);

        assert!(matches!(
            index.search(&[1.0; 128], 1),
            Err(KbError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_save_and_load() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("test.index");

        let mut index = VectorIndex::new(IndexKind::Exact, 8).unwrap();
        let vectors: Vec<Vec<f32>> = (0..20)
            .map(|i| (0..8).map(|j| ((i * 8 + j) as f32 * 0.37).sin()).collect())
            .collect();
        index.add(&vectors).unwrap();
        index.save(&path).unwrap();

        let loaded = VectorIndex::load(&path).unwrap();
        assert_eq!(loaded.dimension(), 8);
        assert_eq!(loaded.len(), 20);
        assert_eq!(loaded.kind(), IndexKind::Exact);

        for query in vectors.iter().take(5) {
            let before = index.search(query, 7).unwrap();
            let after = loaded.search(query, 7).unwrap();
            assert_eq!(before, after);
        }
    }

    #[test]
    fn test_load_missing_or_corrupt() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("missing.index");
        assert!(matches!(
            VectorIndex::load(&path),
            Err(KbError::Persistence { .. })
        ));

        std::fs::write(&path, b"definitely not an index").unwrap();
        assert!(matches!(
            VectorIndex::load(&path),
            Err(KbError::Persistence { .. })
        ));
    }

    #[test]
    fn test_hnsw_search_is_closest_first() {
        let kind = IndexKind::Hnsw {
            m: 16,
            ef_construction: 200,
            ef_search: 64,
        };
        let mut index = VectorIndex::new(kind, 16).unwrap();
        let vectors: Vec<Vec<f32>> = (0..16).map(|i| unit(16, i)).collect();
        index.add(&vectors).unwrap();

        let results = index.search(&vectors[3], 4).unwrap();
        assert!(!results.is_empty());
        assert_eq!(results[0].position, 3);
        for pair in results.windows(2) {
            assert!(pair[0].distance <= pair[1].distance);
        }
    }

    #[test]
    fn test_hnsw_round_trip_keeps_vectors() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("hnsw.index");
        let kind = IndexKind::Hnsw {
            m: 8,
            ef_construction: 100,
            ef_search: 32,
        };

        let mut index = VectorIndex::new(kind, 4).unwrap();
        index.add(&[unit(4, 0), unit(4, 1), unit(4, 2)]).unwrap();
        index.save(&path).unwrap();

        let loaded = VectorIndex::load(&path).unwrap();
        assert_eq!(loaded.kind(), kind);
        for position in 0..3 {
            assert_eq!(loaded.vector(position), index.vector(position));
        }
        assert_eq!(loaded.search(&unit(4, 2), 1).unwrap()[0].position, 2);
    }
}
