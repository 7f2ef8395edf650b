/// HNSW graph for approximate nearest-neighbour candidates
use hnsw_rs::prelude::*;

/// Upper bound on graph layers supported by hnsw_rs
const MAX_LAYER: usize = 16;

/// Capacity hint used to size the layer distribution
const CAPACITY_HINT: usize = 10_000;

/// HNSW graph keyed by index position
///
/// Only the graph lives here; vectors are owned by the flat store and the
/// graph is rebuilt from them on load.
pub(crate) struct HnswGraph {
    graph: Hnsw<'static, f32, DistL2>,
    ef_search: usize,
}

impl HnswGraph {
    /// Create an empty graph
    ///
    /// # Arguments
    /// * `m` - Number of connections per layer
    /// * `ef_construction` - Construction beam width (higher = better recall, slower build)
    /// * `ef_search` - Search beam width (higher = better recall, slower search)
    pub(crate) fn new(m: usize, ef_construction: usize, ef_search: usize) -> Self {
        let graph =
            Hnsw::<f32, DistL2>::new(m, CAPACITY_HINT, MAX_LAYER, ef_construction, DistL2);
        Self { graph, ef_search }
    }

    pub(crate) fn insert(&self, position: usize, vector: &[f32]) {
        self.graph.insert((vector, position));
    }

    /// Candidate positions for `query`, at most `k`
    pub(crate) fn candidates(&self, query: &[f32], k: usize) -> Vec<usize> {
        let ef = self.ef_search.max(k);
        self.graph
            .search(query, k, ef)
            .into_iter()
            .map(|neighbour| neighbour.d_id)
            .collect()
    }
}
