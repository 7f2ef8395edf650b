//! Exact vector storage and brute-force squared-L2 search

use super::Neighbor;
use crate::error::{KbError, Result};
use ndarray::{Array2, ArrayView1};

/// Row-major matrix of vectors, one row per index position
///
/// This is the canonical form of every index: the approximate graph is always
/// derived from it, and it is what gets persisted.
#[derive(Debug, Clone)]
pub(crate) struct FlatVectors {
    data: Array2<f32>,
}

impl FlatVectors {
    pub(crate) fn new(dimension: usize) -> Self {
        Self {
            data: Array2::zeros((0, dimension)),
        }
    }

    /// Rebuild from row-major values; `values.len()` must be `rows * dimension`
    pub(crate) fn from_raw(dimension: usize, values: Vec<f32>) -> Option<Self> {
        if dimension == 0 || values.len() % dimension != 0 {
            return None;
        }
        let rows = values.len() / dimension;
        Array2::from_shape_vec((rows, dimension), values)
            .ok()
            .map(|data| Self { data })
    }

    pub(crate) fn len(&self) -> usize {
        self.data.nrows()
    }

    pub(crate) fn push(&mut self, vector: &[f32]) -> Result<()> {
        let expected = self.data.ncols();
        self.data
            .push_row(ArrayView1::from(vector))
            .map_err(|_| KbError::DimensionMismatch {
                expected,
                actual: vector.len(),
            })
    }

    pub(crate) fn row(&self, position: usize) -> ArrayView1<'_, f32> {
        self.data.row(position)
    }

    /// Row-major copy of every value
    pub(crate) fn values(&self) -> impl Iterator<Item = f32> + '_ {
        self.data.iter().copied()
    }

    pub(crate) fn squared_l2(&self, position: usize, query: &[f32]) -> f32 {
        self.data
            .row(position)
            .iter()
            .zip(query)
            .map(|(a, b)| {
                let d = a - b;
                d * d
            })
            .sum()
    }

    /// Exact k-nearest search, closest first, ties broken by position
    pub(crate) fn search(&self, query: &[f32], k: usize) -> Vec<Neighbor> {
        let mut neighbors: Vec<Neighbor> = (0..self.len())
            .map(|position| Neighbor {
                position,
                distance: self.squared_l2(position, query),
            })
            .collect();

        sort_neighbors(&mut neighbors);
        neighbors.truncate(k);
        neighbors
    }
}

pub(crate) fn sort_neighbors(neighbors: &mut [Neighbor]) {
    neighbors.sort_by(|a, b| {
        a.distance
            .total_cmp(&b.distance)
            .then(a.position.cmp(&b.position))
    });
}
