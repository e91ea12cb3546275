//! Sparse top-k neighbor extraction from a similarity matrix.
//!
//! Each entity keeps at most `k` neighbors at or above a similarity floor.
//! The relation is intentionally asymmetric: i may list j while j's own
//! top-k, capped independently, omits i. Consumers must not symmetrize it.
//!
//! Entities with zero qualifying neighbors are absent from the map; absence
//! and an empty list are different statements and the map only ever makes
//! the first one.

use std::collections::BTreeMap;

use rayon::prelude::*;

use log::{debug, info};

use serde::{Deserialize, Serialize};

use crate::similarity::SimilarityMatrix;

/// Entity id → ordered `(neighbor_id, similarity)` pairs, best first.
pub type NeighborMap = BTreeMap<String, Vec<(String, f64)>>;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NeighborParams {
    /// Neighbors kept per entity.
    pub k: usize,
    /// Similarity floor below which a candidate is dropped.
    pub min_similarity: f64,
}

impl Default for NeighborParams {
    fn default() -> Self {
        Self {
            k: 5,               // top-5 per entity
            min_similarity: 0.15, // Jaccard floor for a visible edge
        }
    }
}

// Approximate equality for the float field, exact for the integer one
impl PartialEq for NeighborParams {
    fn eq(&self, other: &Self) -> bool {
        self.k == other.k
            && approx::relative_eq!(self.min_similarity, other.min_similarity)
    }
}

impl Eq for NeighborParams {}

/// Extract the per-entity top-k neighbor map.
///
/// For each row the candidates are all *other* indices (self-exclusion is
/// structural, never dependent on the unit diagonal sorting first), ordered
/// by similarity descending with a stable sort so exact ties keep original
/// index order, capped at `k`, then thresholded.
///
/// # Panics
///
/// If `ids` does not line up with the matrix dimension.
pub fn extract_neighbors(
    similarity: &SimilarityMatrix,
    ids: &[String],
    params: &NeighborParams,
) -> NeighborMap {
    let n = similarity.nentities;
    assert_eq!(
        ids.len(),
        n,
        "id count {} must match matrix dimension {}",
        ids.len(),
        n
    );

    info!(
        "Extracting top-{} neighbors (min similarity {:.2}) for {} entities",
        params.k, params.min_similarity, n
    );

    let map: NeighborMap = (0..n)
        .into_par_iter()
        .filter_map(|i| {
            let row = similarity.row(i);
            let mut candidates: Vec<(usize, f64)> =
                (0..n).filter(|&j| j != i).map(|j| (j, row[j])).collect();
            // Stable sort: equal similarities stay in original index order
            candidates.sort_by(|a, b| {
                b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal)
            });

            let kept: Vec<(String, f64)> = candidates
                .into_iter()
                .take(params.k)
                .filter(|&(_, sim)| sim >= params.min_similarity)
                .map(|(j, sim)| (ids[j].clone(), sim))
                .collect();

            if kept.is_empty() {
                None
            } else {
                Some((ids[i].clone(), kept))
            }
        })
        .collect();

    debug!(
        "Neighbor map covers {}/{} entities ({} omitted with no qualifying neighbor)",
        map.len(),
        n,
        n - map.len()
    );
    map
}
