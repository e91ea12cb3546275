//! Hybrid pairwise similarity over heterogeneous gene-set entities.
//!
//! ## Algorithm Overview
//!
//! 1. **Vocabulary**: union of all gene identifiers, indexed in sorted order
//! 2. **Incidence matrix**: sparse binary genes × entities matrix in CSR
//! 3. **Intersection counts**: single sparse product `Bᵀ · B`, so the cost is
//!    proportional to co-occurring gene pairs rather than N² set scans
//! 4. **Metric dispatch**: per-cell selection between Jaccard and overlap
//!    coefficient driven by precomputed entity-kind masks
//! 5. **Diagonal**: forced to exactly 1.0 regardless of formula
//!
//! The metric depends only on the unordered pair of entity kinds, so the
//! result is symmetric by construction:
//! - same kind on both sides → Jaccard `|A∩B| / |A∪B|`
//! - cross-kind involving a TF → overlap `|A∩B| / min(|A|,|B|)`, which keeps
//!   a small regulon comparable to a large pathway
//! - any other cross-kind pair → Jaccard
//!
//! Union and minimum sizes are floored at 1 so empty gene sets divide by one
//! and score 0 instead of producing NaN. Everything here is deterministic:
//! sorted vocabulary, ordered gene sets, no randomness.

use std::fmt;

use smartcore::linalg::basic::arrays::{Array, Array2};
use smartcore::linalg::basic::matrix::DenseMatrix;

use sprs::{CsMat, TriMat};
use std::collections::{BTreeMap, BTreeSet};

use rayon::prelude::*;

use log::{debug, info, trace};

use crate::entity::Entity;

/// Symmetric N×N similarity matrix with unit diagonal, values in [0, 1].
#[derive(Debug, Clone)]
pub struct SimilarityMatrix {
    pub matrix: DenseMatrix<f64>,
    pub nentities: usize,
}

/// Compute the hybrid similarity matrix for a filtered entity set.
///
/// # Panics
///
/// If `entities` is empty; the pipeline validates emptiness before any
/// numerical stage runs.
pub fn compute_similarity(entities: &[Entity]) -> SimilarityMatrix {
    let n = entities.len();
    assert!(n > 0, "similarity requires at least one entity");

    info!("Computing hybrid similarity for {} entities", n);

    // Step 1: stable gene vocabulary, indices assigned in sorted order
    let gene_index: BTreeMap<&str, usize> = entities
        .iter()
        .flat_map(|e| e.gene_set.iter().map(String::as_str))
        .collect::<BTreeSet<&str>>()
        .into_iter()
        .enumerate()
        .map(|(rank, gene)| (gene, rank))
        .collect();
    let ngenes = gene_index.len();
    debug!("Gene vocabulary: {} unique identifiers", ngenes);

    // Step 2+3: sparse incidence and intersection counts, densified row-major
    let mut intersections = vec![0.0f64; n * n];
    if ngenes == 0 {
        // All gene sets empty: every off-diagonal similarity is 0, so skip
        // the degenerate sparse product entirely.
        debug!("Empty gene vocabulary - similarity reduces to the identity");
    } else {
        let mut triplets = TriMat::new((ngenes, n));
        for (col, entity) in entities.iter().enumerate() {
            for gene in &entity.gene_set {
                triplets.add_triplet(gene_index[gene.as_str()], col, 1.0);
            }
        }
        let incidence: CsMat<f64> = triplets.to_csr();
        trace!(
            "Incidence matrix: {}×{} with {} non-zeros",
            ngenes,
            n,
            incidence.nnz()
        );

        let incidence_t: CsMat<f64> = incidence.transpose_view().to_csr();
        let product: CsMat<f64> = &incidence_t * &incidence;
        debug!("Intersection product: {} non-zero pairs", product.nnz());

        for (value, (i, j)) in product.iter() {
            intersections[i * n + j] = *value;
        }
    }

    // Step 4: per-cell metric select from precomputed kind masks
    let sizes: Vec<f64> = entities.iter().map(|e| e.gene_set.len() as f64).collect();
    let kinds: Vec<_> = entities.iter().map(|e| e.kind).collect();
    let tf_mask: Vec<bool> = kinds.iter().map(|k| k.is_tf()).collect();

    let rows: Vec<Vec<f64>> = (0..n)
        .into_par_iter()
        .map(|i| {
            let mut row = Vec::with_capacity(n);
            for j in 0..n {
                if i == j {
                    // Step 5: unit self-similarity, independent of the metric
                    row.push(1.0);
                    continue;
                }
                // Both candidate metrics, then one mask-driven select; the
                // mask depends only on the unordered kind pair
                let inter = intersections[i * n + j];
                let union = (sizes[i] + sizes[j] - inter).max(1.0);
                let min_size = sizes[i].min(sizes[j]).max(1.0);
                let jaccard = inter / union;
                let overlap = inter / min_size;
                let cross_tf = kinds[i] != kinds[j] && (tf_mask[i] || tf_mask[j]);
                row.push(if cross_tf { overlap } else { jaccard });
            }
            row
        })
        .collect();

    let matrix = DenseMatrix::from_iterator(
        rows.into_iter().flatten(),
        n,
        n,
        0,
    );

    let result = SimilarityMatrix { matrix, nentities: n };
    let (mean, max) = result.offdiagonal_stats();
    info!(
        "Similarity matrix built: {}×{}, off-diagonal mean {:.4}, max {:.4}",
        n, n, mean, max
    );
    result
}

impl SimilarityMatrix {
    /// Matrix dimensions as (rows, cols); always square.
    pub fn shape(&self) -> (usize, usize) {
        self.matrix.shape()
    }

    /// Similarity between entities i and j.
    pub fn get(&self, i: usize, j: usize) -> f64 {
        assert!(
            i < self.nentities && j < self.nentities,
            "Index out of bounds: ({}, {}) for {}x{} matrix",
            i,
            j,
            self.nentities,
            self.nentities
        );
        *self.matrix.get((i, j))
    }

    /// The i-th row as an owned vector.
    pub fn row(&self, i: usize) -> Vec<f64> {
        assert!(
            i < self.nentities,
            "Row index {} out of bounds for {} entities",
            i,
            self.nentities
        );
        (0..self.nentities).map(|j| *self.matrix.get((i, j))).collect()
    }

    /// Check symmetry within a tolerance.
    pub fn is_symmetric(&self, tolerance: f64) -> bool {
        let mut max_asymmetry: f64 = 0.0;
        for i in 0..self.nentities {
            for j in (i + 1)..self.nentities {
                let diff = (self.get(i, j) - self.get(j, i)).abs();
                max_asymmetry = max_asymmetry.max(diff);
            }
        }
        trace!("Symmetry check: max asymmetry {:.2e}", max_asymmetry);
        max_asymmetry <= tolerance
    }

    /// Convert to a distance matrix `D = 1 - M` with the diagonal forced to
    /// exactly 0, guarding against floating-point noise turning
    /// self-distances into tiny non-zero values.
    pub fn to_distance(&self) -> DenseMatrix<f64> {
        let n = self.nentities;
        let data = (0..n).flat_map(|i| {
            let row: Vec<f64> = (0..n)
                .map(|j| if i == j { 0.0 } else { 1.0 - self.get(i, j) })
                .collect();
            row
        });
        DenseMatrix::from_iterator(data, n, n, 0)
    }

    /// Mean and maximum of the off-diagonal entries, for diagnostics.
    pub fn offdiagonal_stats(&self) -> (f64, f64) {
        let n = self.nentities;
        if n < 2 {
            return (0.0, 0.0);
        }
        let mut sum = 0.0;
        let mut max: f64 = 0.0;
        for i in 0..n {
            for j in 0..n {
                if i != j {
                    let v = self.get(i, j);
                    sum += v;
                    max = max.max(v);
                }
            }
        }
        (sum / (n * n - n) as f64, max)
    }

    /// Fraction of off-diagonal entries at or above a threshold.
    pub fn edge_density(&self, threshold: f64) -> f64 {
        let n = self.nentities;
        if n < 2 {
            return 0.0;
        }
        let mut above = 0usize;
        for i in 0..n {
            for j in 0..n {
                if i != j && self.get(i, j) >= threshold {
                    above += 1;
                }
            }
        }
        above as f64 / (n * n - n) as f64
    }
}

impl fmt::Display for SimilarityMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "SimilarityMatrix ({}×{}):", self.nentities, self.nentities)?;
        if self.nentities <= 10 {
            for i in 0..self.nentities {
                write!(f, "Row {}: [", i)?;
                for j in 0..self.nentities {
                    write!(f, "{:6.3} ", self.get(i, j))?;
                }
                writeln!(f, "]")?;
            }
        } else {
            let (mean, max) = self.offdiagonal_stats();
            writeln!(f, "Off-diagonal mean: {:.4}, max: {:.4}", mean, max)?;
        }
        Ok(())
    }
}
