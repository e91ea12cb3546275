//! # Neighborhood-manifold embedding on a precomputed distance matrix
//!
//! ## Algorithm Overview
//!
//! 1. **k-NN extraction**: per row, the `n_neighbors` closest other entities
//! 2. **Smoothed kernel**: per-row local connectivity offset `rho` (distance
//!    to the nearest non-identical neighbor) and bandwidth `sigma` found by
//!    binary search so the kernel mass hits `log2(k)`
//! 3. **Fuzzy union**: directed memberships `w(i→j) = exp(-(d - rho)/sigma)`
//!    symmetrized as `a + b - a·b`
//! 4. **Output kernel fit**: `(a, b)` such that `1/(1 + a·x^(2b))`
//!    approximates the target curve induced by `min_dist`, found by
//!    deterministic grid refinement
//! 5. **Optimization**: seeded stochastic descent over the edge list with
//!    weight-proportional sampling schedules and negative sampling
//!
//! The optimizer is intentionally single-threaded: one `ChaCha8Rng` stream
//! drives edge schedules, negative draws and initialization, so a fixed seed
//! reproduces the layout exactly. Raw coordinates land wherever the descent
//! leaves them; the caller rescales to the unit square.

use std::collections::{BTreeMap, BTreeSet};

use log::{debug, info, trace};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use smartcore::linalg::basic::arrays::Array;
use smartcore::linalg::basic::matrix::DenseMatrix;

use crate::error::{EnrichmapError, Result};
use crate::reduction::{EmbeddingParams, ReductionBackend, ReductionMethod};
use crate::similarity::SimilarityMatrix;

/// Optimization epochs; small maps converge well before this.
const OPT_EPOCHS: usize = 500;

/// Negative samples drawn per attractive update.
const NEGATIVE_SAMPLE_RATE: usize = 5;

/// Convergence tolerance for the bandwidth binary search.
const SMOOTH_K_TOLERANCE: f64 = 1e-5;

/// Per-component gradient clip.
const GRAD_CLIP: f64 = 4.0;

/// Spread of the output kernel the `(a, b)` fit targets.
const OUTPUT_SPREAD: f64 = 1.0;

pub struct ManifoldBackend;

impl ReductionBackend for ManifoldBackend {
    fn method(&self) -> ReductionMethod {
        ReductionMethod::Manifold
    }

    fn attempt(
        &self,
        similarity: &SimilarityMatrix,
        distance: &DenseMatrix<f64>,
        params: &EmbeddingParams,
    ) -> Result<Vec<[f64; 2]>> {
        let n = similarity.nentities;
        if n < 3 {
            return Err(EnrichmapError::Reduction {
                backend: "manifold",
                reason: format!("need at least 3 entities, got {}", n),
            });
        }

        let k = params.n_neighbors.min(n - 1);
        info!(
            "Manifold embedding: {} entities, k={}, min_dist={}, seed={}",
            n, k, params.min_dist, params.seed
        );

        // Step 1: k nearest neighbors per row from the distance matrix
        let knn = nearest_neighbors(distance, n, k);

        // Step 2: per-row smoothed kernel parameters
        let (rhos, sigmas) = smooth_knn_parameters(&knn, k);

        // Step 3: directed memberships, fuzzy-union symmetrized
        let edges = fuzzy_union_edges(&knn, &rhos, &sigmas, n);
        debug!("Neighborhood graph: {} directed edges", edges.len());

        // Step 4: output kernel shape from min_dist
        let (a, b) = fit_output_curve(params.min_dist, OUTPUT_SPREAD);
        debug!("Output kernel fit: a={:.4}, b={:.4}", a, b);

        // Step 5: seeded stochastic descent
        let coords = optimize_layout(n, &edges, a, b, params.seed);
        Ok(coords)
    }
}

/// For each row, the k closest other indices with their distances, ascending,
/// ties resolved by index order.
fn nearest_neighbors(
    distance: &DenseMatrix<f64>,
    n: usize,
    k: usize,
) -> Vec<Vec<(usize, f64)>> {
    (0..n)
        .map(|i| {
            let mut others: Vec<(usize, f64)> = (0..n)
                .filter(|&j| j != i)
                .map(|j| (j, *distance.get((i, j))))
                .collect();
            others.sort_by(|a, b| {
                a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal)
            });
            others.truncate(k);
            others
        })
        .collect()
}

/// Local connectivity offset and bandwidth per row.
///
/// `rho` is the smallest strictly positive neighbor distance (0 when the
/// whole neighborhood is at distance 0). `sigma` solves
/// `Σ exp(-max(0, d - rho)/sigma) = log2(k)` by binary search; the target
/// keeps neighborhood mass comparable across rows of very different density.
fn smooth_knn_parameters(knn: &[Vec<(usize, f64)>], k: usize) -> (Vec<f64>, Vec<f64>) {
    let target = (k as f64).log2().max(SMOOTH_K_TOLERANCE);

    let mut rhos = Vec::with_capacity(knn.len());
    let mut sigmas = Vec::with_capacity(knn.len());

    for neighbors in knn {
        let rho = neighbors
            .iter()
            .map(|&(_, d)| d)
            .find(|&d| d > 0.0)
            .unwrap_or(0.0);

        let mut lo = 0.0f64;
        let mut hi = f64::INFINITY;
        let mut mid = 1.0f64;
        for _ in 0..64 {
            let psum: f64 = neighbors
                .iter()
                .map(|&(_, d)| (-((d - rho).max(0.0)) / mid).exp())
                .sum();
            if (psum - target).abs() < SMOOTH_K_TOLERANCE {
                break;
            }
            if psum > target {
                hi = mid;
                mid = (lo + hi) / 2.0;
            } else {
                lo = mid;
                mid = if hi.is_infinite() { mid * 2.0 } else { (lo + hi) / 2.0 };
            }
        }

        rhos.push(rho);
        sigmas.push(mid.max(1e-8));
    }

    trace!(
        "Smoothed kernel: rho range [{:.4}, {:.4}]",
        rhos.iter().cloned().fold(f64::INFINITY, f64::min),
        rhos.iter().cloned().fold(f64::NEG_INFINITY, f64::max)
    );
    (rhos, sigmas)
}

/// Directed weighted edge list after fuzzy set union `a + b - a·b`.
/// Each undirected pair appears in both directions with the same weight.
fn fuzzy_union_edges(
    knn: &[Vec<(usize, f64)>],
    rhos: &[f64],
    sigmas: &[f64],
    n: usize,
) -> Vec<(usize, usize, f64)> {
    let mut directed: BTreeMap<(usize, usize), f64> = BTreeMap::new();
    for (i, neighbors) in knn.iter().enumerate() {
        for &(j, d) in neighbors {
            let weight = (-((d - rhos[i]).max(0.0)) / sigmas[i]).exp();
            directed.insert((i, j), weight);
        }
    }

    let mut edges = Vec::with_capacity(directed.len() * 2);
    let mut seen: BTreeSet<(usize, usize)> = BTreeSet::new();
    for &(i, j) in directed.keys() {
        let pair = if i < j { (i, j) } else { (j, i) };
        if !seen.insert(pair) {
            continue;
        }
        let forward = directed.get(&pair).copied().unwrap_or(0.0);
        let backward = directed.get(&(pair.1, pair.0)).copied().unwrap_or(0.0);
        let union = forward + backward - forward * backward;
        if union > 0.0 {
            edges.push((pair.0, pair.1, union));
            edges.push((pair.1, pair.0, union));
        }
    }

    debug_assert!(edges.iter().all(|&(i, j, _)| i < n && j < n));
    edges
}

/// Fit `(a, b)` so `1/(1 + a·x^(2b))` tracks the target curve
/// `psi(x) = 1 for x ≤ min_dist, exp(-(x - min_dist)/spread) otherwise`.
///
/// Three rounds of grid refinement over the squared error; deterministic, so
/// identical parameters always produce the identical kernel.
pub fn fit_output_curve(min_dist: f64, spread: f64) -> (f64, f64) {
    const SAMPLES: usize = 300;
    const GRID: usize = 80;

    let xs: Vec<f64> = (0..SAMPLES)
        .map(|s| 3.0 * spread * s as f64 / (SAMPLES - 1) as f64)
        .collect();
    let targets: Vec<f64> = xs
        .iter()
        .map(|&x| {
            if x <= min_dist {
                1.0
            } else {
                (-(x - min_dist) / spread).exp()
            }
        })
        .collect();

    let sse = |a: f64, b: f64| -> f64 {
        xs.iter()
            .zip(&targets)
            .map(|(&x, &t)| {
                let fit = 1.0 / (1.0 + a * x.powf(2.0 * b));
                (fit - t) * (fit - t)
            })
            .sum()
    };

    let (mut a_lo, mut a_hi) = (0.01f64, 10.0f64);
    let (mut b_lo, mut b_hi) = (0.2f64, 2.5f64);
    let (mut best_a, mut best_b) = (1.0, 1.0);

    for _ in 0..3 {
        let a_step = (a_hi - a_lo) / GRID as f64;
        let b_step = (b_hi - b_lo) / GRID as f64;
        let mut best_err = f64::INFINITY;
        for ai in 0..=GRID {
            let a = a_lo + ai as f64 * a_step;
            for bi in 0..=GRID {
                let b = b_lo + bi as f64 * b_step;
                let err = sse(a, b);
                if err < best_err {
                    best_err = err;
                    best_a = a;
                    best_b = b;
                }
            }
        }
        a_lo = (best_a - a_step).max(1e-3);
        a_hi = best_a + a_step;
        b_lo = (best_b - b_step).max(1e-3);
        b_hi = best_b + b_step;
    }

    (best_a, best_b)
}

/// Seeded stochastic descent over the edge list.
///
/// Attractive updates move both endpoints; negative samples repel the head
/// from uniformly drawn entities. Edge application frequency is proportional
/// to edge weight via per-edge epoch schedules.
fn optimize_layout(
    n: usize,
    edges: &[(usize, usize, f64)],
    a: f64,
    b: f64,
    seed: u64,
) -> Vec<[f64; 2]> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);

    let mut coords: Vec<[f64; 2]> = (0..n)
        .map(|_| [rng.random_range(-10.0..10.0), rng.random_range(-10.0..10.0)])
        .collect();

    if edges.is_empty() {
        return coords;
    }

    // Weight-proportional schedules; edges far below the maximum weight are
    // applied on sparse epochs rather than every cycle.
    let max_weight = edges.iter().map(|&(_, _, w)| w).fold(f64::MIN, f64::max);
    let floor = max_weight / OPT_EPOCHS as f64;
    let kept: Vec<(usize, usize, f64)> =
        edges.iter().copied().filter(|&(_, _, w)| w >= floor).collect();

    let epochs_per_sample: Vec<f64> =
        kept.iter().map(|&(_, _, w)| max_weight / w).collect();
    let epochs_per_negative: Vec<f64> = epochs_per_sample
        .iter()
        .map(|e| e / NEGATIVE_SAMPLE_RATE as f64)
        .collect();
    let mut next_sample = epochs_per_sample.clone();
    let mut next_negative = epochs_per_negative.clone();

    debug!(
        "Optimizing layout: {} edges kept of {}, {} epochs",
        kept.len(),
        edges.len(),
        OPT_EPOCHS
    );

    for epoch in 0..OPT_EPOCHS {
        let alpha = 1.0 * (1.0 - epoch as f64 / OPT_EPOCHS as f64);
        let epoch_f = epoch as f64;

        for (e, &(i, j, _)) in kept.iter().enumerate() {
            if next_sample[e] > epoch_f {
                continue;
            }

            // Attractive force along the edge
            let dx = coords[i][0] - coords[j][0];
            let dy = coords[i][1] - coords[j][1];
            let d2 = dx * dx + dy * dy;
            if d2 > 0.0 {
                let coeff = (-2.0 * a * b * d2.powf(b - 1.0)) / (a * d2.powf(b) + 1.0);
                let gx = (coeff * dx).clamp(-GRAD_CLIP, GRAD_CLIP);
                let gy = (coeff * dy).clamp(-GRAD_CLIP, GRAD_CLIP);
                coords[i][0] += alpha * gx;
                coords[i][1] += alpha * gy;
                coords[j][0] -= alpha * gx;
                coords[j][1] -= alpha * gy;
            }
            next_sample[e] += epochs_per_sample[e];

            // Repulsion from uniformly sampled entities
            let n_neg =
                ((epoch_f - next_negative[e]) / epochs_per_negative[e]).max(0.0) as usize;
            for _ in 0..n_neg {
                let l = rng.random_range(0..n);
                if l == i {
                    continue;
                }
                let dx = coords[i][0] - coords[l][0];
                let dy = coords[i][1] - coords[l][1];
                let d2 = dx * dx + dy * dy;
                if d2 > 0.0 {
                    let coeff = 2.0 * b / ((0.001 + d2) * (a * d2.powf(b) + 1.0));
                    coords[i][0] += alpha * (coeff * dx).clamp(-GRAD_CLIP, GRAD_CLIP);
                    coords[i][1] += alpha * (coeff * dy).clamp(-GRAD_CLIP, GRAD_CLIP);
                } else {
                    coords[i][0] += alpha * GRAD_CLIP;
                    coords[i][1] += alpha * GRAD_CLIP;
                }
            }
            next_negative[e] += n_neg as f64 * epochs_per_negative[e];
        }
    }

    coords
}
