//! # t-distributed neighbor embedding on a precomputed distance matrix
//!
//! Caller-selectable alternative to the manifold backend; the auto-fallback
//! chain never picks it. Useful when local cluster separation matters more
//! than global layout stability.
//!
//! ## Algorithm Overview
//!
//! 1. **Affinity calibration**: per-row Gaussian precision found by binary
//!    search so the row entropy matches `ln(perplexity)`, with perplexity
//!    clamped to `min(30, N-1)` so small maps stay valid
//! 2. **Symmetrization**: `P = (P + Pᵀ) / 2N`, floored to keep the KL
//!    gradient defined
//! 3. **Gradient descent**: Student-t low-dimensional kernel, early
//!    exaggeration, momentum with per-component gain adaptation, recentered
//!    every step
//!
//! Seeded initialization and a single-threaded loop make the result a pure
//! function of (distances, perplexity, seed).

use log::{debug, info};

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, StandardNormal};

use smartcore::linalg::basic::arrays::Array;
use smartcore::linalg::basic::matrix::DenseMatrix;

use crate::error::{EnrichmapError, Result};
use crate::reduction::{EmbeddingParams, ReductionBackend, ReductionMethod};
use crate::similarity::SimilarityMatrix;

/// Upper bound on perplexity; the effective value is `min(30, N-1)`.
pub const MAX_PERPLEXITY: f64 = 30.0;

/// Gradient-descent iterations.
const N_ITER: usize = 500;

/// Early exaggeration factor and the iteration it is removed at.
const EXAGGERATION: f64 = 4.0;
const EXAGGERATION_END: usize = 100;

/// Learning rate and momentum schedule.
const ETA: f64 = 200.0;
const MOMENTUM_SWITCH: usize = 20;

/// Floor applied to all probabilities.
const P_FLOOR: f64 = 1e-12;

pub struct TsneBackend;

impl ReductionBackend for TsneBackend {
    fn method(&self) -> ReductionMethod {
        ReductionMethod::Tsne
    }

    fn attempt(
        &self,
        similarity: &SimilarityMatrix,
        distance: &DenseMatrix<f64>,
        params: &EmbeddingParams,
    ) -> Result<Vec<[f64; 2]>> {
        let n = similarity.nentities;
        if n < 2 {
            return Err(EnrichmapError::Reduction {
                backend: "tsne",
                reason: format!("need at least 2 entities, got {}", n),
            });
        }

        let perplexity = MAX_PERPLEXITY.min((n - 1) as f64).max(1.0);
        info!(
            "t-SNE embedding: {} entities, perplexity={:.0}, seed={}",
            n, perplexity, params.seed
        );

        let p = joint_probabilities(distance, n, perplexity);
        let coords = gradient_descent(n, &p, params.seed);
        Ok(coords)
    }
}

/// Symmetric joint probabilities from the distance matrix.
///
/// Each row's Gaussian precision `beta` is binary-searched (50 steps) until
/// the conditional distribution's entropy hits `ln(perplexity)`. Distances
/// are used as handed in; the similarity-derived matrix is already on the
/// scale the kernel expects.
fn joint_probabilities(distance: &DenseMatrix<f64>, n: usize, perplexity: f64) -> Vec<f64> {
    let target_entropy = perplexity.ln();
    let mut conditional = vec![0.0f64; n * n];

    for i in 0..n {
        let mut beta = 1.0f64;
        let mut beta_min = f64::NEG_INFINITY;
        let mut beta_max = f64::INFINITY;

        for _ in 0..50 {
            // Row distribution and entropy at the current precision
            let mut sum_p = 0.0;
            let mut sum_dp = 0.0;
            for j in 0..n {
                if j == i {
                    continue;
                }
                let d = *distance.get((i, j));
                let p = (-d * beta).exp();
                sum_p += p;
                sum_dp += d * p;
            }
            let sum_p = sum_p.max(P_FLOOR);
            let entropy = sum_p.ln() + beta * sum_dp / sum_p;

            let diff = entropy - target_entropy;
            if diff.abs() < 1e-5 {
                break;
            }
            if diff > 0.0 {
                beta_min = beta;
                beta = if beta_max.is_infinite() { beta * 2.0 } else { (beta + beta_max) / 2.0 };
            } else {
                beta_max = beta;
                beta = if beta_min.is_infinite() { beta / 2.0 } else { (beta + beta_min) / 2.0 };
            }
        }

        let mut sum_p = 0.0;
        for j in 0..n {
            if j == i {
                continue;
            }
            let p = (-*distance.get((i, j)) * beta).exp();
            conditional[i * n + j] = p;
            sum_p += p;
        }
        let sum_p = sum_p.max(P_FLOOR);
        for j in 0..n {
            conditional[i * n + j] /= sum_p;
        }
    }

    // Symmetrize and normalize over all pairs
    let mut joint = vec![0.0f64; n * n];
    for i in 0..n {
        for j in 0..n {
            joint[i * n + j] =
                ((conditional[i * n + j] + conditional[j * n + i]) / (2.0 * n as f64))
                    .max(P_FLOOR);
        }
    }
    for i in 0..n {
        joint[i * n + i] = P_FLOOR;
    }

    debug!("Affinity calibration complete for {} rows", n);
    joint
}

/// Momentum gradient descent on the KL divergence with a Student-t output
/// kernel and per-component gain adaptation.
fn gradient_descent(n: usize, p: &[f64], seed: u64) -> Vec<[f64; 2]> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut coords: Vec<[f64; 2]> = (0..n)
        .map(|_| {
            let x: f64 = StandardNormal.sample(&mut rng);
            let y: f64 = StandardNormal.sample(&mut rng);
            [x * 1e-4, y * 1e-4]
        })
        .collect();

    let mut increments = vec![[0.0f64; 2]; n];
    let mut gains = vec![[1.0f64; 2]; n];
    let mut kernel = vec![0.0f64; n * n];

    // Early exaggeration sharpens cluster formation before relaxation
    let mut p_run: Vec<f64> = p.iter().map(|&v| v * EXAGGERATION).collect();

    for iter in 0..N_ITER {
        // Student-t kernel and its normalizer
        let mut kernel_sum = 0.0;
        for i in 0..n {
            for j in 0..n {
                if i == j {
                    kernel[i * n + j] = 0.0;
                    continue;
                }
                let dx = coords[i][0] - coords[j][0];
                let dy = coords[i][1] - coords[j][1];
                let k = 1.0 / (1.0 + dx * dx + dy * dy);
                kernel[i * n + j] = k;
                kernel_sum += k;
            }
        }
        let kernel_sum = kernel_sum.max(P_FLOOR);

        let momentum = if iter < MOMENTUM_SWITCH { 0.5 } else { 0.8 };

        for i in 0..n {
            let mut grad = [0.0f64; 2];
            for j in 0..n {
                if i == j {
                    continue;
                }
                let k = kernel[i * n + j];
                let q = (k / kernel_sum).max(P_FLOOR);
                let mult = 4.0 * (p_run[i * n + j] - q) * k;
                grad[0] += mult * (coords[i][0] - coords[j][0]);
                grad[1] += mult * (coords[i][1] - coords[j][1]);
            }

            for d in 0..2 {
                let same_sign = (grad[d] > 0.0) == (increments[i][d] > 0.0);
                gains[i][d] = if same_sign {
                    (gains[i][d] * 0.8).max(0.01)
                } else {
                    gains[i][d] + 0.2
                };
                increments[i][d] =
                    momentum * increments[i][d] - ETA * gains[i][d] * grad[d];
            }
        }

        let mut mean = [0.0f64; 2];
        for i in 0..n {
            coords[i][0] += increments[i][0];
            coords[i][1] += increments[i][1];
            mean[0] += coords[i][0];
            mean[1] += coords[i][1];
        }
        mean[0] /= n as f64;
        mean[1] /= n as f64;
        for point in coords.iter_mut() {
            point[0] -= mean[0];
            point[1] -= mean[1];
        }

        if iter == EXAGGERATION_END {
            for (running, &original) in p_run.iter_mut().zip(p.iter()) {
                *running = original;
            }
        }
    }

    coords
}
