//! # 2D embedding of entities from their similarity structure
//!
//! ## Backend chain
//!
//! Reduction backends form a single prioritized chain, each exposing the same
//! `attempt` surface:
//!
//! 1. **Manifold** (feature `manifold`) — nonlinear neighborhood-graph
//!    embedding on the precomputed distance matrix; preferred when compiled in
//! 2. **Pca** — linear projection of the similarity matrix onto its top two
//!    principal components (always available; smartcore is a required
//!    dependency)
//! 3. **Random** — seeded Gaussian coordinates; the terminal backend that
//!    cannot fail
//!
//! **Tsne** (feature `tsne`) is caller-selectable only and never auto-chosen
//! by the chain.
//!
//! A backend that is not compiled in, or that returns an error on this input,
//! is logged and skipped; `compute_embedding` itself never fails. Missing
//! numerical capability degrades the layout, it does not abort the run.
//!
//! ## Coordinate contract
//!
//! Whatever backend wins, each axis is independently rescaled to [0, 1] with
//! `(v - min) / max(max - min, 1e-10)`: exact endpoints on any axis with two
//! distinct values, an ε-guarded collapse to 0 on degenerate ones.

use std::fmt;

use log::{debug, info, warn};

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, StandardNormal};

use serde::{Deserialize, Serialize};

use smartcore::decomposition::pca::{PCAParameters, PCA};
use smartcore::linalg::basic::arrays::Array;
use smartcore::linalg::basic::matrix::DenseMatrix;

use crate::error::{EnrichmapError, Result};
use crate::similarity::SimilarityMatrix;

/// Floor on the per-axis span during rescaling.
pub const RESCALE_FLOOR: f64 = 1e-10;

/// Auto-fallback order; t-SNE is deliberately absent.
const FALLBACK_CHAIN: [ReductionMethod; 3] =
    [ReductionMethod::Manifold, ReductionMethod::Pca, ReductionMethod::Random];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReductionMethod {
    Manifold,
    Tsne,
    Pca,
    Random,
}

impl ReductionMethod {
    /// Whether the backend for this method was compiled into the crate.
    pub fn is_available(&self) -> bool {
        match self {
            ReductionMethod::Manifold => cfg!(feature = "manifold"),
            ReductionMethod::Tsne => cfg!(feature = "tsne"),
            ReductionMethod::Pca | ReductionMethod::Random => true,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReductionMethod::Manifold => "manifold",
            ReductionMethod::Tsne => "tsne",
            ReductionMethod::Pca => "pca",
            ReductionMethod::Random => "random",
        }
    }
}

impl fmt::Display for ReductionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Parameters shared by the stochastic backends.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EmbeddingParams {
    /// Neighborhood size for the manifold backend.
    pub n_neighbors: usize,
    /// Minimum separation of embedded points in the manifold layout.
    pub min_dist: f64,
    /// Seed for every stochastic path; fixed by default so layouts are
    /// reproducible across runs.
    pub seed: u64,
}

impl Default for EmbeddingParams {
    fn default() -> Self {
        Self {
            n_neighbors: 15,
            min_dist: 0.1,
            seed: 42,
        }
    }
}

// Approximate equality for the float field, exact for the rest
impl PartialEq for EmbeddingParams {
    fn eq(&self, other: &Self) -> bool {
        self.n_neighbors == other.n_neighbors
            && approx::relative_eq!(self.min_dist, other.min_dist)
            && self.seed == other.seed
    }
}

impl Eq for EmbeddingParams {}

/// 2D coordinates in the unit square, tagged with the producing backend.
#[derive(Clone, Debug, Serialize)]
pub struct Embedding {
    pub coords: Vec<[f64; 2]>,
    pub method: ReductionMethod,
}

/// Uniform surface every reduction backend implements. `attempt` returns raw
/// (unscaled) coordinates or an error the chain will absorb.
pub trait ReductionBackend: Send + Sync {
    fn method(&self) -> ReductionMethod;

    fn attempt(
        &self,
        similarity: &SimilarityMatrix,
        distance: &DenseMatrix<f64>,
        params: &EmbeddingParams,
    ) -> Result<Vec<[f64; 2]>>;
}

/// Construct the backend for a method, or `None` when it is feature-gated
/// out. The single place in the crate where availability is probed.
fn backend_for(method: ReductionMethod) -> Option<Box<dyn ReductionBackend>> {
    match method {
        #[cfg(feature = "manifold")]
        ReductionMethod::Manifold => Some(Box::new(crate::manifold::ManifoldBackend)),
        #[cfg(not(feature = "manifold"))]
        ReductionMethod::Manifold => None,
        #[cfg(feature = "tsne")]
        ReductionMethod::Tsne => Some(Box::new(crate::tsne::TsneBackend)),
        #[cfg(not(feature = "tsne"))]
        ReductionMethod::Tsne => None,
        ReductionMethod::Pca => Some(Box::new(PcaBackend)),
        ReductionMethod::Random => Some(Box::new(RandomBackend)),
    }
}

/// The ordered backend list one embedding call will try: the explicit
/// preference (if any) first, then the fallback chain, deduplicated, with
/// unavailable backends skipped under a diagnostic.
pub fn backend_chain(preference: Option<ReductionMethod>) -> Vec<Box<dyn ReductionBackend>> {
    let mut order: Vec<ReductionMethod> = Vec::with_capacity(4);
    if let Some(p) = preference {
        order.push(p);
    }
    for method in FALLBACK_CHAIN {
        if !order.contains(&method) {
            order.push(method);
        }
    }

    let mut chain = Vec::with_capacity(order.len());
    for method in order {
        match backend_for(method) {
            Some(backend) => chain.push(backend),
            None => warn!("Reduction backend `{}` not compiled in; skipping", method),
        }
    }
    chain
}

/// The backend the chain would pick with no explicit preference.
pub fn best_method() -> ReductionMethod {
    FALLBACK_CHAIN
        .iter()
        .copied()
        .find(|m| m.is_available())
        .unwrap_or(ReductionMethod::Random)
}

/// Methods whose backends are compiled into this build.
pub fn available_methods() -> Vec<ReductionMethod> {
    [
        ReductionMethod::Manifold,
        ReductionMethod::Tsne,
        ReductionMethod::Pca,
        ReductionMethod::Random,
    ]
    .into_iter()
    .filter(|m| m.is_available())
    .collect()
}

/// Embed all entities into the unit square.
///
/// Infallible: backend failure is logged and absorbed by falling down the
/// chain, which terminates at the seeded random backend.
pub fn compute_embedding(
    similarity: &SimilarityMatrix,
    params: &EmbeddingParams,
    preference: Option<ReductionMethod>,
) -> Embedding {
    let n = similarity.nentities;
    info!(
        "Computing 2D embedding for {} entities (preference: {})",
        n,
        preference.map_or("auto", |m| m.as_str())
    );

    // Distance form is shared by every backend that wants it
    let distance = similarity.to_distance();

    for backend in backend_chain(preference) {
        let method = backend.method();
        match backend.attempt(similarity, &distance, params) {
            Ok(raw) => {
                let coords = rescale_to_unit(raw);
                info!("Embedding computed with `{}` backend", method);
                return Embedding { coords, method };
            }
            Err(err) => {
                warn!("Reduction backend `{}` failed ({}); falling back", method, err);
            }
        }
    }

    unreachable!("reduction chain must terminate at the random backend")
}

/// Rescale each axis independently onto [0, 1].
pub fn rescale_to_unit(mut coords: Vec<[f64; 2]>) -> Vec<[f64; 2]> {
    for axis in 0..2 {
        let (min, max) = coords
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(min, max), c| {
                (min.min(c[axis]), max.max(c[axis]))
            });
        let span = (max - min).max(RESCALE_FLOOR);
        for point in coords.iter_mut() {
            point[axis] = (point[axis] - min) / span;
        }
    }
    coords
}

/// Linear projection onto the top two principal components of the
/// similarity matrix.
pub struct PcaBackend;

impl ReductionBackend for PcaBackend {
    fn method(&self) -> ReductionMethod {
        ReductionMethod::Pca
    }

    fn attempt(
        &self,
        similarity: &SimilarityMatrix,
        _distance: &DenseMatrix<f64>,
        _params: &EmbeddingParams,
    ) -> Result<Vec<[f64; 2]>> {
        let n = similarity.nentities;
        if n < 2 {
            return Err(EnrichmapError::Reduction {
                backend: "pca",
                reason: format!("need at least 2 entities, got {}", n),
            });
        }

        debug!("Fitting PCA on {}×{} similarity matrix", n, n);
        let pca = PCA::fit(
            &similarity.matrix,
            PCAParameters::default().with_n_components(2),
        )
        .map_err(|e| EnrichmapError::Reduction { backend: "pca", reason: e.to_string() })?;
        let projected = pca
            .transform(&similarity.matrix)
            .map_err(|e| EnrichmapError::Reduction { backend: "pca", reason: e.to_string() })?;

        Ok((0..n)
            .map(|i| [*projected.get((i, 0)), *projected.get((i, 1))])
            .collect())
    }
}

/// Terminal backend: seeded Gaussian coordinates. Keeps the pipeline alive
/// when every numerical backend is unavailable or failing; carries no
/// structure beyond determinism.
pub struct RandomBackend;

impl ReductionBackend for RandomBackend {
    fn method(&self) -> ReductionMethod {
        ReductionMethod::Random
    }

    fn attempt(
        &self,
        similarity: &SimilarityMatrix,
        _distance: &DenseMatrix<f64>,
        params: &EmbeddingParams,
    ) -> Result<Vec<[f64; 2]>> {
        let n = similarity.nentities;
        debug!("Generating seeded Gaussian coordinates for {} entities", n);

        let mut rng = ChaCha8Rng::seed_from_u64(params.seed);
        Ok((0..n)
            .map(|_| {
                let x: f64 = StandardNormal.sample(&mut rng);
                let y: f64 = StandardNormal.sample(&mut rng);
                [x, y]
            })
            .collect())
    }
}
