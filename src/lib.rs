//! # enrichmap
//!
//! Pairwise similarity, sparse neighbor maps and 2D layouts for
//! heterogeneous enrichment results (gene-set pathways, TF regulons,
//! signaling activities, transposable elements) sharing one gene vocabulary.
//!
//! The pipeline is deterministic end to end: sorted vocabularies, stable
//! sorts, seeded RNG streams. Reduction backends degrade gracefully through
//! a fixed fallback chain instead of failing the run.
//!
//! ```
//! use enrichmap::{EnrichmentMapBuilder, EntityKind, EntityRecord};
//!
//! let records = vec![
//!     EntityRecord::new("hallmark_tnfa", EntityKind::Pathway, 2.1, 1e-8)
//!         .with_genes(["TNF", "IL6", "CXCL8"]),
//!     EntityRecord::new("hallmark_il6", EntityKind::Pathway, -1.4, 1e-3)
//!         .with_genes(["IL6", "CXCL8", "STAT3"]),
//!     EntityRecord::new("nfkb1", EntityKind::Tf, 3.0, 1e-12)
//!         .with_genes(["TNF", "IL6"]),
//! ];
//!
//! let map = EnrichmentMapBuilder::new().build(records).unwrap();
//! assert_eq!(map.nodes.len(), 3);
//! assert!(map.nodes.iter().all(|n| (0.0..=1.0).contains(&n.x)));
//! ```

pub mod entity;
pub mod error;
#[cfg(feature = "manifold")]
pub mod manifold;
pub mod neighbors;
pub mod pipeline;
pub mod reduction;
pub mod scores;
pub mod similarity;
#[cfg(feature = "tsne")]
pub mod tsne;

pub use entity::{clean_display_name, Entity, EntityKind, EntityRecord, TeLevel};
pub use error::{EnrichmapError, Result};
pub use neighbors::{extract_neighbors, NeighborMap, NeighborParams};
pub use pipeline::{EnrichmentMap, EnrichmentMapBuilder, MapNode, MapSummary};
pub use reduction::{
    available_methods, best_method, compute_embedding, Embedding, EmbeddingParams,
    ReductionMethod,
};
pub use scores::{restandardize, signed_significance, standardize};
pub use similarity::{compute_similarity, SimilarityMatrix};

#[cfg(test)]
mod tests;
