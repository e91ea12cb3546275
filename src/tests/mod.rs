mod test_neighbors;
mod test_similarity;

use smartcore::linalg::basic::matrix::DenseMatrix;

use crate::entity::{Entity, EntityKind, EntityRecord};
use crate::neighbors::NeighborParams;
use crate::reduction::EmbeddingParams;
use crate::scores::signed_significance;
use crate::similarity::SimilarityMatrix;

/// Initialize test logging; repeated calls are harmless.
pub fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub const NEIGHBOR_PARAMS: NeighborParams = NeighborParams { k: 3, min_similarity: 0.1 };

pub const EMBED_PARAMS: EmbeddingParams =
    EmbeddingParams { n_neighbors: 5, min_dist: 0.1, seed: 42 };

/// Entity fixture with fixed statistics; similarity tests only care about
/// kind and gene set.
pub fn entity(id: &str, kind: EntityKind, genes: &[&str]) -> Entity {
    Entity {
        id: id.to_string(),
        name: id.to_string(),
        display_name: id.to_string(),
        database: String::new(),
        contrast: None,
        kind,
        gene_set: genes.iter().map(|g| g.to_string()).collect(),
        set_size: genes.len(),
        nes: 1.0,
        padj: 0.01,
        pvalue: 0.001,
        signed_sig: signed_significance(1.0, 0.01),
    }
}

/// Record fixture for pipeline tests.
pub fn record(
    id: &str,
    kind: EntityKind,
    nes: f64,
    padj: f64,
    genes: &[&str],
) -> EntityRecord {
    EntityRecord::new(id, kind, nes, padj).with_genes(genes.iter().copied())
}

/// Wrap explicit rows into a similarity matrix; rows must be square.
pub fn sim_from_rows(rows: Vec<Vec<f64>>) -> SimilarityMatrix {
    let n = rows.len();
    SimilarityMatrix {
        matrix: DenseMatrix::from_2d_vec(&rows).unwrap(),
        nentities: n,
    }
}
