//! Test suite for the hybrid similarity engine.
//!
//! Tests cover:
//! - Metric dispatch (Jaccard same-kind, overlap for cross-kind TF pairs)
//! - Structural invariants (symmetry, unit diagonal, [0, 1] range)
//! - Empty gene sets and empty vocabulary
//! - Determinism and the distance-matrix conversion

use approx::assert_relative_eq;

use crate::entity::EntityKind;
use crate::similarity::compute_similarity;
use crate::tests::entity;

// -------------------- Metric dispatch --------------------

#[test]
fn test_same_kind_pair_uses_jaccard() {
    let entities = vec![
        entity("a", EntityKind::Pathway, &["g1", "g2", "g3"]),
        entity("b", EntityKind::Pathway, &["g2", "g3", "g4"]),
    ];
    let sim = compute_similarity(&entities);
    // |{g2,g3}| / |{g1,g2,g3,g4}| = 2/4
    assert_relative_eq!(sim.get(0, 1), 0.5, epsilon = 1e-12);
    assert_relative_eq!(sim.get(1, 0), 0.5, epsilon = 1e-12);
}

#[test]
fn test_cross_kind_tf_pair_uses_overlap() {
    let entities = vec![
        entity("reg", EntityKind::Tf, &["g1", "g2"]),
        entity("pw", EntityKind::Pathway, &["g1", "g2", "g3", "g4", "g5"]),
    ];
    let sim = compute_similarity(&entities);
    // |{g1,g2}| / min(2, 5) = 1: the small regulon is fully contained
    assert_relative_eq!(sim.get(0, 1), 1.0, epsilon = 1e-12);
    // Jaccard would have given 2/5
    assert!(sim.get(0, 1) > 0.4 + 1e-9);
}

#[test]
fn test_tf_tf_pair_stays_jaccard() {
    let entities = vec![
        entity("t1", EntityKind::Tf, &["g1", "g2"]),
        entity("t2", EntityKind::Tf, &["g2", "g3"]),
    ];
    let sim = compute_similarity(&entities);
    // Same kind on both sides: 1/3, not the overlap value 1/2
    assert_relative_eq!(sim.get(0, 1), 1.0 / 3.0, epsilon = 1e-12);
}

#[test]
fn test_cross_kind_without_tf_stays_jaccard() {
    let entities = vec![
        entity("pw", EntityKind::Pathway, &["g1", "g2", "g3"]),
        entity("sig", EntityKind::Signaling, &["g2", "g3", "g4"]),
    ];
    let sim = compute_similarity(&entities);
    // 2/4, not the overlap value 2/3
    assert_relative_eq!(sim.get(0, 1), 0.5, epsilon = 1e-12);
}

#[test]
fn test_identical_sets_same_kind_score_one() {
    let entities = vec![
        entity("a", EntityKind::Signaling, &["g1", "g2", "g3"]),
        entity("b", EntityKind::Signaling, &["g1", "g2", "g3"]),
    ];
    let sim = compute_similarity(&entities);
    assert_relative_eq!(sim.get(0, 1), 1.0, epsilon = 1e-12);
}

#[test]
fn test_disjoint_sets_score_zero() {
    let entities = vec![
        entity("a", EntityKind::Pathway, &["g1", "g2"]),
        entity("b", EntityKind::Pathway, &["g3", "g4"]),
        entity("c", EntityKind::Tf, &["g5"]),
    ];
    let sim = compute_similarity(&entities);
    assert_eq!(sim.get(0, 1), 0.0);
    assert_eq!(sim.get(0, 2), 0.0);
    assert_eq!(sim.get(1, 2), 0.0);
}

// -------------------- Structural invariants --------------------

fn mixed_fixture() -> Vec<crate::entity::Entity> {
    vec![
        entity("p1", EntityKind::Pathway, &["g1", "g2", "g3", "g4"]),
        entity("p2", EntityKind::Pathway, &["g3", "g4", "g5"]),
        entity("t1", EntityKind::Tf, &["g1", "g5"]),
        entity("s1", EntityKind::Signaling, &["g2", "g3"]),
        entity("te1", EntityKind::TransposableElement, &["g4", "g6"]),
    ]
}

#[test]
fn test_matrix_is_symmetric_with_unit_diagonal() {
    let sim = compute_similarity(&mixed_fixture());
    assert_eq!(sim.shape(), (5, 5));
    assert!(sim.is_symmetric(1e-12));
    for i in 0..5 {
        assert_eq!(sim.get(i, i), 1.0);
    }
}

#[test]
fn test_values_stay_in_unit_interval() {
    let sim = compute_similarity(&mixed_fixture());
    for i in 0..5 {
        for j in 0..5 {
            let v = sim.get(i, j);
            assert!((0.0..=1.0).contains(&v), "sim({}, {}) = {} out of range", i, j, v);
        }
    }
}

#[test]
fn test_compute_similarity_is_deterministic() {
    let entities = mixed_fixture();
    let first = compute_similarity(&entities);
    let second = compute_similarity(&entities);
    for i in 0..5 {
        for j in 0..5 {
            assert_eq!(first.get(i, j), second.get(i, j));
        }
    }
}

// -------------------- Empty gene sets --------------------

#[test]
fn test_empty_gene_set_is_isolated() {
    let entities = vec![
        entity("a", EntityKind::Pathway, &["g1", "g2"]),
        entity("empty", EntityKind::Pathway, &[]),
        entity("c", EntityKind::Tf, &["g1"]),
    ];
    let sim = compute_similarity(&entities);
    assert_eq!(sim.get(1, 0), 0.0);
    assert_eq!(sim.get(1, 2), 0.0);
    assert_eq!(sim.get(1, 1), 1.0);
}

#[test]
fn test_all_empty_vocabulary_reduces_to_identity() {
    let entities = vec![
        entity("a", EntityKind::Pathway, &[]),
        entity("b", EntityKind::Tf, &[]),
        entity("c", EntityKind::Signaling, &[]),
    ];
    let sim = compute_similarity(&entities);
    for i in 0..3 {
        for j in 0..3 {
            let expected = if i == j { 1.0 } else { 0.0 };
            assert_eq!(sim.get(i, j), expected);
        }
    }
}

#[test]
fn test_single_entity_matrix() {
    let sim = compute_similarity(&[entity("solo", EntityKind::Pathway, &["g1"])]);
    assert_eq!(sim.shape(), (1, 1));
    assert_eq!(sim.get(0, 0), 1.0);
}

// -------------------- Derived views --------------------

#[test]
fn test_to_distance_flips_scale_and_zeroes_diagonal() {
    let sim = compute_similarity(&mixed_fixture());
    let dist = sim.to_distance();
    use smartcore::linalg::basic::arrays::Array;
    for i in 0..5 {
        assert_eq!(*dist.get((i, i)), 0.0);
        for j in 0..5 {
            if i != j {
                assert_relative_eq!(
                    *dist.get((i, j)),
                    1.0 - sim.get(i, j),
                    epsilon = 1e-12
                );
            }
        }
    }
}

#[test]
fn test_offdiagonal_stats_and_edge_density() {
    let entities = vec![
        entity("a", EntityKind::Pathway, &["g1", "g2"]),
        entity("b", EntityKind::Pathway, &["g1", "g2"]),
    ];
    let sim = compute_similarity(&entities);
    let (mean, max) = sim.offdiagonal_stats();
    assert_relative_eq!(mean, 1.0, epsilon = 1e-12);
    assert_relative_eq!(max, 1.0, epsilon = 1e-12);
    assert_eq!(sim.edge_density(0.5), 1.0);
    assert_eq!(sim.edge_density(1.5), 0.0);
}
