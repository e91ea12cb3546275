//! Test suite for top-k neighbor extraction.
//!
//! Tests cover:
//! - Ordering, k cap and similarity floor
//! - Structural self-exclusion
//! - Deterministic tie-breaking by original index
//! - Asymmetry of the relation and absence vs empty list

use approx::assert_relative_eq;

use crate::neighbors::{extract_neighbors, NeighborParams};
use crate::tests::{sim_from_rows, NEIGHBOR_PARAMS};

fn ids(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

// -------------------- Ordering and caps --------------------

#[test]
fn test_neighbors_ordered_by_similarity_descending() {
    let sim = sim_from_rows(vec![
        vec![1.0, 0.9, 0.5, 0.8],
        vec![0.9, 1.0, 0.3, 0.2],
        vec![0.5, 0.3, 1.0, 0.4],
        vec![0.8, 0.2, 0.4, 1.0],
    ]);
    let map = extract_neighbors(&sim, &ids(&["a", "b", "c", "d"]), &NEIGHBOR_PARAMS);

    let a = &map["a"];
    assert_eq!(a.len(), 3);
    assert_eq!(a[0].0, "b");
    assert_relative_eq!(a[0].1, 0.9, epsilon = 1e-12);
    assert_eq!(a[1].0, "d");
    assert_eq!(a[2].0, "c");
}

#[test]
fn test_k_caps_the_qualifying_list() {
    let sim = sim_from_rows(vec![
        vec![1.0, 0.9, 0.8, 0.7, 0.6],
        vec![0.9, 1.0, 0.1, 0.1, 0.1],
        vec![0.8, 0.1, 1.0, 0.1, 0.1],
        vec![0.7, 0.1, 0.1, 1.0, 0.1],
        vec![0.6, 0.1, 0.1, 0.1, 1.0],
    ]);
    let params = NeighborParams { k: 2, min_similarity: 0.1 };
    let map = extract_neighbors(&sim, &ids(&["a", "b", "c", "d", "e"]), &params);

    // Four candidates qualify but only the best two survive the cap
    let a = &map["a"];
    assert_eq!(a.len(), 2);
    assert_eq!(a[0].0, "b");
    assert_eq!(a[1].0, "c");
}

#[test]
fn test_similarity_floor_drops_weak_candidates() {
    let sim = sim_from_rows(vec![
        vec![1.0, 0.5, 0.05],
        vec![0.5, 1.0, 0.02],
        vec![0.05, 0.02, 1.0],
    ]);
    let map = extract_neighbors(&sim, &ids(&["a", "b", "c"]), &NEIGHBOR_PARAMS);

    assert_eq!(map["a"].len(), 1);
    assert_eq!(map["a"][0].0, "b");
    assert_eq!(map["b"].len(), 1);
    // c has no candidate at or above the floor: absent, not empty
    assert!(!map.contains_key("c"));
    // and, being below everyone's floor, c is never listed either
    assert!(map.values().all(|list| list.iter().all(|(id, _)| id != "c")));
}

#[test]
fn test_k_zero_yields_empty_map() {
    let sim = sim_from_rows(vec![vec![1.0, 0.9], vec![0.9, 1.0]]);
    let params = NeighborParams { k: 0, min_similarity: 0.1 };
    let map = extract_neighbors(&sim, &ids(&["a", "b"]), &params);
    assert!(map.is_empty());
}

// -------------------- Self-exclusion --------------------

#[test]
fn test_entity_never_neighbors_itself() {
    // Unit diagonal always dominates; exclusion must be structural
    let sim = sim_from_rows(vec![
        vec![1.0, 0.2, 0.3],
        vec![0.2, 1.0, 0.4],
        vec![0.3, 0.4, 1.0],
    ]);
    let names = ids(&["a", "b", "c"]);
    let map = extract_neighbors(&sim, &names, &NEIGHBOR_PARAMS);

    for name in &names {
        if let Some(neighbors) = map.get(name) {
            assert!(
                neighbors.iter().all(|(other, _)| other != name),
                "{} lists itself",
                name
            );
        }
    }
}

// -------------------- Tie-breaking --------------------

#[test]
fn test_exact_ties_keep_original_index_order() {
    let sim = sim_from_rows(vec![
        vec![1.0, 0.5, 0.5, 0.2],
        vec![0.5, 1.0, 0.1, 0.1],
        vec![0.5, 0.1, 1.0, 0.1],
        vec![0.2, 0.1, 0.1, 1.0],
    ]);
    let names = ids(&["a", "b", "c", "d"]);

    let params = NeighborParams { k: 1, min_similarity: 0.1 };
    let map = extract_neighbors(&sim, &names, &params);
    // b and c tie at 0.5; the lower original index wins the single slot
    assert_eq!(map["a"][0].0, "b");

    let params = NeighborParams { k: 2, min_similarity: 0.1 };
    let map = extract_neighbors(&sim, &names, &params);
    assert_eq!(map["a"][0].0, "b");
    assert_eq!(map["a"][1].0, "c");
}

// -------------------- Asymmetry --------------------

#[test]
fn test_relation_is_asymmetric() {
    let sim = sim_from_rows(vec![
        vec![1.0, 0.9, 0.2],
        vec![0.9, 1.0, 0.95],
        vec![0.2, 0.95, 1.0],
    ]);
    let params = NeighborParams { k: 1, min_similarity: 0.1 };
    let map = extract_neighbors(&sim, &ids(&["a", "b", "c"]), &params);

    // a's best neighbor is b, but b's single slot goes to c
    assert_eq!(map["a"][0].0, "b");
    assert_eq!(map["b"][0].0, "c");
    assert!(map["b"].iter().all(|(other, _)| other != "a"));
}

// -------------------- Input validation --------------------

#[test]
#[should_panic(expected = "id count")]
fn test_id_count_mismatch_panics() {
    let sim = sim_from_rows(vec![vec![1.0, 0.5], vec![0.5, 1.0]]);
    extract_neighbors(&sim, &ids(&["only_one"]), &NEIGHBOR_PARAMS);
}
