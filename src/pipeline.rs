//! End-to-end map construction: filters, numerical stages, merged output.
//!
//! One builder invocation is one run over a fixed snapshot of records:
//! standardize → filter → similarity → neighbors → embedding → merge.
//! Runs share nothing; the batch form fans contrasts out as independent
//! parallel tasks, each owning its own record subset.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use rayon::prelude::*;

use log::{debug, info, warn};

use serde::Serialize;

use crate::entity::{Entity, EntityKind, EntityRecord, TeLevel};
use crate::error::{EnrichmapError, Result};
use crate::neighbors::{extract_neighbors, NeighborParams};
use crate::reduction::{compute_embedding, EmbeddingParams, ReductionMethod};
use crate::scores;
use crate::similarity::compute_similarity;

/// Gene identifiers carried per node as a sorted preview; the full count
/// travels separately in `gene_count`.
pub const GENE_PREVIEW_MAX: usize = 20;

/// One placed entity: its original fields plus coordinates, neighbors and
/// the standardized score.
#[derive(Clone, Debug, Serialize)]
pub struct MapNode {
    pub id: String,
    pub name: String,
    pub display_name: String,
    pub database: String,
    pub kind: EntityKind,
    pub nes: f64,
    pub padj: f64,
    pub pvalue: f64,
    pub signed_sig: f64,
    pub set_size: usize,
    pub leading_edge_size: usize,
    pub gene_count: usize,
    /// Sorted gene preview, capped at [`GENE_PREVIEW_MAX`].
    pub genes: Vec<String>,
    pub x: f64,
    pub y: f64,
    /// Flattened view of the neighbor map: entities absent from it carry an
    /// empty list here.
    pub neighbors: Vec<(String, f64)>,
}

/// Run-level metadata for renderers and logs.
#[derive(Clone, Debug, Serialize)]
pub struct MapSummary {
    pub n_entities: usize,
    pub kind_counts: BTreeMap<EntityKind, usize>,
    pub databases: BTreeSet<String>,
    pub method: ReductionMethod,
    pub contrast: Option<String>,
    pub te_level: TeLevel,
}

impl fmt::Display for MapSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} entities across {} databases, method `{}`",
            self.n_entities,
            self.databases.len(),
            self.method
        )?;
        if let Some(contrast) = &self.contrast {
            write!(f, ", contrast `{}`", contrast)?;
        }
        Ok(())
    }
}

/// Complete output of one run.
#[derive(Clone, Debug, Serialize)]
pub struct EnrichmentMap {
    pub nodes: Vec<MapNode>,
    pub summary: MapSummary,
}

#[derive(Clone, Debug)]
pub struct EnrichmentMapBuilder {
    // Filtering
    fdr_threshold: f64,
    max_entities: Option<usize>,
    contrast: Option<String>,
    kinds: Option<Vec<EntityKind>>,
    te_level: TeLevel,

    // Numerical stages
    neighbor_params: NeighborParams,
    embedding_params: EmbeddingParams,
    method: Option<ReductionMethod>,
}

impl Default for EnrichmentMapBuilder {
    fn default() -> Self {
        debug!("Creating EnrichmentMapBuilder with default parameters");
        Self {
            fdr_threshold: 1.0,  // keep everything; tighten for sparse maps
            max_entities: None,  // no cap
            contrast: None,      // all contrasts together
            kinds: None,         // all entity kinds
            te_level: TeLevel::default(),

            neighbor_params: NeighborParams::default(),
            embedding_params: EmbeddingParams::default(),
            method: None,        // let the backend chain decide
        }
    }
}

impl EnrichmentMapBuilder {
    pub fn new() -> Self {
        info!("Initializing new EnrichmentMapBuilder");
        Self::default()
    }

    // -------------------- Filter configuration --------------------

    /// Keep entities with `padj` at or below this threshold.
    pub fn with_fdr_threshold(mut self, threshold: f64) -> Self {
        info!("Configuring FDR threshold: {}", threshold);
        self.fdr_threshold = threshold;
        self
    }

    /// Cap the run at the most significant entities (smallest `padj`,
    /// original order preserved among the kept subset).
    pub fn with_max_entities(mut self, max: usize) -> Self {
        info!("Configuring entity cap: {}", max);
        self.max_entities = Some(max);
        self
    }

    /// Restrict the run to one contrast; an unknown name is a validation
    /// error listing what the records actually carry.
    pub fn with_contrast(mut self, contrast: impl Into<String>) -> Self {
        let contrast = contrast.into();
        info!("Configuring contrast filter: {}", contrast);
        self.contrast = Some(contrast);
        self
    }

    /// Restrict the run to the given entity kinds.
    pub fn with_kinds(mut self, kinds: &[EntityKind]) -> Self {
        info!("Configuring entity kind filter: {:?}", kinds);
        self.kinds = Some(kinds.to_vec());
        self
    }

    /// Select the transposable-element aggregation level kept in the map.
    pub fn with_te_level(mut self, level: TeLevel) -> Self {
        info!("Configuring TE level: {}", level);
        self.te_level = level;
        self
    }

    // -------------------- Numerical configuration --------------------

    pub fn with_neighbors(mut self, params: NeighborParams) -> Self {
        info!(
            "Configuring neighbor extraction: k={}, min_similarity={}",
            params.k, params.min_similarity
        );
        self.neighbor_params = params;
        self
    }

    pub fn with_embedding(mut self, params: EmbeddingParams) -> Self {
        info!(
            "Configuring embedding: n_neighbors={}, min_dist={}, seed={}",
            params.n_neighbors, params.min_dist, params.seed
        );
        self.embedding_params = params;
        self
    }

    /// Prefer a specific reduction backend; unavailable or failing backends
    /// still fall down the chain.
    pub fn with_method(mut self, method: ReductionMethod) -> Self {
        info!("Configuring reduction method preference: {}", method);
        self.method = Some(method);
        self
    }

    // -------------------- Build --------------------

    /// Run the full pipeline over a snapshot of records.
    ///
    /// Validation (empty input, missing statistics, unknown contrast, empty
    /// result after filtering) aborts before any numerical stage starts.
    pub fn build(&self, records: Vec<EntityRecord>) -> Result<EnrichmentMap> {
        let total = records.len();
        info!("Building enrichment map from {} records", total);

        let entities = scores::standardize(records)?;
        let mut entities = self.apply_filters(entities)?;

        // Filtering never changes nes/padj, so this is a no-op unless a
        // caller fed pre-built entities with stale scores; cheap either way.
        scores::restandardize(&mut entities);

        let similarity = compute_similarity(&entities);
        debug_assert!(similarity.is_symmetric(1e-12));

        let ids: Vec<String> = entities.iter().map(|e| e.id.clone()).collect();
        let neighbor_map = extract_neighbors(&similarity, &ids, &self.neighbor_params);

        let embedding =
            compute_embedding(&similarity, &self.embedding_params, self.method);

        // Merge per entity; absence in the neighbor map flattens to an
        // empty list at this boundary.
        let nodes: Vec<MapNode> = entities
            .iter()
            .zip(embedding.coords.iter())
            .map(|(entity, &[x, y])| {
                let genes: Vec<String> =
                    entity.gene_set.iter().take(GENE_PREVIEW_MAX).cloned().collect();
                MapNode {
                    id: entity.id.clone(),
                    name: entity.name.clone(),
                    display_name: entity.display_name.clone(),
                    database: entity.database.clone(),
                    kind: entity.kind,
                    nes: entity.nes,
                    padj: entity.padj,
                    pvalue: entity.pvalue,
                    signed_sig: entity.signed_sig,
                    set_size: entity.set_size,
                    leading_edge_size: entity.leading_edge_size(),
                    gene_count: entity.gene_set.len(),
                    genes,
                    x,
                    y,
                    neighbors: neighbor_map
                        .get(&entity.id)
                        .cloned()
                        .unwrap_or_default(),
                }
            })
            .collect();

        let mut kind_counts: BTreeMap<EntityKind, usize> = BTreeMap::new();
        for entity in &entities {
            *kind_counts.entry(entity.kind).or_insert(0) += 1;
        }
        let databases: BTreeSet<String> = entities
            .iter()
            .filter(|e| !e.database.is_empty())
            .map(|e| e.database.clone())
            .collect();

        let summary = MapSummary {
            n_entities: entities.len(),
            kind_counts,
            databases,
            method: embedding.method,
            contrast: self.contrast.clone(),
            te_level: self.te_level,
        };
        info!("Enrichment map built: {}", summary);

        Ok(EnrichmentMap { nodes, summary })
    }

    /// One independent map per contrast tag, built in parallel.
    ///
    /// Records without a contrast tag are skipped with a warning; they have
    /// no batch to belong to.
    pub fn build_per_contrast(
        &self,
        records: Vec<EntityRecord>,
    ) -> Result<BTreeMap<String, EnrichmentMap>> {
        if records.is_empty() {
            return Err(EnrichmapError::EmptyInput);
        }

        let mut groups: BTreeMap<String, Vec<EntityRecord>> = BTreeMap::new();
        let mut untagged = 0usize;
        for record in records {
            match record.contrast.clone() {
                Some(contrast) => groups.entry(contrast).or_default().push(record),
                None => untagged += 1,
            }
        }
        if untagged > 0 {
            warn!("Skipping {} records without a contrast tag", untagged);
        }
        if groups.is_empty() {
            return Err(EnrichmapError::NoEntitiesAfterFilter(
                "no records carry a contrast tag".into(),
            ));
        }

        info!("Building {} contrast maps in parallel", groups.len());
        let maps: Result<Vec<(String, EnrichmentMap)>> = groups
            .into_iter()
            .collect::<Vec<_>>()
            .into_par_iter()
            .map(|(contrast, group)| {
                let mut builder = self.clone();
                builder.contrast = Some(contrast.clone());
                builder.build(group).map(|map| (contrast, map))
            })
            .collect();

        maps.map(|pairs| pairs.into_iter().collect())
    }

    // -------------------- Filters --------------------

    fn apply_filters(&self, entities: Vec<Entity>) -> Result<Vec<Entity>> {
        let mut entities = entities;

        if let Some(requested) = &self.contrast {
            let available: BTreeSet<String> =
                entities.iter().filter_map(|e| e.contrast.clone()).collect();
            // An explicitly requested contrast must exist in the input,
            // otherwise the caller made a naming mistake.
            if !available.contains(requested) {
                return Err(EnrichmapError::UnknownContrast {
                    requested: requested.clone(),
                    available: available.into_iter().collect(),
                });
            }
            entities.retain(|e| e.contrast.as_deref() == Some(requested.as_str()));
            debug!("Contrast filter `{}`: {} entities kept", requested, entities.len());
        }

        if let Some(kinds) = &self.kinds {
            entities.retain(|e| kinds.contains(&e.kind));
            debug!("Kind filter {:?}: {} entities kept", kinds, entities.len());
        }

        // Keep all non-TE databases plus exactly one TE aggregation level
        let te_database = self.te_level.database();
        entities.retain(|e| !e.database.starts_with("TE_") || e.database == te_database);
        debug!("TE level `{}`: {} entities kept", self.te_level, entities.len());

        entities.retain(|e| e.padj <= self.fdr_threshold);
        debug!(
            "FDR filter (padj <= {}): {} entities kept",
            self.fdr_threshold,
            entities.len()
        );

        if let Some(max) = self.max_entities {
            if entities.len() > max {
                // Keep the smallest-padj subset but preserve input order, so
                // downstream index-based tie-breaks stay stable
                let mut ranked: Vec<(usize, f64)> = entities
                    .iter()
                    .enumerate()
                    .map(|(idx, e)| (idx, e.padj))
                    .collect();
                ranked.sort_by(|a, b| {
                    a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal)
                });
                let keep: BTreeSet<usize> =
                    ranked.into_iter().take(max).map(|(idx, _)| idx).collect();
                let mut idx = 0usize;
                entities.retain(|_| {
                    let kept = keep.contains(&idx);
                    idx += 1;
                    kept
                });
                debug!("Entity cap {}: {} entities kept", max, entities.len());
            }
        }

        if entities.is_empty() {
            return Err(EnrichmapError::NoEntitiesAfterFilter(format!(
                "contrast={:?}, kinds={:?}, te_level={}, fdr<={}",
                self.contrast, self.kinds, self.te_level, self.fdr_threshold
            )));
        }

        Ok(entities)
    }
}
