//! Signed-significance standardization.
//!
//! Entities arrive with statistics on incompatible scales (GSEA NES with
//! adjusted p-values, TF activity scores, TE effects). One bounded, signed
//! scale makes them comparable:
//!
//! `signed_sig = clip(-log10(clip(padj, 1e-50, 1)), -50, 50) * sign(nes)`
//!
//! The inner clamp keeps the logarithm defined for padj == 0; the outer clamp
//! bounds runaway significance so one entity cannot dominate a color scale.
//! The transform is recomputed from `nes`/`padj` whenever asked, never
//! accumulated, so standardizing twice is a no-op.

use log::{debug, info};

use crate::entity::{clean_display_name, Entity, EntityRecord};
use crate::error::{EnrichmapError, Result};

/// Lower clamp for adjusted p-values before taking the logarithm.
pub const PADJ_FLOOR: f64 = 1e-50;

/// Symmetric bound on the signed-significance scale.
pub const SIGNED_SIG_MAX: f64 = 50.0;

/// Signed significance of one (effect size, adjusted p-value) pair.
///
/// `nes == 0.0` counts as non-negative, so a zero effect keeps a positive
/// magnitude rather than collapsing to 0; `-0.0` is treated the same.
pub fn signed_significance(nes: f64, padj: f64) -> f64 {
    let clamped = padj.clamp(PADJ_FLOOR, 1.0);
    let magnitude = (-clamped.log10()).clamp(-SIGNED_SIG_MAX, SIGNED_SIG_MAX);
    let sign = if nes < 0.0 { -1.0 } else { 1.0 };
    magnitude * sign
}

/// Validate raw records and attach signed significance, producing the
/// entities every numerical stage consumes.
///
/// Fails on an empty input, or on any record missing its effect size or
/// adjusted p-value under both accepted spellings (the serde aliases on
/// [`EntityRecord`] have already folded the historical names together, so a
/// `None` here means the field was genuinely absent).
pub fn standardize(records: Vec<EntityRecord>) -> Result<Vec<Entity>> {
    if records.is_empty() {
        return Err(EnrichmapError::EmptyInput);
    }

    info!("Standardizing scores for {} entities", records.len());

    let mut entities = Vec::with_capacity(records.len());
    for record in records {
        let nes = record
            .nes
            .ok_or_else(|| EnrichmapError::MissingEffectSize { id: record.id.clone() })?;
        let padj = record.padj.ok_or_else(|| EnrichmapError::MissingAdjustedPValue {
            id: record.id.clone(),
        })?;

        let signed_sig = signed_significance(nes, padj);
        entities.push(Entity {
            display_name: clean_display_name(&record.name),
            id: record.id,
            name: record.name,
            database: record.database,
            contrast: record.contrast,
            kind: record.kind,
            gene_set: record.gene_set,
            set_size: record.set_size,
            nes,
            padj,
            pvalue: record.pvalue,
            signed_sig,
        });
    }

    let (min_sig, max_sig) = entities
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(min, max), e| {
            (min.min(e.signed_sig), max.max(e.signed_sig))
        });
    debug!("Signed significance range: [{:.2}, {:.2}]", min_sig, max_sig);

    Ok(entities)
}

/// Recompute signed significance in place on already-standardized entities.
///
/// Idempotent: the value is a pure function of `nes` and `padj`, so running
/// this after [`standardize`] changes nothing. The pipeline calls it after
/// filtering as a cheap invariant restore.
pub fn restandardize(entities: &mut [Entity]) {
    for entity in entities.iter_mut() {
        entity.signed_sig = signed_significance(entity.nes, entity.padj);
    }
    debug!("Restandardized {} entities", entities.len());
}
