//! Validation errors raised before any numerical work begins.
//!
//! Numerical edge cases (log of zero, division by zero, degenerate rescale
//! axes) are absorbed by clamping and flooring at the point of computation
//! and never surface here. Reduction backends report failure through
//! [`EnrichmapError::Reduction`], but the embedding chain absorbs those and
//! falls back, so the variant never escapes `compute_embedding`.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, EnrichmapError>;

#[derive(Debug, Error)]
pub enum EnrichmapError {
    /// No entity records were handed to the pipeline at all.
    #[error("no entity records provided")]
    EmptyInput,

    /// Filtering removed every entity before the numerical stages.
    #[error("no entities left after filtering: {0}")]
    NoEntitiesAfterFilter(String),

    /// Effect size missing under both accepted spellings (`nes` / `NES`).
    #[error("entity `{id}`: missing effect size (expected `nes` or `NES`)")]
    MissingEffectSize { id: String },

    /// Adjusted p-value missing under both accepted spellings
    /// (`padj` / `adj.P.Val`).
    #[error("entity `{id}`: missing adjusted p-value (expected `padj` or `adj.P.Val`)")]
    MissingAdjustedPValue { id: String },

    /// Requested contrast does not occur in the input records.
    #[error("contrast `{requested}` not found; available: {available:?}")]
    UnknownContrast { requested: String, available: Vec<String> },

    /// A reduction backend failed on this input; callers never see this,
    /// the chain logs it and falls through to the next backend.
    #[error("reduction backend `{backend}` failed: {reason}")]
    Reduction { backend: &'static str, reason: String },
}
