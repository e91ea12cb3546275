//! Entity model shared by every pipeline stage.
//!
//! Two layers:
//! - [`EntityRecord`]: the raw interchange struct produced by a loading
//!   collaborator. Statistical fields are optional and accept both historical
//!   spellings (`nes`/`NES`, `padj`/`adj.P.Val`) through serde aliases, so the
//!   naming normalization happens once at ingestion and nowhere else.
//! - [`Entity`]: the validated, fully-populated form every numerical stage
//!   consumes. Produced by `scores::standardize`, immutable afterwards.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Maximum display-name length before truncation.
pub const DISPLAY_NAME_MAX: usize = 60;

/// Which kind of biological entity a record describes.
///
/// Serialized names follow the current schema; legacy spellings from the
/// upstream tables (`PROGENy` for signaling activities, `TE` for
/// transposable elements) are accepted on input.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Pathway,
    #[serde(rename = "TF")]
    Tf,
    #[serde(alias = "PROGENy")]
    Signaling,
    #[serde(rename = "TE", alias = "TransposableElement")]
    TransposableElement,
}

impl EntityKind {
    /// Classify a source database into an entity kind, mirroring the
    /// upstream table conventions. Intended for loaders that carry a
    /// `database` column but no explicit kind.
    pub fn from_database(database: &str) -> Self {
        if database == "CollecTRI" {
            EntityKind::Tf
        } else if database == "PROGENy" {
            EntityKind::Signaling
        } else if database.starts_with("TE_") {
            EntityKind::TransposableElement
        } else {
            EntityKind::Pathway
        }
    }

    /// True for transcription-factor entities; the similarity engine switches
    /// to the overlap coefficient on cross-kind pairs involving these.
    pub fn is_tf(&self) -> bool {
        matches!(self, EntityKind::Tf)
    }

    pub fn is_transposable_element(&self) -> bool {
        matches!(self, EntityKind::TransposableElement)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityKind::Pathway => "Pathway",
            EntityKind::Tf => "TF",
            EntityKind::Signaling => "Signaling",
            EntityKind::TransposableElement => "TE",
        };
        write!(f, "{}", name)
    }
}

/// Aggregation granularity for transposable-element databases. One level is
/// kept per run; the other is filtered out so families and classes never mix
/// in one map.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TeLevel {
    #[default]
    Family,
    Class,
}

impl TeLevel {
    /// The database tag this level keeps (`TE_Family` / `TE_Class`).
    pub fn database(&self) -> &'static str {
        match self {
            TeLevel::Family => "TE_Family",
            TeLevel::Class => "TE_Class",
        }
    }
}

impl fmt::Display for TeLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TeLevel::Family => write!(f, "family"),
            TeLevel::Class => write!(f, "class"),
        }
    }
}

fn default_pvalue() -> f64 {
    1.0
}

/// Raw entity record as handed over by a loader.
///
/// `nes` and `padj` stay optional here: validation lives in
/// `scores::standardize`, which rejects records missing either field under
/// both spellings. Everything else defaults so thin loaders can deserialize
/// straight from the unified result table.
#[derive(Clone, Debug, Deserialize)]
pub struct EntityRecord {
    #[serde(alias = "pathway_id")]
    pub id: String,
    #[serde(alias = "pathway_name")]
    pub name: String,
    #[serde(default)]
    pub database: String,
    #[serde(default)]
    pub contrast: Option<String>,
    #[serde(alias = "entity_type")]
    pub kind: EntityKind,
    /// Leading-edge gene identifiers, already parsed out of the delimited
    /// source column. A `BTreeSet` so all downstream iteration is ordered.
    #[serde(default, alias = "genes")]
    pub gene_set: BTreeSet<String>,
    /// Size of the full annotated set (not the leading edge).
    #[serde(default)]
    pub set_size: usize,
    /// Normalized effect size, either spelling.
    #[serde(default, alias = "NES")]
    pub nes: Option<f64>,
    /// Multiple-testing adjusted p-value, either spelling.
    #[serde(default, alias = "adj.P.Val")]
    pub padj: Option<f64>,
    #[serde(default = "default_pvalue")]
    pub pvalue: f64,
}

impl EntityRecord {
    /// Minimal constructor for programmatic callers; metadata fields start
    /// from their serde defaults and can be filled in afterwards.
    pub fn new(id: impl Into<String>, kind: EntityKind, nes: f64, padj: f64) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            database: String::new(),
            contrast: None,
            kind,
            gene_set: BTreeSet::new(),
            set_size: 0,
            nes: Some(nes),
            padj: Some(padj),
            pvalue: default_pvalue(),
        }
    }

    pub fn with_genes<I, S>(mut self, genes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.gene_set = genes.into_iter().map(Into::into).collect();
        self.set_size = self.gene_set.len();
        self
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    pub fn with_contrast(mut self, contrast: impl Into<String>) -> Self {
        self.contrast = Some(contrast.into());
        self
    }
}

/// Validated entity, ready for the numerical stages.
#[derive(Clone, Debug, Serialize)]
pub struct Entity {
    pub id: String,
    pub name: String,
    /// Human-readable name derived from `name` by [`clean_display_name`].
    pub display_name: String,
    pub database: String,
    pub contrast: Option<String>,
    pub kind: EntityKind,
    pub gene_set: BTreeSet<String>,
    pub set_size: usize,
    pub nes: f64,
    pub padj: f64,
    pub pvalue: f64,
    /// Signed significance on the shared [-50, 50] scale; recomputable from
    /// `nes`/`padj` at any time (see `scores`).
    pub signed_sig: f64,
}

impl Entity {
    /// Number of leading-edge genes actually carried, as opposed to the
    /// annotated `set_size`.
    pub fn leading_edge_size(&self) -> usize {
        self.gene_set.len()
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] nes={:.3} padj={:.3e} genes={}",
            self.id,
            self.kind,
            self.nes,
            self.padj,
            self.gene_set.len()
        )
    }
}

/// Clean a raw entity name for display: underscores to spaces, title case,
/// truncated to `DISPLAY_NAME_MAX` characters with a trailing ellipsis.
pub fn clean_display_name(name: &str) -> String {
    let mut cleaned = String::with_capacity(name.len());
    let mut prev_alpha = false;
    for ch in name.chars() {
        let ch = if ch == '_' { ' ' } else { ch };
        if ch.is_alphabetic() {
            if prev_alpha {
                cleaned.extend(ch.to_lowercase());
            } else {
                cleaned.extend(ch.to_uppercase());
            }
            prev_alpha = true;
        } else {
            cleaned.push(ch);
            prev_alpha = false;
        }
    }

    if cleaned.chars().count() > DISPLAY_NAME_MAX {
        let mut truncated: String =
            cleaned.chars().take(DISPLAY_NAME_MAX - 3).collect();
        truncated.push_str("...");
        truncated
    } else {
        cleaned
    }
}
