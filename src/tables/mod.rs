//! Reference table loading
//!
//! All scoring state comes from six immutable CSV tables published per model
//! year: diagnosis-to-CC mappings, hierarchy edges, coefficients, eligible
//! CPT/HCPCS procedures, chronic flags, and interaction definitions. The
//! tables load once into a [`ReferenceTables`] value which is then shared
//! read-only (an `Arc` handle per pipeline); nothing mutates it afterwards.
//!
//! Loading is strict: a missing file, a malformed header, or an interaction
//! expression that does not parse is a [`ConfigError`] at construction time.
//! Lookup misses at scoring time are never errors (codes roll forward across
//! CMS years); they land in the result's trace fields instead.

pub mod expression;

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::types::{ModelVariant, UnknownModelError};
use expression::{Expr, ExprError};

/// Error type for reference table configuration and loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A configured table file does not exist
    #[error("reference table not found: {0}")]
    TableNotFound(PathBuf),

    /// IO error while reading a table
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// CSV-level error (bad row shape, unparseable field)
    #[error("CSV error in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// Header row is missing a required column
    #[error("{path}: malformed header, missing column `{column}`")]
    MalformedHeader { path: PathBuf, column: &'static str },

    /// Model name outside the closed variant set
    #[error(transparent)]
    UnknownVariant(#[from] UnknownModelError),

    /// An interaction expression that does not parse
    #[error("{path}: invalid expression for interaction `{name}`: {source}")]
    Expression {
        path: PathBuf,
        name: String,
        #[source]
        source: ExprError,
    },
}

/// Result type alias for table loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Paths to the six reference tables for one pipeline.
///
/// Deserialization rejects unknown fields: a typo'd or unsupported option is
/// a fatal configuration error, not a silent ignore.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TableConfig {
    pub dx_cc_table: PathBuf,
    pub hierarchy_table: PathBuf,
    pub coefficient_table: PathBuf,
    pub procedure_table: PathBuf,
    pub interaction_table: PathBuf,
    pub chronic_flags_table: PathBuf,
}

impl TableConfig {
    /// Conventional file names under one directory:
    /// `ra_dx_to_cc_<year>.csv`, `ra_hierarchies_<variant>.csv`,
    /// `ra_coefficients_<year>.csv`, `ra_eligible_cpt_hcpcs_<year>.csv`,
    /// `ra_interactions_<variant>.csv`, `hcc_is_chronic.csv`.
    pub fn from_dir<P: AsRef<Path>>(dir: P, year: u16, variant: ModelVariant) -> Self {
        let dir = dir.as_ref();
        let variant_tag = variant.short_name().to_ascii_lowercase();
        Self {
            dx_cc_table: dir.join(format!("ra_dx_to_cc_{year}.csv")),
            hierarchy_table: dir.join(format!("ra_hierarchies_{variant_tag}.csv")),
            coefficient_table: dir.join(format!("ra_coefficients_{year}.csv")),
            procedure_table: dir.join(format!("ra_eligible_cpt_hcpcs_{year}.csv")),
            interaction_table: dir.join(format!("ra_interactions_{variant_tag}.csv")),
            chronic_flags_table: dir.join("hcc_is_chronic.csv"),
        }
    }
}

/// A named interaction variable with its parsed predicate.
#[derive(Debug, Clone)]
pub struct InteractionDef {
    pub name: String,
    pub expr: Expr,
}

/// The immutable lookup state for one model variant.
///
/// Constructed once by [`ReferenceTables::load`] and shared as
/// `Arc<ReferenceTables>`; parallel reads need no synchronization.
#[derive(Debug)]
pub struct ReferenceTables {
    variant: ModelVariant,
    dx_to_cc: HashMap<String, Vec<u32>>,
    hierarchies: HashMap<u32, Vec<u32>>,
    coefficients: HashMap<String, HashMap<String, f64>>,
    eligible_procedures: HashSet<String>,
    chronic: HashSet<u32>,
    interactions: Vec<InteractionDef>,
}

#[derive(Debug, Deserialize)]
struct DxToCcRow {
    diagnosis_code: String,
    cc: u32,
    model_name: String,
}

#[derive(Debug, Deserialize)]
struct HierarchyRow {
    parent_cc: u32,
    child_cc: u32,
}

#[derive(Debug, Deserialize)]
struct CoefficientRow {
    model_name: String,
    segment: String,
    variable: String,
    coefficient: f64,
}

#[derive(Debug, Deserialize)]
struct ProcedureRow {
    code: String,
}

#[derive(Debug, Deserialize)]
struct ChronicRow {
    cc: u32,
    is_chronic: u8,
}

#[derive(Debug, Deserialize)]
struct InteractionRow {
    variable: String,
    expression: String,
}

impl ReferenceTables {
    /// Load every table named by `config`, keeping only rows for `variant`
    /// where the table is model-qualified.
    pub fn load(variant: ModelVariant, config: &TableConfig) -> ConfigResult<Arc<Self>> {
        let dx_to_cc = Self::load_dx_to_cc(open(&config.dx_cc_table)?, variant, &config.dx_cc_table)?;
        let hierarchies = Self::load_hierarchies(open(&config.hierarchy_table)?, &config.hierarchy_table)?;
        let coefficients =
            Self::load_coefficients(open(&config.coefficient_table)?, variant, &config.coefficient_table)?;
        let eligible_procedures =
            Self::load_procedures(open(&config.procedure_table)?, &config.procedure_table)?;
        let chronic = Self::load_chronic(open(&config.chronic_flags_table)?, &config.chronic_flags_table)?;
        let interactions =
            Self::load_interactions(open(&config.interaction_table)?, &config.interaction_table)?;

        if dx_to_cc.is_empty() {
            warn!(model = %variant, "diagnosis-to-CC table has no rows for this model");
        }
        info!(
            model = %variant,
            diagnoses = dx_to_cc.len(),
            hierarchy_parents = hierarchies.len(),
            segments = coefficients.len(),
            procedures = eligible_procedures.len(),
            interactions = interactions.len(),
            "loaded reference tables"
        );

        Ok(Arc::new(Self {
            variant,
            dx_to_cc,
            hierarchies,
            coefficients,
            eligible_procedures,
            chronic,
            interactions,
        }))
    }

    /// The variant these tables were filtered for.
    pub fn variant(&self) -> ModelVariant {
        self.variant
    }

    /// CCs mapped from a normalized diagnosis code, or `None` when the
    /// model has no row for it.
    pub fn ccs_for(&self, diagnosis: &str) -> Option<&[u32]> {
        self.dx_to_cc.get(diagnosis).map(Vec::as_slice)
    }

    /// CCs suppressed by the presence of `parent`.
    pub fn children_of(&self, parent: u32) -> &[u32] {
        self.hierarchies.get(&parent).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Coefficient for `(segment, variable)`, if the table has one.
    pub fn coefficient(&self, segment: &str, variable: &str) -> Option<f64> {
        self.coefficients.get(segment)?.get(variable).copied()
    }

    /// Whether the CC carries the chronic flag.
    pub fn is_chronic(&self, cc: u32) -> bool {
        self.chronic.contains(&cc)
    }

    /// Whether a CPT/HCPCS code is risk-adjustment eligible.
    pub fn procedure_eligible(&self, code: &str) -> bool {
        self.eligible_procedures.contains(code)
    }

    /// The interaction definitions for this variant, in table order.
    pub fn interactions(&self) -> &[InteractionDef] {
        &self.interactions
    }

    fn load_dx_to_cc<R: Read>(
        reader: R,
        variant: ModelVariant,
        path: &Path,
    ) -> ConfigResult<HashMap<String, Vec<u32>>> {
        let mut csv = csv_reader(reader, path, &["diagnosis_code", "cc", "model_name"])?;
        let mut map: HashMap<String, Vec<u32>> = HashMap::new();
        for row in csv.deserialize() {
            let row: DxToCcRow = row.map_err(|source| ConfigError::Csv {
                path: path.to_path_buf(),
                source,
            })?;
            if !variant.matches_model_name(&row.model_name) {
                continue;
            }
            let code = crate::types::normalize_diagnosis(&row.diagnosis_code);
            let ccs = map.entry(code).or_default();
            if !ccs.contains(&row.cc) {
                ccs.push(row.cc);
            }
        }
        debug!(path = %path.display(), entries = map.len(), "loaded diagnosis-to-CC table");
        Ok(map)
    }

    fn load_hierarchies<R: Read>(reader: R, path: &Path) -> ConfigResult<HashMap<u32, Vec<u32>>> {
        let mut csv = csv_reader(reader, path, &["parent_cc", "child_cc"])?;
        let mut map: HashMap<u32, Vec<u32>> = HashMap::new();
        for row in csv.deserialize() {
            let row: HierarchyRow = row.map_err(|source| ConfigError::Csv {
                path: path.to_path_buf(),
                source,
            })?;
            let children = map.entry(row.parent_cc).or_default();
            if !children.contains(&row.child_cc) {
                children.push(row.child_cc);
            }
        }
        Ok(map)
    }

    fn load_coefficients<R: Read>(
        reader: R,
        variant: ModelVariant,
        path: &Path,
    ) -> ConfigResult<HashMap<String, HashMap<String, f64>>> {
        let mut csv = csv_reader(reader, path, &["model_name", "segment", "variable", "coefficient"])?;
        let mut map: HashMap<String, HashMap<String, f64>> = HashMap::new();
        for row in csv.deserialize() {
            let row: CoefficientRow = row.map_err(|source| ConfigError::Csv {
                path: path.to_path_buf(),
                source,
            })?;
            if !variant.matches_model_name(&row.model_name) {
                continue;
            }
            map.entry(row.segment)
                .or_default()
                .insert(row.variable, row.coefficient);
        }
        Ok(map)
    }

    fn load_procedures<R: Read>(reader: R, path: &Path) -> ConfigResult<HashSet<String>> {
        let mut csv = csv_reader(reader, path, &["code"])?;
        let mut set = HashSet::new();
        for row in csv.deserialize() {
            let row: ProcedureRow = row.map_err(|source| ConfigError::Csv {
                path: path.to_path_buf(),
                source,
            })?;
            set.insert(row.code.trim().to_ascii_uppercase());
        }
        Ok(set)
    }

    fn load_chronic<R: Read>(reader: R, path: &Path) -> ConfigResult<HashSet<u32>> {
        let mut csv = csv_reader(reader, path, &["cc", "is_chronic"])?;
        let mut set = HashSet::new();
        for row in csv.deserialize() {
            let row: ChronicRow = row.map_err(|source| ConfigError::Csv {
                path: path.to_path_buf(),
                source,
            })?;
            if row.is_chronic != 0 {
                set.insert(row.cc);
            }
        }
        Ok(set)
    }

    fn load_interactions<R: Read>(reader: R, path: &Path) -> ConfigResult<Vec<InteractionDef>> {
        let mut csv = csv_reader(reader, path, &["variable", "expression"])?;
        let mut defs = Vec::new();
        for row in csv.deserialize() {
            let row: InteractionRow = row.map_err(|source| ConfigError::Csv {
                path: path.to_path_buf(),
                source,
            })?;
            let expr = Expr::parse(&row.expression).map_err(|source| ConfigError::Expression {
                path: path.to_path_buf(),
                name: row.variable.clone(),
                source,
            })?;
            defs.push(InteractionDef {
                name: row.variable,
                expr,
            });
        }
        Ok(defs)
    }
}

fn open(path: &Path) -> ConfigResult<File> {
    if !path.exists() {
        return Err(ConfigError::TableNotFound(path.to_path_buf()));
    }
    File::open(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Build a CSV reader and validate the header row up front, so a renamed or
/// missing column fails with the column name rather than a row-level serde
/// error deep into the file.
fn csv_reader<R: Read>(
    reader: R,
    path: &Path,
    required_columns: &[&'static str],
) -> ConfigResult<csv::Reader<R>> {
    let mut csv = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);
    let headers = csv
        .headers()
        .map_err(|source| ConfigError::Csv {
            path: path.to_path_buf(),
            source,
        })?
        .clone();
    for column in required_columns {
        if !headers.iter().any(|h| h.eq_ignore_ascii_case(column)) {
            return Err(ConfigError::MalformedHeader {
                path: path.to_path_buf(),
                column,
            });
        }
    }
    Ok(csv)
}
