//! Scoring pipeline orchestration
//!
//! [`RafPipeline`] wires the stages together behind three entry points:
//! from raw 837 envelopes ([`RafPipeline::run`]), from pre-normalized
//! service records ([`RafPipeline::run_from_service_records`], the entry
//! the external FHIR EOB adapter uses), and from bare diagnosis codes
//! ([`RafPipeline::calculate_from_diagnosis`]).
//!
//! A pipeline owns an `Arc` handle to its reference tables and is
//! `Send + Sync`; scoring methods take `&self`, perform no I/O, and share
//! no mutable state, so calls are freely parallelizable across
//! beneficiaries.
//!
//! # Examples
//!
//! ```no_run
//! use raf_rs::scoring::RafPipeline;
//! use raf_rs::filter::ScoringOptions;
//! use raf_rs::tables::TableConfig;
//! use raf_rs::types::{Demographics, ModelVariant, Sex};
//!
//! let config = TableConfig::from_dir("reference/tables", 2026, ModelVariant::V28);
//! let pipeline = RafPipeline::new(ModelVariant::V28, &config, ScoringOptions::default())?;
//!
//! let demographics = Demographics::new(67, Sex::Female);
//! let result = pipeline.calculate_from_diagnosis(&["E11.9", "N18.3"], &demographics)?;
//! println!("RAF {:.3}", result.risk_score);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod hierarchy;
pub mod interactions;
pub mod mapper;
pub mod segment;
pub mod summer;

use std::collections::HashSet;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};

use crate::filter::{collect_diagnoses, filter_eligible, ScoringOptions};
use crate::parser::{ClaimParser, ParseError};
use crate::tables::{ConfigError, ReferenceTables, TableConfig};
use crate::types::{
    normalize_diagnosis, Demographics, DemographicsError, ModelVariant, RafResult, ServiceRecord,
};

/// Error type for scoring calls.
///
/// Configuration problems surface earlier, from [`RafPipeline::new`]; a
/// call that returns an error produced no partial result and touched no
/// shared state.
#[derive(Debug, Error)]
pub enum ScoreError {
    /// An 837 envelope failed to parse
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// Demographics failed boundary validation
    #[error(transparent)]
    Demographics(#[from] DemographicsError),
}

/// Result type alias for scoring calls.
pub type ScoreResult<T> = Result<T, ScoreError>;

/// The risk adjustment scoring pipeline for one model variant.
pub struct RafPipeline {
    variant: ModelVariant,
    tables: Arc<ReferenceTables>,
    options: ScoringOptions,
}

impl RafPipeline {
    /// Load the reference tables named by `config` and build a pipeline.
    ///
    /// Table loading happens exactly once, here; every scoring call
    /// afterwards is a pure function of its inputs.
    pub fn new(
        variant: ModelVariant,
        config: &TableConfig,
        options: ScoringOptions,
    ) -> Result<Self, ConfigError> {
        let tables = ReferenceTables::load(variant, config)?;
        Ok(Self {
            variant,
            tables,
            options,
        })
    }

    /// Build a pipeline over already-loaded tables, sharing them with any
    /// other pipeline holding the same handle.
    pub fn with_tables(tables: Arc<ReferenceTables>, options: ScoringOptions) -> Self {
        Self {
            variant: tables.variant(),
            tables,
            options,
        }
    }

    /// The shared table handle, for callers that want to build sibling
    /// pipelines without reloading.
    pub fn tables(&self) -> &Arc<ReferenceTables> {
        &self.tables
    }

    /// Score raw 837 envelopes: parse, filter, then score the surviving
    /// diagnosis union.
    pub fn run(&self, envelopes: &[&str], demographics: &Demographics) -> ScoreResult<RafResult> {
        demographics.validate(self.variant)?;
        let mut records = Vec::new();
        for envelope in envelopes {
            records.extend(ClaimParser::parse_str(envelope)?);
        }
        debug!(records = records.len(), "parsed claim envelopes");
        Ok(self.score_records(records, demographics))
    }

    /// Score pre-normalized service records (the FHIR adapter path),
    /// skipping the 837 parser.
    pub fn run_from_service_records(
        &self,
        records: Vec<ServiceRecord>,
        demographics: &Demographics,
    ) -> ScoreResult<RafResult> {
        demographics.validate(self.variant)?;
        Ok(self.score_records(records, demographics))
    }

    /// Score a bare diagnosis list, skipping parsing and eligibility
    /// filtering entirely.
    pub fn calculate_from_diagnosis<S: AsRef<str>>(
        &self,
        diagnoses: &[S],
        demographics: &Demographics,
    ) -> ScoreResult<RafResult> {
        demographics.validate(self.variant)?;
        let mut seen = HashSet::new();
        let mut codes = Vec::new();
        for dx in diagnoses {
            let code = normalize_diagnosis(dx.as_ref());
            if !code.is_empty() && seen.insert(code.clone()) {
                codes.push(code);
            }
        }
        Ok(self.score(codes, None, demographics))
    }

    fn score_records(&self, records: Vec<ServiceRecord>, demographics: &Demographics) -> RafResult {
        let kept = filter_eligible(records, &self.tables, &self.options);
        let diagnoses = collect_diagnoses(&kept, &self.options);
        self.score(diagnoses, Some(kept), demographics)
    }

    fn score(
        &self,
        diagnosis_codes: Vec<String>,
        service_level_data: Option<Vec<ServiceRecord>>,
        demographics: &Demographics,
    ) -> RafResult {
        let mapped = mapper::map_diagnoses(&self.tables, &diagnosis_codes);
        let profile = segment::classify(demographics, self.variant);

        // new-enrollee layouts score on demographics alone: an empty CC
        // set keeps HCC variables and disease interactions out without
        // special-casing the later stages
        let surviving = if profile.is_new_enrollee() {
            HashSet::new()
        } else {
            hierarchy::apply_hierarchies(&self.tables, &mapped.ccs)
        };

        let mut hcc_list: Vec<u32> = surviving.iter().copied().collect();
        hcc_list.sort_unstable();

        let institutional = profile.segment == "INS";
        let fired =
            interactions::evaluate_interactions(&self.tables, &surviving, demographics, institutional);
        let breakdown = summer::sum_coefficients(&self.tables, &profile, &hcc_list, &fired);

        info!(
            model = %self.variant,
            segment = %profile.segment,
            hccs = hcc_list.len(),
            risk_score = breakdown.risk_score,
            "scored beneficiary"
        );

        RafResult {
            risk_score: breakdown.risk_score,
            risk_score_demographics: breakdown.demographics_component,
            risk_score_chronic_only: breakdown.chronic_component,
            risk_score_hcc: breakdown.hcc_component,
            hcc_list,
            cc_to_dx: mapped.cc_to_dx,
            coefficients: breakdown.coefficients,
            interactions: breakdown.interactions,
            demographics: demographics.clone(),
            model_name: self.variant.name().to_string(),
            diagnosis_codes,
            service_level_data,
            unmapped_diagnoses: mapped.unmapped,
            coefficients_missing: breakdown.missing,
        }
    }
}
