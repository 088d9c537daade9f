//! Scoring output shape

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{Demographics, ServiceRecord};

/// The complete outcome of one scoring call: the risk score, its
/// decomposition, and the traces that justify it.
///
/// All map-shaped fields are `BTreeMap` so serialized output is sorted by
/// key, and `hcc_list` is sorted ascending by numeric CC; the result of a
/// call is bit-identical regardless of input ordering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RafResult {
    /// Total risk adjustment factor
    pub risk_score: f64,

    /// Sum restricted to demographic variables (age-sex cell and modifiers)
    pub risk_score_demographics: f64,

    /// Sum restricted to HCC variables whose chronic flag is set
    pub risk_score_chronic_only: f64,

    /// Sum restricted to all HCC variables, chronic or not
    pub risk_score_hcc: f64,

    /// Condition categories surviving the hierarchy stage, ascending
    pub hcc_list: Vec<u32>,

    /// Mapper trace: every mapped CC (pre-hierarchy) to the diagnoses that
    /// produced it
    pub cc_to_dx: BTreeMap<u32, Vec<String>>,

    /// Coefficients applied, keyed by variable name
    pub coefficients: BTreeMap<String, f64>,

    /// Interaction variables that fired, keyed by name, with the
    /// coefficient each contributed
    pub interactions: BTreeMap<String, f64>,

    /// Input demographics, echoed
    pub demographics: Demographics,

    /// Long CMS name of the scoring model
    pub model_name: String,

    /// Input diagnosis codes, normalized, de-duplicated, first-seen order
    pub diagnosis_codes: Vec<String>,

    /// Surviving service records, present when a service pipeline ran
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_level_data: Option<Vec<ServiceRecord>>,

    /// Diagnoses with no mapping row for the active model
    pub unmapped_diagnoses: Vec<String>,

    /// Contributing variables with no coefficient row in the active
    /// segment; each contributed 0
    pub coefficients_missing: Vec<String>,
}
