//! Demographics classifier: segment derivation, age-sex cell, modifiers

use crate::types::{Demographics, DualStatus, ModelVariant, Sex};

/// Age-sex bucket boundaries shared by the community and ESRD models.
/// Each entry is the inclusive lower bound paired with the cell suffix.
const AGE_BANDS: [(u32, &str); 12] = [
    (95, "95_GT"),
    (90, "90_94"),
    (85, "85_89"),
    (80, "80_84"),
    (75, "75_79"),
    (70, "70_74"),
    (65, "65_69"),
    (60, "60_64"),
    (55, "55_59"),
    (45, "45_54"),
    (35, "35_44"),
    (0, "0_34"),
];

/// Classifier output: the coefficient-table segment plus the demographic
/// variables that contribute to the score.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentProfile {
    /// Primary key into the coefficient table (`CNA`, `CFD`, `NE`, ...)
    pub segment: String,
    /// Age-sex cell variable, e.g. `F75_79`
    pub age_sex_cell: String,
    /// Modifier variables that fired for this beneficiary
    pub modifier_variables: Vec<String>,
}

impl SegmentProfile {
    /// New-enrollee style segments score on demographics alone: no HCC
    /// variables and no disease interactions.
    pub fn is_new_enrollee(&self) -> bool {
        matches!(self.segment.as_str(), "NE" | "DNE")
    }
}

/// Derive the beneficiary's segment and demographic variables.
///
/// An explicit `category` override short-circuits segment derivation (the
/// institutional `INS` segment is only reachable this way) but modifier
/// variables are still computed.
pub fn classify(demographics: &Demographics, variant: ModelVariant) -> SegmentProfile {
    let segment = match &demographics.category {
        Some(category) => category.clone(),
        None => derive_segment(demographics, variant),
    };

    let age_sex_cell = age_sex_cell(demographics.age, demographics.sex);

    let mut modifier_variables = Vec::new();
    let new_enrollee_layout = matches!(segment.as_str(), "NE" | "DNE");
    if !new_enrollee_layout {
        if demographics.orig_disabled && demographics.is_aged() {
            modifier_variables.push(match demographics.sex {
                Sex::Female => "OriginallyDisabled_Female".to_string(),
                Sex::Male => "OriginallyDisabled_Male".to_string(),
            });
        }
        if segment == "INS" {
            modifier_variables.push("LTI".to_string());
        }
        if demographics.low_income {
            modifier_variables.push("LowIncome".to_string());
        }
    }

    SegmentProfile {
        segment,
        age_sex_cell,
        modifier_variables,
    }
}

fn derive_segment(demographics: &Demographics, variant: ModelVariant) -> String {
    if variant.is_esrd() {
        return esrd_segment(demographics);
    }
    if demographics.new_enrollee {
        return "NE".to_string();
    }
    let aged = demographics.is_aged();
    match (demographics.dual_eligibility, aged) {
        (DualStatus::NonDual, true) => "CNA",
        (DualStatus::NonDual, false) => "CND",
        (DualStatus::Partial, true) => "CPA",
        (DualStatus::Partial, false) => "CPD",
        (DualStatus::Full, true) => "CFA",
        (DualStatus::Full, false) => "CFD",
    }
    .to_string()
}

/// ESRD sub-segments: dialysis (`DI`), dialysis new enrollee (`DNE`), and
/// the functioning-graft windows keyed by months since transplant. Ten or
/// more months post-graft falls back to the dialysis segment.
fn esrd_segment(demographics: &Demographics) -> String {
    if demographics.new_enrollee {
        return "DNE".to_string();
    }
    match demographics.graft_months {
        Some(months) if months <= 3 => "GRAFT_0_3".to_string(),
        Some(months) if months <= 9 => "GRAFT_4_9".to_string(),
        _ => "DI".to_string(),
    }
}

/// Deterministic age-sex bucketing, `{0-34 .. 95+} x {M, F}`.
fn age_sex_cell(age: u32, sex: Sex) -> String {
    let prefix = match sex {
        Sex::Male => 'M',
        Sex::Female => 'F',
    };
    let band = AGE_BANDS
        .iter()
        .find(|(lower, _)| age >= *lower)
        .map(|(_, suffix)| *suffix)
        .unwrap_or("0_34");
    format!("{prefix}{band}")
}
