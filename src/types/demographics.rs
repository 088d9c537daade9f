//! Beneficiary demographics and boundary validation

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::ModelVariant;

/// Beneficiary sex as reported on enrollment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sex {
    #[serde(rename = "M")]
    Male,

    #[serde(rename = "F")]
    Female,
}

/// Medicare/Medicaid dual eligibility status, serialized as the CMS
/// two-digit codes (`00` non-dual, `01` partial, `02` full).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DualStatus {
    #[default]
    #[serde(rename = "00")]
    NonDual,

    #[serde(rename = "01")]
    Partial,

    #[serde(rename = "02")]
    Full,
}

/// Error type for demographic validation.
///
/// Any of these is fatal for the scoring call: no partial result is
/// produced and no shared state is touched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DemographicsError {
    /// Age is outside the supported range
    #[error("age {0} is outside the supported range 0..=130")]
    AgeOutOfRange(u32),

    /// An ESRD model was selected for a beneficiary without the ESRD flag
    #[error("{0} requires the esrd flag to be set")]
    EsrdFlagRequired(ModelVariant),

    /// graft_months supplied for a non-ESRD model
    #[error("graft_months is only meaningful for ESRD model variants")]
    GraftMonthsNotApplicable,
}

/// Beneficiary demographics, immutable per scoring call.
///
/// Fields mirror the CMS enrollment inputs. Construction is open (all
/// fields public); [`Demographics::validate`] is the boundary check run by
/// the pipeline before any scoring stage, after which internal code assumes
/// the struct is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Demographics {
    /// Age in whole years at the scoring date
    pub age: u32,

    /// Beneficiary sex
    pub sex: Sex,

    /// Dual eligibility status
    #[serde(default)]
    pub dual_eligibility: DualStatus,

    /// Originally entitled to Medicare by disability
    #[serde(default)]
    pub orig_disabled: bool,

    /// Fewer than 12 months of Medicare enrollment
    #[serde(default)]
    pub new_enrollee: bool,

    /// End-stage renal disease status
    #[serde(default)]
    pub esrd: bool,

    /// Special Needs Plan enrollment
    #[serde(default)]
    pub snp: bool,

    /// Low income subsidy flag
    #[serde(default)]
    pub low_income: bool,

    /// Months since kidney transplant, ESRD models only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graft_months: Option<u32>,

    /// Explicit segment override (e.g. `INS` for long-term institutional);
    /// when absent the segment is derived from the other fields
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl Demographics {
    /// A beneficiary with the given age and sex and all flags cleared.
    pub fn new(age: u32, sex: Sex) -> Self {
        Self {
            age,
            sex,
            dual_eligibility: DualStatus::NonDual,
            orig_disabled: false,
            new_enrollee: false,
            esrd: false,
            snp: false,
            low_income: false,
            graft_months: None,
            category: None,
        }
    }

    /// Boundary validation for a scoring call against `variant`.
    ///
    /// Sex and dual codes are made unrepresentable by their enum types (a
    /// bad wire value fails at deserialization), so the checks left here
    /// are range and cross-field ones.
    pub fn validate(&self, variant: ModelVariant) -> Result<(), DemographicsError> {
        if self.age > 130 {
            return Err(DemographicsError::AgeOutOfRange(self.age));
        }
        if variant.is_esrd() && !self.esrd {
            return Err(DemographicsError::EsrdFlagRequired(variant));
        }
        if self.graft_months.is_some() && !variant.is_esrd() {
            return Err(DemographicsError::GraftMonthsNotApplicable);
        }
        Ok(())
    }

    /// Aged (65+) under CMS segment rules.
    pub fn is_aged(&self) -> bool {
        self.age >= 65
    }
}
