//! Normalized service records, the wire-neutral claim shape

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A single service line (or claim, for claims without service lines) in
/// wire-neutral form.
///
/// Both the X12 837 parser and the external FHIR EOB adapter deliver this
/// shape; everything downstream of the extractor is source-agnostic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceRecord {
    /// Two-character claim type: `71` professional, `72` institutional
    /// outpatient, `73` institutional inpatient. Empty when the source
    /// transaction could not be classified.
    #[serde(default)]
    pub claim_type: String,

    /// Three-character type of bill (institutional claims), or empty
    #[serde(default)]
    pub bill_type: String,

    /// Date of service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_date: Option<NaiveDate>,

    /// Through date for ranged services
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub through_date: Option<NaiveDate>,

    /// CMS two-digit place of service code, or empty
    #[serde(default)]
    pub place_of_service: String,

    /// CPT/HCPCS procedure code
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub procedure_code: Option<String>,

    /// Procedure modifiers in declared order, at most four
    #[serde(default)]
    pub procedure_modifiers: Vec<String>,

    /// Claim diagnosis codes in declared order; the first is principal
    #[serde(default)]
    pub diagnosis_codes: Vec<String>,

    /// 1-based indices into `diagnosis_codes` naming the diagnoses linked
    /// to this service line; empty when the source carried no pointers
    #[serde(default)]
    pub linked_diagnosis_pointers: Vec<usize>,

    /// Rendering provider taxonomy/specialty, or empty
    #[serde(default)]
    pub provider_specialty: String,

    /// Rendering provider NPI, or empty
    #[serde(default)]
    pub performing_provider_npi: String,
}

impl ServiceRecord {
    /// Whether every linked pointer lands inside `diagnosis_codes`.
    pub fn pointers_in_range(&self) -> bool {
        self.linked_diagnosis_pointers
            .iter()
            .all(|&p| p >= 1 && p <= self.diagnosis_codes.len())
    }

    /// The diagnoses named by `linked_diagnosis_pointers`, in pointer
    /// order. Out-of-range pointers are skipped.
    pub fn linked_diagnoses(&self) -> Vec<&str> {
        self.linked_diagnosis_pointers
            .iter()
            .filter_map(|&p| {
                p.checked_sub(1)
                    .and_then(|i| self.diagnosis_codes.get(i))
                    .map(String::as_str)
            })
            .collect()
    }
}

/// Normalize a raw diagnosis code to ICD-10-CM canonical form: trimmed,
/// uppercase, no dot.
pub fn normalize_diagnosis(raw: &str) -> String {
    raw.trim()
        .chars()
        .filter(|c| *c != '.')
        .map(|c| c.to_ascii_uppercase())
        .collect()
}
