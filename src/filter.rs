//! Service-level extraction and CMS eligibility filtering
//!
//! Presents a uniform view over 837-parsed and FHIR-sourced service records
//! and keeps only the records whose diagnoses qualify for risk adjustment
//! under the configured model year. The survivors' diagnosis union (first
//! seen order, de-duplicated, normalized) is what feeds the CC mapper.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::tables::ReferenceTables;
use crate::types::{normalize_diagnosis, ServiceRecord};

/// Default retained bill-type prefixes for institutional outpatient claims.
const DEFAULT_OUTPATIENT_PREFIXES: [&str; 6] = ["13", "71", "73", "76", "77", "85"];

/// Per-call scoring options.
///
/// Deserialization rejects unknown fields, so a misspelled option is a
/// fatal configuration error rather than a silently applied default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ScoringOptions {
    /// Apply CMS procedure/bill-type eligibility rules to service records
    pub filter_claims: bool,

    /// Prefer explicit `SV1-07` diagnosis pointers when a record carries
    /// them; `false` always uses the full claim-level diagnosis list
    pub use_dx_pointers: bool,

    /// Require an eligible procedure code on institutional outpatient
    /// records even when the bill type carries a retained prefix
    pub strict_outpatient_procedure_check: bool,

    /// Bill-type prefixes that keep institutional outpatient records
    pub outpatient_bill_type_prefixes: Vec<String>,
}

impl Default for ScoringOptions {
    fn default() -> Self {
        Self {
            filter_claims: true,
            use_dx_pointers: true,
            strict_outpatient_procedure_check: false,
            outpatient_bill_type_prefixes: DEFAULT_OUTPATIENT_PREFIXES
                .iter()
                .map(|p| p.to_string())
                .collect(),
        }
    }
}

/// Drop records ineligible for risk adjustment.
///
/// When `options.filter_claims` is off this is the identity. Otherwise:
/// professional records need an eligible procedure code, institutional
/// outpatient records need an eligible procedure or a retained bill-type
/// prefix, inpatient records always qualify, and anything else (including
/// records with an empty claim type) is discarded.
pub fn filter_eligible(
    records: Vec<ServiceRecord>,
    tables: &ReferenceTables,
    options: &ScoringOptions,
) -> Vec<ServiceRecord> {
    if !options.filter_claims {
        return records;
    }
    let before = records.len();
    let kept: Vec<ServiceRecord> = records
        .into_iter()
        .filter(|r| record_eligible(r, tables, options))
        .collect();
    debug!(before, after = kept.len(), "applied claim eligibility filter");
    kept
}

fn record_eligible(
    record: &ServiceRecord,
    tables: &ReferenceTables,
    options: &ScoringOptions,
) -> bool {
    let procedure_eligible = record
        .procedure_code
        .as_deref()
        .is_some_and(|code| tables.procedure_eligible(code));

    match record.claim_type.as_str() {
        "71" => procedure_eligible,
        "72" => {
            let prefix_retained = options
                .outpatient_bill_type_prefixes
                .iter()
                .any(|p| record.bill_type.starts_with(p.as_str()));
            if options.strict_outpatient_procedure_check {
                procedure_eligible && prefix_retained
            } else {
                procedure_eligible || prefix_retained
            }
        }
        // inpatient diagnoses qualify unconditionally
        "73" => true,
        _ => false,
    }
}

/// The diagnoses a single record contributes: the pointer-linked subset
/// when pointers are present and preferred, otherwise every claim-level
/// diagnosis. Codes come back normalized.
pub fn effective_diagnoses(record: &ServiceRecord, options: &ScoringOptions) -> Vec<String> {
    if options.use_dx_pointers && !record.linked_diagnosis_pointers.is_empty() {
        record
            .linked_diagnoses()
            .into_iter()
            .map(normalize_diagnosis)
            .collect()
    } else {
        record
            .diagnosis_codes
            .iter()
            .map(|c| normalize_diagnosis(c))
            .collect()
    }
}

/// Union of effective diagnoses over all records, de-duplicated and in
/// first-seen order.
pub fn collect_diagnoses(records: &[ServiceRecord], options: &ScoringOptions) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for record in records {
        for code in effective_diagnoses(record, options) {
            if !code.is_empty() && seen.insert(code.clone()) {
                out.push(code);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tables::TableConfig;
    use crate::types::ModelVariant;
    use std::io::Write;
    use std::sync::Arc;

    fn write_table(dir: &std::path::Path, name: &str, content: &str) {
        let mut f = std::fs::File::create(dir.join(name)).unwrap();
        f.write_all(content.as_bytes()).unwrap();
    }

    fn tables_with_procedures() -> Arc<ReferenceTables> {
        let dir = tempfile::tempdir().unwrap();
        write_table(
            dir.path(),
            "ra_dx_to_cc_2026.csv",
            "diagnosis_code,cc,model_name\nE119,38,V28\n",
        );
        write_table(dir.path(), "ra_hierarchies_v28.csv", "parent_cc,child_cc\n");
        write_table(
            dir.path(),
            "ra_coefficients_2026.csv",
            "model_name,segment,variable,coefficient\nV28,CNA,HCC38,0.166\n",
        );
        write_table(
            dir.path(),
            "ra_eligible_cpt_hcpcs_2026.csv",
            "code\n99214\nG0438\n",
        );
        write_table(dir.path(), "ra_interactions_v28.csv", "variable,expression\n");
        write_table(dir.path(), "hcc_is_chronic.csv", "cc,is_chronic\n38,1\n");
        let config = TableConfig::from_dir(dir.path(), 2026, ModelVariant::V28);
        ReferenceTables::load(ModelVariant::V28, &config).unwrap()
    }

    fn record(claim_type: &str, bill_type: &str, procedure: Option<&str>) -> ServiceRecord {
        ServiceRecord {
            claim_type: claim_type.to_string(),
            bill_type: bill_type.to_string(),
            procedure_code: procedure.map(str::to_string),
            diagnosis_codes: vec!["E119".to_string()],
            ..Default::default()
        }
    }

    #[test]
    fn test_professional_requires_eligible_procedure() {
        let tables = tables_with_procedures();
        let options = ScoringOptions::default();
        let records = vec![
            record("71", "", Some("99214")),
            record("71", "", Some("99999")),
            record("71", "", None),
        ];
        let kept = filter_eligible(records, &tables, &options);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].procedure_code.as_deref(), Some("99214"));
    }

    #[test]
    fn test_outpatient_bill_type_prefix_is_sufficient_by_default() {
        let tables = tables_with_procedures();
        let options = ScoringOptions::default();
        let records = vec![
            record("72", "131", Some("99999")),
            record("72", "141", Some("99999")),
        ];
        let kept = filter_eligible(records, &tables, &options);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].bill_type, "131");
    }

    #[test]
    fn test_strict_outpatient_requires_both() {
        let tables = tables_with_procedures();
        let options = ScoringOptions {
            strict_outpatient_procedure_check: true,
            ..Default::default()
        };
        let records = vec![
            record("72", "131", Some("99999")),
            record("72", "131", Some("99214")),
        ];
        let kept = filter_eligible(records, &tables, &options);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].procedure_code.as_deref(), Some("99214"));
    }

    #[test]
    fn test_inpatient_and_unknown_claim_types() {
        let tables = tables_with_procedures();
        let options = ScoringOptions::default();
        let records = vec![
            record("73", "111", None),
            record("", "", Some("99214")),
            record("74", "", Some("99214")),
        ];
        let kept = filter_eligible(records, &tables, &options);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].claim_type, "73");
    }

    #[test]
    fn test_filter_disabled_keeps_everything() {
        let tables = tables_with_procedures();
        let options = ScoringOptions {
            filter_claims: false,
            ..Default::default()
        };
        let records = vec![record("", "", None), record("71", "", None)];
        assert_eq!(filter_eligible(records, &tables, &options).len(), 2);
    }

    #[test]
    fn test_pointer_policy() {
        let mut r = record("71", "", Some("99214"));
        r.diagnosis_codes = vec!["E11.9".into(), "I10".into(), "N18.3".into()];
        r.linked_diagnosis_pointers = vec![2];

        let options = ScoringOptions::default();
        assert_eq!(effective_diagnoses(&r, &options), vec!["I10"]);

        let all = ScoringOptions {
            use_dx_pointers: false,
            ..Default::default()
        };
        assert_eq!(effective_diagnoses(&r, &all), vec!["E119", "I10", "N183"]);
    }

    #[test]
    fn test_collect_diagnoses_dedupes_in_first_seen_order() {
        let mut a = record("71", "", Some("99214"));
        a.diagnosis_codes = vec!["E11.9".into(), "I10".into()];
        let mut b = record("71", "", Some("99214"));
        b.diagnosis_codes = vec!["I10".into(), "N18.3".into()];

        let options = ScoringOptions::default();
        assert_eq!(
            collect_diagnoses(&[a, b], &options),
            vec!["E119", "I10", "N183"]
        );
    }

    #[test]
    fn test_unknown_option_rejected() {
        let err = serde_json::from_str::<ScoringOptions>(r#"{"filter_claims": true, "bogus": 1}"#);
        assert!(err.is_err());
    }
}
