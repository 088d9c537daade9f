//! Coefficient lookup and deterministic summation
//!
//! Every contributing variable (age-sex cell, demographic modifiers, one
//! `HCC<n>` per surviving CC, fired interactions) is looked up in the
//! active segment's coefficient column and summed. Variable names are
//! sorted lexicographically and summed left to right so the IEEE-754
//! result is bit-identical across platforms and input orderings.

use std::collections::BTreeMap;

use crate::tables::ReferenceTables;

use super::segment::SegmentProfile;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VariableKind {
    Demographic,
    Hcc(u32),
    Interaction,
}

/// The summed score with its decomposition and traces.
#[derive(Debug, Default)]
pub struct ScoreBreakdown {
    /// Variables that found a coefficient, with the value applied
    pub coefficients: BTreeMap<String, f64>,
    /// Fired interactions and the coefficient each contributed (0 when the
    /// segment has no row for it)
    pub interactions: BTreeMap<String, f64>,
    /// Variables with no coefficient row, lexicographic order
    pub missing: Vec<String>,
    /// Total risk adjustment factor
    pub risk_score: f64,
    /// Sum over demographic variables
    pub demographics_component: f64,
    /// Sum over all HCC variables
    pub hcc_component: f64,
    /// Sum over chronic-flagged HCC variables
    pub chronic_component: f64,
}

/// Sum the coefficients for all contributing variables within `segment`.
///
/// `hccs` is the surviving CC list; callers scoring a new-enrollee layout
/// pass it empty. Missing `(segment, variable)` rows contribute 0 and are
/// recorded rather than failing the call.
pub fn sum_coefficients(
    tables: &ReferenceTables,
    profile: &SegmentProfile,
    hccs: &[u32],
    fired_interactions: &[String],
) -> ScoreBreakdown {
    let mut variables: Vec<(String, VariableKind)> = Vec::new();
    variables.push((profile.age_sex_cell.clone(), VariableKind::Demographic));
    for modifier in &profile.modifier_variables {
        variables.push((modifier.clone(), VariableKind::Demographic));
    }
    for &cc in hccs {
        variables.push((format!("HCC{cc}"), VariableKind::Hcc(cc)));
    }
    for name in fired_interactions {
        variables.push((name.clone(), VariableKind::Interaction));
    }

    // stable summation order regardless of how the inputs arrived
    variables.sort_by(|a, b| a.0.cmp(&b.0));

    let mut breakdown = ScoreBreakdown::default();
    for (name, kind) in variables {
        let value = match tables.coefficient(&profile.segment, &name) {
            Some(value) => {
                breakdown.coefficients.insert(name.clone(), value);
                value
            }
            None => {
                breakdown.missing.push(name.clone());
                0.0
            }
        };

        breakdown.risk_score += value;
        match kind {
            VariableKind::Demographic => breakdown.demographics_component += value,
            VariableKind::Hcc(cc) => {
                breakdown.hcc_component += value;
                if tables.is_chronic(cc) {
                    breakdown.chronic_component += value;
                }
            }
            VariableKind::Interaction => {
                breakdown.interactions.insert(name, value);
            }
        }
    }
    breakdown
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tables::{ReferenceTables, TableConfig};
    use crate::types::ModelVariant;
    use std::io::Write;
    use std::sync::Arc;

    fn tables() -> Arc<ReferenceTables> {
        let dir = tempfile::tempdir().unwrap();
        let write = |name: &str, content: &str| {
            let mut f = std::fs::File::create(dir.path().join(name)).unwrap();
            f.write_all(content.as_bytes()).unwrap();
        };
        write("ra_dx_to_cc_2026.csv", "diagnosis_code,cc,model_name\n");
        write("ra_hierarchies_v28.csv", "parent_cc,child_cc\n");
        write(
            "ra_coefficients_2026.csv",
            "model_name,segment,variable,coefficient\n\
             V28,CNA,F65_69,0.395\n\
             V28,CNA,HCC38,0.166\n\
             V28,CNA,HCC226,0.360\n\
             V28,CNA,OriginallyDisabled_Female,0.160\n\
             V28,CNA,DIABETES_CHF,0.121\n",
        );
        write("ra_eligible_cpt_hcpcs_2026.csv", "code\n");
        write("ra_interactions_v28.csv", "variable,expression\n");
        write("hcc_is_chronic.csv", "cc,is_chronic\n38,1\n226,0\n");
        let config = TableConfig::from_dir(dir.path(), 2026, ModelVariant::V28);
        ReferenceTables::load(ModelVariant::V28, &config).unwrap()
    }

    fn profile() -> SegmentProfile {
        SegmentProfile {
            segment: "CNA".to_string(),
            age_sex_cell: "F65_69".to_string(),
            modifier_variables: vec!["OriginallyDisabled_Female".to_string()],
        }
    }

    #[test]
    fn test_decomposition_adds_up() {
        let tables = tables();
        let breakdown = sum_coefficients(
            &tables,
            &profile(),
            &[38, 226],
            &["DIABETES_CHF".to_string()],
        );

        assert!((breakdown.demographics_component - 0.555).abs() < 1e-9);
        assert!((breakdown.hcc_component - 0.526).abs() < 1e-9);
        assert!((breakdown.chronic_component - 0.166).abs() < 1e-9);
        assert!((breakdown.risk_score - (0.555 + 0.526 + 0.121)).abs() < 1e-9);
        assert_eq!(breakdown.interactions.get("DIABETES_CHF"), Some(&0.121));
        assert!(breakdown.missing.is_empty());
    }

    #[test]
    fn test_missing_coefficients_contribute_zero() {
        let tables = tables();
        let breakdown = sum_coefficients(&tables, &profile(), &[38, 999], &[]);

        assert_eq!(breakdown.missing, vec!["HCC999"]);
        assert!((breakdown.hcc_component - 0.166).abs() < 1e-9);
        assert!(!breakdown.coefficients.contains_key("HCC999"));
    }

    #[test]
    fn test_summation_is_order_independent() {
        let tables = tables();
        let a = sum_coefficients(&tables, &profile(), &[226, 38], &[]);
        let b = sum_coefficients(&tables, &profile(), &[38, 226], &[]);
        assert_eq!(a.risk_score.to_bits(), b.risk_score.to_bits());
    }
}
