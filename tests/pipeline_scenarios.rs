//! End-to-end scoring scenarios over the fixture reference tables

use std::path::{Path, PathBuf};

use raf_rs::parser::ClaimParser;
use raf_rs::types::DualStatus;
use raf_rs::{Demographics, ModelVariant, RafPipeline, ScoringOptions, Sex, TableConfig};

fn fixture_tables() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/tables")
}

fn v28_pipeline() -> RafPipeline {
    let config = TableConfig::from_dir(fixture_tables(), 2026, ModelVariant::V28);
    RafPipeline::new(ModelVariant::V28, &config, ScoringOptions::default()).unwrap()
}

fn esrd_pipeline() -> RafPipeline {
    let config = TableConfig::from_dir(fixture_tables(), 2026, ModelVariant::EsrdV24);
    RafPipeline::new(ModelVariant::EsrdV24, &config, ScoringOptions::default()).unwrap()
}

/// A one-claim professional envelope carrying the scenario-1 diagnoses on
/// an eligible office visit.
fn professional_envelope() -> String {
    [
        "ISA*00*          *00*          *ZZ*SUBMITTERID    *ZZ*RECEIVERID     \
         *260110*0930*^*00501*000000101*0*P*:",
        "GS*HC*SENDER*RECEIVER*20260110*0930*101*X*005010X222A1",
        "ST*837*0101*005010X222A1",
        "BHT*0019*00*SCORE1*20260110*0930*CH",
        "NM1*85*2*PRIMARY CARE GROUP*****XX*1234567890",
        "HL*1**20*1",
        "HL*2*1*22*0",
        "SBR*P*18*******MB",
        "NM1*IL*1*DOE*JANE****MI*123456789A",
        "CLM*SCORE1*150***11:B:1*Y*A*Y*Y",
        "HI*ABK:E11.9*ABF:I10*ABF:N18.3",
        "NM1*82*1*SMITH*JOHN****XX*1999999984",
        "LX*1",
        "SV1*HC:99214*125*UN*1***1:2:3",
        "DTP*472*D8*20260110",
        "SE*14*0101",
        "GE*1*101",
        "IEA*1*000000101",
    ]
    .join("~")
        + "~"
}

#[test]
fn scenario_community_aged_non_dual() {
    let pipeline = v28_pipeline();
    let demo = Demographics::new(67, Sex::Female);
    let result = pipeline
        .calculate_from_diagnosis(&["E11.9", "I10", "N18.3"], &demo)
        .unwrap();

    assert_eq!(result.hcc_list, vec![38, 227, 329]);
    assert!(result.unmapped_diagnoses.is_empty());
    assert!(result.risk_score > 0.0);

    // CNA column: F65_69 + HCC38 + HCC227 + HCC329 + the D3 count bucket
    assert_eq!(result.coefficients.get("F65_69"), Some(&0.395));
    assert_eq!(result.coefficients.get("HCC38"), Some(&0.166));
    assert_eq!(result.interactions.get("D3"), Some(&0.035));
    assert!((result.risk_score - 0.924).abs() < 1e-9);
    assert!((result.risk_score_demographics - 0.395).abs() < 1e-9);
    assert!((result.risk_score_hcc - 0.494).abs() < 1e-9);
    // HCC227 carries no chronic flag
    assert!((result.risk_score_chronic_only - 0.293).abs() < 1e-9);
    assert_eq!(result.model_name, "CMS-HCC Model V28");
}

#[test]
fn scenario_disabled_full_dual_fires_diabetes_chf() {
    let pipeline = v28_pipeline();
    let mut demo = Demographics::new(45, Sex::Female);
    demo.dual_eligibility = DualStatus::Full;
    demo.orig_disabled = true;
    let result = pipeline
        .calculate_from_diagnosis(&["E11.9", "I50.9"], &demo)
        .unwrap();

    assert_eq!(result.hcc_list, vec![38, 226]);
    assert!(result.interactions.contains_key("DIABETES_CHF"));
    // CFD column: F45_54 + HCC38 + HCC226 + DIABETES_CHF; under 65 means
    // no OriginallyDisabled modifier
    assert!((result.risk_score - (0.318 + 0.302 + 0.448 + 0.154)).abs() < 1e-9);
    assert!(!result.coefficients.contains_key("OriginallyDisabled_Female"));
}

#[test]
fn scenario_duplicate_diagnosis_is_idempotent() {
    let pipeline = v28_pipeline();
    let demo = Demographics::new(75, Sex::Female);
    let once = pipeline.calculate_from_diagnosis(&["E11.9"], &demo).unwrap();
    let twice = pipeline
        .calculate_from_diagnosis(&["E11.9", "E11.9"], &demo)
        .unwrap();
    assert_eq!(once, twice);
    assert!((once.risk_score - (0.562 + 0.166)).abs() < 1e-9);
}

#[test]
fn scenario_new_enrollee_scores_without_hccs() {
    let pipeline = v28_pipeline();
    let mut demo = Demographics::new(70, Sex::Male);
    demo.new_enrollee = true;
    let result = pipeline
        .calculate_from_diagnosis(&["E11.9", "I50.9", "N18.4"], &demo)
        .unwrap();

    assert!(result.hcc_list.is_empty());
    assert!(result.coefficients.keys().all(|k| !k.starts_with("HCC")));
    assert_eq!(result.coefficients.get("M70_74"), Some(&0.536));
    assert!((result.risk_score - 0.536).abs() < 1e-9);
}

#[test]
fn scenario_esrd_graft_window() {
    let pipeline = esrd_pipeline();
    let mut demo = Demographics::new(72, Sex::Male);
    demo.esrd = true;
    demo.graft_months = Some(2);
    let result = pipeline.calculate_from_diagnosis(&["N18.6"], &demo).unwrap();

    // GRAFT_0_3 column is demographic-only in the fixtures; the HCC row
    // miss is recorded, not fatal
    assert_eq!(result.coefficients.get("M70_74"), Some(&1.013));
    assert!((result.risk_score - 1.013).abs() < 1e-9);
    assert_eq!(result.hcc_list, vec![136]);
    assert_eq!(result.coefficients_missing, vec!["HCC136"]);
}

#[test]
fn scenario_esrd_dialysis_fallback() {
    let pipeline = esrd_pipeline();
    let mut demo = Demographics::new(72, Sex::Male);
    demo.esrd = true;
    demo.graft_months = Some(10);
    let result = pipeline.calculate_from_diagnosis(&["N18.6"], &demo).unwrap();

    // ten or more graft months falls back to the dialysis column
    assert_eq!(result.coefficients.get("M70_74"), Some(&0.978));
    assert_eq!(result.coefficients.get("HCC136"), Some(&0.372));
    assert!((result.risk_score - (0.978 + 0.372)).abs() < 1e-9);
}

#[test]
fn scenario_hierarchy_suppression_and_reappearance() {
    let pipeline = v28_pipeline();
    let demo = Demographics::new(67, Sex::Female);

    let both = pipeline
        .calculate_from_diagnosis(&["N18.4", "N18.3"], &demo)
        .unwrap();
    assert_eq!(both.hcc_list, vec![327]);
    assert!((both.risk_score - (0.395 + 0.383)).abs() < 1e-9);

    let without_parent = pipeline.calculate_from_diagnosis(&["N18.3"], &demo).unwrap();
    assert_eq!(without_parent.hcc_list, vec![329]);
    assert!((without_parent.risk_score - (0.395 + 0.127)).abs() < 1e-9);
}

#[test]
fn invariant_score_decomposition_adds_up() {
    let pipeline = v28_pipeline();
    let demo = Demographics::new(67, Sex::Female);
    let result = pipeline
        .calculate_from_diagnosis(&["E11.9", "I10", "N18.3", "D84.9", "C34.90"], &demo)
        .unwrap();

    let interaction_sum: f64 = result.interactions.values().sum();
    let recomposed = result.risk_score_demographics + result.risk_score_hcc + interaction_sum;
    assert!((result.risk_score - recomposed).abs() < 1e-9);
    assert!(result.risk_score_chronic_only <= result.risk_score_hcc + 1e-9);
}

#[test]
fn invariant_hcc_list_is_subset_of_mapper_output() {
    let pipeline = v28_pipeline();
    let demo = Demographics::new(67, Sex::Female);
    let result = pipeline
        .calculate_from_diagnosis(&["N18.6", "N18.4", "N18.3", "E11.9"], &demo)
        .unwrap();

    for hcc in &result.hcc_list {
        assert!(result.cc_to_dx.contains_key(hcc));
    }
    // 326 dominates the whole CKD family
    assert_eq!(result.hcc_list, vec![38, 326]);
    assert_eq!(result.cc_to_dx.len(), 4);
}

#[test]
fn invariant_permutation_stability() {
    let pipeline = v28_pipeline();
    let demo = Demographics::new(67, Sex::Female);
    let orders: [&[&str]; 3] = [
        &["E11.9", "I50.9", "C34.90", "D84.9"],
        &["D84.9", "C34.90", "I50.9", "E11.9"],
        &["I50.9", "D84.9", "E11.9", "C34.90"],
    ];
    let scores: Vec<_> = orders
        .iter()
        .map(|dxs| pipeline.calculate_from_diagnosis(dxs, &demo).unwrap())
        .collect();

    for result in &scores[1..] {
        assert_eq!(result.risk_score.to_bits(), scores[0].risk_score.to_bits());
        assert_eq!(result.hcc_list, scores[0].hcc_list);
    }
}

#[test]
fn invariant_suppressed_diagnosis_adds_nothing() {
    let pipeline = v28_pipeline();
    let demo = Demographics::new(67, Sex::Female);
    let parent_only = pipeline.calculate_from_diagnosis(&["N18.4"], &demo).unwrap();
    let with_child = pipeline
        .calculate_from_diagnosis(&["N18.4", "N18.3"], &demo)
        .unwrap();
    assert_eq!(parent_only.risk_score.to_bits(), with_child.risk_score.to_bits());
    assert_eq!(parent_only.hcc_list, with_child.hcc_list);
}

#[test]
fn boundary_empty_diagnosis_list() {
    let pipeline = v28_pipeline();
    let demo = Demographics::new(67, Sex::Female);
    let result = pipeline.calculate_from_diagnosis::<&str>(&[], &demo).unwrap();

    assert!(result.hcc_list.is_empty());
    assert!(result.diagnosis_codes.is_empty());
    assert!((result.risk_score - 0.395).abs() < 1e-9);
    assert_eq!(result.risk_score, result.risk_score_demographics);
}

#[test]
fn boundary_ages() {
    let pipeline = v28_pipeline();

    // age 0 lands in the disabled community segment, which the fixture
    // coefficient table has no column for; the miss is traced, score 0
    let infant = pipeline
        .calculate_from_diagnosis::<&str>(&[], &Demographics::new(0, Sex::Female))
        .unwrap();
    assert_eq!(infant.risk_score, 0.0);
    assert_eq!(infant.coefficients_missing, vec!["F0_34"]);

    let oldest = pipeline
        .calculate_from_diagnosis::<&str>(&[], &Demographics::new(120, Sex::Female))
        .unwrap();
    assert_eq!(oldest.coefficients.get("F95_GT"), Some(&0.867));
}

#[test]
fn boundary_unmapped_diagnosis_is_traced() {
    let pipeline = v28_pipeline();
    let demo = Demographics::new(67, Sex::Female);
    let result = pipeline.calculate_from_diagnosis(&["Z00.00"], &demo).unwrap();

    assert_eq!(result.unmapped_diagnoses, vec!["Z0000"]);
    assert!(result.hcc_list.is_empty());
    assert!((result.risk_score - 0.395).abs() < 1e-9);
}

#[test]
fn boundary_two_diagnoses_one_cc() {
    let pipeline = v28_pipeline();
    let demo = Demographics::new(67, Sex::Female);
    let result = pipeline
        .calculate_from_diagnosis(&["I50.9", "I13.0"], &demo)
        .unwrap();

    assert_eq!(result.hcc_list, vec![226]);
    assert_eq!(
        result.cc_to_dx.get(&226).unwrap(),
        &vec!["I509".to_string(), "I130".to_string()]
    );
    // one HCC coefficient despite two source diagnoses
    assert!((result.risk_score_hcc - 0.360).abs() < 1e-9);
}

#[test]
fn low_income_and_originally_disabled_modifiers() {
    let pipeline = v28_pipeline();
    let mut demo = Demographics::new(67, Sex::Female);
    demo.orig_disabled = true;
    demo.low_income = true;
    let result = pipeline.calculate_from_diagnosis::<&str>(&[], &demo).unwrap();

    assert_eq!(
        result.coefficients.get("OriginallyDisabled_Female"),
        Some(&0.160)
    );
    assert_eq!(result.coefficients.get("LowIncome"), Some(&0.041));
    assert!((result.risk_score - (0.395 + 0.160 + 0.041)).abs() < 1e-9);
}

#[test]
fn rx_model_scores_from_its_own_rows() {
    let dir = fixture_tables();
    let config = TableConfig {
        dx_cc_table: dir.join("ra_dx_to_cc_2026.csv"),
        hierarchy_table: dir.join("ra_hierarchies_v28.csv"),
        coefficient_table: dir.join("ra_coefficients_2026.csv"),
        procedure_table: dir.join("ra_eligible_cpt_hcpcs_2026.csv"),
        interaction_table: dir.join("ra_interactions_v28.csv"),
        chronic_flags_table: dir.join("hcc_is_chronic.csv"),
    };
    let pipeline =
        RafPipeline::new(ModelVariant::RxHccV08, &config, ScoringOptions::default()).unwrap();
    let demo = Demographics::new(67, Sex::Female);
    let result = pipeline
        .calculate_from_diagnosis(&["E11.9", "I10"], &demo)
        .unwrap();

    // the Rx mapping rows, not the V28 ones: E119 -> 30, I10 -> 187
    assert_eq!(result.hcc_list, vec![30, 187]);
    assert!((result.risk_score - (0.243 + 0.142 + 0.175)).abs() < 1e-9);
}

#[test]
fn service_pipeline_idempotent_with_direct_records() {
    let pipeline = v28_pipeline();
    let demo = Demographics::new(67, Sex::Female);
    let envelope = professional_envelope();

    let from_raw = pipeline.run(&[envelope.as_str()], &demo).unwrap();
    let records = ClaimParser::parse_str(&envelope).unwrap();
    let from_records = pipeline.run_from_service_records(records, &demo).unwrap();

    assert_eq!(from_raw, from_records);
    // the envelope carries the scenario-1 diagnoses on an eligible visit
    assert!((from_raw.risk_score - 0.924).abs() < 1e-9);
    assert_eq!(from_raw.service_level_data.as_ref().unwrap().len(), 1);
}

#[test]
fn ineligible_procedure_contributes_no_diagnoses() {
    let pipeline = v28_pipeline();
    let demo = Demographics::new(67, Sex::Female);
    let envelope = professional_envelope().replace("HC:99214", "HC:99999");

    let result = pipeline.run(&[envelope.as_str()], &demo).unwrap();
    assert!(result.hcc_list.is_empty());
    assert!(result.diagnosis_codes.is_empty());
    assert!((result.risk_score - 0.395).abs() < 1e-9);
    assert_eq!(result.service_level_data.as_ref().unwrap().len(), 0);
}

#[test]
fn filter_disabled_keeps_ineligible_records() {
    let dir = fixture_tables();
    let config = TableConfig::from_dir(dir, 2026, ModelVariant::V28);
    let options = ScoringOptions {
        filter_claims: false,
        ..Default::default()
    };
    let pipeline = RafPipeline::new(ModelVariant::V28, &config, options).unwrap();
    let demo = Demographics::new(67, Sex::Female);
    let envelope = professional_envelope().replace("HC:99214", "HC:99999");

    let result = pipeline.run(&[envelope.as_str()], &demo).unwrap();
    assert_eq!(result.hcc_list, vec![38, 227, 329]);
}

#[test]
fn esrd_model_requires_esrd_flag() {
    let pipeline = esrd_pipeline();
    let demo = Demographics::new(72, Sex::Male);
    assert!(pipeline.calculate_from_diagnosis(&["N18.6"], &demo).is_err());
}

#[test]
fn result_serializes_with_sorted_keys() {
    let pipeline = v28_pipeline();
    let demo = Demographics::new(67, Sex::Female);
    let result = pipeline
        .calculate_from_diagnosis(&["N18.3", "E11.9", "I10"], &demo)
        .unwrap();

    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["model_name"], "CMS-HCC Model V28");
    assert_eq!(json["hcc_list"], serde_json::json!([38, 227, 329]));
    // map keys serialize sorted because the fields are BTreeMaps
    let keys: Vec<&String> = json["coefficients"].as_object().unwrap().keys().collect();
    let mut sorted = keys.clone();
    sorted.sort();
    assert_eq!(keys, sorted);
}
