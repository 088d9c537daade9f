//! Diagnosis-to-condition-category mapping

use std::collections::{BTreeMap, HashSet};

use crate::tables::ReferenceTables;

/// Mapper output: the CC set plus the traces the result builder needs.
#[derive(Debug, Default)]
pub struct MappedDiagnoses {
    /// Every mapped CC and the diagnoses that produced it, in input order
    pub cc_to_dx: BTreeMap<u32, Vec<String>>,
    /// The distinct CC set fed into the hierarchy stage
    pub ccs: HashSet<u32>,
    /// Diagnoses with no row for the active model, first-seen order
    pub unmapped: Vec<String>,
}

/// Join normalized, de-duplicated diagnosis codes against the model's
/// mapping table. A diagnosis may map to zero CCs (recorded in `unmapped`)
/// or several; two diagnoses may share a CC. Lookup cannot fail.
pub fn map_diagnoses(tables: &ReferenceTables, diagnoses: &[String]) -> MappedDiagnoses {
    let mut mapped = MappedDiagnoses::default();
    for dx in diagnoses {
        match tables.ccs_for(dx) {
            Some(ccs) => {
                for &cc in ccs {
                    mapped.ccs.insert(cc);
                    let dxs = mapped.cc_to_dx.entry(cc).or_default();
                    if !dxs.contains(dx) {
                        dxs.push(dx.clone());
                    }
                }
            }
            None => mapped.unmapped.push(dx.clone()),
        }
    }
    mapped
}
