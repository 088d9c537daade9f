//! Hierarchical condition category suppression

use std::collections::HashSet;

use crate::tables::ReferenceTables;

/// Apply the model's hierarchy edges: a CC is dropped when any CC present
/// in the input set names it as a child.
///
/// The edge table is expected to already encode the transitive closure the
/// model authors intend, so no closure is computed here; a parent that is
/// itself suppressed still suppresses its children, which is exactly the
/// published CMS semantics. The operation is deterministic and independent
/// of input order.
pub fn apply_hierarchies(tables: &ReferenceTables, ccs: &HashSet<u32>) -> HashSet<u32> {
    let mut suppressed: HashSet<u32> = HashSet::new();
    for &parent in ccs {
        for &child in tables.children_of(parent) {
            if ccs.contains(&child) {
                suppressed.insert(child);
            }
        }
    }
    ccs.difference(&suppressed).copied().collect()
}
