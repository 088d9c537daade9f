//! Interaction engine
//!
//! Evaluates every interaction definition loaded for the active variant
//! against the surviving CC set and the demographic flags. Predicates are
//! parsed at table load and evaluated here without side effects; the names
//! of the definitions that fire join the contributing variable set.

use std::collections::HashSet;

use tracing::debug;

use crate::tables::expression::EvalContext;
use crate::tables::ReferenceTables;
use crate::types::Demographics;

/// Names of the interaction variables whose predicates hold, in table
/// order. Callers scoring a new-enrollee layout pass an empty CC set so
/// only purely demographic definitions can fire.
pub fn evaluate_interactions(
    tables: &ReferenceTables,
    ccs: &HashSet<u32>,
    demographics: &Demographics,
    institutional: bool,
) -> Vec<String> {
    let ctx = EvalContext {
        ccs,
        demographics,
        institutional,
    };
    let fired: Vec<String> = tables
        .interactions()
        .iter()
        .filter(|def| def.expr.evaluate(&ctx))
        .map(|def| def.name.clone())
        .collect();
    if !fired.is_empty() {
        debug!(?fired, "interaction variables fired");
    }
    fired
}
