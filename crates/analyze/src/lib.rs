//! MCO rule table analysis.
//!
//! Derives, once per table index, the stay durations that can lead to each
//! GHM by walking the decision tree, and reports them against the GHS rules
//! of each GHM. Classification never depends on this analysis.

pub mod constraints;
pub mod report;

pub use constraints::{
    compute_constraints, format_durations, ConstraintError, ConstraintMap, ConstraintWarnings,
    DurationMask, GhmConstraint, FULL_MASK, MAX_DURATION,
};
pub use report::{ConstraintReport, Finding, FindingSeverity, GhmRow, GhsRow};

use pmsi_tables::{Sector, TableIndex};

/// Computes the constraints of `index` and builds their report.
pub fn analyze(index: &TableIndex, sector: Sector) -> Result<ConstraintReport, ConstraintError> {
    let map = compute_constraints(index)?;
    Ok(ConstraintReport::new(index, &map, sector))
}
