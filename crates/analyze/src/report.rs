//! ConstraintReport: per-GHM duration constraints of one table index,
//! crossed with the GHS rules of each GHM, plus notable findings.

use crate::constraints::{format_durations, ConstraintMap, DurationMask};
use pmsi_tables::{Date, GhmCode, GhsCode, Sector, TableIndex};
use serde::Serialize;

/// Severity level for a report finding.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub enum FindingSeverity {
    Info,
    Warning,
}

/// A notable finding.
#[derive(Debug, Clone, Serialize)]
pub struct Finding {
    pub severity: FindingSeverity,
    pub message: String,
    pub ghm: Option<GhmCode>,
    pub details: Option<serde_json::Value>,
}

/// One GHS rule of a GHM and the durations it can price.
#[derive(Debug, Clone, Serialize)]
pub struct GhsRow {
    pub ghs: GhsCode,
    pub minimum_duration: i32,
    pub durations: DurationMask,
    pub prefer_cmd28: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct GhmRow {
    pub ghm: GhmCode,
    pub durations: DurationMask,
    /// Human-readable form of `durations`.
    pub ranges: String,
    pub ghs: Vec<GhsRow>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConstraintReport {
    pub start: Date,
    pub end: Date,
    pub sector: Sector,
    pub incomplete: bool,
    pub rows: Vec<GhmRow>,
    pub findings: Vec<Finding>,
}

impl ConstraintReport {
    /// Builds the report of `map`, computed from `index`.
    pub fn new(index: &TableIndex, map: &ConstraintMap, sector: Sector) -> Self {
        let rows = map
            .constraints
            .values()
            .map(|constraint| GhmRow {
                ghm: constraint.ghm,
                durations: constraint.durations,
                ranges: format_durations(constraint.durations),
                ghs: index
                    .find_compatible_ghs(constraint.ghm)
                    .iter()
                    .map(|rule| GhsRow {
                        ghs: rule.ghs(sector),
                        minimum_duration: rule.minimum_duration,
                        durations: constraint.durations_from(rule.minimum_duration),
                        prefer_cmd28: constraint.prefer_cmd28_from(rule.minimum_duration),
                    })
                    .collect(),
            })
            .collect();

        let mut report = ConstraintReport {
            start: index.limit_dates[0],
            end: index.limit_dates[1],
            sector,
            incomplete: map.incomplete,
            rows,
            findings: Vec::new(),
        };
        report.extract_findings();
        report
    }

    /// Extract findings from the rows.
    pub fn extract_findings(&mut self) {
        self.findings.clear();

        if self.incomplete {
            self.findings.push(Finding {
                severity: FindingSeverity::Warning,
                message: "Some decision tree tests could not be specialized, durations may be too wide"
                    .to_string(),
                ghm: None,
                details: None,
            });
        }

        for row in &self.rows {
            // GHS rules that can never apply
            let dead: Vec<GhsCode> = row
                .ghs
                .iter()
                .filter(|ghs| ghs.durations == 0)
                .map(|ghs| ghs.ghs)
                .collect();
            if !dead.is_empty() {
                self.findings.push(Finding {
                    severity: FindingSeverity::Info,
                    message: format!(
                        "GHM '{}' has {} GHS rule(s) no duration can reach",
                        row.ghm,
                        dead.len()
                    ),
                    ghm: Some(row.ghm),
                    details: Some(serde_json::json!({ "ghs": dead })),
                });
            }

            let cmd28: Vec<GhsCode> = row
                .ghs
                .iter()
                .filter(|ghs| ghs.prefer_cmd28)
                .map(|ghs| ghs.ghs)
                .collect();
            if !cmd28.is_empty() {
                self.findings.push(Finding {
                    severity: FindingSeverity::Warning,
                    message: format!(
                        "GHM '{}' is reachable in zero nights without sessions, prefer CMD 28",
                        row.ghm
                    ),
                    ghm: Some(row.ghm),
                    details: Some(serde_json::json!({ "ghs": cmd28 })),
                });
            }
        }
    }
}
