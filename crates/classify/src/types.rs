//! Classifier inputs, intermediate state and results.

use crate::error_set::ErrorSet;
use pmsi_stays::Stay;
use pmsi_tables::{
    Date, DiagnosisInfo, GhmCode, GhsCode, ProcedureInfo, Sector, SupplementCounters, TableIndex,
};
use serde::Serialize;
use std::borrow::Cow;

/// Options threaded through every classification call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ClassifyFlags {
    /// Also classify each stay of a multi-stay admission on its own.
    pub mono: bool,
    pub ignore_confirmation: bool,
    /// Skip the anaesthesia documentation code checks.
    pub ignore_procedure_doc: bool,
    pub ignore_procedure_extension: bool,
    pub ignore_procedure_addition: bool,
    /// Classify mono stays with their real entry and exit modes.
    pub mono_original_stay: bool,
}

/// Facts detected while resolving diagnoses, procedures and units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Markers(u8);

impl Markers {
    /// A `Z37` outcome-of-delivery diagnosis.
    pub const CHILDBIRTH_DIAGNOSIS: Markers = Markers(1 << 0);
    /// An `O80` to `O84` delivery type diagnosis.
    pub const CHILDBIRTH_TYPE: Markers = Markers(1 << 1);
    pub const CHILDBIRTH_PROCEDURE: Markers = Markers(1 << 2);
    pub const PARTIAL_UNIT: Markers = Markers(1 << 3);
    pub const MIXED_UNIT: Markers = Markers(1 << 4);

    /// Either evidence of a delivery.
    pub const CHILDBIRTH: Markers =
        Markers(Self::CHILDBIRTH_DIAGNOSIS.0 | Self::CHILDBIRTH_PROCEDURE.0);

    pub fn insert(&mut self, other: Markers) {
        self.0 |= other.0;
    }

    pub fn intersects(self, other: Markers) -> bool {
        self.0 & other.0 != 0
    }
}

impl std::ops::BitOr for Markers {
    type Output = Markers;

    fn bitor(self, rhs: Markers) -> Markers {
        Markers(self.0 | rhs.0)
    }
}

/// A stay (or the aggregate of an admission) with its derived values and
/// resolved table records.
#[derive(Debug, Clone)]
pub struct PreparedStay<'a> {
    pub stay: Cow<'a, Stay>,
    /// Nights, -1 when the dates are unusable.
    pub duration: i32,
    /// Age in years at entry, -1 when the dates are unusable.
    pub age: i32,
    pub age_days: i32,
    /// Unit authorization type, 0 when the unit has none.
    pub auth_type: i8,
    pub markers: Markers,
    pub childbirth_date: Date,

    pub main_diag_info: Option<&'a DiagnosisInfo>,
    pub linked_diag_info: Option<&'a DiagnosisInfo>,
    pub diagnoses: Vec<&'a DiagnosisInfo>,
    /// Sorted in table order; the admission list is also deduplicated.
    pub procedures: Vec<&'a ProcedureInfo>,
    /// Bit `n` set when a procedure was performed with activity `n`.
    pub proc_activities: u8,
}

impl<'a> PreparedStay<'a> {
    pub fn new(stay: Cow<'a, Stay>) -> Self {
        PreparedStay {
            stay,
            duration: 0,
            age: 0,
            age_days: 0,
            auth_type: 0,
            markers: Markers::default(),
            childbirth_date: Date::default(),
            main_diag_info: None,
            linked_diag_info: None,
            diagnoses: Vec::new(),
            procedures: Vec::new(),
            proc_activities: 0,
        }
    }

    pub(crate) fn is_death(&self) -> bool {
        self.stay.exit.mode == b'9'
    }
}

/// Everything `prepare` derives from one admission.
#[derive(Debug, Clone)]
pub struct PreparedSet<'a> {
    pub index: Option<&'a TableIndex>,
    /// The admission as a whole.
    pub prep: PreparedStay<'a>,
    pub mono_stays: &'a [Stay],
    pub mono_preps: Vec<PreparedStay<'a>>,
    /// Position of the stay whose diagnoses drive the grouping.
    pub main_prep: Option<usize>,
}

impl<'a> PreparedSet<'a> {
    pub fn new(mono_stays: &'a [Stay]) -> Self {
        PreparedSet {
            index: None,
            prep: PreparedStay::new(Cow::Owned(Stay::default())),
            mono_stays,
            mono_preps: Vec::new(),
            main_prep: None,
        }
    }
}

/// Caller-owned state reused across admissions: the prepared set and the
/// error accumulators. Give each worker its own.
#[derive(Debug)]
pub struct Scratch<'a> {
    pub set: PreparedSet<'a>,
    pub errors: ErrorSet,
    pub mono_errors: ErrorSet,
}

impl<'a> Scratch<'a> {
    pub fn new() -> Self {
        Scratch {
            set: PreparedSet::new(&[]),
            errors: ErrorSet::default(),
            mono_errors: ErrorSet::default(),
        }
    }
}

impl Default for Scratch<'_> {
    fn default() -> Self {
        Self::new()
    }
}

/// Classification of one admission, or of one stay in mono mode.
#[derive(Debug, Clone, Serialize)]
pub struct ClassifyResult<'a> {
    #[serde(skip)]
    pub index: Option<&'a TableIndex>,
    #[serde(skip)]
    pub stays: &'a [Stay],

    pub bill_id: i32,
    pub stays_count: usize,
    pub main_stay_idx: Option<usize>,
    pub duration: i32,
    pub ghs_duration: i32,
    pub age: i32,
    pub sector: Sector,

    pub ghm: GhmCode,
    /// GHM used to select the GHS when it differs from `ghm` (RAAC).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ghm_for_ghs: Option<GhmCode>,
    pub main_error: i16,
    pub errors: ErrorSet,
    pub ghs: GhsCode,
    #[serde(skip_serializing_if = "SupplementCounters::is_empty")]
    pub supplement_days: SupplementCounters<i32>,
}

impl<'a> ClassifyResult<'a> {
    pub(crate) fn new(stays: &'a [Stay], sector: Sector) -> Self {
        ClassifyResult {
            index: None,
            stays,
            bill_id: stays.first().map_or(0, |stay| stay.bill_id),
            stays_count: stays.len(),
            main_stay_idx: None,
            duration: -1,
            ghs_duration: -1,
            age: -1,
            sector,
            ghm: GhmCode::default(),
            ghm_for_ghs: None,
            main_error: 0,
            errors: ErrorSet::default(),
            ghs: GhsCode::NONE,
            supplement_days: SupplementCounters::default(),
        }
    }

    /// GHM that was used to pick the GHS.
    pub fn ghs_ghm(&self) -> GhmCode {
        self.ghm_for_ghs.unwrap_or(self.ghm)
    }
}
