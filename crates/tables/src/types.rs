//! Typed rule table records and the per-type containers built from them.
//!
//! Containers own their records plus the lookup maps needed by the
//! classifier. Maps point at the first record for a key; records sharing a
//! key are contiguous, so lookups return slices.

use crate::codes::{
    DiagnosisCode, GhmCode, GhmRootCode, GhsCode, ListMask, ProcedureCode, SupplementCounters,
};
use crate::date::Date;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

// ──────────────────────────────────────────────
// Table metadata
// ──────────────────────────────────────────────

/// Every table type the store knows how to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum TableType {
    GhmDecisionTree,
    DiagnosisTable,
    ProcedureTable,
    ProcedureAdditionTable,
    ProcedureExtensionTable,
    GhmRootTable,
    SeverityTable,
    GhmToGhsTable,
    AuthorizationTable,
    SrcPairTable,
    PriceTablePublic,
    PriceTablePrivate,
    GhsMinorationTable,
}

impl TableType {
    pub const COUNT: usize = 13;

    pub const ALL: [TableType; TableType::COUNT] = [
        TableType::GhmDecisionTree,
        TableType::DiagnosisTable,
        TableType::ProcedureTable,
        TableType::ProcedureAdditionTable,
        TableType::ProcedureExtensionTable,
        TableType::GhmRootTable,
        TableType::SeverityTable,
        TableType::GhmToGhsTable,
        TableType::AuthorizationTable,
        TableType::SrcPairTable,
        TableType::PriceTablePublic,
        TableType::PriceTablePrivate,
        TableType::GhsMinorationTable,
    ];

    /// Maps the 8-character name found in binary table headers.
    pub fn from_raw_name(name: &str) -> Option<TableType> {
        match name {
            "ARBREDEC" => Some(TableType::GhmDecisionTree),
            "DIAG10CR" => Some(TableType::DiagnosisTable),
            "CCAMCARA" => Some(TableType::ProcedureTable),
            "RGHMINFO" => Some(TableType::GhmRootTable),
            "GHSINFO" => Some(TableType::GhmToGhsTable),
            "TABCOMBI" => Some(TableType::SeverityTable),
            "GESTCOMP" => Some(TableType::ProcedureAdditionTable),
            "CCAMDESC" => Some(TableType::ProcedureExtensionTable),
            "AUTOREFS" => Some(TableType::AuthorizationTable),
            "SRCDGACT" => Some(TableType::SrcPairTable),
            "GHSMINOR" => Some(TableType::GhsMinorationTable),
            _ => None,
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn label(self) -> &'static str {
        match self {
            TableType::GhmDecisionTree => "GHM Decision Tree",
            TableType::DiagnosisTable => "Diagnosis Table",
            TableType::ProcedureTable => "Procedure Table",
            TableType::ProcedureAdditionTable => "Procedure Addition Table",
            TableType::ProcedureExtensionTable => "Procedure Extension Table",
            TableType::GhmRootTable => "GHM Root Table",
            TableType::SeverityTable => "Severity Table",
            TableType::GhmToGhsTable => "GHM To GHS Table",
            TableType::AuthorizationTable => "Authorization Table",
            TableType::SrcPairTable => "SRC Pair Table",
            TableType::PriceTablePublic => "Price Table (public)",
            TableType::PriceTablePrivate => "Price Table (private)",
            TableType::GhsMinorationTable => "GHS Minoration Table",
        }
    }
}

impl fmt::Display for TableType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One fixed-stride section, with its offset already made absolute.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableSection {
    pub raw_offset: usize,
    pub raw_len: usize,
    pub values_count: usize,
    pub value_len: usize,
}

/// Header information for one table found in a file.
#[derive(Debug, Clone, Serialize)]
pub struct TableInfo {
    pub filename: String,
    pub build_date: Date,
    pub version: [u16; 2],
    pub limit_dates: [Date; 2],
    pub raw_type: String,
    pub table_type: TableType,
    #[serde(skip)]
    pub sections: Vec<TableSection>,
}

// ──────────────────────────────────────────────
// Decision tree
// ──────────────────────────────────────────────

/// Operations of decision tree test nodes, named after what they test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GhmTest {
    /// Functions 0 and 1: returns byte `params[0]` of the main diagnosis.
    MainDiagnosisByte,
    /// Function 2.
    AnyProcedureMask,
    /// Function 3: age in years above `params[0]`, or in days when `params[1] == 1`.
    AgeAbove,
    /// Function 5.
    MainDiagnosisMask,
    /// Function 6: any diagnosis other than the main and linked ones.
    OtherDiagnosisMask,
    /// Function 7.
    AnyDiagnosisMask,
    /// Function 9: every major procedure matches (and there is at least one).
    MajorProceduresMask,
    /// Function 10: at least two distinct procedures match.
    TwoProceduresMask,
    /// Function 13.
    MainDiagnosisByteEquals,
    /// Function 14.
    Sex,
    /// Function 18: at least two distinct matching diagnoses, not all of them main/linked.
    TwoDiagnosesMask,
    /// Function 19: exit mode, exit destination, entry mode or entry origin.
    ModeOrOrigin,
    /// Function 22.
    DurationBelow,
    /// Function 26.
    LinkedDiagnosisMask,
    /// Function 28.
    SetError,
    /// Function 29.
    DurationEquals,
    /// Function 30.
    SessionCountEquals,
    /// Function 33.
    ProcedureActivity,
    /// Function 34.
    SwapLinkedDiagnosis,
    /// Function 35.
    LinkedDiagnosisSwapped,
    /// Function 36.
    DiagnosisMaskExceptLinked,
    /// Function 38.
    GnnBetween,
    /// Function 39.
    ComputeGnn,
    /// Function 40.
    ClearNeonatalErrors,
    /// Function 41.
    DiagnosisCategory,
    /// Function 42.
    NewbornWeightBelow,
    /// Function 43.
    DiagnosisCategoryExceptLinked,
}

impl GhmTest {
    pub fn from_function(function: u8) -> Option<GhmTest> {
        let test = match function {
            0 | 1 => GhmTest::MainDiagnosisByte,
            2 => GhmTest::AnyProcedureMask,
            3 => GhmTest::AgeAbove,
            5 => GhmTest::MainDiagnosisMask,
            6 => GhmTest::OtherDiagnosisMask,
            7 => GhmTest::AnyDiagnosisMask,
            9 => GhmTest::MajorProceduresMask,
            10 => GhmTest::TwoProceduresMask,
            13 => GhmTest::MainDiagnosisByteEquals,
            14 => GhmTest::Sex,
            18 => GhmTest::TwoDiagnosesMask,
            19 => GhmTest::ModeOrOrigin,
            22 => GhmTest::DurationBelow,
            26 => GhmTest::LinkedDiagnosisMask,
            28 => GhmTest::SetError,
            29 => GhmTest::DurationEquals,
            30 => GhmTest::SessionCountEquals,
            33 => GhmTest::ProcedureActivity,
            34 => GhmTest::SwapLinkedDiagnosis,
            35 => GhmTest::LinkedDiagnosisSwapped,
            36 => GhmTest::DiagnosisMaskExceptLinked,
            38 => GhmTest::GnnBetween,
            39 => GhmTest::ComputeGnn,
            40 => GhmTest::ClearNeonatalErrors,
            41 => GhmTest::DiagnosisCategory,
            42 => GhmTest::NewbornWeightBelow,
            43 => GhmTest::DiagnosisCategoryExceptLinked,
            _ => return None,
        };
        Some(test)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GhmDecisionNode {
    Test {
        test: GhmTest,
        params: [u8; 2],
        children_idx: usize,
        children_count: usize,
    },
    /// Unconditional jump to an absolute node index.
    Jump { target: usize },
    Leaf { ghm: GhmCode, error: i16 },
}

impl GhmDecisionNode {
    /// Both parameters read as one big-endian 16-bit value.
    pub fn param16(params: [u8; 2]) -> i32 {
        (i32::from(params[0]) << 8) | i32::from(params[1])
    }
}

// ──────────────────────────────────────────────
// Diagnoses and procedures
// ──────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct DiagnosisInfo {
    pub diag: DiagnosisCode,
    /// Bit 0 for sex 1, bit 1 for sex 2.
    pub sexes: u8,
    pub warnings: u16,
    pub raw: [u8; 37],
    pub cmd: u8,
    pub jump: u8,
    pub severity: i8,
    pub cma_minimum_age: i8,
    pub cma_maximum_age: i8,
    pub exclusion_set_idx: u16,
    pub cma_exclusion_mask: ListMask,
}

impl DiagnosisInfo {
    pub fn byte(&self, idx: u8) -> u8 {
        self.raw.get(usize::from(idx)).copied().unwrap_or(0)
    }

    pub fn test(&self, offset: u8, value: u8) -> bool {
        self.byte(offset) & value != 0
    }

    pub fn test_mask(&self, mask: ListMask) -> bool {
        mask.test(&self.raw)
    }
}

#[derive(Debug, Clone)]
pub struct ExclusionInfo {
    pub raw: [u8; 232],
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdditionList {
    pub offset: usize,
    pub len: usize,
}

#[derive(Debug, Clone)]
pub struct ProcedureInfo {
    pub proc: ProcedureCode,
    pub phase: i8,
    /// Bit `n` set when activity `n` is allowed.
    pub activities: u8,
    pub limit_dates: [Date; 2],
    /// Addition identifier per activity, 0 when the activity is not an addition.
    pub additions: [i16; 8],
    pub addition_list: AdditionList,
    pub extensions: u64,
    pub disabled_extensions: u64,
    pub bytes: [u8; 52],
}

impl ProcedureInfo {
    pub fn byte(&self, idx: usize) -> u8 {
        self.bytes.get(idx).copied().unwrap_or(0)
    }

    pub fn test(&self, offset: usize, value: u8) -> bool {
        self.byte(offset) & value != 0
    }

    pub fn test_mask(&self, mask: ListMask) -> bool {
        mask.test(&self.bytes)
    }

    /// Table order key; records sharing a code are contiguous.
    pub fn order_key(&self) -> (ProcedureCode, i8, Date) {
        (self.proc, self.phase, self.limit_dates[0])
    }

    pub fn activities_string(&self) -> String {
        (0..8)
            .filter(|i| self.activities & (1 << i) != 0)
            .map(|i| char::from(b'0' + i))
            .collect()
    }
}

/// Links an addition identifier to the procedure that requires it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcedureLink {
    pub proc: ProcedureCode,
    pub phase: i8,
    pub activity: i8,
    pub addition_idx: i16,
}

/// Decoded `GESTCOMP` record: `proc1` (activity 1) requires `proc2` (activity 2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcedureAdditionInfo {
    pub proc1: ProcedureCode,
    pub phase1: i8,
    pub activity1: i8,
    pub proc2: ProcedureCode,
    pub phase2: i8,
    pub activity2: i8,
}

/// Decoded `CCAMDESC` record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcedureExtensionInfo {
    pub proc: ProcedureCode,
    pub phase: i8,
    pub extension: i8,
    pub limit_dates: [Date; 2],
}

// ──────────────────────────────────────────────
// GHM roots, severity and GHS rules
// ──────────────────────────────────────────────

/// A cell matching two half-open value ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueRangeCell {
    pub limits: [(i32, i32); 2],
    pub value: i32,
}

impl ValueRangeCell {
    pub fn test(&self, idx: usize, value: i32) -> bool {
        self.limits
            .get(idx)
            .is_some_and(|&(min, max)| value >= min && value < max)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct GhmRootInfo {
    pub ghm_root: GhmRootCode,
    pub confirm_duration_threshold: i32,
    pub allow_ambulatory: bool,
    pub short_duration_threshold: i32,
    pub allow_raac: bool,
    pub gradated: bool,
    pub young_severity_limit: i32,
    pub young_age_threshold: i32,
    pub old_severity_limit: i32,
    pub old_age_threshold: i32,
    /// 1-based severity cell list for childbirth roots, 0 when unused.
    pub childbirth_severity_list: i32,
    pub cma_exclusion_mask: ListMask,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum GhsSpecialMode {
    #[default]
    None,
    Diabetes2,
    Diabetes3,
    Outpatient,
    Intermediary,
}

/// Eligibility rule mapping one GHM to one GHS per sector.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GhmToGhsInfo {
    pub ghm: GhmCode,
    /// Index 0 for the public sector, 1 for the private sector.
    pub ghs: [GhsCode; 2],
    pub bed_authorization: i8,
    pub unit_authorization: i8,
    pub minimum_duration: i32,
    pub minimum_age: i32,
    pub special_mode: GhsSpecialMode,
    pub main_diagnosis_mask: ListMask,
    pub diagnosis_mask: ListMask,
    pub procedure_masks: Vec<ListMask>,
    pub conditions_count: i32,
}

impl GhmToGhsInfo {
    pub fn ghs(&self, sector: crate::codes::Sector) -> GhsCode {
        self.ghs[sector.index()]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum AuthorizationScope {
    Facility,
    Unit,
    Bed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AuthorizationInfo {
    pub scope: AuthorizationScope,
    pub code: i8,
    pub function: i8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SrcPair {
    pub diag: DiagnosisCode,
    pub proc: ProcedureCode,
}

// ──────────────────────────────────────────────
// Prices
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize)]
pub struct GhsPriceInfo {
    pub ghs: GhsCode,
    pub ghs_cents: i64,
    pub exh_threshold: i32,
    pub exb_threshold: i32,
    pub exh_cents: i64,
    pub exb_cents: i64,
    /// The low-duration penalty is applied once instead of per missing day.
    pub exb_once: bool,
    /// Flat 40 euro reduction for stays with expensive drugs (UCD).
    pub minoration: bool,
}

// ──────────────────────────────────────────────
// Containers
// ──────────────────────────────────────────────

fn first_index_map<K: Hash + Eq + Copy, T>(
    items: &[T],
    key: impl Fn(&T) -> K,
) -> HashMap<K, usize> {
    let mut map = HashMap::with_capacity(items.len());
    for (idx, item) in items.iter().enumerate() {
        map.entry(key(item)).or_insert(idx);
    }
    map
}

fn contiguous<'a, K: Hash + Eq + Copy, T>(
    items: &'a [T],
    map: &HashMap<K, usize>,
    code: K,
    key: impl Fn(&T) -> K,
) -> &'a [T] {
    let Some(&start) = map.get(&code) else {
        return &[];
    };
    let len = items[start..]
        .iter()
        .take_while(|item| key(item) == code)
        .count();
    &items[start..start + len]
}

#[derive(Debug, Clone, Default)]
pub struct DiagnosisTable {
    pub diagnoses: Vec<DiagnosisInfo>,
    pub exclusions: Vec<ExclusionInfo>,
    map: HashMap<DiagnosisCode, usize>,
}

impl DiagnosisTable {
    pub fn new(diagnoses: Vec<DiagnosisInfo>, exclusions: Vec<ExclusionInfo>) -> Self {
        let map = first_index_map(&diagnoses, |d| d.diag);
        DiagnosisTable {
            diagnoses,
            exclusions,
            map,
        }
    }

    pub fn find(&self, diag: DiagnosisCode) -> &[DiagnosisInfo] {
        contiguous(&self.diagnoses, &self.map, diag, |d| d.diag)
    }

    /// Diagnosis attributes applicable to a patient of the given sex.
    pub fn find_for_sex(&self, diag: DiagnosisCode, sex: i8) -> Option<&DiagnosisInfo> {
        let sex_bit = u8::try_from(sex).unwrap_or(0);
        let candidates = self.find(diag);
        candidates
            .iter()
            .take(2)
            .find(|info| info.sexes & sex_bit != 0)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProcedureTable {
    pub procedures: Vec<ProcedureInfo>,
    pub links: Vec<ProcedureLink>,
    map: HashMap<ProcedureCode, usize>,
}

impl ProcedureTable {
    pub fn new(procedures: Vec<ProcedureInfo>) -> Self {
        let map = first_index_map(&procedures, |p| p.proc);
        ProcedureTable {
            procedures,
            links: Vec::new(),
            map,
        }
    }

    pub fn find(&self, proc: ProcedureCode) -> &[ProcedureInfo] {
        contiguous(&self.procedures, &self.map, proc, |p| p.proc)
    }

    /// The record for this phase whose validity range contains `date`.
    pub fn find_valid(&self, proc: ProcedureCode, phase: i8, date: Date) -> Option<&ProcedureInfo> {
        self.find(proc).iter().find(|info| {
            info.phase == phase && date >= info.limit_dates[0] && date < info.limit_dates[1]
        })
    }

    pub(crate) fn find_range(&self, proc: ProcedureCode) -> std::ops::Range<usize> {
        let start = self.map.get(&proc).copied().unwrap_or(0);
        start..start + self.find(proc).len()
    }

    pub fn addition_links(&self, info: &ProcedureInfo) -> &[ProcedureLink] {
        let list = info.addition_list;
        self.links
            .get(list.offset..list.offset + list.len)
            .unwrap_or(&[])
    }
}

#[derive(Debug, Clone, Default)]
pub struct GhmRootTable {
    pub roots: Vec<GhmRootInfo>,
    map: HashMap<GhmRootCode, usize>,
}

impl GhmRootTable {
    pub fn new(roots: Vec<GhmRootInfo>) -> Self {
        let map = first_index_map(&roots, |r| r.ghm_root);
        GhmRootTable { roots, map }
    }

    pub fn find(&self, root: GhmRootCode) -> Option<&GhmRootInfo> {
        self.map.get(&root).and_then(|&idx| self.roots.get(idx))
    }
}

#[derive(Debug, Clone, Default)]
pub struct SeverityTable {
    pub gnn_cells: Vec<ValueRangeCell>,
    pub cma_cells: [Vec<ValueRangeCell>; 3],
}

#[derive(Debug, Clone, Default)]
pub struct GhsTable {
    pub rules: Vec<GhmToGhsInfo>,
    by_ghm: HashMap<GhmCode, usize>,
    by_root: HashMap<GhmRootCode, usize>,
}

impl GhsTable {
    pub fn new(rules: Vec<GhmToGhsInfo>) -> Self {
        let by_ghm = first_index_map(&rules, |r| r.ghm);
        let by_root = first_index_map(&rules, |r| r.ghm.root());
        GhsTable {
            rules,
            by_ghm,
            by_root,
        }
    }

    /// Candidate rules for this exact GHM, in table order.
    pub fn find(&self, ghm: GhmCode) -> &[GhmToGhsInfo] {
        contiguous(&self.rules, &self.by_ghm, ghm, |r| r.ghm)
    }

    pub fn find_root(&self, root: GhmRootCode) -> &[GhmToGhsInfo] {
        contiguous(&self.rules, &self.by_root, root, |r| r.ghm.root())
    }
}

#[derive(Debug, Clone, Default)]
pub struct AuthorizationTable {
    pub authorizations: Vec<AuthorizationInfo>,
    map: HashMap<(AuthorizationScope, i8), usize>,
}

impl AuthorizationTable {
    pub fn new(authorizations: Vec<AuthorizationInfo>) -> Self {
        let map = first_index_map(&authorizations, |a| (a.scope, a.code));
        AuthorizationTable {
            authorizations,
            map,
        }
    }

    pub fn find(&self, scope: AuthorizationScope, code: i8) -> Option<&AuthorizationInfo> {
        self.map
            .get(&(scope, code))
            .and_then(|&idx| self.authorizations.get(idx))
    }
}

#[derive(Debug, Clone, Default)]
pub struct SrcPairTable {
    pub pairs: [Vec<SrcPair>; 2],
    maps: [HashMap<DiagnosisCode, usize>; 2],
}

impl SrcPairTable {
    pub fn new(pairs: [Vec<SrcPair>; 2]) -> Self {
        let maps = [
            first_index_map(&pairs[0], |p| p.diag),
            first_index_map(&pairs[1], |p| p.diag),
        ];
        SrcPairTable { pairs, maps }
    }

    pub fn find(&self, list: usize, diag: DiagnosisCode) -> &[SrcPair] {
        match (self.pairs.get(list), self.maps.get(list)) {
            (Some(pairs), Some(map)) => contiguous(pairs, map, diag, |p| p.diag),
            _ => &[],
        }
    }
}

/// One sector's prices for one period.
#[derive(Debug, Clone, Default)]
pub struct PriceTable {
    pub ghs_coefficient: Decimal,
    pub prices: Vec<GhsPriceInfo>,
    pub supplement_prices: SupplementCounters<i64>,
    map: HashMap<GhsCode, usize>,
}

impl PriceTable {
    pub fn new(
        ghs_coefficient: Decimal,
        prices: Vec<GhsPriceInfo>,
        supplement_prices: SupplementCounters<i64>,
    ) -> Self {
        let map = first_index_map(&prices, |p| p.ghs);
        PriceTable {
            ghs_coefficient,
            prices,
            supplement_prices,
            map,
        }
    }

    pub fn find(&self, ghs: GhsCode) -> Option<&GhsPriceInfo> {
        self.map.get(&ghs).and_then(|&idx| self.prices.get(idx))
    }

    pub(crate) fn find_mut(&mut self, ghs: GhsCode) -> Option<&mut GhsPriceInfo> {
        match self.map.get(&ghs) {
            Some(&idx) => self.prices.get_mut(idx),
            None => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diag(code: &str, sexes: u8, cmd: u8) -> DiagnosisInfo {
        DiagnosisInfo {
            diag: code.parse().unwrap(),
            sexes,
            warnings: 0,
            raw: [0; 37],
            cmd,
            jump: 0,
            severity: 0,
            cma_minimum_age: 0,
            cma_maximum_age: 0,
            exclusion_set_idx: 0,
            cma_exclusion_mask: ListMask::default(),
        }
    }

    #[test]
    fn diagnosis_lookup_by_sex() {
        let table = DiagnosisTable::new(
            vec![diag("A00", 3, 6), diag("N40", 1, 12), diag("N41", 1, 12), diag("N41", 2, 13)],
            Vec::new(),
        );
        let a00: DiagnosisCode = "A00".parse().unwrap();
        let n40: DiagnosisCode = "N40".parse().unwrap();
        let n41: DiagnosisCode = "N41".parse().unwrap();

        assert_eq!(table.find_for_sex(a00, 2).map(|d| d.cmd), Some(6));
        assert_eq!(table.find_for_sex(n40, 1).map(|d| d.cmd), Some(12));
        assert!(table.find_for_sex(n40, 2).is_none());
        assert_eq!(table.find_for_sex(n41, 2).map(|d| d.cmd), Some(13));
        assert_eq!(table.find(n41).len(), 2);
        assert!(table.find_for_sex(n41, 0).is_none());
    }

    #[test]
    fn value_range_cells_are_half_open() {
        let cell = ValueRangeCell {
            limits: [(0, 1000), (22, 33)],
            value: 4,
        };
        assert!(cell.test(0, 999));
        assert!(!cell.test(0, 1000));
        assert!(cell.test(1, 22));
        assert!(!cell.test(2, 0));
    }
}
