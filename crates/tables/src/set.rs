//! Table set: every loaded table, swept into dated indexes.
//!
//! Tables come with their own validity ranges. The builder sorts them and
//! produces consecutive, half-open [`TableIndex`] periods in which the set
//! of active tables is constant. Containers that did not change between two
//! periods are shared through `Arc`.

use crate::codes::{
    DiagnosisCode, GhmCode, GhmRootCode, GhsCode, ProcedureCode, Sector, SupplementCounters,
};
use crate::date::Date;
use crate::decode::*;
use crate::error::TableError;
use crate::header::parse_table_headers;
use crate::prices::parse_price_file;
use crate::types::*;
use rust_decimal::Decimal;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

// ──────────────────────────────────────────────
// Index
// ──────────────────────────────────────────────

/// The rule tables in force during one period.
#[derive(Debug, Clone)]
pub struct TableIndex {
    pub limit_dates: [Date; 2],
    /// Holds a decision tree, diagnoses, procedures, GHM roots, GHS rules
    /// and both sector price tables.
    pub valid: bool,
    /// Header of the active table for each type, `None` when missing.
    pub tables: [Option<TableInfo>; TableType::COUNT],
    /// Bit `i` is set when table type `i` differs from the previous index.
    pub changed_tables: u32,

    ghm_nodes: Arc<Vec<GhmDecisionNode>>,
    diagnoses: Arc<DiagnosisTable>,
    procedures: Arc<ProcedureTable>,
    ghm_roots: Arc<GhmRootTable>,
    severity: Arc<SeverityTable>,
    ghs: Arc<GhsTable>,
    authorizations: Arc<AuthorizationTable>,
    src_pairs: Arc<SrcPairTable>,
    prices: [Option<Arc<PriceTable>>; 2],
}

impl TableIndex {
    fn empty(start: Date, end: Date) -> Self {
        TableIndex {
            limit_dates: [start, end],
            valid: true,
            tables: std::array::from_fn(|_| None),
            changed_tables: 0,
            ghm_nodes: Arc::default(),
            diagnoses: Arc::default(),
            procedures: Arc::default(),
            ghm_roots: Arc::default(),
            severity: Arc::default(),
            ghs: Arc::default(),
            authorizations: Arc::default(),
            src_pairs: Arc::default(),
            prices: [None, None],
        }
    }

    pub fn ghm_nodes(&self) -> &[GhmDecisionNode] {
        &self.ghm_nodes
    }

    pub fn diagnoses(&self) -> &DiagnosisTable {
        &self.diagnoses
    }

    pub fn exclusions(&self) -> &[ExclusionInfo] {
        &self.diagnoses.exclusions
    }

    pub fn procedures(&self) -> &ProcedureTable {
        &self.procedures
    }

    pub fn ghm_roots(&self) -> &[GhmRootInfo] {
        &self.ghm_roots.roots
    }

    pub fn severity(&self) -> &SeverityTable {
        &self.severity
    }

    pub fn gnn_cells(&self) -> &[ValueRangeCell] {
        &self.severity.gnn_cells
    }

    pub fn cma_cells(&self, list: usize) -> &[ValueRangeCell] {
        self.severity.cma_cells.get(list).map_or(&[], |cells| cells.as_slice())
    }

    pub fn ghs_rules(&self) -> &[GhmToGhsInfo] {
        &self.ghs.rules
    }

    pub fn find_diagnosis(&self, diag: DiagnosisCode, sex: i8) -> Option<&DiagnosisInfo> {
        self.diagnoses.find_for_sex(diag, sex)
    }

    pub fn find_diagnoses(&self, diag: DiagnosisCode) -> &[DiagnosisInfo] {
        self.diagnoses.find(diag)
    }

    pub fn find_procedure(&self, proc: ProcedureCode, phase: i8, date: Date) -> Option<&ProcedureInfo> {
        self.procedures.find_valid(proc, phase, date)
    }

    pub fn find_procedures(&self, proc: ProcedureCode) -> &[ProcedureInfo] {
        self.procedures.find(proc)
    }

    pub fn find_ghm_root(&self, root: GhmRootCode) -> Option<&GhmRootInfo> {
        self.ghm_roots.find(root)
    }

    pub fn find_compatible_ghs(&self, ghm: GhmCode) -> &[GhmToGhsInfo] {
        self.ghs.find(ghm)
    }

    pub fn find_compatible_ghs_for_root(&self, root: GhmRootCode) -> &[GhmToGhsInfo] {
        self.ghs.find_root(root)
    }

    pub fn find_authorization(&self, scope: AuthorizationScope, code: i8) -> Option<&AuthorizationInfo> {
        self.authorizations.find(scope, code)
    }

    pub fn find_src_pairs(&self, list: usize, diag: DiagnosisCode) -> &[SrcPair] {
        self.src_pairs.find(list, diag)
    }

    pub fn price_table(&self, sector: Sector) -> Option<&PriceTable> {
        self.prices[sector.index()].as_deref()
    }

    pub fn ghs_coefficient(&self, sector: Sector) -> Decimal {
        self.price_table(sector)
            .map_or(Decimal::ZERO, |table| table.ghs_coefficient)
    }

    pub fn find_ghs_price(&self, ghs: GhsCode, sector: Sector) -> Option<&GhsPriceInfo> {
        self.price_table(sector).and_then(|table| table.find(ghs))
    }

    pub fn supplement_prices(&self, sector: Sector) -> SupplementCounters<i64> {
        self.price_table(sector)
            .map(|table| table.supplement_prices)
            .unwrap_or_default()
    }

    /// An index assembled in memory instead of swept from files, for
    /// callers that build rule sets programmatically.
    pub fn new(start: Date, end: Date) -> Self {
        TableIndex::empty(start, end)
    }

    pub fn with_ghm_nodes(mut self, nodes: Vec<GhmDecisionNode>) -> Self {
        self.ghm_nodes = Arc::new(nodes);
        self
    }

    pub fn with_diagnoses(mut self, diagnoses: DiagnosisTable) -> Self {
        self.diagnoses = Arc::new(diagnoses);
        self
    }

    pub fn with_procedures(mut self, procedures: ProcedureTable) -> Self {
        self.procedures = Arc::new(procedures);
        self
    }

    pub fn with_ghm_roots(mut self, roots: GhmRootTable) -> Self {
        self.ghm_roots = Arc::new(roots);
        self
    }

    pub fn with_severity(mut self, severity: SeverityTable) -> Self {
        self.severity = Arc::new(severity);
        self
    }

    pub fn with_ghs(mut self, ghs: GhsTable) -> Self {
        self.ghs = Arc::new(ghs);
        self
    }

    pub fn with_authorizations(mut self, authorizations: AuthorizationTable) -> Self {
        self.authorizations = Arc::new(authorizations);
        self
    }

    pub fn with_src_pairs(mut self, pairs: SrcPairTable) -> Self {
        self.src_pairs = Arc::new(pairs);
        self
    }

    pub fn with_prices(mut self, sector: Sector, prices: PriceTable) -> Self {
        self.prices[sector.index()] = Some(Arc::new(prices));
        self
    }

    pub fn summary(&self) -> IndexSummary {
        IndexSummary {
            start: self.limit_dates[0],
            end: self.limit_dates[1],
            valid: self.valid,
            tables: TableType::ALL
                .iter()
                .zip(&self.tables)
                .filter_map(|(ty, info)| {
                    info.as_ref().map(|info| TableSummary {
                        table_type: *ty,
                        raw_type: info.raw_type.clone(),
                        filename: info.filename.clone(),
                        version: format!("{}.{}", info.version[0], info.version[1]),
                        build_date: info.build_date,
                        changed: self.changed_tables & (1 << ty.index()) != 0,
                    })
                })
                .collect(),
            counts: IndexCounts {
                ghm_nodes: self.ghm_nodes.len(),
                diagnoses: self.diagnoses.diagnoses.len(),
                exclusions: self.diagnoses.exclusions.len(),
                procedures: self.procedures.procedures.len(),
                procedure_links: self.procedures.links.len(),
                ghm_roots: self.ghm_roots.roots.len(),
                ghs_rules: self.ghs.rules.len(),
                authorizations: self.authorizations.authorizations.len(),
                src_pairs: self.src_pairs.pairs.iter().map(Vec::len).sum(),
                prices: [
                    self.prices[0].as_ref().map_or(0, |t| t.prices.len()),
                    self.prices[1].as_ref().map_or(0, |t| t.prices.len()),
                ],
            },
        }
    }
}

/// Serializable description of an index.
#[derive(Debug, Clone, Serialize)]
pub struct IndexSummary {
    pub start: Date,
    pub end: Date,
    pub valid: bool,
    pub tables: Vec<TableSummary>,
    pub counts: IndexCounts,
}

#[derive(Debug, Clone, Serialize)]
pub struct TableSummary {
    pub table_type: TableType,
    pub raw_type: String,
    pub filename: String,
    pub version: String,
    pub build_date: Date,
    pub changed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexCounts {
    pub ghm_nodes: usize,
    pub diagnoses: usize,
    pub exclusions: usize,
    pub procedures: usize,
    pub procedure_links: usize,
    pub ghm_roots: usize,
    pub ghs_rules: usize,
    pub authorizations: usize,
    pub src_pairs: usize,
    pub prices: [usize; 2],
}

// ──────────────────────────────────────────────
// Table set
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct TableSet {
    pub tables: Vec<TableInfo>,
    pub indexes: Vec<TableIndex>,
}

impl TableSet {
    /// Newest index whose period contains `date`. An unset date matches
    /// every period.
    pub fn find_index(&self, date: Date, valid_only: bool) -> Option<&TableIndex> {
        self.indexes.iter().rev().find(|index| {
            if date.is_set() && (date < index.limit_dates[0] || date >= index.limit_dates[1]) {
                return false;
            }
            !valid_only || index.valid
        })
    }
}

// ──────────────────────────────────────────────
// Builder
// ──────────────────────────────────────────────

/// Decoded content of one table, kept until the indexes are built.
#[derive(Debug)]
enum TableData {
    GhmTree(Arc<Vec<GhmDecisionNode>>),
    Diagnoses(Arc<DiagnosisTable>),
    Procedures(Vec<ProcedureInfo>),
    Additions(Vec<ProcedureAdditionInfo>),
    Extensions(Vec<ProcedureExtensionInfo>),
    GhmRoots(Arc<GhmRootTable>),
    Severity(Arc<SeverityTable>),
    Ghs(Arc<GhsTable>),
    Authorizations(Arc<AuthorizationTable>),
    SrcPairs(Arc<SrcPairTable>),
    Prices(PriceTable),
    Minorations(Vec<GhsCode>),
}

#[derive(Debug)]
struct TableLoad {
    info: TableInfo,
    data: TableData,
    /// Index this table was last committed to.
    prev_index: Option<usize>,
}

fn decode_table(data: &[u8], info: &TableInfo) -> Result<TableData, TableError> {
    let decoded = match info.table_type {
        TableType::GhmDecisionTree => TableData::GhmTree(Arc::new(decode_ghm_tree(data, info)?)),
        TableType::DiagnosisTable => {
            let (diagnoses, exclusions) = decode_diagnoses(data, info)?;
            TableData::Diagnoses(Arc::new(DiagnosisTable::new(diagnoses, exclusions)))
        }
        TableType::ProcedureTable => TableData::Procedures(decode_procedures(data, info)?),
        TableType::ProcedureAdditionTable => {
            TableData::Additions(decode_procedure_additions(data, info)?)
        }
        TableType::ProcedureExtensionTable => {
            TableData::Extensions(decode_procedure_extensions(data, info)?)
        }
        TableType::GhmRootTable => {
            TableData::GhmRoots(Arc::new(GhmRootTable::new(decode_ghm_roots(data, info)?)))
        }
        TableType::SeverityTable => TableData::Severity(Arc::new(decode_severity(data, info)?)),
        TableType::GhmToGhsTable => {
            TableData::Ghs(Arc::new(GhsTable::new(decode_ghm_to_ghs(data, info)?)))
        }
        TableType::AuthorizationTable => TableData::Authorizations(Arc::new(
            AuthorizationTable::new(decode_authorizations(data, info)?),
        )),
        TableType::SrcPairTable => {
            TableData::SrcPairs(Arc::new(SrcPairTable::new(decode_src_pairs(data, info)?)))
        }
        TableType::GhsMinorationTable => {
            TableData::Minorations(decode_ghs_minorations(data, info)?)
        }
        TableType::PriceTablePublic | TableType::PriceTablePrivate => {
            return Err(TableError::malformed(
                &info.filename,
                "price tables cannot be stored in binary files",
            ))
        }
    };
    Ok(decoded)
}

/// Collects tables from files, then sweeps them into indexes.
#[derive(Debug, Default)]
pub struct TableSetBuilder {
    loads: Vec<TableLoad>,
}

impl TableSetBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes every table of a binary `.tab` file. Any failure rejects the
    /// whole file.
    pub fn load_tab(&mut self, data: &[u8], filename: &str) -> Result<(), TableError> {
        let infos = parse_table_headers(data, filename)?;
        let mut loads = Vec::with_capacity(infos.len());
        for info in infos {
            let decoded = decode_table(data, &info)?;
            loads.push(TableLoad {
                info,
                data: decoded,
                prev_index: None,
            });
        }

        tracing::debug!(file = filename, tables = loads.len(), "loaded table file");
        self.loads.extend(loads);
        Ok(())
    }

    /// Adds the price tables of a JSON price document.
    pub fn load_prices(&mut self, text: &str, filename: &str) -> Result<(), TableError> {
        for (info, table) in parse_price_file(text, filename)? {
            self.loads.push(TableLoad {
                info,
                data: TableData::Prices(table),
                prev_index: None,
            });
        }
        Ok(())
    }

    /// Loads files by extension: `.tab` for binary tables, `.json` for prices.
    pub fn load_files(&mut self, paths: &[PathBuf]) -> Result<(), TableError> {
        for path in paths {
            let filename = path.display().to_string();
            let read_err = |source| TableError::Io {
                path: filename.clone(),
                source,
            };

            match path.extension().and_then(|e| e.to_str()) {
                Some("tab") => {
                    let data = std::fs::read(path).map_err(read_err)?;
                    self.load_tab(&data, &filename)?;
                }
                Some("json") => {
                    let text = std::fs::read_to_string(path).map_err(read_err)?;
                    self.load_prices(&text, &filename)?;
                }
                _ => return Err(TableError::UnknownExtension { path: filename }),
            }
        }
        Ok(())
    }

    pub fn finish(mut self) -> TableSet {
        self.loads.sort_by(|a, b| {
            let (a, b) = (&a.info, &b.info);
            (a.limit_dates[0], a.version, a.build_date).cmp(&(b.limit_dates[0], b.version, b.build_date))
        });

        let mut indexes = Vec::new();
        let mut slots = Slots::default();

        let mut start = Date::default();
        let mut end = Date::default();
        for i in 0..self.loads.len() {
            let [load_start, load_end] = self.loads[i].info.limit_dates;
            let table_type = self.loads[i].info.table_type;

            while end.is_set() && load_start >= end {
                commit(&mut self.loads, &mut slots, &mut indexes, start, end);

                let mut next_end = Date::default();
                for slot in slots.active.iter_mut() {
                    let Some(load_idx) = *slot else { continue };
                    let active_end = self.loads[load_idx].info.limit_dates[1];
                    if active_end == end {
                        *slot = None;
                    } else if !next_end.is_set() || active_end < next_end {
                        next_end = active_end;
                    }
                }

                start = load_start;
                end = next_end;
            }

            if start.is_set() {
                if load_start > start {
                    commit(&mut self.loads, &mut slots, &mut indexes, start, load_start);
                    start = load_start;
                }
            } else {
                start = load_start;
            }
            if !end.is_set() || load_end < end {
                end = load_end;
            }

            slots.active[table_type.index()] = Some(i);
        }
        if slots.active.iter().any(Option::is_some) {
            commit(&mut self.loads, &mut slots, &mut indexes, start, end);
        }

        TableSet {
            tables: self.loads.into_iter().map(|load| load.info).collect(),
            indexes,
        }
    }
}

/// Active table per type. Types without a table keep their own
/// last-committed index so unchanged empty tables are shared too.
#[derive(Debug, Default)]
struct Slots {
    active: [Option<usize>; TableType::COUNT],
    empty_prev: [Option<usize>; TableType::COUNT],
}

impl Slots {
    fn prev(&self, loads: &[TableLoad], ty: TableType) -> Option<usize> {
        match self.active[ty.index()] {
            Some(load_idx) => loads[load_idx].prev_index,
            None => self.empty_prev[ty.index()],
        }
    }

    fn set_prev(&mut self, loads: &mut [TableLoad], ty: TableType, prev: Option<usize>) {
        match self.active[ty.index()] {
            Some(load_idx) => loads[load_idx].prev_index = prev,
            None => self.empty_prev[ty.index()] = prev,
        }
    }

    fn load<'a>(&self, loads: &'a [TableLoad], ty: TableType) -> Option<&'a TableLoad> {
        self.active[ty.index()].map(|idx| &loads[idx])
    }
}

/// Secondary tables patch their main table, so both are rebuilt together.
const TABLE_DEPENDENCIES: [(TableType, TableType); 4] = [
    (TableType::ProcedureTable, TableType::ProcedureAdditionTable),
    (TableType::ProcedureTable, TableType::ProcedureExtensionTable),
    (TableType::PriceTablePublic, TableType::GhsMinorationTable),
    (TableType::PriceTablePrivate, TableType::GhsMinorationTable),
];

fn handle_dependencies(loads: &mut [TableLoad], slots: &mut Slots) {
    for (main, secondary) in TABLE_DEPENDENCIES {
        if slots.active[secondary.index()].is_some() && slots.prev(loads, secondary).is_none() {
            slots.set_prev(loads, main, None);
        }
    }
    for (main, secondary) in TABLE_DEPENDENCIES {
        if slots.prev(loads, main).is_none() {
            slots.set_prev(loads, secondary, None);
        }
    }
}

fn commit(
    loads: &mut [TableLoad],
    slots: &mut Slots,
    indexes: &mut Vec<TableIndex>,
    start: Date,
    end: Date,
) {
    handle_dependencies(loads, slots);

    let mut index = TableIndex::empty(start, end);
    for ty in TableType::ALL {
        let prev = slots.prev(loads, ty).and_then(|idx| indexes.get(idx));
        let load = slots.load(loads, ty);
        let data = load.map(|load| &load.data);

        match ty {
            TableType::GhmDecisionTree => {
                index.ghm_nodes = match (prev, data) {
                    (Some(prev), _) => prev.ghm_nodes.clone(),
                    (None, Some(TableData::GhmTree(nodes))) => nodes.clone(),
                    (None, _) => Arc::default(),
                };
            }
            TableType::DiagnosisTable => {
                index.diagnoses = match (prev, data) {
                    (Some(prev), _) => prev.diagnoses.clone(),
                    (None, Some(TableData::Diagnoses(table))) => table.clone(),
                    (None, _) => Arc::default(),
                };
            }
            TableType::ProcedureTable => {
                index.procedures = match prev {
                    Some(prev) => prev.procedures.clone(),
                    None => Arc::new(build_procedures(loads, slots)),
                };
            }
            // Applied while building the procedure table.
            TableType::ProcedureAdditionTable | TableType::ProcedureExtensionTable => {}
            TableType::GhmRootTable => {
                index.ghm_roots = match (prev, data) {
                    (Some(prev), _) => prev.ghm_roots.clone(),
                    (None, Some(TableData::GhmRoots(table))) => table.clone(),
                    (None, _) => Arc::default(),
                };
            }
            TableType::SeverityTable => {
                index.severity = match (prev, data) {
                    (Some(prev), _) => prev.severity.clone(),
                    (None, Some(TableData::Severity(table))) => table.clone(),
                    (None, _) => Arc::default(),
                };
            }
            TableType::GhmToGhsTable => {
                index.ghs = match (prev, data) {
                    (Some(prev), _) => prev.ghs.clone(),
                    (None, Some(TableData::Ghs(table))) => table.clone(),
                    (None, _) => Arc::default(),
                };
            }
            TableType::AuthorizationTable => {
                index.authorizations = match (prev, data) {
                    (Some(prev), _) => prev.authorizations.clone(),
                    (None, Some(TableData::Authorizations(table))) => table.clone(),
                    (None, _) => Arc::default(),
                };
            }
            TableType::SrcPairTable => {
                index.src_pairs = match (prev, data) {
                    (Some(prev), _) => prev.src_pairs.clone(),
                    (None, Some(TableData::SrcPairs(table))) => table.clone(),
                    (None, _) => Arc::default(),
                };
            }
            TableType::PriceTablePublic | TableType::PriceTablePrivate => {
                let sector = if ty == TableType::PriceTablePublic { 0 } else { 1 };
                index.prices[sector] = match (prev, data) {
                    (Some(prev), _) => prev.prices[sector].clone(),
                    (None, Some(TableData::Prices(table))) => {
                        let mut table = table.clone();
                        let minorations = slots.load(loads, TableType::GhsMinorationTable);
                        if let Some(TableData::Minorations(ghs_list)) = minorations.map(|l| &l.data) {
                            for ghs in ghs_list {
                                if let Some(price) = table.find_mut(*ghs) {
                                    price.minoration = true;
                                }
                            }
                        }
                        Some(Arc::new(table))
                    }
                    (None, _) => None,
                };
            }
            TableType::GhsMinorationTable => {}
        }

        index.tables[ty.index()] = load.map(|load| load.info.clone());
        let prev_idx = slots.prev(loads, ty);
        if indexes.is_empty() || prev_idx != Some(indexes.len() - 1) {
            index.changed_tables |= 1 << ty.index();
        }
        slots.set_prev(loads, ty, Some(indexes.len()));
    }

    index.valid = !index.ghm_nodes.is_empty()
        && !index.diagnoses.diagnoses.is_empty()
        && !index.procedures.procedures.is_empty()
        && !index.ghm_roots.roots.is_empty()
        && !index.ghs.rules.is_empty()
        && index.prices.iter().all(|p| p.as_ref().is_some_and(|t| !t.prices.is_empty()));
    if !index.valid {
        tracing::debug!(%start, %end, "missing pieces for index");
    } else {
        tracing::debug!(%start, %end, changed = index.changed_tables, "built table index");
    }

    indexes.push(index);
}

fn build_procedures(loads: &[TableLoad], slots: &Slots) -> ProcedureTable {
    let procedures = match slots.load(loads, TableType::ProcedureTable).map(|l| &l.data) {
        Some(TableData::Procedures(procedures)) => procedures.clone(),
        _ => Vec::new(),
    };
    let mut table = ProcedureTable::new(procedures);

    if let Some(TableData::Additions(additions)) =
        slots.load(loads, TableType::ProcedureAdditionTable).map(|l| &l.data)
    {
        let mut additions = additions.clone();
        additions.sort_by_key(|a| (a.proc1, a.phase1));
        build_addition_lists(&mut table, &additions);
    }

    if let Some(TableData::Extensions(extensions)) =
        slots.load(loads, TableType::ProcedureExtensionTable).map(|l| &l.data)
    {
        apply_extensions(&mut table, extensions);
    }

    table
}

/// Numbers every procedure that can be billed as an addition (per activity)
/// and records, on the procedures that require them, which additions they
/// accept.
fn build_addition_lists(table: &mut ProcedureTable, additions: &[ProcedureAdditionInfo]) {
    let mut next_addition_idx: i16 = 1;
    for addition in additions {
        let mut addition_idx = 0;

        if let Ok(activity2) = usize::try_from(addition.activity2) {
            if activity2 < 8 {
                let mut new_match = false;
                for idx in table.find_range(addition.proc2) {
                    let proc = &mut table.procedures[idx];
                    if proc.phase == addition.phase2 {
                        if proc.additions[activity2] == 0 {
                            proc.additions[activity2] = next_addition_idx;
                            new_match = true;
                        }
                        addition_idx = proc.additions[activity2];
                    }
                }
                if new_match {
                    next_addition_idx += 1;
                }
            }
        }

        if addition_idx != 0 {
            let offset = table.links.len();
            let mut matched = false;
            for idx in table.find_range(addition.proc1) {
                let proc = &mut table.procedures[idx];
                if proc.phase == addition.phase1 {
                    if proc.addition_list.len == 0 {
                        proc.addition_list.offset = offset;
                    }
                    proc.addition_list.len += 1;
                    matched = true;
                }
            }

            if matched {
                table.links.push(ProcedureLink {
                    proc: addition.proc1,
                    phase: addition.phase1,
                    activity: addition.activity1,
                    addition_idx,
                });
            }
        }
    }
}

fn apply_extensions(table: &mut ProcedureTable, extensions: &[ProcedureExtensionInfo]) {
    let dated_since = Date::new(2020, 3, 1);

    for ext in extensions {
        if ext.extension >= 64 {
            tracing::error!(
                procedure = %ext.proc,
                extension = ext.extension,
                "procedure extension value > 63 cannot be used"
            );
            continue;
        }

        let bit = 1u64 << ext.extension;
        for idx in table.find_range(ext.proc) {
            let proc = &mut table.procedures[idx];
            if proc.phase == ext.phase {
                proc.extensions |= bit;
                // Extensions only carry dates from 2020 on; older ones are
                // accepted but not checked.
                if ext.limit_dates[1] < dated_since {
                    proc.disabled_extensions |= bit;
                }
            }
        }
    }
}

// ──────────────────────────────────────────────
// Directory loading
// ──────────────────────────────────────────────

/// Subdirectories searched in each table directory, besides the directory
/// itself.
const TABLE_SUBDIRECTORIES: [&str; 2] = ["mco", "mco_tables"];

fn collect_table_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), TableError> {
    let entries = std::fs::read_dir(dir).map_err(|source| TableError::Io {
        path: dir.display().to_string(),
        source,
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry
            .map_err(|source| TableError::Io {
                path: dir.display().to_string(),
                source,
            })?
            .path();
        let known = matches!(path.extension().and_then(|e| e.to_str()), Some("tab" | "json"));
        // Follows symlinks.
        if known && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    out.extend(files);

    Ok(())
}

/// Loads every table found in `directories` (and their `mco` or
/// `mco_tables` subdirectories) plus explicit `files`.
pub fn load_table_set(directories: &[PathBuf], files: &[PathBuf]) -> Result<TableSet, TableError> {
    let mut paths = Vec::new();
    for dir in directories {
        collect_table_files(dir, &mut paths)?;
        for sub in TABLE_SUBDIRECTORIES {
            let sub_dir = dir.join(sub);
            if sub_dir.is_dir() {
                collect_table_files(&sub_dir, &mut paths)?;
            }
        }
    }
    paths.extend_from_slice(files);

    if paths.is_empty() {
        tracing::warn!("no table specified or found");
    }

    let mut builder = TableSetBuilder::new();
    builder.load_files(&paths)?;
    let set = builder.finish();

    tracing::info!(
        tables = set.tables.len(),
        indexes = set.indexes.len(),
        "table set ready"
    );
    Ok(set)
}
