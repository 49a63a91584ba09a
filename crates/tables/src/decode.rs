//! Decoders for each binary table type.
//!
//! Every decoder validates section counts, record lengths and cross-section
//! indexes before reading, and fails the whole table on the first violation.

use crate::codes::{DiagnosisCode, GhmCode, GhsCode, ListMask, ProcedureCode};
use crate::date::Date;
use crate::error::TableError;
use crate::header::{be16, be32, ensure};
use crate::types::*;

/// Procedure codes are indexed by their first three letters.
const PROCEDURE_ROOTS: usize = 26 * 26 * 26;
/// Diagnosis codes are indexed by letter and two digits.
const DIAGNOSIS_ROOTS: usize = 26 * 100;

pub(crate) fn max_table_date() -> Date {
    Date::from_table_days(u16::MAX)
}

struct Section<'a> {
    raw: &'a [u8],
    values_count: usize,
    value_len: usize,
}

impl<'a> Section<'a> {
    fn new(data: &'a [u8], table: &TableInfo, idx: usize) -> Result<Self, TableError> {
        let file = table.filename.as_str();
        ensure!(file, idx < table.sections.len());
        let section = table.sections[idx];
        let raw = data
            .get(section.raw_offset..section.raw_offset + section.raw_len)
            .ok_or_else(|| TableError::malformed(file, "section outside of file"))?;

        Ok(Section {
            raw,
            values_count: section.values_count,
            value_len: section.value_len,
        })
    }

    fn record(&self, idx: usize) -> &'a [u8] {
        let start = idx * self.value_len;
        self.raw.get(start..start + self.value_len).unwrap_or(&[])
    }

    fn records(&self) -> impl Iterator<Item = &'a [u8]> + 'a {
        let raw = self.raw;
        let value_len = self.value_len;
        (0..self.values_count).map(move |i| raw.get(i * value_len..(i + 1) * value_len).unwrap_or(&[]))
    }
}

/// Walks a root index section of big-endian end offsets, yielding each root
/// with its record range in the pointer section.
fn root_blocks(
    file: &str,
    roots: &Section<'_>,
    pointers: &Section<'_>,
) -> Result<Vec<(u16, std::ops::Range<usize>)>, TableError> {
    let mut blocks = Vec::new();
    let mut block_end = 0;
    for root_idx in 0..roots.values_count {
        let block_start = block_end;
        let end_idx = usize::from(be16(roots.record(root_idx), 0));
        ensure!(file, end_idx <= pointers.values_count);
        block_end = end_idx;
        if block_end > block_start {
            blocks.push((root_idx as u16, block_start..block_end));
        }
    }
    Ok(blocks)
}

pub(crate) fn diagnosis_code(code123: u16, code456: u16) -> DiagnosisCode {
    const CODE456_CHARS: &[u8; 12] = b" 0123456789+";

    let mut raw = [0u8; 6];
    raw[0] = (code123 / 100 + 65) as u8;
    raw[1] = b'0' + (code123 % 100 / 10) as u8;
    raw[2] = b'0' + (code123 % 10) as u8;

    let mut rest = code456 % 1584;
    raw[3] = CODE456_CHARS[usize::from(rest / 132)];
    rest %= 132;
    raw[4] = CODE456_CHARS[usize::from(rest / 11)];
    rest %= 11;
    raw[5] = CODE456_CHARS[usize::from(rest)];
    for c in raw[3..].iter_mut().rev() {
        if *c != b' ' {
            break;
        }
        *c = 0;
    }

    DiagnosisCode::from_raw(raw)
}

pub(crate) fn procedure_code(root_idx: u16, char4: u8, seq: u16) -> ProcedureCode {
    let mut raw = [0u8; 7];

    let mut root = root_idx;
    for i in 0..3 {
        raw[2 - i] = (root % 26) as u8 + b'A';
        root /= 26;
    }
    raw[3] = char4 % 26 + b'A';
    let seq = seq % 1000;
    raw[4] = b'0' + (seq / 100) as u8;
    raw[5] = b'0' + (seq / 10 % 10) as u8;
    raw[6] = b'0' + (seq % 10) as u8;

    ProcedureCode::from_raw(raw)
}

fn version_at_least(table: &TableInfo, major: u16, minor: u16) -> bool {
    table.version[0] > major || (table.version[0] == major && table.version[1] >= minor)
}

// ──────────────────────────────────────────────
// Decision tree
// ──────────────────────────────────────────────

pub fn decode_ghm_tree(data: &[u8], table: &TableInfo) -> Result<Vec<GhmDecisionNode>, TableError> {
    const TYPE_CHARS: [u8; 10] = [0, b'C', b'H', b'K', b'M', b'Z', b' ', b' ', b' ', b' '];
    const MODE_CHARS: [u8; 10] = [0, b'A', b'B', b'C', b'D', b'E', b'J', b'Z', b' ', b' '];

    let file = table.filename.as_str();
    ensure!(file, table.sections.len() == 1);
    let section = Section::new(data, table, 0)?;
    ensure!(file, section.value_len == 6);

    let count = section.values_count;
    let mut nodes = Vec::with_capacity(count);
    for rec in section.records() {
        let function = rec[0];
        let params = [rec[1], rec[2]];
        let children_count = usize::from(rec[3]);
        let children_idx = usize::from(be16(rec, 4));

        let node = match function {
            12 => {
                let idx = be16(rec, 4);
                GhmDecisionNode::Leaf {
                    ghm: GhmCode::new(
                        params[1] as i8,
                        TYPE_CHARS[usize::from(idx / 1000 % 10)],
                        (idx / 10 % 100) as i8,
                        MODE_CHARS[usize::from(idx % 10)],
                    ),
                    error: i16::from(params[0]),
                }
            }
            20 => {
                let target = children_idx + (usize::from(params[0]) << 8) + usize::from(params[1]);
                ensure!(file, target < count);
                GhmDecisionNode::Jump { target }
            }
            _ => {
                let test = GhmTest::from_function(function).ok_or_else(|| {
                    TableError::malformed(file, format!("unknown decision tree function {function}"))
                })?;
                ensure!(file, children_count != 0);
                ensure!(file, children_idx <= count);
                ensure!(file, children_count <= count - children_idx);
                GhmDecisionNode::Test {
                    test,
                    params,
                    children_idx,
                    children_count,
                }
            }
        };
        nodes.push(node);
    }

    Ok(nodes)
}

// ──────────────────────────────────────────────
// Diagnoses and exclusions
// ──────────────────────────────────────────────

pub fn decode_diagnoses(
    data: &[u8],
    table: &TableInfo,
) -> Result<(Vec<DiagnosisInfo>, Vec<ExclusionInfo>), TableError> {
    const RAW_LEN: usize = 37;
    const EXCLUSION_LEN: usize = 232;

    let file = table.filename.as_str();
    ensure!(file, table.sections.len() == 5);
    let roots = Section::new(data, table, 0)?;
    let pointers = Section::new(data, table, 1)?;
    let attributes = Section::new(data, table, 2)?;
    let warnings = Section::new(data, table, 3)?;
    let exclusions = Section::new(data, table, 4)?;

    ensure!(file, roots.values_count == DIAGNOSIS_ROOTS && roots.value_len == 2);
    ensure!(file, pointers.value_len == 9);
    ensure!(
        file,
        attributes.value_len != 0 && attributes.value_len % 2 == 0 && attributes.value_len / 2 <= RAW_LEN
    );
    ensure!(file, warnings.value_len != 0 && warnings.value_len <= 16);
    ensure!(file, exclusions.value_len != 0 && exclusions.value_len <= EXCLUSION_LEN);

    let half_len = attributes.value_len / 2;
    let mut diagnoses = Vec::new();

    for (root_idx, block) in root_blocks(file, &roots, &pointers)? {
        for ptr_idx in block {
            let ptr = pointers.record(ptr_idx);
            let code456 = be16(ptr, 0);
            let attributes_idx = usize::from(be16(ptr, 2));
            let warnings_idx = usize::from(ptr[4]);
            let exclusion_bit = be16(ptr, 5);
            let exclusion_idx = be16(ptr, 7);
            ensure!(file, attributes_idx < attributes.values_count);
            ensure!(file, warnings_idx < warnings.values_count);
            ensure!(file, usize::from(exclusion_idx) < exclusions.values_count);

            let diag = diagnosis_code(root_idx, code456);
            let warning_bits = warnings
                .record(warnings_idx)
                .iter()
                .enumerate()
                .filter(|(_, &b)| b != 0)
                .fold(0u16, |acc, (i, _)| acc | (1 << i));

            let make = |sexes: u8, half: &[u8]| {
                let mut raw = [0u8; RAW_LEN];
                raw[..half.len()].copy_from_slice(half);

                let severity = if raw[21] & 0x40 != 0 {
                    3
                } else if raw[21] & 0x80 != 0 {
                    2
                } else if raw[20] & 0x1 != 0 {
                    1
                } else {
                    0
                };

                DiagnosisInfo {
                    diag,
                    sexes,
                    warnings: warning_bits,
                    raw,
                    cmd: raw[0],
                    jump: raw[1],
                    severity,
                    cma_minimum_age: if raw[19] & 0x10 != 0 { 14 } else { 0 },
                    cma_maximum_age: if raw[19] & 0x8 != 0 || diag.as_str().starts_with('P') {
                        2
                    } else {
                        0
                    },
                    exclusion_set_idx: exclusion_idx,
                    cma_exclusion_mask: ListMask::new(
                        (exclusion_bit >> 3) as u8,
                        0x80 >> (exclusion_bit & 0x7),
                    ),
                }
            };

            let rec = attributes.record(attributes_idx);
            let (sex1, sex2) = rec.split_at(half_len);
            if sex1 != sex2 {
                diagnoses.push(make(0x1, sex1));
                diagnoses.push(make(0x2, sex2));
            } else {
                diagnoses.push(make(0x3, sex1));
            }
        }
    }

    let exclusions = exclusions
        .records()
        .map(|rec| {
            let mut raw = [0u8; EXCLUSION_LEN];
            raw[..rec.len()].copy_from_slice(rec);
            ExclusionInfo { raw }
        })
        .collect();

    Ok((diagnoses, exclusions))
}

// ──────────────────────────────────────────────
// Procedures, additions and extensions
// ──────────────────────────────────────────────

pub fn decode_procedures(data: &[u8], table: &TableInfo) -> Result<Vec<ProcedureInfo>, TableError> {
    let file = table.filename.as_str();
    ensure!(file, table.sections.len() == 3);
    let roots = Section::new(data, table, 0)?;
    let pointers = Section::new(data, table, 1)?;
    let attributes = Section::new(data, table, 2)?;

    ensure!(file, roots.values_count == PROCEDURE_ROOTS && roots.value_len == 2);
    ensure!(file, pointers.value_len == 9);
    ensure!(file, attributes.value_len != 0 && attributes.value_len <= 52);

    let mut procedures = Vec::new();
    for (root_idx, block) in root_blocks(file, &roots, &pointers)? {
        for ptr_idx in block {
            let ptr = pointers.record(ptr_idx);
            let seq_phase = be16(ptr, 1);
            let attributes_idx = usize::from(be16(ptr, 3));
            let date_min = be16(ptr, 5);
            let date_max = be16(ptr, 7);
            ensure!(file, attributes_idx < attributes.values_count);

            let mut bytes = [0u8; 52];
            let rec = attributes.record(attributes_idx);
            bytes[..rec.len()].copy_from_slice(rec);

            let mut activities = 0u8;
            for (bit, offset, mask) in [(1, 31, 0x1), (2, 32, 0x80), (3, 32, 0x40), (4, 22, 0x20), (5, 32, 0x20)] {
                if bytes[offset] & mask != 0 {
                    activities |= 1 << bit;
                }
            }

            let end = if date_max < u16::MAX {
                Date::from_table_days(date_max + 1)
            } else {
                max_table_date()
            };

            procedures.push(ProcedureInfo {
                proc: procedure_code(root_idx, ptr[0], seq_phase / 10),
                phase: (seq_phase % 10) as i8,
                activities,
                limit_dates: [Date::from_table_days(date_min), end],
                additions: [0; 8],
                addition_list: AdditionList::default(),
                extensions: 0,
                disabled_extensions: 0,
                bytes,
            });
        }
    }

    Ok(procedures)
}

pub fn decode_procedure_additions(
    data: &[u8],
    table: &TableInfo,
) -> Result<Vec<ProcedureAdditionInfo>, TableError> {
    let file = table.filename.as_str();
    ensure!(file, table.sections.len() == 4);
    let roots = Section::new(data, table, 0)?;
    let procs1 = Section::new(data, table, 1)?;
    let links = Section::new(data, table, 2)?;
    let procs2 = Section::new(data, table, 3)?;

    ensure!(file, roots.values_count == PROCEDURE_ROOTS && roots.value_len == 4);
    ensure!(file, procs1.value_len == 8);
    ensure!(file, links.value_len == 2);
    ensure!(file, procs2.value_len == 7);

    let split = |spa: u32| ((spa / 100) as u16, (spa / 10 % 10) as i8, (spa % 10) as i8);

    let mut additions = Vec::new();
    for root_idx in 0..roots.values_count {
        let root = roots.record(root_idx);
        let count = usize::from(be16(root, 0));
        let proc1_idx = usize::from(be16(root, 2));
        ensure!(file, proc1_idx + count <= procs1.values_count);

        for i in 0..count {
            let rec1 = procs1.record(proc1_idx + i);
            let (seq1, phase1, activity1) = split(be32(rec1, 1));
            let links_count = usize::from(rec1[5]);
            let links_idx = usize::from(be16(rec1, 6));
            ensure!(file, links_idx + links_count <= links.values_count);

            let proc1 = procedure_code(root_idx as u16, rec1[0], seq1);
            for j in 0..links_count {
                let proc2_idx = usize::from(be16(links.record(links_idx + j), 0));
                ensure!(file, proc2_idx < procs2.values_count);

                let rec2 = procs2.record(proc2_idx);
                let root2 = be16(rec2, 0);
                ensure!(file, usize::from(root2) < PROCEDURE_ROOTS);
                let (seq2, phase2, activity2) = split(be32(rec2, 3));

                additions.push(ProcedureAdditionInfo {
                    proc1,
                    phase1,
                    activity1,
                    proc2: procedure_code(root2, rec2[2], seq2),
                    phase2,
                    activity2,
                });
            }
        }
    }

    Ok(additions)
}

pub fn decode_procedure_extensions(
    data: &[u8],
    table: &TableInfo,
) -> Result<Vec<ProcedureExtensionInfo>, TableError> {
    let file = table.filename.as_str();
    ensure!(file, table.sections.len() == 2);
    let roots = Section::new(data, table, 0)?;
    let records = Section::new(data, table, 1)?;

    ensure!(file, roots.values_count == PROCEDURE_ROOTS && roots.value_len == 2);
    let dated = version_at_least(table, 11, 29);
    if dated {
        ensure!(file, records.value_len == 8);
    } else {
        ensure!(file, records.value_len == 4);
    }

    let mut extensions = Vec::new();
    for (root_idx, block) in root_blocks(file, &roots, &records)? {
        for idx in block {
            let rec = records.record(idx);
            let seq_phase = be16(rec, 1);
            ensure!(file, rec[3] <= 127);

            let limit_dates = if dated {
                [Date::from_table_days(be16(rec, 4)), Date::from_table_days(be16(rec, 6))]
            } else {
                [Date::new(2000, 1, 1), max_table_date()]
            };

            extensions.push(ProcedureExtensionInfo {
                proc: procedure_code(root_idx, rec[0], seq_phase / 10),
                phase: (seq_phase % 10) as i8,
                extension: rec[3] as i8,
                limit_dates,
            });
        }
    }

    Ok(extensions)
}

// ──────────────────────────────────────────────
// GHM roots and severity cells
// ──────────────────────────────────────────────

pub fn decode_ghm_roots(data: &[u8], table: &TableInfo) -> Result<Vec<GhmRootInfo>, TableError> {
    const TYPE_CHARS: [u8; 10] = [0, b'C', b'H', b'K', b'M', b'Z', b' ', b' ', b' ', b' '];

    let file = table.filename.as_str();
    ensure!(file, table.sections.len() == 1);
    let section = Section::new(data, table, 0)?;

    let expected_len = if version_at_least(table, 11, 29) {
        14
    } else if version_at_least(table, 11, 28) {
        13
    } else if version_at_least(table, 11, 15) {
        12
    } else {
        11
    };
    ensure!(file, section.value_len == expected_len);

    let mut roots = Vec::with_capacity(section.values_count);
    for rec in section.records() {
        let type_seq = be16(rec, 1);
        let mut root = GhmRootInfo {
            ghm_root: crate::codes::GhmRootCode::new(
                rec[0] as i8,
                TYPE_CHARS[usize::from(type_seq / 100 % 10)],
                (type_seq % 100) as i8,
            ),
            confirm_duration_threshold: i32::from(rec[10] as i8),
            cma_exclusion_mask: ListMask::new(rec[8], rec[9]),
            ..Default::default()
        };

        match rec[5] {
            1 => root.allow_ambulatory = true,
            2 => root.short_duration_threshold = 1,
            3 => root.short_duration_threshold = 2,
            4 => root.short_duration_threshold = 3,
            _ => {}
        }

        if rec[3] == 1 {
            root.young_age_threshold = 2;
            root.young_severity_limit = 1;
        }
        if let Some((age, limit)) = match rec[4] {
            1 => Some((70, 1)),
            2 => Some((80, 1)),
            3 => Some((70, 2)),
            4 => Some((80, 2)),
            5 => Some((70, 3)),
            6 => Some((80, 3)),
            _ => None,
        } {
            root.old_age_threshold = age;
            root.old_severity_limit = limit;
        }

        if rec.len() >= 12 && rec[11] != 0 {
            ensure!(file, (2..=4).contains(&rec[11]));
            root.childbirth_severity_list = i32::from(rec[11]) - 1;
        }
        if rec.len() >= 13 {
            ensure!(file, rec[12] <= 1);
            root.allow_raac = rec[12] == 0;
        }
        if rec.len() >= 14 {
            ensure!(file, rec[13] <= 1);
            root.gradated = rec[13] == 0;
        }

        roots.push(root);
    }

    Ok(roots)
}

fn decode_cells(data: &[u8], table: &TableInfo, idx: usize) -> Result<Vec<ValueRangeCell>, TableError> {
    let file = table.filename.as_str();
    let section = Section::new(data, table, idx)?;
    ensure!(file, section.value_len == 10);

    Ok(section
        .records()
        .map(|rec| ValueRangeCell {
            limits: [
                (i32::from(be16(rec, 0)), i32::from(be16(rec, 2)) + 1),
                (i32::from(be16(rec, 4)), i32::from(be16(rec, 6)) + 1),
            ],
            value: i32::from(be16(rec, 8)),
        })
        .collect())
}

pub fn decode_severity(data: &[u8], table: &TableInfo) -> Result<SeverityTable, TableError> {
    Ok(SeverityTable {
        gnn_cells: decode_cells(data, table, 0)?,
        cma_cells: [
            decode_cells(data, table, 1)?,
            decode_cells(data, table, 2)?,
            decode_cells(data, table, 3)?,
        ],
    })
}

// ──────────────────────────────────────────────
// GHM to GHS rules
// ──────────────────────────────────────────────

pub fn decode_ghm_to_ghs(data: &[u8], table: &TableInfo) -> Result<Vec<GhmToGhsInfo>, TableError> {
    const TYPE_CHARS: [u8; 6] = [0, b'C', b'H', b'K', b'M', b'Z'];
    const MODE_CHARS: [u8; 13] = [
        0, b'A', b'B', b'C', b'D', b'E', b'J', b'Z', b'T', b'1', b'2', b'3', b'4',
    ];
    const MAX_PROCEDURE_MASKS: usize = 4;

    let file = table.filename.as_str();
    ensure!(file, table.sections.len() == 1);
    let section = Section::new(data, table, 0)?;
    ensure!(file, section.value_len == 21);

    let mut rules = Vec::new();
    let mut current = GhmToGhsInfo::default();
    for rec in section.records() {
        let type_seq = be16(rec, 1);
        let function = rec[4];
        let params = [rec[5], rec[6]];
        let valid_ghs = rec[8] != 0;

        if !current.ghm.is_valid() {
            current.ghm = GhmCode::new(
                rec[0] as i8,
                TYPE_CHARS[usize::from(type_seq / 10000 % 6)],
                (type_seq / 100 % 100) as i8,
                MODE_CHARS[usize::from(type_seq % 100 % 13)],
            );
        }

        match function {
            0 => ensure!(file, valid_ghs),
            1 => {
                ensure!(file, current.procedure_masks.len() < MAX_PROCEDURE_MASKS);
                current.procedure_masks.push(ListMask::new(params[0], params[1]));
                current.conditions_count += 1;
            }
            2 => {
                ensure!(file, params[0] == 0);
                ensure!(file, current.unit_authorization == 0);
                current.unit_authorization = params[1] as i8;
                current.conditions_count += 1;
            }
            3 => {
                ensure!(file, params[0] == 0);
                ensure!(file, current.bed_authorization == 0);
                current.bed_authorization = params[1] as i8;
                current.conditions_count += 1;
            }
            5 => {
                ensure!(file, !current.main_diagnosis_mask.is_set());
                current.main_diagnosis_mask = ListMask::new(params[0], params[1]);
                current.conditions_count += 1;
            }
            6 => {
                ensure!(file, params[0] == 0);
                ensure!(file, current.minimum_duration == 0);
                current.minimum_duration = i32::from(params[1]) + 1;
                current.conditions_count += 1;
            }
            7 => {
                ensure!(file, !current.diagnosis_mask.is_set());
                current.diagnosis_mask = ListMask::new(params[0], params[1]);
                current.conditions_count += 1;
            }
            8 => {
                ensure!(file, params[0] == 0);
                ensure!(file, current.minimum_age == 0);
                current.minimum_age = i32::from(params[1]);
                current.conditions_count += 1;
            }
            9 | 10 => {
                ensure!(file, params[0] == 0);
                ensure!(file, current.special_mode == GhsSpecialMode::None);
                current.special_mode = match (function, params[1]) {
                    (9, 2) => GhsSpecialMode::Diabetes2,
                    (9, 3) => GhsSpecialMode::Diabetes3,
                    (10, 1) => GhsSpecialMode::Outpatient,
                    (10, 2) => GhsSpecialMode::Intermediary,
                    _ => {
                        return Err(TableError::malformed(
                            file,
                            format!("invalid special mode {} for function {function}", params[1]),
                        ))
                    }
                };
            }
            _ => {
                return Err(TableError::malformed(
                    file,
                    format!("unknown GHS condition function {function}"),
                ))
            }
        }

        if valid_ghs {
            current.ghs = [GhsCode(be16(rec, 9) as i16), GhsCode(be16(rec, 15) as i16)];
            rules.push(std::mem::take(&mut current));
        }
    }

    // Rules for a root stay together, with J/Z/T variants ahead of severities.
    rules.sort_by(|a, b| {
        a.ghm
            .root()
            .cmp(&b.ghm.root())
            .then_with(|| (b.ghm.mode >= b'J').cmp(&(a.ghm.mode >= b'J')))
            .then_with(|| a.ghm.mode.cmp(&b.ghm.mode))
    });

    Ok(rules)
}

// ──────────────────────────────────────────────
// Authorizations, SRC pairs, minorations
// ──────────────────────────────────────────────

pub fn decode_authorizations(
    data: &[u8],
    table: &TableInfo,
) -> Result<Vec<AuthorizationInfo>, TableError> {
    let file = table.filename.as_str();
    ensure!(file, table.sections.len() == 2);
    let beds = Section::new(data, table, 0)?;
    let units = Section::new(data, table, 1)?;
    ensure!(file, beds.value_len == 3 && units.value_len == 3);

    let beds = beds.records().map(|rec| AuthorizationInfo {
        scope: AuthorizationScope::Bed,
        code: rec[0] as i8,
        function: rec[1] as i8,
    });
    let units = units.records().map(|rec| AuthorizationInfo {
        scope: if rec[2] != 0 {
            AuthorizationScope::Facility
        } else {
            AuthorizationScope::Unit
        },
        code: rec[0] as i8,
        function: rec[1] as i8,
    });

    Ok(beds.chain(units).collect())
}

fn decode_src_list(data: &[u8], table: &TableInfo, idx: usize) -> Result<Vec<SrcPair>, TableError> {
    let file = table.filename.as_str();
    let section = Section::new(data, table, idx)?;
    ensure!(file, section.value_len == 8);

    let mut pairs: Vec<SrcPair> = section
        .records()
        .map(|rec| {
            let proc456 = be16(rec, 6);
            SrcPair {
                diag: diagnosis_code(be16(rec, 0), be16(rec, 2)),
                proc: procedure_code(be16(rec, 4), (proc456 / 1000 % 26) as u8, proc456 % 1000),
            }
        })
        .collect();
    pairs.sort_by_key(|pair| pair.diag);

    Ok(pairs)
}

pub fn decode_src_pairs(data: &[u8], table: &TableInfo) -> Result<[Vec<SrcPair>; 2], TableError> {
    Ok([decode_src_list(data, table, 0)?, decode_src_list(data, table, 1)?])
}

pub fn decode_ghs_minorations(data: &[u8], table: &TableInfo) -> Result<Vec<GhsCode>, TableError> {
    let file = table.filename.as_str();
    ensure!(file, table.sections.len() == 1);
    let section = Section::new(data, table, 0)?;
    ensure!(file, section.value_len == 2);

    Ok(section.records().map(|rec| GhsCode(be16(rec, 0) as i16)).collect())
}
