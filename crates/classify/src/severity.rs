//! GHM selection: tree walk, business checks, duration confirmation and
//! severity level.

use crate::error_set::ErrorSet;
use crate::prepare::MARCH_2016;
use crate::tree::run_ghm_tree;
use crate::types::{ClassifyFlags, Markers, PreparedStay};
use pmsi_stays::StayFlags;
use pmsi_tables::{DiagnosisInfo, GhmCode, GhmRootCode, GhmRootInfo, TableIndex};
use std::ptr;

/// The GHM of a stay, and the GHM to use for GHS selection. They differ
/// for enhanced recovery (RAAC) stays, which keep their unlimited severity
/// for pricing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GhmPick {
    pub ghm: GhmCode,
    pub ghm_for_ghs: GhmCode,
}

impl GhmPick {
    fn same(ghm: GhmCode) -> Self {
        GhmPick {
            ghm,
            ghm_for_ghs: ghm,
        }
    }
}

/// Runs the decision tree, the GHM-level checks and the severity step.
pub fn pick_ghm<'a>(
    index: &'a TableIndex,
    prep: &PreparedStay<'a>,
    mono_count: usize,
    flags: ClassifyFlags,
    errors: &mut ErrorSet,
) -> GhmPick {
    let ghm = run_ghm_tree(index, prep, errors);
    // Error leaves (90Z) carry their own error and skip root and confirmation checks
    if ghm.is_error() {
        return GhmPick::same(ghm);
    }

    let Some(root_info) = index.find_ghm_root(ghm.root()) else {
        tracing::error!(root = %ghm.root(), "GHM root missing from root table");
        errors.set(4, 2);
        return GhmPick::same(GhmCode::TABLE_ERROR);
    };

    if !check_ghm_errors(prep, mono_count, ghm, errors) {
        return GhmPick::same(GhmCode::GROUPING_ERROR);
    }
    if !flags.ignore_confirmation && !check_confirmation(prep, ghm, root_info, errors) {
        return GhmPick::same(GhmCode::GROUPING_ERROR);
    }

    run_ghm_severity(index, prep, ghm, root_info)
}

fn check_ghm_errors(
    prep: &PreparedStay,
    mono_count: usize,
    ghm: GhmCode,
    errors: &mut ErrorSet,
) -> bool {
    let stay = &*prep.stay;
    let root = ghm.root();

    let mut valid = true;

    // Sessions
    if ghm.cmd == 28 {
        if mono_count > 1 {
            valid &= errors.error(150);
        }
        if stay.exit.date >= MARCH_2016
            && stay.main_diagnosis.matches("Z511")
            && !stay.linked_diagnosis.is_valid()
        {
            valid &= errors.error(187);
        }
    }

    // Pregnancy
    if ghm.cmd == 14
        && root != GhmRootCode::new(14, b'C', 4)
        && root != GhmRootCode::new(14, b'M', 2)
        && !stay.last_menstrual_period.is_set()
    {
        valid &= errors.error(162);
    }

    if stay.exit.date >= MARCH_2016
        && root == GhmRootCode::new(14, b'Z', 8)
        && !prep
            .procedures
            .iter()
            .any(|info| info.proc.matches("JNJD002") || info.proc.matches("JNJP001"))
    {
        errors.warn(179);
    }

    valid
}

/// Deliveries that belong in these roots of CMD 01 do not need their short
/// duration confirmed.
const CMD01_CHILDBIRTH_ROOTS: &[(u8, i8)] = &[
    (b'C', 3),
    (b'C', 4),
    (b'C', 5),
    (b'C', 6),
    (b'C', 10),
    (b'C', 11),
    (b'C', 12),
    (b'K', 7),
    (b'M', 13),
    (b'M', 18),
    (b'M', 19),
    (b'M', 24),
    (b'M', 25),
    (b'M', 30),
    (b'M', 31),
];

fn needs_confirmation(prep: &PreparedStay, ghm: GhmCode, root_info: &GhmRootInfo) -> bool {
    let stay = &*prep.stay;

    if prep.duration >= 365 {
        return true;
    }

    if prep.duration < root_info.confirm_duration_threshold
        && stay.exit.mode != b'9'
        && stay.exit.mode != b'0'
        && !(stay.exit.mode == b'7' && stay.exit.destination == b'1')
        && !stay.flags.contains(StayFlags::RAAC)
    {
        return true;
    }

    if prep
        .markers
        .intersects(Markers::CHILDBIRTH | Markers::CHILDBIRTH_TYPE)
    {
        return match ghm.cmd {
            12 | 14 | 22 | 25 | 26 | 27 => false,
            1 => !CMD01_CHILDBIRTH_ROOTS.contains(&(ghm.kind, ghm.seq)),
            7 => !(ghm.kind == b'C' && (9..=14).contains(&ghm.seq)),
            23 => !(ghm.kind == b'Z' && ghm.seq == 2),
            _ => true,
        };
    }

    false
}

fn check_confirmation(
    prep: &PreparedStay,
    ghm: GhmCode,
    root_info: &GhmRootInfo,
    errors: &mut ErrorSet,
) -> bool {
    let confirm = needs_confirmation(prep, ghm, root_info);

    if prep.stay.flags.contains(StayFlags::CONFIRMED) {
        if confirm {
            errors.set(223, 0);
            true
        } else if prep.duration >= root_info.confirm_duration_threshold {
            errors.error(124)
        } else {
            true
        }
    } else if confirm {
        errors.error(120)
    } else {
        true
    }
}

/// Severity allowed by the duration: none under 3 nights, then at most
/// one level per night beyond 2.
fn limit_severity(severity: i32, duration: i32) -> i32 {
    if duration >= 3 {
        severity.min(duration - 2)
    } else {
        0
    }
}

fn severity_mode(base: u8, severity: i32) -> u8 {
    base + u8::try_from(severity.clamp(0, 3)).unwrap_or(0)
}

/// Applies the ambulatory, short duration or severity mode to a tree GHM.
pub fn run_ghm_severity<'a>(
    index: &'a TableIndex,
    prep: &PreparedStay<'a>,
    ghm: GhmCode,
    root_info: &GhmRootInfo,
) -> GhmPick {
    let stay = &*prep.stay;
    let raac = stay.flags.contains(StayFlags::RAAC) && root_info.allow_raac;

    if root_info.allow_ambulatory && prep.duration == 0 {
        GhmPick::same(ghm.with_mode(b'J'))
    } else if prep.duration < root_info.short_duration_threshold {
        GhmPick::same(ghm.with_mode(b'T'))
    } else if (b'A'..=b'D').contains(&ghm.mode) {
        let mut severity = i32::from(ghm.mode - b'A');

        if let Ok(list) = usize::try_from(root_info.childbirth_severity_list - 1) {
            let gestational_age = i32::from(stay.gestational_age);
            if let Some(cell) = index
                .cma_cells(list)
                .iter()
                .find(|cell| cell.test(0, gestational_age) && cell.test(1, severity))
            {
                severity = cell.value;
            }
        }

        let real_severity = limit_severity(severity, prep.duration);
        GhmPick {
            ghm: ghm.with_mode(severity_mode(b'A', real_severity)),
            ghm_for_ghs: ghm.with_mode(severity_mode(
                b'A',
                if raac { severity } else { real_severity },
            )),
        }
    } else if ghm.mode == 0 {
        let mut severity = 0;
        for &info in &prep.diagnoses {
            if is_same(prep.main_diag_info, info) || is_same(prep.linked_diag_info, info) {
                continue;
            }

            let diag_severity = i32::from(info.severity);
            if diag_severity > severity && !test_exclusion(index, prep, root_info, info) {
                severity = diag_severity;
            }
        }

        if prep.age >= root_info.old_age_threshold && severity < root_info.old_severity_limit {
            severity += 1;
        } else if prep.age < root_info.young_age_threshold
            && severity < root_info.young_severity_limit
        {
            severity += 1;
        } else if stay.exit.mode == b'9' && severity == 0 {
            severity = 1;
        }

        let real_severity = limit_severity(severity, prep.duration);
        GhmPick {
            ghm: ghm.with_mode(severity_mode(b'1', real_severity)),
            ghm_for_ghs: ghm.with_mode(severity_mode(
                b'1',
                if raac { severity } else { real_severity },
            )),
        }
    } else {
        GhmPick::same(ghm)
    }
}

fn is_same(a: Option<&DiagnosisInfo>, b: &DiagnosisInfo) -> bool {
    a.is_some_and(|a| ptr::eq(a, b))
}

/// Whether the complication `info` is excluded for this patient, GHM root
/// or principal diagnoses.
fn test_exclusion(
    index: &TableIndex,
    prep: &PreparedStay,
    root_info: &GhmRootInfo,
    info: &DiagnosisInfo,
) -> bool {
    if prep.age < i32::from(info.cma_minimum_age) {
        return true;
    }
    if info.cma_maximum_age != 0 && prep.age >= i32::from(info.cma_maximum_age) {
        return true;
    }
    if info.test_mask(root_info.cma_exclusion_mask) {
        return true;
    }

    let Some(exclusion) = index.exclusions().get(usize::from(info.exclusion_set_idx)) else {
        return false;
    };
    [prep.main_diag_info, prep.linked_diag_info]
        .into_iter()
        .flatten()
        .any(|principal| principal.cma_exclusion_mask.test(&exclusion.raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;
    use pmsi_tables::{
        DiagnosisTable, ExclusionInfo, GhmDecisionNode, GhmRootTable, ListMask,
    };
    use std::borrow::Cow;

    const ROOT: GhmRootCode = GhmRootCode::new(4, b'M', 2);
    const TREE_GHM: GhmCode = GhmCode::new(4, b'M', 2, 0);

    fn root_info() -> GhmRootInfo {
        GhmRootInfo {
            ghm_root: ROOT,
            confirm_duration_threshold: 0,
            allow_ambulatory: false,
            short_duration_threshold: 0,
            young_age_threshold: 2,
            young_severity_limit: 1,
            old_age_threshold: 80,
            old_severity_limit: 1,
            ..Default::default()
        }
    }

    fn index_with(diagnoses: Vec<DiagnosisInfo>, exclusions: Vec<ExclusionInfo>) -> TableIndex {
        base_index()
            .with_diagnoses(DiagnosisTable::new(diagnoses, exclusions))
            .with_ghm_nodes(vec![GhmDecisionNode::Leaf {
                ghm: TREE_GHM,
                error: 0,
            }])
            .with_ghm_roots(GhmRootTable::new(vec![root_info()]))
    }

    fn prepared<'a>(index: &'a TableIndex, duration: i32, others: &[&str]) -> PreparedStay<'a> {
        let record = stay(1);
        let mut prep = PreparedStay::new(Cow::Owned(record));
        prep.duration = duration;
        prep.age = 38;
        prep.age_days = 14_000;
        prep.main_diag_info = index.find_diagnosis(diag("J189"), 1);
        prep.diagnoses = prep.main_diag_info.into_iter().collect();
        for code in others {
            prep.diagnoses.extend(index.find_diagnosis(diag(code), 1));
        }
        prep
    }

    fn complication(code: &str, severity: i8) -> DiagnosisInfo {
        let mut info = diagnosis_info(code, 10, 1);
        info.severity = severity;
        info
    }

    #[test]
    fn severity_is_limited_by_duration() {
        let mut diagnoses = base_diagnoses();
        diagnoses.push(complication("E871", 3));
        let index = index_with(diagnoses, Vec::new());
        let mut errors = ErrorSet::new();

        let prep = prepared(&index, 3, &["E871"]);
        let pick = pick_ghm(&index, &prep, 1, ClassifyFlags::default(), &mut errors);
        assert_eq!(pick.ghm, TREE_GHM.with_mode(b'2'));

        let prep = prepared(&index, 10, &["E871"]);
        let pick = pick_ghm(&index, &prep, 1, ClassifyFlags::default(), &mut errors);
        assert_eq!(pick.ghm, TREE_GHM.with_mode(b'4'));
        assert!(errors.is_empty());
    }

    #[test]
    fn raac_keeps_full_severity_for_ghs() {
        let mut diagnoses = base_diagnoses();
        diagnoses.push(complication("E871", 3));
        let index = index_with(diagnoses, Vec::new());
        let mut root = root_info();
        root.allow_raac = true;

        let mut prep = prepared(&index, 3, &["E871"]);
        prep.stay.to_mut().flags.insert(StayFlags::RAAC);
        let pick = run_ghm_severity(&index, &prep, TREE_GHM, &root);
        assert_eq!(pick.ghm, TREE_GHM.with_mode(b'2'));
        assert_eq!(pick.ghm_for_ghs, TREE_GHM.with_mode(b'4'));
    }

    #[test]
    fn excluded_complications_do_not_count() {
        let mut diagnoses = base_diagnoses();
        // J189 excludes through bit 0x1 of byte 4 of exclusion sets
        diagnoses[1].cma_exclusion_mask = ListMask::new(4, 0x1);
        let mut excluded = complication("E871", 3);
        excluded.exclusion_set_idx = 1;
        diagnoses.push(excluded);

        let mut raw = [0u8; 232];
        raw[4] = 0x1;
        let exclusions = vec![ExclusionInfo { raw: [0; 232] }, ExclusionInfo { raw }];
        let index = index_with(diagnoses, exclusions);

        let prep = prepared(&index, 10, &["E871"]);
        let pick = run_ghm_severity(&index, &prep, TREE_GHM, &root_info());
        assert_eq!(pick.ghm, TREE_GHM.with_mode(b'1'));
    }

    #[test]
    fn ambulatory_and_short_modes() {
        let index = index_with(base_diagnoses(), Vec::new());
        let mut root = root_info();
        root.allow_ambulatory = true;
        root.short_duration_threshold = 2;

        let prep = prepared(&index, 0, &[]);
        assert_eq!(run_ghm_severity(&index, &prep, TREE_GHM, &root).ghm.mode, b'J');
        let prep = prepared(&index, 1, &[]);
        assert_eq!(run_ghm_severity(&index, &prep, TREE_GHM, &root).ghm.mode, b'T');
    }

    #[test]
    fn short_stays_need_confirmation() {
        let mut root = root_info();
        root.confirm_duration_threshold = 3;
        let index = index_with(base_diagnoses(), Vec::new())
            .with_ghm_roots(GhmRootTable::new(vec![root]));
        let mut errors = ErrorSet::new();

        let prep = prepared(&index, 1, &[]);
        let pick = pick_ghm(&index, &prep, 1, ClassifyFlags::default(), &mut errors);
        assert_eq!(pick.ghm, GhmCode::GROUPING_ERROR);
        assert_eq!(errors.main_error, 120);

        let mut errors = ErrorSet::new();
        let flags = ClassifyFlags {
            ignore_confirmation: true,
            ..Default::default()
        };
        let pick = pick_ghm(&index, &prep, 1, flags, &mut errors);
        assert_eq!(pick.ghm, TREE_GHM.with_mode(b'1'));

        let mut prep = prepared(&index, 1, &[]);
        prep.stay.to_mut().flags.insert(StayFlags::CONFIRMED);
        let mut errors = ErrorSet::new();
        let pick = pick_ghm(&index, &prep, 1, ClassifyFlags::default(), &mut errors);
        assert_eq!(pick.ghm, TREE_GHM.with_mode(b'1'));
        assert!(errors.test(223));
    }

    #[test]
    fn error_leaves_skip_root_and_confirmation_checks() {
        let mut root = root_info();
        root.confirm_duration_threshold = 3;
        // No root entry exists for 90Z00Z
        let index = index_with(base_diagnoses(), Vec::new())
            .with_ghm_nodes(vec![GhmDecisionNode::Leaf {
                ghm: GhmCode::GROUPING_ERROR,
                error: 80,
            }])
            .with_ghm_roots(GhmRootTable::new(vec![root]));
        let prep = prepared(&index, 1, &[]);
        let mut errors = ErrorSet::new();

        let pick = pick_ghm(&index, &prep, 1, ClassifyFlags::default(), &mut errors);
        assert_eq!(pick.ghm, GhmCode::GROUPING_ERROR);
        assert_eq!(pick.ghm_for_ghs, GhmCode::GROUPING_ERROR);
        assert_eq!(errors.main_error, 80);
        assert!(!errors.test(4));
        assert!(!errors.test(120));
    }

    #[test]
    fn missing_root_is_a_table_error() {
        let index = index_with(base_diagnoses(), Vec::new())
            .with_ghm_roots(GhmRootTable::default());
        let prep = prepared(&index, 3, &[]);
        let mut errors = ErrorSet::new();

        let pick = pick_ghm(&index, &prep, 1, ClassifyFlags::default(), &mut errors);
        assert_eq!(pick.ghm, GhmCode::TABLE_ERROR);
        assert_eq!(errors.main_error, 4);
    }
}
