//! GHM decision tree interpreter.
//!
//! Walks the decision tree of a table index for one prepared stay. Test
//! nodes return a child offset; the walk ends on a leaf holding the GHM.
//! Malformed trees (child offsets out of range, cycles) end the walk with
//! the table error GHM instead of looping or panicking.

use crate::error_set::ErrorSet;
use crate::types::PreparedStay;
use pmsi_tables::{DiagnosisCode, DiagnosisInfo, GhmCode, GhmDecisionNode, GhmTest, TableIndex};
use std::collections::HashSet;
use std::ptr;

/// Walk state. Main and linked diagnoses start as the prepared ones but
/// can be swapped by the tree itself.
struct TreeContext<'a, 'p> {
    index: &'a TableIndex,
    prep: &'p PreparedStay<'a>,
    main_diag_info: Option<&'a DiagnosisInfo>,
    linked_diag_info: Option<&'a DiagnosisInfo>,
    gnn: i32,
}

fn same_info(a: Option<&DiagnosisInfo>, b: Option<&DiagnosisInfo>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => ptr::eq(a, b),
        (None, None) => true,
        _ => false,
    }
}

impl<'a> TreeContext<'a, '_> {
    fn is_main_or_linked(&self, info: &DiagnosisInfo) -> bool {
        self.main_diag_info.is_some_and(|main| ptr::eq(main, info))
            || self.linked_diag_info.is_some_and(|linked| ptr::eq(linked, info))
    }

    fn is_linked(&self, info: &DiagnosisInfo) -> bool {
        self.linked_diag_info.is_some_and(|linked| ptr::eq(linked, info))
    }

    /// Runs one test node. Negative results are invalid.
    fn execute(&mut self, test: GhmTest, params: [u8; 2], errors: &mut ErrorSet) -> i32 {
        let prep = self.prep;
        let stay = &*prep.stay;
        let [p0, p1] = params;

        let result = match test {
            GhmTest::MainDiagnosisByte => {
                return self.main_diag_info.map_or(0, |info| i32::from(info.byte(p0)));
            }
            GhmTest::AnyProcedureMask => prep
                .procedures
                .iter()
                .any(|info| info.test(usize::from(p0), p1)),
            GhmTest::AgeAbove => {
                if p1 == 1 {
                    prep.age_days > i32::from(p0)
                } else {
                    prep.age > i32::from(p0)
                }
            }
            GhmTest::MainDiagnosisMask => self.main_diag_info.is_some_and(|info| info.test(p0, p1)),
            GhmTest::OtherDiagnosisMask => prep
                .diagnoses
                .iter()
                .any(|&info| !self.is_main_or_linked(info) && info.test(p0, p1)),
            GhmTest::AnyDiagnosisMask => prep.diagnoses.iter().any(|info| info.test(p0, p1)),
            GhmTest::MajorProceduresMask => {
                let mut matched = false;
                for info in prep.procedures.iter().filter(|info| info.test(0, 0x80)) {
                    if !info.test(usize::from(p0), p1) {
                        return 0;
                    }
                    matched = true;
                }
                matched
            }
            GhmTest::TwoProceduresMask => {
                let mut prev = None;
                let mut matches = 0;
                for &info in &prep.procedures {
                    if prev.is_some_and(|prev| ptr::eq(prev, info)) {
                        continue;
                    }
                    prev = Some(info);
                    if info.test(usize::from(p0), p1) {
                        matches += 1;
                    }
                }
                matches >= 2
            }
            GhmTest::MainDiagnosisByteEquals => {
                self.main_diag_info.is_some_and(|info| info.byte(p0) == p1)
            }
            GhmTest::Sex => i32::from(stay.sex) == i32::from(p0) - i32::from(b'0'),
            GhmTest::TwoDiagnosesMask => {
                let mut seen: HashSet<DiagnosisCode> = HashSet::new();
                let mut special_matches = 0;
                for &info in &prep.diagnoses {
                    if info.test(p0, p1) && seen.insert(info.diag) && self.is_main_or_linked(info) {
                        special_matches += 1;
                    }
                }
                seen.len() >= 2 && seen.len() > special_matches
            }
            GhmTest::ModeOrOrigin => {
                let value = match p1 {
                    0 => stay.exit.mode,
                    1 => stay.exit.destination,
                    2 => stay.entry.mode,
                    3 => stay.entry.origin,
                    _ => {
                        tracing::error!(field = p1, "unknown mode or origin field in GHM tree");
                        return -1;
                    }
                };
                value == b'0'.wrapping_add(p0)
            }
            GhmTest::DurationBelow => prep.duration < GhmDecisionNode::param16(params),
            GhmTest::LinkedDiagnosisMask => {
                self.linked_diag_info.is_some_and(|info| info.test(p0, p1))
            }
            GhmTest::SetError => {
                errors.error(i16::from(p0));
                false
            }
            GhmTest::DurationEquals => prep.duration == GhmDecisionNode::param16(params),
            GhmTest::SessionCountEquals => {
                i32::from(stay.session_count) == GhmDecisionNode::param16(params)
            }
            GhmTest::ProcedureActivity => {
                let bit = 1u8.checked_shl(u32::from(p0)).unwrap_or(0);
                prep.proc_activities & bit != 0
            }
            GhmTest::SwapLinkedDiagnosis => {
                if let Some(linked) = self.linked_diag_info {
                    if same_info(Some(linked), prep.linked_diag_info)
                        && (linked.cmd != 0 || linked.jump != 3)
                    {
                        std::mem::swap(&mut self.main_diag_info, &mut self.linked_diag_info);
                    }
                }
                false
            }
            GhmTest::LinkedDiagnosisSwapped => {
                !same_info(self.linked_diag_info, prep.linked_diag_info)
            }
            GhmTest::DiagnosisMaskExceptLinked => prep
                .diagnoses
                .iter()
                .any(|&info| !self.is_linked(info) && info.test(p0, p1)),
            GhmTest::GnnBetween => (i32::from(p0)..=i32::from(p1)).contains(&self.gnn),
            GhmTest::ComputeGnn => {
                if self.gnn == 0 {
                    let gestational_age = match stay.gestational_age {
                        0 => 99,
                        age => i32::from(age),
                    };
                    let weight = i32::from(stay.newborn_weight);
                    if let Some(cell) = self
                        .index
                        .gnn_cells()
                        .iter()
                        .find(|cell| cell.test(0, weight) && cell.test(1, gestational_age))
                    {
                        self.gnn = cell.value;
                    }
                }
                false
            }
            GhmTest::ClearNeonatalErrors => {
                errors.remove(80);
                errors.remove(222);
                false
            }
            GhmTest::DiagnosisCategory => prep
                .diagnoses
                .iter()
                .any(|info| info.cmd == p0 && info.jump == p1),
            GhmTest::NewbornWeightBelow => {
                stay.newborn_weight != 0
                    && i32::from(stay.newborn_weight) < GhmDecisionNode::param16(params)
            }
            GhmTest::DiagnosisCategoryExceptLinked => prep
                .diagnoses
                .iter()
                .any(|&info| !self.is_linked(info) && info.cmd == p0 && info.jump == p1),
        };

        i32::from(result)
    }
}

/// Walks the decision tree of `index` for `prep`.
///
/// Leaf errors and tree-raised errors go to `errors`. A malformed tree
/// yields [`GhmCode::TABLE_ERROR`] with error 4.
pub fn run_ghm_tree<'a>(
    index: &'a TableIndex,
    prep: &PreparedStay<'a>,
    errors: &mut ErrorSet,
) -> GhmCode {
    let nodes = index.ghm_nodes();

    let mut ctx = TreeContext {
        index,
        prep,
        main_diag_info: prep.main_diag_info,
        linked_diag_info: prep.linked_diag_info,
        gnn: 0,
    };

    // Every node is visited at most once by a well-formed tree
    let mut node_idx = 0;
    for _ in 0..nodes.len() {
        let Some(node) = nodes.get(node_idx) else {
            tracing::error!(node_idx, "GHM tree node out of range");
            break;
        };

        match *node {
            GhmDecisionNode::Test {
                test,
                params,
                children_idx,
                children_count,
            } => {
                let result = ctx.execute(test, params, errors);
                match usize::try_from(result).ok().filter(|&r| r < children_count) {
                    Some(offset) => node_idx = children_idx + offset,
                    None => {
                        tracing::error!(
                            ?test,
                            result,
                            children_count,
                            "GHM tree test result out of range"
                        );
                        errors.set(4, 2);
                        return GhmCode::TABLE_ERROR;
                    }
                }
            }
            GhmDecisionNode::Jump { target } => node_idx = target,
            GhmDecisionNode::Leaf { ghm, error } => {
                if error != 0 {
                    errors.error(error);
                }
                return ghm;
            }
        }
    }

    tracing::error!("GHM tree walk did not reach a leaf");
    errors.set(4, 2);
    GhmCode::TABLE_ERROR
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;
    use std::borrow::Cow;

    const GHM_A: GhmCode = GhmCode::new(4, b'M', 2, 0);
    const GHM_B: GhmCode = GhmCode::new(4, b'M', 3, 0);

    fn test_node(
        test: GhmTest,
        params: [u8; 2],
        children_idx: usize,
        children_count: usize,
    ) -> GhmDecisionNode {
        GhmDecisionNode::Test {
            test,
            params,
            children_idx,
            children_count,
        }
    }

    fn leaf(ghm: GhmCode) -> GhmDecisionNode {
        GhmDecisionNode::Leaf { ghm, error: 0 }
    }

    fn index(nodes: Vec<GhmDecisionNode>) -> TableIndex {
        base_index().with_ghm_nodes(nodes)
    }

    fn prepared<'a>(index: &'a TableIndex, main: &str, linked: Option<&str>) -> PreparedStay<'a> {
        let mut record = stay(1);
        record.main_diagnosis = diag(main);
        let mut prep = PreparedStay::new(Cow::Owned(record));
        prep.duration = 3;
        prep.age = 38;
        prep.age_days = 14_000;
        prep.main_diag_info = index.find_diagnosis(diag(main), 1);
        prep.linked_diag_info = linked.and_then(|code| index.find_diagnosis(diag(code), 1));
        prep.diagnoses = prep
            .main_diag_info
            .into_iter()
            .chain(prep.linked_diag_info)
            .collect();
        prep
    }

    #[test]
    fn test_result_selects_child() {
        let index = index(vec![
            test_node(GhmTest::Sex, [b'2', 0], 1, 2),
            leaf(GHM_A),
            leaf(GHM_B),
        ]);
        let prep = prepared(&index, "J189", None);
        let mut errors = ErrorSet::new();

        // Men are not sex 2: first child
        assert_eq!(run_ghm_tree(&index, &prep, &mut errors), GHM_A);
        assert!(errors.is_empty());
    }

    #[test]
    fn leaf_errors_are_reported() {
        let index = index(vec![GhmDecisionNode::Leaf {
            ghm: GhmCode::GROUPING_ERROR,
            error: 36,
        }]);
        let prep = prepared(&index, "J189", None);
        let mut errors = ErrorSet::new();

        assert_eq!(run_ghm_tree(&index, &prep, &mut errors), GhmCode::GROUPING_ERROR);
        assert_eq!(errors.main_error, 36);
    }

    #[test]
    fn out_of_range_result_is_a_table_error() {
        // Byte 0 of J189 is its CMD (4), only one child
        let index = index(vec![
            test_node(GhmTest::MainDiagnosisByte, [0, 0], 1, 1),
            leaf(GHM_A),
        ]);
        let prep = prepared(&index, "J189", None);
        let mut errors = ErrorSet::new();

        assert_eq!(run_ghm_tree(&index, &prep, &mut errors), GhmCode::TABLE_ERROR);
        assert_eq!((errors.main_error, errors.priority), (4, 2));
    }

    #[test]
    fn cycles_end_the_walk() {
        let index = index(vec![
            GhmDecisionNode::Jump { target: 1 },
            GhmDecisionNode::Jump { target: 0 },
        ]);
        let prep = prepared(&index, "J189", None);
        let mut errors = ErrorSet::new();

        assert_eq!(run_ghm_tree(&index, &prep, &mut errors), GhmCode::TABLE_ERROR);
        assert!(errors.test(4));
    }

    #[test]
    fn linked_diagnosis_swap_is_visible() {
        let index = index(vec![
            test_node(GhmTest::SwapLinkedDiagnosis, [0, 0], 1, 1),
            test_node(GhmTest::LinkedDiagnosisSwapped, [0, 0], 2, 2),
            leaf(GHM_A),
            test_node(GhmTest::MainDiagnosisByteEquals, [0, 10], 4, 2),
            leaf(GHM_A),
            leaf(GHM_B),
        ]);
        let prep = prepared(&index, "J189", Some("E119"));
        let mut errors = ErrorSet::new();

        // E119 (CMD 10) became the main diagnosis
        assert_eq!(run_ghm_tree(&index, &prep, &mut errors), GHM_B);
        // The prepared stay itself is untouched
        assert_eq!(prep.main_diag_info.map(|info| info.diag), Some(diag("J189")));
    }

    #[test]
    fn two_diagnoses_need_a_non_principal_match() {
        let index = index(vec![
            test_node(GhmTest::TwoDiagnosesMask, [0, 0xFF], 1, 2),
            leaf(GHM_A),
            leaf(GHM_B),
        ]);
        let mut errors = ErrorSet::new();

        let prep = prepared(&index, "J189", Some("E119"));
        assert_eq!(run_ghm_tree(&index, &prep, &mut errors), GHM_A);

        let mut prep = prepared(&index, "J189", None);
        prep.diagnoses.extend(index.find_diagnosis(diag("E119"), 1));
        assert_eq!(run_ghm_tree(&index, &prep, &mut errors), GHM_B);
    }

    #[test]
    fn mode_field_out_of_range_is_rejected() {
        let index = index(vec![
            test_node(GhmTest::ModeOrOrigin, [8, 7], 1, 2),
            leaf(GHM_A),
            leaf(GHM_B),
        ]);
        let prep = prepared(&index, "J189", None);
        let mut errors = ErrorSet::new();

        assert_eq!(run_ghm_tree(&index, &prep, &mut errors), GhmCode::TABLE_ERROR);
    }
}
