//! GHM constraints: which stay durations can lead to each GHM.
//!
//! Walks the decision tree of one table index from its root, narrowing a
//! duration mask at each duration or session test, and merges the masks
//! reaching each leaf per final GHM (ambulatory, short stay or severity
//! variant). Tests on durations of 31 nights or more are not specialized
//! and mark the map incomplete.

use pmsi_tables::{GhmCode, GhmDecisionNode, GhmTest, TableIndex};
use serde::Serialize;
use std::collections::BTreeMap;

/// Bit `n` set when a duration of `n` nights is feasible.
pub type DurationMask = u32;

/// Highest duration a mask can describe.
pub const MAX_DURATION: u32 = 30;

/// Every duration from 0 to [`MAX_DURATION`].
pub const FULL_MASK: DurationMask = (1 << (MAX_DURATION + 1)) - 1;

/// Minimal duration for severities 1 to 4.
const SEVERITY_MINIMUM_DURATIONS: [u32; 4] = [0, 3, 4, 5];

/// Mask of durations strictly below `duration`.
fn below(duration: u32) -> DurationMask {
    if duration > MAX_DURATION {
        FULL_MASK
    } else {
        (1 << duration) - 1
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConstraintWarnings {
    /// Reached with no session although duration 0 is feasible: such stays
    /// probably belong in CMD 28.
    pub prefer_cmd28: bool,
}

/// Feasible durations for one GHM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GhmConstraint {
    pub ghm: GhmCode,
    pub durations: DurationMask,
    pub warnings: ConstraintWarnings,
}

impl GhmConstraint {
    /// Durations that remain once a GHS minimum duration applies.
    pub fn durations_from(&self, minimum_duration: i32) -> DurationMask {
        let minimum = u32::try_from(minimum_duration).unwrap_or(0);
        self.durations & !below(minimum)
    }

    /// The CMD 28 warning matters only while duration 0 stays feasible.
    pub fn prefer_cmd28_from(&self, minimum_duration: i32) -> bool {
        self.warnings.prefer_cmd28 && self.durations_from(minimum_duration) & 1 != 0
    }
}

/// All constraints of one index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConstraintMap {
    pub constraints: BTreeMap<GhmCode, GhmConstraint>,
    /// Some tests could not be specialized; masks may be too wide.
    pub incomplete: bool,
}

impl ConstraintMap {
    pub fn get(&self, ghm: GhmCode) -> Option<&GhmConstraint> {
        self.constraints.get(&ghm)
    }

    fn merge(&mut self, ghm: GhmCode, durations: DurationMask, warnings: ConstraintWarnings) {
        if durations == 0 {
            return;
        }
        self.constraints
            .entry(ghm)
            .and_modify(|prev| {
                prev.durations |= durations;
                prev.warnings.prefer_cmd28 |= warnings.prefer_cmd28;
            })
            .or_insert(GhmConstraint {
                ghm,
                durations,
                warnings,
            });
    }
}

/// Structural problem of a decision tree that stops the walk.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConstraintError {
    #[error("decision tree is empty")]
    EmptyTree,
    #[error("decision tree walk from node {node} exceeds {limit} steps (cycle?)")]
    TooDeep { node: usize, limit: usize },
    #[error("decision tree node {node} points outside of the tree")]
    OutOfRange { node: usize },
}

#[derive(Clone, Copy)]
struct Branch {
    node_idx: usize,
    depth: usize,
    durations: DurationMask,
    warnings: ConstraintWarnings,
}

impl Branch {
    fn child(self, node_idx: usize, durations: DurationMask) -> Branch {
        Branch {
            node_idx,
            depth: self.depth + 1,
            durations: self.durations & durations,
            warnings: self.warnings,
        }
    }
}

/// Computes the feasible durations of every GHM reachable in `index`.
pub fn compute_constraints(index: &TableIndex) -> Result<ConstraintMap, ConstraintError> {
    let nodes = index.ghm_nodes();
    if nodes.is_empty() {
        return Err(ConstraintError::EmptyTree);
    }

    let mut map = ConstraintMap::default();
    let mut stack = vec![Branch {
        node_idx: 0,
        depth: 0,
        durations: FULL_MASK,
        warnings: ConstraintWarnings::default(),
    }];

    while let Some(branch) = stack.pop() {
        if branch.depth >= nodes.len() {
            return Err(ConstraintError::TooDeep {
                node: branch.node_idx,
                limit: nodes.len(),
            });
        }
        let Some(node) = nodes.get(branch.node_idx) else {
            return Err(ConstraintError::OutOfRange {
                node: branch.node_idx,
            });
        };

        match *node {
            GhmDecisionNode::Test {
                test,
                params,
                children_idx,
                children_count,
            } => {
                if children_idx + children_count > nodes.len() {
                    return Err(ConstraintError::OutOfRange {
                        node: branch.node_idx,
                    });
                }
                let param = u32::try_from(GhmDecisionNode::param16(params)).unwrap_or(u32::MAX);

                // Children are pushed in reverse so that they are visited in order
                match (test, children_count) {
                    (GhmTest::DurationBelow, 2) if param <= MAX_DURATION => {
                        stack.push(branch.child(children_idx + 1, below(param)));
                        stack.push(branch.child(children_idx, !below(param)));
                    }
                    (GhmTest::DurationEquals, 2) if param <= MAX_DURATION => {
                        stack.push(branch.child(children_idx + 1, 1 << param));
                        stack.push(branch.child(children_idx, !(1 << param)));
                    }
                    (GhmTest::SessionCountEquals, 2) if param == 0 => {
                        let mut no_session = branch.child(children_idx + 1, FULL_MASK);
                        no_session.warnings.prefer_cmd28 = true;
                        stack.push(no_session);
                        stack.push(branch.child(children_idx, 1));
                    }
                    _ => {
                        match test {
                            GhmTest::DurationBelow | GhmTest::DurationEquals => {
                                tracing::warn!(
                                    node = branch.node_idx,
                                    duration = param,
                                    "incomplete GHM constraints, duration test beyond {} nights",
                                    MAX_DURATION
                                );
                                map.incomplete = true;
                            }
                            GhmTest::SessionCountEquals => {
                                tracing::warn!(
                                    node = branch.node_idx,
                                    sessions = param,
                                    "incomplete GHM constraints, non-zero session count test"
                                );
                                map.incomplete = true;
                            }
                            _ => {}
                        }
                        for idx in (children_idx..children_idx + children_count).rev() {
                            stack.push(branch.child(idx, FULL_MASK));
                        }
                    }
                }
            }
            GhmDecisionNode::Jump { target } => {
                stack.push(branch.child(target, FULL_MASK));
            }
            GhmDecisionNode::Leaf { ghm, .. } => {
                merge_leaf(index, ghm, branch, &mut map);
            }
        }
    }

    tracing::debug!(
        constraints = map.constraints.len(),
        incomplete = map.incomplete,
        "computed GHM constraints"
    );
    Ok(map)
}

fn merge_leaf(index: &TableIndex, ghm: GhmCode, branch: Branch, map: &mut ConstraintMap) {
    if ghm.is_error() {
        return;
    }
    let Some(root_info) = index.find_ghm_root(ghm.root()) else {
        tracing::warn!(root = %ghm.root(), "incomplete GHM constraints, unknown GHM root");
        map.incomplete = true;
        return;
    };

    let mut durations = branch.durations;

    // Each variant takes its durations away from the following ones
    if root_info.allow_ambulatory {
        map.merge(ghm.with_mode(b'J'), durations & 1, branch.warnings);
        durations &= !1;
    }
    if root_info.short_duration_threshold > 0 {
        let short = below(u32::try_from(root_info.short_duration_threshold).unwrap_or(0));
        map.merge(ghm.with_mode(b'T'), durations & short, branch.warnings);
        durations &= !short;
    }

    match ghm.mode {
        0 => {
            for (severity, &minimum) in (0u8..).zip(SEVERITY_MINIMUM_DURATIONS.iter()) {
                map.merge(
                    ghm.with_mode(b'1' + severity),
                    durations & !below(minimum),
                    branch.warnings,
                );
            }
        }
        b'J' | b'T' => {}
        _ => map.merge(ghm, durations, branch.warnings),
    }
}

/// Renders a mask as ranges, e.g. `0-4, 7, 10-30+`.
pub fn format_durations(durations: DurationMask) -> String {
    let mut parts = Vec::new();
    let mut duration = 0;
    while duration <= MAX_DURATION {
        if durations & (1 << duration) == 0 {
            duration += 1;
            continue;
        }
        let start = duration;
        while duration < MAX_DURATION && durations & (1 << (duration + 1)) != 0 {
            duration += 1;
        }
        let suffix = if duration == MAX_DURATION { "+" } else { "" };
        if start == duration {
            parts.push(format!("{start}{suffix}"));
        } else {
            parts.push(format!("{start}-{duration}{suffix}"));
        }
        duration += 1;
    }
    parts.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pmsi_tables::{Date, GhmRootCode, GhmRootInfo, GhmRootTable};

    const GHM_A: GhmCode = GhmCode::new(4, b'M', 2, 0);
    const GHM_B: GhmCode = GhmCode::new(4, b'M', 3, 0);

    fn test_node(test: GhmTest, param: u8, children_idx: usize) -> GhmDecisionNode {
        GhmDecisionNode::Test {
            test,
            params: [0, param],
            children_idx,
            children_count: 2,
        }
    }

    fn leaf(ghm: GhmCode) -> GhmDecisionNode {
        GhmDecisionNode::Leaf { ghm, error: 0 }
    }

    fn root(seq: i8) -> GhmRootInfo {
        GhmRootInfo {
            ghm_root: GhmRootCode::new(4, b'M', seq),
            ..Default::default()
        }
    }

    fn index(nodes: Vec<GhmDecisionNode>, roots: Vec<GhmRootInfo>) -> TableIndex {
        TableIndex::new(Date::new(2019, 1, 1), Date::new(2020, 1, 1))
            .with_ghm_nodes(nodes)
            .with_ghm_roots(GhmRootTable::new(roots))
    }

    fn mode(ghm: GhmCode, mode: u8) -> GhmCode {
        ghm.with_mode(mode)
    }

    #[test]
    fn duration_threshold_splits_the_range() {
        let index = index(
            vec![
                test_node(GhmTest::DurationBelow, 5, 1),
                leaf(GhmCode::new(4, b'M', 2, b'Z')),
                leaf(GhmCode::new(4, b'M', 3, b'Z')),
            ],
            vec![root(2), root(3)],
        );
        let map = compute_constraints(&index).unwrap();

        let above = map.get(GhmCode::new(4, b'M', 2, b'Z')).unwrap().durations;
        let below = map.get(GhmCode::new(4, b'M', 3, b'Z')).unwrap().durations;
        assert_eq!(below, 0b1_1111);
        assert_eq!(above, FULL_MASK & !0b1_1111);
        assert_eq!(above & below, 0);
        assert_eq!(above | below, FULL_MASK);
        assert!(!map.incomplete);
    }

    #[test]
    fn severities_follow_minimum_durations() {
        let index = index(vec![leaf(GHM_A)], vec![root(2)]);
        let map = compute_constraints(&index).unwrap();

        assert_eq!(map.get(mode(GHM_A, b'1')).unwrap().durations, FULL_MASK);
        assert_eq!(map.get(mode(GHM_A, b'2')).unwrap().durations, FULL_MASK & !0b111);
        assert_eq!(map.get(mode(GHM_A, b'4')).unwrap().durations, FULL_MASK & !0b1_1111);
        assert_eq!(map.constraints.len(), 4);
    }

    #[test]
    fn ambulatory_and_short_variants_come_first() {
        let mut info = root(2);
        info.allow_ambulatory = true;
        info.short_duration_threshold = 3;
        let index = index(vec![leaf(GHM_A)], vec![info]);
        let map = compute_constraints(&index).unwrap();

        assert_eq!(map.get(mode(GHM_A, b'J')).unwrap().durations, 0b1);
        assert_eq!(map.get(mode(GHM_A, b'T')).unwrap().durations, 0b110);
        assert_eq!(map.get(mode(GHM_A, b'1')).unwrap().durations, FULL_MASK & !0b111);
    }

    #[test]
    fn exact_duration_and_jumps() {
        let index = index(
            vec![
                GhmDecisionNode::Jump { target: 1 },
                test_node(GhmTest::DurationEquals, 1, 2),
                leaf(GhmCode::new(4, b'M', 2, b'Z')),
                leaf(GhmCode::new(4, b'M', 3, b'Z')),
            ],
            vec![root(2), root(3)],
        );
        let map = compute_constraints(&index).unwrap();
        assert_eq!(map.get(GhmCode::new(4, b'M', 3, b'Z')).unwrap().durations, 0b10);
        assert_eq!(
            map.get(GhmCode::new(4, b'M', 2, b'Z')).unwrap().durations,
            FULL_MASK & !0b10
        );
    }

    #[test]
    fn sessions_restrict_and_warn() {
        let index = index(
            vec![
                test_node(GhmTest::SessionCountEquals, 0, 1),
                leaf(GhmCode::new(4, b'M', 2, b'Z')),
                leaf(GhmCode::new(4, b'M', 3, b'Z')),
            ],
            vec![root(2), root(3)],
        );
        let map = compute_constraints(&index).unwrap();

        let sessions = map.get(GhmCode::new(4, b'M', 2, b'Z')).unwrap();
        assert_eq!(sessions.durations, 0b1);
        assert!(!sessions.warnings.prefer_cmd28);

        let no_session = map.get(GhmCode::new(4, b'M', 3, b'Z')).unwrap();
        assert!(no_session.warnings.prefer_cmd28);
        assert!(no_session.prefer_cmd28_from(0));
        assert!(!no_session.prefer_cmd28_from(2));
        assert_eq!(no_session.durations_from(2), FULL_MASK & !0b11);
    }

    #[test]
    fn long_durations_mark_the_map_incomplete() {
        let index = index(
            vec![
                test_node(GhmTest::DurationBelow, 40, 1),
                leaf(GHM_A),
                leaf(GHM_B),
            ],
            vec![root(2), root(3)],
        );
        let map = compute_constraints(&index).unwrap();
        assert!(map.incomplete);
        assert_eq!(map.get(mode(GHM_A, b'1')).unwrap().durations, FULL_MASK);
        assert_eq!(map.get(mode(GHM_B, b'1')).unwrap().durations, FULL_MASK);
    }

    #[test]
    fn cycles_are_reported() {
        let index = index(
            vec![
                GhmDecisionNode::Jump { target: 1 },
                GhmDecisionNode::Jump { target: 0 },
            ],
            vec![],
        );
        assert!(matches!(
            compute_constraints(&index),
            Err(ConstraintError::TooDeep { .. })
        ));
    }

    #[test]
    fn children_outside_the_tree_are_reported() {
        let index = index(vec![test_node(GhmTest::Sex, 0, 4)], vec![]);
        assert_eq!(
            compute_constraints(&index),
            Err(ConstraintError::OutOfRange { node: 0 })
        );
    }

    #[test]
    fn error_leaves_are_ignored() {
        let index = index(vec![leaf(GhmCode::GROUPING_ERROR)], vec![]);
        let map = compute_constraints(&index).unwrap();
        assert!(map.constraints.is_empty());
        assert!(!map.incomplete);
    }

    #[test]
    fn durations_format_as_ranges() {
        assert_eq!(format_durations(0b1001_1101), "0, 2-4, 7");
        assert_eq!(format_durations(FULL_MASK & !0b11), "2-30+");
        assert_eq!(format_durations(0), "");
    }
}
