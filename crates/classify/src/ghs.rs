//! GHS selection: the first eligibility rule of the GHM that the stay
//! satisfies gives the GHS of the sector.

use crate::error_set::ErrorSet;
use crate::severity::run_ghm_severity;
use crate::tree::run_ghm_tree;
use crate::types::PreparedStay;
use pmsi_stays::StayFlags;
use pmsi_tables::{
    AuthorizationSet, GhmCode, GhsCode, GhsSpecialMode, GhmToGhsInfo, Sector, TableIndex,
};

/// Selected GHS and the duration used to price it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GhsPick {
    pub ghs: GhsCode,
    pub ghs_duration: i32,
}

/// Picks the GHS for `ghm` (the GHM for GHS selection).
///
/// Emergency unit stays (UHCD) pick their GHS as if they lasted zero
/// nights: the GHM is recomputed on a zero-duration copy, eligibility rules
/// still see the real stay.
pub fn pick_ghs<'a>(
    index: &'a TableIndex,
    authorizations: &AuthorizationSet,
    prep: &PreparedStay<'a>,
    mono_preps: &[PreparedStay<'a>],
    ghm: GhmCode,
    sector: Sector,
    errors: &mut ErrorSet,
) -> GhsPick {
    let mut pick = GhsPick {
        ghs: GhsCode::NONE,
        ghs_duration: prep.duration,
    };
    if !ghm.is_valid() || ghm.is_error() {
        return pick;
    }

    let stay = &*prep.stay;
    let mut ghm = ghm;

    if prep.duration > 0
        && stay.entry.mode == b'8'
        && stay.exit.mode == b'8'
        && mono_preps.iter().all(|mono_prep| mono_prep.auth_type == 7)
    {
        pick.ghs_duration = 0;

        // Confirmation makes no sense with a forced duration, only the tree
        // and the severity are rerun. Their errors do not belong to the stay.
        let mut short_prep = prep.clone();
        short_prep.duration = 0;

        let mut rerun_errors = ErrorSet::new();
        ghm = run_ghm_tree(index, &short_prep, &mut rerun_errors);
        if let Some(root_info) = index.find_ghm_root(ghm.root()) {
            ghm = run_ghm_severity(index, &short_prep, ghm, root_info).ghm;
        }
    }

    let rules = index.find_compatible_ghs(ghm);
    if let Some(rule) = rules
        .iter()
        .find(|rule| test_ghs(authorizations, prep, mono_preps, ghm, rule, errors))
    {
        pick.ghs = rule.ghs(sector);
    }

    pick
}

/// Whether an outpatient stay must be graded above `max_category`.
fn test_gradation(
    prep: &PreparedStay,
    mono_preps: &[PreparedStay],
    ghm: GhmCode,
    max_category: u8,
    errors: &mut ErrorSet,
) -> bool {
    let stay = &*prep.stay;

    if ghm.cmd == 28
        || ghm.cmd == 15
        || prep.duration != 0
        || stay.exit.mode == b'9'
        || stay.exit.mode == b'7'
        || stay
            .flags
            .intersects(StayFlags::CONTEXT | StayFlags::HOSPITAL_USE | StayFlags::RESCRIPT)
        || mono_preps.iter().any(|mono_prep| mono_prep.auth_type == 7)
    {
        return true;
    }

    if prep.diagnoses.iter().any(|info| info.test(32, 0x8)) {
        return true;
    }
    if prep.procedures.iter().any(|info| {
        info.test(51, 0xE0)
            || info.test(22, 0x20)
            || info.test(31, 0x20)
            || info.test(38, 0x8)
            || info.test(44, 0x40)
    }) {
        return true;
    }

    if stay.interv_category == 0 {
        errors.set(241, 0);
    }
    stay.interv_category > max_category
}

fn test_ghs(
    authorizations: &AuthorizationSet,
    prep: &PreparedStay,
    mono_preps: &[PreparedStay],
    ghm: GhmCode,
    rule: &GhmToGhsInfo,
    errors: &mut ErrorSet,
) -> bool {
    let stay = &*prep.stay;

    if rule.minimum_age != 0 && prep.age < rule.minimum_age {
        return false;
    }

    let duration = if rule.unit_authorization != 0 {
        let mut authorized = false;
        let mut duration = 0;
        for mono_prep in mono_preps {
            if mono_prep.auth_type == rule.unit_authorization
                || authorizations
                    .test_facility_authorization(rule.unit_authorization, mono_prep.stay.exit.date)
            {
                duration += mono_prep.duration.max(1);
                authorized = true;
            }
        }
        if !authorized {
            return false;
        }
        duration
    } else {
        prep.duration
    };

    if rule.bed_authorization != 0
        && !mono_preps
            .iter()
            .any(|mono_prep| mono_prep.stay.bed_authorization == rule.bed_authorization)
    {
        return false;
    }
    if rule.minimum_duration != 0 && duration < rule.minimum_duration {
        return false;
    }

    match rule.special_mode {
        GhsSpecialMode::None => {}
        GhsSpecialMode::Diabetes2 | GhsSpecialMode::Diabetes3 => {
            let special_duration = match rule.special_mode {
                GhsSpecialMode::Diabetes2 => 2,
                _ => 3,
            };

            if !authorizations.test_facility_authorization(62, stay.exit.date) {
                return false;
            }
            if prep.duration >= special_duration {
                return false;
            }
            if stay.entry.mode != b'8' || stay.entry.origin == b'5' || stay.exit.mode != b'8' {
                return false;
            }
            let diabetes = [prep.main_diag_info, prep.linked_diag_info]
                .into_iter()
                .flatten()
                .any(|info| info.test(32, 0x20));
            if !diabetes {
                return false;
            }
        }
        GhsSpecialMode::Outpatient => {
            if test_gradation(prep, mono_preps, ghm, b'A', errors) {
                return false;
            }
            errors.set(242, 0);
        }
        GhsSpecialMode::Intermediary => {
            if test_gradation(prep, mono_preps, ghm, b'B', errors) {
                return false;
            }
        }
    }

    if rule.main_diagnosis_mask.value != 0
        && !prep
            .main_diag_info
            .is_some_and(|info| info.test_mask(rule.main_diagnosis_mask))
    {
        return false;
    }
    if rule.diagnosis_mask.value != 0
        && !prep
            .diagnoses
            .iter()
            .any(|info| info.test_mask(rule.diagnosis_mask))
    {
        return false;
    }
    rule.procedure_masks
        .iter()
        .all(|&mask| prep.procedures.iter().any(|info| info.test_mask(mask)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;
    use pmsi_tables::{GhmDecisionNode, GhmRootInfo, GhmRootTable, GhsTable, ListMask};
    use std::borrow::Cow;

    const GHM: GhmCode = GhmCode::new(4, b'M', 2, b'1');

    fn rule(ghs: i16) -> GhmToGhsInfo {
        GhmToGhsInfo {
            ghm: GHM,
            ghs: [GhsCode(ghs), GhsCode(ghs + 5000)],
            ..Default::default()
        }
    }

    fn index(rules: Vec<GhmToGhsInfo>) -> TableIndex {
        base_index()
            .with_ghm_nodes(vec![GhmDecisionNode::Leaf {
                ghm: GHM.with_mode(0),
                error: 0,
            }])
            .with_ghm_roots(GhmRootTable::new(vec![GhmRootInfo {
                ghm_root: GHM.root(),
                allow_ambulatory: true,
                old_age_threshold: 120,
                ..Default::default()
            }]))
            .with_ghs(GhsTable::new(rules))
    }

    fn prepared(index: &TableIndex, duration: i32) -> PreparedStay<'_> {
        let mut prep = PreparedStay::new(Cow::Owned(stay(1)));
        prep.duration = duration;
        prep.age = 38;
        prep.age_days = 14_000;
        prep.main_diag_info = index.find_diagnosis(diag("J189"), 1);
        prep.diagnoses = prep.main_diag_info.into_iter().collect();
        prep
    }

    #[test]
    fn first_matching_rule_wins() {
        let mut strict = rule(1001);
        strict.minimum_duration = 5;
        let index = index(vec![strict, rule(1002)]);
        let prep = prepared(&index, 3);
        let mono_preps = vec![prep.clone()];
        let mut errors = ErrorSet::new();

        let pick = pick_ghs(
            &index,
            &AuthorizationSet::default(),
            &prep,
            &mono_preps,
            GHM,
            Sector::Public,
            &mut errors,
        );
        assert_eq!(pick, GhsPick { ghs: GhsCode(1002), ghs_duration: 3 });

        let pick = pick_ghs(
            &index,
            &AuthorizationSet::default(),
            &prep,
            &mono_preps,
            GHM,
            Sector::Private,
            &mut errors,
        );
        assert_eq!(pick.ghs, GhsCode(6002));
    }

    #[test]
    fn unit_authorization_counts_authorized_days() {
        let mut intensive = rule(1001);
        intensive.unit_authorization = 3;
        intensive.minimum_duration = 2;
        let index = index(vec![intensive, rule(1002)]);

        let prep = prepared(&index, 3);
        let mut authorized = prep.clone();
        authorized.auth_type = 3;
        authorized.duration = 0;
        let other = prep.clone();
        let mut errors = ErrorSet::new();

        // Zero-night stays count as one day
        let mono_preps = vec![authorized.clone(), other];
        let pick = pick_ghs(
            &index,
            &AuthorizationSet::default(),
            &prep,
            &mono_preps,
            GHM,
            Sector::Public,
            &mut errors,
        );
        assert_eq!(pick.ghs, GhsCode(1002));

        authorized.duration = 2;
        let mono_preps = vec![authorized];
        let pick = pick_ghs(
            &index,
            &AuthorizationSet::default(),
            &prep,
            &mono_preps,
            GHM,
            Sector::Public,
            &mut errors,
        );
        assert_eq!(pick.ghs, GhsCode(1001));
    }

    #[test]
    fn procedure_masks_must_all_match() {
        let mut surgical = rule(1001);
        surgical.procedure_masks = vec![ListMask::new(10, 0x4)];
        let index = index(vec![surgical]);
        let prep = prepared(&index, 3);
        let mono_preps = vec![prep.clone()];
        let mut errors = ErrorSet::new();

        let pick = pick_ghs(
            &index,
            &AuthorizationSet::default(),
            &prep,
            &mono_preps,
            GHM,
            Sector::Public,
            &mut errors,
        );
        assert_eq!(pick.ghs, GhsCode::NONE);
    }

    #[test]
    fn emergency_unit_stays_are_priced_as_ambulatory() {
        let ambulatory = GhmToGhsInfo {
            ghm: GHM.with_mode(b'J'),
            ghs: [GhsCode(1010), GhsCode(6010)],
            ..Default::default()
        };
        let index = index(vec![rule(1002), ambulatory]);

        let prep = prepared(&index, 1);
        let mut mono_prep = prep.clone();
        mono_prep.auth_type = 7;
        let mono_preps = vec![mono_prep];
        let mut errors = ErrorSet::new();

        let pick = pick_ghs(
            &index,
            &AuthorizationSet::default(),
            &prep,
            &mono_preps,
            GHM,
            Sector::Public,
            &mut errors,
        );
        assert_eq!(pick, GhsPick { ghs: GhsCode(1010), ghs_duration: 0 });
    }

    #[test]
    fn error_ghm_has_no_ghs() {
        let index = index(vec![rule(1002)]);
        let prep = prepared(&index, 3);
        let mut errors = ErrorSet::new();

        let pick = pick_ghs(
            &index,
            &AuthorizationSet::default(),
            &prep,
            &[],
            GhmCode::GROUPING_ERROR,
            Sector::Public,
            &mut errors,
        );
        assert_eq!(pick.ghs, GhsCode::NONE);
    }
}
