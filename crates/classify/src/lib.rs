//! MCO stay classifier.
//!
//! Groups each admission (the consecutive stays sharing a bill id) into a
//! GHM, selects its GHS, counts supplement days, and prices the result.
//! Classification is a pure function of the tables, the authorizations and
//! the stays: bad stay data never fails a call, it yields an error GHM and
//! a main error code.
//!
//! Callers classifying in parallel give each worker its own [`Scratch`] and
//! whole admissions, never parts of one.

pub mod dispense;
pub mod error_set;
pub mod ghs;
pub mod prepare;
pub mod pricing;
pub mod severity;
pub mod supplements;
pub mod tree;
pub mod types;

#[cfg(test)]
mod testing;

pub use dispense::{dispense, dispense_pricings, DispenseMode, Due, UnknownDispenseMode};
pub use error_set::ErrorSet;
pub use pricing::{price, price_all, price_ghs, summarize, Pricing};
pub use types::{ClassifyFlags, ClassifyResult, PreparedSet, PreparedStay, Scratch};

use ghs::pick_ghs;
use pmsi_stays::{split_clusters, Stay};
use pmsi_tables::{AuthorizationSet, Sector, SupplementCounters, TableIndex, TableSet};
use prepare::prepare;
use severity::{pick_ghm, run_ghm_severity};
use supplements::count_supplements;
use tree::run_ghm_tree;

/// Results of a batch, admission by admission.
#[derive(Debug, Clone, Default)]
pub struct Classification<'a> {
    pub results: Vec<ClassifyResult<'a>>,
    /// One result per stay, filled with [`ClassifyFlags::mono`].
    pub mono_results: Vec<ClassifyResult<'a>>,
}

/// Classifies every admission of `stays`, in order.
pub fn classify<'a>(
    tables: &'a TableSet,
    authorizations: &AuthorizationSet,
    sector: Sector,
    stays: &'a [Stay],
    flags: ClassifyFlags,
) -> Classification<'a> {
    let mut scratch = Scratch::new();
    let mut classification = Classification::default();

    for cluster in split_clusters(stays) {
        let mono_results = flags.mono.then_some(&mut classification.mono_results);
        let result = classify_admission(
            tables,
            authorizations,
            sector,
            cluster,
            flags,
            &mut scratch,
            mono_results,
        );
        classification.results.push(result);
    }

    tracing::debug!(
        results = classification.results.len(),
        stays = stays.len(),
        "classified stays"
    );
    classification
}

/// Classifies one admission.
///
/// With `mono_results`, one result per stay is appended: each stay is
/// grouped alone (entry and exit modes normalized unless
/// [`ClassifyFlags::mono_original_stay`] is set).
pub fn classify_admission<'a>(
    tables: &'a TableSet,
    authorizations: &AuthorizationSet,
    sector: Sector,
    stays: &'a [Stay],
    flags: ClassifyFlags,
    scratch: &mut Scratch<'a>,
    mono_results: Option<&mut Vec<ClassifyResult<'a>>>,
) -> ClassifyResult<'a> {
    let Scratch {
        set,
        errors,
        mono_errors,
    } = scratch;
    errors.clear();

    let mut result = ClassifyResult::new(stays, sector);
    let prepared = prepare(tables, authorizations, stays, flags, set, errors);
    result.index = set.index;
    result.age = set.prep.age;
    result.duration = set.prep.duration;
    result.ghs_duration = set.prep.duration;

    let mut ghm_for_ghs = prepared.unwrap_or_default();
    result.ghm = ghm_for_ghs;
    if let (None, Some(index)) = (prepared, set.index) {
        result.main_stay_idx = set.main_prep;
        let pick = pick_ghm(index, &set.prep, set.mono_preps.len(), flags, errors);
        result.ghm = pick.ghm;
        ghm_for_ghs = pick.ghm_for_ghs;
    }
    if ghm_for_ghs != result.ghm {
        result.ghm_for_ghs = Some(ghm_for_ghs);
    }

    if let Some(index) = set.index {
        let pick = pick_ghs(
            index,
            authorizations,
            &set.prep,
            &set.mono_preps,
            ghm_for_ghs,
            sector,
            errors,
        );
        result.ghs = pick.ghs;
        result.ghs_duration = pick.ghs_duration;
    }
    result.main_error = errors.main_error;
    result.errors = errors.clone();

    let Some(index) = set.index else {
        if let Some(out) = mono_results {
            out.extend(stays.chunks(1).map(|stay| {
                let mut mono_result = ClassifyResult::new(stay, sector);
                mono_result.ghm = result.ghm;
                mono_result
            }));
        }
        return result;
    };

    match mono_results {
        Some(out) => {
            let start = out.len();
            if stays.len() == 1 {
                out.push(result.clone());
            } else {
                for (k, stay) in stays.chunks(1).enumerate() {
                    let mut mono_result = ClassifyResult::new(stay, sector);
                    mono_result.index = set.index;
                    mono_result.main_stay_idx = Some(0);

                    match set.mono_preps.get_mut(k) {
                        Some(mono_prep) if !result.ghm.is_error() => {
                            mono_result.age = mono_prep.age;
                            mono_result.duration = mono_prep.duration;
                            mono_result.ghs_duration = mono_prep.duration;

                            mono_prep.procedures.sort_by_key(|info| info.order_key());
                            classify_mono_stay(
                                index,
                                authorizations,
                                sector,
                                mono_prep,
                                flags,
                                mono_errors,
                                &mut mono_result,
                            );
                        }
                        mono_prep => {
                            if let Some(mono_prep) = mono_prep {
                                mono_result.age = mono_prep.age;
                                mono_result.duration = mono_prep.duration;
                                mono_result.ghs_duration = mono_prep.duration;
                            }
                            mono_result.ghm = result.ghm;
                        }
                    }
                    out.push(mono_result);
                }
            }

            let mut mono_counters = vec![SupplementCounters::default(); stays.len()];
            count_supplements(
                index,
                &set.prep,
                &set.mono_preps,
                result.ghm,
                result.ghs,
                &mut result.supplement_days,
                &mut mono_counters,
            );
            for (mono_result, counters) in out[start..].iter_mut().zip(mono_counters) {
                mono_result.supplement_days = counters;
            }
        }
        None => count_supplements(
            index,
            &set.prep,
            &set.mono_preps,
            result.ghm,
            result.ghs,
            &mut result.supplement_days,
            &mut [],
        ),
    }

    result
}

/// Groups one stay of a multi-stay admission on its own. Confirmation is
/// never checked, and its errors never reach the admission.
fn classify_mono_stay<'a>(
    index: &'a TableIndex,
    authorizations: &AuthorizationSet,
    sector: Sector,
    mono_prep: &PreparedStay<'a>,
    flags: ClassifyFlags,
    mono_errors: &mut ErrorSet,
    mono_result: &mut ClassifyResult<'a>,
) {
    let mono_flags = ClassifyFlags {
        ignore_confirmation: true,
        ..flags
    };
    mono_errors.clear();

    if flags.mono_original_stay {
        let mut ghm = run_ghm_tree(index, mono_prep, mono_errors);
        let mut ghm_for_ghs = ghm;
        if let Some(root_info) = index.find_ghm_root(ghm.root()) {
            let pick = run_ghm_severity(index, mono_prep, ghm, root_info);
            ghm = pick.ghm;
            ghm_for_ghs = pick.ghm_for_ghs;
        }
        mono_result.ghm = ghm;
        if ghm_for_ghs != ghm {
            mono_result.ghm_for_ghs = Some(ghm_for_ghs);
        }

        let pick = pick_ghs(
            index,
            authorizations,
            mono_prep,
            std::slice::from_ref(mono_prep),
            ghm,
            sector,
            mono_errors,
        );
        mono_result.ghs = pick.ghs;
        mono_result.ghs_duration = pick.ghs_duration;
    } else {
        let mut fixed_prep = mono_prep.clone();
        {
            let stay = fixed_prep.stay.to_mut();
            stay.entry.mode = b'8';
            stay.entry.origin = 0;
            stay.exit.mode = b'8';
            stay.exit.destination = 0;
        }

        let pick = pick_ghm(index, &fixed_prep, 1, mono_flags, mono_errors);
        mono_result.ghm = pick.ghm;
        if pick.ghm_for_ghs != pick.ghm {
            mono_result.ghm_for_ghs = Some(pick.ghm_for_ghs);
        }

        let ghs_pick = pick_ghs(
            index,
            authorizations,
            &fixed_prep,
            std::slice::from_ref(&fixed_prep),
            pick.ghm_for_ghs,
            sector,
            mono_errors,
        );
        mono_result.ghs = ghs_pick.ghs;
        mono_result.ghs_duration = ghs_pick.ghs_duration;
    }

    mono_result.main_error = mono_errors.main_error;
    mono_result.errors = mono_errors.clone();
}
