//! Supplement day counting.
//!
//! Days spent in authorized units (intensive care, neonatology, ...) and
//! some procedures give right to per-day supplements on top of the GHS.
//! Counts are kept for the admission and, when asked, for each stay.

use crate::prepare::{MARCH_2014, MARCH_2017};
use crate::types::{Markers, PreparedStay};
use pmsi_tables::{
    AuthorizationScope, GhmCode, GhmRootCode, GhsCode, ProcedureCode, SupplementCounters,
    SupplementType, TableIndex,
};

/// GHS of neonatal deaths, excluded from neonatology and intensive care
/// supplements.
const NEONATAL_DEATH_GHS: GhsCode = GhsCode(5903);

struct Counters<'c> {
    admission: &'c mut SupplementCounters<i32>,
    stays: &'c mut [SupplementCounters<i32>],
}

impl Counters<'_> {
    fn add(&mut self, stay_idx: usize, ty: SupplementType, days: i32) {
        self.admission[ty] += days;
        if let Some(counters) = self.stays.get_mut(stay_idx) {
            counters[ty] += days;
        }
    }
}

/// A zero-night stay waiting to know whether the next stay takes its day.
#[derive(Clone, Copy)]
struct HeldStay {
    idx: usize,
    ty: SupplementType,
    priority: i32,
}

/// Counts supplement days for one classified admission.
///
/// `mono_counters` is either empty or holds one counter set per stay.
pub fn count_supplements<'a>(
    index: &'a TableIndex,
    prep: &PreparedStay<'a>,
    mono_preps: &[PreparedStay<'a>],
    ghm: GhmCode,
    ghs: GhsCode,
    counters: &mut SupplementCounters<i32>,
    mono_counters: &mut [SupplementCounters<i32>],
) {
    if ghs == GhsCode::NONE {
        return;
    }

    let stay = &*prep.stay;
    let mut counters = Counters {
        admission: counters,
        stays: mono_counters,
    };

    let igs2_src_adjust = match prep.age {
        80.. => 18,
        75.. => 16,
        70.. => 15,
        60.. => 12,
        40.. => 7,
        _ => 0,
    };
    let mut prev_reanimation = stay.entry.mode == b'7' && stay.entry.origin == b'R';

    let root = ghm.root();
    let test_ohb = ghm != GhmCode::new(28, b'Z', 15, b'Z');
    let test_aph = ghm != GhmCode::new(28, b'Z', 16, b'Z');
    let test_dia = !matches!((ghm.cmd, ghm.kind, ghm.seq, ghm.mode), (28, b'Z', 1..=4, b'Z'))
        && ghm != GhmCode::new(11, b'K', 2, b'J');
    let test_ent3 = stay.exit.date >= MARCH_2014 && test_dia;
    let mut test_sdc = stay.exit.date >= MARCH_2017 && root != GhmRootCode::new(5, b'C', 19);

    let newborn = prep.age < 2 && ghs != NEONATAL_DEATH_GHS;

    let mut held: Option<HeldStay> = None;

    for (idx, mono_prep) in mono_preps.iter().enumerate() {
        let function = index
            .find_authorization(AuthorizationScope::Unit, mono_prep.auth_type)
            .map_or(0, |auth| auth.function);

        let mut reanimation = false;
        let unit_supplement = match function {
            1 if newborn => Some((SupplementType::Nn1, 1)),
            2 if newborn => Some((SupplementType::Nn2, 3)),
            3 if newborn => {
                if test_reanimation(prep, mono_prep, 1) {
                    reanimation = true;
                    Some((SupplementType::Nn3, 6))
                } else {
                    Some((SupplementType::Nn2, 3))
                }
            }
            4 => {
                if test_reanimation(prep, mono_prep, 3) {
                    reanimation = true;
                    Some((SupplementType::Rea, 7))
                } else {
                    Some((SupplementType::Reasi, 5))
                }
            }
            6 => {
                let prev_mono_prep = idx.checked_sub(1).and_then(|prev| mono_preps.get(prev));
                test_continuous_care(
                    index,
                    prep,
                    mono_prep,
                    igs2_src_adjust,
                    prev_reanimation,
                    prev_mono_prep,
                )
                .then_some((SupplementType::Src, 2))
            }
            8 => Some((SupplementType::Si, 4)),
            9 if ghs != NEONATAL_DEATH_GHS => {
                let (rea_type, rea_priority, threshold) = if prep.age < 18 {
                    (SupplementType::Rep, 8, 1)
                } else {
                    (SupplementType::Rea, 7, 3)
                };
                if test_reanimation(prep, mono_prep, threshold) {
                    reanimation = true;
                    Some((rea_type, rea_priority))
                } else {
                    Some((SupplementType::Reasi, 5))
                }
            }
            _ => None,
        };
        prev_reanimation = reanimation;

        let priority = unit_supplement.map_or(0, |(_, priority)| priority);
        if mono_prep.duration != 0 {
            let days = mono_prep.duration + i32::from(mono_prep.is_death());
            match held.take() {
                // The zero-night stay takes one day from this one
                Some(ambu) if ambu.priority >= priority => {
                    if let Some((ty, _)) = unit_supplement {
                        counters.add(idx, ty, days - 1);
                    }
                    counters.add(ambu.idx, ambu.ty, 1);
                }
                _ => {
                    if let Some((ty, _)) = unit_supplement {
                        counters.add(idx, ty, days);
                    }
                }
            }
        } else if let Some((ty, priority)) = unit_supplement {
            if priority > held.map_or(0, |ambu| ambu.priority) {
                held = Some(HeldStay { idx, ty, priority });
            }
        }

        for info in &mono_prep.procedures {
            let mut count = |ty: SupplementType, test: bool| {
                if test {
                    counters.add(idx, ty, 1);
                }
            };

            count(SupplementType::Ohb, test_ohb && info.test(31, 0x20));
            count(SupplementType::Aph, test_aph && info.test(38, 0x8));
            count(
                SupplementType::Rap,
                prep.age < 18
                    && (info.test(27, 0x80)
                        || info.test(22, 0x4)
                        || info.test(39, 0x10)
                        || info.test(41, 0xF0)
                        || info.test(40, 0x7)),
            );
            count(SupplementType::Dia, test_dia && info.test(32, 0x2));
            count(SupplementType::Ent1, test_dia && info.test(23, 0x1));
            count(SupplementType::Ent2, test_dia && info.test(24, 0x80));
            count(SupplementType::Ent3, test_ent3 && info.test(30, 0x4));
            if test_sdc && info.test(24, 0x2) {
                count(SupplementType::Sdc, true);
                test_sdc = false;
            }
        }
    }
    if let Some(ambu) = held {
        counters.add(ambu.idx, ambu.ty, 1);
    }

    // Antepartum days, before the two days preceding delivery
    if prep.markers.intersects(Markers::CHILDBIRTH_PROCEDURE)
        && prep.diagnoses.iter().any(|info| info.test(25, 0x40))
    {
        let mut ant_days = prep.childbirth_date - stay.entry.date - 2;
        for (idx, mono_prep) in mono_preps.iter().enumerate() {
            if ant_days <= 0 {
                break;
            }
            let mono_ant_days = mono_prep.duration.min(ant_days);
            counters.add(idx, SupplementType::Ant, mono_ant_days);
            ant_days -= mono_ant_days;
        }
    }

    counters.add(0, SupplementType::Dip, i32::from(stay.dip_count));
}

/// Intensive care is real reanimation with a qualifying procedure, or
/// enough procedures from the secondary list.
fn test_reanimation(prep: &PreparedStay, mono_prep: &PreparedStay, list2_threshold: usize) -> bool {
    if mono_prep.stay.igs2 < 15 && prep.age >= 18 {
        return false;
    }

    let mut list2_matches = 0;
    for info in &mono_prep.procedures {
        if info.test(27, 0x10) {
            return true;
        }
        if info.test(27, 0x8) {
            list2_matches += 1;
            if list2_matches >= list2_threshold {
                return true;
            }
        }
    }

    false
}

/// Continuous monitoring (SRC) conditions for one stay.
fn test_continuous_care(
    index: &TableIndex,
    prep: &PreparedStay,
    mono_prep: &PreparedStay,
    igs2_src_adjust: i16,
    prev_reanimation: bool,
    prev_mono_prep: Option<&PreparedStay>,
) -> bool {
    if prev_reanimation {
        return true;
    }

    let adjusted_igs2 = mono_prep.stay.igs2 - igs2_src_adjust;
    if prep.age >= 18 && adjusted_igs2 >= 15 {
        return true;
    }

    let mut src_procedures: Vec<ProcedureCode> = Vec::new();

    if adjusted_igs2 >= 7 || prep.age < 18 {
        for info in &mono_prep.diagnoses {
            if info.test(21, 0x10) {
                return true;
            }
            if info.test(21, 0x8) {
                let pairs = index.find_src_pairs(0, info.diag);
                src_procedures.extend(pairs.iter().map(|pair| pair.proc));
            }
        }
    }
    if prep.age < 18 {
        for info in &mono_prep.diagnoses {
            if info.test(22, 0x80) {
                return true;
            }
            if info.test(22, 0x40) {
                let pairs = index.find_src_pairs(1, info.diag);
                src_procedures.extend(pairs.iter().map(|pair| pair.proc));
            }
        }
    }
    if mono_prep
        .procedures
        .iter()
        .any(|info| src_procedures.contains(&info.proc))
    {
        return true;
    }

    std::iter::once(mono_prep)
        .chain(prev_mono_prep)
        .flat_map(|prep| prep.procedures.iter())
        .any(|info| info.test(38, 0x1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;
    use pmsi_tables::{AuthorizationInfo, AuthorizationTable, Date};
    use std::borrow::Cow;

    const GHM: GhmCode = GhmCode::new(4, b'M', 2, b'1');
    const GHS: GhsCode = GhsCode(1002);

    /// Unit authorization types 10 (intensive care) and 11 (continuous
    /// monitoring).
    fn index() -> TableIndex {
        base_index().with_authorizations(AuthorizationTable::new(vec![
            AuthorizationInfo {
                scope: AuthorizationScope::Unit,
                code: 10,
                function: 4,
            },
            AuthorizationInfo {
                scope: AuthorizationScope::Unit,
                code: 11,
                function: 8,
            },
        ]))
    }

    fn mono(auth_type: i8, duration: i32) -> PreparedStay<'static> {
        let mut record = stay(1);
        record.exit.date = record.entry.date.add_days(duration);
        let mut prep = PreparedStay::new(Cow::Owned(record));
        prep.duration = duration;
        prep.age = 38;
        prep.auth_type = auth_type;
        prep
    }

    fn count(
        index: &TableIndex,
        mono_preps: &[PreparedStay],
    ) -> (SupplementCounters<i32>, Vec<SupplementCounters<i32>>) {
        let mut aggregate = mono_preps[0].clone();
        aggregate.duration = mono_preps.iter().map(|mono_prep| mono_prep.duration).sum();
        let mut counters = SupplementCounters::default();
        let mut mono_counters = vec![SupplementCounters::default(); mono_preps.len()];
        count_supplements(
            index,
            &aggregate,
            mono_preps,
            GHM,
            GHS,
            &mut counters,
            &mut mono_counters,
        );
        (counters, mono_counters)
    }

    #[test]
    fn unit_days_are_counted() {
        let index = index();
        let (counters, mono_counters) = count(&index, &[mono(11, 3), mono(0, 2)]);
        assert_eq!(counters[SupplementType::Si], 3);
        assert_eq!(mono_counters[0][SupplementType::Si], 3);
        assert!(mono_counters[1].is_empty());
    }

    #[test]
    fn zero_night_stay_takes_a_day_from_the_next() {
        let index = index();

        // Intensive care without reanimation (REASI, priority 5) outranks
        // the monitoring unit (SI, priority 4) that follows it
        let (counters, mono_counters) = count(&index, &[mono(10, 0), mono(11, 3)]);
        assert_eq!(counters[SupplementType::Reasi], 1);
        assert_eq!(counters[SupplementType::Si], 2);
        assert_eq!(mono_counters[0][SupplementType::Reasi], 1);
        assert_eq!(mono_counters[1][SupplementType::Si], 2);

        // The other way around the zero-night stay gets nothing
        let (counters, _) = count(&index, &[mono(11, 0), mono(10, 3)]);
        assert_eq!(counters[SupplementType::Si], 0);
        assert_eq!(counters[SupplementType::Reasi], 3);
    }

    #[test]
    fn same_unit_type_moves_a_day_without_adding_one() {
        let index = index();
        let (counters, mono_counters) = count(&index, &[mono(11, 0), mono(11, 3)]);
        assert_eq!(counters[SupplementType::Si], 3);
        assert_eq!(mono_counters[0][SupplementType::Si], 1);
        assert_eq!(mono_counters[1][SupplementType::Si], 2);
    }

    #[test]
    fn held_stay_is_counted_at_the_end() {
        let index = index();
        let (counters, _) = count(&index, &[mono(0, 2), mono(11, 0)]);
        assert_eq!(counters[SupplementType::Si], 1);
    }

    #[test]
    fn no_ghs_no_supplement() {
        let index = index();
        let mono_preps = vec![mono(11, 3)];
        let mut counters = SupplementCounters::default();
        count_supplements(
            &index,
            &mono_preps[0],
            &mono_preps,
            GhmCode::GROUPING_ERROR,
            GhsCode::NONE,
            &mut counters,
            &mut [],
        );
        assert!(counters.is_empty());
    }

    #[test]
    fn dialysis_sessions_count_per_realisation() {
        let mut dialysis = procedure_info("JVJF004", 0b10);
        dialysis.bytes[32] = 0x2;
        let index = index().with_procedures(pmsi_tables::ProcedureTable::new(vec![dialysis]));
        let info = index.find_procedure(proc_code("JVJF004"), 0, Date::new(2019, 3, 10)).unwrap();

        let mut mono_prep = mono(0, 3);
        mono_prep.procedures = vec![info, info];
        let (counters, _) = count(&index, &[mono_prep]);
        assert_eq!(counters[SupplementType::Dia], 2);

        // Not for dialysis GHMs themselves
        let mut counters = SupplementCounters::default();
        let mut mono_prep = mono(0, 3);
        mono_prep.procedures = vec![info];
        count_supplements(
            &index,
            &mono_prep,
            std::slice::from_ref(&mono_prep),
            GhmCode::new(28, b'Z', 4, b'Z'),
            GHS,
            &mut counters,
            &mut [],
        );
        assert_eq!(counters[SupplementType::Dia], 0);
    }
}
