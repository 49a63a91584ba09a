//! Admission preparation.
//!
//! Merges the stays of one admission into an aggregate stay, resolves
//! every diagnosis and procedure against the table index in force at the
//! exit date, runs the data and coherency checks and picks the main stay.
//! Every check runs to completion so that all applicable errors are
//! reported; any blocking failure makes the admission ungroupable.

use crate::error_set::ErrorSet;
use crate::types::{ClassifyFlags, Markers, PreparedSet, PreparedStay};
use pmsi_stays::{Stay, StayErrors, StayFlags};
use pmsi_tables::{
    AuthorizationMode, AuthorizationSet, Date, DiagnosisInfo, GhmCode, ProcedureInfo, TableIndex,
    TableSet,
};
use std::borrow::Cow;
use std::collections::HashSet;

// Rule changes are keyed on the exit date of the admission.
pub(crate) const MARCH_2013: Date = Date::new(2013, 3, 1);
pub(crate) const MARCH_2014: Date = Date::new(2014, 3, 1);
pub(crate) const MARCH_2016: Date = Date::new(2016, 3, 1);
pub(crate) const MARCH_2017: Date = Date::new(2017, 3, 1);
pub(crate) const MARCH_2019: Date = Date::new(2019, 3, 1);
pub(crate) const MARCH_2020: Date = Date::new(2020, 3, 1);

/// Flags of any stay that apply to the whole admission.
const SHARED_FLAGS: StayFlags = StayFlags(
    StayFlags::RAAC.0 | StayFlags::CONTEXT.0 | StayFlags::HOSPITAL_USE.0 | StayFlags::RESCRIPT.0,
);

/// Prepares `mono_stays` (one admission) into `set`.
///
/// Returns the sentinel GHM when the admission cannot be grouped, `None`
/// when grouping can proceed with `set.index`.
pub fn prepare<'a>(
    tables: &'a TableSet,
    authorizations: &AuthorizationSet,
    mono_stays: &'a [Stay],
    flags: ClassifyFlags,
    set: &mut PreparedSet<'a>,
    errors: &mut ErrorSet,
) -> Option<GhmCode> {
    set.index = None;
    set.mono_stays = mono_stays;
    set.mono_preps.clear();
    set.main_prep = None;

    let Some(first) = mono_stays.first() else {
        set.prep = PreparedStay::new(Cow::Owned(Stay::default()));
        return Some(GhmCode::GROUPING_ERROR);
    };
    set.prep = PreparedStay::new(Cow::Owned(aggregate_stay(mono_stays)));

    // Nothing in the record can be trusted
    if first.errors.contains(StayErrors::UNKNOWN_RUM_VERSION) {
        set.prep.duration = -1;
        set.prep.age = -1;
        set.prep.age_days = -1;
        let mut mono_prep = PreparedStay::new(Cow::Borrowed(first));
        mono_prep.duration = -1;
        mono_prep.age = -1;
        mono_prep.age_days = -1;
        set.mono_preps.push(mono_prep);

        errors.error(59);
        return Some(GhmCode::GROUPING_ERROR);
    }

    let mut valid = init_critical_data(tables, authorizations, mono_stays, set, errors);
    valid &= check_data_errors(mono_stays, errors);

    if valid {
        let Some(index) = set.index else {
            errors.set(502, 2);
            return Some(GhmCode::TABLE_ERROR);
        };

        valid &= append_valid_diagnoses(index, set, errors);
        valid &= append_valid_procedures(index, flags, set, errors);

        if valid {
            let main_idx = if mono_stays.len() > 1 {
                find_main_stay(&set.mono_preps, set.prep.duration)
            } else {
                0
            };
            let main_diag_info = set.mono_preps[main_idx].main_diag_info;
            let linked_diag_info = set.mono_preps[main_idx].linked_diag_info;

            if mono_stays.len() > 1 {
                let stay = set.prep.stay.to_mut();
                stay.main_diagnosis = main_diag_info.map(|info| info.diag).unwrap_or_default();
                stay.linked_diagnosis = linked_diag_info.map(|info| info.diag).unwrap_or_default();
            }

            set.main_prep = Some(main_idx);
            set.prep.main_diag_info = main_diag_info;
            set.prep.linked_diag_info = linked_diag_info;
        }
    }

    // Some of these need the resolved diagnoses and procedures
    valid &= check_aggregate_errors(&set.prep, &set.mono_preps, errors);

    (!valid).then_some(GhmCode::GROUPING_ERROR)
}

/// The admission seen as one stay: administrative data of the first stay,
/// exit of the last one, merged clinical values. Lists stay empty; the
/// prepared set carries the resolved diagnoses and procedures.
fn aggregate_stay(mono_stays: &[Stay]) -> Stay {
    let mut stay = Stay {
        other_diagnoses: Vec::new(),
        procedures: Vec::new(),
        flags: StayFlags::empty(),
        ..mono_stays[0].clone()
    };

    for mono_stay in mono_stays {
        if mono_stay.gestational_age > 0 {
            stay.gestational_age = mono_stay.gestational_age;
        }
        if mono_stay.last_menstrual_period.is_set() && !stay.last_menstrual_period.is_set() {
            stay.last_menstrual_period = mono_stay.last_menstrual_period;
        }
        stay.igs2 = stay.igs2.max(mono_stay.igs2);
        stay.flags.insert(StayFlags(mono_stay.flags.0 & SHARED_FLAGS.0));
        if stay.interv_category == 0 {
            stay.interv_category = mono_stay.interv_category;
        }
    }

    if let Some(last) = mono_stays.last() {
        stay.exit = last.exit;
        stay.flags
            .set(StayFlags::CONFIRMED, last.flags.contains(StayFlags::CONFIRMED));
    }

    stay
}

// ──────────────────────────────────────────────
// Dates, ages and units
// ──────────────────────────────────────────────

/// Error codes for a malformed, missing and impossible date.
type DateErrorCodes = [i16; 3];

const BIRTHDATE_ERRORS: DateErrorCodes = [14, 13, 39];
const ENTRY_DATE_ERRORS: DateErrorCodes = [20, 19, 21];
const EXIT_DATE_ERRORS: DateErrorCodes = [29, 28, 30];

fn check_date_errors(
    malformed: bool,
    date: Date,
    codes: DateErrorCodes,
    errors: &mut ErrorSet,
) -> bool {
    if malformed {
        errors.error(codes[0])
    } else if !date.is_set() {
        errors.error(codes[1])
    } else if !date.is_valid() {
        errors.error(codes[2])
    } else {
        true
    }
}

/// Age in completed years at `date`.
pub(crate) fn compute_age(date: Date, birthdate: Date) -> i32 {
    let mut age = i32::from(date.year) - i32::from(birthdate.year);
    if (date.month, date.day) < (birthdate.month, birthdate.day) {
        age -= 1;
    }
    age
}

fn init_critical_data<'a>(
    tables: &'a TableSet,
    authorizations: &AuthorizationSet,
    mono_stays: &'a [Stay],
    set: &mut PreparedSet<'a>,
    errors: &mut ErrorSet,
) -> bool {
    let mut valid = true;

    let mut exit_date_valid = false;
    let mut total_duration = Some(0);
    for mono_stay in mono_stays {
        let mut mono_prep = PreparedStay::new(Cow::Borrowed(mono_stay));

        let birthdate_valid = check_date_errors(
            mono_stay.errors.contains(StayErrors::MALFORMED_BIRTHDATE),
            mono_stay.birthdate,
            BIRTHDATE_ERRORS,
            errors,
        );
        let entry_date_valid = check_date_errors(
            mono_stay.errors.contains(StayErrors::MALFORMED_ENTRY_DATE),
            mono_stay.entry.date,
            ENTRY_DATE_ERRORS,
            errors,
        );
        exit_date_valid = check_date_errors(
            mono_stay.errors.contains(StayErrors::MALFORMED_EXIT_DATE),
            mono_stay.exit.date,
            EXIT_DATE_ERRORS,
            errors,
        );

        if birthdate_valid && entry_date_valid {
            mono_prep.age = compute_age(mono_stay.entry.date, mono_stay.birthdate).max(0);
            mono_prep.age_days = (mono_stay.entry.date - mono_stay.birthdate).max(0);
        } else {
            mono_prep.age = -1;
            mono_prep.age_days = -1;
        }

        let duration = (entry_date_valid && exit_date_valid)
            .then(|| mono_stay.exit.date - mono_stay.entry.date)
            .filter(|duration| *duration >= 0);
        match duration {
            Some(duration) => {
                mono_prep.duration = duration;
                total_duration = total_duration.map(|total| total + duration);
            }
            None => {
                mono_prep.duration = -1;
                total_duration = None;
            }
        }

        valid &= birthdate_valid && entry_date_valid && exit_date_valid;

        if birthdate_valid
            && entry_date_valid
            && (mono_stay.birthdate > mono_stay.entry.date
                || mono_stay.entry.date.year - mono_stay.birthdate.year > 140)
        {
            valid &= errors.error(15);
        }
        if entry_date_valid && exit_date_valid && mono_stay.exit.date < mono_stay.entry.date {
            valid &= errors.error(32);
        }

        if exit_date_valid {
            resolve_unit(authorizations, mono_stay, &mut mono_prep);
        }

        set.mono_preps.push(mono_prep);
    }

    set.prep.duration = total_duration.unwrap_or(-1);
    set.prep.age = set.mono_preps[0].age;
    set.prep.age_days = set.mono_preps[0].age_days;

    if exit_date_valid {
        if let Some(last) = mono_stays.last() {
            set.index = tables.find_index(last.exit.date, true);
        }
    }

    valid
}

/// Pseudo-units (10000 and above) encode the unit kind in the thousands
/// digit and the authorization type in the last two digits. Other units
/// are looked up in the authorization set.
fn resolve_unit(authorizations: &AuthorizationSet, mono_stay: &Stay, mono_prep: &mut PreparedStay) {
    let unit = mono_stay.unit.0;
    if unit >= 10000 {
        let auth_type = (unit % 100) as i8;
        match (unit % 10000) / 1000 {
            0 => mono_prep.auth_type = auth_type,
            1 => {
                mono_prep.auth_type = auth_type;
                mono_prep.markers.insert(Markers::PARTIAL_UNIT);
            }
            2 => {
                mono_prep.auth_type = auth_type;
                mono_prep.markers.insert(Markers::MIXED_UNIT);
            }
            _ => {}
        }
    } else if let Some(auth) = authorizations.find_unit(mono_stay.unit, mono_stay.exit.date) {
        mono_prep.auth_type = auth.auth_type;
        match auth.mode {
            AuthorizationMode::Complete => {}
            AuthorizationMode::Partial => mono_prep.markers.insert(Markers::PARTIAL_UNIT),
            AuthorizationMode::Mixed => mono_prep.markers.insert(Markers::MIXED_UNIT),
        }
    }
}

// ──────────────────────────────────────────────
// Record checks
// ──────────────────────────────────────────────

fn check_data_errors(mono_stays: &[Stay], errors: &mut ErrorSet) -> bool {
    let mut valid = true;

    let first = &mono_stays[0];
    if first.errors.contains(StayErrors::MALFORMED_BILL_ID) {
        valid &= errors.error(61);
    } else if first.bill_id == 0 {
        valid &= errors.error(11);
    }

    let last_exit_date = mono_stays[mono_stays.len() - 1].exit.date;

    for mono_stay in mono_stays {
        let stay_errors = mono_stay.errors;

        if stay_errors.contains(StayErrors::MALFORMED_SEX) {
            valid &= errors.error(17);
        } else if mono_stay.sex != 1 && mono_stay.sex != 2 {
            valid &= errors.error(if mono_stay.sex != 0 { 17 } else { 16 });
        }

        if mono_stay.unit.0 == 0 {
            errors.warn(62);
        }

        if stay_errors.intersects(StayErrors::MALFORMED_ENTRY_MODE | StayErrors::MALFORMED_ENTRY_ORIGIN) {
            valid &= errors.error(25);
        }
        if stay_errors
            .intersects(StayErrors::MALFORMED_EXIT_MODE | StayErrors::MALFORMED_EXIT_DESTINATION)
        {
            valid &= errors.error(34);
        }

        if stay_errors.contains(StayErrors::MALFORMED_SESSION_COUNT) {
            valid &= errors.error(36);
        }
        if stay_errors.contains(StayErrors::MALFORMED_GESTATIONAL_AGE) {
            valid &= errors.error(125);
        }

        if stay_errors.contains(StayErrors::MALFORMED_LAST_MENSTRUAL_PERIOD) {
            valid &= errors.error(160);
        } else if mono_stay.last_menstrual_period.is_set()
            && !mono_stay.last_menstrual_period.is_valid()
        {
            valid &= errors.error(161);
        }

        if stay_errors.contains(StayErrors::MALFORMED_IGS2) {
            valid &= errors.error(169);
        }

        if stay_errors.contains(StayErrors::MALFORMED_CONFIRMATION) {
            errors.warn(121);
        }
        if stay_errors.contains(StayErrors::MALFORMED_CONVERSION) {
            errors.error(151);
        }
        if stay_errors.contains(StayErrors::MALFORMED_RAAC) {
            valid &= errors.error(188);
        }
        if stay_errors.contains(StayErrors::MALFORMED_CONTEXT) {
            valid &= errors.error(195);
        }
        if stay_errors.contains(StayErrors::MALFORMED_HOSPITAL_USE) {
            valid &= errors.error(196);
        }
        if stay_errors.contains(StayErrors::MALFORMED_RESCRIPT) {
            valid &= errors.error(197);
        }
        if mono_stay.interv_category != 0 && !(b'A'..=b'C').contains(&mono_stay.interv_category) {
            valid &= errors.error(198);
        }

        if stay_errors.contains(StayErrors::MALFORMED_MAIN_DIAGNOSIS) {
            valid &= errors.error(41);
        } else if !mono_stay.main_diagnosis.is_valid() {
            valid &= errors.error(40);
        }
        if stay_errors.contains(StayErrors::MALFORMED_LINKED_DIAGNOSIS) {
            valid &= errors.error(51);
        }
        if stay_errors.contains(StayErrors::MISSING_OTHER_DIAGNOSES_COUNT) {
            valid &= errors.error(55);
        } else if stay_errors.contains(StayErrors::MALFORMED_OTHER_DIAGNOSES_COUNT) {
            valid &= errors.error(56);
        } else if stay_errors.contains(StayErrors::MALFORMED_OTHER_DIAGNOSIS) {
            valid &= errors.error(42);
        }

        if stay_errors.contains(StayErrors::MISSING_PROCEDURES_COUNT) {
            valid &= errors.error(57);
        } else if stay_errors.contains(StayErrors::MALFORMED_PROCEDURES_COUNT) {
            valid &= errors.error(58);
        } else {
            if stay_errors.contains(StayErrors::MALFORMED_PROCEDURE_CODE) {
                valid &= errors.error(43);
            }
            if last_exit_date >= MARCH_2016
                && stay_errors.contains(StayErrors::MALFORMED_PROCEDURE_EXTENSION)
            {
                valid &= errors.error(185);
            }
        }
    }

    for pair in mono_stays.windows(2) {
        let (prev, next) = (&pair[0], &pair[1]);
        if next.sex != prev.sex && (next.sex == 1 || next.sex == 2) {
            valid &= errors.error(46);
        }
        if next.birthdate != prev.birthdate && next.birthdate.is_valid() {
            valid &= errors.error(45);
        }
    }

    valid
}

fn check_aggregate_errors(
    prep: &PreparedStay,
    mono_preps: &[PreparedStay],
    errors: &mut ErrorSet,
) -> bool {
    let stay = &*prep.stay;

    let mut valid = true;

    // Transfers for a procedure (PIE), mutations, RAAC
    if stay.entry.mode == b'0' || stay.exit.mode == b'0' {
        if stay.exit.mode != stay.entry.mode {
            valid &= errors.error(26);
            errors.error(35);
        } else if prep.duration > 1 {
            valid &= errors.error(50);
        }
    } else {
        if stay.entry.mode == b'6' && stay.entry.origin == b'1' {
            valid &= errors.error(26);
        }
        if stay.exit.mode == b'6' && stay.exit.destination == b'1' {
            valid &= errors.error(35);
        }
        if stay.flags.contains(StayFlags::RAAC)
            && (stay.exit.mode == b'9' || (stay.exit.mode == b'7' && stay.exit.destination == b'1'))
        {
            valid &= errors.error(189);
        }
    }

    for mono_prep in mono_preps {
        let mono_stay = &*mono_prep.stay;

        if mono_stay.entry.date.year < 1985 && mono_stay.entry.date.is_valid() {
            errors.warn(77);
        }

        match mono_stay.entry.mode {
            b'0' | b'6' | b'7' => {
                if mono_stay.entry.mode == b'0' && mono_stay.entry.origin == b'6' {
                    valid &= errors.error(25);
                }
                if mono_stay.entry.mode == b'6' && mono_stay.entry.origin == b'R' {
                    valid &= errors.error(25);
                }
                match mono_stay.entry.origin {
                    b'1'..=b'4' | b'6' | b'R' => {}
                    0 => valid &= errors.error(53),
                    _ => valid &= errors.error(25),
                }
            }
            b'8' => {
                if !matches!(mono_stay.entry.origin, 0 | b'5' | b'7') {
                    valid &= errors.error(25);
                }
            }
            b'N' => {
                if stay.exit.date < MARCH_2019 || mono_stay.entry.origin != 0 {
                    valid &= errors.error(25);
                }
            }
            0 => valid &= errors.error(24),
            _ => valid &= errors.error(25),
        }

        match mono_stay.exit.mode {
            b'0' | b'6' | b'7' => match mono_stay.exit.destination {
                b'1'..=b'4' | b'6' => {}
                0 => valid &= errors.error(54),
                _ => valid &= errors.error(34),
            },
            b'8' => {
                if !matches!(mono_stay.exit.destination, 0 | b'7') {
                    valid &= errors.error(34);
                }
            }
            b'9' => {
                if mono_stay.exit.destination != 0 {
                    valid &= errors.error(34);
                }
            }
            0 => valid &= errors.error(33),
            _ => valid &= errors.error(34),
        }

        if mono_preps.len() > 1 && mono_stay.session_count > 0 {
            valid &= errors.error(37);
        }
        if !(0..32).contains(&mono_stay.session_count) {
            errors.warn(66);
        }

        let gestational_age = mono_stay.gestational_age;
        if gestational_age != 0 {
            if gestational_age > 44 || (gestational_age < 22 && stay.exit.mode != b'9' && prep.age == 0) {
                valid &= errors.error(127);
            } else if stay.newborn_weight != 0
                && ((gestational_age >= 37
                    && stay.newborn_weight < 1000
                    && !mono_stay.main_diagnosis.matches("P95"))
                    || (gestational_age < 33 && stay.newborn_weight > 4000)
                    || (gestational_age < 28 && stay.newborn_weight > 2500))
            {
                valid &= errors.error(129);
            }
        }

        if mono_stay.last_menstrual_period.is_set()
            && mono_stay.last_menstrual_period != stay.last_menstrual_period
        {
            valid &= errors.error(163);
        }

        // Stillborn
        if mono_stay.main_diagnosis.matches("P95") {
            if mono_stay.exit.mode != b'9' {
                valid &= errors.error(143);
                errors.error(147);
            } else if mono_preps.len() > 1
                || mono_stay.newborn_weight == 0
                || (mono_stay.entry.mode != b'8' && mono_stay.entry.mode != b'N')
                || mono_stay.birthdate != mono_stay.entry.date
                || mono_stay.exit.date != mono_stay.entry.date
            {
                valid &= errors.error(147);
            }
        }

        if stay.exit.date >= MARCH_2019
            && mono_stay.flags.contains(StayFlags::CONVERSION)
            && mono_prep.markers.intersects(Markers::PARTIAL_UNIT)
        {
            errors.set(152, 0);
        }
    }

    for pair in mono_preps.windows(2) {
        let prev = &*pair[0].stay;
        let next = &*pair[1].stay;

        if prev.exit.mode == b'0' && next.entry.mode == b'0' {
            if next.entry.date != prev.exit.date && next.entry.date - prev.exit.date != 1 {
                valid &= errors.error(50);
            }
        } else {
            if prev.exit.mode == b'0' || next.entry.mode != b'6' || next.entry.origin != b'1' {
                valid &= errors.error(27);
            }
            if next.entry.mode == b'0' || prev.exit.mode != b'6' || prev.exit.destination != b'1' {
                valid &= errors.error(49);
            }
            if next.entry.date != prev.exit.date {
                valid &= errors.error(23);
            }
        }
    }

    // Sessions
    if prep.main_diag_info.is_some_and(|info| info.test(8, 0x2)) {
        if prep.duration == 0 && stay.session_count == 0 {
            let tolerated = prep.procedures.iter().any(|info| info.test(44, 0x40));
            if !tolerated {
                if stay.exit.date >= MARCH_2019 {
                    valid &= errors.error(145);
                } else {
                    errors.set(145, 0);
                }
            }
        } else if i32::from(stay.session_count) > prep.duration + 1 {
            errors.warn(146);
        }
    }

    // Gestation and newborns
    if stay.gestational_age == 0
        && (prep.markers.intersects(Markers::CHILDBIRTH) || stay.birthdate == stay.entry.date)
    {
        valid &= errors.error(126);
    }
    if stay.errors.contains(StayErrors::MALFORMED_NEWBORN_WEIGHT) {
        valid &= errors.error(82);
    } else if prep.age_days < 29 && stay.newborn_weight == 0 {
        valid &= errors.error(168);
    } else if stay.newborn_weight > 0 && stay.newborn_weight < 100 {
        valid &= errors.error(128);
    }
    if stay.exit.date >= MARCH_2013
        && prep.markers.intersects(Markers::CHILDBIRTH_PROCEDURE)
        && stay.gestational_age < 22
    {
        valid &= errors.error(174);
    }

    // Menstruation
    let lmp = stay.last_menstrual_period;
    if prep.markers.intersects(Markers::CHILDBIRTH) && !lmp.is_set() {
        valid &= errors.error(162);
    }
    if stay.sex == 1 && lmp.is_set() {
        errors.warn(164);
    }
    if lmp.is_set() {
        if lmp > stay.entry.date {
            if stay.exit.date >= MARCH_2016 {
                valid &= errors.error(165);
            } else {
                errors.warn(165);
            }
        } else if stay.entry.date - lmp > 305 {
            errors.warn(166);
        }
    }

    // Newborn entry
    if stay.exit.date >= MARCH_2019 && stay.entry.mode == b'N' {
        if stay.entry.date != stay.birthdate {
            valid &= errors.error(190);
        }
        if mono_preps[0].stay.main_diagnosis.matches("Z762") {
            valid &= errors.error(191);
        }
    }

    // Conversions out of a partial or mixed unit
    if stay.exit.date >= MARCH_2019 && mono_preps.len() > 1 && mono_preps[0].duration == 0 {
        let first_markers = mono_preps[0].markers;
        let second_flags = mono_preps[1].stay.flags;

        if first_markers.intersects(Markers::PARTIAL_UNIT)
            && second_flags.contains(StayFlags::NO_CONVERSION)
        {
            errors.set(153, 0);
        }
        if first_markers.intersects(Markers::PARTIAL_UNIT | Markers::MIXED_UNIT)
            && !second_flags.intersects(StayFlags::CONVERSION | StayFlags::NO_CONVERSION)
        {
            errors.set(154, 0);
        }
    }

    valid
}

// ──────────────────────────────────────────────
// Diagnoses
// ──────────────────────────────────────────────

/// Error codes raised for one diagnosis slot (main, linked or other).
/// A code of 0 means the slot does not check that condition.
struct DiagnosisErrorCodes {
    obsolete: i16,
    /// Indexed by the imprecision kind of codes without a CMD.
    imprecise: [i16; 4],
    restricted: i16,
    too_young: i16,
    too_old: i16,
    /// Warnings for attribute bits 9, 0 and 10.
    warnings: [i16; 3],
    sex: i16,
    age: i16,
}

const MAIN_DIAGNOSIS_ERRORS: DiagnosisErrorCodes = DiagnosisErrorCodes {
    obsolete: 68,
    imprecise: [113, 114, 115, 113],
    restricted: 180,
    too_young: 130,
    too_old: 133,
    warnings: [88, 84, 87],
    sex: 86,
    age: 85,
};

const LINKED_DIAGNOSIS_ERRORS: DiagnosisErrorCodes = DiagnosisErrorCodes {
    obsolete: 95,
    imprecise: [116, 117, 118, 0],
    restricted: 181,
    too_young: 131,
    too_old: 134,
    warnings: [0, 96, 99],
    sex: 98,
    age: 97,
};

const OTHER_DIAGNOSIS_ERRORS: DiagnosisErrorCodes = DiagnosisErrorCodes {
    obsolete: 71,
    imprecise: [0, 0, 119, 0],
    restricted: 182,
    too_young: 132,
    too_old: 135,
    warnings: [0, 90, 93],
    sex: 92,
    age: 91,
};

fn check_diagnosis_errors(
    prep: &PreparedStay,
    info: &DiagnosisInfo,
    codes: &DiagnosisErrorCodes,
    errors: &mut ErrorSet,
) -> bool {
    let stay = &*prep.stay;

    for (bit, code) in [9, 0, 10].into_iter().zip(codes.warnings) {
        if info.warnings & (1 << bit) != 0 {
            errors.warn(code);
        }
    }

    let sex_bit = 13 - i32::from(stay.sex);
    if (0..16).contains(&sex_bit) && info.warnings & (1 << sex_bit) != 0 {
        errors.warn(codes.sex);
    }

    if info.warnings != 0 {
        let young_limit = if stay.exit.date >= MARCH_2016 { 8 } else { 10 };
        let age_bit = if prep.age_days < 29 {
            4
        } else if prep.age == 0 {
            3
        } else if prep.age < young_limit {
            5
        } else if prep.age < 20 {
            6
        } else if prep.age < 65 {
            7
        } else {
            8
        };
        if info.warnings & (1 << age_bit) != 0 {
            errors.warn(codes.age);
        }
    }

    if info.test(5, 0x2) {
        return errors.error(codes.obsolete);
    }
    if info.raw[0] == 0 {
        return match codes.imprecise.get(usize::from(info.raw[1])) {
            Some(&code) => errors.error(code),
            None => true,
        };
    }
    if stay.exit.date >= MARCH_2014 && info.raw[0] == 23 && info.raw[1] == 14 {
        errors.error(codes.restricted)
    } else if info.test(19, 0x10) && prep.age < 9 {
        errors.error(codes.too_young)
    } else if info.test(19, 0x8) && prep.age >= 2 {
        errors.error(codes.too_old)
    } else {
        true
    }
}

fn append_valid_diagnoses<'a>(
    index: &'a TableIndex,
    set: &mut PreparedSet<'a>,
    errors: &mut ErrorSet,
) -> bool {
    let mono_stays = set.mono_stays;
    let PreparedSet {
        prep, mono_preps, ..
    } = set;

    let mut valid = true;

    for (mono_stay, mono_prep) in mono_stays.iter().zip(mono_preps.iter_mut()) {
        mono_prep.diagnoses.clear();

        for &diag in &mono_stay.other_diagnoses {
            if diag.matches("Z37") {
                prep.markers.insert(Markers::CHILDBIRTH_DIAGNOSIS);
                mono_prep.markers.insert(Markers::CHILDBIRTH_DIAGNOSIS);
            }
            if diag.matches("O8") && matches!(diag.as_str().as_bytes().get(2), Some(b'0'..=b'4')) {
                prep.markers.insert(Markers::CHILDBIRTH_TYPE);
                mono_prep.markers.insert(Markers::CHILDBIRTH_TYPE);
            }

            match index.find_diagnosis(diag, mono_stay.sex) {
                Some(info) => {
                    mono_prep.diagnoses.push(info);
                    valid &= check_diagnosis_errors(prep, info, &OTHER_DIAGNOSIS_ERRORS, errors);
                }
                None => valid &= errors.error(70),
            }
        }

        mono_prep.main_diag_info = index.find_diagnosis(mono_stay.main_diagnosis, mono_stay.sex);
        match mono_prep.main_diag_info {
            Some(info) => {
                mono_prep.diagnoses.push(info);
                valid &= check_diagnosis_errors(prep, info, &MAIN_DIAGNOSIS_ERRORS, errors);
            }
            None => valid &= errors.error(67),
        }

        if mono_stay.linked_diagnosis.is_valid() {
            mono_prep.linked_diag_info =
                index.find_diagnosis(mono_stay.linked_diagnosis, mono_stay.sex);
            match mono_prep.linked_diag_info {
                Some(info) => {
                    mono_prep.diagnoses.push(info);
                    valid &= check_diagnosis_errors(prep, info, &LINKED_DIAGNOSIS_ERRORS, errors);
                }
                None => valid &= errors.error(94),
            }
        }
    }

    // Admission list: first occurrence wins
    prep.diagnoses.clear();
    for mono_prep in mono_preps.iter() {
        for &info in &mono_prep.diagnoses {
            if !prep.diagnoses.iter().any(|&seen| std::ptr::eq(seen, info)) {
                prep.diagnoses.push(info);
            }
        }
    }

    valid
}

// ──────────────────────────────────────────────
// Procedures
// ──────────────────────────────────────────────

fn activity_bit(activity: i8) -> u8 {
    u32::try_from(activity)
        .ok()
        .and_then(|shift| 1u8.checked_shl(shift))
        .unwrap_or(0)
}

fn extension_bit(extension: i8) -> u64 {
    u32::try_from(extension)
        .ok()
        .and_then(|shift| 1u64.checked_shl(shift))
        .unwrap_or(0)
}

fn append_valid_procedures<'a>(
    index: &'a TableIndex,
    flags: ClassifyFlags,
    set: &mut PreparedSet<'a>,
    errors: &mut ErrorSet,
) -> bool {
    let mono_stays = set.mono_stays;
    let PreparedSet {
        prep, mono_preps, ..
    } = set;

    let exit_date = prep.stay.exit.date;
    let newborn_weight = prep.stay.newborn_weight;

    let mut valid = true;

    // Admission candidates, with a flag set when activity 1 is required but
    // this realisation does not provide it.
    let mut candidates: Vec<(&'a ProcedureInfo, bool)> = Vec::new();

    for (mono_stay, mono_prep) in mono_stays.iter().zip(mono_preps.iter_mut()) {
        let mut additions: HashSet<i16> = HashSet::new();
        let mut additions_mismatch = 0usize;
        let mut proc_activities = 0u8;
        // Each realisation repeated `count` times, with the activity used to
        // satisfy additions.
        let mut realisations: Vec<(&'a ProcedureInfo, i8)> = Vec::new();

        for proc in &mono_stay.procedures {
            if proc.count == 0 {
                valid &= errors.error(52);
            }
            if proc.activity == 0 {
                valid &= errors.error(103);
            }
            if !flags.ignore_procedure_doc
                && proc.doc != 0
                && (!proc.doc.is_ascii_alphanumeric() || proc.doc == b'I' || proc.doc == b'O')
            {
                valid &= errors.error(173);
            }

            let Some(info) = index.find_procedure(proc.proc, proc.phase, mono_stay.exit.date) else {
                let compatible = index.find_procedures(proc.proc);
                if compatible.iter().any(|info| info.phase == proc.phase) {
                    if !proc.proc.matches("YYYY") {
                        let first_start = compatible.first().map(|info| info.limit_dates[0]);
                        let last_end = compatible.last().map(|info| info.limit_dates[1]);
                        if first_start.is_some_and(|start| mono_stay.exit.date < start) {
                            valid &= errors.error(79);
                        } else if last_end.is_some_and(|end| mono_stay.entry.date >= end) {
                            valid &= errors.error(78);
                        }
                    }
                } else {
                    valid &= errors.error(73);
                }
                continue;
            };

            if info.test(43, 0x40) && mono_stay.sex == 2 {
                errors.warn(148);
            }
            if (prep.age != 0 || prep.age_days > 28)
                && info.test(44, 0x20)
                && (newborn_weight == 0 || newborn_weight >= 3000)
            {
                valid &= errors.error(149);
            }

            let childbirth = info.test(41, 0x2);
            if childbirth {
                prep.markers.insert(Markers::CHILDBIRTH_PROCEDURE);
                mono_prep.markers.insert(Markers::CHILDBIRTH_PROCEDURE);
            }

            if !proc.date.is_valid()
                || proc.date < mono_stay.entry.date
                || proc.date > mono_stay.exit.date
            {
                if childbirth {
                    valid &= errors.error(142);
                } else if proc.date.is_set() {
                    errors.warn(102);
                }
            } else if childbirth {
                if !prep.childbirth_date.is_set() {
                    prep.childbirth_date = proc.date;
                }
                if !mono_prep.childbirth_date.is_set() {
                    mono_prep.childbirth_date = proc.date;
                }
            }

            if !flags.ignore_procedure_extension && exit_date >= MARCH_2016 {
                let bit = extension_bit(proc.extension);
                if mono_stay.entry.date >= MARCH_2020 && info.disabled_extensions & bit != 0 {
                    valid &= errors.error(193);
                } else if info.extensions & bit == 0 {
                    if exit_date >= MARCH_2019 && proc.extension == 0 {
                        errors.set(192, 0);
                    } else if exit_date >= MARCH_2017 {
                        valid &= errors.error(186);
                    } else {
                        errors.set(186, 0);
                    }
                }
            }

            let mut needs_activity_1 = false;
            if !proc.proc.matches("YYYY") {
                if info.activities & activity_bit(proc.activity) == 0 {
                    if proc.activity == 4 {
                        valid &= errors.error(110);
                    } else if !(1..=5).contains(&proc.activity) {
                        valid &= errors.error(103);
                    } else {
                        errors.set(111, 0);
                    }
                }

                if exit_date >= MARCH_2013 && proc.activity == 4 && proc.doc == 0 {
                    errors.set(170, 0);
                }

                needs_activity_1 = proc.activity != 1 && !info.test(42, 0x2);
            }

            let mut addition_activity = 0;
            if !flags.ignore_procedure_addition {
                if info.test(32, 0x8) {
                    let addition = usize::try_from(proc.activity)
                        .ok()
                        .and_then(|activity| info.additions.get(activity))
                        .copied()
                        .unwrap_or(0);
                    if addition != 0 && additions.insert(addition) {
                        additions_mismatch += 1;
                    }
                }
                if info.test(32, 0x4) {
                    addition_activity = proc.activity & 0x7;
                }
            }

            candidates.push((info, needs_activity_1));
            for _ in 0..proc.count.max(0) {
                realisations.push((info, addition_activity));
            }
            proc_activities |= activity_bit(proc.activity);
        }

        if !flags.ignore_procedure_addition {
            for &(info, activity) in &realisations {
                if activity == 0 {
                    continue;
                }
                for link in index.procedures().addition_links(info) {
                    if additions_mismatch == 0 {
                        break;
                    }
                    if link.activity == activity && additions.remove(&link.addition_idx) {
                        additions_mismatch -= 1;
                    }
                }
            }
            if additions_mismatch > 0 {
                errors.set(112, 0);
            }
        }

        mono_prep.procedures = realisations.into_iter().map(|(info, _)| info).collect();
        mono_prep.proc_activities = proc_activities;
        prep.proc_activities |= proc_activities;
    }

    // Table order, realisations providing activity 1 first
    candidates.sort_by(|a, b| {
        a.0.order_key()
            .cmp(&b.0.order_key())
            .then(a.1.cmp(&b.1))
    });

    prep.procedures.clear();
    for (info, needs_activity_1) in candidates {
        if prep.procedures.last().is_some_and(|&last| std::ptr::eq(last, info)) {
            continue;
        }
        prep.procedures.push(info);
        if needs_activity_1 {
            valid &= errors.error(167);
        }
    }

    valid
}

// ──────────────────────────────────────────────
// Main stay
// ──────────────────────────────────────────────

/// Picks the stay whose diagnoses drive the grouping of a multi-stay
/// admission. `duration` is the admission duration.
fn find_main_stay(mono_preps: &[PreparedStay], duration: i32) -> usize {
    let mut max_duration = -1;
    let mut zx_idx = None;
    let mut zx_duration = -1;
    let mut trauma_idx = None;
    let mut last_trauma_idx = None;
    let mut ignore_trauma = false;
    let mut score_idx = 0;
    let mut base_score = 0;
    let mut min_score = i32::MAX;

    for (idx, mono_prep) in mono_preps.iter().enumerate() {
        let mut stay_score = base_score;

        let mut proc_priority = 0;
        for info in &mono_prep.procedures {
            // Major surgery decides on its own
            if info.test(0, 0x80) && !info.test(23, 0x80) {
                return idx;
            }

            if proc_priority < 3 && info.test(38, 0x2) {
                proc_priority = 3;
            } else if proc_priority < 2 && duration <= 1 && info.test(39, 0x80) {
                proc_priority = 2;
            } else if proc_priority < 1 && duration == 0 && info.test(39, 0x40) {
                proc_priority = 1;
            }
        }
        stay_score -= match proc_priority {
            3 => 999_999,
            2 => 99_999,
            1 => 9_999,
            _ => 0,
        };

        if mono_prep.duration > zx_duration && mono_prep.duration >= max_duration {
            let main_diagnosis = mono_prep.stay.main_diagnosis;
            if ["Z515", "Z502", "Z503"]
                .iter()
                .any(|prefix| main_diagnosis.matches(prefix))
            {
                zx_idx = Some(idx);
                zx_duration = mono_prep.duration;
            } else {
                zx_idx = None;
            }
        }

        let main_flags = mono_prep.main_diag_info.map_or(0, |info| info.byte(21));

        if !ignore_trauma {
            if main_flags & 0x4 != 0 {
                last_trauma_idx = Some(idx);
                if mono_prep.duration > max_duration {
                    trauma_idx = Some(idx);
                }
            } else {
                ignore_trauma = true;
            }
        }

        if main_flags & 0x20 != 0 {
            stay_score += 150;
        } else if mono_prep.duration >= 2 {
            base_score += 100;
        }
        match mono_prep.duration {
            0 => stay_score += 2,
            1 => stay_score += 1,
            _ => {}
        }
        if main_flags & 0x2 != 0 {
            stay_score += 201;
        }

        if stay_score < min_score {
            score_idx = idx;
            min_score = stay_score;
        }

        max_duration = max_duration.max(mono_prep.duration);
    }

    if let Some(idx) = zx_idx {
        idx
    } else if last_trauma_idx.is_some_and(|idx| idx >= score_idx) {
        trauma_idx.unwrap_or(score_idx)
    } else {
        score_idx
    }
}
