//! Stay records as handed to the classifier.
//!
//! A [`Stay`] is one physical stay (RUM) in one medical unit. Stays of the
//! same admission share a bill id and are classified together. Values that
//! could not be parsed are left at their default and flagged in
//! [`Stay::errors`], so that the classifier can report them instead of the
//! loader rejecting the whole admission.

use pmsi_tables::{Date, DiagnosisCode, ProcedureCode, UnitCode};
use serde::Serialize;
use std::ops::BitOr;

macro_rules! bit_flags {
    (
        $(#[$meta:meta])*
        pub struct $name:ident: $repr:ty {
            $( $(#[$fmeta:meta])* const $flag:ident = $bit:expr; )*
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
        #[serde(transparent)]
        pub struct $name(pub $repr);

        impl $name {
            $( $(#[$fmeta])* pub const $flag: $name = $name(1 << $bit); )*

            pub const fn empty() -> Self {
                $name(0)
            }

            pub fn is_empty(self) -> bool {
                self.0 == 0
            }

            pub fn contains(self, other: $name) -> bool {
                self.0 & other.0 == other.0
            }

            pub fn intersects(self, other: $name) -> bool {
                self.0 & other.0 != 0
            }

            pub fn insert(&mut self, other: $name) {
                self.0 |= other.0;
            }

            pub fn remove(&mut self, other: $name) {
                self.0 &= !other.0;
            }

            pub fn set(&mut self, other: $name, value: bool) {
                if value {
                    self.insert(other);
                } else {
                    self.remove(other);
                }
            }
        }

        impl BitOr for $name {
            type Output = $name;

            fn bitor(self, rhs: $name) -> $name {
                $name(self.0 | rhs.0)
            }
        }
    };
}

bit_flags! {
    /// Yes/no fields of a stay.
    pub struct StayFlags: u32 {
        /// The unusual duration or exit has been confirmed by the physician.
        const CONFIRMED = 0;
        const CONVERSION = 1;
        const NO_CONVERSION = 2;
        /// Enhanced recovery after surgery.
        const RAAC = 3;
        const CONTEXT = 4;
        const HOSPITAL_USE = 5;
        const RESCRIPT = 6;
        /// Expensive drugs were dispensed, the GHS price may be reduced.
        const UCD = 7;
    }
}

bit_flags! {
    /// Fields that were present but could not be parsed.
    pub struct StayErrors: u32 {
        const UNKNOWN_RUM_VERSION = 0;
        const MALFORMED_BILL_ID = 1;
        const MALFORMED_BIRTHDATE = 2;
        const MALFORMED_SEX = 3;
        const MALFORMED_ENTRY_DATE = 4;
        const MALFORMED_ENTRY_MODE = 5;
        const MALFORMED_ENTRY_ORIGIN = 6;
        const MALFORMED_EXIT_DATE = 7;
        const MALFORMED_EXIT_MODE = 8;
        const MALFORMED_EXIT_DESTINATION = 9;
        const MALFORMED_SESSION_COUNT = 10;
        const MALFORMED_GESTATIONAL_AGE = 11;
        const MALFORMED_NEWBORN_WEIGHT = 12;
        const MALFORMED_LAST_MENSTRUAL_PERIOD = 13;
        const MALFORMED_IGS2 = 14;
        const MALFORMED_CONFIRMATION = 15;
        const MALFORMED_CONVERSION = 16;
        const MALFORMED_RAAC = 17;
        const MALFORMED_CONTEXT = 18;
        const MALFORMED_HOSPITAL_USE = 19;
        const MALFORMED_RESCRIPT = 20;
        const MALFORMED_MAIN_DIAGNOSIS = 21;
        const MALFORMED_LINKED_DIAGNOSIS = 22;
        const MISSING_OTHER_DIAGNOSES_COUNT = 23;
        const MALFORMED_OTHER_DIAGNOSES_COUNT = 24;
        const MALFORMED_OTHER_DIAGNOSIS = 25;
        const MISSING_PROCEDURES_COUNT = 26;
        const MALFORMED_PROCEDURES_COUNT = 27;
        const MALFORMED_PROCEDURE_CODE = 28;
        const MALFORMED_PROCEDURE_EXTENSION = 29;
    }
}

/// Entry into a unit: mode and origin are single characters such as `b'7'`
/// or `b'R'`, 0 when unset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StayEntry {
    pub date: Date,
    pub mode: u8,
    pub origin: u8,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StayExit {
    pub date: Date,
    pub mode: u8,
    pub destination: u8,
}

/// One performed procedure.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProcedureRealisation {
    pub proc: ProcedureCode,
    pub phase: i8,
    pub activity: i8,
    pub extension: i8,
    /// How many times the procedure was performed.
    pub count: i16,
    pub date: Date,
    /// Documentation code for anaesthesia procedures, 0 when unset.
    pub doc: u8,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Stay {
    pub admin_id: i32,
    pub bill_id: i32,

    /// 1 for men, 2 for women.
    pub sex: i8,
    pub birthdate: Date,
    pub entry: StayEntry,
    pub exit: StayExit,
    pub unit: UnitCode,
    pub bed_authorization: i8,
    pub session_count: i16,
    pub igs2: i16,
    pub last_menstrual_period: Date,
    pub gestational_age: i16,
    pub newborn_weight: i16,
    pub dip_count: i16,
    /// Intervention category `A` to `C` for outpatient care, 0 when unset.
    pub interv_category: u8,

    pub main_diagnosis: DiagnosisCode,
    pub linked_diagnosis: DiagnosisCode,
    pub other_diagnoses: Vec<DiagnosisCode>,
    pub procedures: Vec<ProcedureRealisation>,

    pub flags: StayFlags,
    pub errors: StayErrors,
}

impl Stay {
    /// Nights spent in the unit, 0 when either date is invalid.
    pub fn duration(&self) -> i32 {
        if self.entry.date.is_valid() && self.exit.date.is_valid() {
            self.exit.date - self.entry.date
        } else {
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_operations() {
        let mut flags = StayFlags::CONFIRMED | StayFlags::RAAC;
        assert!(flags.contains(StayFlags::CONFIRMED));
        assert!(!flags.contains(StayFlags::CONFIRMED | StayFlags::UCD));
        assert!(flags.intersects(StayFlags::UCD | StayFlags::RAAC));

        flags.set(StayFlags::RAAC, false);
        flags.insert(StayFlags::UCD);
        assert_eq!(flags, StayFlags::CONFIRMED | StayFlags::UCD);
        assert!(StayErrors::empty().is_empty());
    }

    #[test]
    fn duration_needs_valid_dates() {
        let mut stay = Stay {
            entry: StayEntry {
                date: Date::new(2019, 2, 27),
                ..Default::default()
            },
            exit: StayExit {
                date: Date::new(2019, 3, 2),
                ..Default::default()
            },
            ..Default::default()
        };
        assert_eq!(stay.duration(), 3);

        stay.exit.date = Date::new(2019, 2, 30);
        assert_eq!(stay.duration(), 0);
    }
}
