//! Deserialization of JSON stay files.
//!
//! A stay file is either an array of stay objects or an object with a
//! `stays` array:
//!
//! ```json
//! [ { "bill_id": 1, "sex": 2, "birthdate": "1980-05-04",
//!     "entry_date": "2019-04-01", "entry_mode": 8, "entry_origin": "",
//!     "exit_date": "2019-04-03", "exit_mode": 8, "exit_destination": "",
//!     "unit": 1203, "dp": "K359", "das": ["E119"],
//!     "procedures": [ { "code": "HHFA016", "activity": 1, "date": "2019-04-01" } ] } ]
//! ```
//!
//! Values of the wrong type or format do not fail the load: the field is
//! left unset and the matching [`StayErrors`] bit is raised. Only a document
//! whose structure is wrong (not an array of objects) is rejected.

use crate::arena::StayArena;
use crate::error::StayError;
use crate::types::*;
use pmsi_tables::{Date, DiagnosisCode, ProcedureCode, UnitCode};
use serde_json::{Map, Value};
use std::path::Path;

/// RUM format versions understood by the classifier.
const RUM_VERSIONS: std::ops::RangeInclusive<i64> = 16..=20;

/// Parses a JSON stay document into an arena.
pub fn stays_from_json(doc: &Value, filename: &str) -> Result<StayArena, StayError> {
    let items = match doc {
        Value::Array(items) => items,
        Value::Object(obj) => obj
            .get("stays")
            .and_then(|v| v.as_array())
            .ok_or_else(|| invalid(filename, "missing 'stays' array"))?,
        _ => return Err(invalid(filename, "expected an array of stays")),
    };

    let mut arena = StayArena::new();
    for (index, item) in items.iter().enumerate() {
        let obj = item
            .as_object()
            .ok_or_else(|| invalid(filename, format!("stay {index} is not an object")))?;
        arena.push(parse_stay(obj, index, filename));
    }

    tracing::debug!(file = filename, stays = arena.len(), "parsed stay file");
    Ok(arena)
}

/// Parses JSON text and resolves the resulting arena.
pub fn parse_stays(text: &str, filename: &str) -> Result<Vec<Stay>, StayError> {
    let doc: Value = serde_json::from_str(text).map_err(|source| StayError::Json {
        file: filename.to_string(),
        source,
    })?;
    stays_from_json(&doc, filename)?.resolve()
}

pub fn load_stays(path: &Path) -> Result<Vec<Stay>, StayError> {
    let text = std::fs::read_to_string(path).map_err(|source| StayError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_stays(&text, &path.display().to_string())
}

// ── Parsing helpers ─────────────────────────────────────────────────

fn invalid(filename: &str, reason: impl Into<String>) -> StayError {
    StayError::Invalid {
        file: filename.to_string(),
        reason: reason.into(),
    }
}

/// Integers may be given as numbers or numeric strings. Returns `false`
/// when the value is present but unusable.
fn set_int<T: TryFrom<i64>>(value: &Value, out: &mut T) -> bool {
    let parsed = match value {
        Value::Null => return true,
        Value::Number(n) => n.as_i64(),
        Value::String(s) if s.trim().is_empty() => return true,
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    match parsed.and_then(|v| T::try_from(v).ok()) {
        Some(v) => {
            *out = v;
            true
        }
        None => false,
    }
}

fn set_date(value: &Value, out: &mut Date) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) if s.is_empty() => true,
        Value::String(s) => match s.parse() {
            Ok(date) => {
                *out = date;
                true
            }
            Err(_) => false,
        },
        _ => false,
    }
}

/// Mode, origin and destination codes: a digit or a single character.
fn set_char(value: &Value, allow_empty: bool, out: &mut u8) -> bool {
    match value {
        Value::Null => true,
        Value::Number(n) => match n.as_u64() {
            Some(v @ 0..=9) => {
                *out = b'0' + v as u8;
                true
            }
            _ => false,
        },
        Value::String(s) if s.is_empty() => {
            *out = 0;
            allow_empty
        }
        Value::String(s) if s.len() == 1 => {
            *out = s.as_bytes()[0].to_ascii_uppercase();
            true
        }
        _ => false,
    }
}

fn set_sex(value: &Value, out: &mut i8) -> bool {
    let sex = match value {
        Value::Null => return true,
        Value::Number(n) => match n.as_i64() {
            Some(1) => 1,
            Some(2) => 2,
            _ => return false,
        },
        Value::String(s) => match s.as_str() {
            "1" | "H" | "h" | "M" | "m" => 1,
            "2" | "F" | "f" => 2,
            _ => return false,
        },
        _ => return false,
    };
    *out = sex;
    true
}

/// Yes/no fields accept booleans, 0/1 and `"0"`/`"1"`.
fn parse_bool(value: &Value) -> Result<Option<bool>, ()> {
    match value {
        Value::Null => Ok(None),
        Value::Bool(b) => Ok(Some(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(0) => Ok(Some(false)),
            Some(1) => Ok(Some(true)),
            _ => Err(()),
        },
        Value::String(s) => match s.as_str() {
            "" => Ok(None),
            "0" => Ok(Some(false)),
            "1" => Ok(Some(true)),
            _ => Err(()),
        },
        _ => Err(()),
    }
}

fn set_flag(value: &Value, flag: StayFlags, error: StayErrors, stay: &mut Stay) {
    match parse_bool(value) {
        Ok(Some(set)) => stay.flags.set(flag, set),
        Ok(None) => {}
        Err(()) => stay.errors.insert(error),
    }
}

fn parse_diagnosis(value: &Value) -> Result<DiagnosisCode, ()> {
    match value {
        Value::Null => Ok(DiagnosisCode::default()),
        Value::String(s) if s.trim().is_empty() => Ok(DiagnosisCode::default()),
        Value::String(s) => s.parse().map_err(|_| ()),
        _ => Err(()),
    }
}

fn parse_stay(obj: &Map<String, Value>, index: usize, filename: &str) -> Stay {
    let mut stay = Stay::default();
    let mut errors = StayErrors::empty();

    for (key, value) in obj {
        match key.as_str() {
            "version" | "rum_version" => {
                let mut version = 0i64;
                if !set_int(value, &mut version) || !RUM_VERSIONS.contains(&version) {
                    errors.insert(StayErrors::UNKNOWN_RUM_VERSION);
                }
            }
            "bill_id" => {
                if !set_int(value, &mut stay.bill_id) {
                    errors.insert(StayErrors::MALFORMED_BILL_ID);
                }
            }
            "admin_id" | "stay_id" => {
                if !set_int(value, &mut stay.admin_id) {
                    tracing::warn!(file = filename, stay = index, "ignoring malformed admin id");
                }
            }
            "sex" => {
                if !set_sex(value, &mut stay.sex) {
                    errors.insert(StayErrors::MALFORMED_SEX);
                }
            }
            "birthdate" => {
                if !set_date(value, &mut stay.birthdate) {
                    errors.insert(StayErrors::MALFORMED_BIRTHDATE);
                }
            }
            "entry_date" => {
                if !set_date(value, &mut stay.entry.date) {
                    errors.insert(StayErrors::MALFORMED_ENTRY_DATE);
                }
            }
            "entry_mode" => {
                if !set_char(value, false, &mut stay.entry.mode) {
                    errors.insert(StayErrors::MALFORMED_ENTRY_MODE);
                }
            }
            "entry_origin" => {
                if !set_char(value, true, &mut stay.entry.origin) {
                    errors.insert(StayErrors::MALFORMED_ENTRY_ORIGIN);
                }
            }
            "exit_date" => {
                if !set_date(value, &mut stay.exit.date) {
                    errors.insert(StayErrors::MALFORMED_EXIT_DATE);
                }
            }
            "exit_mode" => {
                if !set_char(value, false, &mut stay.exit.mode) {
                    errors.insert(StayErrors::MALFORMED_EXIT_MODE);
                }
            }
            "exit_destination" => {
                if !set_char(value, true, &mut stay.exit.destination) {
                    errors.insert(StayErrors::MALFORMED_EXIT_DESTINATION);
                }
            }
            "unit" => {
                let mut unit = 0i16;
                if set_int(value, &mut unit) {
                    stay.unit = UnitCode(unit);
                } else {
                    tracing::warn!(file = filename, stay = index, "ignoring malformed unit");
                }
            }
            "bed_authorization" => {
                if !set_int(value, &mut stay.bed_authorization) {
                    tracing::warn!(file = filename, stay = index, "ignoring malformed bed authorization");
                }
            }
            "session_count" => {
                if !set_int(value, &mut stay.session_count) {
                    errors.insert(StayErrors::MALFORMED_SESSION_COUNT);
                }
            }
            "igs2" => {
                if !set_int(value, &mut stay.igs2) {
                    errors.insert(StayErrors::MALFORMED_IGS2);
                }
            }
            "gestational_age" => {
                if !set_int(value, &mut stay.gestational_age) {
                    errors.insert(StayErrors::MALFORMED_GESTATIONAL_AGE);
                }
            }
            "newborn_weight" => {
                if !set_int(value, &mut stay.newborn_weight) {
                    errors.insert(StayErrors::MALFORMED_NEWBORN_WEIGHT);
                }
            }
            "last_menstrual_period" => {
                if !set_date(value, &mut stay.last_menstrual_period) {
                    errors.insert(StayErrors::MALFORMED_LAST_MENSTRUAL_PERIOD);
                }
            }
            "dip_count" => {
                if !set_int(value, &mut stay.dip_count) {
                    tracing::warn!(file = filename, stay = index, "ignoring malformed DIP count");
                }
            }
            "interv_category" => match value {
                Value::Null => {}
                Value::String(s) if s.is_empty() => {}
                Value::String(s) if s.len() == 1 => {
                    stay.interv_category = s.as_bytes()[0].to_ascii_uppercase();
                }
                _ => stay.interv_category = b'?',
            },
            "confirm" => set_flag(value, StayFlags::CONFIRMED, StayErrors::MALFORMED_CONFIRMATION, &mut stay),
            "raac" => set_flag(value, StayFlags::RAAC, StayErrors::MALFORMED_RAAC, &mut stay),
            "context" => set_flag(value, StayFlags::CONTEXT, StayErrors::MALFORMED_CONTEXT, &mut stay),
            "hospital_use" => {
                set_flag(value, StayFlags::HOSPITAL_USE, StayErrors::MALFORMED_HOSPITAL_USE, &mut stay)
            }
            "rescript" => set_flag(value, StayFlags::RESCRIPT, StayErrors::MALFORMED_RESCRIPT, &mut stay),
            "ucd" => {
                if let Ok(Some(set)) = parse_bool(value) {
                    stay.flags.set(StayFlags::UCD, set);
                }
            }
            "conversion" => match parse_bool(value) {
                Ok(Some(true)) => stay.flags.insert(StayFlags::CONVERSION),
                Ok(Some(false)) => stay.flags.insert(StayFlags::NO_CONVERSION),
                Ok(None) => {}
                Err(()) => errors.insert(StayErrors::MALFORMED_CONVERSION),
            },
            "dp" => match parse_diagnosis(value) {
                Ok(diag) => stay.main_diagnosis = diag,
                Err(()) => errors.insert(StayErrors::MALFORMED_MAIN_DIAGNOSIS),
            },
            "dr" => match parse_diagnosis(value) {
                Ok(diag) => stay.linked_diagnosis = diag,
                Err(()) => errors.insert(StayErrors::MALFORMED_LINKED_DIAGNOSIS),
            },
            "das" => match value.as_array() {
                Some(arr) => {
                    for item in arr {
                        match parse_diagnosis(item) {
                            Ok(diag) if diag.is_valid() => stay.other_diagnoses.push(diag),
                            _ => errors.insert(StayErrors::MALFORMED_OTHER_DIAGNOSIS),
                        }
                    }
                }
                None => errors.insert(StayErrors::MALFORMED_OTHER_DIAGNOSES_COUNT),
            },
            "procedures" => match value.as_array() {
                Some(arr) => {
                    for item in arr {
                        match item.as_object() {
                            Some(proc_obj) => {
                                if let Some(proc) = parse_procedure(proc_obj, &mut errors) {
                                    stay.procedures.push(proc);
                                }
                            }
                            None => errors.insert(StayErrors::MALFORMED_PROCEDURE_CODE),
                        }
                    }
                }
                None => errors.insert(StayErrors::MALFORMED_PROCEDURES_COUNT),
            },
            other => {
                tracing::warn!(file = filename, stay = index, key = other, "unknown stay attribute");
            }
        }
    }

    stay.errors.insert(errors);
    stay
}

/// Returns `None` for procedures without a usable code, which only raise
/// an error bit on the stay.
fn parse_procedure(obj: &Map<String, Value>, errors: &mut StayErrors) -> Option<ProcedureRealisation> {
    let mut proc = ProcedureRealisation {
        count: 1,
        ..Default::default()
    };
    let mut valid_code = false;

    for (key, value) in obj {
        match key.as_str() {
            "code" => {
                if let Some(code) = value.as_str().and_then(|s| s.parse::<ProcedureCode>().ok()) {
                    proc.proc = code;
                    valid_code = true;
                }
            }
            "phase" => {
                set_int(value, &mut proc.phase);
            }
            "activity" => {
                set_int(value, &mut proc.activity);
            }
            "extension" => {
                if !set_int(value, &mut proc.extension) || proc.extension < 0 {
                    errors.insert(StayErrors::MALFORMED_PROCEDURE_EXTENSION);
                }
            }
            "count" => {
                set_int(value, &mut proc.count);
            }
            "date" => {
                set_date(value, &mut proc.date);
            }
            "doc" => {
                if let Some(c) = value.as_str().and_then(|s| s.bytes().next()) {
                    proc.doc = c.to_ascii_uppercase();
                }
            }
            other => {
                tracing::warn!(key = other, "unknown procedure attribute");
            }
        }
    }

    if !valid_code {
        errors.insert(StayErrors::MALFORMED_PROCEDURE_CODE);
        return None;
    }
    Some(proc)
}
