//! Facility and unit authorizations.
//!
//! Authorizations say which specialized activity (intensive care,
//! neonatology, ...) a unit or the whole facility is allowed to bill for, and
//! during which period. They are read from a JSON document:
//!
//! ```json
//! { "facility": [ { "type": 62, "date": "2019-01-01" } ],
//!   "units": [ { "unit": 1203, "type": 1, "mode": "partial",
//!                "date": "2018-01-01", "end": "2020-01-01" } ] }
//! ```

use crate::codes::UnitCode;
use crate::date::Date;
use crate::decode::max_table_date;
use crate::error::AuthorizationError;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthorizationMode {
    #[default]
    Complete,
    Partial,
    Mixed,
}

/// One authorization period. Facility-wide authorizations have no unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Authorization {
    pub unit: Option<UnitCode>,
    pub auth_type: i8,
    pub mode: AuthorizationMode,
    pub dates: [Date; 2],
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct AuthorizationDocument {
    #[serde(default)]
    facility: Vec<AuthorizationEntry>,
    #[serde(default)]
    units: Vec<AuthorizationEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct AuthorizationEntry {
    #[serde(default)]
    unit: Option<UnitCode>,
    #[serde(rename = "type")]
    auth_type: i8,
    #[serde(default)]
    mode: AuthorizationMode,
    date: Date,
    #[serde(default)]
    end: Date,
}

#[derive(Debug, Clone, Default)]
pub struct AuthorizationSet {
    units: Vec<Authorization>,
    facility: Vec<Authorization>,
}

impl AuthorizationSet {
    pub fn from_json(text: &str, filename: &str) -> Result<Self, AuthorizationError> {
        let doc: AuthorizationDocument =
            serde_json::from_str(text).map_err(|source| AuthorizationError::Json {
                file: filename.to_string(),
                source,
            })?;

        let invalid = |reason: String| AuthorizationError::Invalid {
            file: filename.to_string(),
            reason,
        };
        let convert = |entry: AuthorizationEntry, unit: Option<UnitCode>| {
            let end = if entry.end.is_set() {
                entry.end
            } else {
                max_table_date()
            };
            if !entry.date.is_valid() || !end.is_valid() || end <= entry.date {
                return Err(invalid(format!(
                    "invalid period {} to {} for authorization type {}",
                    entry.date, end, entry.auth_type
                )));
            }
            Ok(Authorization {
                unit,
                auth_type: entry.auth_type,
                mode: entry.mode,
                dates: [entry.date, end],
            })
        };

        let mut set = AuthorizationSet::default();
        for entry in doc.facility {
            if entry.unit.is_some() {
                return Err(invalid("facility authorizations cannot name a unit".to_string()));
            }
            set.facility.push(convert(entry, None)?);
        }
        for entry in doc.units {
            let unit = entry
                .unit
                .filter(UnitCode::is_valid)
                .ok_or_else(|| invalid("unit authorization without a valid unit".to_string()))?;
            set.units.push(convert(entry, Some(unit))?);
        }
        set.units.sort_by_key(|auth| (auth.unit, auth.dates[0]));

        Ok(set)
    }

    pub fn load(path: &Path) -> Result<Self, AuthorizationError> {
        let text = std::fs::read_to_string(path).map_err(|source| AuthorizationError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&text, &path.display().to_string())
    }

    /// The authorization of `unit` in force at `date`.
    pub fn find_unit(&self, unit: UnitCode, date: Date) -> Option<&Authorization> {
        let start = self.units.partition_point(|auth| auth.unit < Some(unit));
        self.units[start..]
            .iter()
            .take_while(|auth| auth.unit == Some(unit))
            .find(|auth| date >= auth.dates[0] && date < auth.dates[1])
    }

    pub fn test_facility_authorization(&self, auth_type: i8, date: Date) -> bool {
        self.facility
            .iter()
            .any(|auth| auth.auth_type == auth_type && date >= auth.dates[0] && date < auth.dates[1])
    }

    pub fn unit_authorizations(&self) -> &[Authorization] {
        &self.units
    }

    pub fn facility_authorizations(&self) -> &[Authorization] {
        &self.facility
    }
}
