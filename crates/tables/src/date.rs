//! Calendar dates as they appear in stay records and rule tables.
//!
//! Stay data can carry impossible dates (for example 2019-02-30) that must
//! survive loading so the classifier can report them, so [`Date`] keeps the
//! raw year/month/day triple and only consults the `time` crate to validate
//! it and to do day arithmetic.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::ops::Sub;
use std::str::FromStr;
use time::Month;

/// A possibly invalid calendar date. The all-zero value means "not set".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Date {
    pub year: i16,
    pub month: i8,
    pub day: i8,
}

/// Error returned when a date string does not look like a date at all.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed date '{0}'")]
pub struct DateParseError(pub String);

impl Date {
    pub const fn new(year: i16, month: i8, day: i8) -> Self {
        Date { year, month, day }
    }

    /// Dates in rule tables are stored as days elapsed since 1979-12-31.
    pub fn from_table_days(days: u16) -> Self {
        Date::new(1979, 12, 31).add_days(i32::from(days))
    }

    pub fn is_set(&self) -> bool {
        self.year != 0 || self.month != 0 || self.day != 0
    }

    pub fn is_valid(&self) -> bool {
        self.to_time().is_some()
    }

    pub fn julian_days(&self) -> Option<i32> {
        self.to_time().map(|d| d.to_julian_day())
    }

    /// Returns the date `days` days later (or earlier). Invalid dates are
    /// returned unchanged.
    pub fn add_days(self, days: i32) -> Self {
        self.julian_days()
            .and_then(|jd| time::Date::from_julian_day(jd + days).ok())
            .map(Date::from_time)
            .unwrap_or(self)
    }

    fn to_time(self) -> Option<time::Date> {
        let month = Month::try_from(u8::try_from(self.month).ok()?).ok()?;
        let day = u8::try_from(self.day).ok()?;
        time::Date::from_calendar_date(i32::from(self.year), month, day).ok()
    }

    fn from_time(d: time::Date) -> Self {
        Date {
            year: d.year() as i16,
            month: u8::from(d.month()) as i8,
            day: d.day() as i8,
        }
    }
}

/// Number of days between two dates. Either side being invalid yields 0, so
/// callers check validity first wherever the distinction matters.
impl Sub for Date {
    type Output = i32;

    fn sub(self, rhs: Date) -> i32 {
        match (self.julian_days(), rhs.julian_days()) {
            (Some(a), Some(b)) => a - b,
            _ => 0,
        }
    }
}

impl fmt::Display for Date {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}-{:02}", self.year, self.month, self.day)
    }
}

/// Accepts `YYYY-MM-DD` and `DD/MM/YYYY`. Syntax is checked, calendar
/// validity is not.
impl FromStr for Date {
    type Err = DateParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || DateParseError(s.to_string());
        let digits = |part: &str, len: usize| -> Option<i32> {
            if part.len() == len && part.bytes().all(|c| c.is_ascii_digit()) {
                part.parse().ok()
            } else {
                None
            }
        };

        let (year, month, day) = if let [y, m, d] = s.split('-').collect::<Vec<_>>()[..] {
            (digits(y, 4), digits(m, 2), digits(d, 2))
        } else if let [d, m, y] = s.split('/').collect::<Vec<_>>()[..] {
            (digits(y, 4), digits(m, 2), digits(d, 2))
        } else {
            return Err(err());
        };

        match (year, month, day) {
            (Some(y), Some(m), Some(d)) => Ok(Date::new(y as i16, m as i8, d as i8)),
            _ => Err(err()),
        }
    }
}

impl Serialize for Date {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.is_set() {
            serializer.collect_str(self)
        } else {
            serializer.serialize_none()
        }
    }
}

impl<'de> Deserialize<'de> for Date {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            None => Ok(Date::default()),
            Some(s) if s.is_empty() => Ok(Date::default()),
            Some(s) => s.parse().map_err(serde::de::Error::custom),
        }
    }
}
