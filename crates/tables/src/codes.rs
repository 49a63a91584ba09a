//! Code value types shared by the tables, the stays and the classifier.
//!
//! All codes are small `Copy` values with explicit parsing and formatting.
//! Field order is chosen so that the derived `Ord` matches the order the rule
//! tables are sorted in.

use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::ops::{AddAssign, Index, IndexMut};
use std::str::FromStr;

/// Error returned by the `FromStr` implementations of this module.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed {kind} code '{value}'")]
pub struct CodeParseError {
    pub kind: &'static str,
    pub value: String,
}

fn parse_error(kind: &'static str, value: &str) -> CodeParseError {
    CodeParseError {
        kind,
        value: value.to_string(),
    }
}

// ──────────────────────────────────────────────
// GHM codes
// ──────────────────────────────────────────────

/// GHM root: major category (CMD), type letter and sequence, e.g. `05C19`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GhmRootCode {
    pub cmd: i8,
    pub kind: u8,
    pub seq: i8,
}

impl GhmRootCode {
    pub const fn new(cmd: i8, kind: u8, seq: i8) -> Self {
        GhmRootCode { cmd, kind, seq }
    }

    pub fn is_valid(&self) -> bool {
        self.cmd != 0 || self.kind != 0 || self.seq != 0
    }
}

impl fmt::Display for GhmRootCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.is_valid() {
            return f.write_str("?");
        }
        write!(f, "{:02}{}{:02}", self.cmd, self.kind as char, self.seq)
    }
}

impl FromStr for GhmRootCode {
    type Err = CodeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let b = s.as_bytes();
        let valid = b.len() == 5
            && b[0].is_ascii_digit()
            && b[1].is_ascii_digit()
            && b[2].is_ascii_alphabetic()
            && b[3].is_ascii_digit()
            && b[4].is_ascii_digit();
        if !valid {
            return Err(parse_error("GHM root", s));
        }

        Ok(GhmRootCode {
            cmd: ((b[0] - b'0') * 10 + (b[1] - b'0')) as i8,
            kind: b[2].to_ascii_uppercase(),
            seq: ((b[3] - b'0') * 10 + (b[4] - b'0')) as i8,
        })
    }
}

/// Full GHM code: root plus severity/mode character, e.g. `05C192`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GhmCode {
    pub cmd: i8,
    pub kind: u8,
    pub seq: i8,
    pub mode: u8,
}

impl GhmCode {
    /// Ungroupable stay (blocking data or business error).
    pub const GROUPING_ERROR: GhmCode = GhmCode::new(90, b'Z', 0, b'Z');
    /// Classification could not run (no table, or the decision tree failed).
    pub const TABLE_ERROR: GhmCode = GhmCode::new(90, b'Z', 3, b'Z');

    pub const fn new(cmd: i8, kind: u8, seq: i8, mode: u8) -> Self {
        GhmCode {
            cmd,
            kind,
            seq,
            mode,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.cmd != 0 || self.kind != 0 || self.seq != 0 || self.mode != 0
    }

    pub fn is_error(&self) -> bool {
        self.cmd == 90
    }

    pub fn root(&self) -> GhmRootCode {
        GhmRootCode::new(self.cmd, self.kind, self.seq)
    }

    pub fn with_mode(self, mode: u8) -> Self {
        GhmCode { mode, ..self }
    }

    /// Severity level (0 to 3) carried by the mode character.
    pub fn severity(&self) -> i32 {
        match self.mode {
            b'1'..=b'4' => i32::from(self.mode - b'1'),
            b'A'..=b'D' => i32::from(self.mode - b'A'),
            _ => 0,
        }
    }
}

impl fmt::Display for GhmCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.is_valid() {
            return f.write_str("?");
        }
        write!(f, "{:02}{}{:02}", self.cmd, self.kind as char, self.seq)?;
        if self.mode != 0 {
            write!(f, "{}", self.mode as char)?;
        }
        Ok(())
    }
}

impl FromStr for GhmCode {
    type Err = CodeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let b = s.as_bytes();
        if b.len() < 5 || b.len() > 6 {
            return Err(parse_error("GHM", s));
        }
        let root: GhmRootCode = s[..5].parse().map_err(|_| parse_error("GHM", s))?;
        let mode = match b.get(5) {
            Some(c) if c.is_ascii_alphanumeric() => c.to_ascii_uppercase(),
            Some(b' ') | None => 0,
            Some(_) => return Err(parse_error("GHM", s)),
        };

        Ok(GhmCode::new(root.cmd, root.kind, root.seq, mode))
    }
}

impl Serialize for GhmCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for GhmCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

impl Serialize for GhmRootCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

// ──────────────────────────────────────────────
// GHS codes
// ──────────────────────────────────────────────

/// Funding group number.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct GhsCode(pub i16);

impl GhsCode {
    /// No funding group applies.
    pub const NONE: GhsCode = GhsCode(9999);

    pub fn is_valid(&self) -> bool {
        self.0 > 0
    }
}

impl fmt::Display for GhsCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for GhsCode {
    type Err = CodeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.parse::<i16>() {
            Ok(n) if n > 0 => Ok(GhsCode(n)),
            _ => Err(parse_error("GHS", s)),
        }
    }
}

// ──────────────────────────────────────────────
// Units
// ──────────────────────────────────────────────

/// Medical unit number. Numbers of 10000 and above are pseudo-units that
/// carry their authorization type in the low digits.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct UnitCode(pub i16);

impl UnitCode {
    pub fn is_valid(&self) -> bool {
        self.0 > 0
    }
}

impl fmt::Display for UnitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ──────────────────────────────────────────────
// Diagnosis and procedure codes
// ──────────────────────────────────────────────

/// ICD-10 diagnosis code: a letter, two digits and up to three more
/// characters (digits, or `+` in the first two extra positions).
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DiagnosisCode([u8; 6]);

impl DiagnosisCode {
    /// Builds a code from raw bytes without validation; trailing NUL bytes
    /// mark the end of the code.
    pub(crate) fn from_raw(raw: [u8; 6]) -> Self {
        DiagnosisCode(raw)
    }

    pub fn as_str(&self) -> &str {
        let len = self.0.iter().position(|&c| c == 0).unwrap_or(self.0.len());
        std::str::from_utf8(&self.0[..len]).unwrap_or("")
    }

    /// Prefix test, `D50` matches `D501`.
    pub fn matches(&self, prefix: &str) -> bool {
        self.as_str().starts_with(prefix)
    }

    pub fn is_valid(&self) -> bool {
        self.0[0] != 0
    }
}

impl fmt::Debug for DiagnosisCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DiagnosisCode({})", self.as_str())
    }
}

impl fmt::Display for DiagnosisCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DiagnosisCode {
    type Err = CodeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim_end_matches(' ');
        let b = trimmed.as_bytes();
        let valid = (3..=6).contains(&b.len())
            && b[0].is_ascii_alphabetic()
            && b[1].is_ascii_digit()
            && b[2].is_ascii_digit()
            && b[3..]
                .iter()
                .enumerate()
                .all(|(i, &c)| c.is_ascii_digit() || (i < 2 && c == b'+'));
        if !valid {
            return Err(parse_error("diagnosis", s));
        }

        let mut raw = [0u8; 6];
        for (dst, src) in raw.iter_mut().zip(b) {
            *dst = src.to_ascii_uppercase();
        }
        let mut end = b.len();
        while end > 3 && raw[end - 1] == b'+' {
            end -= 1;
            raw[end] = 0;
        }

        Ok(DiagnosisCode(raw))
    }
}

impl Serialize for DiagnosisCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// CCAM procedure code: four letters and three digits, e.g. `JNJD002`.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProcedureCode([u8; 7]);

impl ProcedureCode {
    pub(crate) fn from_raw(raw: [u8; 7]) -> Self {
        ProcedureCode(raw)
    }

    pub fn as_str(&self) -> &str {
        let len = self.0.iter().position(|&c| c == 0).unwrap_or(self.0.len());
        std::str::from_utf8(&self.0[..len]).unwrap_or("")
    }

    pub fn matches(&self, prefix: &str) -> bool {
        self.as_str().starts_with(prefix)
    }

    pub fn is_valid(&self) -> bool {
        self.0[0] != 0
    }
}

impl fmt::Debug for ProcedureCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProcedureCode({})", self.as_str())
    }
}

impl fmt::Display for ProcedureCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProcedureCode {
    type Err = CodeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let b = s.as_bytes();
        let valid = b.len() == 7
            && b[..4].iter().all(u8::is_ascii_alphabetic)
            && b[4..].iter().all(u8::is_ascii_digit);
        if !valid {
            return Err(parse_error("procedure", s));
        }

        let mut raw = [0u8; 7];
        for (dst, src) in raw.iter_mut().zip(b) {
            *dst = src.to_ascii_uppercase();
        }
        Ok(ProcedureCode(raw))
    }
}

impl Serialize for ProcedureCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

// ──────────────────────────────────────────────
// Masks, sectors, supplements
// ──────────────────────────────────────────────

/// A single bit inside a diagnosis or procedure attribute byte array.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub struct ListMask {
    pub offset: u8,
    pub value: u8,
}

impl ListMask {
    pub const fn new(offset: u8, value: u8) -> Self {
        ListMask { offset, value }
    }

    pub fn is_set(&self) -> bool {
        self.offset != 0 || self.value != 0
    }

    /// Tests the mask against attribute bytes; offsets past the end read as 0.
    pub fn test(&self, bytes: &[u8]) -> bool {
        bytes
            .get(usize::from(self.offset))
            .is_some_and(|b| b & self.value != 0)
    }
}

/// Funding sector, selects GHS numbers and price tables.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sector {
    #[default]
    Public,
    Private,
}

impl Sector {
    pub fn index(self) -> usize {
        match self {
            Sector::Public => 0,
            Sector::Private => 1,
        }
    }
}

impl fmt::Display for Sector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sector::Public => f.write_str("public"),
            Sector::Private => f.write_str("private"),
        }
    }
}

impl FromStr for Sector {
    type Err = CodeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "public" => Ok(Sector::Public),
            "private" => Ok(Sector::Private),
            _ => Err(parse_error("sector", s)),
        }
    }
}

/// Per-day supplement categories, in counter order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SupplementType {
    Rea,
    Reasi,
    Si,
    Src,
    Nn1,
    Nn2,
    Nn3,
    Rep,
    Ohb,
    Aph,
    Ant,
    Rap,
    Dia,
    Dip,
    Ent1,
    Ent2,
    Ent3,
    Sdc,
}

impl SupplementType {
    pub const COUNT: usize = 18;

    pub const ALL: [SupplementType; SupplementType::COUNT] = [
        SupplementType::Rea,
        SupplementType::Reasi,
        SupplementType::Si,
        SupplementType::Src,
        SupplementType::Nn1,
        SupplementType::Nn2,
        SupplementType::Nn3,
        SupplementType::Rep,
        SupplementType::Ohb,
        SupplementType::Aph,
        SupplementType::Ant,
        SupplementType::Rap,
        SupplementType::Dia,
        SupplementType::Dip,
        SupplementType::Ent1,
        SupplementType::Ent2,
        SupplementType::Ent3,
        SupplementType::Sdc,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SupplementType::Rea => "REA",
            SupplementType::Reasi => "REASI",
            SupplementType::Si => "SI",
            SupplementType::Src => "SRC",
            SupplementType::Nn1 => "NN1",
            SupplementType::Nn2 => "NN2",
            SupplementType::Nn3 => "NN3",
            SupplementType::Rep => "REP",
            SupplementType::Ohb => "OHB",
            SupplementType::Aph => "APH",
            SupplementType::Ant => "ANT",
            SupplementType::Rap => "RAP",
            SupplementType::Dia => "DIA",
            SupplementType::Dip => "DIP",
            SupplementType::Ent1 => "ENT1",
            SupplementType::Ent2 => "ENT2",
            SupplementType::Ent3 => "ENT3",
            SupplementType::Sdc => "SDC",
        }
    }

    pub fn from_name(name: &str) -> Option<SupplementType> {
        SupplementType::ALL.into_iter().find(|t| t.name() == name)
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// One counter per supplement type (days, cents or unit prices).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SupplementCounters<T> {
    pub values: [T; SupplementType::COUNT],
}

impl<T: Copy + Default + PartialEq> SupplementCounters<T> {
    pub fn iter(&self) -> impl Iterator<Item = (SupplementType, T)> + '_ {
        SupplementType::ALL.into_iter().zip(self.values.iter().copied())
    }

    pub fn is_empty(&self) -> bool {
        self.values.iter().all(|v| *v == T::default())
    }
}

impl<T> Index<SupplementType> for SupplementCounters<T> {
    type Output = T;

    fn index(&self, ty: SupplementType) -> &T {
        &self.values[ty.index()]
    }
}

impl<T> IndexMut<SupplementType> for SupplementCounters<T> {
    fn index_mut(&mut self, ty: SupplementType) -> &mut T {
        &mut self.values[ty.index()]
    }
}

impl<T: Copy + AddAssign> AddAssign<&SupplementCounters<T>> for SupplementCounters<T> {
    fn add_assign(&mut self, other: &SupplementCounters<T>) {
        for (a, b) in self.values.iter_mut().zip(other.values.iter()) {
            *a += *b;
        }
    }
}

/// Serialized as a map keyed by supplement name, zero counters omitted.
impl<T: Copy + Default + PartialEq + Serialize> Serialize for SupplementCounters<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let non_zero: Vec<_> = self.iter().filter(|(_, v)| *v != T::default()).collect();
        let mut map = serializer.serialize_map(Some(non_zero.len()))?;
        for (ty, value) in non_zero {
            map.serialize_entry(ty.name(), &value)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ghm_code_round_trip_and_severity() {
        let ghm: GhmCode = "05C192".parse().unwrap();
        assert_eq!(ghm, GhmCode::new(5, b'C', 19, b'2'));
        assert_eq!(ghm.to_string(), "05C192");
        assert_eq!(ghm.severity(), 1);
        assert_eq!(ghm.root().to_string(), "05C19");
        assert_eq!("05C19C".parse::<GhmCode>().unwrap().severity(), 2);
        assert_eq!("05C19J".parse::<GhmCode>().unwrap().severity(), 0);
        assert!("5C192".parse::<GhmCode>().is_err());
    }

    #[test]
    fn sentinel_ghms_are_errors() {
        assert_eq!(GhmCode::GROUPING_ERROR.to_string(), "90Z00Z");
        assert_eq!(GhmCode::TABLE_ERROR.to_string(), "90Z03Z");
        assert!(GhmCode::GROUPING_ERROR.is_error());
        assert_eq!(GhmCode::default().to_string(), "?");
    }

    #[test]
    fn ghm_order_puts_cmd_first() {
        let a: GhmCode = "01C031".parse().unwrap();
        let b: GhmCode = "01M011".parse().unwrap();
        let c: GhmCode = "02C021".parse().unwrap();
        assert!(a < b && b < c);
    }

    #[test]
    fn diagnosis_trailing_plus_is_trimmed() {
        let diag: DiagnosisCode = "z37+".parse().unwrap_or_default();
        assert_eq!(diag.as_str(), "Z37");
        let diag: DiagnosisCode = "S0600".parse().unwrap();
        assert!(diag.matches("S06"));
        assert!(!diag.matches("S07"));
        assert!("Z3".parse::<DiagnosisCode>().is_err());
        assert!("Z37A".parse::<DiagnosisCode>().is_err());
        assert!("Z3712+".parse::<DiagnosisCode>().is_err());
    }

    #[test]
    fn procedure_code_shape() {
        let proc: ProcedureCode = "jnjd002".parse().unwrap();
        assert_eq!(proc.as_str(), "JNJD002");
        assert!("JNJ0002".parse::<ProcedureCode>().is_err());
        assert!("JNJD02".parse::<ProcedureCode>().is_err());
    }

    #[test]
    fn list_mask_ignores_out_of_range_offsets() {
        let bytes = [0u8, 0x40];
        assert!(ListMask::new(1, 0x40).test(&bytes));
        assert!(!ListMask::new(1, 0x80).test(&bytes));
        assert!(!ListMask::new(200, 0xFF).test(&bytes));
    }

    #[test]
    fn supplement_counters_add_and_serialize() {
        let mut a = SupplementCounters::<i32>::default();
        a[SupplementType::Rea] = 2;
        let mut b = SupplementCounters::<i32>::default();
        b[SupplementType::Rea] = 1;
        b[SupplementType::Nn1] = 3;
        a += &b;
        assert_eq!(a[SupplementType::Rea], 3);
        assert_eq!(
            serde_json::to_value(a).unwrap(),
            serde_json::json!({ "REA": 3, "NN1": 3 })
        );
        assert_eq!(SupplementType::from_name("ENT2"), Some(SupplementType::Ent2));
    }
}
