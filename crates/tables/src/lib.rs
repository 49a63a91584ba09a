//! Versioned MCO rule tables.
//!
//! Loads the binary `.tab` rule tables published each year, JSON price
//! tables and facility authorizations, and sweeps them into dated
//! [`TableIndex`] periods used by the classifier and the pricer.

pub mod authorization;
pub mod codes;
pub mod date;
pub mod decode;
pub mod error;
pub mod header;
pub mod prices;
pub mod set;
pub mod types;

pub use authorization::{Authorization, AuthorizationMode, AuthorizationSet};
pub use codes::{
    CodeParseError, DiagnosisCode, GhmCode, GhmRootCode, GhsCode, ListMask, ProcedureCode, Sector,
    SupplementCounters, SupplementType, UnitCode,
};
pub use date::{Date, DateParseError};
pub use error::{AuthorizationError, PriceError, TableError};
pub use set::{load_table_set, IndexSummary, TableIndex, TableSet, TableSetBuilder};
pub use types::*;
