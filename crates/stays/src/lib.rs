//! pmsi-stays: MCO stay records.
//!
//! Provides the [`Stay`] record consumed by the classifier, a flat
//! [`StayArena`] used by loaders with its bounds-checked resolve pass, and
//! the JSON stay file reader.

pub mod arena;
pub mod deserialize;
pub mod error;
pub mod types;

pub use arena::{Span, StayArena, StayRecord};
pub use deserialize::{load_stays, parse_stays, stays_from_json};
pub use error::StayError;
pub use types::*;

/// Groups consecutive stays sharing a bill id. Each group is classified as
/// one admission; stays of a group must never be split across workers.
pub fn split_clusters(stays: &[Stay]) -> Vec<&[Stay]> {
    stays
        .chunk_by(|prev, next| prev.bill_id == next.bill_id)
        .collect()
}
