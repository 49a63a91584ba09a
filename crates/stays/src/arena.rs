//! Flat storage for large stay sets.
//!
//! Loaders append diagnoses and procedures of every stay to two shared
//! vectors and keep a [`Span`] per stay. [`StayArena::resolve`] then turns
//! the spans back into owned [`Stay`] values, checking every range against
//! the stored values first.

use crate::error::StayError;
use crate::types::{ProcedureRealisation, Stay};
use pmsi_tables::DiagnosisCode;
use serde::{Deserialize, Serialize};

/// A range of values inside one of the arena vectors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub len: usize,
}

impl Span {
    pub fn end(&self) -> Option<usize> {
        self.start.checked_add(self.len)
    }
}

/// One stay whose diagnosis and procedure lists live in the arena.
/// The `other_diagnoses` and `procedures` vectors of `stay` are empty.
#[derive(Debug, Clone, Default)]
pub struct StayRecord {
    pub stay: Stay,
    pub other_diagnoses: Span,
    pub procedures: Span,
}

#[derive(Debug, Clone, Default)]
pub struct StayArena {
    records: Vec<StayRecord>,
    diagnoses: Vec<DiagnosisCode>,
    procedures: Vec<ProcedureRealisation>,
}

impl StayArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds an arena from raw parts, as produced by packed loaders.
    /// Spans are only checked by [`StayArena::resolve`].
    pub fn from_parts(
        records: Vec<StayRecord>,
        diagnoses: Vec<DiagnosisCode>,
        procedures: Vec<ProcedureRealisation>,
    ) -> Self {
        StayArena {
            records,
            diagnoses,
            procedures,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Moves the lists of `stay` into the shared vectors.
    pub fn push(&mut self, mut stay: Stay) {
        let other_diagnoses = Span {
            start: self.diagnoses.len(),
            len: stay.other_diagnoses.len(),
        };
        self.diagnoses.append(&mut stay.other_diagnoses);

        let procedures = Span {
            start: self.procedures.len(),
            len: stay.procedures.len(),
        };
        self.procedures.append(&mut stay.procedures);

        self.records.push(StayRecord {
            stay,
            other_diagnoses,
            procedures,
        });
    }

    /// Checks every span and rebuilds owned stays. Any out-of-range span
    /// fails the whole arena.
    pub fn resolve(self) -> Result<Vec<Stay>, StayError> {
        let StayArena {
            records,
            diagnoses,
            procedures,
        } = self;

        records
            .into_iter()
            .enumerate()
            .map(|(index, record)| {
                let mut stay = record.stay;
                stay.other_diagnoses =
                    take_span(&diagnoses, record.other_diagnoses, index, "diagnosis")?.to_vec();
                stay.procedures =
                    take_span(&procedures, record.procedures, index, "procedure")?.to_vec();
                Ok(stay)
            })
            .collect()
    }
}

fn take_span<'a, T>(
    values: &'a [T],
    span: Span,
    index: usize,
    kind: &'static str,
) -> Result<&'a [T], StayError> {
    span.end()
        .and_then(|end| values.get(span.start..end))
        .ok_or(StayError::SpanOutOfBounds {
            index,
            kind,
            start: span.start,
            len: span.len,
            available: values.len(),
        })
}
