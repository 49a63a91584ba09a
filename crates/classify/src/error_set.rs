//! Error accumulator shared by every step of one classification.

use serde::ser::SerializeSeq;
use serde::{Serialize, Serializer};

const ERROR_BITS: usize = 512;

/// Main error plus every error raised so far.
///
/// Errors raised with a priority of 0 or more are blocking and compete for
/// the main error slot: the highest priority wins, ties go to the smaller
/// code. Errors raised with a negative priority are warnings; they are only
/// recorded in the bitset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorSet {
    pub main_error: i16,
    pub priority: i16,
    bits: [u64; ERROR_BITS / 64],
}

impl Default for ErrorSet {
    fn default() -> Self {
        ErrorSet {
            main_error: 0,
            priority: 0,
            bits: [0; ERROR_BITS / 64],
        }
    }
}

impl ErrorSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        *self = ErrorSet::default();
    }

    /// Records `error` and returns `false`, so that checks can be written
    /// as `valid &= errors.set(..)`. Error 0 is a no-op returning `true`.
    pub fn set(&mut self, error: i16, priority: i16) -> bool {
        if error == 0 {
            return true;
        }
        let Some(bit) = usize::try_from(error).ok().filter(|&b| b < ERROR_BITS) else {
            tracing::warn!(error, "ignoring out of range error code");
            return false;
        };

        if priority >= 0
            && (self.main_error == 0
                || priority > self.priority
                || (priority == self.priority && error < self.main_error))
        {
            self.main_error = error;
            self.priority = priority;
        }
        self.bits[bit / 64] |= 1 << (bit % 64);

        false
    }

    /// Blocking error with the default priority.
    pub fn error(&mut self, error: i16) -> bool {
        self.set(error, 1)
    }

    /// Informational error, never becomes the main error.
    pub fn warn(&mut self, error: i16) -> bool {
        self.set(error, -1)
    }

    pub fn test(&self, error: i16) -> bool {
        usize::try_from(error)
            .ok()
            .filter(|&b| b < ERROR_BITS)
            .is_some_and(|bit| self.bits[bit / 64] & (1 << (bit % 64)) != 0)
    }

    /// Removes `error` from the bitset; the main error is reset when it
    /// was this one.
    pub fn remove(&mut self, error: i16) {
        if let Some(bit) = usize::try_from(error).ok().filter(|&b| b < ERROR_BITS) {
            self.bits[bit / 64] &= !(1 << (bit % 64));
        }
        if self.main_error == error {
            self.main_error = 0;
            self.priority = 0;
        }
    }

    /// Every recorded error, in increasing order.
    pub fn iter(&self) -> impl Iterator<Item = i16> + '_ {
        (0..ERROR_BITS)
            .filter(|&bit| self.bits[bit / 64] & (1 << (bit % 64)) != 0)
            .map(|bit| bit as i16)
    }

    pub fn is_empty(&self) -> bool {
        self.bits.iter().all(|&word| word == 0)
    }
}

impl Serialize for ErrorSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(None)?;
        for error in self.iter() {
            seq.serialize_element(&error)?;
        }
        seq.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ties_go_to_the_smaller_code() {
        let mut errors = ErrorSet::new();
        assert!(!errors.set(80, 2));
        errors.set(40, 2);
        assert_eq!(errors.main_error, 40);

        errors.set(12, 0);
        assert_eq!((errors.main_error, errors.priority), (40, 2));
        errors.set(130, 3);
        assert_eq!(errors.main_error, 130);
    }

    #[test]
    fn first_blocking_error_wins_even_at_priority_zero() {
        let mut errors = ErrorSet::new();
        errors.set(192, 0);
        assert_eq!(errors.main_error, 192);
        errors.set(150, 0);
        assert_eq!(errors.main_error, 150);
        errors.set(200, 0);
        assert_eq!(errors.main_error, 150);
    }

    #[test]
    fn warnings_are_recorded_but_never_main() {
        let mut errors = ErrorSet::new();
        errors.warn(62);
        assert_eq!(errors.main_error, 0);
        assert!(errors.test(62));
        assert!(errors.set(0, 1));
        assert_eq!(errors.iter().collect::<Vec<_>>(), vec![62]);
    }

    #[test]
    fn remove_resets_main_error() {
        let mut errors = ErrorSet::new();
        errors.error(80);
        errors.warn(222);
        errors.remove(80);
        errors.remove(222);
        assert_eq!((errors.main_error, errors.priority), (0, 0));
        assert!(errors.is_empty());
    }

    #[test]
    fn serializes_as_sorted_codes() {
        let mut errors = ErrorSet::new();
        errors.error(502);
        errors.warn(3);
        assert_eq!(serde_json::to_string(&errors).unwrap(), "[3,502]");
    }
}
