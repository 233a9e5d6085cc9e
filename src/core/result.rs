//! Purpose: Immutable, position-keyed view over a correlated batch.
//! Exports: `BatchResult`.
//! Role: The value handed back to callers of `submit`.
//! Invariants: Every index in `[0, len)` is in exactly one of successes/errors.
//! Invariants: Keys are original request positions; nothing is ever renumbered.
use std::collections::BTreeMap;

use serde_json::Value;

use super::error::{Error, ErrorKind};
use super::outcome::{ItemOutcome, Outcome};
use super::taxonomy::Failure;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct BatchResult {
    len: usize,
    successes: BTreeMap<usize, Value>,
    errors: BTreeMap<usize, Failure>,
}

impl BatchResult {
    /// Build from outcomes already in request order; position `i` becomes key `i`.
    pub(crate) fn from_ordered(outcomes: Vec<ItemOutcome>) -> Self {
        let len = outcomes.len();
        let mut successes = BTreeMap::new();
        let mut errors = BTreeMap::new();
        for (index, outcome) in outcomes.into_iter().enumerate() {
            match outcome {
                ItemOutcome::Success(payload) => {
                    successes.insert(index, payload);
                }
                ItemOutcome::Failure(failure) => {
                    errors.insert(index, failure);
                }
            }
        }
        Self {
            len,
            successes,
            errors,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn successes(&self) -> &BTreeMap<usize, Value> {
        &self.successes
    }

    pub fn errors(&self) -> &BTreeMap<usize, Failure> {
        &self.errors
    }

    pub fn success_count(&self) -> usize {
        self.successes.len()
    }

    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    pub fn is_full_success(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn get(&self, index: usize) -> Result<Outcome<'_>, Error> {
        if index >= self.len {
            return Err(Error::new(ErrorKind::OutOfRange)
                .with_message(format!("index {index} outside batch of {} items", self.len))
                .with_index(index));
        }
        if let Some(payload) = self.successes.get(&index) {
            return Ok(Outcome::Success(payload));
        }
        match self.errors.get(&index) {
            Some(failure) => Ok(Outcome::Failure(failure)),
            None => Err(Error::new(ErrorKind::Internal)
                .with_message("batch result partition is missing an index")
                .with_index(index)),
        }
    }

    pub fn payload(&self, index: usize) -> Option<&Value> {
        self.successes.get(&index)
    }

    pub fn failure(&self, index: usize) -> Option<&Failure> {
        self.errors.get(&index)
    }

    /// Outcomes in request order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, Outcome<'_>)> + '_ {
        (0..self.len).filter_map(move |index| self.get(index).ok().map(|outcome| (index, outcome)))
    }
}
