//! Purpose: Per-item outcome types, both as received on the wire and as correlated.
//! Exports: `RawOutcome`, `ItemOutcome`, `Outcome`.
//! Role: Shared vocabulary between transport, correlator, and result view.
//! Invariants: The wire discriminator is the `status` member (`ok` | `error`).
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::taxonomy::{Failure, map_failure};

/// One element of the ledger's batch response, before correlation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum RawOutcome {
    Ok {
        #[serde(default)]
        payload: Value,
    },
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
}

impl RawOutcome {
    pub fn ok(payload: Value) -> Self {
        RawOutcome::Ok { payload }
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        RawOutcome::Error {
            code: Some(code.into()),
            message: Some(message.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, RawOutcome::Error { .. })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ItemOutcome {
    Success(Value),
    Failure(Failure),
}

impl From<RawOutcome> for ItemOutcome {
    fn from(raw: RawOutcome) -> Self {
        match raw {
            RawOutcome::Ok { payload } => ItemOutcome::Success(payload),
            RawOutcome::Error { code, message } => {
                ItemOutcome::Failure(map_failure(code.as_deref(), message.as_deref()))
            }
        }
    }
}

/// Borrowed view of a single correlated outcome.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Outcome<'a> {
    Success(&'a Value),
    Failure(&'a Failure),
}

impl<'a> Outcome<'a> {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    pub fn payload(&self) -> Option<&'a Value> {
        match self {
            Outcome::Success(payload) => Some(payload),
            Outcome::Failure(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&'a Failure> {
        match self {
            Outcome::Success(_) => None,
            Outcome::Failure(failure) => Some(failure),
        }
    }
}
