//! Purpose: Normalize raw per-item `(code, message)` pairs into structured failures.
//! Exports: `Failure`, `FailureCode`, `FailureClass`, `map_failure`.
//! Role: Stable dispatch surface for per-item ledger errors.
//! Invariants: Unknown codes pass through verbatim; mapping never fails.
//! Invariants: The code is the contract; message text is informational only.
use std::fmt;

const UNSPECIFIED_MESSAGE: &str = "unspecified ledger error";

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum FailureCode {
    Internal,
    NotFound,
    BadRequest,
    DuplicateAlias,
    AmbiguousTarget,
    InvalidQuorum,
    InvalidXpub,
    MissingRootXpubs,
    Other(String),
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum FailureClass {
    MissingField,
    Conflict,
    AmbiguousTarget,
    NotFound,
    Invalid,
    Internal,
    Unknown,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Failure {
    pub code: FailureCode,
    pub message: String,
}

impl FailureCode {
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "CH000" => FailureCode::Internal,
            "CH002" => FailureCode::NotFound,
            "CH003" => FailureCode::BadRequest,
            "CH050" => FailureCode::DuplicateAlias,
            "CH051" => FailureCode::AmbiguousTarget,
            "CH200" => FailureCode::InvalidQuorum,
            "CH201" => FailureCode::InvalidXpub,
            "CH202" => FailureCode::MissingRootXpubs,
            other => FailureCode::Other(other.to_string()),
        }
    }

    /// Wire form of the code, exactly as the ledger reports it.
    pub fn as_str(&self) -> &str {
        match self {
            FailureCode::Internal => "CH000",
            FailureCode::NotFound => "CH002",
            FailureCode::BadRequest => "CH003",
            FailureCode::DuplicateAlias => "CH050",
            FailureCode::AmbiguousTarget => "CH051",
            FailureCode::InvalidQuorum => "CH200",
            FailureCode::InvalidXpub => "CH201",
            FailureCode::MissingRootXpubs => "CH202",
            FailureCode::Other(code) => code,
        }
    }

    pub fn class(&self) -> FailureClass {
        match self {
            FailureCode::MissingRootXpubs => FailureClass::MissingField,
            FailureCode::DuplicateAlias => FailureClass::Conflict,
            FailureCode::AmbiguousTarget => FailureClass::AmbiguousTarget,
            FailureCode::NotFound => FailureClass::NotFound,
            FailureCode::BadRequest | FailureCode::InvalidQuorum | FailureCode::InvalidXpub => {
                FailureClass::Invalid
            }
            FailureCode::Internal => FailureClass::Internal,
            FailureCode::Other(_) => FailureClass::Unknown,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, FailureCode::Other(_))
    }
}

impl fmt::Display for FailureCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

pub fn map_failure(code: Option<&str>, message: Option<&str>) -> Failure {
    let code = FailureCode::parse(code.unwrap_or_default());
    let message = message
        .map(str::trim)
        .filter(|message| !message.is_empty())
        .unwrap_or(UNSPECIFIED_MESSAGE)
        .to_string();
    Failure { code, message }
}
