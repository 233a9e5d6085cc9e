//! Purpose: Aggregate (whole-call) error type for batch submission.
//! Exports: `Error`, `ErrorKind`, `to_exit_code`.
//! Role: Single error surface for encode, transport, and protocol failures.
//! Invariants: Per-item business failures never travel through this type inside `submit`.
//! Invariants: Exit code mapping is stable once published.
use std::error::Error as StdError;
use std::fmt;

use super::taxonomy::Failure;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    Internal,
    Usage,
    Encode,
    Protocol,
    Transport,
    Rejected,
    Permission,
    OutOfRange,
    NotFound,
}

#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    message: Option<String>,
    hint: Option<String>,
    index: Option<usize>,
    failure: Option<Failure>,
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            hint: None,
            index: None,
            failure: None,
            source: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn hint(&self) -> Option<&str> {
        self.hint.as_deref()
    }

    /// Position of the item that caused the error, when one item is to blame.
    pub fn index(&self) -> Option<usize> {
        self.index
    }

    /// Service-reported failure behind a `Rejected` error.
    pub fn failure(&self) -> Option<&Failure> {
        self.failure.as_ref()
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn with_index(mut self, index: usize) -> Self {
        self.index = Some(index);
        self
    }

    pub fn with_failure(mut self, failure: Failure) -> Self {
        self.failure = Some(failure);
        self
    }

    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind)?;
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        if let Some(index) = self.index {
            write!(f, " (index: {index})")?;
        }
        if let Some(failure) = &self.failure {
            write!(f, " (code: {})", failure.code)?;
        }
        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|source| source.as_ref() as &(dyn StdError + 'static))
    }
}

pub fn to_exit_code(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::Internal => 1,
        ErrorKind::Usage => 2,
        ErrorKind::Encode => 3,
        ErrorKind::Protocol => 4,
        ErrorKind::Transport => 5,
        ErrorKind::Rejected => 6,
        ErrorKind::Permission => 7,
        ErrorKind::OutOfRange => 8,
        ErrorKind::NotFound => 9,
    }
}
