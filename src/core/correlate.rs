//! Purpose: Re-associate a batch response with original request positions.
//! Exports: `correlate`.
//! Role: Centerpiece of submit; partitions outcomes into successes and errors.
//! Invariants: A response whose length differs from the request never yields a result.
//! Invariants: The scan is total over `[0, expected)`; per-item failures never stop it.
use tracing::warn;

use super::error::{Error, ErrorKind};
use super::outcome::{ItemOutcome, RawOutcome};
use super::result::BatchResult;

pub fn correlate(expected: usize, raw: Vec<RawOutcome>) -> Result<BatchResult, Error> {
    if raw.len() != expected {
        warn!(expected, received = raw.len(), "batch response length mismatch");
        return Err(Error::new(ErrorKind::Protocol)
            .with_message(format!(
                "ledger returned {} outcomes for {expected} items",
                raw.len()
            ))
            .with_hint("The response cannot be matched to request positions; resubmit the batch."));
    }
    let outcomes = raw.into_iter().map(ItemOutcome::from).collect();
    Ok(BatchResult::from_ordered(outcomes))
}
