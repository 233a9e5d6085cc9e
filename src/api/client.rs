//! Purpose: Caller-facing batch client over a pluggable transport.
//! Exports: `Transport`, `BatchClient`, `ApiResult`.
//! Role: Runs encode -> transport -> correlate for each submit call.
//! Invariants: Per-item failures stay inside `BatchResult`; only aggregate failures return `Err`.
//! Invariants: The client holds no per-call state and is safe to share across threads.
#![allow(clippy::result_large_err)]

use crate::core::correlate::correlate;
use crate::core::encode::encode_items;
use crate::core::error::{Error, ErrorKind};
use crate::core::item::ItemSpec;
use crate::core::outcome::{Outcome, RawOutcome};
use crate::core::result::BatchResult;
use serde_json::Value;
use tracing::{debug, info};

pub type ApiResult<T> = Result<T, Error>;

/// Sends one encoded batch and returns one raw outcome per payload, in order.
///
/// Implementations must not reorder, merge, or drop outcomes. A length
/// mismatch is detected by the correlator and fails the whole call.
pub trait Transport {
    fn submit_batch(&self, payloads: &[Value]) -> ApiResult<Vec<RawOutcome>>;
}

impl<F> Transport for F
where
    F: Fn(&[Value]) -> ApiResult<Vec<RawOutcome>>,
{
    fn submit_batch(&self, payloads: &[Value]) -> ApiResult<Vec<RawOutcome>> {
        self(payloads)
    }
}

#[derive(Clone, Debug)]
pub struct BatchClient<T> {
    transport: T,
}

impl<T: Transport> BatchClient<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn submit(&self, items: &[ItemSpec]) -> ApiResult<BatchResult> {
        let payloads = encode_items(items)?;
        if payloads.is_empty() {
            return correlate(0, Vec::new());
        }
        debug!(items = payloads.len(), "submitting batch");
        let raw = self.transport.submit_batch(&payloads)?;
        let result = correlate(payloads.len(), raw)?;
        info!(
            items = result.len(),
            successes = result.success_count(),
            errors = result.error_count(),
            "batch correlated"
        );
        Ok(result)
    }

    /// Submit a single item; a per-item failure becomes a `Rejected` error.
    pub fn submit_one(&self, item: ItemSpec) -> ApiResult<Value> {
        let op = item.op().to_string();
        let result = self.submit(std::slice::from_ref(&item))?;
        match result.get(0)? {
            Outcome::Success(payload) => Ok(payload.clone()),
            Outcome::Failure(failure) => Err(Error::new(ErrorKind::Rejected)
                .with_message(format!("{op} rejected by ledger: {}", failure.message))
                .with_index(0)
                .with_failure(failure.clone())),
        }
    }
}
