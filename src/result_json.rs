//! Purpose: Serialize a correlated `BatchResult` into the CLI's stdout envelope.
//! Exports: `batch_result_json`.
//! Role: Keep the `submit` output shape in one place.
//! Invariants: Keys of `successes`/`errors` are the original item positions as strings.
//! Invariants: Failure codes are emitted exactly as the ledger reported them.

use ledgerbatch::api::{BatchResult, Failure, FailureClass};
use serde_json::{Map, Value, json};

pub(crate) fn batch_result_json(result: &BatchResult) -> Value {
    let mut successes = Map::new();
    for (index, payload) in result.successes() {
        successes.insert(index.to_string(), payload.clone());
    }
    let mut errors = Map::new();
    for (index, failure) in result.errors() {
        errors.insert(index.to_string(), failure_json(failure));
    }
    json!({
        "total": result.len(),
        "succeeded": result.success_count(),
        "failed": result.error_count(),
        "successes": successes,
        "errors": errors,
    })
}

fn failure_json(failure: &Failure) -> Value {
    json!({
        "code": failure.code.as_str(),
        "class": failure_class_label(failure.code.class()),
        "message": failure.message,
    })
}

fn failure_class_label(class: FailureClass) -> &'static str {
    match class {
        FailureClass::MissingField => "missing_field",
        FailureClass::Conflict => "conflict",
        FailureClass::AmbiguousTarget => "ambiguous_target",
        FailureClass::NotFound => "not_found",
        FailureClass::Invalid => "invalid",
        FailureClass::Internal => "internal",
        FailureClass::Unknown => "unknown",
    }
}
