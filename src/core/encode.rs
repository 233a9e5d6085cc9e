//! Purpose: Encode an ordered batch of `ItemSpec`s into wire payloads.
//! Exports: `encode_items`, `encode_item`.
//! Role: First stage of submit; the correlator's positional contract depends on it.
//! Invariants: Output length and order equal input length and order; nothing is merged or skipped.
//! Invariants: Structural failures abort the whole batch with `ErrorKind::Encode`.
use serde::Serialize;
use serde_json::{Map, Value};

use super::error::{Error, ErrorKind};
use super::item::ItemSpec;

const OP_FIELD: &str = "op";

pub fn encode_items(items: &[ItemSpec]) -> Result<Vec<Value>, Error> {
    let mut payloads = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        let payload = encode_item(item).map_err(|err| err.with_index(index))?;
        payloads.push(payload);
    }
    Ok(payloads)
}

pub fn encode_item(item: &ItemSpec) -> Result<Value, Error> {
    let mut fields = match item {
        ItemSpec::CreateAsset(spec) => to_object(spec)?,
        ItemSpec::UpdateAssetTags(spec) => to_object(spec)?,
        ItemSpec::CreateKey(spec) => to_object(spec)?,
        ItemSpec::Other { op, fields } => {
            ensure_op_name(op)?;
            if fields.contains_key(OP_FIELD) {
                return Err(Error::new(ErrorKind::Encode)
                    .with_message("item fields must not contain the reserved \"op\" key"));
            }
            fields.clone()
        }
    };
    fields.insert(OP_FIELD.to_string(), Value::String(item.op().to_string()));
    Ok(Value::Object(fields))
}

fn to_object<T: Serialize>(spec: &T) -> Result<Map<String, Value>, Error> {
    let value = serde_json::to_value(spec).map_err(|err| {
        Error::new(ErrorKind::Encode)
            .with_message("failed to encode item")
            .with_source(err)
    })?;
    match value {
        Value::Object(fields) => Ok(fields),
        _ => Err(Error::new(ErrorKind::Encode).with_message("item did not encode to a JSON object")),
    }
}

fn ensure_op_name(op: &str) -> Result<(), Error> {
    let valid = !op.is_empty()
        && op
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_');
    if valid {
        Ok(())
    } else {
        Err(Error::new(ErrorKind::Encode)
            .with_message(format!("invalid op name {op:?}"))
            .with_hint("Op names use lowercase letters, digits, and underscores."))
    }
}
