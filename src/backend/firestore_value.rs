//! Firestore's typed-value JSON encoding.

use super::Fields;
use crate::error::BackendError;
use serde_json::{json, Map, Value};

pub fn encode(value: &Value) -> Value {
    match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(b) => json!({ "booleanValue": b }),
        Value::Number(n) if n.is_i64() || n.is_u64() => json!({ "integerValue": n.to_string() }),
        Value::Number(n) => json!({ "doubleValue": n }),
        Value::String(s) => json!({ "stringValue": s }),
        Value::Array(items) => {
            json!({ "arrayValue": { "values": items.iter().map(encode).collect::<Vec<_>>() } })
        }
        Value::Object(map) => json!({ "mapValue": { "fields": encode_fields(map) } }),
    }
}

pub fn encode_fields(fields: &Fields) -> Value {
    Value::Object(
        fields
            .iter()
            .map(|(k, v)| (k.clone(), encode(v)))
            .collect(),
    )
}

pub fn decode(value: &Value) -> Result<Value, BackendError> {
    let Some((kind, inner)) = value.as_object().and_then(|o| o.iter().next()) else {
        return Err(BackendError::new(format!("unexpected value encoding: {value}")));
    };

    let decoded = match kind.as_str() {
        "nullValue" => Value::Null,
        "booleanValue" | "doubleValue" | "stringValue" => inner.clone(),
        // Timestamps and references are surfaced as their string form.
        "timestampValue" | "referenceValue" => inner.clone(),
        "integerValue" => match inner {
            Value::String(s) => s
                .parse::<i64>()
                .map(Value::from)
                .map_err(|_| BackendError::new(format!("bad integerValue: {s}")))?,
            other => other.clone(),
        },
        "arrayValue" => Value::Array(
            inner
                .get("values")
                .and_then(Value::as_array)
                .map(|values| values.iter().map(decode).collect::<Result<Vec<_>, _>>())
                .transpose()?
                .unwrap_or_default(),
        ),
        "mapValue" => Value::Object(
            inner
                .get("fields")
                .map(decode_fields)
                .transpose()?
                .unwrap_or_default(),
        ),
        other => {
            return Err(BackendError::new(format!(
                "unsupported value type: {other}"
            )))
        }
    };
    Ok(decoded)
}

pub fn decode_fields(fields: &Value) -> Result<Fields, BackendError> {
    let Some(object) = fields.as_object() else {
        return Ok(Map::new());
    };
    object
        .iter()
        .map(|(k, v)| Ok((k.clone(), decode(v)?)))
        .collect()
}
