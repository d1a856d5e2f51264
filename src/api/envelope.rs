//! Reads the JSON envelopes the backend wraps its answers in.
//!
//! Scalar endpoints answer with `{"incomeexpense": {"Total income": [value]}}` whatever the figure
//! is, and the list endpoint with `{"incomeexpense": [record, ...]}`. Older backend versions nest
//! the list under `data` or send a bare array, so those shapes are accepted as well.

use crate::model::NULL_LITERAL;
use crate::summary::RawValue;
use crate::Result;
use anyhow::{bail, Context};
use serde_json::Value;

const ENVELOPE: &str = "incomeexpense";
const SCALAR_LABEL: &str = "Total income";
const DATA: &str = "data";

/// Extracts the single value of a scalar response. The literal string `"null"` and JSON `null`
/// both mean that the backend found no rows.
pub(crate) fn parse_scalar(body: &str) -> Result<RawValue> {
    let json: Value = serde_json::from_str(body).context("The response is not JSON")?;
    let inner = json
        .get(ENVELOPE)
        .and_then(Value::as_object)
        .with_context(|| format!("The response has no '{ENVELOPE}' object"))?;

    // The label is always "Total income" today, take any array if that ever changes
    let values = match inner.get(SCALAR_LABEL) {
        Some(values) => values,
        None => inner
            .values()
            .find(|v| v.is_array())
            .with_context(|| format!("The '{ENVELOPE}' object holds no values"))?,
    };

    let value = match values {
        Value::Array(items) => items.first(),
        other => Some(other),
    };

    Ok(match value {
        None | Some(Value::Null) => RawValue::Null,
        Some(Value::String(s)) if s.trim() == NULL_LITERAL => RawValue::Null,
        Some(Value::String(s)) => RawValue::Scalar(s.clone()),
        Some(Value::Number(n)) => RawValue::Scalar(n.to_string()),
        Some(other) => bail!("Unexpected scalar value {other}"),
    })
}

/// Extracts the records of a list response without interpreting them.
pub(crate) fn parse_list(body: &str) -> Result<Vec<Value>> {
    let json: Value = serde_json::from_str(body).context("The response is not JSON")?;
    let records = match json {
        Value::Array(records) => records,
        Value::Object(mut map) => match map.remove(ENVELOPE) {
            Some(Value::Array(records)) => records,
            Some(Value::Object(mut inner)) => match inner.remove(DATA) {
                Some(Value::Array(records)) => records,
                _ => bail!("The '{ENVELOPE}' object holds no '{DATA}' list"),
            },
            Some(Value::Null) => Vec::new(),
            Some(other) => bail!("Unexpected '{ENVELOPE}' value {other}"),
            None => bail!("The response has no '{ENVELOPE}' list"),
        },
        other => bail!("Unexpected list response {other}"),
    };
    Ok(records)
}

/// Whether a 409 body carries the backend's duplicate marker.
pub(crate) fn is_duplicate(body: &str) -> bool {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|json| json.get("duplicate").and_then(Value::as_bool))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_string() {
        let raw = parse_scalar(r#"{"incomeexpense":{"Total income":["1234.50"]}}"#).unwrap();
        assert_eq!(raw, RawValue::Scalar("1234.50".to_string()));
    }

    #[test]
    fn test_scalar_number() {
        let raw = parse_scalar(r#"{"incomeexpense":{"Total income":[-17.2]}}"#).unwrap();
        assert_eq!(raw, RawValue::Scalar("-17.2".to_string()));
    }

    #[test]
    fn test_scalar_null_literal_and_json_null() {
        let raw = parse_scalar(r#"{"incomeexpense":{"Total income":["null"]}}"#).unwrap();
        assert_eq!(raw, RawValue::Null);
        let raw = parse_scalar(r#"{"incomeexpense":{"Total income":[null]}}"#).unwrap();
        assert_eq!(raw, RawValue::Null);
        let raw = parse_scalar(r#"{"incomeexpense":{"Total income":[]}}"#).unwrap();
        assert_eq!(raw, RawValue::Null);
    }

    #[test]
    fn test_scalar_other_label() {
        let raw = parse_scalar(r#"{"incomeexpense":{"Total food":["3"]}}"#).unwrap();
        assert_eq!(raw, RawValue::Scalar("3".to_string()));
    }

    #[test]
    fn test_scalar_garbage() {
        assert!(parse_scalar("<html>502</html>").is_err());
        assert!(parse_scalar(r#"{"something":"else"}"#).is_err());
        assert!(parse_scalar(r#"{"incomeexpense":{"Total income":[{"a":1}]}}"#).is_err());
    }

    #[test]
    fn test_list_shapes() {
        let plain = parse_list(r#"{"incomeexpense":[{"id":1},{"id":2}]}"#).unwrap();
        assert_eq!(plain.len(), 2);
        let nested = parse_list(r#"{"incomeexpense":{"data":[{"id":1}]}}"#).unwrap();
        assert_eq!(nested.len(), 1);
        let bare = parse_list(r#"[{"id":1},{"id":2},{"id":3}]"#).unwrap();
        assert_eq!(bare.len(), 3);
        let empty = parse_list(r#"{"incomeexpense":null}"#).unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn test_list_garbage() {
        assert!(parse_list(r#"{"incomeexpense":"nope"}"#).is_err());
        assert!(parse_list("not json").is_err());
    }

    #[test]
    fn test_duplicate_marker() {
        assert!(is_duplicate(r#"{"duplicate": true}"#));
        assert!(!is_duplicate(r#"{"duplicate": false}"#));
        assert!(!is_duplicate("conflict"));
    }
}
