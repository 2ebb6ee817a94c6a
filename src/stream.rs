//! Stream record decoder (spec §6): maps a change-stream event's
//! attribute-value images into [`crate::value::AttributeValue`], then
//! runs the standard unmarshal path ([`crate::registry::Model::from_item`])
//! over the result.
//!
//! Grounded on the DynamoDB Streams event shape delivered to consumers
//! (e.g. the Lambda trigger payload): each attribute value arrives as a
//! single-key JSON object tagging its type (`{"S": "..."}`, `{"N": "5"}`,
//! `{"NULL": true}`, `{"SS": [...]}, {"M": {...}}`, ...), the same
//! variant set as [`crate::value::AttributeValue`] rather than the typed
//! Rust SDK struct the live table API uses.

use crate::error::ConvertError;
use crate::registry::Model;
use crate::value::AttributeValue;
use crate::wire::Item;
use base64::{engine::general_purpose::STANDARD, Engine};
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventName {
    Insert,
    Modify,
    Remove,
}

impl EventName {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "INSERT" => Some(EventName::Insert),
            "MODIFY" => Some(EventName::Modify),
            "REMOVE" => Some(EventName::Remove),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StreamRecord {
    pub event_name: EventName,
    pub old_image: Option<Item>,
    pub new_image: Option<Item>,
}

/// Decode one attribute value in the store's stream-event JSON shape,
/// e.g. `{"S": "hello"}` or `{"NULL": true}`.
fn decode_value(v: &Value) -> Result<AttributeValue, ConvertError> {
    let obj = v
        .as_object()
        .ok_or_else(|| ConvertError::InvalidValue {
            field: String::new(),
            reason: "stream attribute value must be a single-key object".to_string(),
        })?;
    let (tag, inner) = obj.iter().next().ok_or_else(|| ConvertError::InvalidValue {
        field: String::new(),
        reason: "stream attribute value object is empty".to_string(),
    })?;

    let bad = |reason: &str| ConvertError::InvalidValue { field: String::new(), reason: reason.to_string() };

    Ok(match tag.as_str() {
        "S" => AttributeValue::S(inner.as_str().ok_or_else(|| bad("S value must be a string"))?.to_string()),
        "N" => AttributeValue::N(inner.as_str().ok_or_else(|| bad("N value must be a string"))?.to_string()),
        "B" => {
            let s = inner.as_str().ok_or_else(|| bad("B value must be a base64 string"))?;
            AttributeValue::B(STANDARD.decode(s).map_err(|_| bad("B value is not valid base64"))?)
        }
        "BOOL" => AttributeValue::Bool(inner.as_bool().ok_or_else(|| bad("BOOL value must be a bool"))?),
        "NULL" => AttributeValue::Null,
        "SS" => AttributeValue::Ss(
            inner
                .as_array()
                .ok_or_else(|| bad("SS value must be an array"))?
                .iter()
                .map(|x| x.as_str().map(str::to_string).ok_or_else(|| bad("SS entries must be strings")))
                .collect::<Result<_, _>>()?,
        ),
        "NS" => AttributeValue::Ns(
            inner
                .as_array()
                .ok_or_else(|| bad("NS value must be an array"))?
                .iter()
                .map(|x| x.as_str().map(str::to_string).ok_or_else(|| bad("NS entries must be strings")))
                .collect::<Result<_, _>>()?,
        ),
        "BS" => AttributeValue::Bs(
            inner
                .as_array()
                .ok_or_else(|| bad("BS value must be an array"))?
                .iter()
                .map(|x| {
                    x.as_str()
                        .ok_or_else(|| bad("BS entries must be base64 strings"))
                        .and_then(|s| STANDARD.decode(s).map_err(|_| bad("BS entry is not valid base64")))
                })
                .collect::<Result<_, _>>()?,
        ),
        "L" => AttributeValue::L(
            inner
                .as_array()
                .ok_or_else(|| bad("L value must be an array"))?
                .iter()
                .map(decode_value)
                .collect::<Result<_, _>>()?,
        ),
        "M" => {
            let map = inner.as_object().ok_or_else(|| bad("M value must be an object"))?;
            let mut out = HashMap::new();
            for (k, v) in map {
                out.insert(k.clone(), decode_value(v)?);
            }
            AttributeValue::M(out)
        }
        other => return Err(bad(&format!("unsupported stream attribute type `{other}`"))),
    })
}

fn decode_image(v: &Value) -> Result<Item, ConvertError> {
    let obj = v.as_object().ok_or_else(|| ConvertError::InvalidValue {
        field: String::new(),
        reason: "stream image must be a JSON object".to_string(),
    })?;
    let mut item = HashMap::new();
    for (k, v) in obj {
        item.insert(k.clone(), decode_value(v)?);
    }
    Ok(item)
}

/// Parse one stream-trigger record, e.g. the shape delivered to a Lambda
/// consumer of the store's change stream:
/// `{"eventName": "MODIFY", "dynamodb": {"NewImage": {...}, "OldImage": {...}}}`.
pub fn decode_record(raw: &Value) -> Result<StreamRecord, ConvertError> {
    let event_name = raw
        .get("eventName")
        .and_then(Value::as_str)
        .and_then(EventName::parse)
        .ok_or_else(|| ConvertError::InvalidValue {
            field: "eventName".to_string(),
            reason: "missing or unrecognized stream event name".to_string(),
        })?;

    let dynamodb = raw.get("dynamodb").ok_or_else(|| ConvertError::InvalidValue {
        field: "dynamodb".to_string(),
        reason: "stream record is missing the `dynamodb` payload".to_string(),
    })?;

    let old_image = match dynamodb.get("OldImage") {
        Some(v) if !v.is_null() => Some(decode_image(v)?),
        _ => None,
    };
    let new_image = match dynamodb.get("NewImage") {
        Some(v) if !v.is_null() => Some(decode_image(v)?),
        _ => None,
    };

    Ok(StreamRecord { event_name, old_image, new_image })
}

/// Decode a stream image straight into a model, running the same
/// `Model::from_item` unmarshal path a GetItem/Query response would.
pub fn unmarshal_image<M: Model>(image: &Item) -> Result<M, ConvertError> {
    M::from_item(image.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_insert_record_with_new_image() {
        let raw = serde_json::json!({
            "eventName": "INSERT",
            "dynamodb": {
                "NewImage": {
                    "pk": {"S": "widget#1"},
                    "count": {"N": "3"},
                    "tags": {"SS": ["a", "b"]},
                    "deleted": {"NULL": true},
                },
            },
        });

        let record = decode_record(&raw).unwrap();
        assert_eq!(record.event_name, EventName::Insert);
        assert!(record.old_image.is_none());
        let new_image = record.new_image.unwrap();
        assert_eq!(new_image.get("pk"), Some(&AttributeValue::S("widget#1".into())));
        assert_eq!(new_image.get("count"), Some(&AttributeValue::N("3".into())));
        assert_eq!(new_image.get("deleted"), Some(&AttributeValue::Null));
    }

    #[test]
    fn rejects_unknown_event_name() {
        let raw = serde_json::json!({"eventName": "BOGUS", "dynamodb": {}});
        let err = decode_record(&raw).unwrap_err();
        assert!(matches!(err, ConvertError::InvalidValue { .. }));
    }
}
