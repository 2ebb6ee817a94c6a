//! C10 — the pagination cursor codec (spec §6).
//!
//! A cursor is the base64url (no padding) encoding of a canonical JSON
//! document `{"lastKey": {...}, "index": "...", "sort": "ASC"|"DESC"}`,
//! where `lastKey` uses the same tagged-JSON shape as
//! [`crate::value::AttributeValue::to_canonical_json`] so cursor encoding
//! reuses the exact serialization already used for envelope plaintext
//! (spec §4.6), rather than inventing a second JSON mapping for attribute
//! values.
//!
//! Grounded on the teacher's own pagination story: `QueryBuilder::send`
//! hands back DynamoDB's raw `LastEvaluatedKey` for the caller to pass
//! straight back in as `ExclusiveStartKey`. This codec adds the opacity
//! and index/sort binding spec §6 asks for on top of that same
//! `Item`-shaped cursor payload.

use crate::error::{CursorError, ExprError};
use crate::value::{from_canonical_json, AttributeValue};
use crate::wire::Item;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sort {
    Asc,
    Desc,
}

impl Sort {
    fn as_str(self) -> &'static str {
        match self {
            Sort::Asc => "ASC",
            Sort::Desc => "DESC",
        }
    }

    fn from_scan_index_forward(forward: Option<bool>) -> Self {
        match forward {
            Some(false) => Sort::Desc,
            _ => Sort::Asc,
        }
    }
}

/// Encode a page's `last_evaluated_key` into an opaque cursor string bound
/// to the query's index and sort direction.
pub fn encode(last_key: &Item, index_name: Option<&str>, scan_index_forward: Option<bool>) -> String {
    let sort = Sort::from_scan_index_forward(scan_index_forward);
    let mut key_obj = serde_json::Map::new();
    for (k, v) in last_key {
        key_obj.insert(k.clone(), v.to_canonical_json());
    }
    let doc = serde_json::json!({
        "lastKey": serde_json::Value::Object(key_obj),
        "index": index_name,
        "sort": sort.as_str(),
    });
    URL_SAFE_NO_PAD.encode(serde_json::to_vec(&doc).expect("cursor document must serialize"))
}

/// Decode a cursor, rejecting it if it was issued for a different index
/// or sort direction than the query currently being made (spec §6: a
/// cursor only replays the exact query it was produced by).
pub fn decode(
    cursor: &str,
    index_name: Option<&str>,
    scan_index_forward: Option<bool>,
) -> Result<Item, CursorError> {
    let bytes = URL_SAFE_NO_PAD.decode(cursor).map_err(|_| CursorError::InvalidEncoding)?;
    let doc: serde_json::Value = serde_json::from_slice(&bytes).map_err(|_| CursorError::InvalidJson)?;
    let obj = doc.as_object().ok_or(CursorError::InvalidJson)?;

    let cursor_index = obj.get("index").and_then(|v| v.as_str());
    if cursor_index != index_name {
        return Err(CursorError::Mismatch(ExprError::CursorMismatch(format!(
            "cursor was issued for index {cursor_index:?}, query uses {index_name:?}"
        ))));
    }

    let expected_sort = Sort::from_scan_index_forward(scan_index_forward);
    let cursor_sort = obj.get("sort").and_then(|v| v.as_str());
    if cursor_sort != Some(expected_sort.as_str()) {
        return Err(CursorError::Mismatch(ExprError::CursorMismatch(format!(
            "cursor was issued for sort {cursor_sort:?}, query uses {:?}",
            expected_sort.as_str()
        ))));
    }

    let key_obj = obj
        .get("lastKey")
        .and_then(|v| v.as_object())
        .ok_or(CursorError::InvalidJson)?;

    let mut item: HashMap<String, AttributeValue> = HashMap::new();
    for (k, v) in key_obj {
        item.insert(k.clone(), from_canonical_json(v).ok_or(CursorError::InvalidJson)?);
    }
    Ok(item)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_key() -> Item {
        let mut m = HashMap::new();
        m.insert("pk".to_string(), AttributeValue::S("p".into()));
        m.insert("sk".to_string(), AttributeValue::n(42));
        m
    }

    #[test]
    fn roundtrips_same_index_and_sort() {
        let key = sample_key();
        let cursor = encode(&key, Some("byOwner"), Some(true));
        let decoded = decode(&cursor, Some("byOwner"), Some(true)).unwrap();
        assert_eq!(decoded, key);
    }

    #[test]
    fn rejects_index_mismatch() {
        let cursor = encode(&sample_key(), Some("byOwner"), Some(true));
        let err = decode(&cursor, Some("byOther"), Some(true)).unwrap_err();
        assert!(matches!(err, CursorError::Mismatch(ExprError::CursorMismatch(_))));
    }

    #[test]
    fn rejects_sort_mismatch() {
        let cursor = encode(&sample_key(), None, Some(true));
        let err = decode(&cursor, None, Some(false)).unwrap_err();
        assert!(matches!(err, CursorError::Mismatch(ExprError::CursorMismatch(_))));
    }

    #[test]
    fn rejects_garbage_input() {
        let err = decode("not valid base64url!!", None, None).unwrap_err();
        assert!(matches!(err, CursorError::InvalidEncoding));
    }
}
