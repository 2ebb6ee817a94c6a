//! C1 — the attribute-value tagged union (spec §3).
//!
//! Grounded on the teacher's `encrypted_table/table_entry.rs::TableAttribute`:
//! a tagged union with `From`/`TryFrom` conversions to and from the store's
//! wire type. We keep that shape but widen it to the full variant set named
//! in spec §3 (`NULL`, `SS`/`NS`/`BS` as genuine sets rather than plain
//! vecs) and make the wire conversion bit-exact with `aws_sdk_dynamodb`'s
//! `AttributeValue`, which remains the external wire boundary (§1).

use aws_sdk_dynamodb::primitives::Blob;
use aws_sdk_dynamodb::types::AttributeValue as WireValue;
use base64::{engine::general_purpose::STANDARD, Engine};
use std::collections::{HashMap, HashSet};

/// The library's own tagged union for a single DynamoDB-style cell value.
///
/// Ordering within `L` is preserved; ordering within `M` and the set
/// variants is unspecified (duplicates in a set are a user error).
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    S(String),
    /// Stored as a decimal string on the wire; see [`Self::n`] for a
    /// convenience constructor from any `Display`-able number.
    N(String),
    B(Vec<u8>),
    Bool(bool),
    Null,
    Ss(HashSet<String>),
    Ns(HashSet<String>),
    Bs(Vec<Vec<u8>>),
    L(Vec<AttributeValue>),
    M(HashMap<String, AttributeValue>),
}

impl AttributeValue {
    pub fn n(value: impl std::fmt::Display) -> Self {
        AttributeValue::N(value.to_string())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, AttributeValue::Null)
    }

    pub fn as_s(&self) -> Option<&str> {
        match self {
            AttributeValue::S(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_n(&self) -> Option<&str> {
        match self {
            AttributeValue::N(n) => Some(n.as_str()),
            _ => None,
        }
    }

    pub fn as_m(&self) -> Option<&HashMap<String, AttributeValue>> {
        match self {
            AttributeValue::M(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_l(&self) -> Option<&[AttributeValue]> {
        match self {
            AttributeValue::L(l) => Some(l),
            _ => None,
        }
    }

    /// Short name of the variant, used in error messages and type-checks
    /// in the expression builder (e.g. "ADD only supports N/SS/NS/BS").
    pub fn type_tag(&self) -> &'static str {
        match self {
            AttributeValue::S(_) => "S",
            AttributeValue::N(_) => "N",
            AttributeValue::B(_) => "B",
            AttributeValue::Bool(_) => "BOOL",
            AttributeValue::Null => "NULL",
            AttributeValue::Ss(_) => "SS",
            AttributeValue::Ns(_) => "NS",
            AttributeValue::Bs(_) => "BS",
            AttributeValue::L(_) => "L",
            AttributeValue::M(_) => "M",
        }
    }

    /// Canonical, key-ordering-independent serialization used for both the
    /// envelope plaintext payload (§4.6) and as the building block for
    /// cursor encoding (§4/§6's "canonical JSON"). Maps are always emitted
    /// with sorted keys so the form is independent of `HashMap` iteration
    /// order.
    pub fn to_canonical_json(&self) -> serde_json::Value {
        use serde_json::{json, Value};

        match self {
            AttributeValue::S(s) => json!({"t": "s", "v": s}),
            AttributeValue::N(n) => json!({"t": "n", "v": n}),
            AttributeValue::B(b) => json!({"t": "b", "v": STANDARD.encode(b)}),
            AttributeValue::Bool(b) => json!({"t": "bool", "v": b}),
            AttributeValue::Null => json!({"t": "null"}),
            AttributeValue::Ss(s) => {
                let mut v: Vec<&String> = s.iter().collect();
                v.sort();
                json!({"t": "ss", "v": v})
            }
            AttributeValue::Ns(s) => {
                let mut v: Vec<&String> = s.iter().collect();
                v.sort();
                json!({"t": "ns", "v": v})
            }
            AttributeValue::Bs(b) => {
                let mut v: Vec<String> = b.iter().map(|x| STANDARD.encode(x)).collect();
                v.sort();
                json!({"t": "bs", "v": v})
            }
            AttributeValue::L(l) => {
                let v: Vec<Value> = l.iter().map(Self::to_canonical_json).collect();
                json!({"t": "l", "v": v})
            }
            AttributeValue::M(m) => {
                let mut keys: Vec<&String> = m.keys().collect();
                keys.sort();
                let mut obj = serde_json::Map::new();
                for k in keys {
                    obj.insert(k.clone(), m[k].to_canonical_json());
                }
                json!({"t": "m", "v": Value::Object(obj)})
            }
        }
    }
}

impl From<AttributeValue> for WireValue {
    fn from(v: AttributeValue) -> Self {
        match v {
            AttributeValue::S(s) => WireValue::S(s),
            AttributeValue::N(n) => WireValue::N(n),
            AttributeValue::B(b) => WireValue::B(Blob::new(b)),
            AttributeValue::Bool(b) => WireValue::Bool(b),
            AttributeValue::Null => WireValue::Null(true),
            AttributeValue::Ss(s) => WireValue::Ss(s.into_iter().collect()),
            AttributeValue::Ns(n) => WireValue::Ns(n.into_iter().collect()),
            AttributeValue::Bs(b) => WireValue::Bs(b.into_iter().map(Blob::new).collect()),
            AttributeValue::L(l) => WireValue::L(l.into_iter().map(WireValue::from).collect()),
            AttributeValue::M(m) => {
                WireValue::M(m.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
        }
    }
}

impl From<WireValue> for AttributeValue {
    fn from(v: WireValue) -> Self {
        match v {
            WireValue::S(s) => AttributeValue::S(s),
            WireValue::N(n) => AttributeValue::N(n),
            WireValue::B(b) => AttributeValue::B(b.into_inner()),
            WireValue::Bool(b) => AttributeValue::Bool(b),
            WireValue::Null(_) => AttributeValue::Null,
            WireValue::Ss(s) => AttributeValue::Ss(s.into_iter().collect()),
            WireValue::Ns(n) => AttributeValue::Ns(n.into_iter().collect()),
            WireValue::Bs(b) => AttributeValue::Bs(b.into_iter().map(Blob::into_inner).collect()),
            WireValue::L(l) => AttributeValue::L(l.into_iter().map(AttributeValue::from).collect()),
            WireValue::M(m) => {
                AttributeValue::M(m.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
            // The wire enum is non_exhaustive; unknown variants have no
            // counterpart in our union and indicate a store/SDK mismatch.
            other => panic!("unsupported wire attribute value: {other:?}"),
        }
    }
}

/// Inverse of [`AttributeValue::to_canonical_json`], used to decode a
/// cursor's `lastKey` payload (spec §6) back into attribute values.
/// Returns `None` on any malformed or unrecognized node rather than
/// panicking, since callers only ever see this data after it has crossed
/// an untrusted boundary (a cursor handed back by a caller).
pub fn from_canonical_json(v: &serde_json::Value) -> Option<AttributeValue> {
    let obj = v.as_object()?;
    match obj.get("t")?.as_str()? {
        "s" => Some(AttributeValue::S(obj.get("v")?.as_str()?.to_string())),
        "n" => Some(AttributeValue::N(obj.get("v")?.as_str()?.to_string())),
        "b" => STANDARD.decode(obj.get("v")?.as_str()?).ok().map(AttributeValue::B),
        "bool" => Some(AttributeValue::Bool(obj.get("v")?.as_bool()?)),
        "null" => Some(AttributeValue::Null),
        "ss" => Some(AttributeValue::Ss(
            obj.get("v")?.as_array()?.iter().filter_map(|x| x.as_str().map(str::to_string)).collect(),
        )),
        "ns" => Some(AttributeValue::Ns(
            obj.get("v")?.as_array()?.iter().filter_map(|x| x.as_str().map(str::to_string)).collect(),
        )),
        "bs" => Some(AttributeValue::Bs(
            obj.get("v")?
                .as_array()?
                .iter()
                .filter_map(|x| x.as_str().and_then(|s| STANDARD.decode(s).ok()))
                .collect(),
        )),
        "l" => {
            let mut out = Vec::new();
            for item in obj.get("v")?.as_array()? {
                out.push(from_canonical_json(item)?);
            }
            Some(AttributeValue::L(out))
        }
        "m" => {
            let mut out = HashMap::new();
            for (k, val) in obj.get("v")?.as_object()? {
                out.insert(k.clone(), from_canonical_json(val)?);
            }
            Some(AttributeValue::M(out))
        }
        _ => None,
    }
}

/// Project an [`AttributeValue`] into a `map<string, any>` destination per
/// the rules in spec §4.1: `S -> string, N -> int64 then fallback float64,
/// BOOL -> bool, NULL -> nil, L -> list<any>, M -> map<string,any>,
/// SS -> list<string>, NS -> list<float64>, BS/B -> bytes`.
pub fn to_projected_json(v: &AttributeValue) -> serde_json::Value {
    use serde_json::{json, Value};

    match v {
        AttributeValue::S(s) => json!(s),
        AttributeValue::N(n) => parse_number_fallback(n),
        AttributeValue::B(b) => json!(b),
        AttributeValue::Bool(b) => json!(b),
        AttributeValue::Null => Value::Null,
        AttributeValue::Ss(s) => json!(s.iter().collect::<Vec<_>>()),
        AttributeValue::Ns(n) => {
            let nums: Vec<f64> = n.iter().filter_map(|x| x.parse().ok()).collect();
            json!(nums)
        }
        AttributeValue::Bs(b) => json!(b),
        AttributeValue::L(l) => json!(l.iter().map(to_projected_json).collect::<Vec<_>>()),
        AttributeValue::M(m) => {
            let mut obj = serde_json::Map::new();
            for (k, v) in m {
                obj.insert(k.clone(), to_projected_json(v));
            }
            Value::Object(obj)
        }
    }
}

/// Parse a decimal-string `N` value, preferring integer and falling back to
/// float, per spec §4.1. Malformed input fails upstream in
/// [`crate::convert::from_attribute_value`] for typed destinations; here
/// (an untyped `any` destination) we fall back to `Value::Null` rather than
/// panicking, since a projection has no error channel to report through.
fn parse_number_fallback(n: &str) -> serde_json::Value {
    if let Ok(i) = n.parse::<i64>() {
        serde_json::json!(i)
    } else if let Ok(f) = n.parse::<f64>() {
        serde_json::json!(f)
    } else {
        serde_json::Value::Null
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_roundtrip_scalars() {
        for v in [
            AttributeValue::S("hello".into()),
            AttributeValue::n(42),
            AttributeValue::B(vec![1, 2, 3]),
            AttributeValue::Bool(true),
            AttributeValue::Null,
        ] {
            let wire: WireValue = v.clone().into();
            let back: AttributeValue = wire.into();
            assert_eq!(v, back);
        }
    }

    #[test]
    fn wire_roundtrip_sets_modulo_order() {
        let v = AttributeValue::Ss(["a".to_string(), "b".to_string()].into_iter().collect());
        let wire: WireValue = v.clone().into();
        let back: AttributeValue = wire.into();
        assert_eq!(v, back);
    }

    #[test]
    fn canonical_json_is_key_order_independent() {
        let mut m1 = HashMap::new();
        m1.insert("a".to_string(), AttributeValue::n(1));
        m1.insert("b".to_string(), AttributeValue::n(2));
        let mut m2 = HashMap::new();
        m2.insert("b".to_string(), AttributeValue::n(2));
        m2.insert("a".to_string(), AttributeValue::n(1));
        assert_eq!(
            AttributeValue::M(m1).to_canonical_json(),
            AttributeValue::M(m2).to_canonical_json()
        );
    }

    #[test]
    fn canonical_json_roundtrips() {
        let mut m = HashMap::new();
        m.insert("pk".to_string(), AttributeValue::S("a".into()));
        m.insert("count".to_string(), AttributeValue::n(3));
        m.insert("tags".to_string(), AttributeValue::Ss(["x".to_string()].into_iter().collect()));
        let v = AttributeValue::M(m);
        let json = v.to_canonical_json();
        assert_eq!(from_canonical_json(&json), Some(v));
    }

    #[test]
    fn projected_json_number_fallback() {
        assert_eq!(to_projected_json(&AttributeValue::N("42".into())), serde_json::json!(42));
        assert_eq!(
            to_projected_json(&AttributeValue::N("4.5".into())),
            serde_json::json!(4.5)
        );
    }
}
