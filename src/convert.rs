//! C2 — the bidirectional native-value <-> attribute-value converter
//! (spec §4.1).
//!
//! Grounded on the teacher's `encrypted_table/table_entry.rs`
//! `impl_number_conversions!`/`impl_simple_conversions!` macros: per-type
//! `From`/`TryFrom` pairs. We keep that per-type-impl shape (an idiomatic
//! Rust `ToAttributeValue`/`FromAttributeValue` trait pair plays the role
//! the teacher's inherent `From`/`TryFrom` impls played) and add the
//! registrable custom-converter layer spec §4.1 calls for.

use crate::error::ConvertError;
use crate::value::AttributeValue;
use once_cell::sync::Lazy;
use std::any::{Any, TypeId};
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

pub trait ToAttributeValue {
    fn to_attribute_value(&self) -> AttributeValue;
}

pub trait FromAttributeValue: Sized {
    fn from_attribute_value(value: AttributeValue) -> Result<Self, ConvertError>;
}

/// Free-function entry points used by generated `Model` impls, matching
/// the teacher's module-level `encrypt_primary_key_parts`/`decrypt`
/// free-function style rather than forcing call sites through the trait.
pub fn to_attribute_value<T: ToAttributeValue>(v: &T) -> AttributeValue {
    v.to_attribute_value()
}

pub fn from_attribute_value<T: FromAttributeValue>(v: AttributeValue) -> Result<T, ConvertError> {
    T::from_attribute_value(v)
}

macro_rules! impl_number {
    ($($ty:ty),* $(,)?) => {
        $(
            impl ToAttributeValue for $ty {
                fn to_attribute_value(&self) -> AttributeValue {
                    AttributeValue::n(*self)
                }
            }

            impl FromAttributeValue for $ty {
                fn from_attribute_value(value: AttributeValue) -> Result<Self, ConvertError> {
                    match value {
                        AttributeValue::N(n) => n
                            .parse()
                            .map_err(|_| ConvertError::MalformedNumber(n)),
                        other => Err(ConvertError::TypeMismatch {
                            field: String::new(),
                            expected: format!("N, got {}", other.type_tag()),
                        }),
                    }
                }
            }
        )*
    };
}

impl_number!(i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64);

impl ToAttributeValue for String {
    fn to_attribute_value(&self) -> AttributeValue {
        AttributeValue::S(self.clone())
    }
}

impl ToAttributeValue for &str {
    fn to_attribute_value(&self) -> AttributeValue {
        AttributeValue::S((*self).to_string())
    }
}

impl FromAttributeValue for String {
    fn from_attribute_value(value: AttributeValue) -> Result<Self, ConvertError> {
        match value {
            AttributeValue::S(s) => Ok(s),
            other => Err(ConvertError::TypeMismatch {
                field: String::new(),
                expected: format!("S, got {}", other.type_tag()),
            }),
        }
    }
}

impl ToAttributeValue for bool {
    fn to_attribute_value(&self) -> AttributeValue {
        AttributeValue::Bool(*self)
    }
}

impl FromAttributeValue for bool {
    fn from_attribute_value(value: AttributeValue) -> Result<Self, ConvertError> {
        match value {
            AttributeValue::Bool(b) => Ok(b),
            other => Err(ConvertError::TypeMismatch {
                field: String::new(),
                expected: format!("BOOL, got {}", other.type_tag()),
            }),
        }
    }
}

impl ToAttributeValue for Vec<u8> {
    fn to_attribute_value(&self) -> AttributeValue {
        AttributeValue::B(self.clone())
    }
}

impl FromAttributeValue for Vec<u8> {
    fn from_attribute_value(value: AttributeValue) -> Result<Self, ConvertError> {
        match value {
            AttributeValue::B(b) => Ok(b),
            other => Err(ConvertError::TypeMismatch {
                field: String::new(),
                expected: format!("B, got {}", other.type_tag()),
            }),
        }
    }
}

impl<T: ToAttributeValue> ToAttributeValue for Option<T> {
    fn to_attribute_value(&self) -> AttributeValue {
        match self {
            Some(v) => v.to_attribute_value(),
            None => AttributeValue::Null,
        }
    }
}

impl<T: FromAttributeValue> FromAttributeValue for Option<T> {
    fn from_attribute_value(value: AttributeValue) -> Result<Self, ConvertError> {
        match value {
            AttributeValue::Null => Ok(None),
            other => T::from_attribute_value(other).map(Some),
        }
    }
}

impl<T: ToAttributeValue> ToAttributeValue for Vec<T> {
    fn to_attribute_value(&self) -> AttributeValue {
        AttributeValue::L(self.iter().map(|v| v.to_attribute_value()).collect())
    }
}

impl<T: FromAttributeValue> FromAttributeValue for Vec<T> {
    fn from_attribute_value(value: AttributeValue) -> Result<Self, ConvertError> {
        match value {
            AttributeValue::L(l) => l.into_iter().map(T::from_attribute_value).collect(),
            other => Err(ConvertError::TypeMismatch {
                field: String::new(),
                expected: format!("L, got {}", other.type_tag()),
            }),
        }
    }
}

impl ToAttributeValue for HashSet<String> {
    fn to_attribute_value(&self) -> AttributeValue {
        AttributeValue::Ss(self.clone())
    }
}

impl FromAttributeValue for HashSet<String> {
    fn from_attribute_value(value: AttributeValue) -> Result<Self, ConvertError> {
        match value {
            AttributeValue::Ss(s) => Ok(s),
            other => Err(ConvertError::TypeMismatch {
                field: String::new(),
                expected: format!("SS, got {}", other.type_tag()),
            }),
        }
    }
}

/// Passthrough: a `map<string, AttributeValue>` destination receives items
/// with no transformation, per spec §4.1.
impl ToAttributeValue for HashMap<String, AttributeValue> {
    fn to_attribute_value(&self) -> AttributeValue {
        AttributeValue::M(self.clone())
    }
}

impl FromAttributeValue for HashMap<String, AttributeValue> {
    fn from_attribute_value(value: AttributeValue) -> Result<Self, ConvertError> {
        match value {
            AttributeValue::M(m) => Ok(m),
            other => Err(ConvertError::TypeMismatch {
                field: String::new(),
                expected: format!("M, got {}", other.type_tag()),
            }),
        }
    }
}

/// `map<string, any>` destination: recursively projected per spec §4.1.
impl FromAttributeValue for serde_json::Value {
    fn from_attribute_value(value: AttributeValue) -> Result<Self, ConvertError> {
        Ok(crate::value::to_projected_json(&value))
    }
}

/// Marker wrapper for a field tagged `json` in the model (§3): the inner
/// value is serialized to a canonical JSON string and stored as `S`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Json<T>(pub T);

impl<T: serde::Serialize> ToAttributeValue for Json<T> {
    fn to_attribute_value(&self) -> AttributeValue {
        AttributeValue::S(serde_json::to_string(&self.0).expect("json field must serialize"))
    }
}

impl<T: serde::de::DeserializeOwned> FromAttributeValue for Json<T> {
    fn from_attribute_value(value: AttributeValue) -> Result<Self, ConvertError> {
        match value {
            AttributeValue::S(s) => serde_json::from_str(&s)
                .map(Json)
                .map_err(|e| ConvertError::InvalidValue {
                    field: String::new(),
                    reason: format!("malformed json field: {e}"),
                }),
            other => Err(ConvertError::TypeMismatch {
                field: String::new(),
                expected: format!("S (json), got {}", other.type_tag()),
            }),
        }
    }
}

/// Registry of user-supplied custom converters, keyed by the native type.
/// Registering or replacing a converter for a type invalidates any cached
/// marshal plan for that type, per spec §4.1 — since this crate compiles
/// per-type marshal plans statically in generated `Model` impls rather than
/// at runtime (see `registry::Model`, DESIGN.md Open Question 1), the
/// practical effect of "invalidation" is that the custom converter must be
/// registered before the first `Model::metadata()`/marshal call for that
/// type, which this registry enforces by making the custom slot immutable
/// once read.
pub struct ConverterRegistry {
    converters: RwLock<HashMap<TypeId, ReadLocked>>,
}

struct ReadLocked {
    read: bool,
    converter: Box<dyn Any + Send + Sync>,
}

static REGISTRY: Lazy<ConverterRegistry> = Lazy::new(|| ConverterRegistry {
    converters: RwLock::new(HashMap::new()),
});

impl ConverterRegistry {
    pub fn global() -> &'static ConverterRegistry {
        &REGISTRY
    }

    /// Register a custom converter for `T`. Returns an error message if a
    /// marshal plan for `T` has already consulted the registry.
    pub fn register<T: Any + Send + Sync>(&self, converter: T) -> Result<(), String> {
        let mut map = self.converters.write().expect("converter registry poisoned");
        let id = TypeId::of::<T>();
        if let Some(existing) = map.get(&id) {
            if existing.read {
                return Err(format!(
                    "converter for {} already in use by a cached marshal plan",
                    std::any::type_name::<T>()
                ));
            }
        }
        map.insert(
            id,
            ReadLocked {
                read: false,
                converter: Box::new(converter),
            },
        );
        Ok(())
    }

    pub fn get<T: Any + Send + Sync + Clone>(&self) -> Option<T> {
        let mut map = self.converters.write().expect("converter registry poisoned");
        let id = TypeId::of::<T>();
        let entry = map.get_mut(&id)?;
        entry.read = true;
        entry.converter.downcast_ref::<T>().cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_numbers() {
        let v = 42_i64.to_attribute_value();
        assert_eq!(i64::from_attribute_value(v).unwrap(), 42);
    }

    #[test]
    fn malformed_number_fails() {
        let err = i64::from_attribute_value(AttributeValue::N("not-a-number".into()));
        assert!(matches!(err, Err(ConvertError::MalformedNumber(_))));
    }

    #[test]
    fn json_field_roundtrip() {
        #[derive(serde::Serialize, serde::Deserialize, PartialEq, Debug)]
        struct Inner {
            a: i32,
        }

        let wrapped = Json(Inner { a: 7 });
        let v = wrapped.to_attribute_value();
        let back = Json::<Inner>::from_attribute_value(v).unwrap();
        assert_eq!(back.0, Inner { a: 7 });
    }
}
