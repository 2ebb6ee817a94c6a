//! YAML data-model loader (spec §6): an alternative to `#[derive(Model)]`
//! for callers who declare their schema as data rather than as a Rust
//! struct. Grounded on the teacher derive crate's `settings::Settings`
//! parsing shape (struct/field attributes folded into one validated
//! settings value) — here the same fold happens over a parsed YAML
//! document instead of over `syn` attribute tokens, landing in the same
//! [`super::ModelMetadata::build`] validator either way.
//!
//! Document shape: `dms_version: "0.1"`, `models[]` each with `name`,
//! `table: { name }`, `keys: { partition: { attribute, type }, sort? }`,
//! and `attributes[]` each with `attribute`, `type`, optional `required`,
//! `optional`, `omit_empty`, `json`, `binary`, `roles[]`,
//! `encryption: { v: N }`, plus an optional `indexes[]`.

use super::{AttrType, FieldMeta, IndexKind, IndexMeta, ModelMetadata, Projection};
use crate::error::SchemaError;
use once_cell::sync::Lazy;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::RwLock;

const SUPPORTED_VERSION: &str = "0.1";

#[derive(Debug, Deserialize)]
struct Document {
    dms_version: String,
    models: Vec<RawModel>,
}

#[derive(Debug, Deserialize)]
struct RawTable {
    name: String,
}

#[derive(Debug, Deserialize)]
struct RawKeyAttribute {
    attribute: String,
    #[serde(rename = "type")]
    attr_type: String,
}

#[derive(Debug, Deserialize)]
struct RawKeys {
    partition: RawKeyAttribute,
    #[serde(default)]
    sort: Option<RawKeyAttribute>,
}

#[derive(Debug, Deserialize)]
struct RawEncryption {
    v: u8,
}

#[derive(Debug, Deserialize)]
struct RawAttribute {
    attribute: String,
    #[serde(rename = "type")]
    attr_type: String,
    #[serde(default)]
    omit_empty: bool,
    #[serde(default)]
    json: bool,
    #[serde(default)]
    binary: bool,
    #[serde(default)]
    roles: Vec<String>,
    #[serde(default)]
    encryption: Option<RawEncryption>,
}

#[derive(Debug, Deserialize)]
struct RawIndex {
    name: String,
    kind: String,
    pk: String,
    #[serde(default)]
    sk: Option<String>,
    #[serde(default = "default_projection")]
    projection: String,
    #[serde(default)]
    include: Vec<String>,
}

fn default_projection() -> String {
    "all".to_string()
}

#[derive(Debug, Deserialize)]
struct RawModel {
    name: String,
    table: RawTable,
    keys: RawKeys,
    attributes: Vec<RawAttribute>,
    #[serde(default)]
    indexes: Vec<RawIndex>,
}

/// Process-wide registry of models loaded from YAML, keyed by model name.
/// Populated by [`load_str`]; consulted by [`get`] at call sites that want
/// to operate against a named model without a generated Rust type.
static YAML_MODELS: Lazy<RwLock<HashMap<String, &'static ModelMetadata>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Parse a YAML data-model document and register every model it declares.
/// Each declared model is validated the same way a derived one would be
/// (spec §3 invariants); the first error aborts the whole document load so
/// callers never end up with a partially-registered document. Rejects
/// non-JSON-compatible YAML (timestamps, non-string map keys, non-finite
/// numbers) by refusing to round-trip the document through `serde_json`.
pub fn load_str(yaml: &str) -> Result<Vec<&'static ModelMetadata>, SchemaError> {
    let as_json_value: serde_yaml::Value =
        serde_yaml::from_str(yaml).map_err(|e| SchemaError::InvalidDocument(e.to_string()))?;
    serde_json::to_value(&as_json_value).map_err(|e| {
        SchemaError::InvalidDocument(format!("document is not JSON-compatible: {e}"))
    })?;

    let doc: Document =
        serde_yaml::from_str(yaml).map_err(|e| SchemaError::InvalidDocument(e.to_string()))?;

    if doc.dms_version != SUPPORTED_VERSION {
        return Err(SchemaError::InvalidDocument(format!(
            "unsupported dms_version `{}`, expected `{SUPPORTED_VERSION}`",
            doc.dms_version
        )));
    }

    let mut loaded = Vec::with_capacity(doc.models.len());
    for raw in doc.models {
        let meta = build_one(raw)?;
        let leaked: &'static ModelMetadata = Box::leak(Box::new(meta));
        let mut registry = YAML_MODELS.write().expect("yaml model registry poisoned");
        registry.insert(leaked.type_name.clone(), leaked);
        loaded.push(leaked);
    }
    Ok(loaded)
}

fn build_one(raw: RawModel) -> Result<ModelMetadata, SchemaError> {
    let model_name = raw.name.clone();
    let pk_attr = raw.keys.partition.attribute.clone();
    let sk_attr = raw.keys.sort.as_ref().map(|k| k.attribute.clone());

    let fields = raw
        .attributes
        .into_iter()
        .map(|a| {
            let attr_type = AttrType::parse(&a.attr_type).ok_or_else(|| {
                SchemaError::InvalidDocument(format!(
                    "model `{model_name}` attribute `{}` has unknown type `{}`",
                    a.attribute, a.attr_type
                ))
            })?;

            let roles: std::collections::HashSet<&str> =
                a.roles.iter().map(String::as_str).collect();

            Ok(FieldMeta {
                is_pk: a.attribute == pk_attr,
                is_sk: sk_attr.as_deref() == Some(a.attribute.as_str()),
                is_version: roles.contains("version"),
                is_created_at: roles.contains("created_at"),
                is_updated_at: roles.contains("updated_at"),
                is_ttl: roles.contains("ttl"),
                is_encrypted: a.encryption.is_some(),
                omit_empty: a.omit_empty,
                json: a.json,
                binary: a.binary,
                db_name: a.attribute.clone(),
                name: a.attribute,
                attr_type,
            })
        })
        .collect::<Result<Vec<_>, SchemaError>>()?;

    let indexes = raw
        .indexes
        .into_iter()
        .map(|i| {
            let kind = match i.kind.as_str() {
                "gsi" | "GSI" => IndexKind::Gsi,
                "lsi" | "LSI" => IndexKind::Lsi,
                other => {
                    return Err(SchemaError::InvalidDocument(format!(
                        "model `{model_name}` index `{}` has unknown kind `{other}`",
                        i.name
                    )))
                }
            };
            let projection = match i.projection.as_str() {
                "all" => Projection::All,
                "keys_only" => Projection::KeysOnly,
                "include" => Projection::Include(i.include),
                other => {
                    return Err(SchemaError::InvalidDocument(format!(
                        "model `{model_name}` index `{}` has unknown projection `{other}`",
                        i.name
                    )))
                }
            };
            Ok(IndexMeta { name: i.name, kind, pk: i.pk, sk: i.sk, projection })
        })
        .collect::<Result<Vec<_>, SchemaError>>()?;

    ModelMetadata::build(raw.name, raw.table.name, fields, indexes)
}

/// Look up a model previously registered via [`load_str`] by name.
pub fn get(model_name: &str) -> Option<&'static ModelMetadata> {
    YAML_MODELS
        .read()
        .expect("yaml model registry poisoned")
        .get(model_name)
        .copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"
dms_version: "0.1"
models:
  - name: User
    table:
      name: users
    keys:
      partition: { attribute: pk, type: S }
      sort: { attribute: sk, type: S }
    attributes:
      - attribute: pk
        type: S
      - attribute: sk
        type: S
      - attribute: email
        type: S
        encryption: { v: 1 }
      - attribute: version
        type: N
        roles: [version]
    indexes:
      - name: byEmail
        kind: gsi
        pk: email
        projection: all
"#;

    #[test]
    fn loads_and_registers_model() {
        let loaded = load_str(DOC).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].pk, "pk");
        assert_eq!(loaded[0].sk.as_deref(), Some("sk"));
        assert!(loaded[0].has_encrypted_fields);
        assert!(loaded[0].version_field.is_some());

        let looked_up = get("User").unwrap();
        assert_eq!(looked_up.table_name, "users");
    }

    #[test]
    fn rejects_unsupported_version() {
        let bad = DOC.replace("0.1", "9.9");
        let err = load_str(&bad).unwrap_err();
        assert!(matches!(err, SchemaError::InvalidDocument(_)));
    }

    #[test]
    fn rejects_unknown_attribute_type() {
        let bad = DOC.replace("attribute: email\n        type: S", "attribute: email\n        type: WAT");
        let err = load_str(&bad).unwrap_err();
        assert!(matches!(err, SchemaError::InvalidDocument(_)));
    }
}
