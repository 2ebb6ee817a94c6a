//! C3 — the schema/model registry (spec §4.2).
//!
//! Grounded on the teacher's `traits/mod.rs` (`Identifiable`/`Encryptable`/
//! `Searchable`/`Decryptable` — one trait per capability, implemented by
//! `#[derive(...)]`) and its derive crate's `settings::Settings` (struct +
//! field attribute parsing feeding a single validated settings value). Here
//! those four capability traits collapse into one `Model` trait, because
//! TableTheory's registry is schema-first rather than encryption-first: a
//! model's role fields and indexes are one fact, not four independently
//! derivable ones.

pub mod yaml;

use crate::error::SchemaError;
use crate::value::AttributeValue;
use std::collections::HashMap;

/// Scalar/aggregate type descriptor for a field, independent of the Rust
/// type used to hold it — this is what §3 calls the field's `type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrType {
    S,
    N,
    B,
    Bool,
    Null,
    Ss,
    Ns,
    Bs,
    L,
    M,
}

impl AttrType {
    pub fn is_scalar(self) -> bool {
        matches!(self, AttrType::S | AttrType::N | AttrType::B)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AttrType::S => "S",
            AttrType::N => "N",
            AttrType::B => "B",
            AttrType::Bool => "BOOL",
            AttrType::Null => "NULL",
            AttrType::Ss => "SS",
            AttrType::Ns => "NS",
            AttrType::Bs => "BS",
            AttrType::L => "L",
            AttrType::M => "M",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "S" => AttrType::S,
            "N" => AttrType::N,
            "B" => AttrType::B,
            "BOOL" => AttrType::Bool,
            "NULL" => AttrType::Null,
            "SS" => AttrType::Ss,
            "NS" => AttrType::Ns,
            "BS" => AttrType::Bs,
            "L" => AttrType::L,
            "M" => AttrType::M,
            _ => return None,
        })
    }
}

/// Per-attribute metadata (§3 "Field metadata").
#[derive(Debug, Clone)]
pub struct FieldMeta {
    pub name: String,
    pub db_name: String,
    pub attr_type: AttrType,
    pub is_pk: bool,
    pub is_sk: bool,
    pub is_version: bool,
    pub is_created_at: bool,
    pub is_updated_at: bool,
    pub is_ttl: bool,
    pub is_encrypted: bool,
    pub omit_empty: bool,
    pub json: bool,
    pub binary: bool,
}

impl FieldMeta {
    pub fn scalar(name: impl Into<String>, attr_type: AttrType) -> Self {
        let name = name.into();
        Self {
            db_name: name.clone(),
            name,
            attr_type,
            is_pk: false,
            is_sk: false,
            is_version: false,
            is_created_at: false,
            is_updated_at: false,
            is_ttl: false,
            is_encrypted: false,
            omit_empty: false,
            json: false,
            binary: false,
        }
    }

    pub fn is_role_field(&self) -> bool {
        self.is_pk
            || self.is_sk
            || self.is_version
            || self.is_created_at
            || self.is_updated_at
            || self.is_ttl
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    Gsi,
    Lsi,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Projection {
    All,
    KeysOnly,
    Include(Vec<String>),
}

#[derive(Debug, Clone)]
pub struct IndexMeta {
    pub name: String,
    pub kind: IndexKind,
    pub pk: String,
    pub sk: Option<String>,
    pub projection: Projection,
}

/// Type-erased schema for one model (§3 "Model metadata"). Shared by the
/// derive path (one `ModelMetadata` per Rust type, built once behind a
/// `Lazy`) and the YAML path (one per declared document model, held in the
/// process-wide name-keyed registry in [`yaml`]).
#[derive(Debug, Clone)]
pub struct ModelMetadata {
    pub type_name: String,
    pub table_name: String,
    pub pk: String,
    pub sk: Option<String>,
    pub indexes: Vec<IndexMeta>,
    pub fields: Vec<FieldMeta>,
    pub fields_by_name: HashMap<String, usize>,
    pub fields_by_db_name: HashMap<String, usize>,
    pub version_field: Option<usize>,
    pub created_at_field: Option<usize>,
    pub updated_at_field: Option<usize>,
    pub ttl_field: Option<usize>,
    pub has_encrypted_fields: bool,
}

impl ModelMetadata {
    /// Build and validate a model's metadata from its declared pieces, per
    /// the invariants in spec §3. Used by both the derive-macro-generated
    /// `Lazy` statics and the YAML loader.
    pub fn build(
        type_name: impl Into<String>,
        table_name: impl Into<String>,
        fields: Vec<FieldMeta>,
        indexes: Vec<IndexMeta>,
    ) -> Result<Self, SchemaError> {
        let type_name = type_name.into();
        let table_name = table_name.into();

        let mut fields_by_name = HashMap::new();
        let mut fields_by_db_name = HashMap::new();
        let mut pk = None;
        let mut sk = None;
        let mut version_field = None;
        let mut created_at_field = None;
        let mut updated_at_field = None;
        let mut ttl_field = None;
        let mut has_encrypted_fields = false;

        for (idx, field) in fields.iter().enumerate() {
            if fields_by_name.insert(field.name.clone(), idx).is_some() {
                return Err(SchemaError::DuplicateAttribute {
                    model: type_name.clone(),
                    field: field.name.clone(),
                });
            }
            if fields_by_db_name.insert(field.db_name.clone(), idx).is_some() {
                return Err(SchemaError::DuplicateAttribute {
                    model: type_name.clone(),
                    field: field.db_name.clone(),
                });
            }

            if field.json && field.binary {
                return Err(SchemaError::MutuallyExclusiveModifiers {
                    model: type_name.clone(),
                    field: field.name.clone(),
                });
            }

            macro_rules! claim_role {
                ($flag:expr, $slot:expr, $role:literal) => {
                    if $flag {
                        if let Some(existing) = $slot {
                            let existing_name = fields[existing].name.clone();
                            return Err(SchemaError::DuplicateRole {
                                model: type_name.clone(),
                                role: $role.to_string(),
                                existing: existing_name,
                                field: field.name.clone(),
                            });
                        }
                        $slot = Some(idx);
                    }
                };
            }

            claim_role!(field.is_pk, pk, "pk");
            claim_role!(field.is_sk, sk, "sk");
            claim_role!(field.is_version, version_field, "version");
            claim_role!(field.is_created_at, created_at_field, "created_at");
            claim_role!(field.is_updated_at, updated_at_field, "updated_at");
            claim_role!(field.is_ttl, ttl_field, "ttl");

            if field.is_encrypted {
                has_encrypted_fields = true;
                if field.is_pk || field.is_sk {
                    return Err(SchemaError::EncryptedKeyField {
                        model: type_name.clone(),
                        field: field.name.clone(),
                    });
                }
            }

            if (field.is_pk || field.is_sk) && !field.attr_type.is_scalar() {
                return Err(SchemaError::NonScalarKeyField {
                    model: type_name.clone(),
                    field: field.name.clone(),
                });
            }
        }

        let Some(pk) = pk else {
            return Err(SchemaError::MissingPrimaryKey {
                model: type_name.clone(),
            });
        };
        let pk_name = fields[pk].name.clone();
        let sk_name = sk.map(|i| fields[i].name.clone());

        for index in &indexes {
            let pk_field = fields_by_name
                .get(&index.pk)
                .map(|&i| &fields[i])
                .ok_or_else(|| SchemaError::UnknownIndexAttribute {
                    model: type_name.clone(),
                    index: index.name.clone(),
                    field: index.pk.clone(),
                })?;
            if !pk_field.attr_type.is_scalar() {
                return Err(SchemaError::NonScalarKeyField {
                    model: type_name.clone(),
                    field: pk_field.name.clone(),
                });
            }

            if let Some(sk_attr) = &index.sk {
                let sk_field = fields_by_name.get(sk_attr).map(|&i| &fields[i]).ok_or_else(|| {
                    SchemaError::UnknownIndexAttribute {
                        model: type_name.clone(),
                        index: index.name.clone(),
                        field: sk_attr.clone(),
                    }
                })?;
                if !sk_field.attr_type.is_scalar() {
                    return Err(SchemaError::NonScalarKeyField {
                        model: type_name.clone(),
                        field: sk_field.name.clone(),
                    });
                }
            }

            if index.kind == IndexKind::Lsi && index.pk != pk_name {
                return Err(SchemaError::LsiPartitionKeyMismatch {
                    model: type_name.clone(),
                    index: index.name.clone(),
                    table_pk: pk_name.clone(),
                    found: index.pk.clone(),
                });
            }

            if let Projection::Include(cols) = &index.projection {
                for c in cols {
                    if !fields_by_name.contains_key(c) {
                        return Err(SchemaError::UnknownIndexAttribute {
                            model: type_name.clone(),
                            index: index.name.clone(),
                            field: c.clone(),
                        });
                    }
                }
            }
        }

        Ok(Self {
            type_name,
            table_name,
            pk: pk_name,
            sk: sk_name,
            indexes,
            fields,
            fields_by_name,
            fields_by_db_name,
            version_field,
            created_at_field,
            updated_at_field,
            ttl_field,
            has_encrypted_fields,
        })
    }

    pub fn field(&self, name: &str) -> Option<&FieldMeta> {
        self.fields_by_name.get(name).map(|&i| &self.fields[i])
    }

    pub fn field_by_db_name(&self, db_name: &str) -> Option<&FieldMeta> {
        self.fields_by_db_name.get(db_name).map(|&i| &self.fields[i])
    }

    pub fn encrypted_db_names(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .filter(|f| f.is_encrypted)
            .map(|f| f.db_name.as_str())
    }
}

/// Implemented by `#[derive(Model)]` (or hand-written for types loaded
/// through the YAML path, see [`yaml::YamlModel`]). `metadata()` must be
/// backed by a `once_cell::sync::Lazy` so it is computed once per type and
/// never evicted, per spec §3's registry lifecycle.
///
/// Open Question (DESIGN.md #1): there is deliberately no fallback for a
/// model with missing/invalid metadata — `metadata()` either returns a
/// valid `&'static ModelMetadata` or the process aborts at first use with a
/// clear panic message from the derive-generated `Lazy`. A model is either
/// schema-valid or it is a programmer error, never a degraded slow path.
pub trait Model: Sized + Send + Sync + 'static {
    fn metadata() -> &'static ModelMetadata;

    fn to_item(&self) -> HashMap<String, AttributeValue>;

    fn from_item(item: HashMap<String, AttributeValue>) -> Result<Self, crate::error::ConvertError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_fields() -> Vec<FieldMeta> {
        let mut pk = FieldMeta::scalar("pk", AttrType::S);
        pk.is_pk = true;
        let mut sk = FieldMeta::scalar("sk", AttrType::S);
        sk.is_sk = true;
        let mut version = FieldMeta::scalar("version", AttrType::N);
        version.is_version = true;
        vec![pk, sk, version]
    }

    #[test]
    fn builds_valid_metadata() {
        let meta = ModelMetadata::build("User", "users", sample_fields(), vec![]).unwrap();
        assert_eq!(meta.pk, "pk");
        assert_eq!(meta.sk.as_deref(), Some("sk"));
        assert_eq!(meta.version_field, Some(2));
    }

    #[test]
    fn rejects_duplicate_role() {
        let mut fields = sample_fields();
        let mut extra_pk = FieldMeta::scalar("other_pk", AttrType::S);
        extra_pk.is_pk = true;
        fields.push(extra_pk);

        let err = ModelMetadata::build("User", "users", fields, vec![]).unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateRole { .. }));
    }

    #[test]
    fn rejects_encrypted_key_field() {
        let mut fields = sample_fields();
        fields[0].is_encrypted = true;
        let err = ModelMetadata::build("User", "users", fields, vec![]).unwrap_err();
        assert!(matches!(err, SchemaError::EncryptedKeyField { .. }));
    }

    #[test]
    fn rejects_lsi_with_different_pk() {
        let fields = sample_fields();
        let index = IndexMeta {
            name: "byOther".into(),
            kind: IndexKind::Lsi,
            pk: "sk".into(),
            sk: None,
            projection: Projection::All,
        };
        let err = ModelMetadata::build("User", "users", fields, vec![index]).unwrap_err();
        assert!(matches!(err, SchemaError::LsiPartitionKeyMismatch { .. }));
    }
}
