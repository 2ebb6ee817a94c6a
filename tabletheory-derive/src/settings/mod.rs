mod builder;

use self::builder::SettingsBuilder;
use proc_macro2::Ident;
use syn::{DeriveInput, Type};

/// One field's parsed `#[model(...)]` attributes plus its declared Rust
/// type, enough to emit both the [`tabletheory::registry::FieldMeta`]
/// literal and the `to_item`/`from_item` conversion for that field.
pub(crate) struct FieldSpec {
    pub(crate) ident: Ident,
    pub(crate) name: String,
    pub(crate) db_name: String,
    pub(crate) ty: Type,
    pub(crate) is_pk: bool,
    pub(crate) is_sk: bool,
    pub(crate) is_version: bool,
    pub(crate) is_created_at: bool,
    pub(crate) is_updated_at: bool,
    pub(crate) is_ttl: bool,
    pub(crate) is_encrypted: bool,
    pub(crate) omit_empty: bool,
    pub(crate) json: bool,
    pub(crate) binary: bool,
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub(crate) enum IndexKind {
    Gsi,
    Lsi,
}

pub(crate) enum Projection {
    All,
    KeysOnly,
    Include(Vec<String>),
}

pub(crate) struct IndexSpec {
    pub(crate) name: String,
    pub(crate) kind: IndexKind,
    pub(crate) pk: String,
    pub(crate) sk: Option<String>,
    pub(crate) projection: Projection,
}

pub(crate) struct Settings {
    ident: Ident,
    pub(crate) table: Option<String>,
    pub(crate) fields: Vec<FieldSpec>,
    pub(crate) indexes: Vec<IndexSpec>,
}

impl Settings {
    pub(crate) fn builder(input: &DeriveInput) -> SettingsBuilder {
        SettingsBuilder::new(input)
    }

    pub(crate) fn ident(&self) -> &Ident {
        &self.ident
    }

    pub(crate) fn get_table(&self) -> Result<&str, syn::Error> {
        self.table.as_deref().ok_or_else(|| {
            syn::Error::new_spanned(
                &self.ident,
                "Model requires a table name: #[model(table = \"...\")]",
            )
        })
    }
}
