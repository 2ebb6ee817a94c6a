use super::{FieldSpec, IndexKind, IndexSpec, Projection, Settings};
use syn::{Data, DeriveInput, Fields, LitStr};

pub(crate) struct SettingsBuilder {
    ident: proc_macro2::Ident,
    table: Option<String>,
    fields: Vec<FieldSpec>,
    indexes: Vec<IndexSpec>,
}

fn parse_projection(raw: &str) -> Projection {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("all") {
        Projection::All
    } else if raw.eq_ignore_ascii_case("keys_only") {
        Projection::KeysOnly
    } else if let Some(inner) = raw
        .strip_prefix("include(")
        .and_then(|s| s.strip_suffix(')'))
    {
        Projection::Include(
            inner
                .split(',')
                .map(|s| s.trim().trim_matches('"').to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        )
    } else {
        Projection::All
    }
}

impl SettingsBuilder {
    pub(crate) fn new(input: &DeriveInput) -> Self {
        Self {
            ident: input.ident.clone(),
            table: None,
            fields: Vec::new(),
            indexes: Vec::new(),
        }
    }

    pub(crate) fn container_attributes(
        mut self,
        DeriveInput { attrs, .. }: &DeriveInput,
    ) -> Result<Self, syn::Error> {
        for attr in attrs {
            if !attr.path().is_ident("model") {
                continue;
            }
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("table") {
                    let value: LitStr = meta.value()?.parse()?;
                    self.table = Some(value.value());
                    return Ok(());
                }

                if meta.path.is_ident("index") {
                    let mut name = None;
                    let mut kind = IndexKind::Gsi;
                    let mut pk = None;
                    let mut sk = None;
                    let mut projection = Projection::All;

                    meta.parse_nested_meta(|inner| {
                        if inner.path.is_ident("name") {
                            let v: LitStr = inner.value()?.parse()?;
                            name = Some(v.value());
                        } else if inner.path.is_ident("kind") {
                            let v: LitStr = inner.value()?.parse()?;
                            kind = match v.value().as_str() {
                                "lsi" => IndexKind::Lsi,
                                _ => IndexKind::Gsi,
                            };
                        } else if inner.path.is_ident("pk") {
                            let v: LitStr = inner.value()?.parse()?;
                            pk = Some(v.value());
                        } else if inner.path.is_ident("sk") {
                            let v: LitStr = inner.value()?.parse()?;
                            sk = Some(v.value());
                        } else if inner.path.is_ident("projection") {
                            let v: LitStr = inner.value()?.parse()?;
                            projection = parse_projection(&v.value());
                        } else {
                            return Err(inner.error("unsupported index attribute"));
                        }
                        Ok(())
                    })?;

                    let name = name.ok_or_else(|| meta.error("index requires a `name`"))?;
                    let pk = pk.ok_or_else(|| meta.error("index requires a `pk`"))?;

                    self.indexes.push(IndexSpec { name, kind, pk, sk, projection });
                    return Ok(());
                }

                Err(meta.error("unsupported model attribute"))
            })?;
        }

        Ok(self)
    }

    pub(crate) fn field_attributes(
        mut self,
        DeriveInput { data, .. }: &DeriveInput,
    ) -> Result<Self, syn::Error> {
        let Data::Struct(data_struct) = data else {
            return Err(syn::Error::new_spanned(
                &self.ident,
                "Model can only be derived for structs with named fields",
            ));
        };
        let Fields::Named(fields_named) = &data_struct.fields else {
            return Err(syn::Error::new_spanned(
                &self.ident,
                "Model can only be derived for structs with named fields",
            ));
        };

        for field in &fields_named.named {
            let ident = field
                .ident
                .clone()
                .ok_or_else(|| syn::Error::new_spanned(field, "field must be named"))?;
            let name = ident.to_string();

            let mut db_name = name.clone();
            let mut is_pk = false;
            let mut is_sk = false;
            let mut is_version = false;
            let mut is_created_at = false;
            let mut is_updated_at = false;
            let mut is_ttl = false;
            let mut is_encrypted = false;
            let mut omit_empty = false;
            let mut json = false;
            let mut binary = false;

            for attr in &field.attrs {
                if !attr.path().is_ident("model") {
                    continue;
                }
                attr.parse_nested_meta(|meta| {
                    if meta.path.is_ident("pk") {
                        is_pk = true;
                    } else if meta.path.is_ident("sk") {
                        is_sk = true;
                    } else if meta.path.is_ident("version") {
                        is_version = true;
                    } else if meta.path.is_ident("created_at") {
                        is_created_at = true;
                    } else if meta.path.is_ident("updated_at") {
                        is_updated_at = true;
                    } else if meta.path.is_ident("ttl") {
                        is_ttl = true;
                    } else if meta.path.is_ident("encrypted") {
                        is_encrypted = true;
                    } else if meta.path.is_ident("omit_empty") {
                        omit_empty = true;
                    } else if meta.path.is_ident("json") {
                        json = true;
                    } else if meta.path.is_ident("binary") {
                        binary = true;
                    } else if meta.path.is_ident("db_name") {
                        let v: LitStr = meta.value()?.parse()?;
                        db_name = v.value();
                    } else {
                        return Err(meta.error("unsupported field attribute"));
                    }
                    Ok(())
                })?;
            }

            if json && binary {
                return Err(syn::Error::new_spanned(
                    field,
                    format!("field '{name}' cannot be both `json` and `binary`"),
                ));
            }

            self.fields.push(FieldSpec {
                ident,
                name,
                db_name,
                ty: field.ty.clone(),
                is_pk,
                is_sk,
                is_version,
                is_created_at,
                is_updated_at,
                is_ttl,
                is_encrypted,
                omit_empty,
                json,
                binary,
            });
        }

        Ok(self)
    }

    pub(crate) fn build(self) -> Result<Settings, syn::Error> {
        Ok(Settings {
            ident: self.ident,
            table: self.table,
            fields: self.fields,
            indexes: self.indexes,
        })
    }
}
