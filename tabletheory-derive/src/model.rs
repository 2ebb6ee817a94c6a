use crate::settings::{FieldSpec, IndexKind, Projection, Settings};
use quote::{format_ident, quote};
use syn::{DeriveInput, Type};

/// Best-effort DynamoDB scalar/aggregate type for a field's Rust type,
/// used only for the [`tabletheory::registry::FieldMeta`] descriptor —
/// the actual marshalling still goes through that field's own
/// `ToAttributeValue`/`FromAttributeValue` impl, so a field typed
/// `Json<T>` or wrapped in a custom converter is unaffected by this
/// guess being approximate.
fn infer_attr_type(ty: &Type, json: bool, binary: bool) -> proc_macro2::TokenStream {
    if json {
        return quote! { tabletheory::registry::AttrType::S };
    }
    if binary {
        return quote! { tabletheory::registry::AttrType::B };
    }

    let rendered = quote! { #ty }.to_string();
    let rendered = rendered.replace(' ', "");

    if let Some(inner) = rendered.strip_prefix("Option<").and_then(|s| s.strip_suffix('>')) {
        let inner_ty: Type = syn::parse_str(inner).unwrap_or_else(|_| ty.clone());
        return infer_attr_type(&inner_ty, false, false);
    }

    match rendered.as_str() {
        "String" | "&str" | "str" => quote! { tabletheory::registry::AttrType::S },
        "bool" => quote! { tabletheory::registry::AttrType::Bool },
        "i8" | "i16" | "i32" | "i64" | "i128" | "isize" | "u8" | "u16" | "u32" | "u64" | "u128"
        | "usize" | "f32" | "f64" => quote! { tabletheory::registry::AttrType::N },
        "Vec<u8>" => quote! { tabletheory::registry::AttrType::B },
        "HashSet<String>" | "std::collections::HashSet<String>" => {
            quote! { tabletheory::registry::AttrType::Ss }
        }
        "HashMap<String,AttributeValue>" | "std::collections::HashMap<String,AttributeValue>" => {
            quote! { tabletheory::registry::AttrType::M }
        }
        other if other.starts_with("Vec<") => quote! { tabletheory::registry::AttrType::L },
        _ => quote! { tabletheory::registry::AttrType::M },
    }
}

fn field_meta_tokens(field: &FieldSpec) -> proc_macro2::TokenStream {
    let name = &field.name;
    let db_name = &field.db_name;
    let attr_type = infer_attr_type(&field.ty, field.json, field.binary);
    let is_pk = field.is_pk;
    let is_sk = field.is_sk;
    let is_version = field.is_version;
    let is_created_at = field.is_created_at;
    let is_updated_at = field.is_updated_at;
    let is_ttl = field.is_ttl;
    let is_encrypted = field.is_encrypted;
    let omit_empty = field.omit_empty;
    let json = field.json;
    let binary = field.binary;

    quote! {
        {
            let mut __fm = tabletheory::registry::FieldMeta::scalar(#name, #attr_type);
            __fm.db_name = #db_name.to_string();
            __fm.is_pk = #is_pk;
            __fm.is_sk = #is_sk;
            __fm.is_version = #is_version;
            __fm.is_created_at = #is_created_at;
            __fm.is_updated_at = #is_updated_at;
            __fm.is_ttl = #is_ttl;
            __fm.is_encrypted = #is_encrypted;
            __fm.omit_empty = #omit_empty;
            __fm.json = #json;
            __fm.binary = #binary;
            __fm
        }
    }
}

fn projection_tokens(projection: &Projection) -> proc_macro2::TokenStream {
    match projection {
        Projection::All => quote! { tabletheory::registry::Projection::All },
        Projection::KeysOnly => quote! { tabletheory::registry::Projection::KeysOnly },
        Projection::Include(cols) => {
            quote! { tabletheory::registry::Projection::Include(vec![#(#cols.to_string()),*]) }
        }
    }
}

fn index_meta_tokens(index: &crate::settings::IndexSpec) -> proc_macro2::TokenStream {
    let name = &index.name;
    let pk = &index.pk;
    let kind = match index.kind {
        IndexKind::Gsi => quote! { tabletheory::registry::IndexKind::Gsi },
        IndexKind::Lsi => quote! { tabletheory::registry::IndexKind::Lsi },
    };
    let sk = match &index.sk {
        Some(sk) => quote! { Some(#sk.to_string()) },
        None => quote! { None },
    };
    let projection = projection_tokens(&index.projection);

    quote! {
        tabletheory::registry::IndexMeta {
            name: #name.to_string(),
            kind: #kind,
            pk: #pk.to_string(),
            sk: #sk,
            projection: #projection,
        }
    }
}

pub(crate) fn derive_model(input: DeriveInput) -> Result<proc_macro2::TokenStream, syn::Error> {
    let settings = Settings::builder(&input)
        .container_attributes(&input)?
        .field_attributes(&input)?
        .build()?;

    let ident = settings.ident();
    let table = settings.get_table()?;

    let static_name = format_ident!("__TABLETHEORY_MODEL_{}", ident.to_string().to_uppercase());

    let field_metas = settings.fields.iter().map(field_meta_tokens);
    let index_metas = settings.indexes.iter().map(index_meta_tokens);

    let to_item_inserts = settings.fields.iter().map(|f| {
        let field_ident = &f.ident;
        let db_name = &f.db_name;
        if f.omit_empty {
            quote! {
                let __v = tabletheory::ToAttributeValue::to_attribute_value(&self.#field_ident);
                if !__v.is_null() {
                    __item.insert(#db_name.to_string(), __v);
                }
            }
        } else {
            quote! {
                __item.insert(
                    #db_name.to_string(),
                    tabletheory::ToAttributeValue::to_attribute_value(&self.#field_ident),
                );
            }
        }
    });

    let from_item_binds = settings.fields.iter().map(|f| {
        let field_ident = &f.ident;
        let ty = &f.ty;
        let db_name = &f.db_name;
        let field_name = &f.name;
        quote! {
            let #field_ident: #ty = <#ty as tabletheory::FromAttributeValue>::from_attribute_value(
                __item.get(#db_name).cloned().unwrap_or(tabletheory::AttributeValue::Null),
            )
            .map_err(|e| e.renamed(#field_name))?;
        }
    });

    let field_idents = settings.fields.iter().map(|f| &f.ident);

    let expanded = quote! {
        static #static_name: tabletheory::once_cell::sync::Lazy<tabletheory::ModelMetadata> =
            tabletheory::once_cell::sync::Lazy::new(|| {
                tabletheory::ModelMetadata::build(
                    stringify!(#ident),
                    #table,
                    vec![#(#field_metas),*],
                    vec![#(#index_metas),*],
                )
                .unwrap_or_else(|e| panic!("invalid model `{}`: {e}", stringify!(#ident)))
            });

        impl tabletheory::Model for #ident {
            fn metadata() -> &'static tabletheory::ModelMetadata {
                &#static_name
            }

            fn to_item(&self) -> std::collections::HashMap<String, tabletheory::AttributeValue> {
                let mut __item = std::collections::HashMap::new();
                #(#to_item_inserts)*
                __item
            }

            fn from_item(
                __item: std::collections::HashMap<String, tabletheory::AttributeValue>,
            ) -> Result<Self, tabletheory::error::ConvertError> {
                #(#from_item_binds)*
                Ok(Self { #(#field_idents),* })
            }
        }
    };

    Ok(expanded)
}
