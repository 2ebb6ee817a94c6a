extern crate proc_macro2;
extern crate quote;
extern crate syn;

mod model;
mod settings;

use proc_macro::TokenStream;
use syn::{parse_macro_input, DeriveInput};

/// Derives [`tabletheory::Model`] from a struct's `#[model(...)]`
/// attributes (spec §3). See `settings` for the attribute grammar this
/// macro accepts.
#[proc_macro_derive(Model, attributes(model))]
pub fn derive_model(input: TokenStream) -> TokenStream {
    model::derive_model(parse_macro_input!(input as DeriveInput))
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}
