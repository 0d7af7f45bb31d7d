use proc_macro::TokenStream;
use syn::DeriveInput;

mod from_row;

/// Generates a [`pgwire_core::row::FromRow`] implementation for a
/// named-field struct, matching each field to a column of the same name by
/// position at runtime.
#[proc_macro_derive(FromRow)]
pub fn from_row(input: TokenStream) -> TokenStream {
    match from_row::expand(syn::parse_macro_input!(input as DeriveInput)) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}
