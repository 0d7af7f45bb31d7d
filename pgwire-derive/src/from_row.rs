//! Grounded on `ariaandika-postro/postro-macros/src/from_row.rs` for the
//! overall derive shape (match `Data::Struct`, walk `Fields::Named`,
//! generate one `impl` block via `quote!`) and on the hand-written `Row`
//! stand-in in `pgwire-core/src/row.rs`'s tests for the exact body a
//! generated `from_fields` should produce: pull `(raw, oid, format)` by
//! name, defer to `FieldType::from_null` on a SQL NULL cell (`UnexpectedNull`
//! for every builtin type, `None` for `Option<T>`), otherwise dispatch to
//! `FieldType::parse_text`/`parse_binary` on `format`.

use proc_macro2::TokenStream;
use quote::quote;
use syn::{Data, DeriveInput, Error, Fields, FieldsNamed, Result};

pub fn expand(input: DeriveInput) -> Result<TokenStream> {
    let DeriveInput { ident, mut generics, data, .. } = input;

    let Data::Struct(data) = data else {
        return Err(Error::new_spanned(ident, "FromRow can only be derived for structs"));
    };

    let Fields::Named(FieldsNamed { named, .. }) = data.fields else {
        return Err(Error::new_spanned(
            ident,
            "FromRow requires named fields; tuple and unit structs are not supported",
        ));
    };

    let field_idents: Vec<_> = named
        .iter()
        .map(|f| f.ident.clone().expect("named field always has an ident"))
        .collect();
    let field_names: Vec<String> = field_idents.iter().map(|id| id.to_string()).collect();
    let field_types: Vec<_> = named.iter().map(|f| f.ty.clone()).collect();
    let indices: Vec<usize> = (0..field_idents.len()).collect();

    for ty in generics.type_params_mut() {
        ty.bounds.push(syn::parse_quote!(::pgwire_core::types::FieldType));
    }
    let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();

    let compat_arms = indices.iter().zip(field_types.iter()).map(|(index, ty)| {
        quote! {
            #index => <#ty as ::pgwire_core::types::FieldType>::is_compatible(server_oid),
        }
    });

    let field_reads = field_idents.iter().zip(field_names.iter()).zip(field_types.iter()).map(
        |((ident, name), ty)| {
            quote! {
                let (raw, oid, format) = ::pgwire_core::row::FieldSource::field(source, #name)?;
                let #ident: #ty = match raw {
                    None => <#ty as ::pgwire_core::types::FieldType>::from_null().map_err(|_| {
                        ::pgwire_core::error::Error::UnexpectedNull { field: #name.into() }
                    })?,
                    Some(raw) if format == 0 => {
                        let text = ::std::str::from_utf8(raw).map_err(|_| {
                            ::pgwire_core::error::Error::ProtocolValueError(
                                format!("column {:?} is not valid utf-8 text", #name),
                            )
                        })?;
                        <#ty as ::pgwire_core::types::FieldType>::parse_text(oid, text)?
                    }
                    Some(raw) => <#ty as ::pgwire_core::types::FieldType>::parse_binary(oid, raw)?,
                };
            }
        },
    );

    Ok(quote! {
        #[automatically_derived]
        impl #impl_generics ::pgwire_core::row::FromRow for #ident #ty_generics #where_clause {
            const FIELD_NAMES: &'static [&'static str] = &[#(#field_names),*];

            fn field_is_compatible(index: usize, server_oid: i32) -> bool {
                match index {
                    #(#compat_arms)*
                    _ => false,
                }
            }

            fn from_fields<'a>(
                source: &mut dyn ::pgwire_core::row::FieldSource<'a>,
            ) -> ::pgwire_core::error::Result<Self> {
                #(#field_reads)*
                Ok(Self {
                    #(#field_idents),*
                })
            }
        }
    })
}
