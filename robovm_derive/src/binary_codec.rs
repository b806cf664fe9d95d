//! Derive macro for automatic binary serialization.
//!
//! Generates `Encode` and `Decode` implementations (from
//! `crate::types::encoding`) for structs.
//!
//! # Binary Format
//!
//! Fields are serialized in declaration order with no framing, so a struct
//! `{ memory: [u8; 256], pc: u8, sp: u8, io: bool }` encodes to exactly 259
//! bytes.
//!
//! Enums and unions are not supported.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{Data, DeriveInput, Fields, parse_macro_input};

/// Derives `Encode` and `Decode` for a type.
///
/// # Example
///
/// ```ignore
/// use robovm_derive::BinaryCodec;
///
/// #[derive(BinaryCodec)]
/// pub struct Snapshot {
///     pub pc: u8,
///     pub sp: u8,
/// }
/// ```
pub fn derive_binary_codec(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let (encode_body, decode_body) = match &input.data {
        Data::Struct(data_struct) => struct_bodies(&data_struct.fields),
        Data::Enum(_) | Data::Union(_) => {
            return syn::Error::new_spanned(&input, "BinaryCodec derive only supports structs")
                .to_compile_error()
                .into();
        }
    };

    TokenStream::from(quote! {
        impl #impl_generics crate::types::encoding::Encode for #name #ty_generics #where_clause {
            fn encode<S: crate::types::encoding::EncodeSink>(&self, out: &mut S) {
                #encode_body
            }
        }

        impl #impl_generics crate::types::encoding::Decode for #name #ty_generics #where_clause {
            fn decode(
                input: &mut &[u8],
            ) -> ::std::result::Result<Self, crate::types::encoding::DecodeError> {
                #decode_body
            }
        }
    })
}

/// Encode/decode bodies for a struct, reading fields through `self`.
fn struct_bodies(fields: &Fields) -> (TokenStream2, TokenStream2) {
    let accessors: Vec<TokenStream2> = match fields {
        Fields::Named(named) => named
            .named
            .iter()
            .filter_map(|f| f.ident.as_ref())
            .map(|ident| quote!(#ident))
            .collect(),
        Fields::Unnamed(unnamed) => (0..unnamed.unnamed.len())
            .map(|i| {
                let index = syn::Index::from(i);
                quote!(#index)
            })
            .collect(),
        Fields::Unit => Vec::new(),
    };

    let encode = quote! {
        let _ = &out;
        #( crate::types::encoding::Encode::encode(&self.#accessors, out); )*
    };
    let decode = construct(quote!(Self), fields);
    (encode, quote! { Ok(#decode) })
}

/// Builds `path { a: decode?, .. }`, `path(decode?, ..)` or `path`.
fn construct(path: TokenStream2, fields: &Fields) -> TokenStream2 {
    match fields {
        Fields::Named(named) => {
            let idents = named.named.iter().filter_map(|f| f.ident.as_ref());
            quote! {
                #path { #( #idents: crate::types::encoding::Decode::decode(input)?, )* }
            }
        }
        Fields::Unnamed(unnamed) => {
            let decodes = (0..unnamed.unnamed.len())
                .map(|_| quote! { crate::types::encoding::Decode::decode(input)? });
            quote! { #path( #(#decodes),* ) }
        }
        Fields::Unit => quote! {{
            let _ = &input;
            #path
        }},
    }
}
