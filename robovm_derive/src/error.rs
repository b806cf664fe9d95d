//! Derive macro for error types.
//!
//! Generates `std::fmt::Display` and `std::error::Error` implementations.
//!
//! # Usage
//!
//! ```ignore
//! use robovm_derive::Error;
//!
//! #[derive(Debug, Error)]
//! pub enum AsmError {
//!     #[error("undefined label: {label}")]
//!     UndefinedLabel { label: String },
//!
//!     #[error("bad literal '{0}'")]
//!     BadLiteral(String),
//!
//!     #[error("program too large")]
//!     TooLarge,
//! }
//! ```
//!
//! Only the fields a message actually mentions are passed to `write!`, so a
//! variant may carry context (line, column, ...) that its message omits.

use proc_macro::TokenStream;
use quote::{ToTokens, format_ident, quote};
use syn::{Data, DeriveInput, Fields, Lit, Meta, parse_macro_input};

/// Derives `Display` and `Error` for an enum.
///
/// Each variant must have an `#[error("...")]` attribute. Tuple fields are
/// referenced as `{0}`, `{1}`; named fields as `{field_name}`. Format specs
/// such as `{offset:+}` or `{addr:#04x}` are kept as written.
pub fn derive_error(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match expand(&input) {
        Ok(tokens) => TokenStream::from(tokens),
        Err(err) => err.to_compile_error().into(),
    }
}

fn expand(input: &DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let body = match &input.data {
        Data::Enum(data_enum) => {
            let arms = data_enum
                .variants
                .iter()
                .map(|variant| {
                    let ident = &variant.ident;
                    let message = message_from_attrs(
                        &variant.attrs,
                        ident,
                        &format!("variant `{ident}`"),
                    )?;
                    let (pattern, write) = display_fields(&message, &variant.fields);
                    Ok(quote! { Self::#ident #pattern => #write, })
                })
                .collect::<syn::Result<Vec<_>>>()?;

            quote! {
                match self {
                    #(#arms)*
                }
            }
        }
        Data::Struct(_) | Data::Union(_) => {
            return Err(syn::Error::new_spanned(
                input,
                "Error derive only supports enums",
            ));
        }
    };

    Ok(quote! {
        impl #impl_generics ::std::fmt::Display for #name #ty_generics #where_clause {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                #body
            }
        }

        impl #impl_generics ::std::error::Error for #name #ty_generics #where_clause {}
    })
}

/// Builds the destructuring pattern and the `write!` call for one variant.
fn display_fields(
    message: &str,
    fields: &Fields,
) -> (proc_macro2::TokenStream, proc_macro2::TokenStream) {
    match fields {
        Fields::Unit => (quote!(), quote! { write!(f, #message) }),
        Fields::Named(named) => {
            let used = placeholder_names(message);
            let idents: Vec<_> = named
                .named
                .iter()
                .filter_map(|field| field.ident.as_ref())
                .filter(|ident| used.contains(&ident.to_string()))
                .collect();
            (
                quote! { { #(#idents,)* .. } },
                quote! { write!(f, #message, #(#idents = #idents),*) },
            )
        }
        Fields::Unnamed(unnamed) => {
            let count = unnamed.unnamed.len();
            let message = positional_to_named(message, count);
            let used = placeholder_names(&message);
            let bindings: Vec<_> = (0..count).map(|i| format_ident!("f{}", i)).collect();
            let args = bindings
                .iter()
                .filter(|binding| used.contains(&binding.to_string()))
                .map(|binding| quote! { #binding = #binding });
            let slots = bindings.iter().map(|binding| {
                if used.contains(&binding.to_string()) {
                    quote!(#binding)
                } else {
                    quote!(_)
                }
            });
            (
                quote! { ( #(#slots),* ) },
                quote! { write!(f, #message, #(#args),*) },
            )
        }
    }
}

/// Extracts the message from an `#[error("...")]` attribute.
fn message_from_attrs<T: ToTokens>(
    attrs: &[syn::Attribute],
    target: &T,
    target_desc: &str,
) -> syn::Result<String> {
    for attr in attrs {
        if !attr.path().is_ident("error") {
            continue;
        }
        let Meta::List(meta_list) = &attr.meta else {
            return Err(syn::Error::new_spanned(
                &attr.meta,
                "invalid #[error] attribute; use #[error(\"message\")]",
            ));
        };
        return match syn::parse2::<Lit>(meta_list.tokens.clone()) {
            Ok(Lit::Str(lit)) => Ok(lit.value()),
            _ => Err(syn::Error::new_spanned(
                &attr.meta,
                "#[error] expects a string literal, e.g. #[error(\"undefined label: {label}\")]",
            )),
        };
    }

    Err(syn::Error::new_spanned(
        target,
        format!("missing #[error(\"...\")] attribute on {target_desc}"),
    ))
}

/// Returns the argument names referenced by `{name}` / `{name:spec}`
/// placeholders, skipping `{{` escapes.
fn placeholder_names(message: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut chars = message.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
            }
            '{' => {
                let mut name = String::new();
                for c in chars.by_ref() {
                    if c == '}' || c == ':' {
                        break;
                    }
                    name.push(c);
                }
                let name = name.trim().to_string();
                if !name.is_empty() && !names.contains(&name) {
                    names.push(name);
                }
            }
            _ => {}
        }
    }
    names
}

/// Rewrites positional placeholders `{0}`, `{1:x}` into `{f0}`, `{f1:x}`.
fn positional_to_named(message: &str, field_count: usize) -> String {
    let mut result = message.to_string();
    for i in (0..field_count).rev() {
        result = result
            .replace(&format!("{{{i}}}"), &format!("{{f{i}}}"))
            .replace(&format!("{{{i}:"), &format!("{{f{i}:"));
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholders_skip_escapes_and_specs() {
        assert_eq!(
            placeholder_names("{{literal}} {label} at {offset:+} ({label})"),
            vec!["label".to_string(), "offset".to_string()]
        );
    }

    #[test]
    fn positional_placeholders_become_named() {
        assert_eq!(positional_to_named("{0} and {1:#04x}", 2), "{f0} and {f1:#04x}");
    }
}
