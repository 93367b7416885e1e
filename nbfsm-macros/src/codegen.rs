//! Code generation for `#[derive(State)]`.

use std::collections::HashMap;

use proc_macro2::TokenStream;
use quote::quote;
use syn::parse_quote;

use crate::attrs::StateEnum;

pub fn expand(input: &StateEnum) -> darling::Result<TokenStream> {
    if !input.generics.params.is_empty() {
        return Err(
            darling::Error::custom("`State` cannot be derived for generic enums")
                .with_span(&input.generics),
        );
    }

    let variants = input
        .data
        .as_ref()
        .take_enum()
        .ok_or_else(|| darling::Error::unsupported_shape("struct"))?;

    let mut errors = darling::Error::accumulator();
    let mut seen = HashMap::new();
    for variant in &variants {
        let name = variant.display_name();
        if let Some(previous) = seen.insert(name.clone(), &variant.ident) {
            errors.push(
                darling::Error::custom(format!(
                    "state name `{name}` is already used by `{previous}`"
                ))
                .with_span(&variant.ident),
            );
        }
    }
    errors.finish()?;

    let ident = &input.ident;
    let krate = input.krate.clone().unwrap_or_else(|| parse_quote!(::nbfsm));
    let idents: Vec<_> = variants.iter().map(|variant| &variant.ident).collect();
    let names: Vec<_> = variants.iter().map(|variant| variant.display_name()).collect();

    Ok(quote! {
        impl #krate::State for #ident {
            const ALL: &'static [Self] = &[#(Self::#idents),*];

            fn name(&self) -> &'static str {
                match *self {
                    #(Self::#idents => #names,)*
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use darling::FromDeriveInput;
    use syn::parse_quote;

    use super::*;

    fn expand_str(input: syn::DeriveInput) -> Result<String, String> {
        StateEnum::from_derive_input(&input)
            .and_then(|parsed| expand(&parsed))
            .map(|tokens| tokens.to_string())
            .map_err(|err| err.to_string())
    }

    #[test]
    fn lists_every_variant_with_its_name() {
        let out = expand_str(parse_quote! {
            enum Light {
                On,
                #[state(rename = "OFF")]
                Off,
            }
        })
        .unwrap();
        assert!(out.contains("impl :: nbfsm :: State for Light"));
        assert!(out.contains("& [Self :: On , Self :: Off]"));
        assert!(out.contains("Self :: Off => \"OFF\""));
    }

    #[test]
    fn crate_path_can_be_overridden() {
        let out = expand_str(parse_quote! {
            #[state(crate = "nbfsm_core")]
            enum Light { On }
        })
        .unwrap();
        assert!(out.contains("impl nbfsm_core :: State for Light"));
    }

    #[test]
    fn rejects_data_carrying_variants() {
        assert!(expand_str(parse_quote! {
            enum Light { On(u8), Off }
        })
        .is_err());
        assert!(expand_str(parse_quote! {
            struct Light;
        })
        .is_err());
    }

    #[test]
    fn rejects_duplicate_names() {
        let err = expand_str(parse_quote! {
            enum Light {
                On,
                #[state(rename = "On")]
                Lit,
            }
        })
        .unwrap_err();
        assert!(err.contains("already used by `On`"));
    }

    #[test]
    fn rejects_generics() {
        let err = expand_str(parse_quote! {
            enum Light<T> { On, Off }
        })
        .unwrap_err();
        assert!(err.contains("generic"));
    }
}
