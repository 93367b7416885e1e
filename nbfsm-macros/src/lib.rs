//! Derive macro for nbfsm state enumerations.

use darling::FromDeriveInput;
use proc_macro::TokenStream;
use syn::{DeriveInput, parse_macro_input};

use crate::attrs::StateEnum;

mod attrs;
mod codegen;

/// Implements `State` for a field-less enum.
///
/// `State::ALL` lists the variants in declaration order and `State::name`
/// returns the variant name, or the name given with
/// `#[state(rename = "...")]`. The trait is referred to as `::nbfsm::State`;
/// use `#[state(crate = "path")]` when depending on the runtime under another
/// name.
#[proc_macro_derive(State, attributes(state))]
pub fn derive_state(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match StateEnum::from_derive_input(&input).and_then(|parsed| codegen::expand(&parsed)) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.write_errors().into(),
    }
}
