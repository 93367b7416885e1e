//! Attribute parsing for `#[derive(State)]`.

use darling::{FromDeriveInput, FromVariant, ast};
use syn::{Generics, Ident, Path};

/// The enum being derived, with its `#[state(...)]` options.
#[derive(Debug, FromDeriveInput)]
#[darling(attributes(state), supports(enum_unit))]
pub struct StateEnum {
    pub ident: Ident,
    pub generics: Generics,
    pub data: ast::Data<StateVariant, ()>,

    /// Path to the runtime crate (default: `::nbfsm`).
    #[darling(rename = "crate", default)]
    pub krate: Option<Path>,
}

/// One variant, with an optional `#[state(rename = "...")]`.
#[derive(Debug, FromVariant)]
#[darling(attributes(state))]
pub struct StateVariant {
    pub ident: Ident,

    /// Name reported by `State::name` (default: the variant name).
    #[darling(default)]
    pub rename: Option<String>,
}

impl StateVariant {
    pub fn display_name(&self) -> String {
        self.rename
            .clone()
            .unwrap_or_else(|| self.ident.to_string())
    }
}
