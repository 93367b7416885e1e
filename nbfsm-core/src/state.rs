//! The state domain of a machine.

use std::fmt::Debug;
use std::hash::Hash;

/// A state a machine can be in.
///
/// States are values of a finite, caller-defined enumeration. The engine only
/// needs identity equality and hashing; `ALL` lists the whole domain so the
/// model can be checked for states that can never be reached.
///
/// Usually implemented with `#[derive(State)]`:
///
/// ```rust
/// # use nbfsm_core::State;
/// #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// enum Light {
///     On,
///     Off,
/// }
///
/// impl State for Light {
///     const ALL: &'static [Self] = &[Light::On, Light::Off];
///
///     fn name(&self) -> &'static str {
///         match self {
///             Light::On => "On",
///             Light::Off => "Off",
///         }
///     }
/// }
///
/// assert_eq!(Light::ALL.len(), 2);
/// assert_eq!(Light::Off.name(), "Off");
/// ```
pub trait State: Copy + Eq + Hash + Debug + Send + Sync + 'static {
    /// Every value of the state domain.
    const ALL: &'static [Self];

    /// Human readable name, used in logs and diagnostics.
    fn name(&self) -> &'static str;
}
